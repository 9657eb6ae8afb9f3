//! Protection register management.
//!
//! P-Flash protection covers 32 regions through FPROT0..FPROT3 (FPROT0 is
//! the most significant byte), D-Flash and EERAM protection one byte each
//! through FDPROT and FEPROT. A protection bit of 1 means the region is
//! unprotected.
//!
//! In normal mode the registers only accept writes that protect *more*
//! (clearing bits); whether the part is in normal mode is probed by writing
//! all-ones and reading back. The probe itself never changes the persisted
//! state: in normal mode it is ignored, in special mode it is overwritten
//! by the final value write.

use crate::error::{Error, Result};
use crate::flash::Flash;
use crate::regs::FlashIo;

impl<IO: FlashIo> Flash<IO> {
    /// Current P-Flash protection, FPROT0 in the most significant byte.
    pub fn pflash_protection(&self) -> u32 {
        let map = self.map();
        u32::from_be_bytes([
            self.io.read_reg(map.fprot[0]),
            self.io.read_reg(map.fprot[1]),
            self.io.read_reg(map.fprot[2]),
            self.io.read_reg(map.fprot[3]),
        ])
    }

    /// Change the P-Flash protection.
    ///
    /// Fails with [`Error::ProtectionChange`] while a command is running,
    /// or when the part is in normal mode and `protection` would unprotect
    /// a currently protected region.
    pub fn set_pflash_protection(&mut self, protection: u32) -> Result<()> {
        if !self.command_idle() {
            return Err(Error::ProtectionChange);
        }
        let map = self.map();
        for i in 0..4 {
            self.io.write_reg(map.fprot[i], 0xFF);
        }
        let current = self.pflash_protection();
        let result = if current != 0xFFFF_FFFF && (protection ^ current) & protection != 0 {
            Err(Error::ProtectionChange)
        } else {
            let bytes = protection.to_be_bytes();
            for i in 0..4 {
                self.io.write_reg(map.fprot[i], bytes[i]);
            }
            Ok(())
        };
        self.debug_trap();
        result
    }

    /// Current D-Flash protection (FDPROT).
    pub fn dflash_protection(&self) -> Result<u8> {
        if self.dev.dflash_total == 0 {
            return Err(Error::EflashOnly);
        }
        Ok(self.io.read_reg(self.map().fdprot))
    }

    /// Change the D-Flash protection; same mode rules as
    /// [`Flash::set_pflash_protection`].
    pub fn set_dflash_protection(&mut self, protection: u8) -> Result<()> {
        if self.dev.dflash_total == 0 {
            return Err(Error::EflashOnly);
        }
        let offset = self.map().fdprot;
        self.set_byte_protection(offset, protection)
    }

    /// Current EERAM protection (FEPROT).
    pub fn eeram_protection(&self) -> Result<u8> {
        if self.dev.eeram_size == 0 {
            return Err(Error::EflashOnly);
        }
        Ok(self.io.read_reg(self.map().feprot))
    }

    /// Change the EERAM protection; same mode rules as
    /// [`Flash::set_pflash_protection`].
    pub fn set_eeram_protection(&mut self, protection: u8) -> Result<()> {
        if self.dev.eeram_size == 0 {
            return Err(Error::EflashOnly);
        }
        let offset = self.map().feprot;
        self.set_byte_protection(offset, protection)
    }

    fn set_byte_protection(&mut self, offset: u32, protection: u8) -> Result<()> {
        if !self.command_idle() {
            return Err(Error::ProtectionChange);
        }
        self.io.write_reg(offset, 0xFF);
        let current = self.io.read_reg(offset);
        let result = if current != 0xFF && (protection ^ current) & protection != 0 {
            Err(Error::ProtectionChange)
        } else {
            self.io.write_reg(offset, protection);
            Ok(())
        };
        self.debug_trap();
        result
    }
}
