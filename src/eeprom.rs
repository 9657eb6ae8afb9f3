//! FlexNVM partitioning and EEPROM emulation.
//!
//! The FlexNVM block can be split between plain D-Flash and backup space
//! for EEPROM emulation; the split is burned into the D-Flash IFR by the
//! program-partition command and read back at [`Flash::init`]. Once the
//! FlexRAM is switched to its EEPROM function, byte writes into the EEPROM
//! window are absorbed by the controller, which signals completion of each
//! quick write through the EEERDY flag.

use crate::command::Command;
use crate::derivative::RESERVED_CODE;
use crate::error::{Error, Result};
use crate::flash::Flash;
use crate::regs::{opcode, Fcnfg, FlashIo, Fstat};

/// Function the FlexRAM block is mapped to.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlexRamFunction {
    /// Traditional RAM, also the staging buffer for section programming.
    Ram = 0xFF,
    /// EEPROM emulation window.
    Eeprom = 0x00,
}

impl<IO: FlashIo> Flash<IO> {
    /// Partition the FlexNVM block between D-Flash and EEPROM backup.
    ///
    /// `eeesize` is the EEPROM data set size code, `depart` the FlexNVM
    /// partition code; both are validated against the derivative's tables
    /// before the command is issued. On success the discovered sizes are
    /// refreshed, keeping the configuration in sync with the hardware.
    pub fn partition(&mut self, eeesize: u8, depart: u8) -> Result<()> {
        if self.dev.dflash_total == 0 {
            return Err(Error::EflashOnly);
        }
        if self.dev.eee_size_for(eeesize) == RESERVED_CODE {
            return Err(Error::EepromSize);
        }
        if self.dev.dflash_size_for(depart) == RESERVED_CODE {
            return Err(Error::EflashSize);
        }
        self.execute(
            Command::new(opcode::PROGRAM_PARTITION)
                .byte(4, eeesize)
                .byte(5, depart),
        )?;
        self.init()
    }

    /// Switch the FlexRAM between traditional RAM and the EEPROM window.
    pub fn set_flexram(&mut self, function: FlexRamFunction) -> Result<()> {
        if self.dev.eeram_size == 0 {
            return Err(Error::EflashOnly);
        }
        if function == FlexRamFunction::Eeprom && self.eee_size == 0 {
            return Err(Error::NoEeprom);
        }
        self.execute(Command::new(opcode::SET_FLEXRAM).byte(1, function as u8))
    }

    /// Write `data` into the EEPROM emulation window at `dest`, one quick
    /// write per byte, waiting for EEERDY between bytes.
    pub fn eee_write(&mut self, dest: u32, data: &[u8]) -> Result<()> {
        if self.dev.dflash_total == 0 {
            return Err(Error::EflashOnly);
        }
        if self.eee_size == 0 {
            return Err(Error::DflashOnly);
        }
        let base = self.dev.eeram_base;
        if dest < base || dest as u64 + data.len() as u64 > base as u64 + self.eee_size as u64 {
            return Err(Error::OutOfRange);
        }
        let map = self.map();
        if !self.io.test_reg(map.fcnfg, Fcnfg::EEERDY.bits()) {
            return Err(Error::NoEeprom);
        }

        for (i, &byte) in data.iter().enumerate() {
            self.io.write_mem(dest + i as u32, byte);
            self.wait_reg_set(map.fcnfg, Fcnfg::EEERDY.bits())?;
            self.decode_fstat()?;
            if self.io.test_reg(map.fstat, Fstat::RDCOLERR.bits()) {
                return Err(Error::ReadCollision);
            }
        }
        self.debug_trap();
        Ok(())
    }
}
