//! Erase, program and verify operation wrappers.
//!
//! Each wrapper validates alignment and range in software, translates the
//! destination into the controller's internal address space and delegates to
//! the command sequencer, one command per sector or program unit. Loops stop
//! at the first failing unit and propagate its error; completed units stay
//! committed.

use crate::address::{self, is_dflash, Containment};
use crate::command::Command;
use crate::derivative::ProgramUnit;
use crate::error::{Error, Result};
use crate::flash::Flash;
use crate::regs::{self, opcode, FlashIo};

/// Read margin level for verify and program-check commands.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Margin {
    Normal = 0x00,
    User = 0x01,
    Factory = 0x02,
}

/// Failure details captured by [`Flash::program_check`].
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckFailure {
    pub error: Error,
    /// System address of the first failing longword.
    pub address: u32,
    /// Data read back from the FCCOB data slots for the failing longword;
    /// all zeroes when the failure precedes any command.
    pub data: [u8; 4],
}

impl From<CheckFailure> for Error {
    fn from(failure: CheckFailure) -> Error {
        failure.error
    }
}

impl<IO: FlashIo> Flash<IO> {
    /// Erase `size` bytes of flash starting at `dest`, one sector at a time.
    ///
    /// Both `dest` and `size` must be multiples of the containing region's
    /// sector size and the range must lie within a single flash block.
    pub fn erase(&mut self, dest: u32, size: u32) -> Result<()> {
        let internal = address::translate(
            &self.dev,
            self.dflash_size,
            dest,
            size,
            Containment::Whole,
        )?;
        let sector = self.sector_size(internal);
        address::check_alignment(internal, size, sector)?;

        let mut offset = 0;
        while offset < size {
            self.execute(Command::new(opcode::ERASE_SECTOR).address(internal + offset))?;
            offset += sector;
        }
        Ok(())
    }

    /// Erase the sector containing `address`.
    pub fn sector_erase(&mut self, address: u32) -> Result<()> {
        let internal = address::translate(
            &self.dev,
            self.dflash_size,
            address,
            0,
            Containment::StartOnly,
        )?;
        let sector = self.sector_size(internal);
        self.erase(address - internal % sector, sector)
    }

    /// Erase one whole flash block.
    pub fn erase_block(&mut self, address: u32) -> Result<()> {
        let internal = address::translate(
            &self.dev,
            self.dflash_size,
            address,
            0,
            Containment::StartOnly,
        )?;
        let block = self.block_size(internal);
        address::check_alignment(internal, 0, block)?;
        self.execute(Command::new(opcode::ERASE_BLOCK).address(internal))
    }

    /// Erase every flash block, including the FlexNVM partition
    /// configuration. Fails with a protection violation if any region is
    /// protected.
    pub fn erase_all_blocks(&mut self) -> Result<()> {
        self.execute(Command::new(opcode::ERASE_ALL_BLOCKS))
    }

    /// Erase every block and release security once the erase verifies.
    pub fn erase_all_blocks_unsecure(&mut self) -> Result<()> {
        self.execute(Command::new(opcode::ERASE_ALL_BLOCKS_UNSECURE))
    }

    /// Full chip erase followed by re-discovery of the (now gone)
    /// partitioning; the bootloader entry point.
    pub fn erase_chip(&mut self) -> Result<()> {
        self.erase_all_blocks()?;
        self.init()
    }

    /// Program `data` at `dest`, one longword or phrase per command
    /// depending on the derivative's controller.
    pub fn program(&mut self, dest: u32, data: &[u8]) -> Result<()> {
        let unit = self.dev.program_unit.bytes();
        let size = data.len() as u32;
        address::check_alignment(dest, size, unit)?;
        let internal = address::translate(
            &self.dev,
            self.dflash_size,
            dest,
            size,
            Containment::Whole,
        )?;

        let op = match self.dev.program_unit {
            ProgramUnit::Longword => opcode::PROGRAM_LONGWORD,
            ProgramUnit::Phrase => opcode::PROGRAM_PHRASE,
        };
        for (i, chunk) in data.chunks_exact(unit as usize).enumerate() {
            let offset = i as u32 * unit;
            self.execute(Command::new(op).address(internal + offset).data(4, chunk))?;
        }
        Ok(())
    }

    /// Program a single longword. Only valid on longword-programming
    /// (FTFA/FTFL) derivatives.
    pub fn program_longword(&mut self, dest: u32, value: u32) -> Result<()> {
        if self.dev.program_unit != ProgramUnit::Longword {
            return Err(Error::AccessError);
        }
        address::check_alignment(dest, 0, 4)?;
        let internal =
            address::translate(&self.dev, self.dflash_size, dest, 4, Containment::Whole)?;
        let bytes = regs::encode_u32(self.dev.endianness, value);
        self.execute(
            Command::new(opcode::PROGRAM_LONGWORD)
                .address(internal)
                .data(4, &bytes),
        )
    }

    /// Program a single phrase. Only valid on phrase-programming (FTFE)
    /// derivatives.
    pub fn program_phrase(&mut self, dest: u32, value: u64) -> Result<()> {
        if self.dev.program_unit != ProgramUnit::Phrase {
            return Err(Error::AccessError);
        }
        address::check_alignment(dest, 0, 8)?;
        let internal =
            address::translate(&self.dev, self.dflash_size, dest, 8, Containment::Whole)?;
        let bytes = regs::encode_u64(self.dev.endianness, value);
        self.execute(
            Command::new(opcode::PROGRAM_PHRASE)
                .address(internal)
                .data(4, &bytes),
        )
    }

    /// Program `data` in one command, staged through the FlexRAM section
    /// buffer. Faster than unit-wise programming for large images, but the
    /// data must fit the FlexRAM and the FlexRAM must currently be mapped
    /// as traditional RAM.
    pub fn program_section(&mut self, dest: u32, data: &[u8]) -> Result<()> {
        if !self.dev.has_program_section {
            return Err(Error::AccessError);
        }
        let unit = self.dev.program_unit.bytes();
        let size = data.len() as u32;
        address::check_alignment(dest, size, unit)?;
        if size == 0 || size > self.dev.eeram_size {
            return Err(Error::OutOfRange);
        }
        let internal = address::translate(
            &self.dev,
            self.dflash_size,
            dest,
            size,
            Containment::Whole,
        )?;
        if !self
            .io
            .test_reg(self.map().fcnfg, regs::Fcnfg::RAMRDY.bits())
        {
            return Err(Error::FlexRamNotReady);
        }

        for (i, &byte) in data.iter().enumerate() {
            self.io.write_mem(self.dev.eeram_base + i as u32, byte);
        }
        self.execute(
            Command::new(opcode::PROGRAM_SECTION)
                .address(internal)
                .halfword(4, (size / unit) as u16),
        )
    }

    /// Program one once-only program-once record. `data` must be exactly
    /// one program unit long and the record must still be blank.
    pub fn program_once(&mut self, record: u8, data: &[u8]) -> Result<()> {
        if data.len() as u32 != self.dev.program_unit.bytes() {
            return Err(Error::SizeMisaligned);
        }
        self.execute(
            Command::new(opcode::PROGRAM_ONCE)
                .byte(1, record)
                .data(4, data),
        )
    }

    /// Read back one program-once record into `out` (one program unit).
    pub fn read_once(&mut self, record: u8, out: &mut [u8]) -> Result<()> {
        if out.len() as u32 != self.dev.program_unit.bytes() {
            return Err(Error::SizeMisaligned);
        }
        self.execute(Command::new(opcode::READ_ONCE).byte(1, record))?;
        let map = self.map();
        for (i, byte) in out.iter_mut().enumerate() {
            *byte = self.io.read_reg(map.fccob[4 + i]);
        }
        Ok(())
    }

    /// Margin read of every flash block.
    pub fn verify_all_blocks(&mut self, margin: Margin) -> Result<()> {
        self.execute(Command::new(opcode::VERIFY_ALL_BLOCKS).byte(1, margin as u8))
    }

    /// Margin read of the block containing `address`.
    pub fn verify_block(&mut self, address: u32, margin: Margin) -> Result<()> {
        let internal = address::translate(
            &self.dev,
            self.dflash_size,
            address,
            0,
            Containment::StartOnly,
        )?;
        let block = self.block_size(internal);
        address::check_alignment(internal, 0, block)?;
        self.execute(
            Command::new(opcode::VERIFY_BLOCK)
                .address(internal)
                .byte(4, margin as u8),
        )
    }

    /// Margin read of `units` program units starting at `address`.
    pub fn verify_section(&mut self, address: u32, units: u16, margin: Margin) -> Result<()> {
        let unit = self.dev.program_unit.bytes();
        address::check_alignment(address, 0, unit)?;
        let internal = address::translate(
            &self.dev,
            self.dflash_size,
            address,
            0,
            Containment::StartOnly,
        )?;
        self.execute(
            Command::new(opcode::VERIFY_SECTION)
                .address(internal)
                .halfword(4, units)
                .byte(6, margin as u8),
        )
    }

    /// Compare programmed flash against `expected` at the given margin,
    /// one longword per command.
    ///
    /// On the first failing longword, returns its system address and the
    /// data bytes the controller reports back through the FCCOB slots.
    pub fn program_check(
        &mut self,
        dest: u32,
        expected: &[u8],
        margin: Margin,
    ) -> core::result::Result<(), CheckFailure> {
        let early = |error| CheckFailure {
            error,
            address: dest,
            data: [0; 4],
        };
        let size = expected.len() as u32;
        address::check_alignment(dest, size, 4).map_err(early)?;
        let internal =
            address::translate(&self.dev, self.dflash_size, dest, size, Containment::Whole)
                .map_err(early)?;

        for (i, chunk) in expected.chunks_exact(4).enumerate() {
            let offset = i as u32 * 4;
            let cmd = Command::new(opcode::PROGRAM_CHECK)
                .address(internal + offset)
                .byte(4, margin as u8)
                .data(8, chunk);
            if let Err(error) = self.execute(cmd) {
                let map = self.map();
                let mut data = [0u8; 4];
                for (j, byte) in data.iter_mut().enumerate() {
                    *byte = self.io.read_reg(map.fccob[4 + j]);
                }
                return Err(CheckFailure {
                    error,
                    address: dest + offset,
                    data,
                });
            }
        }
        Ok(())
    }

    /// Copy `buf.len()` bytes of flash starting at `address` into `buf`.
    pub fn read(&self, address: u32, buf: &mut [u8]) -> Result<()> {
        address::translate(
            &self.dev,
            self.dflash_size,
            address,
            buf.len() as u32,
            Containment::Whole,
        )?;
        for (i, byte) in buf.iter_mut().enumerate() {
            *byte = self.io.read_mem(address + i as u32);
        }
        Ok(())
    }

    fn sector_size(&self, internal: u32) -> u32 {
        if is_dflash(internal) {
            self.dev.dflash_sector_size
        } else {
            self.dev.pflash_sector_size
        }
    }

    fn block_size(&self, internal: u32) -> u32 {
        if is_dflash(internal) {
            self.dflash_size
        } else {
            self.dev.pflash_block_size()
        }
    }
}
