//! P-Flash bank swap.
//!
//! Dual-bank derivatives can atomically exchange which P-Flash bank is
//! mapped at address zero, keyed off a swap indicator phrase in the lower
//! bank. The swap system lives entirely in hardware; the host drives it
//! through swap-control subcommands and only observes the reported state:
//!
//! Uninitialized -> Ready -> Update -> UpdateErased -> Complete
//!
//! The Update -> UpdateErased edge is taken by hardware once the sector
//! holding the indicator copy in the *non-active* bank has been erased.
//! After Complete, the next reset boots from the other bank.

use crate::command::Command;
use crate::error::{Error, Result};
use crate::flash::Flash;
use crate::regs::{opcode, FlashIo};

const SWAP_SET_INDICATOR_ADDR: u8 = 0x01;
const SWAP_SET_IN_PREPARE: u8 = 0x02;
const SWAP_SET_IN_COMPLETE: u8 = 0x04;
const SWAP_REPORT_STATUS: u8 = 0x08;

/// The flash configuration field; the swap indicator must stay clear of it.
const CONFIG_FIELD_START: u32 = 0x400;
const CONFIG_FIELD_END: u32 = 0x410;

/// Swap system state as reported by the controller.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapState {
    Uninitialized = 0x00,
    Ready = 0x01,
    Update = 0x02,
    UpdateErased = 0x03,
    Complete = 0x04,
}

impl SwapState {
    fn from_code(code: u8) -> Result<SwapState> {
        match code {
            0x00 => Ok(SwapState::Uninitialized),
            0x01 => Ok(SwapState::Ready),
            0x02 => Ok(SwapState::Update),
            0x03 => Ok(SwapState::UpdateErased),
            0x04 => Ok(SwapState::Complete),
            _ => Err(Error::AccessError),
        }
    }
}

/// Swap status returned by the report-status subcommand.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapReport {
    pub state: SwapState,
    /// Block currently mapped at the bottom of the address space.
    pub current_block: u8,
    /// Block that will be active after the swap completes.
    pub next_block: u8,
}

impl<IO: FlashIo> Flash<IO> {
    /// Query the swap system without changing its state.
    pub fn swap_report(&mut self, address: u32) -> Result<SwapReport> {
        let internal = self.swap_indicator_internal(address)?;
        self.swap_control(internal, SWAP_REPORT_STATUS)
    }

    /// Drive a complete bank swap keyed off the indicator at `address`.
    ///
    /// Walks the swap system from whatever state it is in to `Complete`,
    /// erasing the indicator sector of the non-active bank on the way when
    /// the hardware has not already observed that erase. Any failing
    /// subcommand aborts immediately, leaving the swap state wherever the
    /// hardware left it; there is no rollback.
    pub fn swap(&mut self, address: u32) -> Result<()> {
        let internal = self.swap_indicator_internal(address)?;
        let mut report = self.swap_control(internal, SWAP_REPORT_STATUS)?;

        if report.state == SwapState::Uninitialized {
            self.swap_control(internal, SWAP_SET_INDICATOR_ADDR)?;
            report = self.poll_swap(internal, |state| state != SwapState::Uninitialized)?;
        }

        if report.state == SwapState::Ready {
            self.swap_control(internal, SWAP_SET_IN_PREPARE)?;
            report = self.poll_swap(internal, |state| state != SwapState::Ready)?;
        }

        if report.state == SwapState::Update || report.state == SwapState::UpdateErased {
            if report.state == SwapState::Update {
                self.erase_inactive_indicator_sector(address, internal)?;
            }
            self.swap_control(internal, SWAP_SET_IN_COMPLETE)?;
            self.poll_swap(internal, |state| state == SwapState::Complete)?;
        }
        Ok(())
    }

    /// Erase the sector holding the indicator copy in the non-active bank.
    /// The indicator sits in the lower half of the address space, its copy
    /// one bank size above.
    fn erase_inactive_indicator_sector(&mut self, address: u32, internal: u32) -> Result<()> {
        let bank = self.dev.pflash_size / 2;
        let sector = self.dev.pflash_sector_size;
        let copy_internal = internal + bank;
        self.erase(address + bank - copy_internal % sector, sector)
    }

    fn swap_control(&mut self, internal: u32, control: u8) -> Result<SwapReport> {
        self.execute(
            Command::new(opcode::PFLASH_SWAP)
                .address(internal)
                .byte(4, control),
        )?;
        let map = self.map();
        Ok(SwapReport {
            state: SwapState::from_code(self.io.read_reg(map.fccob[5]))?,
            current_block: self.io.read_reg(map.fccob[6]),
            next_block: self.io.read_reg(map.fccob[7]),
        })
    }

    /// Re-query the swap state until `done` holds, within the poll budget.
    fn poll_swap(
        &mut self,
        internal: u32,
        done: impl Fn(SwapState) -> bool,
    ) -> Result<SwapReport> {
        let mut polls: u32 = 0;
        loop {
            let report = self.swap_control(internal, SWAP_REPORT_STATUS)?;
            if done(report.state) {
                return Ok(report);
            }
            if let Some(callback) = self.callback {
                callback();
            }
            if let Some(limit) = self.poll_limit {
                polls += 1;
                if polls >= limit {
                    return Err(Error::CommandTimeout);
                }
            }
        }
    }

    /// Validate the indicator address: swap-capable part, program-unit
    /// aligned, inside bank 0 and clear of the flash configuration field.
    fn swap_indicator_internal(&self, address: u32) -> Result<u32> {
        if !self.dev.has_swap {
            return Err(Error::AccessError);
        }
        crate::address::check_alignment(address, 0, self.dev.program_unit.bytes())?;

        let base = self.dev.pflash_base;
        let bank = self.dev.pflash_size / 2;
        if address < base || address >= base + bank {
            return Err(Error::OutOfRange);
        }
        let internal = address - base;
        if internal >= CONFIG_FIELD_START && internal < CONFIG_FIELD_END {
            return Err(Error::OutOfRange);
        }
        Ok(internal)
    }
}
