//! # Standard software driver for the Kinetis FTFx flash controller
//!
//! This crate drives the FTFA/FTFL/FTFE flash memory controllers found on
//! NXP (Freescale) Kinetis microcontrollers: sector and block erase,
//! longword/phrase/section programming, margin verify reads, protection and
//! security management, FlexNVM partitioning with EEPROM emulation, and the
//! dual-bank P-Flash swap used for fail-safe firmware updates.
//!
//! Every operation validates its address range in software, translates the
//! system address into the controller's internal address space and then runs
//! one or more commands through the FCCOB command sequencer. Derivative
//! differences (sector sizes, block layout, program unit, partition code
//! tables, register byte order) live in a single [`Derivative`] value chosen
//! at startup rather than in compile-time feature branching, so one binary
//! artifact of this crate serves the whole family.
//!
//! Register access goes through the [`FlashIo`] trait. On hardware that is
//! [`Mmio`], a raw volatile window over the controller's register base; in
//! tests it can be a simulated controller, which is how this crate tests the
//! command protocol on the host.
//!
//! # Usage
//!
//! ```no_run
//! use ftfx_hal::{Derivative, Flash, Margin, Mmio};
//!
//! # fn run() -> ftfx_hal::Result<()> {
//! // The FTFx register file sits at 0x4002_0000 on Kinetis parts.
//! let io = unsafe { Mmio::new(0x4002_0000) };
//! let mut flash = Flash::new(io, Derivative::mk64fn1m0());
//! flash.init()?;
//!
//! // Stage a firmware image: erase, program, margin-verify.
//! let image = [0u8; 256];
//! flash.erase(0x0004_0000, 0x1000)?;
//! flash.program(0x0004_0000, &image)?;
//! flash.program_check(0x0004_0000, &image, Margin::User)?;
//! # Ok(()) }
//! ```
//!
//! The completion busy-wait can yield to a periodic callback (for watchdog
//! service) and can be bounded with a poll budget; see [`Flash`].

#![no_std]

#[cfg(test)]
extern crate std;

pub mod address;
mod command;
pub mod derivative;
pub mod eeprom;
pub mod error;
pub mod flash;
pub mod ops;
mod protect;
pub mod regs;
#[cfg(test)]
mod sim;
pub mod swap;

pub use crate::address::DFLASH_INTERNAL_OFFSET;
pub use crate::derivative::{Derivative, ProgramUnit, RESERVED_CODE};
pub use crate::eeprom::FlexRamFunction;
pub use crate::error::{Error, Result};
pub use crate::flash::{Flash, PollCallback, ResourceSelect, SecurityState};
pub use crate::ops::{CheckFailure, Margin};
pub use crate::regs::{Endianness, FlashIo, Mmio};
pub use crate::swap::{SwapReport, SwapState};
