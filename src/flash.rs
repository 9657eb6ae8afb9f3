//! The flash driver core: configuration and the command sequencer.
//!
//! Every operation in this crate funnels through [`Flash::execute`], the one
//! synchronization point with the hardware. The sequencer waits for the
//! controller to go idle, clears the sticky error flags, loads the FCCOB
//! slots, pulses CCIF to launch, waits for completion and decodes FSTAT into
//! a typed error.
//!
//! The completion busy-wait is unbounded by default, matching the hardware
//! behaviour of the original driver. A poll budget can be configured to turn
//! a wedged controller into [`Error::CommandTimeout`] instead of a hang, and
//! an optional callback is invoked on every poll iteration so the caller can
//! service a watchdog while a long erase runs.

use crate::address::{self, Containment};
use crate::command::Command;
use crate::derivative::{Derivative, RESERVED_CODE};
use crate::error::{Error, Result};
use crate::regs::{
    self, opcode, Fcnfg, FlashIo, Fstat, RegisterMap, FSEC_KEYEN_ENABLED, FSEC_KEYEN_MASK,
    FSEC_SEC_MASK, FSEC_SEC_UNSECURE,
};

/// Callback invoked on every completion-poll iteration and periodically
/// during the checksum scan.
pub type PollCallback = fn();

/// Bytes summed between two callback invocations in [`Flash::check_sum`].
const CHECKSUM_CALLBACK_PERIOD: u32 = 0x400;

/// Resource selector for the read-resource command.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceSelect {
    /// Information row (factory data, partition configuration).
    Ifr = 0x00,
    /// Flash controller version ID.
    VersionId = 0x01,
}

/// Security state decoded from FSEC.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityState {
    Unsecured,
    SecuredBackdoorEnabled,
    SecuredBackdoorDisabled,
}

/// Driver handle for one FTFx controller.
///
/// Owns the register access ([`FlashIo`]) and the derivative descriptor.
/// The D-Flash and EEPROM sizes start out as the physical defaults and are
/// replaced by the values read back from the partition configuration once
/// [`Flash::init`] has run; a part may legitimately report zero D-Flash.
pub struct Flash<IO: FlashIo> {
    pub(crate) io: IO,
    pub(crate) dev: Derivative,
    pub(crate) dflash_size: u32,
    pub(crate) eee_size: u32,
    pub(crate) callback: Option<PollCallback>,
    pub(crate) poll_limit: Option<u32>,
    debug: bool,
}

impl<IO: FlashIo> Flash<IO> {
    pub fn new(io: IO, dev: Derivative) -> Self {
        Flash {
            io,
            dev,
            dflash_size: dev.dflash_total,
            eee_size: 0,
            callback: None,
            poll_limit: None,
            debug: false,
        }
    }

    /// Discover the FlexNVM partitioning and record the effective D-Flash
    /// and EEPROM sizes.
    ///
    /// On program-flash-only derivatives both sizes are forced to zero
    /// without touching the controller. Otherwise the partition longword is
    /// read from the D-Flash IFR: its low byte carries the EEPROM data set
    /// size code, the next byte the FlexNVM partition code. Reserved codes
    /// (a fresh, never-partitioned part reads back all-ones) fall back to
    /// the full physical D-Flash and no EEPROM.
    pub fn init(&mut self) -> Result<()> {
        if self.dev.dflash_total == 0 {
            self.dflash_size = 0;
            self.eee_size = 0;
            return Ok(());
        }

        let mut data = [0u8; 8];
        let unit = self.dev.program_unit.bytes() as usize;
        self.read_resource(
            self.dev.partition_ifr_address,
            ResourceSelect::Ifr,
            &mut data[..unit],
        )?;

        let word = regs::decode_u32(self.dev.endianness, [data[0], data[1], data[2], data[3]]);
        let eee_code = (word & 0x0F) as u8;
        let depart_code = ((word >> 8) & 0x0F) as u8;

        self.dflash_size = match self.dev.dflash_size_for(depart_code) {
            RESERVED_CODE => self.dev.dflash_total,
            size => size,
        };
        self.eee_size = match self.dev.eee_size_for(eee_code) {
            RESERVED_CODE => 0,
            size => size,
        };
        Ok(())
    }

    /// Register the callback invoked while waiting for command completion.
    pub fn set_callback(&mut self, callback: Option<PollCallback>) {
        self.callback = callback;
    }

    /// Bound the completion busy-wait to `limit` poll iterations.
    ///
    /// `None` (the default) waits forever, like the hardware driver this
    /// crate reimplements; a wedged controller then hangs the caller.
    pub fn set_poll_limit(&mut self, limit: Option<u32>) {
        self.poll_limit = limit;
    }

    /// Trap into the debugger at the end of every hardware operation.
    pub fn set_debug_trap(&mut self, enable: bool) {
        self.debug = enable;
    }

    pub fn derivative(&self) -> &Derivative {
        &self.dev
    }

    /// Effective D-Flash size, as discovered by [`Flash::init`].
    pub fn dflash_size(&self) -> u32 {
        self.dflash_size
    }

    /// Configured EEPROM emulation size, as discovered by [`Flash::init`].
    pub fn eeprom_size(&self) -> u32 {
        self.eee_size
    }

    /// Whether no command is currently executing (CCIF set).
    pub fn command_idle(&self) -> bool {
        self.io.test_reg(self.map().fstat, Fstat::CCIF.bits())
    }

    /// Release the register accessor.
    pub fn release(self) -> IO {
        self.io
    }

    pub(crate) fn map(&self) -> &'static RegisterMap {
        self.dev.endianness.register_map()
    }

    /// Run one command through the FCCOB register file.
    ///
    /// Not reentrant; the controller's register file is a single physical
    /// resource and at most one caller may be mid-sequence.
    pub(crate) fn execute(&mut self, cmd: Command) -> Result<()> {
        let map = self.map();

        // Any previously launched command must have finished.
        self.wait_ccif()?;

        // Sticky error flags are write-1-to-clear and must be clear before
        // a new command is launched.
        self.io.write_reg(
            map.fstat,
            (Fstat::RDCOLERR | Fstat::ACCERR | Fstat::FPVIOL).bits(),
        );

        for (slot, &byte) in cmd.slots().iter().enumerate() {
            self.io.write_reg(map.fccob[slot], byte);
        }

        // Clearing CCIF launches the command.
        self.io.write_reg(map.fstat, Fstat::CCIF.bits());

        let result = self.wait_ccif().and_then(|()| self.decode_fstat());
        self.debug_trap();
        result
    }

    /// Busy-wait until CCIF is set, yielding to the callback on every poll.
    pub(crate) fn wait_ccif(&mut self) -> Result<()> {
        let fstat = self.map().fstat;
        self.wait_reg_set(fstat, Fstat::CCIF.bits())
    }

    pub(crate) fn wait_reg_set(&mut self, offset: u32, mask: u8) -> Result<()> {
        let mut polls: u32 = 0;
        while !self.io.test_reg(offset, mask) {
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
        Ok(())
    }

    /// Decode FSTAT after completion. Priority is fixed: an access error
    /// outranks a protection violation, which outranks a margin failure.
    pub(crate) fn decode_fstat(&self) -> Result<()> {
        let fstat = Fstat::from_bits_truncate(self.io.read_reg(self.map().fstat));
        if fstat.contains(Fstat::ACCERR) {
            Err(Error::AccessError)
        } else if fstat.contains(Fstat::FPVIOL) {
            Err(Error::ProtectionViolation)
        } else if fstat.contains(Fstat::MGSTAT0) {
            Err(Error::Uncorrectable)
        } else {
            Ok(())
        }
    }

    pub(crate) fn debug_trap(&self) {
        if self.debug {
            #[cfg(all(target_arch = "arm", target_os = "none"))]
            cortex_m::asm::bkpt();
        }
    }

    /// Read `out.len()` bytes from a controller-internal resource address
    /// (IFR or version ID space). The buffer length must match the
    /// derivative's read unit (4 bytes on longword parts, 8 on phrase
    /// parts) and the address must be aligned to it.
    pub fn read_resource(
        &mut self,
        resource_address: u32,
        select: ResourceSelect,
        out: &mut [u8],
    ) -> Result<()> {
        let unit = self.dev.program_unit.bytes();
        if out.len() as u32 != unit {
            return Err(Error::SizeMisaligned);
        }
        address::check_alignment(resource_address, 0, unit)?;

        let cmd = Command::new(opcode::READ_RESOURCE)
            .address(resource_address)
            .byte(8, select as u8);
        self.execute(cmd)?;

        let map = self.map();
        for (i, byte) in out.iter_mut().enumerate() {
            *byte = self.io.read_reg(map.fccob[4 + i]);
        }
        Ok(())
    }

    /// Current security state, decoded from FSEC.
    pub fn security_state(&self) -> SecurityState {
        let fsec = self.io.read_reg(self.map().fsec);
        if fsec & FSEC_SEC_MASK == FSEC_SEC_UNSECURE {
            SecurityState::Unsecured
        } else if fsec & FSEC_KEYEN_MASK == FSEC_KEYEN_ENABLED {
            SecurityState::SecuredBackdoorEnabled
        } else {
            SecurityState::SecuredBackdoorDisabled
        }
    }

    /// Submit the backdoor key to temporarily unsecure the part.
    ///
    /// A no-op on a part that is already unsecured.
    pub fn security_bypass(&mut self, key: &[u8; 8]) -> Result<()> {
        if self.security_state() == SecurityState::Unsecured {
            self.debug_trap();
            return Ok(());
        }
        self.execute(Command::new(opcode::SECURITY_BYPASS).data(4, key))
    }

    /// Request suspension of an in-progress sector erase and wait for the
    /// controller to go idle. A no-op when no command is running.
    pub fn erase_suspend(&mut self) -> Result<()> {
        let map = self.map();
        let result = if !self.io.test_reg(map.fstat, Fstat::CCIF.bits()) {
            self.io.set_reg_bits(map.fcnfg, Fcnfg::ERSSUSP.bits());
            self.wait_ccif()
        } else {
            Ok(())
        };
        self.debug_trap();
        result
    }

    /// Resume a suspended sector erase and wait for it to finish.
    /// A no-op when no erase is suspended.
    pub fn erase_resume(&mut self) -> Result<()> {
        let map = self.map();
        let result = if self.io.test_reg(map.fcnfg, Fcnfg::ERSSUSP.bits()) {
            // Relaunch the suspended command.
            self.io.write_reg(map.fstat, Fstat::CCIF.bits());
            self.wait_ccif().and_then(|()| self.decode_fstat())
        } else {
            Ok(())
        };
        self.debug_trap();
        result
    }

    /// Sum a flash range byte-wise, yielding to the callback periodically.
    pub fn check_sum(&mut self, dest: u32, size: u32) -> Result<u32> {
        address::translate(&self.dev, self.dflash_size, dest, size, Containment::Whole)?;

        let mut sum: u32 = 0;
        let mut stride: u32 = 0;
        for offset in 0..size {
            sum = sum.wrapping_add(self.io.read_mem(dest + offset) as u32);
            stride += 1;
            if stride == CHECKSUM_CALLBACK_PERIOD {
                stride = 0;
                if let Some(callback) = self.callback {
                    callback();
                }
            }
        }
        self.debug_trap();
        Ok(sum)
    }
}
