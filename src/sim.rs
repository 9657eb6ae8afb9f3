//! Behavioural FTFx controller simulator for host tests.
//!
//! Implements [`FlashIo`] over an in-memory register file and flash arrays,
//! executing commands when CCIF is pulsed: the same launch protocol, sticky
//! write-1-to-clear error flags, protection-register write rules and swap
//! state transitions the hardware shows the driver. Failure injection covers
//! the paths a real part only takes under fault conditions: arbitrary FSTAT
//! flags on the n-th command, and a hung controller that never completes.

use std::vec;
use std::vec::Vec;

use crate::address::DFLASH_INTERNAL_OFFSET;
use crate::derivative::Derivative;
use crate::regs::{self, opcode, Fcnfg, FlashIo, Fstat, FSEC_SEC_MASK, FSEC_SEC_UNSECURE};

const ACCERR: u8 = 0x20;
const MGSTAT0: u8 = 0x01;

/// Version ID returned for read-resource with the version selector.
pub(crate) const VERSION_ID: [u8; 8] = [0x14, 0x01, 0x00, 0x00, 0x04, 0x00, 0x01, 0x00];

const ONCE_RECORDS: usize = 64;

pub(crate) struct SimFtfx {
    regs: [u8; 0x18],
    dev: Derivative,
    pflash: Vec<u8>,
    dflash: Vec<u8>,
    eeram: Vec<u8>,
    once: Vec<u8>,

    /// Never complete a launched command (CCIF stays clear).
    pub hang: bool,
    /// Accept any protection-register write (probe reads back all-ones).
    pub protection_special_mode: bool,
    pub backdoor_key: [u8; 8],

    /// Commands launched so far.
    pub commands_run: u32,
    /// Register writes observed, to assert that validation failures leave
    /// the hardware untouched.
    pub reg_writes: u32,
    /// Internal addresses of executed sector erases.
    pub erase_log: Vec<u32>,

    fail_command: Option<u32>,
    fail_flags: u8,

    swap_state: u8,
    swap_indicator: u32,
    eee_code: u8,
    depart_code: u8,
}

impl SimFtfx {
    pub fn new(dev: Derivative) -> Self {
        let map = dev.endianness.register_map();
        let mut regs = [0u8; 0x18];
        regs[map.fstat as usize] = Fstat::CCIF.bits();
        regs[map.fsec as usize] = FSEC_SEC_UNSECURE;
        if dev.eeram_size > 0 {
            regs[map.fcnfg as usize] = Fcnfg::RAMRDY.bits();
        }
        for i in 0..4 {
            regs[map.fprot[i] as usize] = 0xFF;
        }
        regs[map.fdprot as usize] = 0xFF;
        regs[map.feprot as usize] = 0xFF;

        SimFtfx {
            regs,
            dev,
            pflash: vec![0xFF; dev.pflash_size as usize],
            dflash: vec![0xFF; dev.dflash_total as usize],
            eeram: vec![0xFF; dev.eeram_size as usize],
            once: vec![0xFF; ONCE_RECORDS * 8],
            hang: false,
            protection_special_mode: false,
            backdoor_key: [1, 2, 3, 4, 5, 6, 7, 8],
            commands_run: 0,
            reg_writes: 0,
            erase_log: Vec::new(),
            fail_command: None,
            fail_flags: 0,
            swap_state: 0,
            swap_indicator: 0,
            eee_code: 0x0F,
            depart_code: 0x0F,
        }
    }

    /// Complete the next command with the given FSTAT error flags.
    pub fn fail_next(&mut self, flags: u8) {
        self.fail_at(self.commands_run + 1, flags);
    }

    /// Complete command number `n` (1-based) with the given FSTAT flags.
    pub fn fail_at(&mut self, n: u32, flags: u8) {
        self.fail_command = Some(n);
        self.fail_flags = flags;
    }

    /// Set the partition codes read back from the D-Flash IFR.
    pub fn set_partition(&mut self, eee_code: u8, depart_code: u8) {
        self.eee_code = eee_code & 0x0F;
        self.depart_code = depart_code & 0x0F;
    }

    pub fn set_fsec(&mut self, value: u8) {
        let fsec = self.map().fsec as usize;
        self.regs[fsec] = value;
    }

    pub fn fccob(&self, slot: usize) -> u8 {
        self.regs[self.map().fccob[slot] as usize]
    }

    pub fn set_flexram_eeprom(&mut self) {
        let fcnfg = self.map().fcnfg as usize;
        self.regs[fcnfg] = (self.regs[fcnfg] | Fcnfg::EEERDY.bits()) & !Fcnfg::RAMRDY.bits();
    }

    pub fn eeram_bytes(&self, offset: usize, len: usize) -> Vec<u8> {
        self.eeram[offset..offset + len].to_vec()
    }

    pub fn set_pflash_protection_raw(&mut self, value: u32) {
        let map = self.map();
        for (i, byte) in value.to_be_bytes().iter().enumerate() {
            self.regs[map.fprot[i] as usize] = *byte;
        }
    }

    pub fn set_fdprot_raw(&mut self, value: u8) {
        let fdprot = self.map().fdprot as usize;
        self.regs[fdprot] = value;
    }

    /// Pretend a command is in flight.
    pub fn force_busy(&mut self) {
        let fstat = self.map().fstat as usize;
        self.regs[fstat] &= !Fstat::CCIF.bits();
    }

    pub fn force_swap_state(&mut self, state: u8, indicator: u32) {
        self.swap_state = state;
        self.swap_indicator = indicator;
    }

    fn map(&self) -> &'static regs::RegisterMap {
        self.dev.endianness.register_map()
    }

    fn launch(&mut self) {
        if self.hang {
            return;
        }
        self.commands_run += 1;
        let fstat = self.map().fstat as usize;
        self.regs[fstat] &= !MGSTAT0;

        let flags = if self.fail_command == Some(self.commands_run) {
            self.fail_command = None;
            self.fail_flags
        } else {
            match self.run() {
                Ok(()) => 0,
                Err(flags) => flags,
            }
        };
        self.regs[fstat] |= flags | Fstat::CCIF.bits();
    }

    fn run(&mut self) -> Result<(), u8> {
        let op = self.fccob(0);
        let addr =
            u32::from_be_bytes([0, self.fccob(1), self.fccob(2), self.fccob(3)]);
        match op {
            opcode::ERASE_SECTOR => self.erase_sector(addr),
            opcode::ERASE_BLOCK => self.erase_block(addr),
            opcode::ERASE_ALL_BLOCKS => self.erase_all(false),
            opcode::ERASE_ALL_BLOCKS_UNSECURE => self.erase_all(true),
            opcode::PROGRAM_LONGWORD => self.program(addr, 4),
            opcode::PROGRAM_PHRASE => self.program(addr, 8),
            opcode::PROGRAM_SECTION => self.program_section(addr),
            opcode::PROGRAM_CHECK => self.program_check(addr),
            opcode::READ_RESOURCE => self.read_resource(addr),
            opcode::PROGRAM_ONCE => self.program_once(),
            opcode::READ_ONCE => self.read_once(),
            opcode::VERIFY_BLOCK => self.verify_block(addr),
            opcode::VERIFY_SECTION => self.verify_section(addr),
            opcode::VERIFY_ALL_BLOCKS => self.verify_all(),
            opcode::SECURITY_BYPASS => self.security_bypass(),
            opcode::PFLASH_SWAP => self.swap_control(addr),
            opcode::PROGRAM_PARTITION => {
                self.eee_code = self.fccob(4) & 0x0F;
                self.depart_code = self.fccob(5) & 0x0F;
                Ok(())
            }
            opcode::SET_FLEXRAM => self.set_flexram(),
            _ => Err(ACCERR),
        }
    }

    fn region(&mut self, internal: u32, len: u32) -> Result<&mut [u8], u8> {
        let (array, start) = if internal < DFLASH_INTERNAL_OFFSET {
            (&mut self.pflash, internal as usize)
        } else {
            (&mut self.dflash, (internal - DFLASH_INTERNAL_OFFSET) as usize)
        };
        let end = start + len as usize;
        if end <= array.len() {
            Ok(&mut array[start..end])
        } else {
            Err(ACCERR)
        }
    }

    fn sector_size(&self, internal: u32) -> u32 {
        if internal < DFLASH_INTERNAL_OFFSET {
            self.dev.pflash_sector_size
        } else {
            self.dev.dflash_sector_size
        }
    }

    fn erase_sector(&mut self, internal: u32) -> Result<(), u8> {
        let sector = self.sector_size(internal);
        if sector == 0 || internal % sector != 0 {
            return Err(ACCERR);
        }
        self.region(internal, sector)?.fill(0xFF);
        self.erase_log.push(internal);

        // The swap system watches for the erase of the indicator copy in
        // the non-active bank.
        if self.swap_state == 0x02 {
            let copy = self.swap_indicator + self.dev.pflash_size / 2;
            if copy >= internal && copy < internal + sector {
                self.swap_state = 0x03;
            }
        }
        Ok(())
    }

    fn erase_block(&mut self, internal: u32) -> Result<(), u8> {
        let block = if internal < DFLASH_INTERNAL_OFFSET {
            self.dev.pflash_block_size()
        } else {
            self.dev.dflash_total
        };
        if block == 0 || internal % block != 0 {
            return Err(ACCERR);
        }
        self.region(internal, block)?.fill(0xFF);
        Ok(())
    }

    fn erase_all(&mut self, unsecure: bool) -> Result<(), u8> {
        self.pflash.fill(0xFF);
        self.dflash.fill(0xFF);
        self.eee_code = 0x0F;
        self.depart_code = 0x0F;
        self.swap_state = 0;
        if unsecure {
            let fsec = self.map().fsec as usize;
            self.regs[fsec] = (self.regs[fsec] & !FSEC_SEC_MASK) | FSEC_SEC_UNSECURE;
        }
        Ok(())
    }

    fn program(&mut self, internal: u32, unit: u32) -> Result<(), u8> {
        if unit != self.dev.program_unit.bytes() || internal % unit != 0 {
            return Err(ACCERR);
        }
        let data: Vec<u8> = (0..unit as usize).map(|i| self.fccob(4 + i)).collect();
        let slice = self.region(internal, unit)?;
        for (byte, value) in slice.iter_mut().zip(data) {
            // NOR programming can only clear bits.
            *byte &= value;
        }
        Ok(())
    }

    fn program_section(&mut self, internal: u32) -> Result<(), u8> {
        let unit = self.dev.program_unit.bytes();
        let units = u16::from_be_bytes([self.fccob(4), self.fccob(5)]) as u32;
        let len = units * unit;
        if internal % unit != 0 || len == 0 || len > self.dev.eeram_size {
            return Err(ACCERR);
        }
        let staged = self.eeram[..len as usize].to_vec();
        let slice = self.region(internal, len)?;
        for (byte, value) in slice.iter_mut().zip(staged) {
            *byte &= value;
        }
        Ok(())
    }

    fn program_check(&mut self, internal: u32) -> Result<(), u8> {
        if internal % 4 != 0 {
            return Err(ACCERR);
        }
        let actual = self.region(internal, 4)?.to_vec();
        let expected: Vec<u8> = (0..4).map(|i| self.fccob(8 + i)).collect();
        if actual != expected {
            let map = self.map();
            for (i, byte) in actual.iter().enumerate() {
                self.regs[map.fccob[4 + i] as usize] = *byte;
            }
            return Err(MGSTAT0);
        }
        Ok(())
    }

    fn read_resource(&mut self, internal: u32) -> Result<(), u8> {
        let unit = self.dev.program_unit.bytes() as usize;
        let select = self.fccob(8);
        let mut data = [0xFFu8; 8];
        match select {
            0x00 if self.dev.dflash_total > 0 && internal == self.dev.partition_ifr_address => {
                let word = (self.depart_code as u32) << 8 | self.eee_code as u32;
                data[..4].copy_from_slice(&regs::encode_u32(self.dev.endianness, word));
            }
            0x01 => data.copy_from_slice(&VERSION_ID),
            _ => return Err(ACCERR),
        }
        let map = self.map();
        for (i, byte) in data[..unit].iter().enumerate() {
            self.regs[map.fccob[4 + i] as usize] = *byte;
        }
        Ok(())
    }

    fn program_once(&mut self) -> Result<(), u8> {
        let unit = self.dev.program_unit.bytes() as usize;
        let record = self.fccob(1) as usize;
        if record >= ONCE_RECORDS {
            return Err(ACCERR);
        }
        let start = record * unit;
        if self.once[start..start + unit].iter().any(|&b| b != 0xFF) {
            return Err(ACCERR);
        }
        for i in 0..unit {
            self.once[start + i] = self.fccob(4 + i);
        }
        Ok(())
    }

    fn read_once(&mut self) -> Result<(), u8> {
        let unit = self.dev.program_unit.bytes() as usize;
        let record = self.fccob(1) as usize;
        if record >= ONCE_RECORDS {
            return Err(ACCERR);
        }
        let map = self.map();
        for i in 0..unit {
            self.regs[map.fccob[4 + i] as usize] = self.once[record * unit + i];
        }
        Ok(())
    }

    fn verify_block(&mut self, internal: u32) -> Result<(), u8> {
        let block = if internal < DFLASH_INTERNAL_OFFSET {
            self.dev.pflash_block_size()
        } else {
            self.dev.dflash_total
        };
        if block == 0 || internal % block != 0 {
            return Err(ACCERR);
        }
        let blank = self.region(internal, block)?.iter().all(|&b| b == 0xFF);
        if blank {
            Ok(())
        } else {
            Err(MGSTAT0)
        }
    }

    fn verify_section(&mut self, internal: u32) -> Result<(), u8> {
        let unit = self.dev.program_unit.bytes();
        let units = u16::from_be_bytes([self.fccob(4), self.fccob(5)]) as u32;
        if internal % unit != 0 || units == 0 {
            return Err(ACCERR);
        }
        let blank = self
            .region(internal, units * unit)?
            .iter()
            .all(|&b| b == 0xFF);
        if blank {
            Ok(())
        } else {
            Err(MGSTAT0)
        }
    }

    fn verify_all(&mut self) -> Result<(), u8> {
        let blank = self.pflash.iter().chain(self.dflash.iter()).all(|&b| b == 0xFF);
        if blank {
            Ok(())
        } else {
            Err(MGSTAT0)
        }
    }

    fn security_bypass(&mut self) -> Result<(), u8> {
        let key: Vec<u8> = (0..8).map(|i| self.fccob(4 + i)).collect();
        if key != self.backdoor_key {
            return Err(ACCERR);
        }
        let fsec = self.map().fsec as usize;
        self.regs[fsec] = (self.regs[fsec] & !FSEC_SEC_MASK) | FSEC_SEC_UNSECURE;
        Ok(())
    }

    fn swap_control(&mut self, internal: u32) -> Result<(), u8> {
        match self.fccob(4) {
            0x08 => {}
            0x01 if self.swap_state == 0x00 => {
                self.swap_indicator = internal;
                self.swap_state = 0x01;
            }
            0x02 if self.swap_state == 0x01 => self.swap_state = 0x02,
            0x04 if self.swap_state == 0x03 => self.swap_state = 0x04,
            _ => return Err(ACCERR),
        }
        let map = self.map();
        self.regs[map.fccob[5] as usize] = self.swap_state;
        self.regs[map.fccob[6] as usize] = 0;
        self.regs[map.fccob[7] as usize] = if self.swap_state >= 0x02 { 1 } else { 0 };
        Ok(())
    }

    fn set_flexram(&mut self) -> Result<(), u8> {
        if self.dev.eeram_size == 0 {
            return Err(ACCERR);
        }
        let fcnfg = self.map().fcnfg as usize;
        match self.fccob(1) {
            0xFF => {
                self.regs[fcnfg] =
                    (self.regs[fcnfg] | Fcnfg::RAMRDY.bits()) & !Fcnfg::EEERDY.bits();
            }
            0x00 => {
                self.regs[fcnfg] =
                    (self.regs[fcnfg] | Fcnfg::EEERDY.bits()) & !Fcnfg::RAMRDY.bits();
            }
            _ => return Err(ACCERR),
        }
        Ok(())
    }
}

impl FlashIo for SimFtfx {
    fn read_reg(&self, offset: u32) -> u8 {
        self.regs[offset as usize]
    }

    fn write_reg(&mut self, offset: u32, value: u8) {
        self.reg_writes += 1;
        let map = self.map();
        if offset == map.fstat {
            let w1c = value
                & (Fstat::RDCOLERR | Fstat::ACCERR | Fstat::FPVIOL).bits();
            let fstat = offset as usize;
            self.regs[fstat] &= !w1c;
            if value & Fstat::CCIF.bits() != 0
                && self.regs[fstat] & Fstat::CCIF.bits() != 0
            {
                self.regs[fstat] &= !Fstat::CCIF.bits();
                self.launch();
            }
            return;
        }

        let protection = map.fprot.contains(&offset) || offset == map.fdprot || offset == map.feprot;
        if protection && !self.protection_special_mode {
            // Normal mode: writes can only protect (clear bits).
            self.regs[offset as usize] &= value;
            return;
        }
        self.regs[offset as usize] = value;
    }

    fn read_mem(&self, address: u32) -> u8 {
        let dev = &self.dev;
        if address >= dev.pflash_base && address - dev.pflash_base < dev.pflash_size {
            return self.pflash[(address - dev.pflash_base) as usize];
        }
        if dev.dflash_total > 0
            && address >= dev.dflash_base
            && address - dev.dflash_base < dev.dflash_total
        {
            return self.dflash[(address - dev.dflash_base) as usize];
        }
        if dev.eeram_size > 0
            && address >= dev.eeram_base
            && address - dev.eeram_base < dev.eeram_size
        {
            return self.eeram[(address - dev.eeram_base) as usize];
        }
        panic!("read of unmapped address {:#010x}", address);
    }

    fn write_mem(&mut self, address: u32, value: u8) {
        let dev = self.dev;
        if dev.eeram_size > 0
            && address >= dev.eeram_base
            && address - dev.eeram_base < dev.eeram_size
        {
            // FlexRAM accepts both staging writes and EEPROM quick writes;
            // quick writes complete immediately here, so EEERDY stays set.
            self.eeram[(address - dev.eeram_base) as usize] = value;
            return;
        }
        panic!("write to unmapped address {:#010x}", address);
    }
}
