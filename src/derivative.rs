//! Per-derivative configuration records.
//!
//! The C driver this crate descends from selected sector sizes, block
//! geometry, partition tables and register layout through a dozen parallel
//! preprocessor branches. Here a [`Derivative`] is one plain value holding
//! all of those constants; board code picks (or defines) one at startup and
//! hands it to [`Flash::new`](crate::Flash::new).

use crate::regs::Endianness;

/// Marker for reserved entries in the partition lookup tables.
pub const RESERVED_CODE: u32 = 0xFFFF_FFFF;

const KB: u32 = 1024;

/// Smallest programmable unit of the derivative's memory controller.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgramUnit {
    /// 4-byte programming (FTFA/FTFL controllers).
    Longword,
    /// 8-byte programming (FTFE controllers).
    Phrase,
}

impl ProgramUnit {
    pub const fn bytes(self) -> u32 {
        match self {
            ProgramUnit::Longword => 4,
            ProgramUnit::Phrase => 8,
        }
    }
}

/// All size, layout and capability constants of one Kinetis derivative.
///
/// The P-Flash and D-Flash (FlexNVM) geometry describes the physical blocks;
/// the partition tables translate the codes read back from the D-Flash IFR
/// into byte sizes during [`Flash::init`](crate::Flash::init). A part with
/// `dflash_total == 0` is a program-flash-only derivative.
#[derive(Debug, Clone, Copy)]
pub struct Derivative {
    pub name: &'static str,
    pub endianness: Endianness,
    pub pflash_base: u32,
    pub pflash_size: u32,
    pub pflash_sector_size: u32,
    pub pflash_block_count: u32,
    pub dflash_base: u32,
    /// Physical FlexNVM size; 0 on program-flash-only parts.
    pub dflash_total: u32,
    pub dflash_sector_size: u32,
    pub eeram_base: u32,
    /// FlexRAM size; doubles as the section-program staging buffer limit.
    pub eeram_size: u32,
    pub program_unit: ProgramUnit,
    pub has_program_section: bool,
    pub has_swap: bool,
    /// Internal address of the partition configuration longword in the
    /// D-Flash IFR, read by `Flash::init` via the read-resource command.
    pub partition_ifr_address: u32,
    /// FlexNVM partition code (DEPART) to D-Flash size, in bytes.
    pub dflash_sizes: [u32; 16],
    /// EEPROM data set size code (EEESIZE) to EEPROM size, in bytes.
    pub eee_sizes: [u32; 16],
}

impl Derivative {
    pub const fn pflash_block_size(&self) -> u32 {
        self.pflash_size / self.pflash_block_count
    }

    /// D-Flash size for a partition code; `RESERVED_CODE` for reserved codes.
    pub fn dflash_size_for(&self, depart: u8) -> u32 {
        self.dflash_sizes[(depart & 0x0F) as usize]
    }

    /// EEPROM size for a data set size code; `RESERVED_CODE` for reserved codes.
    pub fn eee_size_for(&self, eeesize: u8) -> u32 {
        self.eee_sizes[(eeesize & 0x0F) as usize]
    }

    /// MK20DX128: 128 KiB P-Flash, 32 KiB FlexNVM, 2 KiB FlexRAM (FTFL).
    /// The interface MCU of CMSIS-DAP debug probe boards.
    pub const fn mk20dx128() -> Self {
        Derivative {
            name: "MK20DX128",
            endianness: Endianness::Little,
            pflash_base: 0x0000_0000,
            pflash_size: 128 * KB,
            pflash_sector_size: KB,
            pflash_block_count: 1,
            dflash_base: 0x1000_0000,
            dflash_total: 32 * KB,
            dflash_sector_size: KB,
            eeram_base: 0x1400_0000,
            eeram_size: 2 * KB,
            program_unit: ProgramUnit::Longword,
            has_program_section: true,
            has_swap: false,
            partition_ifr_address: 0x0080_00FC,
            dflash_sizes: DEPART_32K,
            eee_sizes: EEESIZE_2K,
        }
    }

    /// MKL26Z128: 128 KiB P-Flash only, no FlexNVM or FlexRAM (FTFA).
    pub const fn mkl26z128() -> Self {
        Derivative {
            name: "MKL26Z128",
            endianness: Endianness::Little,
            pflash_base: 0x0000_0000,
            pflash_size: 128 * KB,
            pflash_sector_size: KB,
            pflash_block_count: 1,
            dflash_base: 0,
            dflash_total: 0,
            dflash_sector_size: 0,
            eeram_base: 0,
            eeram_size: 0,
            program_unit: ProgramUnit::Longword,
            has_program_section: false,
            has_swap: false,
            partition_ifr_address: 0,
            dflash_sizes: DEPART_NONE,
            eee_sizes: EEESIZE_NONE,
        }
    }

    /// MK64FN1M0: 1 MiB P-Flash in two swappable banks, no FlexNVM,
    /// 4 KiB acceleration RAM (FTFE).
    pub const fn mk64fn1m0() -> Self {
        Derivative {
            name: "MK64FN1M0",
            endianness: Endianness::Little,
            pflash_base: 0x0000_0000,
            pflash_size: 1024 * KB,
            pflash_sector_size: 4 * KB,
            pflash_block_count: 2,
            dflash_base: 0,
            dflash_total: 0,
            dflash_sector_size: 0,
            eeram_base: 0x1400_0000,
            eeram_size: 4 * KB,
            program_unit: ProgramUnit::Phrase,
            has_program_section: true,
            has_swap: true,
            partition_ifr_address: 0,
            dflash_sizes: DEPART_NONE,
            eee_sizes: EEESIZE_NONE,
        }
    }

    /// MK64FX512: 512 KiB P-Flash, 128 KiB FlexNVM, 4 KiB FlexRAM (FTFE).
    pub const fn mk64fx512() -> Self {
        Derivative {
            name: "MK64FX512",
            endianness: Endianness::Little,
            pflash_base: 0x0000_0000,
            pflash_size: 512 * KB,
            pflash_sector_size: 4 * KB,
            pflash_block_count: 1,
            dflash_base: 0x1000_0000,
            dflash_total: 128 * KB,
            dflash_sector_size: 4 * KB,
            eeram_base: 0x1400_0000,
            eeram_size: 4 * KB,
            program_unit: ProgramUnit::Phrase,
            has_program_section: true,
            has_swap: false,
            partition_ifr_address: 0x0080_03F8,
            dflash_sizes: DEPART_128K,
            eee_sizes: EEESIZE_4K,
        }
    }

    /// MK66FN2M0: 2 MiB P-Flash in two swappable banks, no FlexNVM,
    /// 4 KiB acceleration RAM (FTFE).
    pub const fn mk66fn2m0() -> Self {
        Derivative {
            name: "MK66FN2M0",
            endianness: Endianness::Little,
            pflash_base: 0x0000_0000,
            pflash_size: 2048 * KB,
            pflash_sector_size: 4 * KB,
            pflash_block_count: 2,
            dflash_base: 0,
            dflash_total: 0,
            dflash_sector_size: 0,
            eeram_base: 0x1400_0000,
            eeram_size: 4 * KB,
            program_unit: ProgramUnit::Phrase,
            has_program_section: true,
            has_swap: true,
            partition_ifr_address: 0,
            dflash_sizes: DEPART_NONE,
            eee_sizes: EEESIZE_NONE,
        }
    }
}

const R: u32 = RESERVED_CODE;

const DEPART_NONE: [u32; 16] = [R; 16];
const EEESIZE_NONE: [u32; 16] = [R; 16];

const DEPART_32K: [u32; 16] = [
    32 * KB,
    24 * KB,
    16 * KB,
    8 * KB,
    0,
    R,
    R,
    R,
    0,
    8 * KB,
    16 * KB,
    24 * KB,
    32 * KB,
    R,
    R,
    32 * KB,
];

const DEPART_128K: [u32; 16] = [
    128 * KB,
    96 * KB,
    64 * KB,
    32 * KB,
    0,
    R,
    R,
    R,
    0,
    32 * KB,
    64 * KB,
    96 * KB,
    128 * KB,
    R,
    R,
    128 * KB,
];

const EEESIZE_2K: [u32; 16] = [
    R, R, R, 2048, 1024, 512, 256, 128, 64, 32, R, R, R, R, R, 0,
];

const EEESIZE_4K: [u32; 16] = [
    R, R, 4096, 2048, 1024, 512, 256, 128, 64, 32, R, R, R, R, R, 0,
];
