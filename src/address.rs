//! Address translation and validation.
//!
//! System addresses are mapped into the controller's internal address space:
//! P-Flash starts at internal offset 0, D-Flash at [`DFLASH_INTERNAL_OFFSET`].
//! A destination range must fall entirely within exactly one of the two
//! blocks; straddling a block boundary is an error.

use crate::derivative::Derivative;
use crate::error::{Error, Result};

/// Internal offset of the D-Flash / IFR address space.
pub const DFLASH_INTERNAL_OFFSET: u32 = 0x0080_0000;

/// Containment rule applied to the upper bound of a range check.
///
/// Program and erase operations require the whole `[dest, dest + size)`
/// range inside a block; the verify operations only constrain the start
/// address, since hardware derives the extent itself. The two forms differ
/// exactly at the upper block boundary and are deliberately not unified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Containment {
    Whole,
    StartOnly,
}

/// Reject destinations and sizes that are not multiples of `alignment`.
pub(crate) fn check_alignment(dest: u32, size: u32, alignment: u32) -> Result<()> {
    if dest % alignment != 0 {
        return Err(Error::AddressMisaligned);
    }
    if size % alignment != 0 {
        return Err(Error::SizeMisaligned);
    }
    Ok(())
}

/// Map a system address range onto the controller's internal address space.
///
/// `dflash_size` is the partition-discovered D-Flash size, which may be
/// smaller than the physical FlexNVM block.
pub(crate) fn translate(
    dev: &Derivative,
    dflash_size: u32,
    dest: u32,
    size: u32,
    containment: Containment,
) -> Result<u32> {
    if contains(dev.pflash_base, dev.pflash_size, dest, size, containment) {
        Ok(dest - dev.pflash_base)
    } else if dflash_size != 0
        && contains(dev.dflash_base, dflash_size, dest, size, containment)
    {
        Ok(dest - dev.dflash_base + DFLASH_INTERNAL_OFFSET)
    } else {
        Err(Error::OutOfRange)
    }
}

fn contains(base: u32, region: u32, dest: u32, size: u32, containment: Containment) -> bool {
    if region == 0 || dest < base {
        return false;
    }
    let limit = base as u64 + region as u64;
    match containment {
        Containment::Whole => dest as u64 + size as u64 <= limit,
        Containment::StartOnly => (dest as u64) < limit,
    }
}

/// Whether an internal address belongs to the D-Flash address space.
pub(crate) fn is_dflash(internal: u32) -> bool {
    internal >= DFLASH_INTERNAL_OFFSET
}
