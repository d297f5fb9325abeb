//! CCE occupancy bitmap
//!
//! Bit `i` set means CCE `i` of the CORESET is claimed by a committed PDCCH.
//! Backed by a stack-allocated `BitArray`, since it sits in the innermost loop
//! of the PDCCH search.

use crate::mac::MAX_CORESET_CCES;
use bitvec::prelude::*;
use std::fmt;
use std::ops::{BitOr, BitOrAssign};

type CceBits = BitArr!(for MAX_CORESET_CCES, in u64, Lsb0);

/// CCE occupancy of one CORESET
#[derive(Clone, Copy, Default)]
pub struct CceBitmap(CceBits);

impl CceBitmap {
    /// Empty bitmap
    pub fn new() -> Self {
        Self::default()
    }

    /// Bitmap with `len` consecutive CCEs set from `start`.
    /// Returns `None` when the run exceeds the largest CORESET.
    pub fn from_range(start: usize, len: usize) -> Option<Self> {
        let end = start.checked_add(len)?;
        if end > MAX_CORESET_CCES {
            return None;
        }
        let mut mask = Self::new();
        mask.0.get_mut(start..end)?.fill(true);
        Some(mask)
    }

    /// Whether any CCE is set
    pub fn any(&self) -> bool {
        self.0.any()
    }

    /// Number of set CCEs
    pub fn count_ones(&self) -> u32 {
        self.0.count_ones() as u32
    }

    /// Whether the two bitmaps share at least one CCE
    pub fn intersects(&self, other: &Self) -> bool {
        (self.0 & other.0.as_bitslice()).any()
    }

    /// Whether the two bitmaps share no CCE
    pub fn is_disjoint(&self, other: &Self) -> bool {
        !self.intersects(other)
    }

    /// Indexes of set CCEs in increasing order
    pub fn iter_ones(&self) -> impl Iterator<Item = usize> + '_ {
        self.0.iter_ones()
    }
}

impl PartialEq for CceBitmap {
    fn eq(&self, other: &Self) -> bool {
        self.0.as_raw_slice() == other.0.as_raw_slice()
    }
}

impl Eq for CceBitmap {}

impl BitOr for CceBitmap {
    type Output = Self;

    fn bitor(mut self, rhs: Self) -> Self {
        self |= rhs;
        self
    }
}

impl BitOrAssign for CceBitmap {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0.as_bitslice();
    }
}

impl fmt::Debug for CceBitmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter_ones()).finish()
    }
}
