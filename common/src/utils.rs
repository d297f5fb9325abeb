//! Common Utilities
//! 
//! Provides utility functions used across the scheduler implementation

use crate::types::SubcarrierSpacing;
use tracing::trace;

/// Number of CCEs occupied by a PDCCH at the given aggregation level index
pub fn aggregation_level(aggr_idx: usize) -> u32 {
    1 << aggr_idx
}

/// Count the frequency resource groups (6 RBs each) set in a CORESET
/// frequency-domain bitmap
pub fn nof_freq_res_groups(freq_resources: u64) -> u32 {
    let nof = freq_resources.count_ones();
    trace!("CORESET frequency bitmap {:#x} has {} groups", freq_resources, nof);
    nof
}

/// Time utilities for slot/frame calculations
pub mod time {
    use super::SubcarrierSpacing;

    /// Slot duration in microseconds
    pub fn slot_duration_us(scs: SubcarrierSpacing) -> u32 {
        match scs {
            SubcarrierSpacing::Scs15 => 1000,
            SubcarrierSpacing::Scs30 => 500,
            SubcarrierSpacing::Scs60 => 250,
            SubcarrierSpacing::Scs120 => 125,
            SubcarrierSpacing::Scs240 => 62,  // 62.5 us, truncated
        }
    }
    
    /// Number of slots per frame (10ms)
    pub fn slots_per_frame(scs: SubcarrierSpacing) -> u32 {
        10 << scs.numerology()
    }
}
