//! PDCCH Resource Allocation
//!
//! Packs the DCIs of one slot into the CCEs of the BWP CORESETs without
//! collisions. Each CORESET runs a depth-first search over the candidate
//! positions of its pending DCIs; the BWP allocator routes requests to the
//! CORESET of the requested search space.

pub mod bitmap;
pub mod coreset;
pub mod bwp;

pub use bitmap::CceBitmap;
pub use bwp::BwpPdcchAllocator;
pub use coreset::CoresetRegion;

use super::sched_config::UeCarrierParams;
use common::types::{Rnti, RntiType};
use common::utils::aggregation_level;
use serde::Serialize;
use thiserror::Error;

/// PDCCH allocation failures. None of them leaves partial state behind.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PdcchAllocError {
    #[error("SearchSpace#{0} not configured")]
    SearchSpaceNotConfigured(u32),

    #[error("CORESET#{0} not configured")]
    CoresetNotConfigured(u32),

    #[error("Invalid aggregation level index {0}")]
    InvalidAggregationLevel(usize),

    #[error("SearchSpace#{ss_id} has no CCE candidates for AL={aggr_level}")]
    NoCandidates { ss_id: u32, aggr_level: u32 },

    #[error("UE context required for {0:?}-RNTI PDCCH")]
    MissingUeContext(RntiType),

    #[error("UE context not expected for {0:?}-RNTI PDCCH")]
    UnexpectedUeContext(RntiType),

    #[error("{rnti_type:?}-RNTI not allowed in SearchSpace#{ss_id}")]
    RntiTypeNotAllowed { rnti_type: RntiType, ss_id: u32 },

    #[error("AL={aggr_level} does not fit in CORESET with {nof_cces} CCEs")]
    AggregationLevelTooLarge { aggr_level: u32, nof_cces: u32 },

    #[error("Maximum number of PDCCH allocations reached")]
    CapacityExceeded,

    #[error("No collision-free CCE position available")]
    NoResources,
}

impl PdcchAllocError {
    /// Whether this is the expected "CORESET full" outcome rather than a bad request
    pub fn is_resource_exhaustion(&self) -> bool {
        matches!(self, PdcchAllocError::NoResources)
    }
}

/// DCI position inside a CORESET
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub struct DciLocation {
    /// Aggregation level index (0..5)
    pub aggr_idx: usize,
    /// First CCE index
    pub ncce: u32,
}

impl DciLocation {
    /// Number of CCEs occupied
    pub fn nof_cces(&self) -> u32 {
        aggregation_level(self.aggr_idx)
    }

    /// CCE occupancy of this location
    pub fn mask(&self) -> Option<CceBitmap> {
        CceBitmap::from_range(self.ncce as usize, self.nof_cces() as usize)
    }
}

/// DCI format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DciFormat {
    /// DL fallback
    #[serde(rename = "1_0")]
    F1_0,
    /// DL non-fallback
    #[serde(rename = "1_1")]
    F1_1,
    /// UL fallback
    #[serde(rename = "0_0")]
    F0_0,
    /// UL non-fallback
    #[serde(rename = "0_1")]
    F0_1,
}

impl DciFormat {
    /// Format used for a DCI given its direction and search space.
    /// Common search spaces always carry fallback formats.
    pub fn select(is_dl: bool, ue_search_space: bool, non_fallback_enabled: bool) -> Self {
        let non_fallback = ue_search_space && non_fallback_enabled;
        match (is_dl, non_fallback) {
            (true, false) => DciFormat::F1_0,
            (true, true) => DciFormat::F1_1,
            (false, false) => DciFormat::F0_0,
            (false, true) => DciFormat::F0_1,
        }
    }
}

/// Scheduling context of an allocated DCI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DciContext {
    /// Position in the CORESET
    pub location: DciLocation,
    /// Addressed RNTI, when known at allocation time (RA-RNTI is filled by the caller)
    pub rnti: Option<Rnti>,
    /// RNTI type
    pub rnti_type: RntiType,
    /// Search space
    pub ss_id: u32,
    /// CORESET
    pub coreset_id: u32,
    /// DCI format
    pub format: DciFormat,
}

/// Allocated DL PDCCH
#[derive(Debug, Clone, Copy)]
pub struct PdcchDl<'a> {
    /// DCI context
    pub dci: DciContext,
    /// Addressed UE, for UE-specific DCIs
    pub ue: Option<&'a UeCarrierParams>,
}

/// Allocated UL PDCCH
#[derive(Debug, Clone, Copy)]
pub struct PdcchUl<'a> {
    /// DCI context
    pub dci: DciContext,
    /// Addressed UE
    pub ue: &'a UeCarrierParams,
}

/// Allocated PDCCH of either direction
#[derive(Debug, Clone, Copy)]
pub enum PdcchGrant<'a> {
    Dl(PdcchDl<'a>),
    Ul(PdcchUl<'a>),
}

impl<'a> PdcchGrant<'a> {
    /// DCI context of the grant
    pub fn dci(&self) -> &DciContext {
        match self {
            PdcchGrant::Dl(pdcch) => &pdcch.dci,
            PdcchGrant::Ul(pdcch) => &pdcch.dci,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dci_location_mask() {
        let loc = DciLocation { aggr_idx: 2, ncce: 4 };
        assert_eq!(loc.nof_cces(), 4);
        let mask = loc.mask().unwrap();
        assert_eq!(mask.iter_ones().collect::<Vec<_>>(), vec![4, 5, 6, 7]);
    }

    #[test]
    fn test_dci_format_selection() {
        assert_eq!(DciFormat::select(true, false, true), DciFormat::F1_0);
        assert_eq!(DciFormat::select(true, true, true), DciFormat::F1_1);
        assert_eq!(DciFormat::select(true, true, false), DciFormat::F1_0);
        assert_eq!(DciFormat::select(false, true, true), DciFormat::F0_1);
        assert_eq!(DciFormat::select(false, false, false), DciFormat::F0_0);
    }

    #[test]
    fn test_error_classification() {
        assert!(PdcchAllocError::NoResources.is_resource_exhaustion());
        assert!(!PdcchAllocError::CapacityExceeded.is_resource_exhaustion());
        assert_eq!(
            PdcchAllocError::NoCandidates { ss_id: 2, aggr_level: 8 }.to_string(),
            "SearchSpace#2 has no CCE candidates for AL=8"
        );
    }
}
