//! Medium Access Control (MAC) Layer Implementation
//! 
//! Scheduler-side PDCCH handling for 5G NR (3GPP TS 38.321, TS 38.213)

pub mod sched_config;
pub mod pdcch;

pub use sched_config::{
    BwpConfig, BwpParams, CcePosTable, Coreset0Config, CoresetConfig, SearchSpaceConfig,
    UeCarrierParams,
};
pub use pdcch::{
    BwpPdcchAllocator, CceBitmap, CoresetRegion, DciContext, DciFormat, DciLocation,
    PdcchAllocError, PdcchDl, PdcchUl,
};

/// Maximum number of CORESETs active in a BWP
pub const MAX_NOF_CORESETS: usize = 3;
/// Maximum number of search spaces in a BWP
pub const MAX_NOF_SEARCH_SPACES: usize = 10;
/// Maximum number of DL (and of UL) grants per slot
pub const MAX_GRANTS: usize = 64;
/// Maximum number of PDCCH candidates per aggregation level
pub const MAX_CANDIDATES_PER_AL: usize = 8;
/// Number of 6-RB frequency resource groups a CORESET bitmap can hold
pub const CORESET_FREQ_DOMAIN_RES_SIZE: usize = 45;
/// Maximum CORESET duration in OFDM symbols
pub const CORESET_DURATION_MAX: u32 = 3;
/// Maximum number of CCEs in one CORESET
pub const MAX_CORESET_CCES: usize = CORESET_FREQ_DOMAIN_RES_SIZE * CORESET_DURATION_MAX as usize;
