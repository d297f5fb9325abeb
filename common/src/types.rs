//! Common Types for 5G GNodeB
//! 
//! Defines fundamental types shared by the scheduler components

use serde::{Deserialize, Serialize};
use num_derive::{FromPrimitive, ToPrimitive};

/// Number of PDCCH aggregation levels (1, 2, 4, 8, 16)
pub const MAX_NOF_AGGR_LEVELS: usize = 5;

/// Radio Network Temporary Identifier (RNTI)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Rnti(pub u16);

impl Rnti {
    /// System Information RNTI
    pub const SI: Self = Self(0xFFFF);
    /// Paging RNTI
    pub const P: Self = Self(0xFFFE);

    /// Create a new RNTI
    pub fn new(value: u16) -> Self {
        Self(value)
    }
    
    /// Get the RNTI value
    pub fn value(&self) -> u16 {
        self.0
    }
}

/// Class of the entity addressed by a DCI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive, ToPrimitive, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RntiType {
    /// Cell RNTI (UE-specific)
    C = 0,
    /// Temporary cell RNTI (contention resolution)
    Tc = 1,
    /// Random access RNTI
    Ra = 2,
    /// System information RNTI
    Si = 3,
    /// Paging RNTI
    P = 4,
}

impl RntiType {
    /// Whether the DCI addresses a single UE and therefore needs UE context
    pub fn is_ue_specific(&self) -> bool {
        matches!(self, RntiType::C | RntiType::Tc)
    }

    /// Fixed RNTI value, for types that have one
    pub fn fixed_rnti(&self) -> Option<Rnti> {
        match self {
            RntiType::Si => Some(Rnti::SI),
            RntiType::P => Some(Rnti::P),
            _ => None,
        }
    }

    /// Check whether this RNTI type may be monitored in a search space of the given type
    /// (TS 38.213 Section 10.1)
    pub fn is_valid_in(&self, ss_type: SearchSpaceType) -> bool {
        match ss_type {
            SearchSpaceType::Common0 | SearchSpaceType::Common0A => *self == RntiType::Si,
            SearchSpaceType::Common1 => matches!(self, RntiType::Ra | RntiType::Tc | RntiType::C),
            SearchSpaceType::Common2 => *self == RntiType::P,
            SearchSpaceType::Common3 => *self == RntiType::C,
            SearchSpaceType::Ue => *self == RntiType::C,
        }
    }
}

/// Search space type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive, ToPrimitive, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchSpaceType {
    /// Type0-PDCCH CSS (SIB1)
    Common0,
    /// Type0A-PDCCH CSS (other SI)
    Common0A,
    /// Type1-PDCCH CSS (random access)
    Common1,
    /// Type2-PDCCH CSS (paging)
    Common2,
    /// Type3-PDCCH CSS
    Common3,
    /// UE-specific search space
    Ue,
}

impl SearchSpaceType {
    /// Whether this is a common search space
    pub fn is_common(&self) -> bool {
        !matches!(self, SearchSpaceType::Ue)
    }
}

/// Subcarrier spacing values in kHz
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, ToPrimitive, Serialize, Deserialize)]
pub enum SubcarrierSpacing {
    /// 15 kHz
    Scs15 = 15,
    /// 30 kHz
    Scs30 = 30,
    /// 60 kHz
    Scs60 = 60,
    /// 120 kHz
    Scs120 = 120,
    /// 240 kHz
    Scs240 = 240,
}

impl SubcarrierSpacing {
    /// Numerology index (mu)
    pub fn numerology(&self) -> u8 {
        match self {
            SubcarrierSpacing::Scs15 => 0,
            SubcarrierSpacing::Scs30 => 1,
            SubcarrierSpacing::Scs60 => 2,
            SubcarrierSpacing::Scs120 => 3,
            SubcarrierSpacing::Scs240 => 4,
        }
    }
}
