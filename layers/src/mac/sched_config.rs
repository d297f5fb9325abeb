//! Scheduler BWP Configuration
//!
//! CORESET and search space configuration of a bandwidth part, and the PDCCH
//! candidate CCE tables derived from it (3GPP TS 38.213 Section 10.1)

use super::{
    CORESET_DURATION_MAX, CORESET_FREQ_DOMAIN_RES_SIZE, MAX_CANDIDATES_PER_AL, MAX_NOF_CORESETS,
    MAX_NOF_SEARCH_SPACES,
};
use crate::LayerError;
use common::types::{Rnti, RntiType, SearchSpaceType, MAX_NOF_AGGR_LEVELS};
use common::utils::{aggregation_level, nof_freq_res_groups};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// CORESET#0 configuration based on 3GPP TS 38.213
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Coreset0Config {
    /// Number of resource blocks
    pub num_rbs: u32,
    /// Number of symbols
    pub num_symbols: u32,
    /// RB offset from point A
    pub rb_offset: u32,
}

impl Coreset0Config {
    /// Get CORESET#0 configuration from table index
    /// Based on 3GPP TS 38.213 Table 13-1 for {15, 15} kHz SCS
    pub fn from_index(index: u8) -> Result<Self, LayerError> {
        let config = match index {
            0 => Self { num_rbs: 24, num_symbols: 2, rb_offset: 0 },
            1 => Self { num_rbs: 24, num_symbols: 2, rb_offset: 2 },
            2 => Self { num_rbs: 24, num_symbols: 2, rb_offset: 4 },
            3 => Self { num_rbs: 24, num_symbols: 3, rb_offset: 0 },
            4 => Self { num_rbs: 24, num_symbols: 3, rb_offset: 2 },
            5 => Self { num_rbs: 24, num_symbols: 3, rb_offset: 4 },
            6 => Self { num_rbs: 48, num_symbols: 1, rb_offset: 12 },
            7 => Self { num_rbs: 48, num_symbols: 1, rb_offset: 16 },
            8 => Self { num_rbs: 48, num_symbols: 2, rb_offset: 12 },
            9 => Self { num_rbs: 48, num_symbols: 2, rb_offset: 16 },
            10 => Self { num_rbs: 48, num_symbols: 3, rb_offset: 12 },
            11 => Self { num_rbs: 48, num_symbols: 3, rb_offset: 16 },
            12 => Self { num_rbs: 96, num_symbols: 1, rb_offset: 38 },
            13 => Self { num_rbs: 96, num_symbols: 2, rb_offset: 38 },
            14 => Self { num_rbs: 96, num_symbols: 3, rb_offset: 38 },
            _ => return Err(LayerError::InvalidConfiguration(
                format!("Invalid CORESET#0 index: {}", index)
            )),
        };
        Ok(config)
    }
}

/// CORESET configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoresetConfig {
    /// CORESET identifier
    pub id: u32,
    /// Duration in OFDM symbols (1-3)
    pub duration: u32,
    /// Frequency domain resources, one bit per group of 6 RBs
    pub freq_resources: u64,
}

impl CoresetConfig {
    /// Build CORESET#0 from its MIB table index
    pub fn coreset0(index: u8) -> Result<Self, LayerError> {
        let cfg = Coreset0Config::from_index(index)?;
        debug!("CORESET#0 index {}: {} RBs, {} symbols, RB offset {}",
               index, cfg.num_rbs, cfg.num_symbols, cfg.rb_offset);
        let nof_groups = cfg.num_rbs / 6;
        Ok(Self {
            id: 0,
            duration: cfg.num_symbols,
            freq_resources: (1u64 << nof_groups) - 1,
        })
    }

    /// Number of 6-RB frequency resource groups
    pub fn nof_freq_res(&self) -> u32 {
        nof_freq_res_groups(self.freq_resources)
    }

    /// Number of CCEs (one CCE is 6 REGs)
    pub fn nof_cces(&self) -> u32 {
        self.nof_freq_res() * self.duration
    }

    fn validate(&self) -> Result<(), LayerError> {
        if self.id as usize >= MAX_NOF_CORESETS {
            return Err(LayerError::InvalidConfiguration(
                format!("CORESET id {} exceeds maximum {}", self.id, MAX_NOF_CORESETS - 1)
            ));
        }
        if self.duration == 0 || self.duration > CORESET_DURATION_MAX {
            return Err(LayerError::InvalidConfiguration(
                format!("CORESET#{} duration {} not in 1..={}", self.id, self.duration, CORESET_DURATION_MAX)
            ));
        }
        if self.freq_resources == 0 || self.freq_resources >> CORESET_FREQ_DOMAIN_RES_SIZE != 0 {
            return Err(LayerError::InvalidConfiguration(
                format!("CORESET#{} frequency resources {:#x} out of range", self.id, self.freq_resources)
            ));
        }
        Ok(())
    }
}

/// Search space configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchSpaceConfig {
    /// Search space identifier
    pub id: u32,
    /// CORESET monitored by this search space
    pub coreset_id: u32,
    /// Search space type
    pub ss_type: SearchSpaceType,
    /// Number of PDCCH candidates per aggregation level (1, 2, 4, 8, 16)
    pub nof_candidates: [u8; MAX_NOF_AGGR_LEVELS],
    /// DCI formats 0_1 and 1_1 enabled (UE-specific search spaces only)
    #[serde(default)]
    pub dci_format_0_1_and_1_1: bool,
}

/// BWP PDCCH configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BwpConfig {
    /// BWP identifier
    #[serde(default)]
    pub bwp_id: u32,
    /// Number of distinct slot indexes candidate tables are kept for
    #[serde(default = "default_nof_slots")]
    pub nof_slots: u32,
    /// Configured CORESETs
    pub coresets: Vec<CoresetConfig>,
    /// Configured search spaces
    pub search_spaces: Vec<SearchSpaceConfig>,
    /// Search space used for RAR
    #[serde(default)]
    pub ra_search_space_id: Option<u32>,
}

fn default_nof_slots() -> u32 {
    10
}

/// Candidate CCE start positions for one search space and slot, per aggregation level.
/// Positions are in decreasing order of preference.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CcePosTable([Vec<u32>; MAX_NOF_AGGR_LEVELS]);

impl CcePosTable {
    /// Build a table from explicit per-aggregation-level position lists
    pub fn new(per_al: [Vec<u32>; MAX_NOF_AGGR_LEVELS]) -> Result<Self, LayerError> {
        if let Some(aggr_idx) = per_al.iter().position(|l| l.len() > MAX_CANDIDATES_PER_AL) {
            return Err(LayerError::InvalidConfiguration(
                format!("{} candidates for AL={} exceed maximum {}",
                        per_al[aggr_idx].len(), aggregation_level(aggr_idx), MAX_CANDIDATES_PER_AL)
            ));
        }
        Ok(Self(per_al))
    }

    /// Table with candidates at a single aggregation level
    pub fn single(aggr_idx: usize, positions: Vec<u32>) -> Result<Self, LayerError> {
        if aggr_idx >= MAX_NOF_AGGR_LEVELS {
            return Err(LayerError::InvalidConfiguration(
                format!("Invalid aggregation level index {}", aggr_idx)
            ));
        }
        let mut per_al: [Vec<u32>; MAX_NOF_AGGR_LEVELS] = Default::default();
        per_al[aggr_idx] = positions;
        Self::new(per_al)
    }

    /// Common search space candidates for a CORESET with `nof_cces` CCEs,
    /// TS 38.213 Section 10.1 with Y = 0 and n_CI = 0
    pub fn common(nof_cces: u32, nof_candidates: &[u8; MAX_NOF_AGGR_LEVELS]) -> Self {
        let mut per_al: [Vec<u32>; MAX_NOF_AGGR_LEVELS] = Default::default();
        for (aggr_idx, positions) in per_al.iter_mut().enumerate() {
            let l = aggregation_level(aggr_idx);
            let nof_blocks = nof_cces / l;
            let m = (nof_candidates[aggr_idx] as u32)
                .min(nof_blocks)
                .min(MAX_CANDIDATES_PER_AL as u32);
            *positions = (0..m)
                .map(|cand| l * ((cand * nof_cces / (l * m)) % nof_blocks))
                .collect();
        }
        Self(per_al)
    }

    /// Candidate positions for an aggregation level index
    pub fn positions(&self, aggr_idx: usize) -> &[u32] {
        self.0.get(aggr_idx).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Per-UE carrier parameters relevant to PDCCH allocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UeCarrierParams {
    /// C-RNTI
    pub rnti: Rnti,
    /// UE-specific candidate tables per search space, one entry per slot index
    cce_pos_list: BTreeMap<u32, Vec<CcePosTable>>,
}

impl UeCarrierParams {
    /// Create UE parameters without any UE-specific candidate tables
    pub fn new(rnti: Rnti) -> Self {
        Self {
            rnti,
            cce_pos_list: BTreeMap::new(),
        }
    }

    /// Use the same candidate table in every slot for a search space
    pub fn with_cce_table(mut self, ss_id: u32, table: CcePosTable) -> Self {
        self.cce_pos_list.insert(ss_id, vec![table]);
        self
    }

    /// Use one candidate table per slot index for a search space
    pub fn with_slot_cce_tables(mut self, ss_id: u32, tables: Vec<CcePosTable>) -> Self {
        self.cce_pos_list.insert(ss_id, tables);
        self
    }

    /// UE-specific candidate positions, empty when none are configured
    pub fn cce_positions(&self, ss_id: u32, slot_idx: u32, aggr_idx: usize) -> &[u32] {
        match self.cce_pos_list.get(&ss_id) {
            Some(tables) if !tables.is_empty() => {
                tables[slot_idx as usize % tables.len()].positions(aggr_idx)
            }
            _ => &[],
        }
    }
}

/// Validated BWP parameters shared by all PDCCH allocators of the BWP
#[derive(Debug, Clone)]
pub struct BwpParams {
    /// Source configuration
    pub cfg: BwpConfig,
    coresets: [Option<CoresetConfig>; MAX_NOF_CORESETS],
    search_spaces: [Option<SearchSpaceConfig>; MAX_NOF_SEARCH_SPACES],
    common_cce_list: [Option<CcePosTable>; MAX_NOF_SEARCH_SPACES],
}

impl BwpParams {
    /// Validate a BWP configuration and derive its candidate tables
    pub fn new(cfg: BwpConfig) -> Result<Self, LayerError> {
        if cfg.nof_slots == 0 {
            return Err(LayerError::InvalidConfiguration("nof_slots must be positive".into()));
        }

        let mut coresets: [Option<CoresetConfig>; MAX_NOF_CORESETS] = Default::default();
        for coreset in &cfg.coresets {
            coreset.validate()?;
            let entry = &mut coresets[coreset.id as usize];
            if entry.is_some() {
                return Err(LayerError::InvalidConfiguration(
                    format!("Duplicate CORESET id {}", coreset.id)
                ));
            }
            *entry = Some(coreset.clone());
        }

        let mut search_spaces: [Option<SearchSpaceConfig>; MAX_NOF_SEARCH_SPACES] = Default::default();
        let mut common_cce_list: [Option<CcePosTable>; MAX_NOF_SEARCH_SPACES] = Default::default();
        for ss in &cfg.search_spaces {
            if ss.id as usize >= MAX_NOF_SEARCH_SPACES {
                return Err(LayerError::InvalidConfiguration(
                    format!("SearchSpace id {} exceeds maximum {}", ss.id, MAX_NOF_SEARCH_SPACES - 1)
                ));
            }
            if search_spaces[ss.id as usize].is_some() {
                return Err(LayerError::InvalidConfiguration(
                    format!("Duplicate SearchSpace id {}", ss.id)
                ));
            }
            let coreset = coresets
                .get(ss.coreset_id as usize)
                .and_then(Option::as_ref)
                .ok_or_else(|| LayerError::InvalidConfiguration(
                    format!("SearchSpace#{} references unconfigured CORESET#{}", ss.id, ss.coreset_id)
                ))?;
            if ss.nof_candidates.iter().any(|&m| m as usize > MAX_CANDIDATES_PER_AL) {
                return Err(LayerError::InvalidConfiguration(
                    format!("SearchSpace#{} candidate count exceeds {}", ss.id, MAX_CANDIDATES_PER_AL)
                ));
            }
            if ss.ss_type.is_common() {
                common_cce_list[ss.id as usize] = Some(CcePosTable::common(coreset.nof_cces(), &ss.nof_candidates));
            }
            debug!("SearchSpace#{} ({:?}) on CORESET#{} with {} CCEs",
                   ss.id, ss.ss_type, ss.coreset_id, coreset.nof_cces());
            search_spaces[ss.id as usize] = Some(ss.clone());
        }

        if let Some(ra_ss_id) = cfg.ra_search_space_id {
            let ra_ss = search_spaces
                .get(ra_ss_id as usize)
                .and_then(Option::as_ref)
                .ok_or_else(|| LayerError::InvalidConfiguration(
                    format!("RA SearchSpace#{} not configured", ra_ss_id)
                ))?;
            if !RntiType::Ra.is_valid_in(ra_ss.ss_type) {
                return Err(LayerError::InvalidConfiguration(
                    format!("RA SearchSpace#{} has type {:?}", ra_ss_id, ra_ss.ss_type)
                ));
            }
        }

        info!("BWP#{} configured with {} CORESETs and {} search spaces",
              cfg.bwp_id, cfg.coresets.len(), cfg.search_spaces.len());

        Ok(Self {
            cfg,
            coresets,
            search_spaces,
            common_cce_list,
        })
    }

    /// Replace the derived candidate table of a common search space
    pub fn with_common_cce_table(mut self, ss_id: u32, table: CcePosTable) -> Result<Self, LayerError> {
        match self.search_space(ss_id) {
            Some(ss) if ss.ss_type.is_common() => {
                self.common_cce_list[ss_id as usize] = Some(table);
                Ok(self)
            }
            _ => Err(LayerError::InvalidConfiguration(
                format!("SearchSpace#{} is not a configured common search space", ss_id)
            )),
        }
    }

    /// CORESET configuration, if configured
    pub fn coreset(&self, coreset_id: u32) -> Option<&CoresetConfig> {
        self.coresets.get(coreset_id as usize)?.as_ref()
    }

    /// Search space configuration, if configured
    pub fn search_space(&self, ss_id: u32) -> Option<&SearchSpaceConfig> {
        self.search_spaces.get(ss_id as usize)?.as_ref()
    }

    /// Configured search spaces in identifier order
    pub fn search_spaces(&self) -> impl Iterator<Item = &SearchSpaceConfig> {
        self.search_spaces.iter().flatten()
    }

    /// Number of slot indexes candidate tables repeat over
    pub fn nof_slots(&self) -> u32 {
        self.cfg.nof_slots
    }

    /// Ordered candidate CCE positions for one DCI.
    ///
    /// Common search spaces use the cell-wide table, UE-specific search spaces
    /// the tables carried by the UE. Returns an empty slice when nothing is
    /// configured.
    pub fn cce_positions<'a>(
        &'a self,
        ss_id: u32,
        slot_idx: u32,
        aggr_idx: usize,
        ue: Option<&'a UeCarrierParams>,
    ) -> &'a [u32] {
        let Some(ss) = self.search_space(ss_id) else {
            return &[];
        };
        if ss.ss_type.is_common() {
            return match &self.common_cce_list[ss_id as usize] {
                Some(table) => table.positions(aggr_idx),
                None => &[],
            };
        }
        match ue {
            Some(ue) => ue.cce_positions(ss_id, slot_idx % self.cfg.nof_slots, aggr_idx),
            None => &[],
        }
    }
}
