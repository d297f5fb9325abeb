//! BWP PDCCH Allocator
//!
//! Handles the allocation of PDCCH resources of a BWP in a specific slot,
//! avoiding collisions with other PDCCH allocations of the same slot

use super::{CoresetRegion, PdcchAllocError, PdcchDl, PdcchGrant, PdcchUl};
use crate::mac::sched_config::{BwpParams, UeCarrierParams};
use crate::mac::{MAX_GRANTS, MAX_NOF_CORESETS};
use common::types::{RntiType, MAX_NOF_AGGR_LEVELS};
use common::utils::aggregation_level;
use tracing::{debug, warn};

/// CORESETs of the BWP, indexed by CORESET id
type SlotCoresetList<'a> = [Option<CoresetRegion<'a>>; MAX_NOF_CORESETS];

/// PDCCH allocator of one BWP in one slot
#[derive(Debug, Clone)]
pub struct BwpPdcchAllocator<'a> {
    bwp_cfg: &'a BwpParams,
    slot_idx: u32,
    coresets: SlotCoresetList<'a>,
    /// CORESET and direction of every committed allocation, in request order
    alloc_log: Vec<(usize, bool)>,
}

impl<'a> BwpPdcchAllocator<'a> {
    /// Create the allocator for a slot, with one region per configured CORESET
    pub fn new(bwp_cfg: &'a BwpParams, slot_idx: u32) -> Self {
        let coresets = std::array::from_fn(|coreset_id| {
            bwp_cfg
                .coreset(coreset_id as u32)
                .map(|cfg| CoresetRegion::new(bwp_cfg, cfg, slot_idx))
        });
        Self {
            bwp_cfg,
            slot_idx,
            coresets,
            alloc_log: Vec::with_capacity(2 * MAX_GRANTS),
        }
    }

    /// Clear current slot allocations
    pub fn reset(&mut self) {
        for coreset in self.coresets.iter_mut().flatten() {
            coreset.reset();
        }
        self.alloc_log.clear();
    }

    /// Slot index this allocator works on
    pub fn slot_idx(&self) -> u32 {
        self.slot_idx
    }

    /// Allocates CCEs for a DL DCI, avoiding collisions with other PDCCH allocations.
    ///
    /// `user` must be given for C-RNTI and TC-RNTI, and only for those.
    pub fn alloc_dl_pdcch(
        &mut self,
        rnti_type: RntiType,
        ss_id: u32,
        aggr_idx: usize,
        user: Option<&'a UeCarrierParams>,
    ) -> Result<PdcchDl<'a>, PdcchAllocError> {
        let coreset_id = self.check_args_valid(rnti_type, ss_id, aggr_idx, user, true)?;
        let coreset = self.coreset_mut(coreset_id)?;
        let pdcch = coreset.alloc_dl_pdcch(rnti_type, aggr_idx, ss_id, user)?;
        self.alloc_log.push((coreset_id, true));
        Ok(pdcch)
    }

    /// Allocates CCEs for a UL DCI, avoiding collisions with other PDCCH allocations
    pub fn alloc_ul_pdcch(
        &mut self,
        ss_id: u32,
        aggr_idx: usize,
        user: &'a UeCarrierParams,
    ) -> Result<PdcchUl<'a>, PdcchAllocError> {
        let coreset_id = self.check_args_valid(RntiType::C, ss_id, aggr_idx, Some(user), false)?;
        let coreset = self.coreset_mut(coreset_id)?;
        let pdcch = coreset.alloc_ul_pdcch(aggr_idx, ss_id, user)?;
        self.alloc_log.push((coreset_id, false));
        Ok(pdcch)
    }

    /// Cancel and remove the last PDCCH allocation of the CORESET of `ss_id`.
    /// Returns false when there was nothing to remove.
    pub fn rem_last_pdcch(&mut self, ss_id: u32) -> bool {
        let Some(coreset_id) = self.bwp_cfg.search_space(ss_id).map(|ss| ss.coreset_id as usize) else {
            warn!("rem_last_pdcch: SearchSpace#{} not configured", ss_id);
            return false;
        };
        let Some(coreset) = self.coresets.get_mut(coreset_id).and_then(Option::as_mut) else {
            return false;
        };
        if !coreset.rem_last_pdcch() {
            return false;
        }
        if let Some(pos) = self.alloc_log.iter().rposition(|&(id, _)| id == coreset_id) {
            self.alloc_log.remove(pos);
        }
        true
    }

    /// Returns the number of PDCCH allocations made in the slot
    pub fn nof_allocations(&self) -> usize {
        self.coresets.iter().flatten().map(CoresetRegion::nof_allocs).sum()
    }

    /// Number of DL allocations made in the slot
    pub fn nof_dl_allocations(&self) -> usize {
        self.alloc_log.iter().filter(|&&(_, is_dl)| is_dl).count()
    }

    /// Number of UL allocations made in the slot
    pub fn nof_ul_allocations(&self) -> usize {
        self.alloc_log.len() - self.nof_dl_allocations()
    }

    /// Region of a CORESET, if configured
    pub fn coreset(&self, coreset_id: u32) -> Option<&CoresetRegion<'a>> {
        self.coresets.get(coreset_id as usize)?.as_ref()
    }

    /// All committed grants in request order, with their final positions.
    ///
    /// Positions returned by earlier `alloc_*` calls may have been changed by
    /// later allocations; the driver collects the slot result from here.
    pub fn grants(&self) -> Vec<PdcchGrant<'a>> {
        let mut per_coreset: Vec<_> = self
            .coresets
            .iter()
            .map(|coreset| coreset.as_ref().map(|c| c.grants()))
            .collect();
        self.alloc_log
            .iter()
            .filter_map(|&(coreset_id, _)| per_coreset[coreset_id].as_mut()?.next())
            .collect()
    }

    /// DL grants of the slot, in request order
    pub fn dl_pdcchs(&self) -> Vec<PdcchDl<'a>> {
        self.grants()
            .into_iter()
            .filter_map(|grant| match grant {
                PdcchGrant::Dl(pdcch) => Some(pdcch),
                PdcchGrant::Ul(_) => None,
            })
            .collect()
    }

    /// UL grants of the slot, in request order
    pub fn ul_pdcchs(&self) -> Vec<PdcchUl<'a>> {
        self.grants()
            .into_iter()
            .filter_map(|grant| match grant {
                PdcchGrant::Ul(pdcch) => Some(pdcch),
                PdcchGrant::Dl(_) => None,
            })
            .collect()
    }

    fn coreset_mut(&mut self, coreset_id: usize) -> Result<&mut CoresetRegion<'a>, PdcchAllocError> {
        self.coresets
            .get_mut(coreset_id)
            .and_then(Option::as_mut)
            .ok_or(PdcchAllocError::CoresetNotConfigured(coreset_id as u32))
    }

    /// Validate a request, returning the CORESET that serves it
    fn check_args_valid(
        &self,
        rnti_type: RntiType,
        ss_id: u32,
        aggr_idx: usize,
        user: Option<&'a UeCarrierParams>,
        is_dl: bool,
    ) -> Result<usize, PdcchAllocError> {
        self.validate(rnti_type, ss_id, aggr_idx, user, is_dl).inspect_err(|e| {
            warn!("slot={}: rejected {} {:?} PDCCH ss={} aggr_idx={}: {}",
                  self.slot_idx, if is_dl { "DL" } else { "UL" }, rnti_type, ss_id, aggr_idx, e);
        })
    }

    fn validate(
        &self,
        rnti_type: RntiType,
        ss_id: u32,
        aggr_idx: usize,
        user: Option<&'a UeCarrierParams>,
        is_dl: bool,
    ) -> Result<usize, PdcchAllocError> {
        // Search space and CORESET
        let ss = self
            .bwp_cfg
            .search_space(ss_id)
            .ok_or(PdcchAllocError::SearchSpaceNotConfigured(ss_id))?;
        let coreset = self
            .coreset(ss.coreset_id)
            .ok_or(PdcchAllocError::CoresetNotConfigured(ss.coreset_id))?;

        // UE context present exactly for UE-specific RNTIs
        match (rnti_type.is_ue_specific(), user.is_some()) {
            (true, false) => return Err(PdcchAllocError::MissingUeContext(rnti_type)),
            (false, true) => return Err(PdcchAllocError::UnexpectedUeContext(rnti_type)),
            _ => {}
        }
        if !rnti_type.is_valid_in(ss.ss_type) {
            return Err(PdcchAllocError::RntiTypeNotAllowed { rnti_type, ss_id });
        }

        // Aggregation level
        if aggr_idx >= MAX_NOF_AGGR_LEVELS {
            return Err(PdcchAllocError::InvalidAggregationLevel(aggr_idx));
        }
        let aggr_level = aggregation_level(aggr_idx);
        if aggr_level > coreset.nof_cces() {
            return Err(PdcchAllocError::AggregationLevelTooLarge {
                aggr_level,
                nof_cces: coreset.nof_cces(),
            });
        }
        if ss.nof_candidates[aggr_idx] == 0
            || self.bwp_cfg.cce_positions(ss_id, self.slot_idx, aggr_idx, user).is_empty()
        {
            return Err(PdcchAllocError::NoCandidates { ss_id, aggr_level });
        }

        // Grant list capacity
        let nof_allocs = if is_dl { self.nof_dl_allocations() } else { self.nof_ul_allocations() };
        if nof_allocs >= MAX_GRANTS {
            debug!("slot={}: maximum number of {} PDCCHs reached", self.slot_idx, if is_dl { "DL" } else { "UL" });
            return Err(PdcchAllocError::CapacityExceeded);
        }

        Ok(ss.coreset_id as usize)
    }
}
