//! Per-CORESET PDCCH allocation for one slot
//!
//! Allocation records are kept in request order. The decision tree holds one
//! node per record with the chosen candidate and the cumulative CCE mask of
//! all nodes up to and including it. When a new DCI does not fit next to the
//! current placements, the search walks the tree depth-first, moving earlier
//! DCIs to other candidates until every pending DCI fits or all combinations
//! have been tried.

use super::{CceBitmap, DciContext, DciFormat, DciLocation, PdcchAllocError, PdcchDl, PdcchGrant, PdcchUl};
use crate::mac::sched_config::{BwpParams, CoresetConfig, UeCarrierParams};
use crate::mac::MAX_GRANTS;
use common::types::{Rnti, RntiType, MAX_NOF_AGGR_LEVELS};
use common::utils::aggregation_level;
use tracing::{debug, trace};

/// Maximum DL plus UL records held by one CORESET
pub const MAX_CORESET_RECORDS: usize = 2 * MAX_GRANTS;

/// One requested DCI
#[derive(Debug, Clone, Copy)]
struct DciRequest<'a> {
    rnti_type: RntiType,
    is_dl: bool,
    aggr_idx: usize,
    ss_id: u32,
    ue: Option<&'a UeCarrierParams>,
}

/// Tree suffix replaced when an allocation relocated earlier DCIs
#[derive(Debug, Clone)]
struct TreeUndo {
    first_level: usize,
    nodes: Vec<TreeNode>,
}

#[derive(Debug, Clone)]
struct AllocRecord<'a> {
    req: DciRequest<'a>,
    /// Set when this allocation moved earlier DCIs away from their positions
    relocated: Option<TreeUndo>,
}

/// One level of the DFS decision tree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TreeNode {
    rnti: Option<Rnti>,
    record_idx: usize,
    dci_pos_idx: usize,
    dci_pos: DciLocation,
    /// Union of the masks of this node and all nodes before it
    total_mask: CceBitmap,
    /// Mask of this node alone
    current_mask: CceBitmap,
}

/// PDCCH allocator of one CORESET in one slot
#[derive(Debug, Clone)]
pub struct CoresetRegion<'a> {
    bwp: &'a BwpParams,
    coreset_cfg: &'a CoresetConfig,
    coreset_id: u32,
    slot_idx: u32,
    nof_freq_res: u32,

    dci_list: Vec<AllocRecord<'a>>,
    dfs_tree: Vec<TreeNode>,
    saved_dfs_tree: Vec<TreeNode>,
}

impl<'a> CoresetRegion<'a> {
    /// Create the allocator of a CORESET for a slot
    pub fn new(bwp: &'a BwpParams, coreset_cfg: &'a CoresetConfig, slot_idx: u32) -> Self {
        Self {
            bwp,
            coreset_cfg,
            coreset_id: coreset_cfg.id,
            slot_idx,
            nof_freq_res: coreset_cfg.nof_freq_res(),
            dci_list: Vec::with_capacity(MAX_CORESET_RECORDS),
            dfs_tree: Vec::with_capacity(MAX_CORESET_RECORDS),
            saved_dfs_tree: Vec::with_capacity(MAX_CORESET_RECORDS),
        }
    }

    /// Drop all allocations
    pub fn reset(&mut self) {
        self.dfs_tree.clear();
        self.saved_dfs_tree.clear();
        self.dci_list.clear();
    }

    /// Allocate a DL DCI
    pub fn alloc_dl_pdcch(
        &mut self,
        rnti_type: RntiType,
        aggr_idx: usize,
        search_space_id: u32,
        user: Option<&'a UeCarrierParams>,
    ) -> Result<PdcchDl<'a>, PdcchAllocError> {
        self.alloc_pdcch_common(rnti_type, true, aggr_idx, search_space_id, user)?;
        match self.last_grant() {
            Some(PdcchGrant::Dl(pdcch)) => Ok(pdcch),
            _ => Err(PdcchAllocError::NoResources),
        }
    }

    /// Allocate a UL DCI
    pub fn alloc_ul_pdcch(
        &mut self,
        aggr_idx: usize,
        search_space_id: u32,
        user: &'a UeCarrierParams,
    ) -> Result<PdcchUl<'a>, PdcchAllocError> {
        self.alloc_pdcch_common(RntiType::C, false, aggr_idx, search_space_id, Some(user))?;
        match self.last_grant() {
            Some(PdcchGrant::Ul(pdcch)) => Ok(pdcch),
            _ => Err(PdcchAllocError::NoResources),
        }
    }

    /// Cancel the most recent allocation. Returns false when there is none.
    ///
    /// If that allocation had moved earlier DCIs, they return to the positions
    /// they held before it.
    pub fn rem_last_pdcch(&mut self) -> bool {
        let Some(record) = self.dci_list.pop() else {
            return false;
        };
        self.dfs_tree.pop();
        if let Some(undo) = record.relocated {
            self.dfs_tree.truncate(undo.first_level);
            self.dfs_tree.extend(undo.nodes);
        }
        trace!("CORESET#{}: removed last PDCCH, {} remaining", self.coreset_id, self.dci_list.len());
        true
    }

    /// CORESET duration in symbols
    pub fn get_td_symbols(&self) -> u32 {
        self.coreset_cfg.duration
    }

    /// Number of 6-RB frequency resource groups
    pub fn get_freq_resources(&self) -> u32 {
        self.nof_freq_res
    }

    /// Number of CCEs in the CORESET
    pub fn nof_cces(&self) -> u32 {
        self.nof_freq_res * self.get_td_symbols()
    }

    /// Number of committed allocations
    pub fn nof_allocs(&self) -> usize {
        self.dfs_tree.len()
    }

    /// CORESET identifier
    pub fn coreset_id(&self) -> u32 {
        self.coreset_id
    }

    /// CCEs claimed by all committed allocations
    pub fn occupied_cces(&self) -> CceBitmap {
        self.dfs_tree.last().map(|node| node.total_mask).unwrap_or_default()
    }

    /// Committed grants in request order, with their current positions
    pub fn grants(&self) -> impl Iterator<Item = PdcchGrant<'a>> + '_ {
        self.dci_list
            .iter()
            .zip(&self.dfs_tree)
            .map(|(record, node)| self.make_grant(&record.req, node.dci_pos))
    }

    fn last_grant(&self) -> Option<PdcchGrant<'a>> {
        let record = self.dci_list.last()?;
        let node = self.dfs_tree.last()?;
        Some(self.make_grant(&record.req, node.dci_pos))
    }

    fn make_grant(&self, req: &DciRequest<'a>, location: DciLocation) -> PdcchGrant<'a> {
        let (ue_search_space, non_fallback) = match self.bwp.search_space(req.ss_id) {
            Some(ss) => (!ss.ss_type.is_common(), ss.dci_format_0_1_and_1_1),
            None => (false, false),
        };
        let dci = DciContext {
            location,
            rnti: req.ue.map(|ue| ue.rnti).or_else(|| req.rnti_type.fixed_rnti()),
            rnti_type: req.rnti_type,
            ss_id: req.ss_id,
            coreset_id: self.coreset_id,
            format: DciFormat::select(req.is_dl, ue_search_space, non_fallback),
        };
        match (req.is_dl, req.ue) {
            (false, Some(ue)) => PdcchGrant::Ul(PdcchUl { dci, ue }),
            _ => PdcchGrant::Dl(PdcchDl { dci, ue: req.ue }),
        }
    }

    fn alloc_pdcch_common(
        &mut self,
        rnti_type: RntiType,
        is_dl: bool,
        aggr_idx: usize,
        search_space_id: u32,
        user: Option<&'a UeCarrierParams>,
    ) -> Result<(), PdcchAllocError> {
        if aggr_idx >= MAX_NOF_AGGR_LEVELS {
            return Err(PdcchAllocError::InvalidAggregationLevel(aggr_idx));
        }
        if aggregation_level(aggr_idx) > self.nof_cces() {
            return Err(PdcchAllocError::AggregationLevelTooLarge {
                aggr_level: aggregation_level(aggr_idx),
                nof_cces: self.nof_cces(),
            });
        }
        if self.dci_list.len() >= MAX_CORESET_RECORDS {
            return Err(PdcchAllocError::CapacityExceeded);
        }

        let req = DciRequest {
            rnti_type,
            is_dl,
            aggr_idx,
            ss_id: search_space_id,
            ue: user,
        };

        // Try to place the new DCI next to the current arrangement first
        if self.alloc_dfs_node(req, self.dci_list.len(), 0) {
            self.commit_record(req, None);
            return Ok(());
        }

        // Otherwise walk every arrangement of the DCIs already placed, in
        // candidate preference order, until the new DCI fits in one of them
        self.saved_dfs_tree.clear();
        self.saved_dfs_tree.extend_from_slice(&self.dfs_tree);
        let mut found = self.search_from_root();
        while found {
            if self.alloc_dfs_node(req, self.dci_list.len(), 0) {
                let relocated = self.relocation_undo();
                self.commit_record(req, relocated);
                return Ok(());
            }
            found = self.get_next_dfs();
        }

        // Revert to the tree as it was before this allocation was attempted
        std::mem::swap(&mut self.dfs_tree, &mut self.saved_dfs_tree);
        debug!(
            "CORESET#{} slot={}: no space for {:?} PDCCH ss={} AL={} ({} allocs, {}/{} CCEs used)",
            self.coreset_id, self.slot_idx, rnti_type, search_space_id,
            aggregation_level(aggr_idx), self.dci_list.len(),
            self.occupied_cces().count_ones(), self.nof_cces()
        );
        Err(PdcchAllocError::NoResources)
    }

    fn commit_record(&mut self, req: DciRequest<'a>, relocated: Option<TreeUndo>) {
        self.dci_list.push(AllocRecord { req, relocated });
        if let Some(node) = self.dfs_tree.last() {
            debug!(
                "CORESET#{} slot={}: allocated {:?} PDCCH rnti={:?} ss={} AL={} ncce={} ({} allocs)",
                self.coreset_id, self.slot_idx, req.rnti_type, node.rnti, req.ss_id,
                aggregation_level(req.aggr_idx), node.dci_pos.ncce, self.dci_list.len()
            );
        }
    }

    /// Tree suffix that differs between the saved tree and the current one,
    /// excluding the node just pushed for the new record
    fn relocation_undo(&self) -> Option<TreeUndo> {
        let prev = &self.saved_dfs_tree;
        let first_level = prev
            .iter()
            .zip(&self.dfs_tree)
            .position(|(old, new)| old.dci_pos_idx != new.dci_pos_idx)?;
        trace!("CORESET#{}: relocated DCIs from level {}", self.coreset_id, first_level);
        Some(TreeUndo {
            first_level,
            nodes: prev[first_level..].to_vec(),
        })
    }

    fn get_cce_loc_table(&self, req: &DciRequest<'a>) -> &'a [u32] {
        self.bwp.cce_positions(req.ss_id, self.slot_idx, req.aggr_idx, req.ue)
    }

    /// Rebuild the tree from its first arrangement, every level starting at
    /// its most preferred candidate
    fn search_from_root(&mut self) -> bool {
        self.dfs_tree.clear();
        self.fill_dfs_levels(0) || self.get_next_dfs()
    }

    /// Place the records that have no tree node yet. The first one starts at
    /// candidate `start_dci_idx`, the following ones at their first candidate.
    fn fill_dfs_levels(&mut self, mut start_dci_idx: usize) -> bool {
        while self.dfs_tree.len() < self.dci_list.len() {
            let level = self.dfs_tree.len();
            let req = self.dci_list[level].req;
            if !self.alloc_dfs_node(req, level, start_dci_idx) {
                return false;
            }
            start_dci_idx = 0;
        }
        true
    }

    /// Advance the tree to the next arrangement of the recorded DCIs.
    /// Returns false when every arrangement has been visited.
    fn get_next_dfs(&mut self) -> bool {
        loop {
            // Reaching the root means all arrangements were tried
            let Some(last) = self.dfs_tree.pop() else {
                return false;
            };
            // Re-add the deepest node with its next candidate
            if self.fill_dfs_levels(last.dci_pos_idx + 1) {
                return true;
            }
        }
    }

    /// Push a node for `req` at the first collision-free candidate at or after
    /// `start_dci_idx`
    fn alloc_dfs_node(&mut self, req: DciRequest<'a>, record_idx: usize, start_dci_idx: usize) -> bool {
        let total_mask = self.occupied_cces();
        let nof_cces = self.nof_cces();
        let nof_dci_cces = aggregation_level(req.aggr_idx);
        let cce_locs = self.get_cce_loc_table(&req);

        for (dci_pos_idx, &ncce) in cce_locs.iter().enumerate().skip(start_dci_idx) {
            let dci_pos = DciLocation { aggr_idx: req.aggr_idx, ncce };
            if ncce.saturating_add(nof_dci_cces) > nof_cces {
                trace!("CORESET#{}: candidate ncce={} AL={} outside CORESET", self.coreset_id, ncce, nof_dci_cces);
                continue;
            }
            let Some(current_mask) = dci_pos.mask() else {
                continue;
            };
            if total_mask.intersects(&current_mask) {
                // PDCCH collision, try another CCE position
                continue;
            }

            self.dfs_tree.push(TreeNode {
                rnti: req.ue.map(|ue| ue.rnti),
                record_idx,
                dci_pos_idx,
                dci_pos,
                total_mask: total_mask | current_mask,
                current_mask,
            });
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mac::sched_config::tests::test_bwp_config;
    use crate::mac::sched_config::{BwpConfig, CcePosTable, SearchSpaceConfig};
    use common::types::SearchSpaceType;
    use common::FuzzRandom;

    /// BWP with a single 4-CCE CORESET, a common search space 0 and a
    /// UE-specific search space 1
    fn small_bwp(common_table: CcePosTable) -> BwpParams {
        let cfg = BwpConfig {
            bwp_id: 0,
            nof_slots: 1,
            coresets: vec![CoresetConfig { id: 0, duration: 1, freq_resources: 0b1111 }],
            search_spaces: vec![
                SearchSpaceConfig {
                    id: 0,
                    coreset_id: 0,
                    ss_type: SearchSpaceType::Common0,
                    nof_candidates: [4, 2, 1, 0, 0],
                    dci_format_0_1_and_1_1: false,
                },
                SearchSpaceConfig {
                    id: 1,
                    coreset_id: 0,
                    ss_type: SearchSpaceType::Ue,
                    nof_candidates: [4, 2, 1, 0, 0],
                    dci_format_0_1_and_1_1: false,
                },
            ],
            ra_search_space_id: None,
        };
        BwpParams::new(cfg).unwrap().with_common_cce_table(0, common_table).unwrap()
    }

    fn ue_with(rnti: u16, aggr_idx: usize, positions: Vec<u32>) -> UeCarrierParams {
        UeCarrierParams::new(Rnti(rnti)).with_cce_table(1, CcePosTable::single(aggr_idx, positions).unwrap())
    }

    fn assert_disjoint(region: &CoresetRegion<'_>) {
        let mut total = CceBitmap::new();
        for grant in region.grants() {
            let mask = grant.dci().location.mask().unwrap();
            assert!(total.is_disjoint(&mask), "overlapping PDCCHs in CORESET#{}", region.coreset_id());
            total |= mask;
        }
        assert_eq!(total, region.occupied_cces());
    }

    #[test]
    fn test_coreset_dimensions() {
        let bwp = BwpParams::new(test_bwp_config()).unwrap();
        let region = CoresetRegion::new(&bwp, bwp.coreset(1).unwrap(), 0);
        assert_eq!(region.get_td_symbols(), 2);
        assert_eq!(region.get_freq_resources(), 8);
        assert_eq!(region.nof_cces(), 16);
        assert_eq!(region.nof_allocs(), 0);
    }

    #[test]
    fn test_broadcast_alloc_first_candidate() {
        let bwp = small_bwp(CcePosTable::single(0, vec![0, 1, 2, 3]).unwrap());
        let mut region = CoresetRegion::new(&bwp, bwp.coreset(0).unwrap(), 0);

        let pdcch = region.alloc_dl_pdcch(RntiType::Si, 0, 0, None).unwrap();
        assert_eq!(pdcch.dci.location, DciLocation { aggr_idx: 0, ncce: 0 });
        assert_eq!(pdcch.dci.rnti, Some(Rnti::SI));
        assert_eq!(pdcch.dci.format, DciFormat::F1_0);
        assert!(pdcch.ue.is_none());
        assert_eq!(region.nof_allocs(), 1);
    }

    #[test]
    fn test_overlapping_request_fails_and_keeps_previous() {
        let bwp = small_bwp(CcePosTable::single(0, vec![0, 1, 2, 3]).unwrap());
        let ue = ue_with(0x4601, 2, vec![0]);
        let mut region = CoresetRegion::new(&bwp, bwp.coreset(0).unwrap(), 0);

        region.alloc_dl_pdcch(RntiType::Si, 0, 0, None).unwrap();
        let before = region.occupied_cces();

        let err = region.alloc_dl_pdcch(RntiType::C, 2, 1, Some(&ue)).unwrap_err();
        assert_eq!(err, PdcchAllocError::NoResources);
        assert_eq!(region.nof_allocs(), 1);
        assert_eq!(region.occupied_cces(), before);
        let grants: Vec<_> = region.grants().collect();
        assert_eq!(grants.len(), 1);
        assert_eq!(grants[0].dci().location.ncce, 0);
    }

    #[test]
    fn test_second_dci_takes_next_candidate() {
        let bwp = small_bwp(CcePosTable::single(1, vec![0, 2]).unwrap());
        let ue = ue_with(0x4601, 1, vec![0, 2]);
        let mut region = CoresetRegion::new(&bwp, bwp.coreset(0).unwrap(), 0);

        let first = region.alloc_dl_pdcch(RntiType::Si, 1, 0, None).unwrap();
        let second = region.alloc_dl_pdcch(RntiType::C, 1, 1, Some(&ue)).unwrap();
        assert_eq!(first.dci.location.ncce, 0);
        assert_eq!(second.dci.location.ncce, 2);
        assert_eq!(second.dci.rnti, Some(Rnti(0x4601)));
        assert_eq!(region.nof_allocs(), 2);
        assert_disjoint(&region);

        // Cancelling the second leaves only the first one at CCE 0
        assert!(region.rem_last_pdcch());
        assert_eq!(region.nof_allocs(), 1);
        assert_eq!(region.occupied_cces(), CceBitmap::from_range(0, 2).unwrap());
    }

    #[test]
    fn test_backtracking_relocates_earlier_dci() {
        // First DCI prefers CCE 0, the second can only go to CCE 0
        let bwp = small_bwp(CcePosTable::single(1, vec![0, 2]).unwrap());
        let ue = ue_with(0x4601, 1, vec![0]);
        let mut region = CoresetRegion::new(&bwp, bwp.coreset(0).unwrap(), 0);

        let first = region.alloc_dl_pdcch(RntiType::Si, 1, 0, None).unwrap();
        assert_eq!(first.dci.location.ncce, 0);
        let before = region.clone();

        let second = region.alloc_dl_pdcch(RntiType::C, 1, 1, Some(&ue)).unwrap();
        assert_eq!(second.dci.location.ncce, 0);
        let positions: Vec<u32> = region.grants().map(|g| g.dci().location.ncce).collect();
        assert_eq!(positions, vec![2, 0]);
        assert_disjoint(&region);

        // Rollback puts the first DCI back where it was
        assert!(region.rem_last_pdcch());
        assert_eq!(region.dfs_tree, before.dfs_tree);
        assert_eq!(region.grants().next().unwrap().dci().location.ncce, 0);
    }

    #[test]
    fn test_backtracking_over_several_levels() {
        // Three AL=1 DCIs, CORESET of 4 CCEs. Only one arrangement fits all.
        let bwp = small_bwp(CcePosTable::single(0, vec![0, 1]).unwrap());
        let ue_a = ue_with(0x4601, 0, vec![0, 2]);
        let ue_b = ue_with(0x4602, 0, vec![0, 1]);
        let mut region = CoresetRegion::new(&bwp, bwp.coreset(0).unwrap(), 0);

        region.alloc_dl_pdcch(RntiType::Si, 0, 0, None).unwrap();
        region.alloc_dl_pdcch(RntiType::C, 0, 1, Some(&ue_a)).unwrap();
        region.alloc_ul_pdcch(0, 1, &ue_b).unwrap();

        let positions: Vec<u32> = region.grants().map(|g| g.dci().location.ncce).collect();
        assert_eq!(positions, vec![0, 2, 1]);

        // A fourth DCI with candidates only at 0 and 1 cannot fit: SI, UE B
        // and UE C would all need one of those two CCEs
        let ue_c = ue_with(0x4603, 0, vec![0, 1]);
        let before = region.dfs_tree.clone();
        let err = region.alloc_dl_pdcch(RntiType::C, 0, 1, Some(&ue_c)).unwrap_err();
        assert!(err.is_resource_exhaustion());
        assert_eq!(region.dfs_tree, before);
        assert_eq!(region.nof_allocs(), 3);
        assert_disjoint(&region);
    }

    #[test]
    fn test_backtracking_moves_every_level() {
        // SI at [0,1], UE A at [1,2]: after both, UE B with [0] needs SI
        // to move to 1 and A to move to 2
        let bwp = small_bwp(CcePosTable::single(0, vec![0, 1]).unwrap());
        let ue_a = ue_with(0x4601, 0, vec![1, 2]);
        let ue_b = ue_with(0x4602, 0, vec![0]);
        let mut region = CoresetRegion::new(&bwp, bwp.coreset(0).unwrap(), 0);

        region.alloc_dl_pdcch(RntiType::Si, 0, 0, None).unwrap();
        region.alloc_dl_pdcch(RntiType::C, 0, 1, Some(&ue_a)).unwrap();
        region.alloc_dl_pdcch(RntiType::C, 0, 1, Some(&ue_b)).unwrap();

        let positions: Vec<u32> = region.grants().map(|g| g.dci().location.ncce).collect();
        assert_eq!(positions, vec![1, 2, 0]);
        assert_disjoint(&region);
    }

    #[test]
    fn test_aggregation_level_larger_than_coreset() {
        let bwp = small_bwp(CcePosTable::single(3, vec![0]).unwrap());
        let mut region = CoresetRegion::new(&bwp, bwp.coreset(0).unwrap(), 0);

        let err = region.alloc_dl_pdcch(RntiType::Si, 3, 0, None).unwrap_err();
        assert_eq!(err, PdcchAllocError::AggregationLevelTooLarge { aggr_level: 8, nof_cces: 4 });
        assert_eq!(region.nof_allocs(), 0);
        assert_eq!(
            region.alloc_dl_pdcch(RntiType::Si, 5, 0, None).unwrap_err(),
            PdcchAllocError::InvalidAggregationLevel(5)
        );
    }

    #[test]
    fn test_out_of_range_candidate_skipped() {
        let bwp = small_bwp(CcePosTable::single(1, vec![3, 2]).unwrap());
        let mut region = CoresetRegion::new(&bwp, bwp.coreset(0).unwrap(), 0);

        let pdcch = region.alloc_dl_pdcch(RntiType::Si, 1, 0, None).unwrap();
        assert_eq!(pdcch.dci.location.ncce, 2);
    }

    #[test]
    fn test_rem_last_on_empty() {
        let bwp = small_bwp(CcePosTable::single(0, vec![0]).unwrap());
        let mut region = CoresetRegion::new(&bwp, bwp.coreset(0).unwrap(), 0);
        assert!(!region.rem_last_pdcch());
        assert_eq!(region.nof_allocs(), 0);
    }

    #[test]
    fn test_reset_behaves_like_new() {
        let bwp = small_bwp(CcePosTable::single(0, vec![0, 1, 2, 3]).unwrap());
        let ue = ue_with(0x4601, 0, vec![0, 1]);
        let mut region = CoresetRegion::new(&bwp, bwp.coreset(0).unwrap(), 0);

        region.alloc_dl_pdcch(RntiType::Si, 0, 0, None).unwrap();
        region.alloc_ul_pdcch(0, 1, &ue).unwrap();
        region.reset();
        assert_eq!(region.nof_allocs(), 0);
        assert!(!region.occupied_cces().any());

        let pdcch = region.alloc_ul_pdcch(0, 1, &ue).unwrap();
        assert_eq!(pdcch.dci.location.ncce, 0);
        assert_eq!(pdcch.dci.format, DciFormat::F0_0);
    }

    #[test]
    fn test_capacity_exceeded_fails_closed() {
        let cfg = BwpConfig {
            bwp_id: 0,
            nof_slots: 1,
            coresets: vec![CoresetConfig { id: 0, duration: 3, freq_resources: (1u64 << 45) - 1 }],
            search_spaces: vec![SearchSpaceConfig {
                id: 1,
                coreset_id: 0,
                ss_type: SearchSpaceType::Ue,
                nof_candidates: [1, 0, 0, 0, 0],
                dci_format_0_1_and_1_1: false,
            }],
            ra_search_space_id: None,
        };
        let bwp = BwpParams::new(cfg).unwrap();
        let ues: Vec<UeCarrierParams> = (0..=MAX_CORESET_RECORDS as u16)
            .map(|i| ue_with(0x4601 + i, 0, vec![i as u32]))
            .collect();
        let mut region = CoresetRegion::new(&bwp, bwp.coreset(0).unwrap(), 0);
        assert_eq!(region.nof_cces(), 135);

        for ue in &ues[..MAX_CORESET_RECORDS] {
            region.alloc_dl_pdcch(RntiType::C, 0, 1, Some(ue)).unwrap();
        }
        let occupied = region.occupied_cces();
        assert_eq!(occupied.count_ones() as usize, MAX_CORESET_RECORDS);

        // CCE 128 is free, but the record list is full
        let err = region.alloc_dl_pdcch(RntiType::C, 0, 1, Some(&ues[MAX_CORESET_RECORDS])).unwrap_err();
        assert_eq!(err, PdcchAllocError::CapacityExceeded);
        assert_eq!(region.nof_allocs(), MAX_CORESET_RECORDS);
        assert_eq!(region.occupied_cces(), occupied);
    }

    #[test]
    fn test_random_sequences_are_disjoint_and_reversible() {
        let bwp = BwpParams::new(test_bwp_config()).unwrap();
        let coreset = bwp.coreset(1).unwrap();
        let mut rng = FuzzRandom::new(1234);

        let ues: Vec<UeCarrierParams> = (0..8u16)
            .map(|i| {
                let mut per_al: [Vec<u32>; MAX_NOF_AGGR_LEVELS] = Default::default();
                for (aggr_idx, positions) in per_al.iter_mut().enumerate().take(4) {
                    let l = aggregation_level(aggr_idx);
                    let nof_blocks = 16 / l;
                    let nof_cands = rng.get_between(1, 4) as u32;
                    *positions = (0..nof_cands)
                        .map(|c| l * ((c + i as u32) % nof_blocks))
                        .collect();
                }
                UeCarrierParams::new(Rnti(0x4601 + i))
                    .with_cce_table(2, CcePosTable::new(per_al).unwrap())
            })
            .collect();

        for _ in 0..20 {
            let mut region = CoresetRegion::new(&bwp, coreset, 0);
            let mut history: Vec<Vec<TreeNode>> = vec![region.dfs_tree.clone()];
            for ue in &ues {
                let aggr_idx = rng.enum_type(4);
                let result = if rng.boolean() {
                    region.alloc_dl_pdcch(RntiType::C, aggr_idx, 2, Some(ue)).map(|_| ())
                } else {
                    region.alloc_ul_pdcch(aggr_idx, 2, ue).map(|_| ())
                };
                match result {
                    Ok(()) => history.push(region.dfs_tree.clone()),
                    Err(_) => assert_eq!(&region.dfs_tree, history.last().unwrap()),
                }
                assert_disjoint(&region);
            }

            // Unwinding restores every intermediate state exactly
            while region.nof_allocs() > 0 {
                history.pop();
                assert!(region.rem_last_pdcch());
                assert_eq!(&region.dfs_tree, history.last().unwrap());
            }
        }
    }

    #[test]
    fn test_same_requests_same_placement() {
        let bwp = BwpParams::new(test_bwp_config()).unwrap();
        let coreset = bwp.coreset(1).unwrap();
        let ues: Vec<UeCarrierParams> = (0..6u16)
            .map(|i| ue_with_ss(0x4601 + i, 2, vec![0, 4, 8, 12]))
            .collect();

        let run = || {
            let mut region = CoresetRegion::new(&bwp, coreset, 0);
            for (i, ue) in ues.iter().enumerate() {
                let _ = region.alloc_dl_pdcch(RntiType::C, 1 + i % 2, 2, Some(ue));
            }
            region.grants().map(|g| g.dci().location).collect::<Vec<_>>()
        };
        assert_eq!(run(), run());
    }

    fn ue_with_ss(rnti: u16, ss_id: u32, positions: Vec<u32>) -> UeCarrierParams {
        let per_al = [positions.clone(), positions.clone(), positions.clone(), positions, Vec::new()];
        UeCarrierParams::new(Rnti(rnti)).with_cce_table(ss_id, CcePosTable::new(per_al).unwrap())
    }
}
