//! PDCCH Scheduler Simulation
//! 
//! Drives the BWP PDCCH allocator slot by slot with synthetic SI, RAR, paging
//! and UE traffic, and reports how many DCIs fit in the CORESETs.

mod config;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use common::types::{Rnti, RntiType, SearchSpaceType, SubcarrierSpacing, MAX_NOF_AGGR_LEVELS};
use common::utils::time;
use common::FuzzRandom;
use layers::mac::{
    BwpParams, BwpPdcchAllocator, CcePosTable, DciContext, PdcchAllocError, UeCarrierParams,
};

use config::{SimConfig, TrafficConfig};

/// PDCCH scheduler simulation
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (TOML or YAML)
    #[arg(short, long, default_value = "pdcch_sim.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Number of slots to simulate
    #[arg(long, default_value = "100")]
    slots: u32,

    /// Random seed
    #[arg(long, default_value = "42")]
    seed: u64,

    /// Override the number of UEs of the configuration
    #[arg(long)]
    nof_ues: Option<u16>,

    /// Print the DCIs of every slot as JSON lines
    #[arg(long)]
    json: bool,
}

/// Counters accumulated over the simulation
#[derive(Debug, Default)]
struct SimStats {
    attempts: u64,
    allocated: u64,
    exhausted: u64,
    rejected: u64,
    cancelled: u64,
    occupied_cces: u64,
    available_cces: u64,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .init();

    info!("Starting PDCCH scheduler simulation");
    info!("Configuration file: {}", args.config.display());

    let mut cfg = SimConfig::from_file(&args.config)?;
    if let Some(nof_ues) = args.nof_ues {
        cfg.traffic.nof_ues = nof_ues;
    }

    let scs = match cfg.cell.common_scs {
        15 => SubcarrierSpacing::Scs15,
        30 => SubcarrierSpacing::Scs30,
        60 => SubcarrierSpacing::Scs60,
        120 => SubcarrierSpacing::Scs120,
        240 => SubcarrierSpacing::Scs240,
        _ => return Err(anyhow::anyhow!("Invalid subcarrier spacing: {} kHz", cfg.cell.common_scs)),
    };

    let bwp = BwpParams::new(cfg.bwp.clone()).context("Invalid BWP configuration")?;
    let ues = build_ues(&bwp, &cfg.traffic)?;

    info!("Cell configuration:");
    info!(
        "  SCS: {} kHz ({} slots per frame, {} us per slot)",
        cfg.cell.common_scs,
        time::slots_per_frame(scs),
        time::slot_duration_us(scs)
    );
    for cs in &bwp.cfg.coresets {
        info!("  CORESET#{}: {} symbols, {} CCEs", cs.id, cs.duration, cs.nof_cces());
    }
    for ss in bwp.search_spaces() {
        info!("  SearchSpace#{}: {:?} on CORESET#{}, candidates {:?}",
              ss.id, ss.ss_type, ss.coreset_id, ss.nof_candidates);
    }
    info!("  UEs: {}", ues.len());

    let mut rng = FuzzRandom::new(args.seed);
    let mut stats = SimStats::default();
    let slots_per_frame = time::slots_per_frame(scs);

    for slot in 0..args.slots {
        let mut pdcch = BwpPdcchAllocator::new(&bwp, slot % bwp.nof_slots());
        run_slot(&mut pdcch, &bwp, &cfg.traffic, &ues, slot, &mut rng, &mut stats);

        debug!(
            "SFN={} slot={} (table slot {}): {} DL and {} UL PDCCHs",
            slot / slots_per_frame,
            slot % slots_per_frame,
            pdcch.slot_idx(),
            pdcch.nof_dl_allocations(),
            pdcch.nof_ul_allocations()
        );
        for cs in &bwp.cfg.coresets {
            if let Some(region) = pdcch.coreset(cs.id) {
                let occupied = region.occupied_cces();
                debug!("  CORESET#{} CCEs used: {:?}", cs.id, occupied);
                stats.occupied_cces += u64::from(occupied.count_ones());
                stats.available_cces += u64::from(region.nof_cces());
            }
        }

        if args.json {
            for grant in pdcch.grants() {
                println!("{}", dci_json(slot, grant.dci()));
            }
        }
    }

    let utilization = if stats.available_cces > 0 {
        100.0 * stats.occupied_cces as f64 / stats.available_cces as f64
    } else {
        0.0
    };
    info!("Simulation finished after {} slots", args.slots);
    info!("  PDCCH attempts: {}", stats.attempts);
    info!("  Allocated: {}", stats.allocated);
    info!("  No resources: {}", stats.exhausted);
    info!("  Rejected: {}", stats.rejected);
    info!("  Cancelled: {}", stats.cancelled);
    info!("  CCE utilization: {:.1}%", utilization);

    Ok(())
}

/// Create the UE contexts with per-slot candidate tables for the UE search space.
///
/// Candidates are the common positions rotated by RNTI and slot, spreading the
/// UEs over the CORESET.
fn build_ues(bwp: &BwpParams, traffic: &TrafficConfig) -> Result<Vec<UeCarrierParams>> {
    let ss_id = traffic.ue_search_space_id;
    let ss = bwp
        .search_space(ss_id)
        .ok_or_else(|| anyhow::anyhow!("UE SearchSpace#{} not configured", ss_id))?;
    if ss.ss_type != SearchSpaceType::Ue {
        return Err(anyhow::anyhow!("SearchSpace#{} is not UE-specific", ss_id));
    }
    let nof_cces = bwp
        .coreset(ss.coreset_id)
        .map(|cs| cs.nof_cces())
        .ok_or_else(|| anyhow::anyhow!("CORESET#{} not configured", ss.coreset_id))?;
    let base = CcePosTable::common(nof_cces, &ss.nof_candidates);

    let mut ues = Vec::with_capacity(traffic.nof_ues as usize);
    for i in 0..traffic.nof_ues {
        let rnti = Rnti::new(traffic.first_rnti.wrapping_add(i));
        let mut tables = Vec::with_capacity(bwp.nof_slots() as usize);
        for slot in 0..bwp.nof_slots() {
            let shift = rnti.value() as usize + slot as usize;
            let per_al: [Vec<u32>; MAX_NOF_AGGR_LEVELS] = std::array::from_fn(|aggr_idx| {
                let mut positions = base.positions(aggr_idx).to_vec();
                if !positions.is_empty() {
                    let len = positions.len();
                    positions.rotate_left(shift % len);
                }
                positions
            });
            tables.push(CcePosTable::new(per_al)?);
        }
        ues.push(UeCarrierParams::new(rnti).with_slot_cce_tables(ss_id, tables));
    }
    Ok(ues)
}

/// Schedule the PDCCHs of one slot
fn run_slot<'a>(
    pdcch: &mut BwpPdcchAllocator<'a>,
    bwp: &'a BwpParams,
    traffic: &TrafficConfig,
    ues: &'a [UeCarrierParams],
    slot: u32,
    rng: &mut FuzzRandom,
    stats: &mut SimStats,
) {
    if let Some(ss_id) = traffic.si_search_space_id {
        if traffic.si_period_slots > 0 && slot % traffic.si_period_slots == 0 {
            let aggr_idx = pick_aggr_idx(bwp, ss_id, rng);
            let res = pdcch.alloc_dl_pdcch(RntiType::Si, ss_id, aggr_idx, None).map(|_| ());
            record(stats, "SI", res);
        }
    }

    if let Some(ss_id) = bwp.cfg.ra_search_space_id {
        if chance(rng, traffic.rar_pct) {
            let aggr_idx = pick_aggr_idx(bwp, ss_id, rng);
            let res = pdcch.alloc_dl_pdcch(RntiType::Ra, ss_id, aggr_idx, None).map(|_| ());
            record(stats, "RAR", res);
        }
    }

    if let Some(ss_id) = traffic.paging_search_space_id {
        if chance(rng, traffic.paging_pct) {
            let aggr_idx = pick_aggr_idx(bwp, ss_id, rng);
            let res = pdcch.alloc_dl_pdcch(RntiType::P, ss_id, aggr_idx, None).map(|_| ());
            record(stats, "Paging", res);
        }
    }

    let ss_id = traffic.ue_search_space_id;
    for ue in ues {
        for is_dl in [true, false] {
            if !chance(rng, traffic.ue_activity_pct) {
                continue;
            }
            let aggr_idx = pick_aggr_idx(bwp, ss_id, rng);
            let mut res = alloc_ue_pdcch(pdcch, ss_id, aggr_idx, ue, is_dl);
            // Fall back to a smaller aggregation level once when the CORESET is full
            if matches!(res, Err(e) if e.is_resource_exhaustion()) && aggr_idx > 0 {
                res = alloc_ue_pdcch(pdcch, ss_id, aggr_idx - 1, ue, is_dl);
            }
            let ok = res.is_ok();
            record(stats, if is_dl { "DL" } else { "UL" }, res);

            // Data channel allocation failed, the DCI is of no use
            if ok && chance(rng, traffic.data_failure_pct) && pdcch.rem_last_pdcch(ss_id) {
                stats.allocated -= 1;
                stats.cancelled += 1;
            }
        }
    }
}

fn alloc_ue_pdcch<'a>(
    pdcch: &mut BwpPdcchAllocator<'a>,
    ss_id: u32,
    aggr_idx: usize,
    ue: &'a UeCarrierParams,
    is_dl: bool,
) -> Result<(), PdcchAllocError> {
    if is_dl {
        pdcch.alloc_dl_pdcch(RntiType::C, ss_id, aggr_idx, Some(ue)).map(|_| ())
    } else {
        pdcch.alloc_ul_pdcch(ss_id, aggr_idx, ue).map(|_| ())
    }
}

/// Random aggregation level among those with candidates in the search space
fn pick_aggr_idx(bwp: &BwpParams, ss_id: u32, rng: &mut FuzzRandom) -> usize {
    let levels: Vec<usize> = bwp
        .search_space(ss_id)
        .map(|ss| (0..MAX_NOF_AGGR_LEVELS).filter(|&i| ss.nof_candidates[i] > 0).collect())
        .unwrap_or_default();
    if levels.is_empty() {
        return 0;
    }
    levels[rng.enum_type(levels.len())]
}

/// JSON line of one DCI
fn dci_json(slot: u32, dci: &DciContext) -> serde_json::Value {
    serde_json::json!({ "slot": slot, "dci": dci })
}

fn chance(rng: &mut FuzzRandom, pct: u8) -> bool {
    rng.get_between(0, 99) < i32::from(pct)
}

fn record(stats: &mut SimStats, kind: &str, res: Result<(), PdcchAllocError>) {
    stats.attempts += 1;
    match res {
        Ok(()) => stats.allocated += 1,
        Err(e) if e.is_resource_exhaustion() => {
            debug!("{} PDCCH not allocated: {}", kind, e);
            stats.exhausted += 1;
        }
        Err(e) => {
            warn!("{} PDCCH rejected: {}", kind, e);
            stats.rejected += 1;
        }
    }
}
