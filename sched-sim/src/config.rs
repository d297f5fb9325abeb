//! Simulation Configuration
//! 
//! Cell PDCCH layout and synthetic traffic profile, loaded from TOML or YAML

use anyhow::Context;
use layers::mac::{BwpConfig, CoresetConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level simulation configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SimConfig {
    /// Cell configuration
    #[serde(default)]
    pub cell: CellConfig,
    /// BWP PDCCH configuration
    pub bwp: BwpConfig,
    /// Traffic profile
    #[serde(default)]
    pub traffic: TrafficConfig,
}

/// Cell configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CellConfig {
    /// Common subcarrier spacing in kHz
    #[serde(default = "default_scs_khz")]
    pub common_scs: u32,
    /// CORESET#0 table index, used when the BWP does not configure CORESET#0
    #[serde(default)]
    pub coreset0_index: Option<u8>,
}

impl Default for CellConfig {
    fn default() -> Self {
        Self {
            common_scs: default_scs_khz(),
            coreset0_index: None,
        }
    }
}

fn default_scs_khz() -> u32 {
    15
}

/// Synthetic traffic profile
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TrafficConfig {
    /// Number of connected UEs
    #[serde(default = "default_nof_ues")]
    pub nof_ues: u16,
    /// First C-RNTI
    #[serde(default = "default_first_rnti")]
    pub first_rnti: u16,
    /// UE-specific search space
    #[serde(default = "default_ue_ss_id")]
    pub ue_search_space_id: u32,
    /// SIB1 search space
    #[serde(default)]
    pub si_search_space_id: Option<u32>,
    /// SIB1 periodicity in slots
    #[serde(default = "default_si_period")]
    pub si_period_slots: u32,
    /// Paging search space
    #[serde(default)]
    pub paging_search_space_id: Option<u32>,
    /// Probability of a paging DCI per slot, in percent
    #[serde(default)]
    pub paging_pct: u8,
    /// Probability of a RAR per slot, in percent
    #[serde(default = "default_rar_pct")]
    pub rar_pct: u8,
    /// Probability of a UE having DL or UL data in a slot, in percent
    #[serde(default = "default_ue_activity_pct")]
    pub ue_activity_pct: u8,
    /// Probability that the data channel allocation of a grant fails, in percent
    #[serde(default = "default_data_failure_pct")]
    pub data_failure_pct: u8,
}

impl Default for TrafficConfig {
    fn default() -> Self {
        Self {
            nof_ues: default_nof_ues(),
            first_rnti: default_first_rnti(),
            ue_search_space_id: default_ue_ss_id(),
            si_search_space_id: None,
            si_period_slots: default_si_period(),
            paging_search_space_id: None,
            paging_pct: 0,
            rar_pct: default_rar_pct(),
            ue_activity_pct: default_ue_activity_pct(),
            data_failure_pct: default_data_failure_pct(),
        }
    }
}

fn default_nof_ues() -> u16 {
    8
}

fn default_first_rnti() -> u16 {
    0x4601
}

fn default_ue_ss_id() -> u32 {
    2
}

fn default_si_period() -> u32 {
    20
}

fn default_rar_pct() -> u8 {
    10
}

fn default_ue_activity_pct() -> u8 {
    50
}

fn default_data_failure_pct() -> u8 {
    5
}

impl SimConfig {
    /// Load configuration from a TOML or YAML file, chosen by extension
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config = match path.extension().and_then(|e| e.to_str()) {
            Some("yml") | Some("yaml") => Self::from_yaml_str(&contents)?,
            _ => Self::from_toml_str(&contents)?,
        };
        config.with_coreset0()
    }

    /// Parse TOML configuration
    pub fn from_toml_str(contents: &str) -> anyhow::Result<Self> {
        toml::from_str(contents).context("Invalid TOML configuration")
    }

    /// Parse YAML configuration
    pub fn from_yaml_str(contents: &str) -> anyhow::Result<Self> {
        serde_yaml::from_str(contents).context("Invalid YAML configuration")
    }

    /// Add CORESET#0 from its table index when the BWP lacks it
    fn with_coreset0(mut self) -> anyhow::Result<Self> {
        if let Some(index) = self.cell.coreset0_index {
            if !self.bwp.coresets.iter().any(|c| c.id == 0) {
                let coreset0 = CoresetConfig::coreset0(index).context("Invalid coreset0_index")?;
                self.bwp.coresets.insert(0, coreset0);
            }
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::types::SearchSpaceType;

    const TOML_CFG: &str = r#"
[cell]
coreset0_index = 6

[[bwp.coresets]]
id = 1
duration = 2
freq_resources = 255

[[bwp.search_spaces]]
id = 0
coreset_id = 0
ss_type = "common0"
nof_candidates = [0, 0, 4, 2, 1]

[[bwp.search_spaces]]
id = 2
coreset_id = 1
ss_type = "ue"
nof_candidates = [2, 2, 2, 1, 0]
dci_format_0_1_and_1_1 = true

[traffic]
nof_ues = 4
si_search_space_id = 0
"#;

    #[test]
    fn test_parse_toml() {
        let cfg = SimConfig::from_toml_str(TOML_CFG).unwrap().with_coreset0().unwrap();
        assert_eq!(cfg.cell.common_scs, 15);
        assert_eq!(cfg.bwp.coresets.len(), 2);
        assert_eq!(cfg.bwp.coresets[0].id, 0);
        assert_eq!(cfg.bwp.coresets[0].nof_cces(), 8);
        assert_eq!(cfg.bwp.search_spaces[1].ss_type, SearchSpaceType::Ue);
        assert_eq!(cfg.bwp.nof_slots, 10);
        assert_eq!(cfg.traffic.nof_ues, 4);
        assert_eq!(cfg.traffic.ue_search_space_id, 2);
        assert_eq!(cfg.traffic.si_search_space_id, Some(0));
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
bwp:
  coresets:
    - { id: 1, duration: 1, freq_resources: 15 }
  search_spaces:
    - { id: 2, coreset_id: 1, ss_type: ue, nof_candidates: [4, 2, 1, 0, 0] }
"#;
        let cfg = SimConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(cfg.bwp.coresets[0].nof_cces(), 4);
        assert!(!cfg.bwp.search_spaces[0].dci_format_0_1_and_1_1);
        assert_eq!(cfg.traffic.nof_ues, 8);
        assert_eq!(cfg.cell.coreset0_index, None);
    }

    #[test]
    fn test_invalid_coreset0_index() {
        let toml_cfg = TOML_CFG.replace("coreset0_index = 6", "coreset0_index = 99");
        let cfg = SimConfig::from_toml_str(&toml_cfg).unwrap();
        let err = cfg.with_coreset0().unwrap_err();
        assert!(err.to_string().contains("coreset0_index"));
        assert!(format!("{:#}", err).contains("Invalid CORESET#0 index: 99"));
    }

    #[test]
    fn test_coreset0_index_ignored_when_configured() {
        let toml_cfg = TOML_CFG.replace(
            "[[bwp.coresets]]\nid = 1",
            "[[bwp.coresets]]\nid = 0\nduration = 1\nfreq_resources = 15\n\n[[bwp.coresets]]\nid = 1",
        );
        let cfg = SimConfig::from_toml_str(&toml_cfg).unwrap().with_coreset0().unwrap();
        assert_eq!(cfg.bwp.coresets.len(), 2);
        assert_eq!(cfg.bwp.coresets[0].nof_cces(), 4);
    }

    #[test]
    fn test_invalid_toml() {
        assert!(SimConfig::from_toml_str("bwp = 3").is_err());
    }
}
