//! Protocol Stack Layers Library
//! 
//! This crate implements the MAC scheduler's PDCCH resource allocation for
//! 5G NR (3GPP TS 38.211 Section 7.3.2, TS 38.213 Section 10.1).

pub mod mac;

use thiserror::Error;

/// Common errors for protocol layers
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LayerError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}
