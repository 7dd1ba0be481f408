use std::collections::HashMap;

use serde::Deserialize;

use crate::tedapi::GatewayError;

pub mod device;
pub mod format;
pub mod system;

#[derive(Debug, thiserror::Error)]
pub enum StatusError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error("bad status json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("could not get BMS data from device")]
    MissingBms,
    #[error("could not get battery energy data")]
    MissingEnergy,
    #[error("got multiple PCH: {0}")]
    MultiplePch(usize),
}

#[derive(Deserialize, Debug, Clone)]
pub(crate) struct Signal {
    pub name: String,
    #[serde(default)]
    pub value: Option<f64>,
}

/// Signals with a value, by name.
pub(crate) fn signal_map(signals: &[Signal]) -> HashMap<&str, f64> {
    signals
        .iter()
        .filter_map(|s| s.value.map(|v| (s.name.as_str(), v)))
        .collect()
}
