//! Clustering of candidate renewable sites for capacity-expansion models.
#![warn(missing_docs)]
use std::path::PathBuf;

pub mod cli;
pub mod cluster;
pub mod finance;
pub mod id;
pub mod input;
pub mod log;
pub mod model;
pub mod output;
pub mod region;
pub mod settings;
pub mod site;
pub mod units;

#[cfg(test)]
mod fixture;

/// Get the folder where program settings are stored.
///
/// Falls back to the current directory if the platform has no config folder.
pub fn get_config_dir() -> PathBuf {
    let mut path = dirs::config_dir().unwrap_or_default();
    path.push("sitecluster");

    path
}
