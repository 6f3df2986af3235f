//! Code for reading hourly generation profiles from a CSV file.
use super::input_err_msg;
use crate::site::{ProfileMap, SiteID};
use anyhow::{Context, Result, ensure};
use std::io::Read;
use std::path::Path;
use std::rc::Rc;

/// Read profiles from a CSV reader with one column per site and one row per hour
fn read_profiles_from_reader<R: Read>(reader: R) -> Result<ProfileMap> {
    let mut reader = csv::Reader::from_reader(reader);
    let site_ids: Vec<SiteID> = reader
        .headers()?
        .iter()
        .map(|header| header.trim().into())
        .collect();
    ensure!(!site_ids.is_empty(), "No site columns found");

    let mut columns = vec![Vec::new(); site_ids.len()];
    for (hour, record) in reader.records().enumerate() {
        let record = record?;
        for ((site_id, column), value) in site_ids.iter().zip(&mut columns).zip(record.iter()) {
            let value: f64 = value
                .trim()
                .parse()
                .with_context(|| format!("Invalid value for site {site_id} at hour {hour}"))?;
            ensure!(
                value.is_finite(),
                "Non-finite value for site {site_id} at hour {hour}"
            );
            column.push(value);
        }
    }
    ensure!(!columns[0].is_empty(), "Profiles must have at least one hour");

    let mut profiles = ProfileMap::new();
    for (site_id, column) in site_ids.into_iter().zip(columns) {
        let profile: Rc<[f64]> = column.into();
        ensure!(
            profiles.insert(site_id.clone(), profile).is_none(),
            "Duplicate profile for site {site_id}"
        );
    }

    Ok(profiles)
}

/// Read hourly capacity factor profiles from a CSV file.
///
/// The header row holds site IDs and every following row is one hour.
///
/// # Arguments
///
/// * `file_path` - Path to the CSV file
pub fn read_profiles(file_path: &Path) -> Result<ProfileMap> {
    let file = std::fs::File::open(file_path).with_context(|| input_err_msg(file_path))?;
    read_profiles_from_reader(file).with_context(|| input_err_msg(file_path))
}
