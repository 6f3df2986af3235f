//! Code for reading candidate sites from a CSV file.
use super::input_err_msg;
use crate::site::{CAPACITY_COLUMN, REGION_COLUMN, SITE_ID_COLUMN, Site, SiteMap};
use crate::units::Capacity;
use anyhow::{Context, Result, ensure};
use csv::StringRecord;
use indexmap::IndexMap;
use std::path::Path;

/// The kind of data held in a column other than the required ones
#[derive(Debug, Clone, Copy, PartialEq)]
enum ColumnKind {
    Numeric,
    Categorical,
}

/// Get the index of a required column
fn column_index(headers: &StringRecord, name: &str) -> Result<usize> {
    headers
        .iter()
        .position(|header| header == name)
        .with_context(|| format!("Missing required column '{name}'"))
}

/// A column is numeric if every value in it can be parsed as a number
fn column_kind(records: &[StringRecord], idx: usize) -> ColumnKind {
    let all_numeric = records
        .iter()
        .all(|record| record[idx].trim().parse::<f64>().is_ok());

    if all_numeric {
        ColumnKind::Numeric
    } else {
        ColumnKind::Categorical
    }
}

/// Read sites from the header and records of a CSV file
fn read_sites_from_records(headers: &StringRecord, records: &[StringRecord]) -> Result<SiteMap> {
    ensure!(!records.is_empty(), "No sites found");

    let id_idx = column_index(headers, SITE_ID_COLUMN)?;
    let region_idx = column_index(headers, REGION_COLUMN)?;
    let capacity_idx = column_index(headers, CAPACITY_COLUMN)?;

    let other_columns: Vec<_> = headers
        .iter()
        .enumerate()
        .filter(|(idx, _)| ![id_idx, region_idx, capacity_idx].contains(idx))
        .map(|(idx, name)| (idx, name, column_kind(records, idx)))
        .collect();

    let mut sites = SiteMap::new();
    for record in records {
        let id = record[id_idx].trim();
        ensure!(!id.is_empty(), "Empty site ID found");

        let capacity: f64 = record[capacity_idx]
            .trim()
            .parse()
            .with_context(|| format!("Invalid capacity for site {id}"))?;
        ensure!(
            capacity.is_finite() && capacity >= 0.0,
            "Capacity for site {id} must be a finite, non-negative number"
        );

        let mut numeric = IndexMap::new();
        let mut categorical = IndexMap::new();
        for (idx, name, kind) in &other_columns {
            let raw = record[*idx].trim();
            match kind {
                ColumnKind::Numeric => {
                    // Checked when determining the column kind
                    let value: f64 = raw.parse()?;
                    ensure!(
                        value.is_finite(),
                        "Non-finite value for column '{name}' at site {id}"
                    );
                    numeric.insert(name.to_string(), value);
                }
                ColumnKind::Categorical => {
                    categorical.insert(name.to_string(), raw.to_string());
                }
            }
        }

        let site = Site {
            id: id.into(),
            region: record[region_idx].trim().into(),
            capacity: Capacity(capacity),
            numeric,
            categorical,
        };
        ensure!(
            sites.insert(site.id.clone(), site).is_none(),
            "Duplicate site ID {id}"
        );
    }

    Ok(sites)
}

/// Read sites from a CSV file.
///
/// The file must have `cpa_id`, `region` and `mw` columns. Every other column is treated as
/// numeric if all of its values are numbers and categorical otherwise.
///
/// # Arguments
///
/// * `file_path` - Path to the CSV file
///
/// # Returns
///
/// The sites, in the order they appear in the file, or an error.
pub fn read_sites(file_path: &Path) -> Result<SiteMap> {
    let read = || -> Result<SiteMap> {
        let mut reader = csv::Reader::from_path(file_path)?;
        let headers = reader.headers()?.clone();
        let records = reader.records().collect::<Result<Vec<_>, _>>()?;
        read_sites_from_records(&headers, &records)
    };

    read().with_context(|| input_err_msg(file_path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::assert_error;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    /// Create a sites file in dir_path with the given contents
    fn create_sites_file(dir_path: &Path, contents: &str) -> std::path::PathBuf {
        let file_path = dir_path.join("sites.csv");
        let mut file = File::create(&file_path).unwrap();
        write!(file, "{contents}").unwrap();
        file_path
    }

    #[test]
    fn test_read_sites() {
        let dir = tempdir().unwrap();
        let file_path = create_sites_file(
            dir.path(),
            "cpa_id,region,mw,lcoe,county
1,A,10,42.5,Adams
2,B,20.5,40,Brown
",
        );

        let sites = read_sites(&file_path).unwrap();
        assert_eq!(sites.len(), 2);

        let site = &sites["2"];
        assert_eq!(site.region, "B".into());
        assert_eq!(site.capacity, Capacity(20.5));
        assert_eq!(site.numeric["lcoe"], 40.0);
        assert_eq!(site.categorical["county"], "Brown");
        assert!(!site.numeric.contains_key("county"));
    }

    fn headers() -> StringRecord {
        StringRecord::from(vec!["cpa_id", "region", "mw", "lcoe"])
    }

    #[test]
    fn test_read_sites_duplicate_id() {
        let records = vec![
            StringRecord::from(vec!["1", "A", "10", "1.0"]),
            StringRecord::from(vec!["1", "A", "10", "2.0"]),
        ];
        assert_error!(
            read_sites_from_records(&headers(), &records),
            "Duplicate site ID 1"
        );
    }

    #[test]
    fn test_read_sites_bad_capacity() {
        let records = vec![StringRecord::from(vec!["1", "A", "-10", "1.0"])];
        assert_error!(
            read_sites_from_records(&headers(), &records),
            "Capacity for site 1 must be a finite, non-negative number"
        );
    }

    #[test]
    fn test_read_sites_non_finite_value() {
        let records = vec![StringRecord::from(vec!["1", "A", "10", "NaN"])];
        assert_error!(
            read_sites_from_records(&headers(), &records),
            "Non-finite value for column 'lcoe' at site 1"
        );
    }

    #[test]
    fn test_read_sites_missing_column() {
        let headers = StringRecord::from(vec!["cpa_id", "region", "lcoe"]);
        let records = vec![StringRecord::from(vec!["1", "A", "1.0"])];
        assert_error!(
            read_sites_from_records(&headers, &records),
            "Missing required column 'mw'"
        );
    }
}
