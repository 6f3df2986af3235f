//! Code for reading a price index (e.g. CPI) from a CSV file.
use super::{input_err_msg, read_csv};
use crate::finance::PriceIndex;
use anyhow::{Context, Result, ensure};
use indexmap::IndexMap;
use serde::Deserialize;
use std::path::Path;

/// One year of a price index, as read from a CSV file
#[derive(PartialEq, Debug, Deserialize)]
struct PriceIndexRaw {
    year: u32,
    value: f64,
}

/// Build a [`PriceIndex`] from an iterator of raw records
fn read_price_index_from_iter<I>(iter: I) -> Result<PriceIndex>
where
    I: Iterator<Item = PriceIndexRaw>,
{
    let mut values = IndexMap::new();
    for raw in iter {
        ensure!(
            raw.value.is_finite() && raw.value > 0.0,
            "Price index value for {} must be a positive number",
            raw.year
        );
        ensure!(
            values.insert(raw.year, raw.value).is_none(),
            "Duplicate price index entry for {}",
            raw.year
        );
    }
    values.sort_keys();

    Ok(PriceIndex::new(values))
}

/// Read a yearly price index from a CSV file with `year` and `value` columns.
///
/// # Arguments
///
/// * `file_path` - Path to the CSV file
pub fn read_price_index(file_path: &Path) -> Result<PriceIndex> {
    let iter = read_csv::<PriceIndexRaw>(file_path)?;
    read_price_index_from_iter(iter).with_context(|| input_err_msg(file_path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::assert_error;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_read_price_index() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("cpi.csv");
        {
            let mut file = File::create(&file_path).unwrap();
            writeln!(file, "year,value\n2010,218.056\n2000,172.2").unwrap();
        }

        let index = read_price_index(&file_path).unwrap();
        assert_eq!(index.value(2000).unwrap(), 172.2);
        assert_eq!(index.value(2010).unwrap(), 218.056);
        assert_eq!(index.years().collect::<Vec<_>>(), vec![2000, 2010]);
    }

    #[test]
    fn test_read_price_index_duplicate_year() {
        let iter = [
            PriceIndexRaw {
                year: 2000,
                value: 1.0,
            },
            PriceIndexRaw {
                year: 2000,
                value: 2.0,
            },
        ]
        .into_iter();
        assert_error!(
            read_price_index_from_iter(iter),
            "Duplicate price index entry for 2000"
        );
    }

    #[test]
    fn test_read_price_index_bad_value() {
        let iter = std::iter::once(PriceIndexRaw {
            year: 2000,
            value: 0.0,
        });
        assert_error!(
            read_price_index_from_iter(iter),
            "Price index value for 2000 must be a positive number"
        );
    }
}
