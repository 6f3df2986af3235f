//! The module responsible for writing output data to disk.
use crate::cluster::ClusterRow;
use crate::model::TechnologyClusters;
use anyhow::{Context, Result, ensure};
use indexmap::IndexSet;
use itertools::Itertools;
use std::fs;
use std::fs::File;
use std::path::{Path, PathBuf};

pub mod metadata;

/// The root folder in which output folders for each settings file will be created
const OUTPUT_DIRECTORY_ROOT: &str = "sitecluster_results";

/// The output file name for aggregated clusters
const CLUSTERS_FILE_NAME: &str = "clusters.csv";

/// The output file name for cluster profiles
const CLUSTER_PROFILES_FILE_NAME: &str = "cluster_profiles.csv";

/// Separator between site IDs in the `site_ids` column
const SITE_ID_SEPARATOR: &str = ";";

/// Get the default output folder for the given cluster settings file
pub fn get_output_dir(settings_path: &Path) -> Result<PathBuf> {
    let name = settings_path
        .file_stem()
        .context("Settings path has no file name")?
        .to_str()
        .context("Invalid chars in settings file name")?;

    Ok([OUTPUT_DIRECTORY_ROOT, name].iter().collect())
}

/// Create a new output directory.
///
/// If the directory already exists, it is only replaced if `allow_overwrite` is true.
///
/// # Returns
///
/// Whether an existing directory was overwritten.
pub fn create_output_directory(output_dir: &Path, allow_overwrite: bool) -> Result<bool> {
    let overwrite = output_dir.is_dir();
    if overwrite {
        ensure!(
            allow_overwrite,
            "Output folder already exists. Use the --overwrite option to replace it."
        );
        fs::remove_dir_all(output_dir)?;
    }

    fs::create_dir_all(output_dir)?;

    Ok(overwrite)
}

/// The name used for a cluster in both output files
fn resource_name(clusters: &TechnologyClusters, index: usize) -> String {
    format!("{}_{}_{}", clusters.region, clusters.technology, index + 1)
}

/// Column names used by any cluster, in order of first appearance
fn column_names<'a, F, I>(results: &'a [TechnologyClusters], columns: F) -> IndexSet<&'a str>
where
    F: Fn(&'a ClusterRow) -> I,
    I: Iterator<Item = &'a str>,
{
    results
        .iter()
        .flat_map(|clusters| &clusters.rows)
        .flat_map(columns)
        .collect()
}

/// Writes clusters for every technology and region to CSV files
pub struct DataWriter {
    clusters_writer: csv::Writer<File>,
    profiles_writer: csv::Writer<File>,
}

impl DataWriter {
    /// Open CSV files to write output data to
    ///
    /// # Arguments
    ///
    /// * `output_path` - Folder where files will be saved
    pub fn create(output_path: &Path) -> Result<Self> {
        let new_writer = |file_name| {
            let file_path = output_path.join(file_name);
            csv::Writer::from_path(&file_path)
                .with_context(|| format!("Could not create {}", file_path.display()))
        };

        Ok(Self {
            clusters_writer: new_writer(CLUSTERS_FILE_NAME)?,
            profiles_writer: new_writer(CLUSTER_PROFILES_FILE_NAME)?,
        })
    }

    /// Write one row per cluster.
    ///
    /// Columns which only some clusters have are left empty for the others.
    pub fn write_clusters(&mut self, results: &[TechnologyClusters]) -> Result<()> {
        let numeric = column_names(results, |row| row.numeric.keys().map(String::as_str));
        let categorical = column_names(results, |row| row.categorical.keys().map(String::as_str));

        let mut header = vec![
            "resource",
            "technology",
            "region",
            "cluster",
            "mw",
            "n_sites",
        ];
        header.extend(&numeric);
        header.extend(&categorical);
        header.push("site_ids");
        self.clusters_writer.write_record(&header)?;

        for clusters in results {
            for (index, row) in clusters.rows.iter().enumerate() {
                let mut record = vec![
                    resource_name(clusters, index),
                    clusters.technology.clone(),
                    clusters.region.clone(),
                    row.label.to_string(),
                    row.capacity.to_string(),
                    row.n_sites.to_string(),
                ];
                record.extend(numeric.iter().map(|column| {
                    row.numeric
                        .get(*column)
                        .map(ToString::to_string)
                        .unwrap_or_default()
                }));
                record.extend(
                    categorical
                        .iter()
                        .map(|column| row.categorical.get(*column).cloned().unwrap_or_default()),
                );
                record.push(row.site_ids.iter().join(SITE_ID_SEPARATOR));
                self.clusters_writer.write_record(&record)?;
            }
        }

        Ok(())
    }

    /// Write the profile of each cluster as a column, with one row per hour
    pub fn write_profiles(&mut self, results: &[TechnologyClusters]) -> Result<()> {
        let columns: Vec<(String, &ClusterRow)> = results
            .iter()
            .flat_map(|clusters| {
                clusters
                    .rows
                    .iter()
                    .enumerate()
                    .map(move |(index, row)| (resource_name(clusters, index), row))
            })
            .collect();
        if columns.is_empty() {
            return Ok(());
        }

        let mut header = vec!["hour".to_string()];
        header.extend(columns.iter().map(|(name, _)| name.clone()));
        self.profiles_writer.write_record(&header)?;

        let hours = columns
            .iter()
            .map(|(_, row)| row.profile.len())
            .max()
            .unwrap_or_default();
        for hour in 0..hours {
            let mut record = vec![(hour + 1).to_string()];
            record.extend(columns.iter().map(|(_, row)| {
                row.profile
                    .get(hour)
                    .map(ToString::to_string)
                    .unwrap_or_default()
            }));
            self.profiles_writer.write_record(&record)?;
        }

        Ok(())
    }

    /// Flush the underlying streams
    pub fn flush(&mut self) -> Result<()> {
        self.clusters_writer.flush()?;
        self.profiles_writer.flush()?;

        Ok(())
    }
}

/// Write all output files for a set of clusters
pub fn write_clusters(output_path: &Path, results: &[TechnologyClusters]) -> Result<()> {
    let mut writer = DataWriter::create(output_path)?;
    writer.write_clusters(results)?;
    writer.write_profiles(results)?;
    writer.flush()
}
