//! The clustering model: cluster settings plus the site data they refer to.
use crate::cluster::{ClusterRow, assign_site_cluster, modify_renewable_group};
use crate::input::read_technology_data;
use crate::site::{ProfileMap, SiteMap};
use anyhow::{Context, Result, ensure};
use indexmap::IndexMap;
use log::info;
use std::path::{Path, PathBuf};

pub mod parameters;
pub use parameters::{ModelParameters, RenewableClusterSettings, apply_all_tag_to_regions};

/// The clusters for one technology in one model region
#[derive(Debug, Clone, PartialEq)]
pub struct TechnologyClusters {
    /// The technology the sites are for
    pub technology: String,
    /// The model region the sites are in
    pub region: String,
    /// The aggregated (and modified) clusters
    pub rows: Vec<ClusterRow>,
}

/// Cluster settings together with the directory holding site data
#[derive(Debug)]
pub struct Model {
    /// The contents of the cluster settings file
    pub parameters: ModelParameters,
    /// Folder containing site and profile files for each technology
    pub data_dir: PathBuf,
}

impl Model {
    /// Read the cluster settings file and check the data directory exists.
    pub fn from_path(settings_path: &Path, data_dir: &Path) -> Result<Self> {
        let parameters = ModelParameters::from_path(settings_path)?;
        ensure!(
            data_dir.is_dir(),
            "Data directory {} does not exist",
            data_dir.display()
        );

        Ok(Self {
            parameters,
            data_dir: data_dir.to_path_buf(),
        })
    }

    /// Create clusters for every entry in the settings file.
    ///
    /// Site data for each technology is only read once.
    pub fn cluster_all(&self) -> Result<Vec<TechnologyClusters>> {
        let mut data: IndexMap<&str, (SiteMap, ProfileMap)> = IndexMap::new();
        let mut results = Vec::new();
        for entry in &self.parameters.renewables_clusters {
            // Regions are always set once the `all` tag has been applied
            let region = entry.region.as_deref().unwrap_or_default();
            let technology = entry.technology.as_deref().with_context(|| {
                format!("Cluster settings for region '{region}' must have a technology")
            })?;

            if !data.contains_key(technology) {
                info!("Reading site data for {technology}");
                data.insert(technology, read_technology_data(&self.data_dir, technology)?);
            }
            let (sites, profiles) = &data[technology];

            info!("Clustering {technology} sites for region {region}");
            let site_regions = self.parameters.site_regions(region);
            let rows = assign_site_cluster(sites, profiles, &site_regions, &entry.config)
                .with_context(|| {
                    format!("Failed to cluster {technology} sites for region {region}")
                })?;
            let rows = modify_renewable_group(&rows, &entry.modify)?;

            results.push(TechnologyClusters {
                technology: technology.to_string(),
                region: region.to_string(),
                rows,
            });
        }

        Ok(results)
    }
}
