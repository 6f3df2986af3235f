//! Defines the `ModelParameters` struct, which represents the contents of a cluster settings file.
use crate::cluster::{BinSpec, ClusterConfig, ClusterSpec, FilterSpec, ModifierSpec};
use crate::id::IDCollection;
use crate::input::{deserialise_one_or_many, input_err_msg, read_toml};
use crate::region::{RegionID, is_all_tag};
use crate::units::Capacity;
use anyhow::{Context, Result, bail, ensure};
use indexmap::{IndexMap, IndexSet};
use log::warn;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;

/// Settings for clustering the sites of one technology in one model region
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "RenewableClusterSettingsRaw")]
pub struct RenewableClusterSettings {
    /// A model region, or `all` to apply to every model region without its own entry
    pub region: Option<String>,
    /// The technology, used to find the site and profile files
    pub technology: Option<String>,
    /// Distinguishes entries for the same technology and region
    pub pref_site: Option<bool>,
    /// The clustering pipeline
    pub config: ClusterConfig,
    /// Adjustments applied to the clusters afterwards
    pub modify: Vec<ModifierSpec>,
}

/// An entry as written in the settings file, with the pipeline stages alongside the other keys
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RenewableClusterSettingsRaw {
    region: Option<String>,
    technology: Option<String>,
    pref_site: Option<bool>,
    min_capacity: Option<Capacity>,
    #[serde(default, deserialize_with = "deserialise_one_or_many")]
    filter: Vec<FilterSpec>,
    #[serde(default, deserialize_with = "deserialise_one_or_many")]
    bin: Vec<BinSpec>,
    #[serde(default, deserialize_with = "deserialise_one_or_many")]
    group: Vec<String>,
    #[serde(default, deserialize_with = "deserialise_one_or_many")]
    cluster: Vec<ClusterSpec>,
    #[serde(default, deserialize_with = "deserialise_one_or_many")]
    modify: Vec<ModifierSpec>,
}

impl From<RenewableClusterSettingsRaw> for RenewableClusterSettings {
    fn from(raw: RenewableClusterSettingsRaw) -> Self {
        Self {
            region: raw.region,
            technology: raw.technology,
            pref_site: raw.pref_site,
            config: ClusterConfig {
                min_capacity: raw.min_capacity,
                filter: raw.filter,
                bin: raw.bin,
                group: raw.group,
                cluster: raw.cluster,
            },
            modify: raw.modify,
        }
    }
}

impl RenewableClusterSettings {
    fn key(&self) -> (Option<&str>, Option<bool>) {
        (self.technology.as_deref(), self.pref_site)
    }
}

/// Represents the contents of the entire cluster settings file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelParameters {
    /// The regions clusters are created for
    pub model_regions: Vec<RegionID>,
    /// Site regions making up each aggregated model region
    #[serde(default)]
    pub region_aggregations: IndexMap<String, Vec<RegionID>>,
    /// One entry per technology and model region
    #[serde(default)]
    pub renewables_clusters: Vec<RenewableClusterSettings>,
}

/// Expand entries tagged with the `all` region into one entry per model region.
///
/// An `all` entry covers every model region which doesn't have an explicit entry for the same
/// technology and `pref_site`. If there is more than one `all` entry for the same technology and
/// `pref_site`, the last one is used.
///
/// # Arguments
///
/// * `entries` - Entries as read from the settings file
/// * `model_regions` - All model regions
///
/// # Returns
///
/// The explicit entries followed by the expanded ones.
pub fn apply_all_tag_to_regions(
    entries: &[RenewableClusterSettings],
    model_regions: &[RegionID],
) -> Result<Vec<RenewableClusterSettings>> {
    let mut explicit = Vec::new();
    let mut all_tags = IndexMap::new();
    for entry in entries {
        let region = entry
            .region
            .as_deref()
            .context("Renewable cluster settings must have a region")?;
        if !is_all_tag(region) {
            explicit.push(entry.clone());
            continue;
        }

        let Some(technology) = &entry.technology else {
            bail!("Renewable cluster settings for region '{region}' must have a technology");
        };
        if all_tags.insert(entry.key(), entry).is_some() {
            warn!(
                "Multiple 'all' tags applied to technology {technology}. Only the last one will \
                be used"
            );
        }
    }

    let mut expanded = Vec::new();
    {
        let covered: HashSet<_> = explicit
            .iter()
            .map(|entry| (entry.region.as_deref(), entry.key()))
            .collect();
        for (key, entry) in all_tags {
            for region in model_regions {
                if covered.contains(&(Some(&*region.0), key)) {
                    continue;
                }

                expanded.push(RenewableClusterSettings {
                    region: Some(region.to_string()),
                    ..entry.clone()
                });
            }
        }
    }

    explicit.extend(expanded);
    Ok(explicit)
}

/// Check that every region is known and aggregations only name model regions
fn check_regions(parameters: &ModelParameters) -> Result<()> {
    ensure!(
        !parameters.model_regions.is_empty(),
        "`model_regions` is empty"
    );
    let regions: IndexSet<RegionID> = parameters.model_regions.iter().cloned().collect();
    ensure!(
        regions.len() == parameters.model_regions.len(),
        "`model_regions` must not contain duplicates"
    );

    for region in parameters.region_aggregations.keys() {
        regions
            .get_id_by_str(region)
            .with_context(|| format!("Aggregated region '{region}' is not a model region"))?;
    }

    for entry in &parameters.renewables_clusters {
        match entry.region.as_deref() {
            Some(region) if !is_all_tag(region) => {
                regions.get_id_by_str(region).with_context(|| {
                    format!("Cluster settings refer to unknown region '{region}'")
                })?;
            }
            _ => {}
        }
    }

    Ok(())
}

impl ModelParameters {
    /// Read a cluster settings file.
    ///
    /// Entries for the `all` region are expanded into one entry per model region.
    ///
    /// # Arguments
    ///
    /// * `file_path` - Path to the settings file
    ///
    /// # Returns
    ///
    /// The file contents as a [`ModelParameters`] struct or an error if the file is invalid
    pub fn from_path<P: AsRef<Path>>(file_path: P) -> Result<ModelParameters> {
        let file_path = file_path.as_ref();
        let mut model_params: ModelParameters = read_toml(file_path)?;

        model_params
            .validate()
            .with_context(|| input_err_msg(file_path))?;

        Ok(model_params)
    }

    /// Validate parameters after reading in file
    fn validate(&mut self) -> Result<()> {
        check_regions(self)?;
        self.renewables_clusters =
            apply_all_tag_to_regions(&self.renewables_clusters, &self.model_regions)?;

        Ok(())
    }

    /// The site regions which make up a model region.
    ///
    /// A model region without an aggregation is made up of itself alone.
    pub fn site_regions(&self, model_region: &str) -> Vec<RegionID> {
        self.region_aggregations
            .get(model_region)
            .cloned()
            .unwrap_or_else(|| vec![model_region.into()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::assert_error;
    use rstest::rstest;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    fn entry(region: Option<&str>, technology: Option<&str>) -> RenewableClusterSettings {
        RenewableClusterSettings {
            region: region.map(Into::into),
            technology: technology.map(Into::into),
            pref_site: None,
            config: ClusterConfig::default(),
            modify: Vec::new(),
        }
    }

    fn model_regions() -> Vec<RegionID> {
        vec!["A".into(), "B".into(), "C".into()]
    }

    fn regions_for(entries: &[RenewableClusterSettings], technology: &str) -> Vec<String> {
        entries
            .iter()
            .filter(|entry| entry.technology.as_deref() == Some(technology))
            .map(|entry| entry.region.clone().unwrap())
            .collect()
    }

    #[test]
    fn test_apply_all_tag_to_regions() {
        let entries = [
            entry(Some("B"), Some("solar")),
            entry(Some("all"), Some("solar")),
            entry(Some("ALL"), Some("wind")),
        ];
        let result = apply_all_tag_to_regions(&entries, &model_regions()).unwrap();
        assert_eq!(regions_for(&result, "solar"), ["B", "A", "C"]);
        assert_eq!(regions_for(&result, "wind"), ["A", "B", "C"]);
    }

    #[test]
    fn test_apply_all_tag_to_regions_pref_site() {
        let mut preferred = entry(Some("A"), Some("solar"));
        preferred.pref_site = Some(true);
        let entries = [preferred, entry(Some("all"), Some("solar"))];

        // An entry with a different pref_site doesn't cover the region
        let result = apply_all_tag_to_regions(&entries, &model_regions()).unwrap();
        assert_eq!(regions_for(&result, "solar"), ["A", "A", "B", "C"]);
    }

    #[test]
    fn test_apply_all_tag_to_regions_last_wins() {
        let mut first = entry(Some("all"), Some("solar"));
        first.config.group = vec!["county".into()];
        let second = entry(Some("all"), Some("solar"));
        let result = apply_all_tag_to_regions(&[first, second], &model_regions()).unwrap();
        assert_eq!(result.len(), 3);
        assert!(result.iter().all(|entry| entry.config.group.is_empty()));
    }

    #[test]
    fn test_apply_all_tag_to_regions_empty() {
        assert!(apply_all_tag_to_regions(&[], &model_regions()).unwrap().is_empty());
    }

    #[test]
    fn test_apply_all_tag_to_regions_no_tag() {
        let entries = [entry(Some("A"), Some("solar"))];
        let result = apply_all_tag_to_regions(&entries, &model_regions()).unwrap();
        assert_eq!(result, entries);
    }

    #[test]
    fn test_apply_all_tag_to_regions_invalid() {
        assert_error!(
            apply_all_tag_to_regions(&[entry(None, Some("solar"))], &model_regions()),
            "Renewable cluster settings must have a region"
        );
        assert_error!(
            apply_all_tag_to_regions(&[entry(Some("all"), None)], &model_regions()),
            "Renewable cluster settings for region 'all' must have a technology"
        );
    }

    fn write_settings(contents: &str) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("clusters.toml");
        let mut file = File::create(&file_path).unwrap();
        writeln!(file, "{contents}").unwrap();
        (dir, file_path)
    }

    #[test]
    fn test_model_parameters_from_path() {
        let (_dir, file_path) = write_settings(
            r#"
            model_regions = ["North", "South"]

            [region_aggregations]
            North = ["n1", "n2"]

            [[renewables_clusters]]
            region = "all"
            technology = "utilitypv"
            group = "county"
            cluster = { feature = "lcoe", n_clusters = 2 }
            modify = { group = "county", group_value = "Adams", lcoe = ["mul", 1.1] }

            [[renewables_clusters]]
            region = "South"
            technology = "utilitypv"
            min_capacity = 100
            "#,
        );
        let params = ModelParameters::from_path(&file_path).unwrap();

        assert_eq!(params.renewables_clusters.len(), 2);
        let south = &params.renewables_clusters[0];
        assert_eq!(south.region.as_deref(), Some("South"));
        assert!(south.config.cluster.is_empty());
        let north = &params.renewables_clusters[1];
        assert_eq!(north.region.as_deref(), Some("North"));
        assert_eq!(north.config.group, ["county"]);
        assert_eq!(north.config.cluster.len(), 1);
        assert_eq!(north.modify.len(), 1);

        assert_eq!(
            params.site_regions("North"),
            vec![RegionID::from("n1"), RegionID::from("n2")]
        );
        assert_eq!(params.site_regions("South"), vec![RegionID::from("South")]);
    }

    #[test]
    fn test_model_parameters_no_entries() {
        let (_dir, file_path) = write_settings("model_regions = [\"A\"]");
        let params = ModelParameters::from_path(&file_path).unwrap();
        assert!(params.renewables_clusters.is_empty());
        assert!(params.region_aggregations.is_empty());
    }

    #[rstest]
    #[case("clusters = { feature = \"lcoe\", n_clusters = 3 }", "clusters")]
    #[case("filters = { feature = \"lcoe\", max = 50 }", "filters")]
    #[case("modifiers = { group = \"county\", group_value = \"Adams\" }", "modifiers")]
    fn test_model_parameters_unknown_entry_key(#[case] line: &str, #[case] key: &str) {
        let contents = format!(
            "model_regions = [\"A\"]\n[[renewables_clusters]]\nregion = \"A\"\n\
            technology = \"solar\"\n{line}\n"
        );
        let err = toml::from_str::<ModelParameters>(&contents)
            .unwrap_err()
            .to_string();
        assert!(err.contains(&format!("unknown field `{key}`")), "{err}");
    }

    #[test]
    fn test_model_parameters_unknown_key() {
        let err = toml::from_str::<ModelParameters>(
            "model_regions = [\"A\"]\n[[renewable_clusters]]\nregion = \"A\"\n",
        )
        .unwrap_err()
        .to_string();
        assert!(err.contains("unknown field `renewable_clusters`"), "{err}");
    }

    #[test]
    fn test_model_parameters_invalid_regions() {
        let check = |contents: &str| {
            let params: ModelParameters = toml::from_str(contents).unwrap();
            check_regions(&params)
        };

        assert_error!(check("model_regions = []"), "`model_regions` is empty");
        assert_error!(
            check("model_regions = [\"A\", \"A\"]"),
            "`model_regions` must not contain duplicates"
        );
        assert_error!(
            check("model_regions = [\"A\"]\nregion_aggregations = { B = [\"b\"] }"),
            "Aggregated region 'B' is not a model region"
        );
        assert_error!(
            check(
                "model_regions = [\"A\"]\n[[renewables_clusters]]\nregion = \"B\"\ntechnology = \"x\""
            ),
            "Cluster settings refer to unknown region 'B'"
        );
    }
}
