//! Typed options for each stage of the clustering pipeline, as read from settings files.
use crate::input::{deserialise_one_or_many, is_sorted_and_unique};
use crate::site::{PROFILE_FEATURE, Site};
use crate::units::Capacity;
use anyhow::{Context, Error, Result, bail, ensure};
use log::warn;
use serde::Deserialize;
use std::str::FromStr;

/// Restricts sites to those with a feature value inside the given (inclusive) bounds
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FilterSpec {
    /// The numeric column to filter on
    pub feature: String,
    /// Smallest allowed value
    #[serde(default)]
    pub min: Option<f64>,
    /// Largest allowed value
    #[serde(default)]
    pub max: Option<f64>,
}

impl FilterSpec {
    /// Whether `site` passes this filter
    pub fn accepts(&self, site: &Site) -> Result<bool> {
        let value = site.numeric_value(&self.feature)?;
        Ok(self.min.is_none_or(|min| value >= min) && self.max.is_none_or(|max| value <= max))
    }
}

/// A capacity which each bin or quantile should roughly contain
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CapacityTarget {
    /// Equal-width bins, with the number chosen from the total capacity (`mw_per_bin`)
    PerBin(Capacity),
    /// Quantiles, with the number chosen from the total capacity (`mw_per_q`)
    PerQuantile(Capacity),
}

impl CapacityTarget {
    /// The settings key this target was read from
    pub fn key(self) -> &'static str {
        match self {
            Self::PerBin(_) => "mw_per_bin",
            Self::PerQuantile(_) => "mw_per_q",
        }
    }
}

/// How the values of a feature are divided into bins
#[derive(Debug, Clone, PartialEq)]
pub enum BinMethod {
    /// The given number of equal-width bins spanning the values
    Count(usize),
    /// Bins with explicit (sorted) edges
    Edges(Vec<f64>),
    /// The given number of quantiles
    Quantiles(usize),
    /// Quantiles at explicit cumulative fractions between 0 and 1
    QuantileEdges(Vec<f64>),
    /// A number of bins or quantiles derived from the capacity of the sites being binned.
    ///
    /// `replaces` holds an explicit bin specification given alongside the target, which is
    /// discarded when the target is resolved.
    CapacityTarget {
        /// The capacity per bin or quantile
        target: CapacityTarget,
        /// Explicit bins which the target overrides
        replaces: Option<Box<BinMethod>>,
    },
}

impl BinMethod {
    /// The settings key this method was read from
    pub fn key(&self) -> &'static str {
        match self {
            Self::Count(_) | Self::Edges(_) => "bins",
            Self::Quantiles(_) | Self::QuantileEdges(_) => "q",
            Self::CapacityTarget { target, .. } => target.key(),
        }
    }
}

/// Options for dividing sites into bins based on one feature
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "BinSpecRaw")]
pub struct BinSpec {
    /// The numeric column to bin on
    pub feature: String,
    /// How to choose bin edges
    pub method: BinMethod,
    /// Numeric column used to weight quantiles (e.g. `mw`)
    pub weights: Option<String>,
}

/// A bin count or an explicit list of edges
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CountOrEdges {
    Count(i64),
    Edges(Vec<f64>),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct BinSpecRaw {
    feature: String,
    bins: Option<CountOrEdges>,
    q: Option<CountOrEdges>,
    mw_per_bin: Option<Capacity>,
    mw_per_q: Option<Capacity>,
    weights: Option<String>,
}

fn check_count(count: i64, key: &str) -> Result<usize> {
    ensure!(count >= 1, "`{key}` must be at least 1, got {count}");

    Ok(count as usize)
}

fn check_edges(edges: Vec<f64>, key: &str) -> Result<Vec<f64>> {
    ensure!(edges.len() >= 2, "`{key}` must contain at least two edges");
    ensure!(
        edges.iter().all(|edge| edge.is_finite()),
        "`{key}` edges must be finite"
    );
    ensure!(
        is_sorted_and_unique(&edges),
        "`{key}` edges must be unique and in ascending order"
    );

    Ok(edges)
}

fn check_capacity_target(capacity: Capacity, key: &str) -> Result<Capacity> {
    ensure!(
        capacity.is_finite() && capacity > Capacity(0.0),
        "`{key}` must be a positive number"
    );

    Ok(capacity)
}

impl TryFrom<BinSpecRaw> for BinSpec {
    type Error = Error;

    fn try_from(raw: BinSpecRaw) -> Result<Self> {
        let feature = raw.feature;
        let explicit = match (raw.bins, raw.q) {
            (Some(_), Some(_)) => {
                bail!("Bin specification for '{feature}' cannot have both `bins` and `q`")
            }
            (Some(CountOrEdges::Count(count)), None) => {
                Some(BinMethod::Count(check_count(count, "bins")?))
            }
            (Some(CountOrEdges::Edges(edges)), None) => {
                Some(BinMethod::Edges(check_edges(edges, "bins")?))
            }
            (None, Some(CountOrEdges::Count(count))) => {
                Some(BinMethod::Quantiles(check_count(count, "q")?))
            }
            (None, Some(CountOrEdges::Edges(fractions))) => {
                let fractions = check_edges(fractions, "q")?;
                ensure!(
                    fractions.iter().all(|q| (0.0..=1.0).contains(q)),
                    "`q` fractions must be between 0 and 1"
                );
                Some(BinMethod::QuantileEdges(fractions))
            }
            (None, None) => None,
        };

        let target = match (raw.mw_per_bin, raw.mw_per_q) {
            (Some(per_bin), Some(_)) => {
                warn!(
                    "Bin specification for '{feature}' has both `mw_per_bin` and `mw_per_q`. \
                    Using `mw_per_bin`."
                );
                Some(CapacityTarget::PerBin(check_capacity_target(
                    per_bin,
                    "mw_per_bin",
                )?))
            }
            (Some(per_bin), None) => Some(CapacityTarget::PerBin(check_capacity_target(
                per_bin,
                "mw_per_bin",
            )?)),
            (None, Some(per_q)) => Some(CapacityTarget::PerQuantile(check_capacity_target(
                per_q, "mw_per_q",
            )?)),
            (None, None) => None,
        };

        let method = match (target, explicit) {
            (Some(target), Some(replaces)) => {
                // A target only overrides an explicit value of the same kind
                let same_kind = matches!(
                    (target, &replaces),
                    (CapacityTarget::PerBin(_), BinMethod::Count(_) | BinMethod::Edges(_))
                        | (
                            CapacityTarget::PerQuantile(_),
                            BinMethod::Quantiles(_) | BinMethod::QuantileEdges(_)
                        )
                );
                ensure!(
                    same_kind,
                    "Bin specification for '{feature}' cannot combine `{}` with `{}`",
                    target.key(),
                    replaces.key()
                );
                BinMethod::CapacityTarget {
                    target,
                    replaces: Some(Box::new(replaces)),
                }
            }
            (Some(target), None) => BinMethod::CapacityTarget {
                target,
                replaces: None,
            },
            (None, Some(method)) => method,
            (None, None) => bail!(
                "Bin specification for '{feature}' must include one of `bins`, `q`, \
                `mw_per_bin` or `mw_per_q`"
            ),
        };

        Ok(Self {
            feature,
            method,
            weights: raw.weights,
        })
    }
}

/// The feature(s) sites are compared on when clustering
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "FeatureRaw")]
pub enum Feature {
    /// The hourly generation profile of each site
    Profile,
    /// One or more numeric columns
    Columns(Vec<String>),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FeatureRaw {
    One(String),
    Many(Vec<String>),
}

impl TryFrom<FeatureRaw> for Feature {
    type Error = Error;

    fn try_from(raw: FeatureRaw) -> Result<Self> {
        let columns = match raw {
            FeatureRaw::One(column) => vec![column],
            FeatureRaw::Many(columns) => columns,
        };
        ensure!(!columns.is_empty(), "No clustering features given");

        if columns.iter().any(|column| column == PROFILE_FEATURE) {
            ensure!(
                columns.len() == 1,
                "The '{PROFILE_FEATURE}' feature cannot be combined with other features"
            );
            return Ok(Self::Profile);
        }

        Ok(Self::Columns(columns))
    }
}

/// The algorithm used to cluster sites
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, strum::EnumString, strum::Display)]
pub enum ClusterMethod {
    /// Agglomerative clustering with Ward linkage
    #[default]
    #[strum(to_string = "agglomerative", serialize = "agg")]
    Agglomerative,
    /// Lloyd's k-means
    #[strum(serialize = "kmeans")]
    KMeans,
    /// Average-linkage hierarchical clustering
    #[strum(serialize = "hierarchical")]
    Hierarchical,
}

/// How many clusters to form
#[derive(Debug, Clone, PartialEq)]
pub enum ClusterCount {
    /// An explicit number of clusters (`n_clusters`)
    Fixed(usize),
    /// A number of clusters derived from the total capacity (`mw_per_cluster`)
    CapacityTarget {
        /// The capacity each cluster should roughly contain
        per_cluster: Capacity,
        /// An explicit `n_clusters` given alongside the target, which the target overrides
        replaces: Option<usize>,
    },
}

/// Divides sites into partitions which are clustered independently
#[derive(Debug, Clone, PartialEq)]
pub enum Partitioning {
    /// Partition by bins of a numeric feature
    Bin(BinSpec),
    /// Partition by the values of one or more columns
    Columns(Vec<String>),
}

/// Options for one clustering stage
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "ClusterSpecRaw")]
pub struct ClusterSpec {
    /// What sites are compared on
    pub feature: Feature,
    /// The clustering algorithm
    pub method: ClusterMethod,
    /// How many clusters to form (within each partition, if any)
    pub count: ClusterCount,
    /// Optional partitioning applied before clustering
    pub within: Option<Partitioning>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ClusterSpecRaw {
    feature: Feature,
    method: Option<String>,
    n_clusters: Option<i64>,
    mw_per_cluster: Option<Capacity>,
    bin: Option<BinSpec>,
    #[serde(default, deserialize_with = "deserialise_one_or_many")]
    by: Vec<String>,
}

impl TryFrom<ClusterSpecRaw> for ClusterSpec {
    type Error = Error;

    fn try_from(raw: ClusterSpecRaw) -> Result<Self> {
        let method = match raw.method {
            Some(method) => ClusterMethod::from_str(&method)
                .ok()
                .with_context(|| format!("Unknown clustering method '{method}'"))?,
            None => ClusterMethod::default(),
        };

        let n_clusters = raw
            .n_clusters
            .map(|count| check_count(count, "n_clusters"))
            .transpose()?;
        let count = match (raw.mw_per_cluster, n_clusters) {
            (Some(per_cluster), replaces) => ClusterCount::CapacityTarget {
                per_cluster: check_capacity_target(per_cluster, "mw_per_cluster")?,
                replaces,
            },
            (None, Some(count)) => ClusterCount::Fixed(count),
            (None, None) => {
                bail!("Cluster specification must include one of `n_clusters` or `mw_per_cluster`")
            }
        };

        let within = match (raw.bin, raw.by.is_empty()) {
            (Some(_), false) => bail!("Cluster specification cannot have both `bin` and `by`"),
            (Some(bin), true) => Some(Partitioning::Bin(bin)),
            (None, false) => Some(Partitioning::Columns(raw.by)),
            (None, true) => None,
        };

        Ok(Self {
            feature: raw.feature,
            method,
            count,
            within,
        })
    }
}

/// Options for every stage of the clustering pipeline.
///
/// Every stage is optional. Stages which accept a list also accept a single table.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClusterConfig {
    /// Keep only the cheapest sites (by `lcoe`) needed to reach this capacity
    #[serde(default)]
    pub min_capacity: Option<Capacity>,
    /// Filters applied to sites before anything else
    #[serde(default, deserialize_with = "deserialise_one_or_many")]
    pub filter: Vec<FilterSpec>,
    /// Binning stages, each applied within the bins of the previous one
    #[serde(default, deserialize_with = "deserialise_one_or_many")]
    pub bin: Vec<BinSpec>,
    /// Columns to group sites by
    #[serde(default, deserialize_with = "deserialise_one_or_many")]
    pub group: Vec<String>,
    /// Clustering stages, each applied within the clusters of the previous one
    #[serde(default, deserialize_with = "deserialise_one_or_many")]
    pub cluster: Vec<ClusterSpec>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::site;
    use rstest::rstest;

    fn parse<T: serde::de::DeserializeOwned>(toml_str: &str) -> Result<T> {
        Ok(toml::from_str(toml_str)?)
    }

    fn assert_parse_error<T: serde::de::DeserializeOwned + std::fmt::Debug>(
        toml_str: &str,
        msg: &str,
    ) {
        let err = parse::<T>(toml_str).unwrap_err().to_string();
        assert!(err.contains(msg), "Unexpected error: {err}");
    }

    #[rstest]
    #[case(Some(40.0), None, true)]
    #[case(Some(42.0), Some(42.0), true)]
    #[case(None, Some(41.9), false)]
    #[case(Some(42.1), None, false)]
    #[case(None, None, true)]
    fn test_filter_accepts(#[case] min: Option<f64>, #[case] max: Option<f64>, #[case] ok: bool) {
        let filter = FilterSpec {
            feature: "lcoe".into(),
            min,
            max,
        };
        let site = site("s1", "A", 1.0, &[("lcoe", 42.0)], &[]);
        assert_eq!(filter.accepts(&site).unwrap(), ok);
    }

    #[rstest]
    #[case("feature = \"lcoe\"\nbins = 2", BinMethod::Count(2))]
    #[case("feature = \"lcoe\"\nbins = [0.0, 10.5, 20.0]", BinMethod::Edges(vec![0.0, 10.5, 20.0]))]
    #[case("feature = \"lcoe\"\nq = 4", BinMethod::Quantiles(4))]
    #[case("feature = \"lcoe\"\nq = [0.0, 0.5, 1.0]", BinMethod::QuantileEdges(vec![0.0, 0.5, 1.0]))]
    #[case(
        "feature = \"lcoe\"\nmw_per_bin = 200",
        BinMethod::CapacityTarget { target: CapacityTarget::PerBin(Capacity(200.0)), replaces: None }
    )]
    #[case(
        "feature = \"lcoe\"\nmw_per_q = 150\nq = 3",
        BinMethod::CapacityTarget {
            target: CapacityTarget::PerQuantile(Capacity(150.0)),
            replaces: Some(Box::new(BinMethod::Quantiles(3))),
        }
    )]
    #[case(
        "feature = \"lcoe\"\nmw_per_bin = 10\nmw_per_q = 20",
        BinMethod::CapacityTarget { target: CapacityTarget::PerBin(Capacity(10.0)), replaces: None }
    )]
    fn test_bin_spec_parse(#[case] toml_str: &str, #[case] expected: BinMethod) {
        let spec: BinSpec = parse(toml_str).unwrap();
        assert_eq!(spec.feature, "lcoe");
        assert_eq!(spec.method, expected);
    }

    #[rstest]
    #[case("feature = \"lcoe\"", "must include one of `bins`, `q`")]
    #[case("feature = \"lcoe\"\nbins = 0", "`bins` must be at least 1, got 0")]
    #[case("feature = \"lcoe\"\nbins = [3.0, 1.0]", "must be unique and in ascending order")]
    #[case("feature = \"lcoe\"\nq = [0.0, 1.5]", "fractions must be between 0 and 1")]
    #[case("feature = \"lcoe\"\nbins = 2\nq = 2", "cannot have both `bins` and `q`")]
    #[case("feature = \"lcoe\"\nmw_per_bin = -1", "`mw_per_bin` must be a positive number")]
    #[case("feature = \"lcoe\"\nmw_per_q = 100\nbins = 3", "cannot combine `mw_per_q` with `bins`")]
    #[case(
        "feature = \"lcoe\"\nmw_per_bin = 100\nq = [0.0, 0.5, 1.0]",
        "cannot combine `mw_per_bin` with `q`"
    )]
    fn test_bin_spec_parse_invalid(#[case] toml_str: &str, #[case] msg: &str) {
        assert_parse_error::<BinSpec>(toml_str, msg);
    }

    #[rstest]
    #[case("agg", ClusterMethod::Agglomerative)]
    #[case("agglomerative", ClusterMethod::Agglomerative)]
    #[case("kmeans", ClusterMethod::KMeans)]
    #[case("hierarchical", ClusterMethod::Hierarchical)]
    fn test_cluster_method_names(#[case] name: &str, #[case] expected: ClusterMethod) {
        let spec: ClusterSpec =
            parse(&format!("feature = \"lcoe\"\nmethod = \"{name}\"\nn_clusters = 2")).unwrap();
        assert_eq!(spec.method, expected);
    }

    #[test]
    fn test_cluster_spec_parse() {
        let spec: ClusterSpec = parse(
            r#"
            feature = ["interconnect_annuity", "lcoe"]
            method = "kmeans"
            mw_per_cluster = 200
            n_clusters = 3
            by = "state"
            "#,
        )
        .unwrap();
        assert_eq!(
            spec,
            ClusterSpec {
                feature: Feature::Columns(vec!["interconnect_annuity".into(), "lcoe".into()]),
                method: ClusterMethod::KMeans,
                count: ClusterCount::CapacityTarget {
                    per_cluster: Capacity(200.0),
                    replaces: Some(3),
                },
                within: Some(Partitioning::Columns(vec!["state".into()])),
            }
        );

        let spec: ClusterSpec = parse("feature = \"profile\"\nn_clusters = 4").unwrap();
        assert_eq!(spec.feature, Feature::Profile);
        assert_eq!(spec.method, ClusterMethod::Agglomerative);
        assert_eq!(spec.count, ClusterCount::Fixed(4));
        assert_eq!(spec.within, None);
    }

    #[rstest]
    #[case(
        "feature = \"lcoe\"\nmethod = \"dbscan\"\nn_clusters = 2",
        "Unknown clustering method 'dbscan'"
    )]
    #[case("feature = \"lcoe\"", "must include one of `n_clusters` or `mw_per_cluster`")]
    #[case(
        "feature = [\"profile\", \"lcoe\"]\nn_clusters = 2",
        "cannot be combined with other features"
    )]
    #[case(
        "feature = \"lcoe\"\nn_clusters = 2\nby = \"state\"\nbin = { feature = \"lcoe\", bins = 2 }",
        "cannot have both `bin` and `by`"
    )]
    fn test_cluster_spec_parse_invalid(#[case] toml_str: &str, #[case] msg: &str) {
        assert_parse_error::<ClusterSpec>(toml_str, msg);
    }

    #[test]
    fn test_cluster_config_one_or_many() {
        let config: ClusterConfig = parse(
            r#"
            min_capacity = 2000
            group = "county"
            filter = { feature = "lcoe", max = 49 }

            [[bin]]
            feature = "interconnect_annuity"
            bins = 2

            [[cluster]]
            feature = "lcoe"
            method = "agg"
            n_clusters = 2
            "#,
        )
        .unwrap();

        assert_eq!(config.min_capacity, Some(Capacity(2000.0)));
        assert_eq!(config.group, vec!["county".to_string()]);
        assert_eq!(
            config.filter,
            vec![FilterSpec {
                feature: "lcoe".into(),
                min: None,
                max: Some(49.0)
            }]
        );
        assert_eq!(config.bin.len(), 1);
        assert_eq!(config.cluster.len(), 1);
    }

    #[test]
    fn test_cluster_config_unknown_stage() {
        assert_parse_error::<ClusterConfig>(
            "bins = { feature = \"lcoe\", bins = 2 }",
            "unknown field `bins`",
        );
    }

    #[test]
    fn test_cluster_config_empty() {
        assert_eq!(parse::<ClusterConfig>("").unwrap(), ClusterConfig::default());
    }
}
