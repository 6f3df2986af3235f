//! Grouping candidate sites into representative clusters.
//!
//! Sites pass through a pipeline of optional stages: filtering, binning, grouping, clustering
//! and aggregation. Group modifiers can then adjust the resulting clusters. See
//! [`assign_site_cluster`] for the full pipeline.
pub mod aggregate;
pub use aggregate::{ClusterRow, aggregate_cluster, aggregate_clusters};
pub mod algorithm;
pub mod assign;
pub use assign::assign_site_cluster;
pub mod bin;
pub use bin::{MIN_BIN_VALUE, Resolution, num_bins_from_capacity, value_bin};
pub mod dispatch;
pub use dispatch::{
    cluster_sites, cluster_sites_binned, cluster_sites_no_bin, num_clusters_from_capacity,
};
pub mod label;
pub use label::{ClusterLabel, LabelPart};
pub mod modify;
pub use modify::{ModifierSpec, Operator, modify_renewable_group};
pub mod spec;
pub use spec::{
    BinMethod, BinSpec, CapacityTarget, ClusterConfig, ClusterCount, ClusterMethod, ClusterSpec,
    Feature, FilterSpec, Partitioning,
};
