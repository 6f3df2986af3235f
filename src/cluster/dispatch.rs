//! Choosing and running a clustering algorithm for a set of sites.
use super::algorithm::{Distance, Linkage, agglomerative, count_distinct, kmeans, standardise};
use super::bin::{HasCapacity, Resolution, bin_sites, count_from_capacity};
use super::label::ClusterLabel;
use super::spec::{ClusterCount, ClusterMethod, ClusterSpec, Feature, Partitioning};
use crate::site::SiteView;
use crate::units::Capacity;
use anyhow::{Result, ensure};
use indexmap::IndexMap;
use log::{debug, warn};
use std::rc::Rc;

/// The label part added by clustering stages
pub const CLUSTER_PART: &str = "cluster";

/// The label part added when partitioning by bins of `feature`
pub fn bin_part_name(feature: &str) -> String {
    format!("{feature}_bin")
}

/// Resolve a cluster count which may be derived from a capacity target.
///
/// If a capacity target replaces an explicitly given `n_clusters`, a warning is logged and the
/// replaced count is returned in [`Resolution::overwritten`].
pub fn num_clusters_from_capacity<S: HasCapacity>(
    sites: &[S],
    count: &ClusterCount,
) -> Resolution<usize> {
    match count {
        ClusterCount::Fixed(n_clusters) => Resolution::unchanged(*n_clusters),
        ClusterCount::CapacityTarget {
            per_cluster,
            replaces,
        } => {
            let total: Capacity = sites.iter().map(HasCapacity::capacity).sum();
            if replaces.is_some() {
                warn!("Overwriting 'n_clusters' based on mw_per_cluster");
            }

            Resolution {
                value: count_from_capacity(total, *per_cluster),
                overwritten: *replaces,
            }
        }
    }
}

/// Gather the points sites are compared on.
///
/// Profiles are shared rather than copied. Several numeric columns are standardised so that
/// features with large magnitudes don't dominate.
fn feature_points(sites: &[SiteView], feature: &Feature) -> Result<Vec<Rc<[f64]>>> {
    let columns = match feature {
        Feature::Profile => {
            let points: Vec<Rc<[f64]>> =
                sites.iter().map(|view| Rc::clone(&view.profile)).collect();
            ensure!(
                points.iter().all(|point| point.len() == points[0].len()),
                "Profiles for clustered sites must all have the same length"
            );
            return Ok(points);
        }
        Feature::Columns(columns) => columns,
    };

    let mut values = columns
        .iter()
        .map(|column| {
            sites
                .iter()
                .map(|view| view.site.numeric_value(column))
                .collect::<Result<Vec<f64>>>()
        })
        .collect::<Result<Vec<_>>>()?;
    if values.len() > 1 {
        standardise(&mut values);
    }

    Ok((0..sites.len())
        .map(|idx| values.iter().map(|column| column[idx]).collect())
        .collect())
}

/// Cluster sites without any partitioning.
///
/// The requested number of clusters is clamped to between one and the number of sites. If
/// every site can have its own cluster, it does. The count is reduced further if there are fewer
/// distinct points than clusters.
///
/// # Arguments
///
/// * `sites` - The sites to cluster
/// * `method` - The clustering algorithm
/// * `feature` - What sites are compared on
/// * `n_clusters` - The number of clusters wanted
///
/// # Returns
///
/// A cluster index for each site, numbered from zero in order of first appearance.
pub fn cluster_sites_no_bin(
    sites: &[SiteView],
    method: ClusterMethod,
    feature: &Feature,
    n_clusters: usize,
) -> Result<Vec<usize>> {
    let n = sites.len();
    if n == 0 {
        return Ok(Vec::new());
    }

    let k = n_clusters.clamp(1, n);
    if k == n {
        return Ok((0..n).collect());
    }

    let points = feature_points(sites, feature)?;
    let k = k.min(count_distinct(&points));
    debug!("Clustering {n} sites into {k} clusters with {method} method");

    let labels = match method {
        ClusterMethod::Agglomerative => agglomerative(&points, k, Linkage::Ward),
        ClusterMethod::Hierarchical => {
            let distance = match feature {
                Feature::Profile => Distance::Correlation,
                Feature::Columns(_) => Distance::Euclidean,
            };
            agglomerative(&points, k, Linkage::Average(distance))
        }
        ClusterMethod::KMeans => kmeans(&points, k),
    };

    Ok(labels)
}

/// Divide sites into partitions, in order of first appearance.
///
/// # Returns
///
/// The label shared by each partition along with the indices of its sites.
pub fn partition_sites(
    sites: &[SiteView],
    partitioning: &Partitioning,
) -> Result<IndexMap<ClusterLabel, Vec<usize>>> {
    let labels: Vec<ClusterLabel> = match partitioning {
        Partitioning::Bin(spec) => {
            let name = bin_part_name(&spec.feature);
            bin_sites(sites, spec)?
                .into_iter()
                .map(|bin| ClusterLabel::new().with_part(&name, bin.to_string()))
                .collect()
        }
        Partitioning::Columns(columns) => sites
            .iter()
            .map(|view| {
                let parts = columns
                    .iter()
                    .map(|column| Ok((column.as_str(), view.site.group_value(column)?)))
                    .collect::<Result<Vec<_>>>()?;
                Ok(ClusterLabel::from_parts(parts))
            })
            .collect::<Result<_>>()?,
    };

    let mut partitions: IndexMap<ClusterLabel, Vec<usize>> = IndexMap::new();
    for (idx, label) in labels.into_iter().enumerate() {
        partitions.entry(label).or_default().push(idx);
    }

    Ok(partitions)
}

/// Cluster each partition separately, appending the cluster to each partition's label
fn cluster_partitions(
    sites: &[SiteView],
    partitions: IndexMap<ClusterLabel, Vec<usize>>,
    method: ClusterMethod,
    feature: &Feature,
    count: &ClusterCount,
) -> Result<Vec<ClusterLabel>> {
    let mut labels = vec![ClusterLabel::new(); sites.len()];
    for (partition_label, members) in partitions {
        let subset: Vec<SiteView> = members.iter().map(|idx| sites[*idx].clone()).collect();
        let n_clusters = num_clusters_from_capacity(&subset, count).value;
        let clusters = cluster_sites_no_bin(&subset, method, feature, n_clusters)?;

        for (idx, cluster) in members.into_iter().zip(clusters) {
            labels[idx] = partition_label.with_part(CLUSTER_PART, cluster.to_string());
        }
    }

    Ok(labels)
}

/// Partition sites by bins or columns, then cluster each partition separately.
///
/// Capacity targets (for both bins and clusters) are resolved using the capacity of the sites
/// being divided, so each partition may get a different number of clusters.
///
/// # Returns
///
/// A label for each site, made up of its partition and its cluster within that partition.
pub fn cluster_sites_binned(
    sites: &[SiteView],
    within: &Partitioning,
    method: ClusterMethod,
    feature: &Feature,
    count: &ClusterCount,
) -> Result<Vec<ClusterLabel>> {
    let partitions = partition_sites(sites, within)?;
    cluster_partitions(sites, partitions, method, feature, count)
}

/// Cluster sites according to one clustering stage
pub fn cluster_sites(sites: &[SiteView], spec: &ClusterSpec) -> Result<Vec<ClusterLabel>> {
    match &spec.within {
        Some(within) => {
            cluster_sites_binned(sites, within, spec.method, &spec.feature, &spec.count)
        }
        None => {
            let everything = IndexMap::from([(ClusterLabel::new(), (0..sites.len()).collect())]);
            cluster_partitions(sites, everything, spec.method, &spec.feature, &spec.count)
        }
    }
}
