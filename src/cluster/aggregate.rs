//! Combining the sites in each cluster into a single representative row.
use super::label::ClusterLabel;
use crate::region::RegionID;
use crate::site::{CAPACITY_COLUMN, SiteID, SiteView, total_capacity};
use crate::units::Capacity;
use anyhow::{Result, ensure};
use indexmap::IndexMap;
use std::rc::Rc;

/// One aggregated cluster
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterRow {
    /// Identifies the cluster
    pub label: ClusterLabel,
    /// The region of the largest site in the cluster
    pub region: RegionID,
    /// Total capacity of all the sites in the cluster
    pub capacity: Capacity,
    /// The number of sites in the cluster
    pub n_sites: usize,
    /// Capacity-weighted means of numeric columns
    pub numeric: IndexMap<String, f64>,
    /// Categorical values of the largest site in the cluster
    pub categorical: IndexMap<String, String>,
    /// Capacity-weighted mean of the sites' hourly profiles
    pub profile: Rc<[f64]>,
    /// The sites in the cluster
    pub site_ids: Vec<SiteID>,
}

impl ClusterRow {
    /// Get the value of a numeric column, including capacity (`mw`)
    pub fn column(&self, name: &str) -> Option<f64> {
        if name == CAPACITY_COLUMN {
            return Some(self.capacity.value());
        }

        self.numeric.get(name).copied()
    }

    /// Get a mutable reference to the value of a numeric column, including capacity (`mw`)
    pub fn column_mut(&mut self, name: &str) -> Option<&mut f64> {
        if name == CAPACITY_COLUMN {
            return Some(&mut self.capacity.0);
        }

        self.numeric.get_mut(name)
    }
}

/// Weighted elementwise mean of the members' profiles
fn weighted_mean_profile(members: &[SiteView], weights: &[f64]) -> Result<Rc<[f64]>> {
    // A single profile is shared as-is
    if let [only] = members {
        return Ok(Rc::clone(&only.profile));
    }

    let len = members[0].profile.len();
    ensure!(
        members.iter().all(|view| view.profile.len() == len),
        "Profiles for sites in a cluster must all have the same length"
    );

    let mut mean = vec![0.0; len];
    for (view, weight) in members.iter().zip(weights) {
        for (total, value) in mean.iter_mut().zip(view.profile.iter()) {
            *total += weight * value;
        }
    }

    Ok(mean.into())
}

/// Aggregate the sites in one cluster.
///
/// Numeric columns and profiles are averaged, weighted by capacity. If the cluster has no
/// capacity at all, every site is weighted equally. Categorical columns and the region are
/// taken from the site with the largest capacity.
///
/// # Arguments
///
/// * `label` - The label of the cluster
/// * `members` - The sites in the cluster
pub fn aggregate_cluster(label: ClusterLabel, members: &[SiteView]) -> Result<ClusterRow> {
    ensure!(!members.is_empty(), "Cannot aggregate empty cluster {label}");

    let capacity = total_capacity(members);
    let weights: Vec<f64> = if capacity > Capacity(0.0) {
        members
            .iter()
            .map(|view| (view.site.capacity / capacity).value())
            .collect()
    } else {
        vec![1.0 / members.len() as f64; members.len()]
    };

    let mut numeric = IndexMap::new();
    for column in members[0].site.numeric.keys() {
        let mut mean = 0.0;
        for (view, weight) in members.iter().zip(&weights) {
            mean += weight * view.site.numeric_value(column)?;
        }
        numeric.insert(column.clone(), mean);
    }

    // The first of the largest sites
    let largest = members
        .iter()
        .reduce(|best, view| {
            if view.site.capacity > best.site.capacity {
                view
            } else {
                best
            }
        })
        .map(|view| view.site)
        .unwrap_or(members[0].site);

    Ok(ClusterRow {
        label,
        region: largest.region.clone(),
        capacity,
        n_sites: members.len(),
        numeric,
        categorical: largest.categorical.clone(),
        profile: weighted_mean_profile(members, &weights)?,
        site_ids: members.iter().map(|view| view.site.id.clone()).collect(),
    })
}

/// Aggregate sites by cluster label.
///
/// Rows are returned in order of each label's first appearance.
pub fn aggregate_clusters(sites: &[SiteView], labels: &[ClusterLabel]) -> Result<Vec<ClusterRow>> {
    ensure!(
        sites.len() == labels.len(),
        "Got {} cluster labels for {} sites",
        labels.len(),
        sites.len()
    );

    let mut clusters: IndexMap<&ClusterLabel, Vec<SiteView>> = IndexMap::new();
    for (view, label) in sites.iter().zip(labels) {
        clusters.entry(label).or_default().push(view.clone());
    }

    clusters
        .into_iter()
        .map(|(label, members)| aggregate_cluster(label.clone(), &members))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::{assert_error, profiles, site, site_views};
    use float_cmp::assert_approx_eq;

    #[test]
    fn test_aggregate_cluster() {
        let sites = vec![
            site("1", "A", 10.0, &[("lcoe", 40.0)], &[("county", "Adams")]),
            site("2", "B", 30.0, &[("lcoe", 60.0)], &[("county", "Brown")]),
        ];
        let profiles = profiles(&sites, |site| match &*site.id.0 {
            "1" => vec![0.2, 0.4],
            _ => vec![0.6, 0.8],
        });
        let views = site_views(&sites, &profiles);

        let label = ClusterLabel::from_parts([("cluster", "0")]);
        let row = aggregate_cluster(label.clone(), &views).unwrap();
        assert_eq!(row.label, label);
        assert_eq!(row.capacity, Capacity(40.0));
        assert_eq!(row.n_sites, 2);
        assert_approx_eq!(f64, row.numeric["lcoe"], 55.0);
        assert_eq!(row.region, "B".into());
        assert_eq!(row.categorical["county"], "Brown");
        assert_approx_eq!(f64, row.profile[0], 0.5);
        assert_approx_eq!(f64, row.profile[1], 0.7);
        assert_eq!(row.site_ids, vec![SiteID::from("1"), SiteID::from("2")]);
    }

    #[test]
    fn test_aggregate_cluster_zero_capacity() {
        let sites = vec![
            site("1", "A", 0.0, &[("lcoe", 40.0)], &[]),
            site("2", "A", 0.0, &[("lcoe", 60.0)], &[]),
        ];
        let profiles = profiles(&sites, |_| vec![0.5]);
        let views = site_views(&sites, &profiles);

        let row = aggregate_cluster(ClusterLabel::new(), &views).unwrap();
        assert_eq!(row.capacity, Capacity(0.0));
        assert_approx_eq!(f64, row.numeric["lcoe"], 50.0);
        assert!(row.numeric["lcoe"].is_finite());
    }

    #[test]
    fn test_aggregate_cluster_single_site_shares_profile() {
        let sites = vec![site("1", "A", 5.0, &[], &[])];
        let profiles = profiles(&sites, |_| vec![0.1, 0.2, 0.3]);
        let views = site_views(&sites, &profiles);

        let row = aggregate_cluster(ClusterLabel::new(), &views).unwrap();
        assert!(Rc::ptr_eq(&row.profile, &views[0].profile));
    }

    #[test]
    fn test_aggregate_cluster_empty() {
        assert_error!(
            aggregate_cluster(ClusterLabel::new(), &[]),
            "Cannot aggregate empty cluster all"
        );
    }

    #[test]
    fn test_aggregate_clusters() {
        let sites: Vec<_> = (0..4)
            .map(|i| site(&i.to_string(), "A", f64::from(i), &[], &[]))
            .collect();
        let profiles = profiles(&sites, |_| vec![1.0]);
        let views = site_views(&sites, &profiles);
        let a = ClusterLabel::from_parts([("cluster", "a")]);
        let b = ClusterLabel::from_parts([("cluster", "b")]);

        let rows = aggregate_clusters(&views, &[b.clone(), a.clone(), b.clone(), a.clone()]).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].label, b);
        assert_eq!(rows[0].capacity, Capacity(2.0));
        assert_eq!(rows[1].label, a);
        assert_eq!(rows[1].capacity, Capacity(4.0));
    }

    #[test]
    fn test_column_mut() {
        let sites = vec![site("1", "A", 5.0, &[("lcoe", 40.0)], &[])];
        let profiles = profiles(&sites, |_| vec![0.1]);
        let views = site_views(&sites, &profiles);
        let mut row = aggregate_cluster(ClusterLabel::new(), &views).unwrap();

        *row.column_mut("mw").unwrap() *= 2.0;
        *row.column_mut("lcoe").unwrap() += 1.0;
        assert_eq!(row.column("mw"), Some(10.0));
        assert_eq!(row.column("lcoe"), Some(41.0));
        assert!(row.column_mut("lat").is_none());
    }
}
