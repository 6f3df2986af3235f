//! The full pipeline taking candidate sites to aggregated clusters.
use super::aggregate::{ClusterRow, aggregate_clusters};
use super::bin::bin_sites;
use super::dispatch::{bin_part_name, cluster_sites};
use super::label::ClusterLabel;
use super::spec::{ClusterConfig, FilterSpec};
use crate::region::RegionID;
use crate::site::{ProfileSource, Site, SiteMap, SiteView, total_capacity};
use crate::units::Capacity;
use anyhow::Result;
use indexmap::IndexMap;
use log::{debug, info, warn};

/// The column used to rank sites when keeping only the cheapest ones
pub const COST_COLUMN: &str = "lcoe";

/// Whether `site` is in one of `regions` and passes every filter
fn keep_site(site: &Site, regions: &[RegionID], filters: &[FilterSpec]) -> Result<bool> {
    if !regions.is_empty() && !regions.contains(&site.region) {
        return Ok(false);
    }

    for filter in filters {
        if !filter.accepts(site)? {
            return Ok(false);
        }
    }

    Ok(true)
}

/// Keep the cheapest sites needed to reach `min_capacity`, in their original order.
///
/// If there isn't enough capacity, every site is kept and a warning is logged.
fn select_min_capacity<'a>(
    sites: Vec<SiteView<'a>>,
    min_capacity: Capacity,
) -> Result<Vec<SiteView<'a>>> {
    let available = total_capacity(&sites);
    if available < min_capacity {
        warn!(
            "Only {available} MW of capacity available, which is less than the minimum capacity \
            of {min_capacity} MW"
        );
        return Ok(sites);
    }

    let costs: Vec<f64> = sites
        .iter()
        .map(|view| view.site.numeric_value(COST_COLUMN))
        .collect::<Result<_>>()?;
    let mut order: Vec<usize> = (0..sites.len()).collect();
    order.sort_by(|a, b| costs[*a].total_cmp(&costs[*b]));

    let mut keep = vec![false; sites.len()];
    let mut capacity = Capacity(0.0);
    for idx in order {
        if capacity >= min_capacity {
            break;
        }
        keep[idx] = true;
        capacity += sites[idx].site.capacity;
    }

    Ok(sites
        .into_iter()
        .zip(keep)
        .filter_map(|(view, keep)| keep.then_some(view))
        .collect())
}

/// Apply a labelling function separately within each current cluster.
///
/// The labels `label_fn` returns for each subset are appended to the labels the sites already
/// have.
fn subdivide<F>(sites: &[SiteView], labels: &mut [ClusterLabel], mut label_fn: F) -> Result<()>
where
    F: FnMut(&[SiteView]) -> Result<Vec<ClusterLabel>>,
{
    let mut groups: IndexMap<ClusterLabel, Vec<usize>> = IndexMap::new();
    for (idx, label) in labels.iter().enumerate() {
        groups.entry(label.clone()).or_default().push(idx);
    }

    for (label, members) in groups {
        let subset: Vec<SiteView> = members.iter().map(|idx| sites[*idx].clone()).collect();
        for (idx, sub_label) in members.into_iter().zip(label_fn(&subset)?) {
            labels[idx] = label.join(&sub_label);
        }
    }

    Ok(())
}

/// Group candidate sites into clusters and aggregate each cluster into one row.
///
/// The stages of the pipeline are applied in order, each one optional:
///
/// 1. Sites outside `regions` or failing any filter are dropped
/// 2. If `min_capacity` is set, only the cheapest sites needed to reach it are kept
/// 3. Each bin specification divides the current groups into bins
/// 4. Sites are grouped by the values of the `group` columns
/// 5. Each cluster specification clusters the sites within each current group
/// 6. Sites with the same label are aggregated
///
/// The total capacity of the returned rows equals that of the sites which pass stages 1 and 2.
///
/// # Arguments
///
/// * `sites` - Candidate sites
/// * `profiles` - Hourly profiles for the sites
/// * `regions` - Regions to take sites from. If empty, sites from every region are used.
/// * `config` - Options for each stage
pub fn assign_site_cluster<P: ProfileSource + ?Sized>(
    sites: &SiteMap,
    profiles: &P,
    regions: &[RegionID],
    config: &ClusterConfig,
) -> Result<Vec<ClusterRow>> {
    let mut views = Vec::new();
    for site in sites.values() {
        if keep_site(site, regions, &config.filter)? {
            views.push(SiteView::new(site, profiles)?);
        }
    }
    if views.is_empty() {
        warn!("No sites left to cluster after filtering");
        return Ok(Vec::new());
    }
    debug!("{} of {} sites passed filters", views.len(), sites.len());

    if let Some(min_capacity) = config.min_capacity {
        views = select_min_capacity(views, min_capacity)?;
    }

    let mut labels = vec![ClusterLabel::new(); views.len()];
    for spec in &config.bin {
        let name = bin_part_name(&spec.feature);
        subdivide(&views, &mut labels, |subset| {
            Ok(bin_sites(subset, spec)?
                .into_iter()
                .map(|bin| ClusterLabel::new().with_part(&name, bin.to_string()))
                .collect())
        })?;
    }

    if !config.group.is_empty() {
        for (label, view) in labels.iter_mut().zip(&views) {
            for column in &config.group {
                *label = label.with_part(column, view.site.group_value(column)?);
            }
        }
    }

    for spec in &config.cluster {
        subdivide(&views, &mut labels, |subset| cluster_sites(subset, spec))?;
    }

    let rows = aggregate_clusters(&views, &labels)?;
    info!("Grouped {} sites into {} clusters", views.len(), rows.len());

    Ok(rows)
}
