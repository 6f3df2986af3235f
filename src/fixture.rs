//! Fixtures for tests
use crate::cluster::{ClusterLabel, ClusterRow};
use crate::site::{ProfileMap, Site, SiteView};
use crate::units::Capacity;
use indexmap::IndexMap;
use std::rc::Rc;

/// Assert that an error with the given message occurs
macro_rules! assert_error {
    ($result:expr, $msg:expr) => {
        assert_eq!(
            $result.unwrap_err().chain().next().unwrap().to_string(),
            $msg
        );
    };
}
pub(crate) use assert_error;

/// Create a site with the given numeric and categorical columns
pub fn site(
    id: &str,
    region: &str,
    capacity: f64,
    numeric: &[(&str, f64)],
    categorical: &[(&str, &str)],
) -> Site {
    Site {
        id: id.into(),
        region: region.into(),
        capacity: Capacity(capacity),
        numeric: numeric
            .iter()
            .map(|(name, value)| ((*name).to_string(), *value))
            .collect(),
        categorical: categorical
            .iter()
            .map(|(name, value)| ((*name).to_string(), (*value).to_string()))
            .collect(),
    }
}

/// Create a profile for every site with `profile_fn`
pub fn profiles<F>(sites: &[Site], profile_fn: F) -> ProfileMap
where
    F: Fn(&Site) -> Vec<f64>,
{
    sites
        .iter()
        .map(|site| (site.id.clone(), Rc::from(profile_fn(site))))
        .collect()
}

/// Pair each site with its profile
pub fn site_views<'a>(sites: &'a [Site], profiles: &ProfileMap) -> Vec<SiteView<'a>> {
    sites
        .iter()
        .map(|site| SiteView::new(site, profiles).unwrap())
        .collect()
}

/// A cluster of one 1 MW site in region `A` with the given numeric columns
pub fn cluster_row(label: ClusterLabel, numeric: &[(&str, f64)]) -> ClusterRow {
    ClusterRow {
        label,
        region: "A".into(),
        capacity: Capacity(1.0),
        n_sites: 1,
        numeric: numeric
            .iter()
            .map(|(name, value)| ((*name).to_string(), *value))
            .collect::<IndexMap<_, _>>(),
        categorical: IndexMap::new(),
        profile: Rc::from([0.5]),
        site_ids: vec!["1".into()],
    }
}
