//! Candidate project areas (CPAs): the sites which are grouped into clusters.
use crate::id::define_id_type;
use crate::region::RegionID;
use crate::units::Capacity;
use anyhow::{Context, Result};
use indexmap::IndexMap;
use std::rc::Rc;

define_id_type! {SiteID}

/// The name of the column holding site IDs
pub const SITE_ID_COLUMN: &str = "cpa_id";

/// The name of the column holding the region a site is in
pub const REGION_COLUMN: &str = "region";

/// The name of the column holding site capacities (MW)
pub const CAPACITY_COLUMN: &str = "mw";

/// Pseudo-feature name used to cluster on hourly generation profiles
pub const PROFILE_FEATURE: &str = "profile";

/// A candidate site for renewable generation
#[derive(Debug, Clone, PartialEq)]
pub struct Site {
    /// Unique identifier for the site
    pub id: SiteID,
    /// The region the site is located in
    pub region: RegionID,
    /// Maximum capacity which could be built at this site
    pub capacity: Capacity,
    /// Other numeric attributes of the site (e.g. `lcoe`, `latitude`)
    pub numeric: IndexMap<String, f64>,
    /// Categorical attributes of the site (e.g. `state`, `county`)
    pub categorical: IndexMap<String, String>,
}

impl Site {
    /// Get the value of a numeric column for this site.
    ///
    /// The capacity column is available under its usual name (`mw`).
    pub fn numeric_value(&self, column: &str) -> Result<f64> {
        if column == CAPACITY_COLUMN {
            return Ok(self.capacity.value());
        }

        self.numeric
            .get(column)
            .copied()
            .with_context(|| format!("Site {} has no numeric column '{column}'", self.id))
    }

    /// Get the value of any column as a string, for grouping
    pub fn group_value(&self, column: &str) -> Result<String> {
        match column {
            SITE_ID_COLUMN => return Ok(self.id.to_string()),
            REGION_COLUMN => return Ok(self.region.to_string()),
            _ => {}
        }

        if let Some(value) = self.categorical.get(column) {
            return Ok(value.clone());
        }

        self.numeric_value(column)
            .map(|value| value.to_string())
            .with_context(|| format!("Unknown column '{column}'"))
    }
}

/// All the sites for one technology, in input order
pub type SiteMap = IndexMap<SiteID, Site>;

/// Hourly capacity factors for each site
pub type ProfileMap = IndexMap<SiteID, Rc<[f64]>>;

/// Somewhere hourly generation profiles can be retrieved from
pub trait ProfileSource {
    /// Get the hourly profile for the given site, if there is one
    fn profile(&self, site_id: &SiteID) -> Option<Rc<[f64]>>;
}

impl ProfileSource for ProfileMap {
    fn profile(&self, site_id: &SiteID) -> Option<Rc<[f64]>> {
        self.get(site_id).map(Rc::clone)
    }
}

/// A site together with its profile, as passed between the stages of the clustering pipeline
#[derive(Debug, Clone)]
pub struct SiteView<'a> {
    /// The underlying site
    pub site: &'a Site,
    /// The site's hourly profile
    pub profile: Rc<[f64]>,
}

impl<'a> SiteView<'a> {
    /// Attach the profile for `site` from `profiles`
    pub fn new<P: ProfileSource + ?Sized>(site: &'a Site, profiles: &P) -> Result<Self> {
        let profile = profiles
            .profile(&site.id)
            .with_context(|| format!("No profile found for site {}", site.id))?;

        Ok(Self { site, profile })
    }
}

/// The total capacity of a collection of sites
pub fn total_capacity(sites: &[SiteView]) -> Capacity {
    sites.iter().map(|view| view.site.capacity).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::{assert_error, site};

    #[test]
    fn test_numeric_value() {
        let site = site("s1", "A", 10.0, &[("lcoe", 42.0)], &[]);
        assert_eq!(site.numeric_value("lcoe").unwrap(), 42.0);
        assert_eq!(site.numeric_value(CAPACITY_COLUMN).unwrap(), 10.0);
        assert_error!(
            site.numeric_value("lat"),
            "Site s1 has no numeric column 'lat'"
        );
    }

    #[test]
    fn test_group_value() {
        let site = site("s1", "A", 10.0, &[("bin", 2.0)], &[("county", "Adams")]);
        assert_eq!(site.group_value("county").unwrap(), "Adams");
        assert_eq!(site.group_value(REGION_COLUMN).unwrap(), "A");
        assert_eq!(site.group_value("bin").unwrap(), "2");
        assert_error!(site.group_value("state"), "Unknown column 'state'");
    }

    #[test]
    fn test_site_view_missing_profile() {
        let site = site("s1", "A", 10.0, &[], &[]);
        let profiles = ProfileMap::new();
        assert_error!(
            SiteView::new(&site, &profiles),
            "No profile found for site s1"
        );
    }
}
