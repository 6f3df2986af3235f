//! Regions represent the geographical areas in which candidate sites are located.
use crate::id::define_id_type;

define_id_type! {RegionID}

/// The tag used in settings files to indicate that an entry applies to every model region
pub const ALL_REGIONS_TAG: &str = "all";

/// Whether the given region string is the "all regions" tag (case-insensitive)
pub fn is_all_tag(s: &str) -> bool {
    s.trim().eq_ignore_ascii_case(ALL_REGIONS_TAG)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("all", true)]
    #[case("ALL", true)]
    #[case(" All ", true)]
    #[case("allegheny", false)]
    #[case("A", false)]
    fn test_is_all_tag(#[case] s: &str, #[case] expected: bool) {
        assert_eq!(is_all_tag(s), expected);
    }
}
