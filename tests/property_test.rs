use proptest::prelude::*;
use twice::core::elements::{Freshness, classify};
use twice::core::storage::element::{element_id, element_type, make_key};

proptest! {
    /// Splitting a key on the first underscore recovers exactly the kind
    /// and id it was built from, for any id (ids may contain underscores).
    #[test]
    fn key_split_inverts_make_key(
        kind in "[a-z][a-z0-9]{0,11}",
        id in "[ -~]{0,40}",
    ) {
        let key = make_key(&kind, &id);
        prop_assert_eq!(element_type(&key), kind.as_str());
        prop_assert_eq!(element_id(&key), id.as_str());
    }

    /// The freshness classification is a total three-way partition of the
    /// timeline, consistent with its defining inequalities.
    #[test]
    fn classify_is_a_total_partition(
        now in 0u64..2_000_000,
        expires_on in 0u64..1_000_000,
        cache_control in 0u64..100_000,
    ) {
        let freshness = classify(now, expires_on, cache_control);
        let expected = if now <= expires_on {
            Freshness::Fresh
        } else if now <= expires_on + 3 * cache_control {
            Freshness::SoftStale
        } else {
            Freshness::HardStale
        };
        prop_assert_eq!(freshness, expected);
    }

    /// Rendering a marker-free body is the identity, whatever the body.
    #[test]
    fn render_without_markers_is_identity(body in "[a-zA-Z0-9 .,!?\n-]{0,200}") {
        let pattern = regex::Regex::new(r"<%%\s+(.*?)\s+%%>").unwrap();
        let mut map = twice::core::template::FragmentMap::new();
        let (output, effects) = twice::core::template::render(&pattern, &body, &mut map);
        prop_assert_eq!(output, body);
        prop_assert!(effects.is_empty());
    }
}
