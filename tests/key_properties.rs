//! Properties of the grouping and identity keys.

use proptest::prelude::*;
use relbatch::{PathKey, PathSegment, PrimaryKey, Record, RecordKey};

fn arb_segment() -> impl Strategy<Value = PathSegment> {
    prop_oneof![
        "[a-zA-Z_][a-zA-Z0-9_]{0,6}".prop_map(PathSegment::Field),
        // Empty names, separators and escapes are over-represented
        "[ab|\\\\]{0,3}".prop_map(PathSegment::Field),
        (0usize..1000).prop_map(PathSegment::Index),
    ]
}

fn arb_path() -> impl Strategy<Value = Vec<PathSegment>> {
    prop::collection::vec(arb_segment(), 0..8)
}

fn fields_only(path: &[PathSegment]) -> Vec<PathSegment> {
    path.iter()
        .filter(|segment| matches!(segment, PathSegment::Field(..)))
        .cloned()
        .collect()
}

struct Row {
    kind: String,
    key: Vec<String>,
}

impl Record for Row {
    fn concrete_type(&self) -> &str {
        &self.kind
    }

    fn primary_key(&self) -> Option<PrimaryKey> {
        Some(PrimaryKey::Composite(self.key.clone()))
    }
}

// Separators and escapes are deliberately over-represented
fn arb_component() -> impl Strategy<Value = String> {
    "[ab:\\\\]{0,4}"
}

fn arb_row() -> impl Strategy<Value = (String, Vec<String>)> {
    (
        "[AB:\\\\]{0,3}",
        prop::collection::vec(arb_component(), 1..4),
    )
}

proptest! {
    #[test]
    fn list_indexes_never_fragment_a_key(path in arb_path()) {
        prop_assert_eq!(PathKey::derive(&path), PathKey::derive(&fields_only(&path)));
    }

    #[test]
    fn reindexed_paths_share_a_key(path in arb_path(), shift in 1usize..50) {
        let shifted: Vec<PathSegment> = path
            .iter()
            .map(|segment| match segment {
                PathSegment::Index(i) => PathSegment::Index(i + shift),
                field => field.clone(),
            })
            .collect();

        prop_assert_eq!(PathKey::derive(&path), PathKey::derive(&shifted));
    }

    #[test]
    fn field_segments_decide_the_key(left in arb_path(), right in arb_path()) {
        let same_fields = fields_only(&left) == fields_only(&right);
        prop_assert_eq!(PathKey::derive(&left) == PathKey::derive(&right), same_fields);
    }

    #[test]
    fn record_keys_identify_records(left in arb_row(), right in arb_row()) {
        let build = |(kind, key): &(String, Vec<String>)| {
            RecordKey::build(&Row { kind: kind.clone(), key: key.clone() }).unwrap()
        };

        prop_assert_eq!(build(&left) == build(&right), left == right);
    }
}
