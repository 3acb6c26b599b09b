//! Extra-sanity diagnostics: indexer determinism and externalizer contracts.

use crate::extension::{IndexName, IndexedData};
use std::collections::hash_map::DefaultHasher;
use std::fmt::Debug;
use std::fmt::Write as _;
use std::hash::{Hash, Hasher};
use strata_storage::DataExternalizer;

/// Renders the difference between a saved indexer result and a freshly
/// computed one.
pub(crate) fn build_diff<K, V>(saved: &IndexedData<K, V>, fresh: &IndexedData<K, V>) -> String
where
    K: Ord + Debug,
    V: PartialEq + Debug,
{
    let mut out = String::new();
    if saved.len() != fresh.len() {
        let _ = writeln!(
            out,
            "indexer produced a different number of entries, previously {} now {}",
            saved.len(),
            fresh.len()
        );
    } else {
        let _ = writeln!(out, "total {} entries", fresh.len());
    }

    for (key, fresh_value) in fresh {
        match saved.get(key) {
            None => {
                let _ = writeln!(out, "saved data misses {key:?} with value {fresh_value:?}");
            }
            Some(saved_value) if saved_value != fresh_value => {
                let _ = writeln!(
                    out,
                    "different value for {key:?}: new {fresh_value:?}, saved {saved_value:?}"
                );
            }
            Some(_) => {}
        }
    }
    for (key, saved_value) in saved {
        if !fresh.contains_key(key) {
            let _ = writeln!(out, "fresh data misses {key:?} with value {saved_value:?}");
        }
    }
    out
}

fn hash_code<T: Hash>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

/// Round-trips every value through the externalizer and reports equality or
/// hash breakage. Diagnostic only.
pub(crate) fn check_value_round_trip<K, V>(
    externalizer: &dyn DataExternalizer<V>,
    index: &IndexName,
    data: &IndexedData<K, V>,
) where
    V: Eq + Hash,
{
    for value in data.values() {
        let mut encoded = Vec::new();
        if let Err(err) = externalizer.save(&mut encoded, value) {
            tracing::error!(
                target: "strata.index",
                index = %index,
                error = %err,
                "value externalizer failed to encode"
            );
            continue;
        }
        let decoded = match externalizer.read(&mut std::io::Cursor::new(&encoded)) {
            Ok(decoded) => decoded,
            Err(err) => {
                tracing::error!(
                    target: "strata.index",
                    index = %index,
                    error = %err,
                    "value externalizer failed to decode its own output"
                );
                continue;
            }
        };
        if &decoded != value || hash_code(&decoded) != hash_code(value) {
            tracing::error!(
                target: "strata.index",
                index = %index,
                "index violates the equality/hash contract for its value type"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn diff_names_missing_and_changed_entries() {
        let saved: BTreeMap<&str, &str> = [("a", "1"), ("b", "2")].into_iter().collect();
        let fresh: BTreeMap<&str, &str> = [("a", "1"), ("c", "3")].into_iter().collect();

        let diff = build_diff(&saved, &fresh);
        assert!(diff.contains("\"c\""));
        assert!(diff.contains("\"b\""));
    }
}
