//! The inverted-index payload for one key.

use std::collections::BTreeMap;
use strata_core::InputId;

/// The set of `(input, value)` pairs associated with one key. Each input
/// contributes at most one value per key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueContainer<V> {
    entries: BTreeMap<InputId, V>,
}

impl<V> Default for ValueContainer<V> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }
}

impl<V> ValueContainer<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_value(&mut self, input: InputId, value: V) {
        self.entries.insert(input, value);
    }

    pub fn remove_all_values(&mut self, input: InputId) {
        self.entries.remove(&input);
    }

    pub fn get(&self, input: InputId) -> Option<&V> {
        self.entries.get(&input)
    }

    pub fn contains_input(&self, input: InputId) -> bool {
        self.entries.contains_key(&input)
    }

    pub fn input_ids(&self) -> impl Iterator<Item = InputId> + '_ {
        self.entries.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (InputId, &V)> {
        self.entries.iter().map(|(input, value)| (*input, value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<V> FromIterator<(InputId, V)> for ValueContainer<V> {
    fn from_iter<I: IntoIterator<Item = (InputId, V)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}
