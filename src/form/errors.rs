use std::collections::BTreeMap;

use serde_json::{Map, Value, json};

use super::controller::FieldKey;
use super::validation::ValidationError;

/// First error of each failing field, keyed by field path.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FieldErrors<E> {
    errors: BTreeMap<FieldKey, E>,
}

impl<E> Default for FieldErrors<E> {
    fn default() -> Self {
        Self {
            errors: BTreeMap::new(),
        }
    }
}

impl<E> FromIterator<(FieldKey, E)> for FieldErrors<E> {
    fn from_iter<I: IntoIterator<Item = (FieldKey, E)>>(iter: I) -> Self {
        Self {
            errors: iter.into_iter().collect(),
        }
    }
}

impl<E> FieldErrors<E> {
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn get(&self, path: &str) -> Option<&E> {
        self.errors
            .iter()
            .find_map(|(key, error)| key.matches(path).then_some(error))
    }

    pub fn get_key(&self, key: FieldKey) -> Option<&E> {
        self.errors.get(&key)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.get(path).is_some()
    }

    pub fn keys(&self) -> impl Iterator<Item = FieldKey> + '_ {
        self.errors.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (FieldKey, &E)> {
        self.errors.iter().map(|(key, error)| (*key, error))
    }
}

impl<E> FieldErrors<E>
where
    E: ValidationError,
{
    pub fn message(&self, path: &str) -> Option<String> {
        self.get(path).map(ValidationError::message)
    }

    /// Nested object mirroring the model shape, e.g.
    /// `{"social": {"twitter": {"type": "required", "message": "..."}}}`.
    pub fn to_json(&self) -> Value {
        let mut root = Map::new();
        for (key, error) in &self.errors {
            let leaf = json!({ "type": error.code(), "message": error.message() });
            insert_path(&mut root, key.segments(), leaf);
        }
        Value::Object(root)
    }
}

fn insert_path(node: &mut Map<String, Value>, segments: &[&'static str], leaf: Value) {
    let Some((head, rest)) = segments.split_first() else {
        return;
    };
    if rest.is_empty() {
        node.insert((*head).to_string(), leaf);
        return;
    }
    let child = node
        .entry((*head).to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    if !child.is_object() {
        *child = Value::Object(Map::new());
    }
    if let Value::Object(map) = child {
        insert_path(map, rest, leaf);
    }
}
