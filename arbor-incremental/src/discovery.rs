//! Embedding discovery
//!
//! Finds the embedded-computation markers inside a raw structure, in
//! document order: sequence elements by index, mapping entries by insertion
//! order, depth first. Markers are terminals; the walk never looks inside
//! them.
//!
//! The filler in [`crate::clone`] replays this exact walk, which is what
//! lets a child's resolved value land in the slot its marker occupied.

use arbor_types::{EmbeddedRef, Value};
use std::fmt;

/// One step from a container to a child slot
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    /// Position in a sequence
    Index(usize),
    /// Key in a mapping
    Key(String),
}

/// Location of a slot relative to the walked value; empty means the value itself
pub type SlotPath = Vec<Segment>;

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Index(i) => write!(f, "/{i}"),
            Segment::Key(k) => write!(f, "/{k}"),
        }
    }
}

/// Walk `value`, calling `visit` with the path and marker of every embedded leaf
pub fn walk_embedded<'v, F>(value: &'v Value, visit: &mut F)
where
    F: FnMut(&[Segment], &'v EmbeddedRef),
{
    let mut path = Vec::new();
    walk(value, &mut path, visit);
}

fn walk<'v, F>(value: &'v Value, path: &mut SlotPath, visit: &mut F)
where
    F: FnMut(&[Segment], &'v EmbeddedRef),
{
    match value {
        Value::Embedded(marker) => visit(path.as_slice(), marker),
        Value::Sequence(items) => {
            for (i, item) in items.iter().enumerate() {
                path.push(Segment::Index(i));
                walk(item, path, visit);
                path.pop();
            }
        }
        Value::Mapping(map) => {
            for (key, item) in map {
                path.push(Segment::Key(key.clone()));
                walk(item, path, visit);
                path.pop();
            }
        }
        Value::Null
        | Value::Bool(_)
        | Value::Int(_)
        | Value::Float(_)
        | Value::String(_)
        | Value::Timestamp(_)
        | Value::Action(_) => {}
    }
}

/// Collect every embedded marker in document order
pub fn discover(value: &Value) -> Vec<EmbeddedRef> {
    let mut found = Vec::new();
    walk_embedded(value, &mut |_, marker| found.push(marker.clone()));
    found
}

/// Collect the slot path of every embedded marker in document order
pub fn slot_paths(value: &Value) -> Vec<SlotPath> {
    let mut paths = Vec::new();
    walk_embedded(value, &mut |path, _| paths.push(path.to_vec()));
    paths
}

/// Number of embedded markers in `value`
pub fn count_embedded(value: &Value) -> usize {
    let mut count = 0;
    walk_embedded(value, &mut |_, _| count += 1);
    count
}

/// Render a slot path as `/a/0/b`
pub fn display_path(path: &[Segment]) -> String {
    if path.is_empty() {
        return "/".to_string();
    }
    path.iter().map(ToString::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_types::{Embedding, Mapping};
    use std::any::Any;
    use std::sync::Arc;

    struct Marker(&'static str);

    impl Embedding for Marker {
        fn name(&self) -> &str {
            self.0
        }

        fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
            self
        }
    }

    fn marker(name: &'static str) -> Value {
        Value::Embedded(EmbeddedRef::new(Marker(name)))
    }

    #[test]
    fn test_discovers_in_document_order() {
        let value = Value::mapping([
            ("first", marker("a")),
            (
                "nested",
                Value::sequence([Value::from(1), marker("b"), Value::mapping([("deep", marker("c"))])]),
            ),
            ("last", marker("d")),
        ]);

        let names: Vec<_> = discover(&value).iter().map(|m| m.name().to_string()).collect();
        assert_eq!(names, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_paths_match_discovery() {
        let value = Value::mapping([
            ("x", Value::sequence([Value::Null, marker("a")])),
            ("y", marker("b")),
        ]);

        let paths: Vec<_> = slot_paths(&value).iter().map(|p| display_path(p)).collect();
        assert_eq!(paths, vec!["/x/1", "/y"]);
        assert_eq!(count_embedded(&value), discover(&value).len());
    }

    #[test]
    fn test_root_marker_is_terminal() {
        let value = marker("root");
        assert_eq!(slot_paths(&value), vec![SlotPath::new()]);
        assert_eq!(display_path(&[]), "/");
    }

    #[test]
    fn test_scalars_contribute_nothing() {
        let mut map = Mapping::new();
        map.insert("n".into(), Value::Null);
        map.insert("s".into(), Value::from("text"));
        map.insert("items".into(), Value::Sequence(vec![]));

        assert!(discover(&Value::Mapping(map)).is_empty());
        assert!(discover(&Value::from(3)).is_empty());
    }
}
