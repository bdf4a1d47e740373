use crate::embedding::EmbeddedRef;
use chrono::{DateTime, SecondsFormat, Utc};
use indexmap::IndexMap;
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};
use std::fmt;
use std::sync::Arc;

/// String-keyed mapping that keeps insertion order
pub type Mapping = IndexMap<String, Value>;

/// An untyped structural value
///
/// Builders return `Value`s that may contain [`Value::Embedded`] markers;
/// published snapshots contain none.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    /// Opaque date/time leaf, duplicated whole rather than decomposed
    Timestamp(DateTime<Utc>),
    Sequence(Vec<Value>),
    Mapping(Mapping),
    /// Callable leaf, shared by reference
    Action(Action),
    /// Placeholder for another computation's resolved value
    Embedded(EmbeddedRef),
}

impl Value {
    /// Build a mapping from key/value pairs, keeping their order
    pub fn mapping<K, V, I>(entries: I) -> Value
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        Value::Mapping(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Build a sequence from values
    pub fn sequence<V, I>(items: I) -> Value
    where
        V: Into<Value>,
        I: IntoIterator<Item = V>,
    {
        Value::Sequence(items.into_iter().map(Into::into).collect())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_embedded(&self) -> bool {
        matches!(self, Value::Embedded(_))
    }

    /// Sequences and mappings are containers; everything else is a leaf
    pub fn is_container(&self) -> bool {
        matches!(self, Value::Sequence(_) | Value::Mapping(_))
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(n) => Some(*n),
            Value::Int(n) => Some(*n as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<&DateTime<Utc>> {
        match self {
            Value::Timestamp(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&Vec<Value>> {
        match self {
            Value::Sequence(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_mapping(&self) -> Option<&Mapping> {
        match self {
            Value::Mapping(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_action(&self) -> Option<&Action> {
        match self {
            Value::Action(action) => Some(action),
            _ => None,
        }
    }

    pub fn as_embedded(&self) -> Option<&EmbeddedRef> {
        match self {
            Value::Embedded(marker) => Some(marker),
            _ => None,
        }
    }

    /// Look up a mapping entry
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_mapping().and_then(|map| map.get(key))
    }

    /// Look up a nested value by `/`-separated path (e.g. `/items/0/name`)
    ///
    /// Sequence segments must parse as indices. The empty path is the value
    /// itself.
    pub fn pointer(&self, path: &str) -> Option<&Value> {
        if path.is_empty() {
            return Some(self);
        }
        let rest = path.strip_prefix('/')?;
        rest.split('/').try_fold(self, |current, segment| match current {
            Value::Mapping(map) => map.get(segment),
            Value::Sequence(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        })
    }

    /// Short name of the variant, for diagnostics
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Timestamp(_) => "timestamp",
            Value::Sequence(_) => "sequence",
            Value::Mapping(_) => "mapping",
            Value::Action(_) => "action",
            Value::Embedded(_) => "embedded",
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Timestamp(a), Value::Timestamp(b)) => a == b,
            (Value::Sequence(a), Value::Sequence(b)) => a == b,
            // Mapping equality ignores order, like the structures it models
            (Value::Mapping(a), Value::Mapping(b)) => a == b,
            (Value::Action(a), Value::Action(b)) => a.ptr_eq(b),
            (Value::Embedded(a), Value::Embedded(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(n) => write!(f, "{n}"),
            Value::Float(n) => write!(f, "{n:?}"),
            Value::String(s) => write!(f, "{s:?}"),
            Value::Timestamp(t) => write!(f, "{}", t.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            Value::Sequence(items) => f.debug_list().entries(items).finish(),
            Value::Mapping(map) => f.debug_map().entries(map.iter()).finish(),
            Value::Action(action) => action.fmt(f),
            Value::Embedded(marker) => marker.fmt(f),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(n) => serializer.serialize_i64(*n),
            Value::Float(n) => serializer.serialize_f64(*n),
            Value::String(s) => serializer.serialize_str(s),
            Value::Timestamp(t) => {
                serializer.serialize_str(&t.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            }
            Value::Sequence(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Mapping(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (key, value) in entries {
                    map.serialize_entry(key, value)?;
                }
                map.end()
            }
            Value::Action(_) => serializer.serialize_str("<action>"),
            Value::Embedded(marker) => {
                serializer.serialize_str(&format!("<embedded {}>", marker.name()))
            }
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n.into())
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Int(n.into())
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Float(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(t: DateTime<Utc>) -> Self {
        Value::Timestamp(t)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Sequence(items)
    }
}

impl From<Mapping> for Value {
    fn from(map: Mapping) -> Self {
        Value::Mapping(map)
    }
}

impl From<Action> for Value {
    fn from(action: Action) -> Self {
        Value::Action(action)
    }
}

impl From<EmbeddedRef> for Value {
    fn from(marker: EmbeddedRef) -> Self {
        Value::Embedded(marker)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map(Into::into).unwrap_or(Value::Null)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Sequence(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => {
                Value::Mapping(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

type ActionFn = dyn Fn(&[Value]) + Send + Sync;

/// A callable leaf stored inside a value
///
/// Actions are how builders hand mutation capabilities to readers, e.g. an
/// `increment` next to a `count`.
#[derive(Clone)]
pub struct Action(Arc<ActionFn>);

impl Action {
    /// Action that ignores its arguments
    pub fn new(f: impl Fn() + Send + Sync + 'static) -> Self {
        Self(Arc::new(move |_: &[Value]| f()))
    }

    /// Action that receives the invocation arguments
    pub fn with_args(f: impl Fn(&[Value]) + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub fn invoke(&self) {
        (self.0)(&[]);
    }

    pub fn invoke_with(&self, args: &[Value]) {
        (self.0)(args);
    }

    pub fn ptr_eq(&self, other: &Action) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<action>")
    }
}
