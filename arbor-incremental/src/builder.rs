//! Builder invocation wrapper
//!
//! A [`Builder`] is a named function from props to a raw structure. Calling
//! [`from`] does not run it; it produces an embedded marker that the runtime
//! later resolves, giving the invocation a stable identity under its parent.

use crate::cells::Cx;
use crate::discovery::discover;
use crate::error::{EngineError, Result};
use arbor_types::{Action, EmbeddedRef, Embedding, Mapping, Value};
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// Props passed to a builder
pub type Props = Mapping;

/// Reserved prop carrying an explicit identity key
pub const KEY_PROP: &str = "key";

/// Reserved prop carrying a back-reference action; never part of identity
pub const REF_PROP: &str = "ref";

/// Error a builder function may return
pub type BuildError = Box<dyn std::error::Error + Send + Sync>;

/// What a builder function returns
pub type BuildResult = std::result::Result<Value, BuildError>;

type BuilderFn = dyn Fn(&mut Cx<'_>, &Props) -> BuildResult + Send + Sync;

/// A named builder function
#[derive(Clone)]
pub struct Builder {
    name: Arc<str>,
    func: Arc<BuilderFn>,
}

impl Builder {
    /// Declare a builder; `name` is its default identity key
    pub fn new<F>(name: impl Into<Arc<str>>, func: F) -> Self
    where
        F: Fn(&mut Cx<'_>, &Props) -> BuildResult + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            func: Arc::new(func),
        }
    }

    /// Declared name
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for Builder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Builder").field("name", &self.name).finish()
    }
}

/// A pending invocation of a builder with bound props
///
/// This is the concrete marker behind every `Value::Embedded` the engine
/// produces.
pub struct BuilderCall {
    builder: Builder,
    props: Props,
    identity_props: Props,
    key: String,
}

/// Raw structure returned by one invocation, with its embedded children
#[derive(Debug)]
pub struct Expansion {
    /// The builder's raw structure
    pub raw: Value,
    /// Embedded markers inside `raw`, in discovery order
    pub children: Vec<EmbeddedRef>,
}

impl BuilderCall {
    /// Bind `props` (or none) to `builder`
    pub fn new(builder: &Builder, props: Option<Props>) -> Self {
        let props = props.unwrap_or_default();

        let mut identity_props = props.clone();
        identity_props.shift_remove(REF_PROP);
        let key = identity_key(builder, identity_props.get(KEY_PROP));
        identity_props.insert(KEY_PROP.to_string(), Value::String(key.clone()));

        Self {
            builder: builder.clone(),
            props,
            identity_props,
            key,
        }
    }

    /// Name of the invoked builder
    pub fn name(&self) -> &str {
        self.builder.name()
    }

    /// Identity key: the `key` prop, or the builder name
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Props exactly as supplied by the caller
    pub fn props(&self) -> &Props {
        &self.props
    }

    /// Props without the back-reference, with the resolved key
    pub fn identity_props(&self) -> &Props {
        &self.identity_props
    }

    /// Action supplied under [`REF_PROP`], if any
    pub fn back_reference(&self) -> Option<&Action> {
        self.props.get(REF_PROP).and_then(Value::as_action)
    }

    /// Run the builder and locate the embedded children of its result
    pub fn expand(&self, cx: &mut Cx<'_>) -> Result<Expansion> {
        let raw = (self.builder.func)(cx, &self.props).map_err(|source| EngineError::Builder {
            name: self.name().to_string(),
            source,
        })?;
        let children = discover(&raw);
        Ok(Expansion { raw, children })
    }
}

impl Embedding for BuilderCall {
    fn name(&self) -> &str {
        self.builder.name()
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

impl fmt::Debug for BuilderCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuilderCall")
            .field("name", &self.name())
            .field("key", &self.key)
            .finish()
    }
}

/// Resolve the identity key from the `key` prop
///
/// Any scalar is accepted. Containers and callables cannot identify a
/// sibling, so they fall back to the builder name with a warning.
fn identity_key(builder: &Builder, key: Option<&Value>) -> String {
    match key {
        None | Some(Value::Null) => builder.name().to_string(),
        Some(Value::String(key)) => key.clone(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(Value::Int(n)) => n.to_string(),
        Some(Value::Float(n)) => n.to_string(),
        Some(Value::Timestamp(t)) => t.to_rfc3339(),
        Some(other) => {
            warn!(
                builder = builder.name(),
                kind = other.kind(),
                "key prop is not a scalar; using the builder name"
            );
            builder.name().to_string()
        }
    }
}

/// Embed an invocation of `builder` at this position of a raw structure
///
/// ```rust
/// use arbor_incremental::{from, state, Builder, Props};
/// use arbor_types::Value;
///
/// let counter = Builder::new("counter", |_cx, props: &Props| {
///     let start = props.get("start").cloned().unwrap_or(Value::from(0));
///     Ok(state(Value::mapping([("count", start)])))
/// });
///
/// let root = state(Value::mapping([
///     ("a", from(&counter, Some(Props::from([("key".into(), Value::from("a"))])))),
///     ("b", from(&counter, None)),
/// ]));
/// assert!(root.get("a").unwrap().is_embedded());
/// ```
pub fn from(builder: &Builder, props: Option<Props>) -> Value {
    Value::Embedded(EmbeddedRef::new(BuilderCall::new(builder, props)))
}

/// Mark a raw structure as a builder's declared state; returns it unchanged
pub fn state(value: impl Into<Value>) -> Value {
    value.into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cells::PendingWork;
    use crate::context::ContextProvider;
    use crate::runtime::InstanceId;
    use parking_lot::Mutex;

    fn call_of(value: &Value) -> Arc<BuilderCall> {
        value.as_embedded().unwrap().downcast::<BuilderCall>().unwrap()
    }

    #[test]
    fn test_key_defaults_to_builder_name() {
        let counter = Builder::new("counter", |_, _| Ok(Value::Null));

        let call = call_of(&from(&counter, None));
        assert_eq!(call.key(), "counter");
        assert!(call.props().is_empty());
        assert_eq!(call.identity_props().get(KEY_PROP), Some(&Value::from("counter")));
    }

    #[test]
    fn test_explicit_key_and_ref_stripping() {
        let counter = Builder::new("counter", |_, _| Ok(Value::Null));
        let props = Props::from([
            (KEY_PROP.to_string(), Value::from("a")),
            (REF_PROP.to_string(), Value::Action(Action::new(|| {}))),
            ("start".to_string(), Value::from(5)),
        ]);

        let call = call_of(&from(&counter, Some(props)));
        assert_eq!(call.key(), "a");
        assert!(call.back_reference().is_some());
        assert!(call.props().contains_key(REF_PROP));
        assert!(!call.identity_props().contains_key(REF_PROP));
        assert_eq!(call.identity_props().get("start"), Some(&Value::from(5)));
    }

    #[test]
    fn test_numeric_key() {
        let item = Builder::new("item", |_, _| Ok(Value::Null));
        let call = call_of(&from(&item, Some(Props::from([(KEY_PROP.to_string(), Value::from(7))]))));
        assert_eq!(call.key(), "7");
    }

    #[test]
    fn test_scalar_keys_are_distinct() {
        let item = Builder::new("item", |_, _| Ok(Value::Null));
        let key_of = |key: Value| {
            call_of(&from(&item, Some(Props::from([(KEY_PROP.to_string(), key)])))).key().to_string()
        };

        assert_eq!(key_of(Value::Float(1.5)), "1.5");
        assert_eq!(key_of(Value::Float(2.5)), "2.5");
        assert_eq!(key_of(Value::Bool(true)), "true");
        assert_eq!(key_of(Value::Null), "item");
        assert_eq!(key_of(Value::sequence([Value::from(1)])), "item");
    }

    #[test]
    fn test_expand_receives_full_props_and_discovers_children() {
        let leaf = Builder::new("leaf", |_, _| Ok(Value::from(1)));
        let parent = {
            let leaf = leaf.clone();
            Builder::new("parent", move |_, props| {
                assert!(props.contains_key(REF_PROP));
                Ok(Value::mapping([
                    ("x", from(&leaf, None)),
                    ("y", Value::sequence([from(&leaf, Some(Props::from([(KEY_PROP.to_string(), Value::from("y"))])))])),
                ]))
            })
        };
        let props = Props::from([(REF_PROP.to_string(), Value::Action(Action::new(|| {})))]);
        let call = BuilderCall::new(&parent, Some(props));

        let mut cells = Vec::new();
        let pending = Arc::new(Mutex::new(PendingWork::default()));
        let contexts = ContextProvider::new();
        let mut cx = Cx::new(InstanceId(1), call.name(), &mut cells, &pending, &contexts);

        let expansion = call.expand(&mut cx).unwrap();
        let keys: Vec<_> = expansion
            .children
            .iter()
            .map(|child| child.downcast::<BuilderCall>().unwrap().key().to_string())
            .collect();
        assert_eq!(keys, vec!["leaf", "y"]);
    }

    #[test]
    fn test_builder_error_is_wrapped() {
        let broken = Builder::new("broken", |_, _| Err("no data".into()));
        let call = BuilderCall::new(&broken, None);

        let mut cells = Vec::new();
        let pending = Arc::new(Mutex::new(PendingWork::default()));
        let contexts = ContextProvider::new();
        let mut cx = Cx::new(InstanceId(1), call.name(), &mut cells, &pending, &contexts);

        let err = call.expand(&mut cx).unwrap_err();
        assert!(matches!(err, EngineError::Builder { ref name, .. } if name == "broken"));
        assert_eq!(err.to_string(), "builder `broken` failed: no data");
    }

    #[test]
    fn test_state_is_identity() {
        let value = Value::mapping([("count", 0)]);
        assert_eq!(state(value.clone()), value);
    }
}
