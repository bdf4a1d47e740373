//! Demo builders driven by the CLI commands.

use arbor_incremental::{from, state, Action, Builder, Mapping, Props, Value, KEY_PROP};

fn keyed(key: impl Into<Value>, extra: impl IntoIterator<Item = (&'static str, Value)>) -> Option<Props> {
    let mut props = Props::new();
    props.insert(KEY_PROP.to_string(), key.into());
    props.extend(extra.into_iter().map(|(name, value)| (name.to_string(), value)));
    Some(props)
}

/// `{ count, increment }`, starting from the `start` prop
pub fn counter() -> Builder {
    Builder::new("counter", |cx, props| {
        let start = props.get("start").and_then(Value::as_i64).unwrap_or(0);
        let (count, set_count) = cx.use_state(move || start);
        Ok(state(Value::mapping([
            ("count", Value::from(count)),
            (
                "increment",
                Value::Action(Action::new(move || set_count.update(|n| n + 1))),
            ),
        ])))
    })
}

/// One counter per key under `counters`
pub fn dashboard(keys: Vec<String>) -> Builder {
    let counter = counter();
    Builder::new("dashboard", move |_, _| {
        let counters: Mapping = keys
            .iter()
            .map(|key| (key.clone(), from(&counter, keyed(key.as_str(), []))))
            .collect();
        Ok(state(Value::mapping([("counters", Value::Mapping(counters))])))
    })
}

#[derive(Debug, Clone)]
struct TodoEntry {
    id: i64,
    title: String,
}

/// `{ title, done, toggle }`
pub fn todo_item() -> Builder {
    Builder::new("todo_item", |cx, props| {
        let title = props.get("title").cloned().unwrap_or_default();
        let (done, set_done) = cx.use_state(|| false);
        Ok(state(Value::mapping([
            ("title", title),
            ("done", Value::from(done)),
            ("toggle", Value::Action(Action::new(move || set_done.update(|d| !d)))),
        ])))
    })
}

/// `{ items, add(title), remove(index) }`; items are keyed by a stable id
pub fn todo_list() -> Builder {
    let item = todo_item();
    Builder::new("todo_list", move |cx, _| {
        let (entries, set_entries) = cx.use_state(Vec::<TodoEntry>::new);

        let items = entries
            .iter()
            .map(|entry| from(&item, keyed(entry.id, [("title", Value::from(entry.title.as_str()))])))
            .collect::<Vec<_>>();

        let add = {
            let set_entries = set_entries.clone();
            Action::with_args(move |args| {
                let Some(title) = args.first().and_then(Value::as_str).map(str::to_string) else {
                    return;
                };
                set_entries.update(move |entries| {
                    let id = entries.iter().map(|e| e.id).max().map_or(1, |max| max + 1);
                    let mut next = entries.clone();
                    next.push(TodoEntry { id, title });
                    next
                });
            })
        };
        let remove = Action::with_args(move |args| {
            let Some(index) = args.first().and_then(Value::as_i64) else {
                return;
            };
            set_entries.update(move |entries| {
                let mut next = entries.clone();
                if let Ok(index) = usize::try_from(index) {
                    if index < next.len() {
                        next.remove(index);
                    }
                }
                next
            });
        });

        Ok(state(Value::mapping([
            ("items", Value::Sequence(items)),
            ("add", Value::Action(add)),
            ("remove", Value::Action(remove)),
        ])))
    })
}
