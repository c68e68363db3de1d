//! Slash- and dot-path access into nested records.
//!
//! A [`Record`] is the unit of state threaded through a pipeline: an ordered,
//! string-keyed JSON object. Paths such as `/json/value` or `json.value` address
//! nested keys. While walking intermediate segments, a non-empty sequence is
//! transparently replaced by its first element.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::core::id::to_underscore_case;

/// Nested string-keyed mapping passed between pipeline steps.
pub type Record = Map<String, Value>;

/// Split a path into its non-empty segments.
///
/// Leading separators are ignored; `/` and `.` are interchangeable.
pub fn segments(path: &str) -> Vec<&str> {
    path.trim_start_matches(['/', '.'])
        .split(['/', '.'])
        .filter(|segment| !segment.is_empty())
        .collect()
}

/// Resolve `path` inside `value`.
///
/// A path with zero segments resolves to `value` itself. Returns `None` when an
/// intermediate value is absent or not an object, or when the terminal key is
/// absent. A present `null` resolves to `Some(Value::Null)`.
pub fn get<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let segs = segments(path);
    if segs.is_empty() {
        return Some(value);
    }
    match value {
        Value::Object(record) => resolve(record, &segs),
        _ => None,
    }
}

/// Like [`get`], returning `fallback` instead of `None`.
pub fn get_or<'a>(value: &'a Value, path: &str, fallback: &'a Value) -> &'a Value {
    get(value, path).unwrap_or(fallback)
}

/// Record-level lookup. Unlike [`get`], a zero-segment path resolves to nothing
/// because a record is not itself a field.
pub fn lookup<'a>(record: &'a Record, path: &str) -> Option<&'a Value> {
    let segs = segments(path);
    if segs.is_empty() {
        return None;
    }
    resolve(record, &segs)
}

fn resolve<'a>(record: &'a Record, segs: &[&str]) -> Option<&'a Value> {
    let (last, parents) = segs.split_last()?;
    let mut current = record;
    for segment in parents {
        let mut next = current.get(*segment)?;
        while let Value::Array(items) = next {
            match items.first() {
                Some(head) => next = head,
                None => break,
            }
        }
        match next {
            Value::Object(inner) => current = inner,
            _ => return None,
        }
    }
    current.get(*last)
}

/// Resolve `path`; when the result is a sequence return its head.
///
/// Empty sequences and absent values yield `fallback`. Any other value passes
/// through unchanged.
pub fn first<'a>(value: &'a Value, path: &str, fallback: &'a Value) -> &'a Value {
    match get(value, path) {
        None => fallback,
        Some(Value::Array(items)) => items.first().unwrap_or(fallback),
        Some(other) => other,
    }
}

/// Resolve `path` as a list: sequences as-is, scalars wrapped, absent is empty.
pub fn list(value: &Value, path: &str) -> Vec<Value> {
    match get(value, path) {
        None => Vec::new(),
        Some(Value::Array(items)) => items.clone(),
        Some(other) => vec![other.clone()],
    }
}

/// Assign `value` at `path`, creating intermediate objects as needed.
///
/// Intermediate values that are not objects are overwritten. A path with zero
/// segments is a silent no-op.
pub fn set(record: &mut Record, path: &str, value: Value) {
    let segs = segments(path);
    let Some((last, parents)) = segs.split_last() else {
        return;
    };
    let mut current = record;
    for segment in parents {
        let slot = current
            .entry((*segment).to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !slot.is_object() {
            *slot = Value::Object(Map::new());
        }
        let Value::Object(inner) = slot else {
            return;
        };
        current = inner;
    }
    current.insert((*last).to_string(), value);
}

/// Remove the key addressed by `path`.
///
/// Aborts without effect if any intermediate segment is missing or not an object.
pub fn delete(record: &mut Record, path: &str) {
    let segs = segments(path);
    let Some((last, parents)) = segs.split_last() else {
        return;
    };
    let mut current = record;
    for segment in parents {
        match current.get_mut(*segment) {
            Some(Value::Object(inner)) => current = inner,
            _ => return,
        }
    }
    current.shift_remove(*last);
}

/// Clone `record` and assign `value` at `path` on the copy.
pub fn with(record: &Record, path: &str, value: Value) -> Record {
    let mut out = record.clone();
    set(&mut out, path, value);
    out
}

/// Shallow merge: keys from `other` replace keys in `record`.
pub fn update(record: &Record, other: &Record) -> Record {
    let mut out = record.clone();
    for (key, value) in other {
        out.insert(key.clone(), value.clone());
    }
    out
}

/// True iff every top-level key of `subset` exists in `superset` with an equal value.
///
/// Values are compared with deep equality but only top-level keys are walked.
pub fn is_superset(superset: &Record, subset: &Record) -> bool {
    subset
        .iter()
        .all(|(key, value)| superset.get(key) == Some(value))
}

/// Inverse of [`is_superset`].
pub fn is_subset(subset: &Record, superset: &Record) -> bool {
    is_superset(superset, subset)
}

/// Compose records where the first record to define a key wins.
pub fn compose_shallow<'a, I>(records: I) -> Record
where
    I: IntoIterator<Item = &'a Record>,
{
    let mut out = Record::new();
    for record in records {
        for (key, value) in record {
            if !out.contains_key(key) {
                out.insert(key.clone(), value.clone());
            }
        }
    }
    out
}

/// Compose records recursively. Nested objects are merged; otherwise the first
/// non-null value wins.
pub fn compose_deep<'a, I>(records: I) -> Record
where
    I: IntoIterator<Item = &'a Record>,
{
    let mut out = Record::new();
    for record in records {
        for (key, incoming) in record {
            let merged = match (out.get(key), incoming) {
                (Some(Value::Object(existing)), Value::Object(nested)) => {
                    Some(Value::Object(compose_deep([existing, nested])))
                }
                (Some(Value::Null) | None, _) => Some(incoming.clone()),
                _ => None,
            };
            if let Some(value) = merged {
                out.insert(key.clone(), value);
            }
        }
    }
    out
}

type KeyFn<'a> = Box<dyn Fn(&str, &Value) -> Option<String> + 'a>;
type ValueFn<'a> = Box<dyn Fn(Value) -> Value + 'a>;
type FilterFn<'a> = Box<dyn Fn(&Value) -> bool + 'a>;

/// Recursive rewrite of keys and values.
///
/// Walking a value:
/// * objects go through `pre`, then every key through `key` (`None` or an
///   empty name drops the entry) and every child is transformed in turn;
/// * arrays transform each element;
/// * anything else goes through `value`.
///
/// Children of objects and arrays are kept only when `filter` accepts the
/// transformed child. `pre` also runs once on the root and `post` once on the
/// final result.
pub struct Transform<'a> {
    key: KeyFn<'a>,
    value: ValueFn<'a>,
    filter: FilterFn<'a>,
    pre: ValueFn<'a>,
    post: ValueFn<'a>,
}

impl Default for Transform<'_> {
    fn default() -> Self {
        Self {
            key: Box::new(|key, _| Some(key.to_string())),
            value: Box::new(|value| value),
            filter: Box::new(|_| true),
            pre: Box::new(|value| value),
            post: Box::new(|value| value),
        }
    }
}

impl<'a> Transform<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key(mut self, f: impl Fn(&str, &Value) -> Option<String> + 'a) -> Self {
        self.key = Box::new(f);
        self
    }

    pub fn value(mut self, f: impl Fn(Value) -> Value + 'a) -> Self {
        self.value = Box::new(f);
        self
    }

    pub fn filter(mut self, f: impl Fn(&Value) -> bool + 'a) -> Self {
        self.filter = Box::new(f);
        self
    }

    pub fn pre(mut self, f: impl Fn(Value) -> Value + 'a) -> Self {
        self.pre = Box::new(f);
        self
    }

    pub fn post(mut self, f: impl Fn(Value) -> Value + 'a) -> Self {
        self.post = Box::new(f);
        self
    }

    pub fn apply(&self, value: Value) -> Value {
        let root = (self.pre)(value);
        (self.post)(self.walk(root))
    }

    fn walk(&self, value: Value) -> Value {
        match value {
            Value::Array(items) => Value::Array(
                items
                    .into_iter()
                    .map(|item| self.walk(item))
                    .filter(|item| (self.filter)(item))
                    .collect(),
            ),
            Value::Object(_) => {
                let Value::Object(entries) = (self.pre)(value) else {
                    return Value::Null;
                };
                let mut out = Map::new();
                for (key, child) in entries {
                    let Some(renamed) = (self.key)(&key, &child).filter(|k| !k.is_empty()) else {
                        continue;
                    };
                    let child = self.walk(child);
                    if (self.filter)(&child) {
                        out.insert(renamed, child);
                    }
                }
                Value::Object(out)
            }
            other => (self.value)(other),
        }
    }
}

/// Plain JSON for any serializable value. Non-finite floats become `null`.
pub fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<Value, serde_json::Error> {
    serde_json::to_value(value)
}

/// Recursively drop `null` values from objects and arrays.
pub fn denull(value: &Value) -> Value {
    Transform::new()
        .filter(|value| !value.is_null())
        .apply(value.clone())
}

/// Rename the top-level keys of every object in `value` to `underscore_case`.
///
/// Keys that cannot be split into identifier parts are kept as-is.
pub fn underscore_keys(value: &Value) -> Value {
    match value {
        Value::Array(items) => Value::Array(items.iter().map(underscore_keys).collect()),
        Value::Object(record) => Value::Object(
            record
                .iter()
                .map(|(key, v)| {
                    let renamed = to_underscore_case(key, true).unwrap_or_else(|_| key.clone());
                    (renamed, v.clone())
                })
                .collect(),
        ),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn segments_strip_leading_separators_and_empties() {
        assert_eq!(segments("/a//b.c"), vec!["a", "b", "c"]);
        assert_eq!(segments("..a"), vec!["a"]);
        assert!(segments("/./").is_empty());
    }

    #[test]
    fn get_with_zero_segments_returns_value_itself() {
        let value = json!({"a": 1});
        assert_eq!(get(&value, ""), Some(&value));
        assert_eq!(get(&value, "//"), Some(&value));
    }

    #[test]
    fn get_walks_nested_objects_with_either_separator() {
        let value = json!({"json": {"value": 7}});
        assert_eq!(get(&value, "/json/value"), Some(&json!(7)));
        assert_eq!(get(&value, "json.value"), Some(&json!(7)));
        assert_eq!(get(&value, "json/missing"), None);
        assert_eq!(get(&value, "missing/value"), None);
    }

    #[test]
    fn get_dereferences_first_element_of_intermediate_lists() {
        let value = json!({"items": [{"name": "first"}, {"name": "second"}]});
        assert_eq!(get(&value, "items/name"), Some(&json!("first")));

        let nested = json!({"items": [[{"name": "deep"}]]});
        assert_eq!(get(&nested, "items/name"), Some(&json!("deep")));
    }

    #[test]
    fn get_does_not_dereference_terminal_lists() {
        let value = json!({"items": [1, 2]});
        assert_eq!(get(&value, "items"), Some(&json!([1, 2])));
    }

    #[test]
    fn get_returns_none_through_scalars_and_empty_lists() {
        let value = json!({"a": 3, "b": []});
        assert_eq!(get(&value, "a/x"), None);
        assert_eq!(get(&value, "b/x"), None);
    }

    #[test]
    fn get_keeps_present_null() {
        let value = json!({"a": null});
        assert_eq!(get(&value, "a"), Some(&Value::Null));
        assert_eq!(get_or(&value, "b", &json!("fallback")), &json!("fallback"));
    }

    #[test]
    fn first_handles_lists_and_scalars() {
        let value = json!({"list": [4, 5], "empty": [], "scalar": "s"});
        let fallback = json!("fb");
        assert_eq!(first(&value, "list", &fallback), &json!(4));
        assert_eq!(first(&value, "empty", &fallback), &fallback);
        assert_eq!(first(&value, "scalar", &fallback), &json!("s"));
        assert_eq!(first(&value, "missing", &fallback), &fallback);
    }

    #[test]
    fn list_wraps_scalars() {
        let value = json!({"list": [1], "scalar": 2});
        assert_eq!(list(&value, "list"), vec![json!(1)]);
        assert_eq!(list(&value, "scalar"), vec![json!(2)]);
        assert!(list(&value, "missing").is_empty());
    }

    #[test]
    fn set_then_get_round_trips() {
        let mut rec = Record::new();
        set(&mut rec, "/a/b/c", json!(42));
        let value = Value::Object(rec);
        assert_eq!(get(&value, "a.b.c"), Some(&json!(42)));
    }

    #[test]
    fn set_overwrites_scalar_intermediates() {
        let mut rec = record(json!({"a": 5}));
        set(&mut rec, "a/b", json!(true));
        assert_eq!(Value::Object(rec), json!({"a": {"b": true}}));
    }

    #[test]
    fn set_with_empty_path_is_noop() {
        let mut rec = record(json!({"a": 1}));
        set(&mut rec, "/", json!(2));
        assert_eq!(Value::Object(rec), json!({"a": 1}));
    }

    #[test]
    fn delete_then_get_returns_fallback() {
        let mut rec = record(json!({"a": {"b": 1, "c": 2}}));
        delete(&mut rec, "a/b");
        let value = Value::Object(rec);
        let fallback = json!("gone");
        assert_eq!(get_or(&value, "a/b", &fallback), &fallback);
        assert_eq!(get(&value, "a/c"), Some(&json!(2)));
    }

    #[test]
    fn delete_aborts_on_non_object_intermediate() {
        let mut rec = record(json!({"a": 1}));
        delete(&mut rec, "a/b");
        assert_eq!(Value::Object(rec), json!({"a": 1}));
    }

    #[test]
    fn superset_compares_top_level_keys_deeply() {
        let big = record(json!({"a": 1, "b": {"c": [1, 2]}, "d": "x"}));
        let small = record(json!({"a": 1, "b": {"c": [1, 2]}}));
        let other = record(json!({"b": {"c": [2]}}));
        assert!(is_superset(&big, &small));
        assert!(is_subset(&small, &big));
        assert!(!is_superset(&big, &other));
    }

    #[test]
    fn compose_shallow_keeps_first_definition() {
        let a = record(json!({"a": 1}));
        let b = record(json!({"a": 2, "b": 3}));
        assert_eq!(Value::Object(compose_shallow([&a, &b])), json!({"a": 1, "b": 3}));
    }

    #[test]
    fn compose_deep_merges_nested_objects_and_fills_nulls() {
        let a = record(json!({"n": {"x": 1}, "z": null}));
        let b = record(json!({"n": {"x": 2, "y": 3}, "z": 4}));
        assert_eq!(
            Value::Object(compose_deep([&a, &b])),
            json!({"n": {"x": 1, "y": 3}, "z": 4})
        );
    }

    #[test]
    fn denull_drops_nested_nulls() {
        let value = json!({"a": null, "b": [1, null, {"c": null, "d": 2}]});
        assert_eq!(denull(&value), json!({"b": [1, {"d": 2}]}));
    }

    #[test]
    fn underscore_keys_renames_top_level_keys() {
        let value = json!([{"CamelCase": 1, "dash-case": {"InnerKey": 2}}]);
        assert_eq!(
            underscore_keys(&value),
            json!([{"camel_case": 1, "dash_case": {"InnerKey": 2}}])
        );
    }

    #[test]
    fn transform_rewrites_keys_and_leaves() {
        let value = json!({
            "Keep": 1,
            "drop": 2,
            "Nested": {"Inner": "x", "empty": null},
            "List": [1, null, {"Deep": 3}],
        });
        let out = Transform::new()
            .key(|key, _| (key != "drop").then(|| key.to_lowercase()))
            .value(|leaf| match leaf {
                Value::Number(n) => json!(n.as_i64().unwrap_or_default() * 10),
                other => other,
            })
            .filter(|child| !child.is_null())
            .apply(value);
        assert_eq!(
            out,
            json!({
                "keep": 10,
                "nested": {"inner": "x"},
                "list": [10, {"deep": 30}],
            })
        );
    }

    #[test]
    fn transform_runs_pre_on_every_object_and_post_once() {
        let tagged = Transform::new()
            .pre(|value| match value {
                Value::Object(mut entries) => {
                    entries.insert("seen".to_string(), json!(true));
                    Value::Object(entries)
                }
                other => other,
            })
            .post(|value| json!({"wrapped": value}))
            .apply(json!({"a": {"b": 1}}));
        assert_eq!(
            tagged,
            json!({"wrapped": {"a": {"b": 1, "seen": true}, "seen": true}})
        );

        let scalar = Transform::new().value(|_| json!("leaf")).apply(json!(3));
        assert_eq!(scalar, json!("leaf"));
    }

    #[test]
    fn to_json_scrubs_serializable_values() {
        #[derive(serde::Serialize)]
        struct Reading {
            name: &'static str,
            level: f64,
            note: Option<String>,
        }

        let reading = Reading {
            name: "tank",
            level: f64::NAN,
            note: None,
        };
        assert_eq!(
            to_json(&reading).expect("json"),
            json!({"name": "tank", "level": null, "note": null})
        );
        assert_eq!(to_json(&[1, 2]).expect("json"), json!([1, 2]));
    }
}
