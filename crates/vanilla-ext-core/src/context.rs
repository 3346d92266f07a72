//! Render context values.
//!
//! Forms and formsets describe themselves as a tree of [`ContextValue`]s.
//! Views collect those trees into a [`Context`] and hand it to whatever
//! template renderer the application configured. Conversions to and from
//! `serde_json::Value` let renderers that speak JSON consume the same data.

use std::collections::HashMap;

/// A dynamic value in a render context.
#[derive(Debug, Clone, PartialEq)]
pub enum ContextValue {
    /// A string value, escaped by renderers that escape.
    String(String),
    /// A 64-bit integer.
    Integer(i64),
    /// A 64-bit floating point number.
    Float(f64),
    /// A boolean value.
    Bool(bool),
    /// An ordered list of values.
    List(Vec<ContextValue>),
    /// A key-value mapping.
    Dict(HashMap<String, ContextValue>),
    /// The absence of a value.
    None,
    /// A string marked as safe; renderers will not escape it.
    SafeString(String),
}

impl ContextValue {
    /// Returns `true` if this value is truthy in template logic.
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::String(s) | Self::SafeString(s) => !s.is_empty(),
            Self::Integer(i) => *i != 0,
            Self::Float(f) => *f != 0.0,
            Self::Bool(b) => *b,
            Self::List(items) => !items.is_empty(),
            Self::Dict(map) => !map.is_empty(),
            Self::None => false,
        }
    }

    /// Looks up a key when this value is a dictionary.
    pub fn get(&self, key: &str) -> Option<&Self> {
        match self {
            Self::Dict(map) => map.get(key),
            _ => None,
        }
    }

    /// Returns the items when this value is a list.
    pub fn as_list(&self) -> Option<&[Self]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// Converts this value into its JSON representation.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::String(s) | Self::SafeString(s) => serde_json::Value::String(s.clone()),
            Self::Integer(i) => serde_json::json!(i),
            Self::Float(f) => serde_json::json!(f),
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::None => serde_json::Value::Null,
            Self::List(items) => serde_json::Value::Array(items.iter().map(Self::to_json).collect()),
            Self::Dict(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }
}

impl From<serde_json::Value> for ContextValue {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Self::None,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Self::Integer(i)
                } else if let Some(f) = n.as_f64() {
                    Self::Float(f)
                } else {
                    Self::None
                }
            }
            serde_json::Value::String(s) => Self::String(s),
            serde_json::Value::Array(arr) => Self::List(arr.into_iter().map(Self::from).collect()),
            serde_json::Value::Object(map) => {
                Self::Dict(map.into_iter().map(|(k, v)| (k, Self::from(v))).collect())
            }
        }
    }
}

impl From<&str> for ContextValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for ContextValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<bool> for ContextValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for ContextValue {
    fn from(i: i64) -> Self {
        Self::Integer(i)
    }
}

impl From<usize> for ContextValue {
    fn from(n: usize) -> Self {
        Self::Integer(i64::try_from(n).unwrap_or(i64::MAX))
    }
}

/// The flat mapping of names to values handed to a template renderer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Context {
    values: HashMap<String, ContextValue>,
}

impl Context {
    /// Creates an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a variable, replacing any previous value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<ContextValue>) {
        self.values.insert(key.into(), value.into());
    }

    /// Returns the value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&ContextValue> {
        self.values.get(key)
    }

    /// Returns `true` if `key` is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Copies every entry of `other` into this context.
    pub fn update(&mut self, other: HashMap<String, ContextValue>) {
        self.values.extend(other);
    }

    /// Returns the sorted list of variable names.
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.values.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }

    /// Returns the number of variables.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if there are no variables.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Serializes the context as a JSON object.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.values
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truthiness() {
        assert!(!ContextValue::None.is_truthy());
        assert!(!ContextValue::String(String::new()).is_truthy());
        assert!(ContextValue::Integer(3).is_truthy());
        assert!(!ContextValue::List(vec![]).is_truthy());
        assert!(ContextValue::Bool(true).is_truthy());
    }

    #[test]
    fn test_json_conversion() {
        let json = serde_json::json!({"rows": [1, 2.5, "x", null, true]});
        let value = ContextValue::from(json.clone());
        assert_eq!(value.to_json(), json);
        let rows = value.get("rows").and_then(ContextValue::as_list).unwrap();
        assert_eq!(rows[0], ContextValue::Integer(1));
        assert_eq!(rows[3], ContextValue::None);
    }

    #[test]
    fn test_safe_string_serializes_as_string() {
        let value = ContextValue::SafeString("<b>ok</b>".into());
        assert_eq!(value.to_json(), serde_json::json!("<b>ok</b>"));
    }

    #[test]
    fn test_context_set_and_keys() {
        let mut ctx = Context::new();
        ctx.set("form", ContextValue::Dict(HashMap::new()));
        ctx.set("inlines", ContextValue::List(vec![]));
        assert_eq!(ctx.keys(), vec!["form", "inlines"]);
        assert_eq!(ctx.len(), 2);
        assert!(ctx.contains_key("form"));
        assert_eq!(ctx.to_json()["inlines"], serde_json::json!([]));
    }
}
