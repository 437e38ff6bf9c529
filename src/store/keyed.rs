//! Ordered string-keyed store with assertion-checked reads.

use crate::errors::StoreError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Runtime type tag of a stored value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    Null,
    Bool,
    Integer,
    Float,
    String,
    List,
    Map,
}

impl ValueKind {
    /// Tag of a concrete value.
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(_) => Self::Bool,
            Value::Number(n) if n.is_i64() || n.is_u64() => Self::Integer,
            Value::Number(_) => Self::Float,
            Value::String(_) => Self::String,
            Value::Array(_) => Self::List,
            Value::Object(_) => Self::Map,
        }
    }
}

impl std::fmt::Display for ValueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValueKind::Null => write!(f, "null"),
            ValueKind::Bool => write!(f, "bool"),
            ValueKind::Integer => write!(f, "integer"),
            ValueKind::Float => write!(f, "float"),
            ValueKind::String => write!(f, "string"),
            ValueKind::List => write!(f, "list"),
            ValueKind::Map => write!(f, "map"),
        }
    }
}

impl std::str::FromStr for ValueKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "null" => Ok(ValueKind::Null),
            "bool" => Ok(ValueKind::Bool),
            "integer" | "int" => Ok(ValueKind::Integer),
            "float" => Ok(ValueKind::Float),
            "string" | "str" => Ok(ValueKind::String),
            "list" => Ok(ValueKind::List),
            "map" | "dict" => Ok(ValueKind::Map),
            _ => anyhow::bail!(
                "Invalid value kind '{}'. Valid values: null, bool, integer, float, string, list, map",
                s
            ),
        }
    }
}

/// Length of a value, if its kind has one.
pub fn value_len(value: &Value) -> Option<usize> {
    match value {
        Value::String(s) => Some(s.chars().count()),
        Value::Array(a) => Some(a.len()),
        Value::Object(o) => Some(o.len()),
        _ => None,
    }
}

/// Assertions applied by [`KeyedStore::get_with`].
#[derive(Debug, Clone)]
pub struct GetOptions {
    /// Returned when the key is absent
    pub default: Option<Value>,
    /// Accepted kinds; empty accepts anything
    pub assert_type: Vec<ValueKind>,
    /// Reject values of zero length
    pub assert_len: bool,
    /// Reject absent keys that have no default
    pub assert_in: bool,
}

impl Default for GetOptions {
    fn default() -> Self {
        Self {
            default: None,
            assert_type: Vec::new(),
            assert_len: false,
            assert_in: true,
        }
    }
}

impl GetOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn with_types(mut self, kinds: &[ValueKind]) -> Self {
        self.assert_type = kinds.to_vec();
        self
    }

    pub fn with_assert_len(mut self, assert_len: bool) -> Self {
        self.assert_len = assert_len;
        self
    }

    pub fn with_assert_in(mut self, assert_in: bool) -> Self {
        self.assert_in = assert_in;
        self
    }
}

/// Mapping from string key to an arbitrary serializable value.
///
/// Insertion order is preserved for iteration and persistence; consumers
/// should not attach meaning to it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyedStore {
    entries: Map<String, Value>,
}

impl KeyedStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a required key.
    pub fn get(&self, key: &str) -> Result<&Value, StoreError> {
        self.entries.get(key).ok_or_else(|| StoreError::KeyNotFound {
            key: key.to_string(),
        })
    }

    /// Read a key, applying the presence, type and length assertions in `opts`.
    ///
    /// Returns `Ok(None)` only when the key is absent, no default is given and
    /// `assert_in` is off. Assertions apply to the default as well.
    pub fn get_with<'a>(
        &'a self,
        key: &str,
        opts: &'a GetOptions,
    ) -> Result<Option<&'a Value>, StoreError> {
        let value = match self.entries.get(key).or(opts.default.as_ref()) {
            Some(v) => v,
            None if opts.assert_in => {
                return Err(StoreError::KeyNotFound {
                    key: key.to_string(),
                });
            }
            None => return Ok(None),
        };

        if !opts.assert_type.is_empty() {
            let found = ValueKind::of(value);
            if !opts.assert_type.contains(&found) {
                return Err(StoreError::TypeAssertion {
                    key: key.to_string(),
                    expected: opts.assert_type.clone(),
                    found,
                });
            }
        }

        if opts.assert_len {
            match value_len(value) {
                Some(0) => {
                    return Err(StoreError::LengthAssertion {
                        key: key.to_string(),
                    });
                }
                Some(_) => {}
                None => {
                    return Err(StoreError::Unsized {
                        key: key.to_string(),
                        kind: ValueKind::of(value),
                    });
                }
            }
        }

        Ok(Some(value))
    }

    /// Read a key that must hold one of `kinds`.
    pub fn get_typed(&self, key: &str, kinds: &[ValueKind]) -> Result<&Value, StoreError> {
        let value = self.get(key)?;
        let found = ValueKind::of(value);
        if kinds.contains(&found) {
            Ok(value)
        } else {
            Err(StoreError::TypeAssertion {
                key: key.to_string(),
                expected: kinds.to_vec(),
                found,
            })
        }
    }

    pub fn get_i64(&self, key: &str) -> Result<i64, StoreError> {
        let value = self.get_typed(key, &[ValueKind::Integer])?;
        value.as_i64().ok_or_else(|| StoreError::TypeAssertion {
            key: key.to_string(),
            expected: vec![ValueKind::Integer],
            found: ValueKind::of(value),
        })
    }

    pub fn get_str(&self, key: &str) -> Result<&str, StoreError> {
        match self.get_typed(key, &[ValueKind::String])? {
            Value::String(s) => Ok(s),
            other => Err(StoreError::TypeAssertion {
                key: key.to_string(),
                expected: vec![ValueKind::String],
                found: ValueKind::of(other),
            }),
        }
    }

    pub fn get_list(&self, key: &str) -> Result<&Vec<Value>, StoreError> {
        match self.get_typed(key, &[ValueKind::List])? {
            Value::Array(a) => Ok(a),
            other => Err(StoreError::TypeAssertion {
                key: key.to_string(),
                expected: vec![ValueKind::List],
                found: ValueKind::of(other),
            }),
        }
    }

    /// Store `value` under `key`, returning the value it replaced.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.entries.insert(key.into(), value.into())
    }

    /// Remove `key`, keeping the order of the remaining entries.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.entries.shift_remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl FromIterator<(String, Value)> for KeyedStore {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}
