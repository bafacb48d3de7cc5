//! Scalars, entry shapes, and the load-time reconciliation merge.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::RegistryError;

/// A set or sequence member: an integer or a piece of text.
///
/// Serialized untagged so integers round-trip as JSON numbers and text as
/// JSON strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Int(i64),
    Text(String),
}

impl Scalar {
    /// Collapse text that parses as an integer into the integer itself, so
    /// `"1"` and `1` never coexist as distinct members.
    pub fn numericize(self) -> Scalar {
        match self {
            Scalar::Text(s) => match s.trim().parse::<i64>() {
                Ok(n) => Scalar::Int(n),
                Err(_) => Scalar::Text(s),
            },
            other => other,
        }
    }

    pub(crate) fn from_json(value: &Value) -> Result<Scalar, RegistryError> {
        match value {
            Value::String(s) => Ok(Scalar::Text(s.clone())),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Ok(Scalar::Int(i)),
                None => Ok(Scalar::Text(n.to_string())),
            },
            Value::Bool(b) => Ok(Scalar::Text(b.to_string())),
            other => Err(RegistryError::Validation(format!(
                "expected a scalar element, got {other}"
            ))),
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Int(n) => write!(f, "{n}"),
            Scalar::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<&Scalar> for Value {
    fn from(scalar: &Scalar) -> Self {
        match scalar {
            Scalar::Int(n) => Value::from(*n),
            Scalar::Text(s) => Value::String(s.clone()),
        }
    }
}

impl From<i64> for Scalar {
    fn from(n: i64) -> Self {
        Scalar::Int(n)
    }
}

impl From<&str> for Scalar {
    fn from(s: &str) -> Self {
        Scalar::Text(s.to_string())
    }
}

impl From<String> for Scalar {
    fn from(s: String) -> Self {
        Scalar::Text(s)
    }
}

/// The shape of an entry, fixed at registration time and never changed
/// afterwards.
#[derive(Debug, Clone, PartialEq)]
pub enum DataValue {
    Set(HashSet<Scalar>),
    Seq(Vec<Scalar>),
    Map(Map<String, Value>),
}

impl DataValue {
    pub fn empty_set() -> Self {
        DataValue::Set(HashSet::new())
    }

    pub fn empty_seq() -> Self {
        DataValue::Seq(Vec::new())
    }

    pub fn empty_map() -> Self {
        DataValue::Map(Map::new())
    }

    pub fn len(&self) -> usize {
        match self {
            DataValue::Set(s) => s.len(),
            DataValue::Seq(v) => v.len(),
            DataValue::Map(m) => m.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn kind(&self) -> &'static str {
        match self {
            DataValue::Set(_) => "set",
            DataValue::Seq(_) => "seq",
            DataValue::Map(_) => "map",
        }
    }

    /// JSON snapshot used by file saves. Sets become sorted lists so the
    /// written file is stable across runs.
    pub fn to_json(&self) -> Value {
        match self {
            DataValue::Set(s) => {
                let mut members: Vec<&Scalar> = s.iter().collect();
                members.sort();
                Value::Array(members.into_iter().map(Value::from).collect())
            }
            DataValue::Seq(v) => Value::Array(v.iter().map(Value::from).collect()),
            DataValue::Map(m) => Value::Object(m.clone()),
        }
    }

    /// Merge freshly loaded file data into this value. Loaded scalars are
    /// numericized first; sets union, sequences append, and loaded map keys
    /// override initial keys on conflict.
    pub fn reconcile(&mut self, loaded: &Value) -> Result<(), RegistryError> {
        match self {
            DataValue::Set(set) => {
                for scalar in scalars_from_json(loaded)? {
                    set.insert(scalar.numericize());
                }
                Ok(())
            }
            DataValue::Seq(seq) => {
                for scalar in scalars_from_json(loaded)? {
                    seq.push(scalar.numericize());
                }
                Ok(())
            }
            DataValue::Map(map) => {
                let loaded = loaded.as_object().ok_or_else(|| {
                    RegistryError::Validation(format!("expected an object, got {loaded}"))
                })?;
                for (key, value) in loaded {
                    map.insert(key.clone(), value.clone());
                }
                Ok(())
            }
        }
    }
}

/// Interpret a loaded JSON value as a list of scalar members.
pub(crate) fn scalars_from_json(value: &Value) -> Result<Vec<Scalar>, RegistryError> {
    let items = value.as_array().ok_or_else(|| {
        RegistryError::Validation(format!("expected a list of scalars, got {value}"))
    })?;
    items.iter().map(Scalar::from_json).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn numericize_collapses_integer_text() {
        assert_eq!(Scalar::from("1").numericize(), Scalar::Int(1));
        assert_eq!(Scalar::from(" 42 ").numericize(), Scalar::Int(42));
        assert_eq!(Scalar::from("abc").numericize(), Scalar::from("abc"));
        assert_eq!(Scalar::Int(7).numericize(), Scalar::Int(7));
    }

    #[test]
    fn set_reconcile_unions_without_representation_duplicates() {
        let mut value = DataValue::Set([Scalar::Int(1)].into_iter().collect());
        value.reconcile(&json!(["1", 2, "3"])).expect("reconcile");
        match &value {
            DataValue::Set(set) => {
                assert_eq!(set.len(), 3);
                assert!(set.contains(&Scalar::Int(1)));
                assert!(set.contains(&Scalar::Int(2)));
                assert!(set.contains(&Scalar::Int(3)));
            }
            other => panic!("unexpected shape: {}", other.kind()),
        }
    }

    #[test]
    fn seq_reconcile_appends_numericized() {
        let mut value = DataValue::Seq(vec![Scalar::from("keep")]);
        value.reconcile(&json!(["1", "two"])).expect("reconcile");
        assert_eq!(
            value,
            DataValue::Seq(vec![
                Scalar::from("keep"),
                Scalar::Int(1),
                Scalar::from("two"),
            ])
        );
    }

    #[test]
    fn map_reconcile_prefers_loaded_keys() {
        let mut value = DataValue::Map(
            [("a".to_string(), json!(1)), ("b".to_string(), json!(2))]
                .into_iter()
                .collect(),
        );
        value.reconcile(&json!({"a": 10, "c": 3})).expect("reconcile");
        match &value {
            DataValue::Map(map) => {
                assert_eq!(map["a"], json!(10));
                assert_eq!(map["b"], json!(2));
                assert_eq!(map["c"], json!(3));
            }
            other => panic!("unexpected shape: {}", other.kind()),
        }
    }

    #[test]
    fn set_snapshot_is_sorted() {
        let value = DataValue::Set(
            [Scalar::Int(3), Scalar::Int(1), Scalar::from("z")]
                .into_iter()
                .collect(),
        );
        assert_eq!(value.to_json(), json!([1, 3, "z"]));
    }

    #[test]
    fn shape_mismatch_is_rejected() {
        let mut value = DataValue::Set(HashSet::new());
        assert!(value.reconcile(&json!({"not": "a list"})).is_err());
    }
}
