// value.rs
// Owned scalar values with a total order
//
// `ScalarValue` is the exchange currency between the document layer and
// everything that needs detached scalars: storage parameters, index keys,
// aggregate results. The ordering matches document `compare`: type classes
// first (null < bool < numeric < string), numerics compared numerically
// across representations.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::types::LogicalType;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ScalarValue {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Int128(i128),
    Float(f64),
    String(String),
}

impl ScalarValue {
    pub fn logical_type(&self) -> LogicalType {
        match self {
            ScalarValue::Null => LogicalType::Na,
            ScalarValue::Bool(_) => LogicalType::Boolean,
            ScalarValue::Int(v) => LogicalType::narrowest_signed(*v),
            ScalarValue::UInt(v) => LogicalType::narrowest_unsigned(*v),
            ScalarValue::Int128(_) => LogicalType::HugeInt,
            ScalarValue::Float(_) => LogicalType::Double,
            ScalarValue::String(_) => LogicalType::StringLiteral,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, ScalarValue::Null)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            ScalarValue::Int(_) | ScalarValue::UInt(_) | ScalarValue::Int128(_) | ScalarValue::Float(_)
        )
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ScalarValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ScalarValue::Int(v) => Some(*v),
            ScalarValue::UInt(v) => i64::try_from(*v).ok(),
            ScalarValue::Int128(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            ScalarValue::UInt(v) => Some(*v),
            ScalarValue::Int(v) => u64::try_from(*v).ok(),
            ScalarValue::Int128(v) => u64::try_from(*v).ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ScalarValue::Float(v) => Some(*v),
            ScalarValue::Int(v) => Some(*v as f64),
            ScalarValue::UInt(v) => Some(*v as f64),
            ScalarValue::Int128(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ScalarValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Build from a parsed JSON scalar. Containers map to `None`.
    pub fn from_json(value: &serde_json::Value) -> Option<ScalarValue> {
        match value {
            serde_json::Value::Null => Some(ScalarValue::Null),
            serde_json::Value::Bool(b) => Some(ScalarValue::Bool(*b)),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(ScalarValue::Int(i))
                } else if let Some(u) = n.as_u64() {
                    Some(ScalarValue::UInt(u))
                } else {
                    n.as_f64().map(ScalarValue::Float)
                }
            }
            serde_json::Value::String(s) => Some(ScalarValue::String(s.clone())),
            _ => None,
        }
    }

    fn class_rank(&self) -> u8 {
        match self {
            ScalarValue::Null => 0,
            ScalarValue::Bool(_) => 1,
            ScalarValue::Int(_) | ScalarValue::UInt(_) | ScalarValue::Int128(_) | ScalarValue::Float(_) => 2,
            ScalarValue::String(_) => 3,
        }
    }

    fn numeric_cmp(&self, other: &ScalarValue) -> Ordering {
        use ScalarValue::*;
        match (self, other) {
            (Int(a), Int(b)) => a.cmp(b),
            (UInt(a), UInt(b)) => a.cmp(b),
            (Int128(a), Int128(b)) => a.cmp(b),
            (Int(a), UInt(b)) => i128::from(*a).cmp(&i128::from(*b)),
            (UInt(a), Int(b)) => i128::from(*a).cmp(&i128::from(*b)),
            (Int(a), Int128(b)) => i128::from(*a).cmp(b),
            (Int128(a), Int(b)) => a.cmp(&i128::from(*b)),
            (UInt(a), Int128(b)) => i128::from(*a).cmp(b),
            (Int128(a), UInt(b)) => a.cmp(&i128::from(*b)),
            (a, b) => {
                // at least one float: compare as f64, NaN sorts last
                let fa = a.as_f64().unwrap_or(f64::NAN);
                let fb = b.as_f64().unwrap_or(f64::NAN);
                float_total_cmp(fa, fb)
            }
        }
    }
}

fn float_total_cmp(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
    }
}

impl Ord for ScalarValue {
    fn cmp(&self, other: &Self) -> Ordering {
        let rank = self.class_rank().cmp(&other.class_rank());
        if rank != Ordering::Equal {
            return rank;
        }
        match (self, other) {
            (ScalarValue::Null, ScalarValue::Null) => Ordering::Equal,
            (ScalarValue::Bool(a), ScalarValue::Bool(b)) => a.cmp(b),
            (ScalarValue::String(a), ScalarValue::String(b)) => a.cmp(b),
            (a, b) => a.numeric_cmp(b),
        }
    }
}

impl PartialOrd for ScalarValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for ScalarValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ScalarValue {}

impl std::fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScalarValue::Null => f.write_str("null"),
            ScalarValue::Bool(b) => write!(f, "{}", b),
            ScalarValue::Int(v) => write!(f, "{}", v),
            ScalarValue::UInt(v) => write!(f, "{}", v),
            ScalarValue::Int128(v) => write!(f, "{}", v),
            ScalarValue::Float(v) => write!(f, "{}", v),
            ScalarValue::String(s) => write!(f, "{}", s),
        }
    }
}

impl From<bool> for ScalarValue {
    fn from(v: bool) -> Self {
        ScalarValue::Bool(v)
    }
}

impl From<i64> for ScalarValue {
    fn from(v: i64) -> Self {
        ScalarValue::Int(v)
    }
}

impl From<u64> for ScalarValue {
    fn from(v: u64) -> Self {
        ScalarValue::UInt(v)
    }
}

impl From<f64> for ScalarValue {
    fn from(v: f64) -> Self {
        ScalarValue::Float(v)
    }
}

impl From<&str> for ScalarValue {
    fn from(v: &str) -> Self {
        ScalarValue::String(v.to_string())
    }
}

impl From<String> for ScalarValue {
    fn from(v: String) -> Self {
        ScalarValue::String(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_order() {
        assert!(ScalarValue::Null < ScalarValue::Bool(false));
        assert!(ScalarValue::Bool(true) < ScalarValue::Int(0));
        assert!(ScalarValue::Int(i64::MAX) < ScalarValue::String(String::new()));
    }

    #[test]
    fn test_mixed_numeric_compare() {
        assert_eq!(ScalarValue::Int(5), ScalarValue::UInt(5));
        assert_eq!(ScalarValue::Int(5), ScalarValue::Float(5.0));
        assert!(ScalarValue::Int(-1) < ScalarValue::UInt(0));
        assert!(ScalarValue::Float(2.5) < ScalarValue::Int(3));
        assert!(ScalarValue::Int128(i128::from(u64::MAX) + 1) > ScalarValue::UInt(u64::MAX));
    }

    #[test]
    fn test_nan_sorts_last_among_numerics() {
        assert!(ScalarValue::Float(f64::NAN) > ScalarValue::Float(f64::MAX));
        assert_eq!(ScalarValue::Float(f64::NAN), ScalarValue::Float(f64::NAN));
    }

    #[test]
    fn test_from_json_scalars() {
        assert_eq!(
            ScalarValue::from_json(&serde_json::json!(42)),
            Some(ScalarValue::Int(42))
        );
        assert_eq!(
            ScalarValue::from_json(&serde_json::json!("x")),
            Some(ScalarValue::String("x".into()))
        );
        assert_eq!(ScalarValue::from_json(&serde_json::json!([1])), None);
    }

    #[test]
    fn test_string_order() {
        assert!(ScalarValue::from("abc") < ScalarValue::from("abd"));
    }
}
