// expr.rs
// Predicate expression trees
//
// A plan tree carries no literal values: compare leaves name a parameter
// id, and the side-band `Parameters` map supplies the scalars at execution
// time. This keeps translated plans cacheable.

use std::num::NonZeroUsize;
use std::sync::Mutex;

use lazy_static::lazy_static;
use lru::LruCache;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::document::Document;
use crate::statement::{ParamId, Parameters};
use crate::value::ScalarValue;

lazy_static! {
    /// Compiled-pattern cache for the `regex` compare kind.
    static ref REGEX_CACHE: Mutex<LruCache<String, Regex>> =
        Mutex::new(LruCache::new(NonZeroUsize::new(100).unwrap()));
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareKind {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
    Regex,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnionKind {
    And,
    Or,
    Not,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Expr {
    Compare {
        field: String,
        kind: CompareKind,
        param: ParamId,
    },
    Union {
        kind: UnionKind,
        children: Vec<Expr>,
    },
}

impl Expr {
    pub fn compare(kind: CompareKind, field: impl Into<String>, param: ParamId) -> Expr {
        Expr::Compare {
            field: field.into(),
            kind,
            param,
        }
    }

    pub fn eq(field: impl Into<String>, param: ParamId) -> Expr {
        Expr::compare(CompareKind::Eq, field, param)
    }

    pub fn union(kind: UnionKind, children: Vec<Expr>) -> Expr {
        Expr::Union { kind, children }
    }

    /// The single compare leaf, if this tree is exactly one comparison.
    /// Used by the translator to route a match to an index scan.
    pub fn as_single_compare(&self) -> Option<(&str, CompareKind, ParamId)> {
        match self {
            Expr::Compare { field, kind, param } => Some((field, *kind, *param)),
            Expr::Union { .. } => None,
        }
    }

    /// Evaluate against a document. A field that does not resolve to a
    /// scalar never matches; an unresolved parameter never matches.
    pub fn matches(&self, document: &Document, parameters: &Parameters) -> bool {
        match self {
            Expr::Compare { field, kind, param } => {
                let value = match parameters.get(*param) {
                    Some(value) => value,
                    None => return false,
                };
                compare_field(document, field, *kind, value)
            }
            Expr::Union { kind, children } => match kind {
                UnionKind::And => children.iter().all(|c| c.matches(document, parameters)),
                UnionKind::Or => children.iter().any(|c| c.matches(document, parameters)),
                UnionKind::Not => !children.iter().any(|c| c.matches(document, parameters)),
            },
        }
    }
}

/// Field names are stored without the leading slash in statements; accept
/// either spelling.
pub fn field_to_pointer(field: &str) -> String {
    if field.starts_with('/') {
        field.to_string()
    } else {
        format!("/{}", field)
    }
}

fn compare_field(document: &Document, field: &str, kind: CompareKind, value: &ScalarValue) -> bool {
    let pointer = field_to_pointer(field);
    if kind == CompareKind::Regex {
        let pattern = match value.as_str() {
            Some(p) => p,
            None => return false,
        };
        let stored = match document.get_string(&pointer) {
            Some(s) => s,
            None => return false,
        };
        return regex_is_match(pattern, &stored);
    }
    // null never satisfies a compare, on either side: indexes file only
    // non-null fields, and the scan path must agree with them
    if value.is_null() {
        return false;
    }
    let stored = match document.get_value(&pointer) {
        Some(stored) if !stored.is_null() => stored,
        _ => return false,
    };
    let ordering = stored.cmp(value);
    match kind {
        CompareKind::Eq => ordering.is_eq(),
        CompareKind::Ne => ordering.is_ne(),
        CompareKind::Lt => ordering.is_lt(),
        CompareKind::Lte => ordering.is_le(),
        CompareKind::Gt => ordering.is_gt(),
        CompareKind::Gte => ordering.is_ge(),
        CompareKind::Regex => unreachable!(),
    }
}

fn regex_is_match(pattern: &str, haystack: &str) -> bool {
    let mut cache = REGEX_CACHE.lock().unwrap();
    if let Some(regex) = cache.get(pattern) {
        return regex.is_match(haystack);
    }
    match Regex::new(pattern) {
        Ok(regex) => {
            let result = regex.is_match(haystack);
            cache.put(pattern.to_string(), regex);
            result
        }
        Err(_) => false,
    }
}
