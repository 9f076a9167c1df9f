use std::{cmp::Ordering, collections::HashMap};

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::{Regex, RegexBuilder};

use crate::{
    error::EvalError,
    qualifier::{
        KeyComparisonQualifier,
        KeyValueQualifier,
        LiteralComparisonQualifier,
        Operator,
        Qualifier,
    },
    value::{KeyValueCoding, Value},
};

/// Compiled patterns kept before the cache is emptied. Key comparisons take
/// their pattern from data, so the set of patterns is unbounded.
const PATTERN_CACHE_LIMIT: usize = 256;

// Cache: (like pattern, case-insensitive) -> compiled regex
static PATTERN_CACHE: Lazy<Mutex<HashMap<(String, bool), Regex>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

impl Qualifier {
    pub fn evaluate(&self, object: &dyn KeyValueCoding) -> Result<bool, EvalError> {
        match self {
            Self::KeyValue(kv) => kv.evaluate(object),
            Self::KeyComparison(kc) => kc.evaluate(object),
            Self::LiteralComparison(lc) => lc.evaluate(),
            Self::And(terms) => {
                for term in terms {
                    if !term.evaluate(object)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Self::Or(terms) => {
                for term in terms {
                    if term.evaluate(object)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Self::Not(inner) => Ok(!inner.evaluate(object)?),
        }
    }
}

impl KeyValueQualifier {
    /// Resolves `key` against `object`, fanning out over sequences met
    /// before the path is exhausted (every element must match).
    pub fn evaluate(&self, object: &dyn KeyValueCoding) -> Result<bool, EvalError> {
        let value = self.value.resolve()?;
        let path: Vec<&str> = self.key.split('.').collect();
        compare_with_keypath(object, &path, self.op, &value)
    }
}

impl KeyComparisonQualifier {
    pub fn evaluate(&self, object: &dyn KeyValueCoding) -> Result<bool, EvalError> {
        let left = resolve_keypath(object, &self.left)?;
        let right = resolve_keypath(object, &self.right)?;
        compare(&left, self.op, &right)
    }
}

impl LiteralComparisonQualifier {
    pub fn evaluate(&self) -> Result<bool, EvalError> {
        compare(&self.left.resolve()?, self.op, &self.right.resolve()?)
    }
}

fn compare_with_keypath(
    object: &dyn KeyValueCoding,
    path: &[&str],
    op: Operator,
    expected: &Value,
) -> Result<bool, EvalError> {
    let Some((segment, rest)) = path.split_first() else {
        return Ok(false);
    };

    let dest = value_for_segment(object, segment)?;
    if rest.is_empty() {
        return compare(&dest, op, expected);
    }

    match &dest {
        Value::List(items) => {
            for item in items {
                if !compare_with_keypath(item, rest, op, expected)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        other => compare_with_keypath(other, rest, op, expected),
    }
}

fn value_for_segment(object: &dyn KeyValueCoding, segment: &str) -> Result<Value, EvalError> {
    object
        .value_for_key(segment)?
        .ok_or_else(|| EvalError::UnknownKey {
            type_name: object.type_name().to_string(),
            key: segment.to_string(),
        })
}

/// Plain dotted-path traversal without fan-out.
pub fn resolve_keypath(object: &dyn KeyValueCoding, keypath: &str) -> Result<Value, EvalError> {
    let mut segments = keypath.split('.');
    let first = segments.next().unwrap_or_default();
    let mut current = value_for_segment(object, first)?;
    for segment in segments {
        current = value_for_segment(&current, segment)?;
    }
    Ok(current)
}

pub fn compare(left: &Value, op: Operator, right: &Value) -> Result<bool, EvalError> {
    match op {
        Operator::Equal => Ok(left == right),
        Operator::NotEqual => Ok(left != right),
        Operator::Greater => ordering(left, op, right).map(Ordering::is_gt),
        Operator::GreaterOrEqual => ordering(left, op, right).map(Ordering::is_ge),
        Operator::Less => ordering(left, op, right).map(Ordering::is_lt),
        Operator::LessOrEqual => ordering(left, op, right).map(Ordering::is_le),
        Operator::Like => like(left, right, false),
        Operator::CiLike => like(left, right, true),
    }
}

fn ordering(left: &Value, op: Operator, right: &Value) -> Result<Ordering, EvalError> {
    left.try_cmp(right).ok_or_else(|| EvalError::NotComparable {
        left: left.type_name().to_string(),
        op: op.to_string(),
        right: right.type_name().to_string(),
    })
}

/// Prefix match: the pattern is anchored at the start only.
fn like(left: &Value, pattern: &Value, case_insensitive: bool) -> Result<bool, EvalError> {
    let Value::String(pattern) = pattern else {
        return Err(EvalError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: format!("expected a String pattern, got {}", pattern.type_name()),
        });
    };
    let Value::String(text) = left else {
        return Ok(false);
    };

    Ok(compiled_pattern(pattern, case_insensitive)?.is_match(text))
}

fn compiled_pattern(pattern: &str, case_insensitive: bool) -> Result<Regex, EvalError> {
    let key = (pattern.to_string(), case_insensitive);
    if let Some(regex) = PATTERN_CACHE.lock().get(&key) {
        return Ok(regex.clone());
    }

    let mut source = String::from(r"\A");
    let mut buf = [0u8; 4];
    for c in pattern.chars() {
        match c {
            '*' => source.push_str(".*"),
            '?' => source.push('.'),
            other => source.push_str(&regex::escape(other.encode_utf8(&mut buf))),
        }
    }

    let regex = RegexBuilder::new(&source)
        .case_insensitive(case_insensitive)
        .dot_matches_new_line(true)
        .build()
        .map_err(|e| EvalError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;

    let mut cache = PATTERN_CACHE.lock();
    if cache.len() >= PATTERN_CACHE_LIMIT {
        log::debug!("pattern cache full, clearing {} entries", cache.len());
        cache.clear();
    }
    cache.insert(key, regex.clone());
    Ok(regex)
}
