use std::{
    collections::{BTreeSet, HashMap},
    fmt,
    sync::Arc,
};

use once_cell::sync::Lazy;
use parking_lot::Mutex;

use crate::{
    error::EvalError,
    value::{KeyValueCoding, Value, construct, format_float},
};

pub mod evaluate;
pub mod operator;
pub mod parse;

pub use operator::Operator;

/// Right-hand side of a key/value comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    String(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    Null,
    /// `(Name)'text'`, coerced through the registered `Name` constructor
    /// each time it is evaluated.
    Typed { type_name: String, text: String },
}

impl Literal {
    /// Literal form of a runtime value; values without a literal syntax
    /// become typed literals carrying their description.
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(*b),
            Value::Int(i) => Self::Integer(*i),
            Value::Float(f) => Self::Float(*f),
            Value::String(s) => Self::String(s.clone()),
            other => Self::Typed {
                type_name: other.type_name().to_string(),
                text: other.describe(),
            },
        }
    }

    pub fn resolve(&self) -> Result<Value, EvalError> {
        match self {
            Self::String(s) => Ok(Value::String(s.clone())),
            Self::Integer(i) => Ok(Value::Int(*i)),
            Self::Float(f) => Ok(Value::Float(*f)),
            Self::Bool(b) => Ok(Value::Bool(*b)),
            Self::Null => Ok(Value::Null),
            Self::Typed { type_name, text } => construct(type_name, text),
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => write!(f, "'{}'", escape(s)),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Float(v) => f.write_str(&format_float(*v)),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Null => f.write_str("nil"),
            Self::Typed { type_name, text } => write!(f, "({type_name})'{}'", escape(text)),
        }
    }
}

impl From<&Value> for Literal {
    fn from(value: &Value) -> Self {
        Self::from_value(value)
    }
}

pub(crate) fn escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace('\'', "\\'")
}

#[derive(Debug, Clone, PartialEq)]
pub struct KeyValueQualifier {
    pub key: String,
    pub op: Operator,
    pub value: Literal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct KeyComparisonQualifier {
    pub left: String,
    pub op: Operator,
    pub right: String,
}

/// Comparison of two literals, such as `true = true`. Reads nothing from the
/// object it is evaluated against.
#[derive(Debug, Clone, PartialEq)]
pub struct LiteralComparisonQualifier {
    pub left: Literal,
    pub op: Operator,
    pub right: Literal,
}

/// Boolean condition tree.
///
/// Nodes are immutable and normally shared through the process-wide interner
/// (see [`Qualifier::intern`]), so two textually identical conditions are the
/// same `Arc`.
#[derive(Debug, Clone, PartialEq)]
pub enum Qualifier {
    KeyValue(KeyValueQualifier),
    KeyComparison(KeyComparisonQualifier),
    LiteralComparison(LiteralComparisonQualifier),
    And(Vec<Arc<Qualifier>>),
    Or(Vec<Arc<Qualifier>>),
    Not(Arc<Qualifier>),
}

// Cache: canonical string -> shared qualifier
static QUALIFIER_CACHE: Lazy<Mutex<HashMap<String, Arc<Qualifier>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

impl Qualifier {
    pub fn key_value(key: impl Into<String>, op: Operator, value: Literal) -> Self {
        Self::KeyValue(KeyValueQualifier {
            key: key.into(),
            op,
            value,
        })
    }

    pub fn key_comparison(left: impl Into<String>, op: Operator, right: impl Into<String>) -> Self {
        Self::KeyComparison(KeyComparisonQualifier {
            left: left.into(),
            op,
            right: right.into(),
        })
    }

    pub fn literal_comparison(left: Literal, op: Operator, right: Literal) -> Self {
        Self::LiteralComparison(LiteralComparisonQualifier { left, op, right })
    }

    /// `(true = true)`, which holds for every object.
    pub fn always() -> Arc<Qualifier> {
        Self::literal_comparison(Literal::Bool(true), Operator::Equal, Literal::Bool(true)).intern()
    }

    /// `(true = false)`, which holds for no object.
    pub fn never() -> Arc<Qualifier> {
        Self::literal_comparison(Literal::Bool(true), Operator::Equal, Literal::Bool(false))
            .intern()
    }

    /// Return the shared instance for this qualifier's canonical string,
    /// inserting `self` if the string has not been seen before.
    pub fn intern(self) -> Arc<Qualifier> {
        let key = self.to_string();
        let mut cache = QUALIFIER_CACHE.lock();
        if let Some(existing) = cache.get(&key) {
            log::trace!("qualifier cache hit: {key}");
            return existing.clone();
        }
        log::trace!("qualifier cache insert: {key}");
        let shared = Arc::new(self);
        cache.insert(key, shared.clone());
        shared
    }

    /// `And` of `key = value` comparisons, in the given order. A single pair
    /// is returned as its bare comparison and no pairs as [`Qualifier::always`].
    pub fn match_all<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Arc<Qualifier>
    where
        K: Into<String>,
        V: Into<Value>,
    {
        let mut terms = equality_terms(pairs);
        match terms.len() {
            0 => Self::always(),
            1 => terms.remove(0),
            _ => Self::And(terms).intern(),
        }
    }

    /// `Or` of `key = value` comparisons, in the given order. A single pair
    /// is returned as its bare comparison and no pairs as [`Qualifier::never`].
    pub fn match_any<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Arc<Qualifier>
    where
        K: Into<String>,
        V: Into<Value>,
    {
        let mut terms = equality_terms(pairs);
        match terms.len() {
            0 => Self::never(),
            1 => terms.remove(0),
            _ => Self::Or(terms).intern(),
        }
    }

    /// Items for which `qualifier` holds, in input order.
    pub fn filter<'a, T: KeyValueCoding>(
        items: &'a [T],
        qualifier: &Qualifier,
    ) -> Result<Vec<&'a T>, EvalError> {
        let mut kept = Vec::new();
        for item in items {
            if qualifier.evaluate(item)? {
                kept.push(item);
            }
        }
        Ok(kept)
    }

    pub fn size(&self) -> usize {
        match self {
            Self::KeyValue(_) | Self::KeyComparison(_) | Self::LiteralComparison(_) => 1,
            Self::And(terms) | Self::Or(terms) => 1 + terms.iter().map(|q| q.size()).sum::<usize>(),
            Self::Not(inner) => 1 + inner.size(),
        }
    }

    /// Every key-path referenced anywhere in the tree.
    pub fn qualifier_keys(&self) -> BTreeSet<String> {
        let mut keys = BTreeSet::new();
        self.walk(&mut |q| match q {
            Self::KeyValue(kv) => {
                keys.insert(kv.key.clone());
            }
            Self::KeyComparison(kc) => {
                keys.insert(kc.left.clone());
                keys.insert(kc.right.clone());
            }
            _ => {}
        });
        keys
    }

    /// Visit every node, children before their parent.
    pub fn walk<F: FnMut(&Qualifier)>(&self, visit: &mut F) {
        match self {
            Self::And(terms) | Self::Or(terms) => {
                for term in terms {
                    term.walk(visit);
                }
            }
            Self::Not(inner) => inner.walk(visit),
            Self::KeyValue(_) | Self::KeyComparison(_) | Self::LiteralComparison(_) => {}
        }
        visit(self);
    }

    /// Equivalent qualifier in which negation appears only as negated
    /// comparison operators.
    pub fn positive(self: &Arc<Self>) -> Result<Arc<Qualifier>, EvalError> {
        match self.as_ref() {
            Self::Not(inner) => inner.negated(),
            Self::And(terms) => Ok(Self::And(positive_terms(terms)?).intern()),
            Self::Or(terms) => Ok(Self::Or(positive_terms(terms)?).intern()),
            Self::KeyValue(_) | Self::KeyComparison(_) | Self::LiteralComparison(_) => {
                Ok(self.clone())
            }
        }
    }

    fn negated(self: &Arc<Self>) -> Result<Arc<Qualifier>, EvalError> {
        match self.as_ref() {
            Self::Not(inner) => inner.positive(),
            Self::And(terms) => Ok(Self::Or(negated_terms(terms)?).intern()),
            Self::Or(terms) => Ok(Self::And(negated_terms(terms)?).intern()),
            Self::KeyValue(kv) => {
                Ok(Self::key_value(kv.key.clone(), kv.op.negate()?, kv.value.clone()).intern())
            }
            Self::KeyComparison(kc) => Ok(Self::key_comparison(
                kc.left.clone(),
                kc.op.negate()?,
                kc.right.clone(),
            )
            .intern()),
            Self::LiteralComparison(lc) => Ok(Self::literal_comparison(
                lc.left.clone(),
                lc.op.negate()?,
                lc.right.clone(),
            )
            .intern()),
        }
    }
}

fn equality_terms<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Vec<Arc<Qualifier>>
where
    K: Into<String>,
    V: Into<Value>,
{
    pairs
        .into_iter()
        .map(|(k, v)| {
            let literal = Literal::from_value(&v.into());
            Qualifier::key_value(k, Operator::Equal, literal).intern()
        })
        .collect()
}

fn positive_terms(terms: &[Arc<Qualifier>]) -> Result<Vec<Arc<Qualifier>>, EvalError> {
    terms.iter().map(|q| q.positive()).collect()
}

fn negated_terms(terms: &[Arc<Qualifier>]) -> Result<Vec<Arc<Qualifier>>, EvalError> {
    terms.iter().map(|q| q.negated()).collect()
}

impl fmt::Display for Qualifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::KeyValue(kv) => write!(f, "({} {} {})", kv.key, kv.op, kv.value),
            Self::KeyComparison(kc) => write!(f, "({} {} {})", kc.left, kc.op, kc.right),
            Self::LiteralComparison(lc) => write!(f, "({} {} {})", lc.left, lc.op, lc.right),
            Self::And(terms) => write_joined(f, terms, " AND "),
            Self::Or(terms) => write_joined(f, terms, " OR "),
            Self::Not(inner) => write!(f, "(NOT {inner})"),
        }
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, terms: &[Arc<Qualifier>], sep: &str) -> fmt::Result {
    f.write_str("(")?;
    for (i, term) in terms.iter().enumerate() {
        if i > 0 {
            f.write_str(sep)?;
        }
        write!(f, "{term}")?;
    }
    f.write_str(")")
}
