use std::{
    cmp::Ordering,
    collections::{BTreeMap, HashMap},
    fmt,
    sync::Arc,
};

use once_cell::sync::Lazy;
use parking_lot::RwLock;

use crate::error::EvalError;

/// Named-attribute access used to resolve key-paths.
///
/// Returning `Ok(None)` means the value has no such attribute, which the
/// evaluator reports as [`EvalError::UnknownKey`].
pub trait KeyValueCoding {
    fn type_name(&self) -> &str;

    fn value_for_key(&self, key: &str) -> Result<Option<Value>, EvalError>;

    /// Text used when the value is rendered into a typed literal.
    fn describe(&self) -> String {
        self.type_name().to_string()
    }
}

/// Dynamically typed facts, rule results and bindings.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
    Object(Arc<dyn KeyValueCoding + Send + Sync>),
}

impl Value {
    pub fn object(obj: impl KeyValueCoding + Send + Sync + 'static) -> Self {
        Self::Object(Arc::new(obj))
    }

    /// Build a map value from `(key, value)` pairs.
    pub fn map<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        Self::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub const fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(v) => Some(v),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &str {
        match self {
            Self::Null => "Null",
            Self::Bool(_) => "Bool",
            Self::Int(_) => "Integer",
            Self::Float(_) => "Float",
            Self::String(_) => "String",
            Self::List(_) => "List",
            Self::Map(_) => "Map",
            Self::Object(obj) => obj.type_name(),
        }
    }

    /// Ordering between numbers (mixed integer/float allowed) or between
    /// strings. Anything else has no ordering.
    pub fn try_cmp(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => Some(a.cmp(b)),
            (Self::Float(a), Self::Float(b)) => a.partial_cmp(b),
            (Self::Int(a), Self::Float(b)) => (*a as f64).partial_cmp(b),
            (Self::Float(a), Self::Int(b)) => a.partial_cmp(&(*b as f64)),
            (Self::String(a), Self::String(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b,
            (Self::Int(a), Self::Float(b)) | (Self::Float(b), Self::Int(a)) => *a as f64 == *b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::List(a), Self::List(b)) => a == b,
            (Self::Map(a), Self::Map(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => {
                std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
            }
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "Null"),
            Self::Bool(v) => write!(f, "Bool({v})"),
            Self::Int(v) => write!(f, "Int({v})"),
            Self::Float(v) => write!(f, "Float({v:?})"),
            Self::String(v) => write!(f, "String({v:?})"),
            Self::List(v) => f.debug_list().entries(v).finish(),
            Self::Map(v) => f.debug_map().entries(v).finish(),
            Self::Object(obj) => write!(f, "Object({})", obj.describe()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => f.write_str(&format_float(*v)),
            Self::String(v) => f.write_str(v),
            Self::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Self::Map(entries) => {
                f.write_str("{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                f.write_str("}")
            }
            Self::Object(obj) => f.write_str(&obj.describe()),
        }
    }
}

impl KeyValueCoding for Value {
    fn type_name(&self) -> &str {
        Value::type_name(self)
    }

    fn value_for_key(&self, key: &str) -> Result<Option<Value>, EvalError> {
        match self {
            Self::Map(entries) => Ok(entries.get(key).cloned()),
            Self::Object(obj) => obj.value_for_key(key),
            _ => Ok(None),
        }
    }

    fn describe(&self) -> String {
        self.to_string()
    }
}

/// Plain decimal with at least one fractional digit, never an exponent, so
/// finite floats re-tokenize as floats.
pub(crate) fn format_float(v: f64) -> String {
    let mut text = v.to_string();
    if v.is_finite() && !text.contains('.') {
        text.push_str(".0");
    }
    text
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Self::List(v)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(v: BTreeMap<String, Value>) -> Self {
        Self::Map(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => n.as_f64().map_or(Self::Null, Self::Float),
            },
            serde_json::Value::String(s) => Self::String(s),
            serde_json::Value::Array(items) => {
                Self::List(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(entries) => Self::Map(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, Value::from(v)))
                    .collect(),
            ),
        }
    }
}

// --- Typed literal constructors ----------------------------------------------

pub type Constructor = Arc<dyn Fn(&str) -> Result<Value, String> + Send + Sync>;

static CONSTRUCTORS: Lazy<RwLock<HashMap<String, Constructor>>> = Lazy::new(|| {
    let mut map: HashMap<String, Constructor> = HashMap::new();
    map.insert("String".into(), Arc::new(|s: &str| Ok(Value::String(s.to_string()))));
    map.insert(
        "Integer".into(),
        Arc::new(|s: &str| s.trim().parse::<i64>().map(Value::Int).map_err(|e| e.to_string())),
    );
    map.insert(
        "Float".into(),
        Arc::new(|s: &str| s.trim().parse::<f64>().map(Value::Float).map_err(|e| e.to_string())),
    );
    map.insert(
        "Bool".into(),
        Arc::new(|s: &str| match s.trim() {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            other => Err(format!("expected true or false, got {other:?}")),
        }),
    );
    RwLock::new(map)
});

/// Register the string constructor used for `(Name)'text'` literals.
/// Re-registering a name replaces the previous constructor.
pub fn register_type<F>(name: &str, ctor: F)
where
    F: Fn(&str) -> Result<Value, String> + Send + Sync + 'static,
{
    CONSTRUCTORS.write().insert(name.to_string(), Arc::new(ctor));
}

pub(crate) fn construct(type_name: &str, text: &str) -> Result<Value, EvalError> {
    let ctor = CONSTRUCTORS
        .read()
        .get(type_name)
        .cloned()
        .ok_or_else(|| EvalError::UnknownType {
            name: type_name.to_string(),
        })?;

    ctor(text).map_err(|reason| EvalError::Coercion {
        type_name: type_name.to_string(),
        text: text.to_string(),
        reason,
    })
}
