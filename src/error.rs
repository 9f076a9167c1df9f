use thiserror::Error;

/// Malformed condition text or bindings.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("unrecognized input at offset {position}: {rest:?}")]
    Tokenize { position: usize, rest: String },

    #[error("numeric literal {text:?} is out of range")]
    InvalidNumber { text: String },

    #[error("unbalanced parentheses")]
    Unbalanced,

    #[error("unexpected token {token:?}")]
    UnexpectedToken { token: String },

    #[error("operator '{operator}' is missing an operand")]
    MissingOperand { operator: String },

    #[error("expression did not reduce to a single condition")]
    Incomplete,

    #[error("no binding supplied for placeholder #{index}")]
    MissingBinding { index: usize },

    #[error("binding for '{placeholder}' cannot be converted: {value}")]
    InvalidBinding { placeholder: String, value: String },
}

/// Failures raised while evaluating a condition.
#[derive(Debug, Error)]
pub enum EvalError {
    #[error("this \"{type_name}\" value has no attribute \"{key}\"")]
    UnknownKey { type_name: String, key: String },

    #[error("unknown literal type '{name}'")]
    UnknownType { name: String },

    #[error("cannot convert {text:?} to {type_name}: {reason}")]
    Coercion {
        type_name: String,
        text: String,
        reason: String,
    },

    #[error("comparison of {left} with {right} failed for '{op}'")]
    NotComparable {
        left: String,
        op: String,
        right: String,
    },

    #[error("invalid like pattern {pattern:?}: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("operator '{op}' has no negated form")]
    NegationUnsupported { op: String },

    /// A context failed while resolving an attribute for the condition.
    #[error(transparent)]
    Lookup(Box<RuleError>),
}

/// Errors surfaced by rule loading and attribute resolution.
#[derive(Debug, Error)]
pub enum RuleError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Eval(EvalError),

    #[error("cyclic lookup: {}", chain.join(" -> "))]
    Cycle { chain: Vec<String> },

    #[error("lookup of '{target}' exceeded the maximum depth of {limit}")]
    DepthExceeded { limit: usize, target: String },

    #[error("action for '{target}' failed: {message}")]
    Action { target: String, message: String },

    #[error("invalid rule model: {message}")]
    Model { message: String },
}

impl From<EvalError> for RuleError {
    fn from(err: EvalError) -> Self {
        match err {
            EvalError::Lookup(inner) => *inner,
            other => RuleError::Eval(other),
        }
    }
}

pub type Result<T, E = RuleError> = std::result::Result<T, E>;
