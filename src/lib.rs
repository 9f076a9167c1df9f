//! Prioritized condition/value rules resolved against a memoizing context.
//!
//! Conditions are written in a small qualifier language
//! (`"(lang = 'fr') AND (NOT (age < 18))"`), parsed once into shared
//! [`Qualifier`] trees and evaluated against anything implementing
//! [`KeyValueCoding`]. An [`Engine`] indexes [`Rule`]s by target attribute and
//! priority; a [`Context`] answers attribute reads from its facts or, failing
//! that, by asking the engine.

pub mod context;
pub mod engine;
pub mod error;
pub mod model;
pub mod qualifier;
pub mod rule;
pub mod value;

pub use context::Context;
pub use engine::{Engine, EngineBuilder, EngineConfig};
pub use error::{EvalError, ParseError, Result, RuleError};
pub use model::{ActionTable, Model, RuleRecord};
pub use qualifier::{
    KeyComparisonQualifier,
    KeyValueQualifier,
    Literal,
    LiteralComparisonQualifier,
    Operator,
    Qualifier,
    evaluate::{compare, resolve_keypath},
    parse::expand,
};
pub use rule::{Action, Rule};
pub use value::{KeyValueCoding, Value, register_type};
