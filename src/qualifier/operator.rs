use std::fmt;

use crate::error::EvalError;

/// Comparison operators usable in a condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Equal,          // =
    NotEqual,       // !=
    Greater,        // >
    GreaterOrEqual, // >=
    Less,           // <
    LessOrEqual,    // <=
    Like,           // like
    CiLike,         // cilike
}

impl Operator {
    /// Every spelling accepted by the tokenizer.
    pub const ALL_STRINGS: [&'static str; 9] =
        ["=", "==", "!=", "<", "<=", ">", ">=", "like", "cilike"];

    /// Spellings of the relational (negatable) operators.
    pub const RELATIONAL_STRINGS: [&'static str; 7] = ["=", "==", "!=", "<", "<=", ">", ">="];

    pub fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol.to_ascii_lowercase().as_str() {
            "=" | "==" => Some(Self::Equal),
            "!=" => Some(Self::NotEqual),
            ">" => Some(Self::Greater),
            ">=" => Some(Self::GreaterOrEqual),
            "<" => Some(Self::Less),
            "<=" => Some(Self::LessOrEqual),
            "like" => Some(Self::Like),
            "cilike" => Some(Self::CiLike),
            _ => None,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Equal => "=",
            Self::NotEqual => "!=",
            Self::Greater => ">",
            Self::GreaterOrEqual => ">=",
            Self::Less => "<",
            Self::LessOrEqual => "<=",
            Self::Like => "like",
            Self::CiLike => "cilike",
        }
    }

    pub const fn is_relational(self) -> bool {
        !matches!(self, Self::Like | Self::CiLike)
    }

    /// The operator that holds exactly when `self` does not.
    pub fn negate(self) -> Result<Self, EvalError> {
        match self {
            Self::Equal => Ok(Self::NotEqual),
            Self::NotEqual => Ok(Self::Equal),
            Self::Greater => Ok(Self::LessOrEqual),
            Self::LessOrEqual => Ok(Self::Greater),
            Self::GreaterOrEqual => Ok(Self::Less),
            Self::Less => Ok(Self::GreaterOrEqual),
            Self::Like | Self::CiLike => Err(EvalError::NegationUnsupported {
                op: self.as_str().to_string(),
            }),
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbols_map_to_operators() {
        let expected = [
            ("=", Operator::Equal),
            ("==", Operator::Equal),
            ("!=", Operator::NotEqual),
            (">", Operator::Greater),
            (">=", Operator::GreaterOrEqual),
            ("<", Operator::Less),
            ("<=", Operator::LessOrEqual),
            ("like", Operator::Like),
            ("CILIKE", Operator::CiLike),
        ];
        for (symbol, op) in expected {
            assert_eq!(Operator::from_symbol(symbol), Some(op));
        }
        assert_eq!(Operator::from_symbol("dummylike"), None);
    }

    #[test]
    fn every_accepted_spelling_parses() {
        for symbol in Operator::ALL_STRINGS {
            assert!(Operator::from_symbol(symbol).is_some());
        }
        for symbol in Operator::RELATIONAL_STRINGS {
            assert!(Operator::from_symbol(symbol).unwrap().is_relational());
        }
    }

    #[test]
    fn negation_is_an_involution_on_relational_operators() {
        for symbol in Operator::RELATIONAL_STRINGS {
            let op = Operator::from_symbol(symbol).unwrap();
            assert_eq!(op.negate().unwrap().negate().unwrap(), op);
        }
        assert_eq!(Operator::Greater.negate().unwrap(), Operator::LessOrEqual);
        assert_eq!(Operator::GreaterOrEqual.negate().unwrap(), Operator::Less);
    }

    #[test]
    fn like_has_no_negation() {
        assert!(matches!(
            Operator::Like.negate(),
            Err(EvalError::NegationUnsupported { .. })
        ));
        assert!(Operator::CiLike.negate().is_err());
    }
}
