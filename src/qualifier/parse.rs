use std::sync::Arc;

use nom::{
    IResult,
    Parser,
    branch::alt,
    bytes::complete::{tag, tag_no_case, take_while, take_while1},
    character::complete::{anychar, char, digit1, none_of, satisfy},
    combinator::{map, not, opt, recognize, value},
    multi::many0,
    sequence::{delimited, preceded, terminated},
};

use crate::{
    error::ParseError,
    qualifier::{Literal, Operator, Qualifier},
    value::{Value, format_float},
};

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Open,
    Close,
    Op(Operator),
    Literal(Literal),
    Number(String),
    Word(String),
}

/// Entries of the operator stack.
#[derive(Debug)]
enum Pending {
    Open,
    Compare(Operator),
    And,
    Or,
    Not,
}

#[derive(Debug)]
enum Operand {
    Key(String),
    Literal(Literal),
    Qualifier(Arc<Qualifier>),
    /// Pushed with `NOT`, which only consumes its right operand.
    Placeholder,
}

impl Operand {
    fn describe(&self) -> String {
        match self {
            Self::Key(key) => key.clone(),
            Self::Literal(literal) => literal.to_string(),
            Self::Qualifier(q) => q.to_string(),
            Self::Placeholder => "NOT".to_string(),
        }
    }
}

impl Qualifier {
    pub fn parse(text: &str) -> Result<Arc<Qualifier>, ParseError> {
        parse(text, &[])
    }

    pub fn parse_with(text: &str, bindings: &[Value]) -> Result<Arc<Qualifier>, ParseError> {
        parse(text, bindings)
    }
}

/// Parse `text` after substituting `bindings` into its placeholders.
///
/// The result and every sub-condition are interned, so parsing the same text
/// twice yields the same `Arc`.
pub fn parse(text: &str, bindings: &[Value]) -> Result<Arc<Qualifier>, ParseError> {
    let expanded = expand(text, bindings)?;
    let tokens = tokenize(&format!("({expanded})"))?;
    reduce(tokens)
}

// --- Format expansion ---------------------------------------------------------

/// Substitute `%s %d %f %@ %K` placeholders, left to right, one binding each.
/// `%%` is a literal percent sign.
pub fn expand(format: &str, bindings: &[Value]) -> Result<String, ParseError> {
    let mut out = String::with_capacity(format.len());
    let mut chars = format.chars().peekable();
    let mut next = 0;

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }

        let conversion = match chars.peek() {
            Some('%') => {
                chars.next();
                out.push('%');
                continue;
            }
            Some(&conversion @ ('s' | 'd' | 'f' | '@' | 'K')) => conversion,
            _ => {
                out.push('%');
                continue;
            }
        };
        chars.next();

        let binding = bindings
            .get(next)
            .ok_or(ParseError::MissingBinding { index: next })?;
        next += 1;

        if let Value::Float(f) = binding {
            if !f.is_finite() {
                return Err(invalid_binding(conversion, binding));
            }
        }

        let rendered = match conversion {
            's' => Literal::String(binding.to_string()).to_string(),
            'd' => integer_binding(binding)?.to_string(),
            'f' => format_float(float_binding(binding)?),
            'K' => match binding {
                Value::String(key) => key.clone(),
                other => Literal::from_value(other).to_string(),
            },
            _ => Literal::from_value(binding).to_string(),
        };
        out.push_str(&rendered);
    }

    Ok(out)
}

fn integer_binding(binding: &Value) -> Result<i64, ParseError> {
    let parsed = match binding {
        Value::Int(i) => Some(*i),
        Value::Float(f) => Some(f.trunc() as i64),
        Value::String(s) => s.trim().parse::<i64>().ok().or_else(|| {
            s.trim()
                .parse::<f64>()
                .ok()
                .filter(|f| f.is_finite())
                .map(|f| f.trunc() as i64)
        }),
        _ => None,
    };
    parsed.ok_or_else(|| invalid_binding('d', binding))
}

fn float_binding(binding: &Value) -> Result<f64, ParseError> {
    let parsed = match binding {
        Value::Int(i) => Some(*i as f64),
        Value::Float(f) => Some(*f),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed
        .filter(|f| f.is_finite())
        .ok_or_else(|| invalid_binding('f', binding))
}

fn invalid_binding(conversion: char, binding: &Value) -> ParseError {
    ParseError::InvalidBinding {
        placeholder: format!("%{conversion}"),
        value: format!("{binding:?}"),
    }
}

// --- Tokenizer ----------------------------------------------------------------

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn boundary(input: &str) -> IResult<&str, ()> {
    not(satisfy(is_word_char)).parse(input)
}

fn unescape(body: &str) -> String {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(escaped) = chars.next() {
                out.push(escaped);
            }
        } else {
            out.push(c);
        }
    }
    out
}

fn single_quoted(input: &str) -> IResult<&str, String> {
    map(
        delimited(
            char('\''),
            recognize(many0(alt((preceded(char('\\'), anychar), none_of("'\\"))))),
            char('\''),
        ),
        unescape,
    )
    .parse(input)
}

fn double_quoted(input: &str) -> IResult<&str, String> {
    map(
        delimited(
            char('"'),
            recognize(many0(alt((preceded(char('\\'), anychar), none_of("\"\\"))))),
            char('"'),
        ),
        unescape,
    )
    .parse(input)
}

fn typed_string(input: &str) -> IResult<&str, Literal> {
    let type_name = recognize((
        satisfy(|c: char| c.is_ascii_uppercase()),
        take_while(|c: char| c.is_ascii_alphanumeric()),
    ));
    map(
        (
            delimited(char('('), type_name, char(')')),
            alt((single_quoted, double_quoted)),
        ),
        |(type_name, text): (&str, String)| Literal::Typed {
            type_name: type_name.to_string(),
            text,
        },
    )
    .parse(input)
}

fn operator(input: &str) -> IResult<&str, Operator> {
    alt((
        value(Operator::Equal, tag("==")),
        value(Operator::NotEqual, tag("!=")),
        value(Operator::GreaterOrEqual, tag(">=")),
        value(Operator::LessOrEqual, tag("<=")),
        value(Operator::Greater, tag(">")),
        value(Operator::Less, tag("<")),
        value(Operator::Equal, tag("=")),
        value(Operator::CiLike, terminated(tag_no_case("cilike"), boundary)),
        value(Operator::Like, terminated(tag_no_case("like"), boundary)),
    ))
    .parse(input)
}

fn number(input: &str) -> IResult<&str, &str> {
    recognize((opt(char('-')), digit1, opt((char('.'), digit1)))).parse(input)
}

/// Integers must fit in an `i64` and floats must be finite; a digit run is
/// never reinterpreted as a key.
fn number_literal(text: &str) -> Result<Literal, ParseError> {
    let literal = if text.contains('.') {
        text.parse::<f64>()
            .ok()
            .filter(|f| f.is_finite())
            .map(Literal::Float)
    } else {
        text.parse::<i64>().ok().map(Literal::Integer)
    };
    literal.ok_or_else(|| ParseError::InvalidNumber {
        text: text.to_string(),
    })
}

fn keyword(input: &str) -> IResult<&str, Literal> {
    alt((
        value(Literal::Bool(true), terminated(tag("true"), boundary)),
        value(Literal::Bool(false), terminated(tag("false"), boundary)),
        value(Literal::Null, terminated(tag("nil"), boundary)),
    ))
    .parse(input)
}

fn bare_word(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| !c.is_whitespace() && !"()=!<>'\"".contains(c)).parse(input)
}

fn token(input: &str) -> IResult<&str, Token> {
    alt((
        map(typed_string, Token::Literal),
        value(Token::Open, char('(')),
        value(Token::Close, char(')')),
        map(operator, Token::Op),
        map(number, |n: &str| Token::Number(n.to_string())),
        map(keyword, Token::Literal),
        map(single_quoted, |s| Token::Literal(Literal::String(s))),
        map(double_quoted, |s| Token::Literal(Literal::String(s))),
        map(bare_word, |w: &str| Token::Word(w.to_string())),
    ))
    .parse(input)
}

fn tokenize(text: &str) -> Result<Vec<Token>, ParseError> {
    let mut tokens = Vec::new();
    let mut input = text.trim_start();

    while !input.is_empty() {
        match token(input) {
            Ok((rest, tok)) => {
                tokens.push(tok);
                input = rest.trim_start();
            }
            Err(_) => {
                return Err(ParseError::Tokenize {
                    // Offset into the caller's text, without the wrapping paren.
                    position: (text.len() - input.len()).saturating_sub(1),
                    rest: input.to_string(),
                });
            }
        }
    }

    Ok(tokens)
}

// --- Shift-reduce -------------------------------------------------------------

fn connective(word: &str) -> Option<Pending> {
    if word.eq_ignore_ascii_case("and") {
        Some(Pending::And)
    } else if word.eq_ignore_ascii_case("or") {
        Some(Pending::Or)
    } else if word.eq_ignore_ascii_case("not") {
        Some(Pending::Not)
    } else {
        None
    }
}

fn reduce(tokens: Vec<Token>) -> Result<Arc<Qualifier>, ParseError> {
    let mut operators: Vec<Pending> = Vec::new();
    let mut operands: Vec<Operand> = Vec::new();

    for token in tokens {
        match token {
            Token::Open => operators.push(Pending::Open),
            Token::Close => loop {
                match operators.pop() {
                    None => return Err(ParseError::Unbalanced),
                    Some(Pending::Open) => break,
                    Some(op) => {
                        let right = operands.pop();
                        let left = operands.pop();
                        let q = apply(op, left, right)?;
                        operands.push(Operand::Qualifier(q));
                    }
                }
            },
            Token::Op(op) => operators.push(Pending::Compare(op)),
            Token::Word(word) => match connective(&word) {
                Some(Pending::Not) => {
                    operands.push(Operand::Placeholder);
                    operators.push(Pending::Not);
                }
                Some(c) => operators.push(c),
                None => operands.push(Operand::Key(word)),
            },
            Token::Literal(literal) => operands.push(Operand::Literal(literal)),
            Token::Number(text) => operands.push(Operand::Literal(number_literal(&text)?)),
        }
    }

    if operators.iter().any(|op| matches!(op, Pending::Open)) {
        return Err(ParseError::Unbalanced);
    }

    let result = operands.pop();
    if !operands.is_empty() || !operators.is_empty() {
        return Err(match operands.pop() {
            Some(stray) => ParseError::UnexpectedToken {
                token: stray.describe(),
            },
            None => ParseError::Incomplete,
        });
    }

    match result {
        Some(Operand::Qualifier(q)) => Ok(q),
        Some(other) => Err(ParseError::UnexpectedToken {
            token: other.describe(),
        }),
        None => Err(ParseError::Incomplete),
    }
}

fn apply(
    op: Pending,
    left: Option<Operand>,
    right: Option<Operand>,
) -> Result<Arc<Qualifier>, ParseError> {
    let name = match &op {
        Pending::Compare(c) => c.as_str(),
        Pending::And => "AND",
        Pending::Or => "OR",
        Pending::Not => "NOT",
        Pending::Open => "(",
    };
    let (Some(left), Some(right)) = (left, right) else {
        return Err(ParseError::MissingOperand {
            operator: name.to_string(),
        });
    };

    let q = match (op, left, right) {
        (Pending::Compare(c), Operand::Key(key), Operand::Literal(literal)) => {
            Qualifier::key_value(key, c, literal)
        }
        (Pending::Compare(c), Operand::Key(key), Operand::Key(other)) => {
            Qualifier::key_comparison(key, c, other)
        }
        (Pending::Compare(c), Operand::Literal(left), Operand::Literal(right)) => {
            Qualifier::literal_comparison(left, c, right)
        }
        (Pending::And, Operand::Qualifier(l), Operand::Qualifier(r)) => {
            Qualifier::And(merge(l, &r, |q| match q {
                Qualifier::And(terms) => Some(terms),
                _ => None,
            }))
        }
        (Pending::Or, Operand::Qualifier(l), Operand::Qualifier(r)) => {
            Qualifier::Or(merge(l, &r, |q| match q {
                Qualifier::Or(terms) => Some(terms),
                _ => None,
            }))
        }
        (Pending::Not, Operand::Placeholder, Operand::Qualifier(r)) => Qualifier::Not(r),
        (_, Operand::Qualifier(_) | Operand::Placeholder, stray)
        | (_, stray, Operand::Qualifier(_) | Operand::Placeholder)
        | (_, _, stray) => {
            return Err(ParseError::UnexpectedToken {
                token: stray.describe(),
            });
        }
    };

    Ok(q.intern())
}

/// Prepend `left` to the terms of a same-connective `right`, else pair them.
fn merge(
    left: Arc<Qualifier>,
    right: &Arc<Qualifier>,
    terms_of: impl Fn(&Qualifier) -> Option<&Vec<Arc<Qualifier>>>,
) -> Vec<Arc<Qualifier>> {
    match terms_of(right) {
        Some(terms) => {
            let mut merged = Vec::with_capacity(terms.len() + 1);
            merged.push(left);
            merged.extend(terms.iter().cloned());
            merged
        }
        None => vec![left, right.clone()],
    }
}
