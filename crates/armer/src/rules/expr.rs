#![forbid(unsafe_code)]

//! Condition expressions over [`Snapshot`] facts.
//!
//! ```text
//! expr     := and ("or" and)*
//! and      := unary ("and" unary)*
//! unary    := "not" unary | primary
//! primary  := "(" expr ")"
//!           | STRING "in" IDENT
//!           | operand (("==" | "!=") operand)?
//! operand  := IDENT | STRING | "true" | "false"
//! ```
//!
//! Strings compared against a fact must name an alarm state, e.g.
//! `occupied_daytime_state == 'disarmed'`. Membership tests take any
//! string: `'person.alice' in at_home`.

use crate::domain::ArmState;
use crate::snapshot::{FactKind, FactValue, Snapshot, fact_kind};
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExprError {
    #[error("empty condition")]
    Empty,

    #[error("unexpected character {0:?} at offset {1}")]
    UnexpectedChar(char, usize),

    #[error("unterminated string starting at offset {0}")]
    UnterminatedString(usize),

    #[error("unexpected {found} at offset {pos}, expected {expected}")]
    Unexpected {
        found: String,
        pos: usize,
        expected: &'static str,
    },

    #[error("condition ended early, expected {0}")]
    UnexpectedEnd(&'static str),

    #[error("unknown fact `{0}`")]
    UnknownFact(String),

    #[error("`{0}` is not an alarm state")]
    UnknownState(String),

    #[error("type mismatch: {0}")]
    TypeMismatch(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Ident(String),
    Str(String),
    LParen,
    RParen,
    And,
    Or,
    Not,
    In,
    Eq,
    Ne,
    True,
    False,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Ident(name) => format!("`{name}`"),
            Token::Str(text) => format!("'{text}'"),
            Token::LParen => "`(`".into(),
            Token::RParen => "`)`".into(),
            Token::And => "`and`".into(),
            Token::Or => "`or`".into(),
            Token::Not => "`not`".into(),
            Token::In => "`in`".into(),
            Token::Eq => "`==`".into(),
            Token::Ne => "`!=`".into(),
            Token::True => "`true`".into(),
            Token::False => "`false`".into(),
        }
    }
}

fn tokenize(src: &str) -> Result<Vec<(usize, Token)>, ExprError> {
    let mut tokens = Vec::new();
    let mut chars = src.char_indices().peekable();

    while let Some((pos, c)) = chars.next() {
        let token = match c {
            c if c.is_whitespace() => continue,
            '(' => Token::LParen,
            ')' => Token::RParen,
            '=' | '!' => match chars.next_if(|(_, next)| *next == '=') {
                Some(_) if c == '=' => Token::Eq,
                Some(_) => Token::Ne,
                None => return Err(ExprError::UnexpectedChar(c, pos)),
            },
            '\'' | '"' => {
                let mut text = String::new();
                loop {
                    match chars.next() {
                        Some((_, q)) if q == c => break,
                        Some((_, other)) => text.push(other),
                        None => return Err(ExprError::UnterminatedString(pos)),
                    }
                }
                Token::Str(text)
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut word = String::from(c);
                while let Some((_, next)) =
                    chars.next_if(|(_, n)| n.is_ascii_alphanumeric() || *n == '_' || *n == '.')
                {
                    word.push(next);
                }
                match word.as_str() {
                    "and" => Token::And,
                    "or" => Token::Or,
                    "not" => Token::Not,
                    "in" => Token::In,
                    "true" | "True" => Token::True,
                    "false" | "False" => Token::False,
                    _ => Token::Ident(word),
                }
            }
            other => return Err(ExprError::UnexpectedChar(other, pos)),
        };
        tokens.push((pos, token));
    }

    Ok(tokens)
}

/// One side of a comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    Fact(String),
    State(ArmState),
    Bool(bool),
}

impl Operand {
    fn kind(&self) -> Result<FactKind, ExprError> {
        match self {
            Operand::Fact(name) => fact_kind(name).ok_or_else(|| ExprError::UnknownFact(name.clone())),
            Operand::State(_) => Ok(FactKind::State),
            Operand::Bool(_) => Ok(FactKind::Bool),
        }
    }

    fn value<'a>(&self, snapshot: &'a Snapshot) -> Result<FactValue<'a>, ExprError> {
        match self {
            Operand::Fact(name) => snapshot
                .fact(name)
                .ok_or_else(|| ExprError::UnknownFact(name.clone())),
            Operand::State(state) => Ok(FactValue::State(*state)),
            Operand::Bool(value) => Ok(FactValue::Bool(*value)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Const(bool),
    Fact(String),
    Not(Box<Expr>),
    All(Vec<Expr>),
    Any(Vec<Expr>),
    Compare {
        left: Operand,
        negate: bool,
        right: Operand,
    },
    Contains {
        item: String,
        set: String,
    },
}

impl Expr {
    /// Parse and type check a condition.
    pub fn parse(src: &str) -> Result<Self, ExprError> {
        let tokens = tokenize(src)?;
        if tokens.is_empty() {
            return Err(ExprError::Empty);
        }
        let mut parser = Parser { tokens, pos: 0 };
        let expr = parser.expr()?;
        if let Some((pos, token)) = parser.tokens.get(parser.pos) {
            return Err(ExprError::Unexpected {
                found: token.describe(),
                pos: *pos,
                expected: "end of condition",
            });
        }
        expr.check()?;
        Ok(expr)
    }

    /// Make sure every fact exists and every comparison is between values
    /// of the same kind.
    pub fn check(&self) -> Result<(), ExprError> {
        match self {
            Expr::Const(_) => Ok(()),
            Expr::Fact(name) => match fact_kind(name) {
                Some(FactKind::Bool) => Ok(()),
                Some(_) => Err(ExprError::TypeMismatch(format!(
                    "`{name}` is not true/false, compare it to something"
                ))),
                None => Err(ExprError::UnknownFact(name.clone())),
            },
            Expr::Not(inner) => inner.check(),
            Expr::All(items) | Expr::Any(items) => items.iter().try_for_each(Expr::check),
            Expr::Compare { left, right, .. } => {
                let (l, r) = (left.kind()?, right.kind()?);
                if l == FactKind::Set || r == FactKind::Set {
                    return Err(ExprError::TypeMismatch(
                        "sets can only be used with `in`".into(),
                    ));
                }
                if l != r {
                    return Err(ExprError::TypeMismatch(format!(
                        "cannot compare {l:?} with {r:?}"
                    )));
                }
                Ok(())
            }
            Expr::Contains { set, .. } => match fact_kind(set) {
                Some(FactKind::Set) => Ok(()),
                Some(_) => Err(ExprError::TypeMismatch(format!("`{set}` is not a set"))),
                None => Err(ExprError::UnknownFact(set.clone())),
            },
        }
    }

    pub fn eval(&self, snapshot: &Snapshot) -> Result<bool, ExprError> {
        match self {
            Expr::Const(value) => Ok(*value),
            Expr::Fact(name) => match snapshot.fact(name) {
                Some(FactValue::Bool(value)) => Ok(value),
                Some(_) => Err(ExprError::TypeMismatch(format!("`{name}` is not true/false"))),
                None => Err(ExprError::UnknownFact(name.clone())),
            },
            Expr::Not(inner) => Ok(!inner.eval(snapshot)?),
            Expr::All(items) => {
                for item in items {
                    if !item.eval(snapshot)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Expr::Any(items) => {
                for item in items {
                    if item.eval(snapshot)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Expr::Compare {
                left,
                negate,
                right,
            } => {
                let equal = match (left.value(snapshot)?, right.value(snapshot)?) {
                    (FactValue::Bool(a), FactValue::Bool(b)) => a == b,
                    (FactValue::State(a), FactValue::State(b)) => a == b,
                    (a, b) => {
                        return Err(ExprError::TypeMismatch(format!(
                            "cannot compare {:?} with {:?}",
                            a.kind(),
                            b.kind()
                        )));
                    }
                };
                Ok(equal != *negate)
            }
            Expr::Contains { item, set } => match snapshot.fact(set) {
                Some(FactValue::Set(members)) => Ok(members.contains(item)),
                Some(_) => Err(ExprError::TypeMismatch(format!("`{set}` is not a set"))),
                None => Err(ExprError::UnknownFact(set.clone())),
            },
        }
    }
}

impl FromStr for Expr {
    type Err = ExprError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Expr::parse(s)
    }
}

struct Parser {
    tokens: Vec<(usize, Token)>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(_, token)| token)
    }

    fn eat(&mut self, wanted: &Token) -> bool {
        if self.peek() == Some(wanted) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn next(&mut self, expected: &'static str) -> Result<(usize, Token), ExprError> {
        let item = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or(ExprError::UnexpectedEnd(expected))?;
        self.pos += 1;
        Ok(item)
    }

    fn expr(&mut self) -> Result<Expr, ExprError> {
        let mut items = vec![self.and()?];
        while self.eat(&Token::Or) {
            items.push(self.and()?);
        }
        Ok(if items.len() == 1 {
            items.remove(0)
        } else {
            Expr::Any(items)
        })
    }

    fn and(&mut self) -> Result<Expr, ExprError> {
        let mut items = vec![self.unary()?];
        while self.eat(&Token::And) {
            items.push(self.unary()?);
        }
        Ok(if items.len() == 1 {
            items.remove(0)
        } else {
            Expr::All(items)
        })
    }

    fn unary(&mut self) -> Result<Expr, ExprError> {
        if self.eat(&Token::Not) {
            return Ok(Expr::Not(Box::new(self.unary()?)));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Expr, ExprError> {
        let (pos, token) = self.next("a condition")?;
        let left = match token {
            Token::LParen => {
                let inner = self.expr()?;
                let (pos, token) = self.next("`)`")?;
                if token != Token::RParen {
                    return Err(ExprError::Unexpected {
                        found: token.describe(),
                        pos,
                        expected: "`)`",
                    });
                }
                return Ok(inner);
            }
            Token::Str(text) if self.eat(&Token::In) => {
                let (pos, token) = self.next("a set")?;
                return match token {
                    Token::Ident(set) => Ok(Expr::Contains { item: text, set }),
                    other => Err(ExprError::Unexpected {
                        found: other.describe(),
                        pos,
                        expected: "a set",
                    }),
                };
            }
            other => Self::operand(pos, other)?,
        };

        let negate = match self.peek() {
            Some(Token::Eq) => false,
            Some(Token::Ne) => true,
            _ => {
                return match left {
                    Operand::Fact(name) => Ok(Expr::Fact(name)),
                    Operand::Bool(value) => Ok(Expr::Const(value)),
                    Operand::State(state) => Err(ExprError::Unexpected {
                        found: format!("'{state}'"),
                        pos,
                        expected: "a comparison",
                    }),
                };
            }
        };
        self.pos += 1;

        let (pos, token) = self.next("a value")?;
        let right = Self::operand(pos, token)?;
        Ok(Expr::Compare {
            left,
            negate,
            right,
        })
    }

    fn operand(pos: usize, token: Token) -> Result<Operand, ExprError> {
        match token {
            Token::Ident(name) => Ok(Operand::Fact(name)),
            Token::Str(text) => text
                .parse::<ArmState>()
                .map(Operand::State)
                .map_err(|_| ExprError::UnknownState(text)),
            Token::True => Ok(Operand::Bool(true)),
            Token::False => Ok(Operand::Bool(false)),
            other => Err(ExprError::Unexpected {
                found: other.describe(),
                pos,
                expected: "a fact or value",
            }),
        }
    }
}
