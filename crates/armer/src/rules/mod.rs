#![forbid(unsafe_code)]

mod expr;
mod rule_set;

pub use expr::{Expr, ExprError, Operand};
pub use rule_set::{RuleError, RuleIssue, RuleSet, TransitionRule};
