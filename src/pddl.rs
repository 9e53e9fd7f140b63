//! Owned PPDDL model: objects, queries, effects, actions, domains, problems
//! and symbolic states. Every rewrite returns a new value.
mod action;
mod domain;
mod effect;
mod object;
mod problem;
mod query;
mod requirement;
mod state;

use std::collections::HashMap;

use lazy_static::lazy_static;

pub use action::{Action, GroundAction, OutcomeTag};
pub use domain::{Domain, Types};
pub use effect::{AssignOp, Distribution, Effect};
pub use object::{Functional, Object};
pub(crate) use object::fmt_typed_list;
pub use problem::{Direction, Goal, InitialState, Metric, Problem};
pub use query::{ArithmeticOp, Comparison, Query, Value};
pub use requirement::Requirement;
pub use state::{StateKey, SymbolicState, Universe};

/// Probabilities below this are impossible; sums are compared with it.
pub const EPSILON: f64 = 1e-6;

/// Variable name to constant name.
pub type Substitution = HashMap<String, String>;

lazy_static! {
    pub static ref TOTAL_COST: Functional = Functional::new("total-cost", vec![]);
    pub static ref REWARD: Functional = Functional::new("reward", vec![]);
}

/// Formats a number the way PDDL sources write them: integers without a
/// fractional part, no exponent, no negative zero.
pub(crate) fn fmt_number(f: &mut std::fmt::Formatter<'_>, value: f64) -> std::fmt::Result {
    if value == 0.0 {
        write!(f, "0")
    } else {
        write!(f, "{}", value)
    }
}
