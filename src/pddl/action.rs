use std::fmt;

use serde::{Deserialize, Serialize};

use super::{fmt_typed_list, Effect, Goal, Object, Query, Substitution, SymbolicState};
use crate::{Error, ErrorKind};

/// Where a determinized action variant came from: the base action, the index
/// of the outcome it commits to and that outcome's probability.
#[derive(Debug, Clone, PartialEq)]
pub struct OutcomeTag {
    pub base: String,
    pub outcome: usize,
    pub probability: f64,
    /// Leading parameters shared with the base action; determinizers may
    /// append bookkeeping parameters after them.
    pub base_arity: usize,
}

/// An action name with constant arguments, as planners print them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroundAction {
    pub name: String,
    pub args: Vec<String>,
}

impl GroundAction {
    pub fn new(name: impl Into<String>, args: &[&str]) -> Self {
        Self {
            name: name.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }
}

impl fmt::Display for GroundAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}", self.name)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        write!(f, ")")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Action {
    pub name: String,
    pub parameters: Vec<Object>,
    pub precondition: Query,
    pub effect: Effect,
    pub origin: Option<OutcomeTag>,
}

impl Action {
    pub fn new(
        name: impl Into<String>,
        parameters: Vec<Object>,
        precondition: Query,
        effect: Effect,
    ) -> Self {
        Self {
            name: name.into(),
            parameters,
            precondition,
            effect,
            origin: None,
        }
    }

    pub fn bind(&self, sigma: &Substitution) -> Self {
        Self {
            name: self.name.clone(),
            parameters: self.parameters.iter().map(|p| p.bind(sigma)).collect(),
            precondition: self.precondition.bind(sigma),
            effect: self.effect.bind(sigma),
            origin: self.origin.clone(),
        }
    }

    /// Substitutes `args` for the parameters, in order.
    pub fn ground(&self, args: &[String]) -> Result<Self, Error> {
        if args.len() != self.parameters.len() {
            return Err(Error::new(ErrorKind::ArityMismatch {
                name: self.name.clone(),
                expected: self.parameters.len(),
                found: args.len(),
            }));
        }
        let sigma: Substitution = self
            .parameters
            .iter()
            .zip(args)
            .map(|(p, a)| (p.name.clone(), a.clone()))
            .collect();
        Ok(self.bind(&sigma))
    }

    pub fn ground_action(&self) -> GroundAction {
        GroundAction {
            name: self.name.clone(),
            args: self.parameters.iter().map(|p| p.name.clone()).collect(),
        }
    }

    pub fn is_applicable(&self, state: &SymbolicState) -> bool {
        self.precondition.holds(state)
    }

    /// Successor of a ground action with a deterministic effect, or `None`
    /// when the precondition fails. The goal reward is collected when the
    /// goal becomes true.
    pub fn apply(
        &self,
        state: &SymbolicState,
        goal: Option<&Goal>,
    ) -> Result<Option<SymbolicState>, Error> {
        if !self.is_applicable(state) {
            return Ok(None);
        }
        let mut next = self.effect.apply(state)?;
        if let Some(goal) = goal {
            goal.collect_reward(state, &mut next);
        }
        Ok(Some(next))
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "  (:action {}", self.name)?;
        write!(f, "    :parameters (")?;
        fmt_typed_list(f, &self.parameters)?;
        writeln!(f, ")")?;
        if !self.precondition.is_empty() {
            writeln!(f, "    :precondition {}", self.precondition)?;
        }
        write!(f, "    :effect {})", self.effect)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pddl::{Functional, Universe, REWARD};
    use std::sync::Arc;

    fn pick_up() -> Action {
        let x = Object::new("?x", Some("block"));
        Action::new(
            "pick-up",
            vec![x.clone()],
            Query::And(vec![
                Query::Predicate(Functional::new("clear", vec![x.clone()])),
                Query::Predicate(Functional::new("handempty", vec![])),
            ]),
            Effect::And(vec![
                Effect::Add(Functional::new("holding", vec![x.clone()])),
                Effect::Delete(Functional::new("clear", vec![x])),
                Effect::Delete(Functional::new("handempty", vec![])),
            ]),
        )
    }

    fn state(facts: &[Functional]) -> SymbolicState {
        SymbolicState::new(facts.to_vec(), vec![], Arc::new(Universe::default()))
    }

    #[test]
    fn ground_and_apply() {
        let action = pick_up().ground(&["a".to_string()]).unwrap();
        assert_eq!(action.ground_action(), GroundAction::new("pick-up", &["a"]));
        let s = state(&[
            Functional::ground("clear", &["a"]),
            Functional::ground("handempty", &[]),
        ]);
        let next = action.apply(&s, None).unwrap().unwrap();
        assert!(next.holds(&Functional::ground("holding", &["a"])));
        assert!(!next.holds(&Functional::ground("handempty", &[])));
        assert!(action.apply(&next, None).unwrap().is_none());
    }

    #[test]
    fn arity_mismatch() {
        let err = pick_up().ground(&[]).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::ArityMismatch { expected: 1, found: 0, .. }));
    }

    #[test]
    fn goal_reward_on_reaching_goal() {
        let action = pick_up().ground(&["a".to_string()]).unwrap();
        let goal = Goal {
            query: Query::Predicate(Functional::ground("holding", &["a"])),
            reward: Some(10.0),
            metric: None,
        };
        let s = state(&[
            Functional::ground("clear", &["a"]),
            Functional::ground("handempty", &[]),
        ]);
        let next = action.apply(&s, Some(&goal)).unwrap().unwrap();
        assert_eq!(next.reward, 10.0);
        assert_eq!(next.value(&REWARD), 10.0);
    }

    #[test]
    fn display() {
        assert_eq!(
            pick_up().to_string(),
            "  (:action pick-up\n    :parameters (?x - block)\n    :precondition (and (clear ?x) (handempty))\n    :effect (and (holding ?x) (not (clear ?x)) (not (handempty))))"
        );
    }
}
