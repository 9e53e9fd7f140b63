use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    sync::Arc,
};

use super::{
    fmt_number, fmt_typed_list, Action, Domain, Functional, GroundAction, Object, Query,
    SymbolicState, Universe, REWARD, TOTAL_COST,
};
use crate::{Error, ErrorKind};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct InitialState {
    pub predicates: BTreeSet<Functional>,
    pub functions: BTreeMap<Functional, f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Minimize,
    Maximize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Metric {
    pub direction: Direction,
    pub expression: Query,
}

impl Metric {
    pub fn minimize_cost() -> Self {
        Self {
            direction: Direction::Minimize,
            expression: Query::Function(TOTAL_COST.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Goal {
    pub query: Query,
    pub reward: Option<f64>,
    pub metric: Option<Metric>,
}

impl Goal {
    pub fn holds(&self, state: &SymbolicState) -> bool {
        self.query.holds(state)
    }

    /// Adds the goal reward to `next` if the transition from `pre` reaches
    /// the goal.
    pub fn collect_reward(&self, pre: &SymbolicState, next: &mut SymbolicState) {
        if let Some(reward) = self.reward {
            if !self.holds(pre) && self.holds(next) {
                next.reward += reward;
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Problem {
    pub name: String,
    pub domain: Arc<Domain>,
    pub objects: Vec<Object>,
    pub init: InitialState,
    pub goal: Goal,
}

impl Problem {
    pub fn universe(&self) -> Universe {
        Universe::new(
            self.domain
                .constants
                .iter()
                .chain(self.objects.iter())
                .cloned(),
            &self.domain.types,
        )
    }

    pub fn initial_state(&self) -> SymbolicState {
        SymbolicState::new(
            self.init.predicates.iter().cloned(),
            self.init.functions.iter().map(|(f, v)| (f.clone(), *v)),
            Arc::new(self.universe()),
        )
    }

    /// Copy of the problem whose initial state is `state`. Cost restarts at
    /// zero; reward is kept.
    pub fn anchored_at(&self, state: &SymbolicState) -> Self {
        let mut functions: BTreeMap<Functional, f64> = state
            .functions()
            .iter()
            .map(|(f, v)| (f.clone(), *v))
            .collect();
        if self.domain.uses_costs() {
            functions.insert(TOTAL_COST.clone(), 0.0);
        }
        if self.domain.declares_function(&REWARD.name) {
            functions.insert(REWARD.clone(), state.reward);
        }
        Self {
            init: InitialState {
                predicates: state.predicates().clone(),
                functions,
            },
            ..self.clone()
        }
    }

    /// Copy of the problem over another domain.
    pub fn with_domain(&self, domain: Arc<Domain>) -> Self {
        Self {
            domain,
            ..self.clone()
        }
    }

    pub fn is_goal(&self, state: &SymbolicState) -> bool {
        self.goal.holds(state)
    }

    pub fn ground(&self, action: &GroundAction) -> Result<Action, Error> {
        self.domain
            .action(&action.name)
            .ok_or_else(|| Error::new(ErrorKind::UndefinedAction(action.name.clone())))?
            .ground(&action.args)
    }

    /// Every grounding of every action over the typed objects of the problem.
    pub fn ground_actions(&self) -> Vec<Action> {
        let universe = self.universe();
        self.domain
            .actions
            .iter()
            .flat_map(|action| {
                universe
                    .bindings(&action.parameters)
                    .into_iter()
                    .map(move |sigma| action.bind(&sigma))
            })
            .collect()
    }

    pub fn applicable_actions(&self, state: &SymbolicState) -> Vec<Action> {
        self.ground_actions()
            .into_iter()
            .filter(|a| a.is_applicable(state))
            .collect()
    }
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "(define (problem {})", self.name)?;
        writeln!(f, "  (:domain {})", self.domain.name)?;
        if !self.objects.is_empty() {
            write!(f, "  (:objects ")?;
            fmt_typed_list(f, &self.objects)?;
            writeln!(f, ")")?;
        }
        write!(f, "  (:init")?;
        for predicate in &self.init.predicates {
            write!(f, " {}", predicate)?;
        }
        for (function, value) in &self.init.functions {
            write!(f, " (= {} ", function)?;
            fmt_number(f, *value)?;
            write!(f, ")")?;
        }
        writeln!(f, ")")?;
        write!(f, "  (:goal {})", self.goal.query)?;
        if let Some(reward) = self.goal.reward {
            write!(f, "\n  (:goal-reward ")?;
            fmt_number(f, reward)?;
            write!(f, ")")?;
        }
        if let Some(metric) = &self.goal.metric {
            let direction = match metric.direction {
                Direction::Minimize => "minimize",
                Direction::Maximize => "maximize",
            };
            write!(f, "\n  (:metric {} {})", direction, metric.expression)?;
        }
        write!(f, ")")
    }
}
