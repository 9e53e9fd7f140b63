//! Hindsight optimization. Every rollout solves a determinized problem with
//! freshly sampled outcomes; the first actions of the successful rollouts are
//! the candidates, scored by a second round of rollouts from a sampled
//! successor.
use std::{
    collections::{BTreeSet, HashMap, VecDeque},
    time::Duration,
};

use indexmap::IndexMap;
use rand::{rngs::StdRng, SeedableRng};
use tracing::{debug, info};

use super::Agent;
use crate::{
    config::HindsightConfig,
    determinization::Determinizer,
    pddl::{GroundAction, Problem, StateKey, SymbolicState},
    planner::Planner,
    simulation::sample_successor,
    Error,
};

/// The common prefix of two plans.
pub fn intersect_plans(first: &[GroundAction], second: &[GroundAction]) -> Vec<GroundAction> {
    first
        .iter()
        .zip(second)
        .take_while(|(a, b)| a == b)
        .map(|(a, _)| a.clone())
        .collect()
}

/// The prefix shared by every plan; failed rollouts (`None`) are ignored.
pub fn longest_prefix(plans: &[Option<Vec<GroundAction>>]) -> Vec<GroundAction> {
    let mut found = plans.iter().flatten();
    let Some(first) = found.next() else {
        return Vec::new();
    };
    found.fold(first.clone(), |prefix, plan| intersect_plans(&prefix, plan))
}

/// Time left for a sequence of planner calls. Each call gets an even share
/// of the pool and is charged what it actually took.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Budget {
    pool: Option<Duration>,
    calls_left: usize,
}

impl Budget {
    fn slice(&self) -> Option<Duration> {
        self.pool
            .map(|pool| pool / self.calls_left.max(1) as u32)
    }

    fn charge(&mut self, wall_time: Duration) {
        if let Some(pool) = &mut self.pool {
            *pool = pool.saturating_sub(wall_time);
        }
        self.calls_left = self.calls_left.saturating_sub(1);
    }
}

pub struct HindsightAgent<P> {
    problem: Problem,
    determinizer: Determinizer,
    planner: P,
    config: HindsightConfig,
    vocabulary: BTreeSet<String>,
    rng: StdRng,
    policy: HashMap<StateKey, GroundAction>,
    primed: VecDeque<GroundAction>,
    invocations: usize,
}

impl<P: Planner> HindsightAgent<P> {
    /// `determinizer` normally uses a hindsight strategy; `seed` drives the
    /// successor sampling of the scoring round.
    pub fn new(
        problem: Problem,
        mut determinizer: Determinizer,
        planner: P,
        config: HindsightConfig,
        seed: Option<u64>,
    ) -> Result<Self, Error> {
        determinizer.set_domain(problem.domain.clone())?;
        let vocabulary = determinizer.base_vocabulary()?;
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Ok(Self {
            problem,
            determinizer,
            planner,
            config,
            vocabulary,
            rng,
            policy: HashMap::new(),
            primed: VecDeque::new(),
            invocations: 0,
        })
    }

    pub fn planner(&self) -> &P {
        &self.planner
    }

    pub fn policy_size(&self) -> usize {
        self.policy.len()
    }

    /// Actions queued from the last decision's common rollout prefix.
    pub fn primed(&self) -> impl Iterator<Item = &GroundAction> {
        self.primed.iter()
    }

    fn key(&self, state: &SymbolicState) -> StateKey {
        state.project(&self.vocabulary).key()
    }

    /// Runs `calls` rollouts from `state`, returning the base plan of every
    /// successful one.
    fn rollouts(
        &mut self,
        state: &SymbolicState,
        calls: usize,
        budget: &mut Budget,
    ) -> Result<Vec<Option<Vec<GroundAction>>>, Error> {
        let anchored = self.problem.anchored_at(state);
        let mut plans = Vec::with_capacity(calls);
        for _ in 0..calls {
            let determinized = self.determinizer.determinize(&anchored)?;
            self.invocations += 1;
            let result = self.planner.plan(&determinized, budget.slice());
            budget.charge(result.wall_time);
            plans.push(if result.plan_found {
                Some(self.determinizer.process_plan_trace(&result.plan)?.1)
            } else {
                None
            });
        }
        Ok(plans)
    }

    /// Mean rollout score from the state `action` leads to: minus the plan
    /// length for a success, minus the penalty for a failure.
    fn score(
        &mut self,
        state: &SymbolicState,
        action: &GroundAction,
        budget: &mut Budget,
    ) -> Result<f64, Error> {
        let successor = sample_successor(&self.problem, state, action, &mut self.rng)?;
        if self.problem.is_goal(&successor) {
            return Ok(0.0);
        }
        let calls = self.config.calls_per_pha;
        let penalty = self.config.penalty;
        let rollouts = self.rollouts(&successor, calls, budget)?;
        let total: f64 = rollouts
            .iter()
            .map(|plan| match plan {
                Some(plan) => -(plan.len() as f64),
                None => -penalty,
            })
            .sum();
        Ok(total / rollouts.len().max(1) as f64)
    }

    /// Chooses among the first actions of sampled plans.
    fn possible_hindsight_actions(
        &mut self,
        state: &SymbolicState,
        remaining: Option<Duration>,
    ) -> Result<Option<GroundAction>, Error> {
        let initial_calls = self.config.initial_calls;
        let mut budget = Budget {
            pool: remaining,
            calls_left: initial_calls * (1 + self.config.calls_per_pha),
        };
        let plans = self.rollouts(state, initial_calls, &mut budget)?;

        let mut candidates: IndexMap<GroundAction, Vec<Option<Vec<GroundAction>>>> =
            IndexMap::new();
        for plan in plans.into_iter().flatten() {
            if let Some(first) = plan.first().cloned() {
                candidates.entry(first).or_default().push(Some(plan));
            }
        }
        if candidates.is_empty() {
            info!(rollouts = initial_calls, "no rollout reached the goal");
            return Ok(None);
        }

        budget.calls_left = candidates.len() * self.config.calls_per_pha;
        let mut best: Option<(&GroundAction, f64)> = None;
        for (action, plans) in &candidates {
            let score = if self.config.calls_per_pha == 0 {
                plans.len() as f64
            } else {
                self.score(state, action, &mut budget)?
            };
            debug!(%action, score, successes = plans.len(), "candidate");
            if best.map_or(true, |(_, top)| score > top) {
                best = Some((action, score));
            }
        }
        let Some((action, score)) = best else {
            return Ok(None);
        };

        let action = action.clone();
        let prefix = longest_prefix(&candidates[&action]);
        info!(%action, score, candidates = candidates.len(), prefix = prefix.len(), "chose action");
        self.primed = prefix.into_iter().skip(1).collect();
        let key = self.key(state);
        self.policy.insert(key, action.clone());
        Ok(Some(action))
    }
}

impl<P: Planner> Agent for HindsightAgent<P> {
    fn problem(&self) -> &Problem {
        &self.problem
    }

    fn invocations(&self) -> usize {
        self.invocations
    }

    fn next_action(
        &mut self,
        state: &SymbolicState,
        remaining: Option<Duration>,
    ) -> Result<Option<GroundAction>, Error> {
        if let Some(action) = self.primed.pop_front() {
            if self.problem.ground(&action)?.is_applicable(state) {
                debug!(%action, "primed");
                return Ok(Some(action));
            }
            self.primed.clear();
        }
        let key = self.key(state);
        if let Some(action) = self.policy.get(&key).cloned() {
            if self.problem.ground(&action)?.is_applicable(state) {
                debug!(%action, "policy hit");
                return Ok(Some(action));
            }
            debug!(%action, "cached action not applicable");
            self.policy.remove(&key);
        }
        self.possible_hindsight_actions(state, remaining)
    }
}
