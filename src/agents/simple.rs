use std::{
    collections::{hash_map::Entry, BTreeSet, HashMap},
    time::Duration,
};

use tracing::{debug, info};

use super::Agent;
use crate::{
    determinization::Determinizer,
    pddl::{GroundAction, Problem, StateKey, SymbolicState},
    planner::Planner,
    Error,
};

/// Replans on a determinized problem whenever it meets a state it has no
/// action for, and remembers the action for every state along the plan.
pub struct SimpleDeterminizerAgent<P> {
    problem: Problem,
    determinizer: Determinizer,
    planner: P,
    vocabulary: BTreeSet<String>,
    policy: HashMap<StateKey, GroundAction>,
    invocations: usize,
}

impl<P: Planner> SimpleDeterminizerAgent<P> {
    pub fn new(problem: Problem, mut determinizer: Determinizer, planner: P) -> Result<Self, Error> {
        determinizer.set_domain(problem.domain.clone())?;
        let vocabulary = determinizer.base_vocabulary()?;
        Ok(Self {
            problem,
            determinizer,
            planner,
            vocabulary,
            policy: HashMap::new(),
            invocations: 0,
        })
    }

    pub fn planner(&self) -> &P {
        &self.planner
    }

    /// Number of states with a cached action.
    pub fn policy_size(&self) -> usize {
        self.policy.len()
    }

    fn key(&self, state: &SymbolicState) -> StateKey {
        state.project(&self.vocabulary).key()
    }

    fn replan(
        &mut self,
        state: &SymbolicState,
        remaining: Option<Duration>,
    ) -> Result<Option<GroundAction>, Error> {
        let determinized = self.determinizer.determinize(&self.problem.anchored_at(state))?;
        self.invocations += 1;
        let result = self.planner.plan(&determinized, remaining);
        if !result.plan_found {
            info!(timeout = result.timeout, "no plan found");
            return Ok(None);
        }

        // A state the plan leaves with different actions (possible when only
        // fluents change) gets no entry.
        let mut chosen: HashMap<StateKey, Option<GroundAction>> = HashMap::new();
        let mut current = determinized.initial_state();
        let mut first = None;
        for step in &result.plan {
            let base = self.determinizer.process_action_tuple(step)?.base;
            match chosen.entry(self.key(&current)) {
                Entry::Vacant(entry) => {
                    entry.insert(Some(base.clone()));
                }
                Entry::Occupied(mut entry) => {
                    if entry.get().as_ref() != Some(&base) {
                        entry.insert(None);
                    }
                }
            }
            first.get_or_insert(base);
            match determinized.ground(step)?.apply(&current, None)? {
                Some(next) => current = next,
                None => break,
            }
        }
        for (key, action) in chosen {
            match action {
                Some(action) => self.policy.insert(key, action),
                None => self.policy.remove(&key),
            };
        }
        debug!(steps = result.plan.len(), policy = self.policy.len(), "cached plan");
        Ok(first)
    }
}

impl<P: Planner> Agent for SimpleDeterminizerAgent<P> {
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
        let key = self.key(state);
        if let Some(action) = self.policy.get(&key).cloned() {
            if self.problem.ground(&action)?.is_applicable(state) {
                debug!(%action, "policy hit");
                return Ok(Some(action));
            }
            debug!(%action, "cached action not applicable");
            self.policy.remove(&key);
        }
        self.replan(state, remaining)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        agents::RunStatus,
        determinization::{Criterion, Strategy},
        lib_tests::{
            chain_problem, fuel_problem, move_problem, BreadthFirstPlanner, ScriptedPlanner,
        },
        planner::PlanResult,
        simulation::Simulator,
    };

    fn single_outcome() -> Determinizer {
        Determinizer::new(
            Strategy::SingleOutcome {
                criterion: Criterion::Mlo,
            },
            Some(0),
        )
    }

    #[test]
    fn one_step_goal_with_one_planner_call() {
        let problem = chain_problem(1);
        let mut agent =
            SimpleDeterminizerAgent::new(problem.clone(), single_outcome(), BreadthFirstPlanner::default())
                .unwrap();
        let mut simulator = Simulator::new(None, Some(0));
        let report = agent.run(&mut simulator).unwrap();
        assert_eq!(report.status, RunStatus::Success);
        assert_eq!(report.steps, 1);
        assert_eq!(agent.planner().invocations, 1);

        // revisiting the start is served from the policy
        let action = agent
            .next_action(&problem.initial_state(), None)
            .unwrap()
            .unwrap();
        assert_eq!(action, GroundAction::new("advance-1", &[]));
        assert_eq!(agent.planner().invocations, 1);
        assert_eq!(agent.invocations(), 1);
    }

    #[test]
    fn every_plan_state_is_cached() {
        let problem = chain_problem(0);
        let mut agent =
            SimpleDeterminizerAgent::new(problem, single_outcome(), BreadthFirstPlanner::default())
                .unwrap();
        let report = agent.run(&mut Simulator::new(None, Some(0))).unwrap();
        assert_eq!(report.status, RunStatus::Success);
        assert_eq!(report.steps, 2);
        assert_eq!(agent.policy_size(), 2);
        assert_eq!(agent.planner().invocations, 1);
    }

    #[test]
    fn failed_outcomes_revisit_cached_states() {
        let problem = move_problem();
        let mut agent = SimpleDeterminizerAgent::new(
            problem,
            Determinizer::new(Strategy::AllOutcome, Some(0)),
            BreadthFirstPlanner::default(),
        )
        .unwrap();
        let report = agent.run(&mut Simulator::new(None, Some(4))).unwrap();
        assert_eq!(report.status, RunStatus::Success);
        assert!(report.steps >= 1);
        assert_eq!(agent.planner().invocations, 1);
    }

    #[test]
    fn planner_failure_ends_the_run() {
        let problem = chain_problem(0);
        let mut agent =
            SimpleDeterminizerAgent::new(problem, single_outcome(), ScriptedPlanner::default())
                .unwrap();
        let report = agent.run(&mut Simulator::new(None, Some(0))).unwrap();
        assert_eq!(report.status, RunStatus::PlanNotFound);
        assert_eq!(report.steps, 0);
        assert_eq!(agent.invocations(), 1);
        // the planner saw the determinized problem
        let asked = &agent.planner().problems[0];
        assert_eq!(asked.domain.actions[0].name, "advance-0_o0");
    }

    fn found(names: &[&str]) -> PlanResult {
        let plan = names.iter().map(|n| GroundAction::new(*n, &[])).collect();
        PlanResult::found(plan, 0.0, Duration::from_millis(1))
    }

    #[test]
    fn fluent_gated_plan_runs_to_the_goal() {
        let mut agent =
            SimpleDeterminizerAgent::new(fuel_problem(), single_outcome(), BreadthFirstPlanner::default())
                .unwrap();
        let report = agent.run(&mut Simulator::new(None, Some(0))).unwrap();
        assert_eq!(report.status, RunStatus::Success);
        assert_eq!(report.steps, 3);
        // `at-a` is left by refuel and by drive, so it is never cached
        assert_eq!(agent.planner().invocations, 3);
        assert_eq!(agent.policy_size(), 1);
    }

    #[test]
    fn inapplicable_cached_action_is_replanned() {
        let problem = fuel_problem();
        let planner = ScriptedPlanner::new([
            found(&["drive_o0"]),
            found(&["refuel_o0", "refuel_o0", "drive_o0"]),
        ]);
        let mut agent = SimpleDeterminizerAgent::new(problem.clone(), single_outcome(), planner).unwrap();
        let start = problem.initial_state();

        // the planner claims driving works on an empty tank
        let action = agent.next_action(&start, None).unwrap().unwrap();
        assert_eq!(action, GroundAction::new("drive", &[]));
        assert_eq!(agent.policy_size(), 1);

        let action = agent.next_action(&start, None).unwrap().unwrap();
        assert_eq!(action, GroundAction::new("refuel", &[]));
        assert_eq!(agent.invocations(), 2);
        assert_eq!(agent.policy_size(), 0);
    }
}
