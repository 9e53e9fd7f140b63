//! Executes ground actions of a probabilistic problem against a wall clock
//! deadline.
use std::time::{Duration, Instant};

use rand::{rngs::StdRng, Rng, SeedableRng};
use tracing::{debug, warn};

use crate::{
    config::SimulatorConfig,
    pddl::{Action, Effect, GroundAction, Problem, SymbolicState},
    Error, ErrorKind,
};

/// Index of the outcome selected by `draw` in `[0, 1)`: the first outcome
/// whose cumulative probability exceeds the draw, the last one if none does.
pub fn pick_outcome(probabilities: &[f64], draw: f64) -> usize {
    let mut cumulative = 0.0;
    for (i, p) in probabilities.iter().enumerate() {
        cumulative += p;
        if draw < cumulative {
            return i;
        }
    }
    probabilities.len().saturating_sub(1)
}

/// Successor of `state` under `action` with the outcome drawn from `rng`.
/// Consumes exactly one draw.
pub fn sample_successor(
    problem: &Problem,
    state: &SymbolicState,
    action: &GroundAction,
    rng: &mut impl Rng,
) -> Result<SymbolicState, Error> {
    let ground = problem.ground(action)?;
    if !ground.is_applicable(state) {
        return Err(Error::new(ErrorKind::InapplicableAction(action.to_string())));
    }
    let outcomes = ground.effect.expand_probabilistic_effects()?;
    let probabilities: Vec<f64> = outcomes.iter().map(|(p, _)| *p).collect();
    let chosen = pick_outcome(&probabilities, rng.gen());
    let effect = outcomes
        .into_iter()
        .nth(chosen)
        .map(|(_, effect)| effect)
        .unwrap_or(Effect::Empty);
    Action { effect, ..ground }
        .apply(state, Some(&problem.goal))?
        .ok_or_else(|| Error::new(ErrorKind::InapplicableAction(action.to_string())))
}

#[derive(Debug, Clone, PartialEq)]
pub struct StepResult {
    /// The goal holds in `state`.
    pub done: bool,
    pub timed_out: bool,
    pub state: SymbolicState,
}

pub struct Simulator {
    problem: Option<Problem>,
    state: Option<SymbolicState>,
    timeout: Option<Duration>,
    started: Option<Instant>,
    rng: StdRng,
    history: Vec<(GroundAction, SymbolicState)>,
}

impl Simulator {
    pub fn new(timeout: Option<Duration>, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            problem: None,
            state: None,
            timeout,
            started: None,
            rng,
            history: Vec::new(),
        }
    }

    pub fn from_config(config: &SimulatorConfig) -> Self {
        Self::new(config.timeout(), config.seed)
    }

    /// Loads `problem` and returns its initial state. The clock stops until
    /// the next [`start`](Self::start).
    pub fn reset(&mut self, problem: Problem) -> SymbolicState {
        let state = problem.initial_state();
        self.problem = Some(problem);
        self.state = Some(state.clone());
        self.started = None;
        self.history.clear();
        state
    }

    pub fn start(&mut self) {
        self.started = Some(Instant::now());
    }

    pub fn elapsed(&self) -> Duration {
        self.started.map(|s| s.elapsed()).unwrap_or_default()
    }

    /// Time left before the deadline; `None` without a timeout.
    pub fn remaining(&self) -> Option<Duration> {
        self.timeout
            .map(|timeout| timeout.saturating_sub(self.elapsed()))
    }

    pub fn timed_out(&self) -> bool {
        self.timeout
            .map_or(false, |timeout| self.elapsed() >= timeout)
    }

    pub fn problem(&self) -> Result<&Problem, Error> {
        self.problem
            .as_ref()
            .ok_or_else(|| Error::new(ErrorKind::NoProblem))
    }

    pub fn state(&self) -> Result<&SymbolicState, Error> {
        self.state
            .as_ref()
            .ok_or_else(|| Error::new(ErrorKind::NoProblem))
    }

    /// Executed actions with the states they led to.
    pub fn history(&self) -> &[(GroundAction, SymbolicState)] {
        &self.history
    }

    /// Executes `action` in the current state. Past the deadline nothing
    /// changes and the result is marked as timed out. Submitting an action
    /// whose precondition does not hold is an error.
    pub fn step(&mut self, action: &GroundAction) -> Result<StepResult, Error> {
        let problem = self
            .problem
            .as_ref()
            .ok_or_else(|| Error::new(ErrorKind::NoProblem))?;
        let state = self
            .state
            .as_ref()
            .ok_or_else(|| Error::new(ErrorKind::NoProblem))?;
        if self.timed_out() {
            warn!(elapsed = ?self.elapsed(), %action, "simulation timed out");
            return Ok(StepResult {
                done: problem.is_goal(state),
                timed_out: true,
                state: state.clone(),
            });
        }
        let next = sample_successor(problem, state, action, &mut self.rng)?;
        let done = problem.is_goal(&next);
        debug!(%action, done, reward = next.reward, "simulated step");
        self.history.push((action.clone(), next.clone()));
        self.state = Some(next.clone());
        Ok(StepResult {
            done,
            timed_out: false,
            state: next,
        })
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::mock::StepRng;

    use super::*;
    use crate::{
        lib_tests::{blocks_problem, coin_problem, move_problem},
        pddl::Functional,
    };

    /// An rng whose every `f64` draw is `draw`.
    fn fixed_draw(draw: f64) -> StepRng {
        StepRng::new(((draw * (1u64 << 53) as f64) as u64) << 11, 0)
    }

    fn at_goal() -> Functional {
        Functional::ground("at-goal", &[])
    }

    #[test]
    fn cumulative_choice() {
        assert_eq!(pick_outcome(&[0.9, 0.1], 0.0), 0);
        assert_eq!(pick_outcome(&[0.9, 0.1], 0.89), 0);
        assert_eq!(pick_outcome(&[0.9, 0.1], 0.9), 1);
        assert_eq!(pick_outcome(&[0.5, 0.4999], 0.99995), 1);
        assert_eq!(pick_outcome(&[1.0], 0.3), 0);
    }

    #[test]
    fn move_succeeds_below_threshold() {
        let problem = move_problem();
        let state = problem.initial_state();
        let action = GroundAction::new("move", &[]);

        let mut rng = fixed_draw(0.5);
        assert_eq!(rng.gen::<f64>(), 0.5);
        let next = sample_successor(&problem, &state, &action, &mut rng).unwrap();
        assert!(next.holds(&at_goal()));

        let mut rng = fixed_draw(0.95);
        let next = sample_successor(&problem, &state, &action, &mut rng).unwrap();
        assert!(!next.holds(&at_goal()));
        assert_eq!(next, state);
    }

    #[test]
    fn seeded_simulator_follows_its_draws() {
        let action = GroundAction::new("move", &[]);
        for seed in 0..10 {
            let draw: f64 = StdRng::seed_from_u64(seed).gen();
            let mut simulator = Simulator::new(None, Some(seed));
            simulator.reset(move_problem());
            simulator.start();
            let result = simulator.step(&action).unwrap();
            assert_eq!(result.done, draw < 0.9, "seed {}", seed);
            assert_eq!(result.state.holds(&at_goal()), draw < 0.9);
            assert!(!result.timed_out);
            assert_eq!(simulator.history().len(), 1);
        }
    }

    #[test]
    fn inapplicable_action_is_an_error() {
        let mut simulator = Simulator::new(None, Some(0));
        simulator.reset(blocks_problem());
        simulator.start();
        let err = simulator
            .step(&GroundAction::new("stack", &["a", "b"]))
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InapplicableAction("(stack a b)".to_string()));
        assert!(simulator.history().is_empty());
    }

    #[test]
    fn unknown_action_is_an_error() {
        let mut simulator = Simulator::new(None, Some(0));
        simulator.reset(blocks_problem());
        let err = simulator.step(&GroundAction::new("fly", &[])).unwrap_err();
        assert_eq!(err.kind, ErrorKind::UndefinedAction("fly".to_string()));
    }

    #[test]
    fn no_problem_loaded() {
        let mut simulator = Simulator::new(None, Some(0));
        let err = simulator.step(&GroundAction::new("move", &[])).unwrap_err();
        assert_eq!(err.kind, ErrorKind::NoProblem);
    }

    #[test]
    fn timeout_leaves_state_alone() {
        let mut simulator = Simulator::new(Some(Duration::ZERO), Some(0));
        let initial = simulator.reset(move_problem());
        simulator.start();
        assert_eq!(simulator.remaining(), Some(Duration::ZERO));
        let result = simulator.step(&GroundAction::new("move", &[])).unwrap();
        assert!(result.timed_out);
        assert!(!result.done);
        assert_eq!(result.state, initial);
        assert!(simulator.history().is_empty());
    }

    #[test]
    fn rewards_accumulate() {
        let mut simulator = Simulator::new(None, Some(11));
        simulator.reset(coin_problem());
        simulator.start();
        let flip = GroundAction::new("flip", &[]);
        let mut steps = 0;
        loop {
            steps += 1;
            let result = simulator.step(&flip).unwrap();
            if result.done {
                // one unit per flip, ten for reaching the goal
                assert_eq!(result.state.reward, 10.0 - steps as f64);
                break;
            }
            assert_eq!(result.state.reward, -(steps as f64));
            assert!(steps < 100);
        }
    }
}
