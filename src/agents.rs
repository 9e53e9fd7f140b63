//! Online agents: at every state they ask a classical planner for plans over
//! a determinized copy of the problem and pick the next action from them.
mod hindsight;
mod simple;

use std::time::Duration;

use tracing::info;

pub use hindsight::{intersect_plans, longest_prefix, HindsightAgent};
pub use simple::SimpleDeterminizerAgent;

use crate::{
    pddl::{GroundAction, Problem, SymbolicState},
    simulation::Simulator,
    Error,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Success,
    Timeout,
    /// The agent had no action for a non-goal state.
    PlanNotFound,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub status: RunStatus,
    pub elapsed: Duration,
    pub steps: usize,
    pub state: SymbolicState,
}

pub trait Agent {
    /// The probabilistic problem the agent acts in.
    fn problem(&self) -> &Problem;

    /// Planner calls made so far.
    fn invocations(&self) -> usize;

    /// Base action to execute in `state`, or `None` when the agent found no
    /// way to the goal. `remaining` is the time left before the deadline.
    fn next_action(
        &mut self,
        state: &SymbolicState,
        remaining: Option<Duration>,
    ) -> Result<Option<GroundAction>, Error>;

    /// Plays the agent's problem in `simulator` until the goal, the deadline
    /// or a state the agent has no action for.
    fn run(&mut self, simulator: &mut Simulator) -> Result<RunReport, Error> {
        let mut state = simulator.reset(self.problem().clone());
        simulator.start();
        let mut steps = 0;
        let status = loop {
            if self.problem().is_goal(&state) {
                break RunStatus::Success;
            }
            if simulator.timed_out() {
                break RunStatus::Timeout;
            }
            let Some(action) = self.next_action(&state, simulator.remaining())? else {
                break RunStatus::PlanNotFound;
            };
            let result = simulator.step(&action)?;
            if result.timed_out {
                break RunStatus::Timeout;
            }
            steps += 1;
            state = result.state;
        };
        info!(
            ?status,
            steps,
            elapsed = ?simulator.elapsed(),
            invocations = self.invocations(),
            reward = state.reward,
            "run finished"
        );
        Ok(RunReport {
            status,
            elapsed: simulator.elapsed(),
            steps,
            state,
        })
    }
}
