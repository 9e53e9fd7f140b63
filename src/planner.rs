//! Boundary to classical planners. A planner gets a deterministic problem
//! and a time limit and reports what happened; failures are data, not errors.
mod command;

use std::time::Duration;

pub use command::{parse_fd_output, parse_ff_output, CommandPlanner, ParsedPlan};

use crate::pddl::{GroundAction, Problem};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlanResult {
    pub plan_found: bool,
    /// The planner was stopped at its time limit.
    pub timeout: bool,
    pub plan: Vec<GroundAction>,
    pub total_cost: f64,
    /// Search time reported by the planner itself, in seconds.
    pub total_elapsed: Option<f64>,
    pub wall_time: Duration,
    pub stdout: String,
    pub stderr: String,
}

impl PlanResult {
    pub fn found(plan: Vec<GroundAction>, total_cost: f64, wall_time: Duration) -> Self {
        Self {
            plan_found: true,
            plan,
            total_cost,
            wall_time,
            ..Self::default()
        }
    }

    pub fn not_found(wall_time: Duration) -> Self {
        Self {
            wall_time,
            ..Self::default()
        }
    }

    pub fn timed_out(wall_time: Duration) -> Self {
        Self {
            timeout: true,
            wall_time,
            ..Self::default()
        }
    }
}

pub trait Planner {
    /// Solves `problem` within `timeout` (no limit when `None`). Blocks.
    fn plan(&mut self, problem: &Problem, timeout: Option<Duration>) -> PlanResult;
}

impl<P: Planner + ?Sized> Planner for Box<P> {
    fn plan(&mut self, problem: &Problem, timeout: Option<Duration>) -> PlanResult {
        (**self).plan(problem, timeout)
    }
}
