use std::{
    fs::File,
    io::{Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
    process::{Command, Stdio},
    thread,
    time::{Duration, Instant},
};

use nom::{
    bytes::complete::{tag, take_until},
    character::complete::{char, digit1, space0},
    combinator::opt,
    number::complete::double,
    sequence::{preceded, terminated, tuple},
};
use tracing::{debug, warn};

use super::{PlanResult, Planner};
use crate::{
    config::{PlannerConfig, PlannerKind},
    pddl::{GroundAction, Problem},
};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Plan, cost and self-reported search time scraped from planner output.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedPlan {
    pub plan: Vec<GroundAction>,
    pub total_cost: f64,
    pub elapsed: Option<f64>,
}

fn ground_action(words: &str) -> Option<GroundAction> {
    let mut words = words.split_whitespace().map(str::to_ascii_lowercase);
    let name = words.next()?;
    Some(GroundAction {
        name,
        args: words.collect(),
    })
}

/// `step    0: PICK-UP A` or `        1: STACK A B`
fn ff_step(line: &str) -> nom::IResult<&str, ()> {
    let (rest, _) = tuple((
        space0,
        opt(tag("step")),
        space0,
        digit1,
        char(':'),
        space0,
    ))(line)?;
    Ok((rest, ()))
}

/// `               0.01 seconds total time`
fn ff_total_time(line: &str) -> nom::IResult<&str, f64> {
    terminated(preceded(space0, double), tag(" seconds total time"))(line)
}

fn labelled_number<'a>(label: &'static str) -> impl FnMut(&'a str) -> nom::IResult<&'a str, f64> {
    preceded(tuple((space0, tag(label), space0)), double)
}

/// Parses FF's output. `None` when FF did not report a plan.
pub fn parse_ff_output(out: &str) -> Option<ParsedPlan> {
    let elapsed = out
        .lines()
        .find_map(|line| ff_total_time(line).ok().map(|(_, t)| t));
    if out.contains("The empty plan solves it") {
        return Some(ParsedPlan {
            plan: vec![],
            total_cost: 0.0,
            elapsed,
        });
    }
    let (body, _) =
        take_until::<_, _, nom::error::Error<&str>>("ff: found legal plan as follows")(out).ok()?;
    let mut plan = Vec::new();
    let mut total_cost = None;
    for line in body.lines().skip(1) {
        if let Ok((rest, ())) = ff_step(line) {
            plan.push(ground_action(rest)?);
        } else if let Ok((_, cost)) = labelled_number("plan cost:")(line) {
            total_cost = Some(cost);
            break;
        } else if line.contains("time spent") {
            break;
        }
    }
    Some(ParsedPlan {
        total_cost: total_cost.unwrap_or(plan.len() as f64),
        plan,
        elapsed,
    })
}

/// `pick-up_o0 b1 b4 (1)`, optionally behind a `[t=...]` log prefix.
fn fd_step(line: &str) -> Option<GroundAction> {
    let line = match line.trim_start().strip_prefix('[') {
        Some(rest) => rest.split_once(']')?.1,
        None => line,
    };
    let (words, cost) = line.trim().rsplit_once(' ')?;
    cost.strip_prefix('(')?
        .strip_suffix(')')?
        .parse::<f64>()
        .ok()?;
    ground_action(words)
}

/// Parses Fast Downward's output. `None` when no solution was found.
pub fn parse_fd_output(out: &str) -> Option<ParsedPlan> {
    let (body, _) = take_until::<_, _, nom::error::Error<&str>>("Solution found!")(out).ok()?;
    let mut plan = Vec::new();
    let mut total_cost = None;
    let mut elapsed = None;
    for line in body.lines().skip(1) {
        if let Ok((rest, t)) = labelled_number("Actual search time:")(line) {
            if rest.starts_with('s') {
                elapsed = Some(t);
            }
        } else if line.contains("Plan length:") {
            continue;
        } else if let Some(cost) = line
            .find("Plan cost:")
            .and_then(|at| labelled_number("Plan cost:")(&line[at..]).ok())
        {
            total_cost = Some(cost.1);
            break;
        } else if let Some(action) = fd_step(line) {
            plan.push(action);
        }
    }
    Some(ParsedPlan {
        total_cost: total_cost?,
        plan,
        elapsed,
    })
}

/// Runs FF or Fast Downward as a child process on temporary PDDL files.
#[derive(Debug, Clone)]
pub struct CommandPlanner {
    pub kind: PlannerKind,
    pub binary: PathBuf,
    pub args: Vec<String>,
    pub search: String,
}

impl CommandPlanner {
    pub fn new(config: &PlannerConfig) -> Self {
        Self {
            kind: config.kind,
            binary: config.binary.clone().unwrap_or_else(|| match config.kind {
                PlannerKind::Ff => PathBuf::from("ff"),
                PlannerKind::FastDownward => PathBuf::from("fast-downward.py"),
            }),
            args: config.args.clone(),
            search: config.search.clone(),
        }
    }

    fn command_args(&self, domain: &Path, problem: &Path) -> Vec<String> {
        let domain = domain.display().to_string();
        let problem = problem.display().to_string();
        let mut args = match self.kind {
            PlannerKind::Ff => vec!["-o".to_string(), domain, "-f".to_string(), problem],
            PlannerKind::FastDownward => {
                vec![domain, problem, "--search".to_string(), self.search.clone()]
            }
        };
        args.extend(self.args.iter().cloned());
        args
    }

    fn run(
        &self,
        problem: &Problem,
        timeout: Option<Duration>,
        started: Instant,
    ) -> std::io::Result<PlanResult> {
        let workdir = tempfile::tempdir()?;
        let mut domain_file = tempfile::Builder::new()
            .prefix("domain")
            .suffix(".pddl")
            .tempfile_in(workdir.path())?;
        write!(domain_file, "{}", problem.domain)?;
        domain_file.flush()?;
        let mut problem_file = tempfile::Builder::new()
            .prefix("problem")
            .suffix(".pddl")
            .tempfile_in(workdir.path())?;
        write!(problem_file, "{}", problem)?;
        problem_file.flush()?;

        let mut stdout_file = tempfile::tempfile()?;
        let mut stderr_file = tempfile::tempfile()?;
        let mut child = Command::new(&self.binary)
            .args(self.command_args(domain_file.path(), problem_file.path()))
            .current_dir(workdir.path())
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout_file.try_clone()?))
            .stderr(Stdio::from(stderr_file.try_clone()?))
            .spawn()?;

        let status = loop {
            if let Some(status) = child.try_wait()? {
                break Some(status);
            }
            if timeout.map_or(false, |limit| started.elapsed() >= limit) {
                // the child may exit between the poll and the kill
                let _ = child.kill();
                child.wait()?;
                break None;
            }
            thread::sleep(POLL_INTERVAL);
        };

        let stdout = read_back(&mut stdout_file)?;
        let stderr = read_back(&mut stderr_file)?;
        let wall_time = started.elapsed();
        let mut result = match status {
            None => PlanResult::timed_out(wall_time),
            Some(status) => {
                let parsed = match self.kind {
                    PlannerKind::Ff => parse_ff_output(&stdout),
                    PlannerKind::FastDownward => parse_fd_output(&stdout),
                };
                match parsed {
                    Some(parsed) if status.success() => PlanResult {
                        total_elapsed: parsed.elapsed,
                        ..PlanResult::found(parsed.plan, parsed.total_cost, wall_time)
                    },
                    _ => PlanResult::not_found(wall_time),
                }
            }
        };
        result.stdout = stdout;
        result.stderr = stderr;
        Ok(result)
    }
}

fn read_back(file: &mut File) -> std::io::Result<String> {
    let mut text = String::new();
    file.seek(SeekFrom::Start(0))?;
    file.read_to_string(&mut text)?;
    Ok(text)
}

impl Planner for CommandPlanner {
    fn plan(&mut self, problem: &Problem, timeout: Option<Duration>) -> PlanResult {
        let started = Instant::now();
        let result = self.run(problem, timeout, started).unwrap_or_else(|e| {
            warn!(binary = %self.binary.display(), error = %e, "planner could not be run");
            PlanResult {
                stderr: e.to_string(),
                ..PlanResult::not_found(started.elapsed())
            }
        });
        debug!(
            problem = %problem.name,
            found = result.plan_found,
            timeout = result.timeout,
            steps = result.plan.len(),
            wall_time = ?result.wall_time,
            "planner finished"
        );
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FF_OUT: &str = "\
ff: parsing domain file
ff: found legal plan as follows

step    0: PICK-UP_O0 A
        1: STACK_O1 A B

plan cost: 2.000000

time spent:    0.00 seconds instantiating 12 easy, 0 hard action templates
               0.01 seconds total time
";

    const FD_OUT: &str = "\
Solving...
Solution found!
Actual search time: 0.000454614s [t=0.00246033s]
pick-up_o0 b1 b4 (0)
put-down_o1 b4 (51)
Plan length: 2 step(s).
Plan cost: 51
";

    #[test]
    fn ff_plan() {
        let parsed = parse_ff_output(FF_OUT).unwrap();
        assert_eq!(
            parsed.plan,
            vec![
                GroundAction::new("pick-up_o0", &["a"]),
                GroundAction::new("stack_o1", &["a", "b"]),
            ]
        );
        assert_eq!(parsed.total_cost, 2.0);
        assert_eq!(parsed.elapsed, Some(0.01));
    }

    #[test]
    fn ff_without_plan() {
        assert!(parse_ff_output("ff: goal can be simplified to FALSE. No plan will solve it").is_none());
        let empty = parse_ff_output("ff: goal can be simplified to TRUE. The empty plan solves it").unwrap();
        assert!(empty.plan.is_empty());
    }

    #[test]
    fn fd_plan() {
        let parsed = parse_fd_output(FD_OUT).unwrap();
        assert_eq!(
            parsed.plan,
            vec![
                GroundAction::new("pick-up_o0", &["b1", "b4"]),
                GroundAction::new("put-down_o1", &["b4"]),
            ]
        );
        assert_eq!(parsed.total_cost, 51.0);
        assert_eq!(parsed.elapsed, Some(0.000454614));
    }

    #[test]
    fn fd_log_prefix() {
        assert_eq!(
            fd_step("[t=0.01s, 9876 KB] move_o0 a b (1)"),
            Some(GroundAction::new("move_o0", &["a", "b"]))
        );
        assert_eq!(fd_step("Search stopped without finding a solution."), None);
    }

    #[test]
    fn missing_binary_is_not_found() {
        use crate::lib_tests::blocks_problem;
        let mut planner = CommandPlanner {
            kind: PlannerKind::Ff,
            binary: PathBuf::from("/nonexistent/ff-binary"),
            args: vec![],
            search: String::new(),
        };
        let result = planner.plan(&blocks_problem(), Some(Duration::from_secs(1)));
        assert!(!result.plan_found);
        assert!(!result.timeout);
        assert!(!result.stderr.is_empty());
    }

    /// A planner stand-in: an executable shell script with `body`.
    #[cfg(unix)]
    fn script_planner(dir: &Path, body: &str) -> CommandPlanner {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join("planner.sh");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        CommandPlanner {
            kind: PlannerKind::Ff,
            binary: path,
            args: vec![],
            search: String::new(),
        }
    }

    #[cfg(unix)]
    #[test]
    fn slow_planner_is_stopped_at_the_limit() {
        use crate::lib_tests::blocks_problem;
        let dir = tempfile::tempdir().unwrap();
        let mut planner = script_planner(dir.path(), "exec sleep 5");
        let result = planner.plan(&blocks_problem(), Some(Duration::from_millis(200)));
        assert!(result.timeout);
        assert!(!result.plan_found);
        assert!(result.plan.is_empty());
        assert!(result.wall_time >= Duration::from_millis(200));
        assert!(result.wall_time < Duration::from_secs(5));
    }

    #[cfg(unix)]
    #[test]
    fn failing_planner_keeps_its_output() {
        use crate::lib_tests::blocks_problem;
        let dir = tempfile::tempdir().unwrap();
        let mut planner = script_planner(
            dir.path(),
            "echo 'found legal plan as follows'\necho 'step    0: PICK-UP A'\necho 'ff: out of memory' >&2\nexit 1",
        );
        let result = planner.plan(&blocks_problem(), Some(Duration::from_secs(5)));
        assert!(!result.plan_found);
        assert!(!result.timeout);
        assert!(result.stdout.contains("step    0: PICK-UP A"));
        assert_eq!(result.stderr.trim(), "ff: out of memory");
    }
}
