use std::{
    fs,
    path::{Path, PathBuf},
    process::ExitCode,
    sync::Arc,
};

use clap::{Parser, Subcommand};
use tracing::{error, warn};
use tracing_subscriber::{fmt, EnvFilter};

use ppddl_rs::{
    agents::{Agent, HindsightAgent, SimpleDeterminizerAgent},
    config::{AgentKind, Config},
    determinization::{Determinizer, Strategy},
    parse_domain, parse_problem,
    pddl::Problem,
    planner::CommandPlanner,
    simulation::Simulator,
    Error, ErrorKind, ReportPrinter, Sources,
};

#[derive(Parser)]
#[command(name = "ppddl", about = "Determinize and play PPDDL problems", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the original, preprocessed and determinized domain and the
    /// determinized problem.
    Determinize {
        domain: PathBuf,
        problem: PathBuf,
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Run an agent against the simulator with an external planner.
    Run {
        domain: PathBuf,
        problem: PathBuf,
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn read(path: &Path) -> Result<String, Error> {
    fs::read_to_string(path)
        .map_err(|e| Error::new(ErrorKind::Io(format!("{}: {}", path.display(), e))))
}

fn load(domain_path: &Path, problem_path: &Path) -> Result<Problem, Error> {
    let sources = Sources {
        domain_path: domain_path.display().to_string(),
        domain_src: read(domain_path)?,
        problem_path: problem_path.display().to_string(),
        problem_src: read(problem_path)?,
    };
    let domain = parse_domain(&sources.domain_src).print_report_on_err(&sources)?;
    parse_problem(&sources.problem_src, Arc::new(domain)).print_report_on_err(&sources)
}

fn load_config(path: Option<&Path>) -> Result<Config, Error> {
    match path {
        Some(path) => Config::from_path(path),
        None => Ok(Config::default()),
    }
}

fn determinize(domain: &Path, problem: &Path, config: Option<&Path>) -> Result<(), Error> {
    let config = load_config(config)?;
    let problem = load(domain, problem)?;
    let mut determinizer = Determinizer::from_config(&config.determinizer);
    determinizer.set_domain(problem.domain.clone())?;
    let determinized = determinizer.determinize(&problem)?;
    println!("; original\n{}", determinizer.original()?);
    println!("; preprocessed\n{}", determinizer.preprocessed()?);
    println!("; determinized\n{}", determinizer.determinized()?);
    println!("{}", determinized);
    Ok(())
}

fn run(domain: &Path, problem: &Path, config: Option<&Path>) -> Result<(), Error> {
    let config = load_config(config)?;
    let problem = load(domain, problem)?;
    let determinizer = Determinizer::from_config(&config.determinizer);
    let planner = CommandPlanner::new(&config.planner);
    let mut agent: Box<dyn Agent> = match config.agent {
        AgentKind::Simple => Box::new(SimpleDeterminizerAgent::new(problem, determinizer, planner)?),
        AgentKind::Hindsight => {
            if !matches!(determinizer.strategy(), Strategy::Hindsight { .. }) {
                warn!(strategy = ?determinizer.strategy(), "hindsight agent without a hindsight strategy");
            }
            Box::new(HindsightAgent::new(
                problem,
                determinizer,
                planner,
                config.hindsight.clone(),
                config.determinizer.seed,
            )?)
        }
    };
    let mut simulator = Simulator::from_config(&config.simulator);
    let report = agent.run(&mut simulator)?;
    println!(
        "status: {:?}\nsteps: {}\nelapsed: {:.3}s\nplanner calls: {}\nreward: {}\ntotal cost: {}",
        report.status,
        report.steps,
        report.elapsed.as_secs_f64(),
        agent.invocations(),
        report.state.reward,
        report.state.total_cost,
    );
    Ok(())
}

fn main() -> ExitCode {
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match &cli.command {
        Commands::Determinize {
            domain,
            problem,
            config,
        } => determinize(domain, problem, config.as_deref()),
        Commands::Run {
            domain,
            problem,
            config,
        } => run(domain, problem, config.as_deref()),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
