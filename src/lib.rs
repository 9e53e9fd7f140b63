//! Probabilistic planning toolbox: a PPDDL model with an evaluator, domain
//! determinizers, a simulator and online replanning agents driving an
//! external classical planner.
pub mod agents;
pub mod config;
pub mod determinization;
pub mod parser;
pub mod pddl;
pub mod planner;
pub mod simulation;


use std::ops::Range;

use ariadne::{Color, Label, Report, ReportKind};
use enumset::EnumSet;

pub use parser::{parse_domain, parse_problem, Span};
use pddl::Requirement;

fn requirement_list(set: &EnumSet<Requirement>) -> String {
    set.iter()
        .map(|r| r.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ErrorKind {
    #[error("syntax error")]
    Syntax,
    #[error("expected `{0}`")]
    Tag(&'static str),
    #[error("expected `(`")]
    Parenthesis,
    #[error("unclosed parenthesis")]
    UnclosedParenthesis(usize),
    #[error("expected a name")]
    Name,
    #[error("expected a variable")]
    Variable,
    #[error("expected a number")]
    Number,
    #[error("expected a typed list")]
    TypedList,
    #[error("malformed goal description")]
    Query,
    #[error("malformed effect")]
    Effect,
    #[error("expected an action definition")]
    Action,
    #[error("trailing input after definition")]
    TrailingInput,
    #[error("requires one of {}", requirement_list(.0))]
    UnsetRequirement(EnumSet<Requirement>),
    #[error("problem is defined for domain `{0}`")]
    MissmatchedDomain(String),
    #[error("type `{0}` is defined more than once")]
    DuplicateType(String),
    #[error("object `{0}` is defined more than once")]
    DuplicateObject(String),
    #[error("predicate `{0}` is defined more than once")]
    DuplicatePredicate(String),
    #[error("first defined here")]
    FirstDefinedHere,
    #[error("type `{0}` is not defined")]
    UndefinedType(String),
    #[error("action `{0}` is not defined")]
    UndefinedAction(String),
    #[error("`{name}` expects {expected} argument(s), got {found}")]
    ArityMismatch {
        name: String,
        expected: usize,
        found: usize,
    },
    #[error("probabilistic outcomes sum to {0}, more than 1")]
    ProbabilityMass(f64),
    #[error("probability {0} is outside of [0, 1]")]
    Probability(f64),
    #[error("probabilistic effect nested under forall or when cannot be expanded")]
    NestedProbabilisticEffect,
    #[error("probabilistic effect must be expanded before it is applied")]
    UnresolvedProbabilisticEffect,
    #[error("action {0} is not applicable")]
    InapplicableAction(String),
    #[error("simulator has no problem loaded")]
    NoProblem,
    #[error("determinizer has no domain set")]
    DomainNotSet,
    #[error("configuration error: {0}")]
    Config(String),
    #[error("io error: {0}")]
    Io(String),
}

/// Crate-wide error. `span` points into the domain or problem source when the
/// error came from parsing, and is empty otherwise.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{kind}")]
pub struct Error {
    pub kind: ErrorKind,
    pub span: Span,
    #[source]
    pub chain: Option<Box<Error>>,
}

impl Error {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            span: Span::default(),
            chain: None,
        }
    }

    pub fn at(kind: ErrorKind, span: Span) -> Self {
        Self {
            kind,
            span,
            chain: None,
        }
    }

    pub fn chained(mut self, cause: Error) -> Self {
        self.chain = Some(Box::new(cause));
        self
    }

    /// Builds an `ariadne` report with one label per error in the chain.
    pub fn report(&self, sources: &Sources) -> Report<'static, (String, Range<usize>)> {
        let id = sources.id(self.span);
        let mut report = Report::build(ReportKind::Error, id.clone(), self.span.start)
            .with_message(self.kind.to_string())
            .with_label(
                Label::new((id, self.span.into()))
                    .with_message(self.kind.to_string())
                    .with_color(Color::Red),
            );
        let mut next = self.chain.as_deref();
        while let Some(cause) = next {
            report = report.with_label(
                Label::new((sources.id(cause.span), cause.span.into()))
                    .with_message(cause.kind.to_string())
                    .with_color(Color::Yellow),
            );
            next = cause.chain.as_deref();
        }
        report.finish()
    }
}

/// Domain and problem source text, used to render error reports.
#[derive(Debug, Clone, Default)]
pub struct Sources {
    pub domain_path: String,
    pub domain_src: String,
    pub problem_path: String,
    pub problem_src: String,
}

impl Sources {
    fn id(&self, span: Span) -> String {
        if span.is_problem {
            self.problem_path.clone()
        } else {
            self.domain_path.clone()
        }
    }
}

pub trait ReportPrinter<T> {
    /// Prints an error report to stderr and passes the result through.
    fn print_report_on_err(self, sources: &Sources) -> Result<T, Error>;
}

impl<T> ReportPrinter<T> for Result<T, Error> {
    fn print_report_on_err(self, sources: &Sources) -> Result<T, Error> {
        if let Err(e) = &self {
            let cache = ariadne::sources(vec![
                (sources.domain_path.clone(), sources.domain_src.clone()),
                (sources.problem_path.clone(), sources.problem_src.clone()),
            ]);
            if e.report(sources).eprint(cache).is_err() {
                eprintln!("{}", e);
            }
        }
        self
    }
}
