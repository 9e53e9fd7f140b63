//! Rewrites probabilistic domains into classical ones.
//!
//! A [`Determinizer`] holds three versions of a domain: the original, a
//! preprocessed copy in which every action has a single top level
//! distribution of deterministic outcomes, and the determinized copy produced
//! by the configured [`Strategy`]. Every determinized action variant carries an
//! [`OutcomeTag`] naming the base action and outcome it commits to, so plans
//! over the determinized domain can be mapped back without parsing names.
mod all_outcome;
mod alpha_cost;
mod hindsight;
mod single_outcome;

use std::{collections::BTreeSet, sync::Arc};

use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    config::DeterminizerConfig,
    pddl::{
        Action, Domain, Effect, GroundAction, Metric, OutcomeTag, Problem, Requirement, EPSILON,
        REWARD, TOTAL_COST,
    },
    Error, ErrorKind,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Criterion {
    /// Most likely outcome.
    Mlo,
    /// Outcome with the most add effects.
    Mae,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HindsightMethod {
    /// One wheel position shared by every multi-outcome action.
    Global,
    /// An independent wheel position per action.
    Local,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Strategy {
    #[default]
    AllOutcome,
    SingleOutcome {
        criterion: Criterion,
    },
    AlphaCostLikelihood {
        alpha: f64,
        base: f64,
        /// Decimal places the likelihood cost is rounded to.
        round: Option<u32>,
    },
    Hindsight {
        method: HindsightMethod,
        wheel_size: usize,
        transform_rewards: bool,
    },
}

/// A determinized ground action traced back to the probabilistic model.
#[derive(Debug, Clone, PartialEq)]
pub struct OutcomeTrace {
    pub outcome: usize,
    pub probability: f64,
    pub base: GroundAction,
}

struct Versions {
    original: Arc<Domain>,
    preprocessed: Arc<Domain>,
    determinized: Arc<Domain>,
}

pub struct Determinizer {
    strategy: Strategy,
    rng: StdRng,
    versions: Option<Versions>,
}

impl Determinizer {
    pub fn new(strategy: Strategy, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            strategy,
            rng,
            versions: None,
        }
    }

    pub fn from_config(config: &DeterminizerConfig) -> Self {
        Self::new(config.strategy.clone(), config.seed)
    }

    pub fn strategy(&self) -> &Strategy {
        &self.strategy
    }

    /// Preprocesses and determinizes `domain`. Setting the domain that is
    /// already set is a no-op.
    pub fn set_domain(&mut self, domain: Arc<Domain>) -> Result<(), Error> {
        if let Some(versions) = &self.versions {
            if Arc::ptr_eq(&versions.original, &domain) {
                return Ok(());
            }
        }
        let preprocessed = preprocess(&domain)?;
        let determinized = match &self.strategy {
            Strategy::AllOutcome => all_outcome::determinize(&preprocessed),
            Strategy::SingleOutcome { criterion } => {
                single_outcome::determinize(&preprocessed, *criterion)
            }
            Strategy::AlphaCostLikelihood { alpha, base, round } => {
                alpha_cost::determinize(&preprocessed, *alpha, *base, *round)
            }
            Strategy::Hindsight {
                method,
                transform_rewards,
                ..
            } => hindsight::determinize(&preprocessed, *method, *transform_rewards),
        };
        info!(
            domain = %domain.name,
            actions = domain.actions.len(),
            variants = determinized.actions.len(),
            "determinized domain"
        );
        self.versions = Some(Versions {
            original: domain,
            preprocessed: Arc::new(preprocessed),
            determinized: Arc::new(determinized),
        });
        Ok(())
    }

    fn versions(&self) -> Result<&Versions, Error> {
        self.versions
            .as_ref()
            .ok_or_else(|| Error::new(ErrorKind::DomainNotSet))
    }

    pub fn original(&self) -> Result<&Arc<Domain>, Error> {
        Ok(&self.versions()?.original)
    }

    pub fn preprocessed(&self) -> Result<&Arc<Domain>, Error> {
        Ok(&self.versions()?.preprocessed)
    }

    pub fn determinized(&self) -> Result<&Arc<Domain>, Error> {
        Ok(&self.versions()?.determinized)
    }

    /// Predicate names of the original domain; states of determinized
    /// problems are projected onto them to drop bookkeeping facts.
    pub fn base_vocabulary(&self) -> Result<BTreeSet<String>, Error> {
        Ok(self.original()?.predicate_names())
    }

    /// Copy of `problem` over the determinized domain. Rewards are removed,
    /// costs are minimized when the domain has them and hindsight strategies
    /// draw a fresh wheel on every call.
    pub fn determinize(&mut self, problem: &Problem) -> Result<Problem, Error> {
        let versions = self
            .versions
            .as_ref()
            .ok_or_else(|| Error::new(ErrorKind::DomainNotSet))?;
        let domain = versions.determinized.clone();
        let mut result = problem.with_domain(domain.clone());
        result.goal.reward = None;
        result.init.functions.remove(&*REWARD);
        if domain.uses_costs() {
            result.init.functions.entry(TOTAL_COST.clone()).or_insert(0.0);
            result.goal.metric = Some(Metric::minimize_cost());
        } else {
            result.goal.metric = None;
        }
        if let Strategy::Hindsight {
            method, wheel_size, ..
        } = &self.strategy
        {
            hindsight::sample_wheel(
                &mut result,
                &versions.preprocessed,
                *method,
                *wheel_size,
                &mut self.rng,
            );
        }
        debug!(problem = %result.name, "determinized problem");
        Ok(result)
    }

    /// Maps a ground action of the determinized domain to its outcome index,
    /// outcome probability and base action. Actions without a recorded origin
    /// are their own base with probability one.
    pub fn process_action_tuple(&self, action: &GroundAction) -> Result<OutcomeTrace, Error> {
        let variant = self
            .determinized()?
            .action(&action.name)
            .ok_or_else(|| Error::new(ErrorKind::UndefinedAction(action.name.clone())))?;
        let Some(tag) = &variant.origin else {
            return Ok(OutcomeTrace {
                outcome: 0,
                probability: 1.0,
                base: action.clone(),
            });
        };
        if action.args.len() < tag.base_arity {
            return Err(Error::new(ErrorKind::ArityMismatch {
                name: action.name.clone(),
                expected: variant.parameters.len(),
                found: action.args.len(),
            }));
        }
        Ok(OutcomeTrace {
            outcome: tag.outcome,
            probability: tag.probability,
            base: GroundAction {
                name: tag.base.clone(),
                args: action.args[..tag.base_arity].to_vec(),
            },
        })
    }

    /// Probability that every step of `plan` gets the outcome the plan
    /// committed to, and the plan over base actions.
    pub fn process_plan_trace(
        &self,
        plan: &[GroundAction],
    ) -> Result<(f64, Vec<GroundAction>), Error> {
        let mut probability = 1.0;
        let mut base = Vec::with_capacity(plan.len());
        for action in plan {
            let trace = self.process_action_tuple(action)?;
            probability *= trace.probability;
            base.push(trace.base);
        }
        Ok((probability, base))
    }

    pub fn success_probability(&self, plan: &[GroundAction]) -> Result<f64, Error> {
        Ok(self.process_plan_trace(plan)?.0)
    }
}

/// Gives every action a single top level distribution over deterministic
/// outcomes. Actions with one certain outcome get it as a plain effect.
fn preprocess(domain: &Domain) -> Result<Domain, Error> {
    let actions = domain
        .actions
        .iter()
        .map(|action| {
            let outcomes = action.effect.expand_probabilistic_effects()?;
            let effect = match outcomes.as_slice() {
                [] => Effect::Empty,
                [(p, effect)] if *p >= 1.0 - EPSILON => effect.clone(),
                _ => Effect::probabilistic(outcomes)?,
            };
            Ok(Action {
                effect,
                ..action.clone()
            })
        })
        .collect::<Result<Vec<_>, Error>>()?;
    Ok(Domain {
        actions,
        ..domain.clone()
    })
}

/// Outcomes of a preprocessed action.
fn outcomes(action: &Action) -> Vec<(f64, Effect)> {
    match &action.effect {
        Effect::Probabilistic(d) => d.outcomes().to_vec(),
        effect => vec![(1.0, effect.clone())],
    }
}

/// Deterministic copy of `base` committed to one outcome, named
/// `<base>_o<outcome>`.
fn variant(base: &Action, outcome: usize, probability: f64, effect: Effect) -> Action {
    Action {
        name: format!("{}_o{}", base.name, outcome),
        parameters: base.parameters.clone(),
        precondition: base.precondition.clone(),
        effect,
        origin: Some(OutcomeTag {
            base: base.name.clone(),
            outcome,
            probability,
            base_arity: base.parameters.len(),
        }),
    }
}

/// Copy of `preprocessed` with the given actions and without the MDP
/// features. `total-cost` is declared when an action pays cost.
fn classical_domain(preprocessed: &Domain, actions: Vec<Action>) -> Domain {
    let mut domain = Domain {
        actions,
        ..preprocessed.clone()
    };
    domain.requirements -= Requirement::mdp_features();
    domain.functions.retain(|f| f.name != REWARD.name);
    let pays_cost = domain
        .actions
        .iter()
        .any(|a| a.effect.modified_functions().contains(&TOTAL_COST.name));
    if pays_cost && !domain.uses_costs() {
        domain.functions.push(TOTAL_COST.clone());
    }
    if domain.uses_costs() {
        domain.requirements.insert(Requirement::ActionCosts);
    }
    domain
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lib_tests::{blocks_problem, coin_problem};

    fn determinizer(strategy: Strategy, problem: &Problem) -> Determinizer {
        let mut determinizer = Determinizer::new(strategy, Some(3));
        determinizer.set_domain(problem.domain.clone()).unwrap();
        determinizer
    }

    #[test]
    fn domain_not_set() {
        let determinizer = Determinizer::new(Strategy::AllOutcome, Some(0));
        let err = determinizer.determinized().unwrap_err();
        assert_eq!(err.kind, ErrorKind::DomainNotSet);
    }

    #[test]
    fn preprocessing_flattens_distributions() {
        let problem = blocks_problem();
        let determinizer = determinizer(Strategy::AllOutcome, &problem);
        for action in &determinizer.preprocessed().unwrap().actions {
            let outcomes = outcomes(action);
            let mass: f64 = outcomes.iter().map(|(p, _)| p).sum();
            assert!((mass - 1.0).abs() < EPSILON, "{}", action.name);
            assert!(outcomes.iter().all(|(_, e)| !e.has_probabilistic()));
        }
        // the original domain is left alone
        assert_eq!(determinizer.original().unwrap(), &problem.domain);
    }

    #[test]
    fn determinized_problem_drops_rewards() {
        let problem = coin_problem();
        let mut determinizer = determinizer(Strategy::AllOutcome, &problem);
        let determinized = determinizer.determinize(&problem).unwrap();
        assert!(Arc::ptr_eq(
            &determinized.domain,
            determinizer.determinized().unwrap()
        ));
        assert_eq!(determinized.goal.reward, None);
        assert_eq!(determinized.goal.metric, None);
        assert!(!determinized
            .domain
            .requirements
            .contains(Requirement::ProbabilisticEffects));
        assert!(!determinized.domain.requirements.contains(Requirement::Rewards));
        for action in &determinized.domain.actions {
            assert!(!action.effect.modified_functions().contains(&REWARD.name));
        }
        // the input problem is untouched
        assert_eq!(problem.goal.reward, Some(10.0));
    }

    #[test]
    fn plan_trace_round_trip() {
        let problem = blocks_problem();
        let mut determinizer = determinizer(Strategy::AllOutcome, &problem);
        let determinized = determinizer.determinize(&problem).unwrap();
        let plan = vec![
            GroundAction::new("pick-up_o0", &["a"]),
            GroundAction::new("stack_o0", &["a", "b"]),
        ];
        let mut expected = 1.0;
        for action in &plan {
            let trace = determinizer.process_action_tuple(action).unwrap();
            let variant = determinized.ground(action).unwrap();
            let tag = variant.origin.unwrap();
            assert_eq!(trace.outcome, tag.outcome);
            assert_eq!(trace.base.name, tag.base);
            assert_eq!(trace.base.args, action.args);
            // the base action grounds in the original problem
            assert!(problem.ground(&trace.base).is_ok());
            expected *= trace.probability;
        }
        let (probability, base) = determinizer.process_plan_trace(&plan).unwrap();
        assert_eq!(probability, expected);
        assert!((probability - 0.75 * 0.9).abs() < EPSILON);
        assert_eq!(
            base,
            vec![
                GroundAction::new("pick-up", &["a"]),
                GroundAction::new("stack", &["a", "b"]),
            ]
        );
        assert_eq!(determinizer.success_probability(&plan).unwrap(), probability);
    }

    #[test]
    fn unknown_variant() {
        let problem = blocks_problem();
        let determinizer = determinizer(Strategy::AllOutcome, &problem);
        let err = determinizer
            .process_action_tuple(&GroundAction::new("fly", &[]))
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::UndefinedAction("fly".to_string()));
    }
}
