//! Hindsight determinization: outcomes are committed in advance on a cyclic
//! wheel of `hs-step` objects. Every variant of a multi-outcome action is
//! gated on the wheel position its token points at and on the outcome drawn
//! for that position, and moves the token one step on.
use rand::Rng;

use super::{classical_domain, outcomes, variant, HindsightMethod};
use crate::{
    pddl::{Action, Domain, Effect, Functional, Object, Problem, Query, Requirement},
    simulation::pick_outcome,
};

const STEP_TYPE: &str = "hs-step";
const NOW: &str = "hs-now";
const NEXT: &str = "hs-next";
const CURRENT: &str = "?hs-t";
const FOLLOWING: &str = "?hs-u";

fn step_name(index: usize) -> String {
    format!("hs-{}", index)
}

fn choice_predicate(action: &str, outcome: usize) -> String {
    format!("hs-{}-o{}", action, outcome)
}

/// Predicate holding the wheel position an action reads.
fn token_predicate(method: HindsightMethod, action: &str) -> String {
    match method {
        HindsightMethod::Global => NOW.to_string(),
        HindsightMethod::Local => format!("hs-{}-at", action),
    }
}

fn step_variable(name: &str) -> Object {
    Object::new(name, Some(STEP_TYPE))
}

fn atom(name: &str, args: &[&str]) -> Functional {
    Functional::new(name, args.iter().map(|a| Object::untyped(*a)).collect())
}

fn declaration(name: &str, arity: usize) -> Functional {
    let variables = [CURRENT, FOLLOWING];
    Functional::new(
        name,
        variables[..arity].iter().map(|v| step_variable(v)).collect(),
    )
}

/// Multi-outcome actions of a preprocessed domain with their outcome
/// probabilities.
fn wheeled_actions(preprocessed: &Domain) -> Vec<(&str, Vec<f64>)> {
    preprocessed
        .actions
        .iter()
        .filter_map(|action| {
            let outcomes = outcomes(action);
            (outcomes.len() > 1).then(|| {
                (
                    action.name.as_str(),
                    outcomes.iter().map(|(p, _)| *p).collect(),
                )
            })
        })
        .collect()
}

pub(super) fn determinize(
    preprocessed: &Domain,
    method: HindsightMethod,
    transform_rewards: bool,
) -> Domain {
    let rewrite = |effect: &Effect| {
        if transform_rewards {
            effect.transform_rewards_to_costs().simplify()
        } else {
            effect.remove_reward_assignments().simplify()
        }
    };
    let mut actions: Vec<Action> = Vec::new();
    let mut auxiliary: Vec<Functional> = Vec::new();
    for action in &preprocessed.actions {
        let outcomes = outcomes(action);
        if let [(p, effect)] = outcomes.as_slice() {
            actions.push(variant(action, 0, *p, rewrite(effect)));
            continue;
        }
        let token = token_predicate(method, &action.name);
        if method == HindsightMethod::Local {
            auxiliary.push(declaration(&token, 1));
        }
        for (i, (p, effect)) in outcomes.iter().enumerate() {
            let choice = choice_predicate(&action.name, i);
            auxiliary.push(declaration(&choice, 1));
            let mut wheeled = variant(
                action,
                i,
                *p,
                Effect::And(vec![
                    rewrite(effect),
                    Effect::Delete(atom(&token, &[CURRENT])),
                    Effect::Add(atom(&token, &[FOLLOWING])),
                ])
                .simplify(),
            );
            wheeled
                .parameters
                .extend([step_variable(CURRENT), step_variable(FOLLOWING)]);
            wheeled.precondition = Query::And(vec![
                wheeled.precondition,
                Query::Predicate(atom(&token, &[CURRENT])),
                Query::Predicate(atom(NEXT, &[CURRENT, FOLLOWING])),
                Query::Predicate(atom(&choice, &[CURRENT])),
            ])
            .simplify();
            actions.push(wheeled);
        }
    }

    let mut domain = classical_domain(preprocessed, actions);
    if !auxiliary.is_empty() {
        domain.requirements.insert(Requirement::Typing);
        domain.types.insert(STEP_TYPE, "object");
        domain.predicates.push(declaration(NEXT, 2));
        if method == HindsightMethod::Global {
            domain.predicates.push(declaration(NOW, 1));
        }
        domain.predicates.extend(auxiliary);
    }
    domain
}

/// Adds a freshly sampled wheel of `wheel_size` steps to a problem over the
/// hindsight domain: the step objects, their cyclic order, the starting
/// tokens and one drawn outcome per multi-outcome action and step.
pub(super) fn sample_wheel(
    problem: &mut Problem,
    preprocessed: &Domain,
    method: HindsightMethod,
    wheel_size: usize,
    rng: &mut impl Rng,
) {
    let wheeled = wheeled_actions(preprocessed);
    if wheeled.is_empty() {
        return;
    }
    let size = wheel_size.max(1);
    let steps: Vec<String> = (0..size).map(step_name).collect();
    problem
        .objects
        .extend(steps.iter().map(|s| Object::new(s.clone(), Some(STEP_TYPE))));

    let init = &mut problem.init.predicates;
    for (k, step) in steps.iter().enumerate() {
        init.insert(Functional::ground(
            NEXT,
            &[step.as_str(), steps[(k + 1) % size].as_str()],
        ));
    }
    match method {
        HindsightMethod::Global => {
            init.insert(Functional::ground(NOW, &[steps[0].as_str()]));
        }
        HindsightMethod::Local => {
            for (name, _) in &wheeled {
                init.insert(Functional::ground(
                    token_predicate(method, name),
                    &[steps[0].as_str()],
                ));
            }
        }
    }
    for (name, probabilities) in &wheeled {
        for step in &steps {
            let outcome = pick_outcome(probabilities, rng.gen());
            init.insert(Functional::ground(
                choice_predicate(name, outcome),
                &[step.as_str()],
            ));
        }
    }
}
