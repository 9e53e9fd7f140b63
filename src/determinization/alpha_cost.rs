use tracing::debug;

use super::{classical_domain, outcomes, variant};
use crate::pddl::{Action, Domain};

fn likelihood_cost(probability: f64, base: f64, round: Option<u32>) -> f64 {
    let cost = base - probability.ln();
    match round {
        Some(places) => {
            let scale = 10f64.powi(places as i32);
            (cost * scale).round() / scale
        }
        None => cost,
    }
}

/// One variant per outcome paying `base - ln(p)` on top of its rewards,
/// turned into costs and scaled by `alpha`. Outcomes that change nothing but
/// cost are dropped.
pub(super) fn determinize(preprocessed: &Domain, alpha: f64, base: f64, round: Option<u32>) -> Domain {
    let mut actions: Vec<Action> = Vec::new();
    for action in &preprocessed.actions {
        for (i, (p, effect)) in outcomes(action).into_iter().enumerate() {
            let effect = effect.transform_rewards_to_costs().scale_costs(alpha).simplify();
            if effect.without_costs().is_empty() {
                debug!(action = %action.name, outcome = i, "pruned cost-only outcome");
                continue;
            }
            let effect = effect.add_cost_offset(likelihood_cost(p, base, round));
            actions.push(variant(action, i, p, effect));
        }
    }
    classical_domain(preprocessed, actions)
}
