use super::{classical_domain, outcomes, variant, Criterion};
use crate::pddl::{Action, Domain, Effect};

/// Index of the outcome `criterion` prefers. The first of equally good
/// outcomes wins.
fn choose(outcomes: &[(f64, Effect)], criterion: Criterion) -> usize {
    let score = |(p, effect): &(f64, Effect)| match criterion {
        Criterion::Mlo => *p,
        Criterion::Mae => effect.count_additive_effects() as f64,
    };
    let mut best = 0;
    for (i, outcome) in outcomes.iter().enumerate().skip(1) {
        if score(outcome) > score(&outcomes[best]) {
            best = i;
        }
    }
    best
}

/// Keeps one outcome per action.
pub(super) fn determinize(preprocessed: &Domain, criterion: Criterion) -> Domain {
    let actions: Vec<Action> = preprocessed
        .actions
        .iter()
        .map(|action| {
            let outcomes = outcomes(action);
            let i = choose(&outcomes, criterion);
            let (p, effect) = &outcomes[i];
            variant(action, i, *p, effect.remove_reward_assignments().simplify())
        })
        .collect();
    classical_domain(preprocessed, actions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        determinization::{Determinizer, Strategy},
        lib_tests::blocks_problem,
        pddl::Functional,
    };

    fn add(name: &str) -> Effect {
        Effect::Add(Functional::ground(name, &[]))
    }

    #[test]
    fn most_likely_outcome() {
        let outcomes = vec![(0.2, add("a")), (0.5, add("b")), (0.3, add("c"))];
        assert_eq!(choose(&outcomes, Criterion::Mlo), 1);
    }

    #[test]
    fn ties_go_to_the_first_outcome() {
        let outcomes = vec![(0.1, add("a")), (0.45, add("b")), (0.45, add("c"))];
        assert_eq!(choose(&outcomes, Criterion::Mlo), 1);
        let outcomes = vec![(0.5, add("a")), (0.5, add("b"))];
        assert_eq!(choose(&outcomes, Criterion::Mlo), 0);
    }

    #[test]
    fn most_additive_effects() {
        let outcomes = vec![
            (0.9, add("a")),
            (0.05, Effect::And(vec![add("b"), add("c")])),
            (0.05, Effect::And(vec![add("d"), add("e")])),
        ];
        assert_eq!(choose(&outcomes, Criterion::Mae), 1);
    }

    #[test]
    fn one_variant_per_action() {
        let problem = blocks_problem();
        let mut determinizer = Determinizer::new(
            Strategy::SingleOutcome {
                criterion: Criterion::Mlo,
            },
            Some(0),
        );
        determinizer.set_domain(problem.domain.clone()).unwrap();
        let determinized = determinizer.determinized().unwrap();
        assert_eq!(determinized.actions.len(), problem.domain.actions.len());
        let pick_up = determinized.action("pick-up_o0").unwrap();
        assert_eq!(pick_up.origin.as_ref().unwrap().probability, 0.75);
        assert!(determinized.action("stack_o0").is_some());
    }
}
