use super::{classical_domain, outcomes, variant};
use crate::pddl::{Action, Domain};

/// One deterministic variant per outcome of every action.
pub(super) fn determinize(preprocessed: &Domain) -> Domain {
    let actions: Vec<Action> = preprocessed
        .actions
        .iter()
        .flat_map(|action| {
            outcomes(action)
                .into_iter()
                .enumerate()
                .map(|(i, (p, effect))| {
                    variant(action, i, p, effect.remove_reward_assignments().simplify())
                })
                .collect::<Vec<_>>()
        })
        .collect();
    classical_domain(preprocessed, actions)
}

#[cfg(test)]
mod tests {
    use crate::{
        determinization::{Determinizer, Strategy},
        lib_tests::{blocks_problem, move_problem},
        pddl::{Effect, EPSILON},
    };

    #[test]
    fn one_variant_per_outcome() {
        let problem = blocks_problem();
        let mut determinizer = Determinizer::new(Strategy::AllOutcome, Some(0));
        determinizer.set_domain(problem.domain.clone()).unwrap();
        let preprocessed = determinizer.preprocessed().unwrap().clone();
        let determinized = determinizer.determinized().unwrap();

        let mut expected = 0;
        for action in &preprocessed.actions {
            let outcomes = action.effect.expand_probabilistic_effects().unwrap();
            for (i, (p, effect)) in outcomes.iter().enumerate() {
                assert!(*p > EPSILON);
                let name = format!("{}_o{}", action.name, i);
                let variant = determinized.action(&name).unwrap();
                assert_eq!(variant.effect, effect.simplify());
                assert_eq!(variant.precondition, action.precondition);
                let tag = variant.origin.as_ref().unwrap();
                assert_eq!(tag.outcome, i);
                assert_eq!(tag.probability, *p);
                expected += 1;
            }
        }
        assert_eq!(determinized.actions.len(), expected);
        assert!(determinized.actions.iter().all(|a| !a.effect.has_probabilistic()));
    }

    #[test]
    fn move_has_two_variants() {
        let problem = move_problem();
        let mut determinizer = Determinizer::new(Strategy::AllOutcome, Some(0));
        determinizer.set_domain(problem.domain.clone()).unwrap();
        let names: Vec<&str> = determinizer
            .determinized()
            .unwrap()
            .actions
            .iter()
            .map(|a| a.name.as_str())
            .collect();
        assert_eq!(names, vec!["move_o0", "move_o1"]);
        let failure = determinizer.determinized().unwrap().action("move_o1").unwrap();
        assert_eq!(failure.effect, Effect::Empty);
    }
}
