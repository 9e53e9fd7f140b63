use std::{collections::BTreeSet, fmt};

use super::{
    fmt_number, fmt_typed_list, query::shadow, ArithmeticOp, Functional, Object, Query,
    Substitution, SymbolicState, EPSILON, REWARD, TOTAL_COST,
};
use crate::{Error, ErrorKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Assign,
    Increase,
    Decrease,
    ScaleUp,
    ScaleDown,
}

impl AssignOp {
    fn apply(self, current: f64, value: f64) -> f64 {
        match self {
            AssignOp::Assign => value,
            AssignOp::Increase => current + value,
            AssignOp::Decrease => current - value,
            AssignOp::ScaleUp => current * value,
            AssignOp::ScaleDown => current / value,
        }
    }

    pub fn keyword(self) -> &'static str {
        match self {
            AssignOp::Assign => "assign",
            AssignOp::Increase => "increase",
            AssignOp::Decrease => "decrease",
            AssignOp::ScaleUp => "scale-up",
            AssignOp::ScaleDown => "scale-down",
        }
    }
}

/// Outcomes of a probabilistic effect. The probabilities sum to at most one;
/// the missing mass is an implicit no-op outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct Distribution {
    outcomes: Vec<(f64, Effect)>,
}

impl Distribution {
    pub fn new(outcomes: Vec<(f64, Effect)>) -> Result<Self, Error> {
        if let Some((p, _)) = outcomes.iter().find(|(p, _)| !(0.0..=1.0 + EPSILON).contains(p)) {
            return Err(Error::new(ErrorKind::Probability(*p)));
        }
        let mass: f64 = outcomes.iter().map(|(p, _)| p).sum();
        if mass > 1.0 + EPSILON {
            return Err(Error::new(ErrorKind::ProbabilityMass(mass)));
        }
        Ok(Self { outcomes })
    }

    pub fn outcomes(&self) -> &[(f64, Effect)] {
        &self.outcomes
    }

    pub fn mass(&self) -> f64 {
        self.outcomes.iter().map(|(p, _)| p).sum()
    }

    fn map(&self, f: impl Fn(&Effect) -> Effect) -> Self {
        Self {
            outcomes: self.outcomes.iter().map(|(p, e)| (*p, f(e))).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Empty,
    Add(Functional),
    Delete(Functional),
    And(Vec<Effect>),
    Forall(Vec<Object>, Box<Effect>),
    Conditional(Query, Box<Effect>),
    Assignment(AssignOp, Functional, Query),
    Probabilistic(Distribution),
}

/// Changes collected against the pre-state before any of them is applied.
#[derive(Default)]
struct Changes {
    adds: Vec<Functional>,
    deletes: Vec<Functional>,
    assignments: Vec<(AssignOp, Functional, f64)>,
}

impl Effect {
    pub fn probabilistic(outcomes: Vec<(f64, Effect)>) -> Result<Self, Error> {
        Ok(Effect::Probabilistic(Distribution::new(outcomes)?))
    }

    fn cost(op: AssignOp, value: Query) -> Self {
        Effect::Assignment(op, TOTAL_COST.clone(), value)
    }

    fn collect(&self, pre: &SymbolicState, changes: &mut Changes) -> Result<(), Error> {
        match self {
            Effect::Empty => (),
            Effect::Add(p) => changes.adds.push(p.clone()),
            Effect::Delete(p) => changes.deletes.push(p.clone()),
            Effect::And(children) => {
                for child in children {
                    child.collect(pre, changes)?;
                }
            }
            Effect::Forall(variables, body) => {
                for sigma in pre.universe().bindings(variables) {
                    body.bind(&sigma).collect(pre, changes)?;
                }
            }
            Effect::Conditional(condition, body) => {
                if condition.holds(pre) {
                    body.collect(pre, changes)?;
                }
            }
            Effect::Assignment(op, function, value) => {
                changes
                    .assignments
                    .push((*op, function.clone(), value.eval(pre).as_number()));
            }
            Effect::Probabilistic(_) => {
                return Err(Error::new(ErrorKind::UnresolvedProbabilisticEffect))
            }
        }
        Ok(())
    }

    /// Applies a deterministic effect. Conditions and assigned values read the
    /// pre-state; deletes go before adds.
    pub fn apply(&self, state: &SymbolicState) -> Result<SymbolicState, Error> {
        let mut changes = Changes::default();
        self.collect(state, &mut changes)?;
        let mut next = state.clone();
        for p in &changes.deletes {
            next.delete(p);
        }
        for p in &changes.adds {
            next.add(p);
        }
        for (op, function, value) in &changes.assignments {
            let current = next.value(function);
            next.set_value(function, op.apply(current, *value));
        }
        Ok(next)
    }

    pub fn bind(&self, sigma: &Substitution) -> Self {
        match self {
            Effect::Empty => Effect::Empty,
            Effect::Add(p) => Effect::Add(p.bind(sigma)),
            Effect::Delete(p) => Effect::Delete(p.bind(sigma)),
            Effect::And(children) => Effect::And(children.iter().map(|e| e.bind(sigma)).collect()),
            Effect::Forall(variables, body) => Effect::Forall(
                variables.clone(),
                Box::new(body.bind(&shadow(sigma, variables))),
            ),
            Effect::Conditional(condition, body) => {
                Effect::Conditional(condition.bind(sigma), Box::new(body.bind(sigma)))
            }
            Effect::Assignment(op, function, value) => {
                Effect::Assignment(*op, function.bind(sigma), value.bind(sigma))
            }
            Effect::Probabilistic(d) => Effect::Probabilistic(d.map(|e| e.bind(sigma))),
        }
    }

    pub fn simplify(&self) -> Self {
        match self {
            Effect::And(children) => {
                let mut flat = Vec::with_capacity(children.len());
                for child in children.iter().map(Effect::simplify) {
                    match child {
                        Effect::Empty => (),
                        Effect::And(grandchildren) => flat.extend(grandchildren),
                        e => flat.push(e),
                    }
                }
                match flat.len() {
                    0 => Effect::Empty,
                    1 => flat.remove(0),
                    _ => Effect::And(flat),
                }
            }
            Effect::Forall(variables, body) => match body.simplify() {
                Effect::Empty => Effect::Empty,
                body => Effect::Forall(variables.clone(), Box::new(body)),
            },
            Effect::Conditional(condition, body) => {
                let condition = condition.simplify();
                match body.simplify() {
                    Effect::Empty => Effect::Empty,
                    _ if condition.is_false() => Effect::Empty,
                    body if condition == Query::Empty => body,
                    body => Effect::Conditional(condition, Box::new(body)),
                }
            }
            Effect::Assignment(op, function, value) => {
                let value = value.simplify();
                match (op, &value) {
                    (AssignOp::Increase | AssignOp::Decrease, Query::Constant(c)) if *c == 0.0 => {
                        Effect::Empty
                    }
                    (AssignOp::ScaleUp | AssignOp::ScaleDown, Query::Constant(c)) if *c == 1.0 => {
                        Effect::Empty
                    }
                    _ => Effect::Assignment(*op, function.clone(), value),
                }
            }
            Effect::Probabilistic(d) => {
                let outcomes: Vec<(f64, Effect)> = d
                    .outcomes
                    .iter()
                    .filter(|(p, _)| *p >= EPSILON)
                    .map(|(p, e)| (*p, e.simplify()))
                    .collect();
                if outcomes.iter().all(|(_, e)| *e == Effect::Empty) {
                    Effect::Empty
                } else if outcomes.len() == 1 && outcomes[0].0 >= 1.0 - EPSILON {
                    outcomes[0].1.clone()
                } else {
                    Effect::Probabilistic(Distribution { outcomes })
                }
            }
            Effect::Empty | Effect::Add(_) | Effect::Delete(_) => self.clone(),
        }
    }

    /// True when applying the effect never changes a state.
    pub fn is_empty(&self) -> bool {
        matches!(self.simplify(), Effect::Empty)
    }

    fn visit(&self, f: &mut impl FnMut(&Effect)) {
        f(self);
        match self {
            Effect::And(children) => children.iter().for_each(|e| e.visit(f)),
            Effect::Forall(_, body) | Effect::Conditional(_, body) => body.visit(f),
            Effect::Probabilistic(d) => d.outcomes.iter().for_each(|(_, e)| e.visit(f)),
            _ => (),
        }
    }

    /// Names of the predicates the effect may add or delete.
    pub fn modified_predicates(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        self.visit(&mut |e| {
            if let Effect::Add(p) | Effect::Delete(p) = e {
                names.insert(p.name.clone());
            }
        });
        names
    }

    /// Names of the fluents the effect may assign.
    pub fn modified_functions(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        self.visit(&mut |e| {
            if let Effect::Assignment(_, function, _) = e {
                names.insert(function.name.clone());
            }
        });
        names
    }

    pub fn count_additive_effects(&self) -> usize {
        let mut count = 0;
        self.visit(&mut |e| {
            if let Effect::Add(_) = e {
                count += 1;
            }
        });
        count
    }

    pub fn has_probabilistic(&self) -> bool {
        let mut found = false;
        self.visit(&mut |e| found |= matches!(e, Effect::Probabilistic(_)));
        found
    }

    fn expand(&self) -> Result<Vec<(f64, Effect)>, Error> {
        match self {
            Effect::Probabilistic(d) => {
                let mut outcomes = Vec::new();
                for (p, effect) in &d.outcomes {
                    for (q, branch) in effect.expand()? {
                        outcomes.push((p * q, branch));
                    }
                }
                let remaining = 1.0 - d.mass();
                if remaining > EPSILON {
                    outcomes.push((remaining, Effect::Empty));
                }
                Ok(outcomes)
            }
            Effect::And(children) => {
                let mut product: Vec<(f64, Vec<Effect>)> = vec![(1.0, Vec::new())];
                for child in children {
                    let branches = child.expand()?;
                    let mut next = Vec::with_capacity(product.len() * branches.len());
                    for (p, effects) in &product {
                        for (q, branch) in &branches {
                            let mut combined = effects.clone();
                            combined.push(branch.clone());
                            next.push((p * q, combined));
                        }
                    }
                    product = next;
                }
                Ok(product
                    .into_iter()
                    .map(|(p, effects)| (p, Effect::And(effects).simplify()))
                    .collect())
            }
            Effect::Forall(_, body) | Effect::Conditional(_, body) if body.has_probabilistic() => {
                Err(Error::new(ErrorKind::NestedProbabilisticEffect))
            }
            _ => Ok(vec![(1.0, self.clone())]),
        }
    }

    /// Flattens nested and conjoined probabilistic effects into a single
    /// distribution of deterministic outcomes. Missing mass becomes an
    /// explicit `Empty` outcome. Negligible outcomes are dropped and their
    /// mass goes to the `Empty` outcome.
    pub fn expand_probabilistic_effects(&self) -> Result<Vec<(f64, Effect)>, Error> {
        let (mut kept, dropped): (Vec<_>, Vec<_>) =
            self.expand()?.into_iter().partition(|(p, _)| *p >= EPSILON);
        let negligible: f64 = dropped.iter().map(|(p, _)| p).sum();
        if negligible > 0.0 {
            match kept.iter_mut().find(|(_, e)| *e == Effect::Empty) {
                Some((p, _)) => *p += negligible,
                None if negligible >= EPSILON => kept.push((negligible, Effect::Empty)),
                None => (),
            }
        }
        Ok(kept)
    }

    fn map_assignments(&self, f: &impl Fn(AssignOp, &Functional, &Query) -> Effect) -> Self {
        match self {
            Effect::Assignment(op, function, value) => f(*op, function, value),
            Effect::And(children) => {
                Effect::And(children.iter().map(|e| e.map_assignments(f)).collect())
            }
            Effect::Forall(variables, body) => {
                Effect::Forall(variables.clone(), Box::new(body.map_assignments(f)))
            }
            Effect::Conditional(condition, body) => {
                Effect::Conditional(condition.clone(), Box::new(body.map_assignments(f)))
            }
            Effect::Probabilistic(d) => Effect::Probabilistic(d.map(|e| e.map_assignments(f))),
            Effect::Empty | Effect::Add(_) | Effect::Delete(_) => self.clone(),
        }
    }

    /// Earning reward becomes paying negative cost and losing reward becomes
    /// paying cost. Other reward assignments are dropped.
    pub fn transform_rewards_to_costs(&self) -> Self {
        self.map_assignments(&|op, function, value| {
            if *function != *REWARD {
                return Effect::Assignment(op, function.clone(), value.clone());
            }
            match op {
                AssignOp::Increase => Effect::cost(AssignOp::Decrease, value.clone()),
                AssignOp::Decrease => Effect::cost(AssignOp::Increase, value.clone()),
                _ => Effect::Empty,
            }
        })
    }

    pub fn remove_reward_assignments(&self) -> Self {
        self.map_assignments(&|op, function, value| {
            if *function == *REWARD {
                Effect::Empty
            } else {
                Effect::Assignment(op, function.clone(), value.clone())
            }
        })
    }

    /// Multiplies every increase or decrease of `total-cost` by `factor`.
    pub fn scale_costs(&self, factor: f64) -> Self {
        self.map_assignments(&|op, function, value| match op {
            AssignOp::Increase | AssignOp::Decrease if *function == *TOTAL_COST => {
                Effect::cost(
                    op,
                    Query::Arithmetic(
                        ArithmeticOp::Mul,
                        Box::new(Query::Constant(factor)),
                        Box::new(value.clone()),
                    )
                    .simplify(),
                )
            }
            _ => Effect::Assignment(op, function.clone(), value.clone()),
        })
    }

    pub fn without_costs(&self) -> Self {
        self.map_assignments(&|op, function, value| {
            if *function == *TOTAL_COST {
                Effect::Empty
            } else {
                Effect::Assignment(op, function.clone(), value.clone())
            }
        })
    }

    /// Conjoins `(increase (total-cost) offset)`, unless the offset is zero.
    pub fn add_cost_offset(&self, offset: f64) -> Self {
        if offset == 0.0 {
            return self.clone();
        }
        Effect::And(vec![
            self.clone(),
            Effect::cost(AssignOp::Increase, Query::Constant(offset)),
        ])
        .simplify()
    }
}

impl fmt::Display for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Effect::Empty => write!(f, "(and)"),
            Effect::Add(p) => write!(f, "{}", p),
            Effect::Delete(p) => write!(f, "(not {})", p),
            Effect::And(children) => {
                write!(f, "(and")?;
                for child in children {
                    write!(f, " {}", child)?;
                }
                write!(f, ")")
            }
            Effect::Forall(variables, body) => {
                write!(f, "(forall (")?;
                fmt_typed_list(f, variables)?;
                write!(f, ") {})", body)
            }
            Effect::Conditional(condition, body) => write!(f, "(when {} {})", condition, body),
            Effect::Assignment(op, function, value) => {
                write!(f, "({} {} {})", op.keyword(), function, value)
            }
            Effect::Probabilistic(d) => {
                write!(f, "(probabilistic")?;
                for (p, e) in &d.outcomes {
                    write!(f, " ")?;
                    fmt_number(f, *p)?;
                    write!(f, " {}", e)?;
                }
                write!(f, ")")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pddl::Universe;
    use std::sync::Arc;

    fn add(name: &str) -> Effect {
        Effect::Add(Functional::ground(name, &[]))
    }

    fn fact(name: &str) -> Functional {
        Functional::ground(name, &[])
    }

    fn state(facts: &[&str]) -> SymbolicState {
        SymbolicState::new(
            facts.iter().map(|f| fact(f)),
            vec![],
            Arc::new(Universe::default()),
        )
    }

    #[test]
    fn excess_mass_is_rejected() {
        let err = Effect::probabilistic(vec![(0.7, add("a")), (0.4, add("b"))]).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::ProbabilityMass(_)));
        assert!(Effect::probabilistic(vec![(0.5, add("a")), (0.5000001, add("b"))]).is_ok());
    }

    #[test]
    fn apply_reads_pre_state() {
        let effect = Effect::And(vec![
            Effect::Delete(fact("p")),
            Effect::Add(fact("q")),
            Effect::Conditional(Query::Predicate(fact("q")), Box::new(add("r"))),
            Effect::Assignment(AssignOp::Increase, TOTAL_COST.clone(), Query::Constant(2.0)),
        ]);
        let next = effect.apply(&state(&["p"])).unwrap();
        assert!(next.holds(&fact("q")));
        assert!(!next.holds(&fact("p")));
        assert!(!next.holds(&fact("r")));
        assert_eq!(next.total_cost, 2.0);
    }

    #[test]
    fn add_wins_over_delete() {
        let effect = Effect::And(vec![Effect::Add(fact("p")), Effect::Delete(fact("p"))]);
        assert!(effect.apply(&state(&["p"])).unwrap().holds(&fact("p")));
    }

    #[test]
    fn unresolved_probabilistic_effect() {
        let effect = Effect::probabilistic(vec![(1.0, add("a"))]).unwrap();
        assert!(effect.apply(&state(&[])).is_err());
    }

    #[test]
    fn expansion_pads_missing_mass() {
        let effect = Effect::probabilistic(vec![(0.9, add("a"))]).unwrap();
        let outcomes = effect.expand_probabilistic_effects().unwrap();
        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0], (0.9, add("a")));
        assert!((outcomes[1].0 - 0.1).abs() < EPSILON);
        assert_eq!(outcomes[1].1, Effect::Empty);
    }

    #[test]
    fn expansion_multiplies_conjoined_branches() {
        let effect = Effect::And(vec![
            add("base"),
            Effect::probabilistic(vec![(0.5, add("a")), (0.5, add("b"))]).unwrap(),
            Effect::probabilistic(vec![
                (0.2, Effect::probabilistic(vec![(0.5, add("c"))]).unwrap()),
                (0.8, Effect::Empty),
            ])
            .unwrap(),
        ]);
        let outcomes = effect.expand_probabilistic_effects().unwrap();
        let total: f64 = outcomes.iter().map(|(p, _)| p).sum();
        assert!((total - 1.0).abs() < EPSILON);
        assert_eq!(outcomes.len(), 6);
        assert_eq!(outcomes[0].1, Effect::And(vec![add("base"), add("a"), add("c")]));
        assert!((outcomes[0].0 - 0.05).abs() < EPSILON);
        assert!(outcomes.iter().all(|(_, e)| !e.has_probabilistic()));
    }

    #[test]
    fn expansion_drops_negligible_outcomes() {
        let effect =
            Effect::probabilistic(vec![(1e-8, add("a")), (1.0 - 1e-8, add("b"))]).unwrap();
        let outcomes = effect.expand_probabilistic_effects().unwrap();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].1, add("b"));
    }

    #[test]
    fn negligible_mass_goes_to_the_no_op() {
        let effect = Effect::probabilistic(vec![
            (1.0 - 2.7e-6, add("a")),
            (9e-7, add("b")),
            (9e-7, add("c")),
            (9e-7, add("d")),
        ])
        .unwrap();
        let outcomes = effect.expand_probabilistic_effects().unwrap();
        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].1, add("a"));
        assert_eq!(outcomes[1].1, Effect::Empty);
        assert!((outcomes[1].0 - 2.7e-6).abs() < 1e-12);
        let total: f64 = outcomes.iter().map(|(p, _)| p).sum();
        assert!((total - 1.0).abs() < 1e-12);

        // folded into an existing no-op outcome
        let effect = Effect::probabilistic(vec![(0.5, add("a")), (9e-7, add("b"))]).unwrap();
        let outcomes = effect.expand_probabilistic_effects().unwrap();
        assert_eq!(outcomes.len(), 2);
        assert!((outcomes[1].0 - 0.5).abs() < 1e-12);
        assert_eq!(outcomes[1].1, Effect::Empty);
    }

    #[test]
    fn nested_under_forall_is_an_error() {
        let effect = Effect::Forall(
            vec![Object::untyped("?x")],
            Box::new(Effect::probabilistic(vec![(0.5, add("a"))]).unwrap()),
        );
        let err = effect.expand_probabilistic_effects().unwrap_err();
        assert_eq!(err.kind, ErrorKind::NestedProbabilisticEffect);
    }

    #[test]
    fn rewards_become_costs() {
        let effect = Effect::And(vec![
            add("a"),
            Effect::Assignment(AssignOp::Increase, REWARD.clone(), Query::Constant(5.0)),
            Effect::Assignment(AssignOp::Decrease, REWARD.clone(), Query::Constant(2.0)),
        ]);
        assert_eq!(
            effect.transform_rewards_to_costs().to_string(),
            "(and (a) (decrease (total-cost) 5) (increase (total-cost) 2))"
        );
        assert_eq!(effect.remove_reward_assignments().simplify(), add("a"));
    }

    #[test]
    fn cost_rewrites() {
        let effect = Effect::And(vec![
            add("a"),
            Effect::Assignment(AssignOp::Increase, TOTAL_COST.clone(), Query::Constant(4.0)),
        ]);
        assert_eq!(
            effect.scale_costs(0.5).to_string(),
            "(and (a) (increase (total-cost) 2))"
        );
        assert!(effect.scale_costs(0.0).without_costs().simplify() == add("a"));
        assert!(Effect::Empty.add_cost_offset(1.5).without_costs().is_empty());
        assert_eq!(add("a").add_cost_offset(0.0), add("a"));
    }

    #[test]
    fn write_sets() {
        let effect = Effect::And(vec![
            add("a"),
            Effect::Delete(fact("b")),
            Effect::probabilistic(vec![(0.5, add("c")), (0.5, add("a"))]).unwrap(),
            Effect::Assignment(AssignOp::Assign, Functional::ground("fuel", &[]), Query::Constant(1.0)),
        ]);
        assert_eq!(
            effect.modified_predicates().into_iter().collect::<Vec<_>>(),
            vec!["a", "b", "c"]
        );
        assert_eq!(
            effect.modified_functions().into_iter().collect::<Vec<_>>(),
            vec!["fuel"]
        );
        assert_eq!(effect.count_additive_effects(), 3);
    }

    #[test]
    fn simplify_prunes_no_ops() {
        let effect = Effect::And(vec![
            Effect::Assignment(AssignOp::Increase, TOTAL_COST.clone(), Query::Constant(0.0)),
            Effect::Assignment(AssignOp::ScaleUp, Functional::ground("f", &[]), Query::Constant(1.0)),
            Effect::Conditional(Query::falsity(), Box::new(add("a"))),
            Effect::And(vec![Effect::Empty]),
        ]);
        assert!(effect.is_empty());
    }
}
