use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    hash::{Hash, Hasher},
    sync::Arc,
};

use indexmap::IndexMap;

use super::{Functional, Object, Substitution, Types, REWARD, TOTAL_COST};

/// Objects of a problem (domain constants included) indexed by type. An
/// object belongs to its declared type and to every ancestor of it.
#[derive(Debug, Default, PartialEq)]
pub struct Universe {
    all: Vec<Object>,
    by_type: IndexMap<String, Vec<Object>>,
}

impl Universe {
    pub fn new(objects: impl IntoIterator<Item = Object>, types: &Types) -> Self {
        let mut universe = Self::default();
        for object in objects {
            if universe.all.contains(&object) {
                continue;
            }
            if let Some(kind) = &object.kind {
                for ancestor in types.ancestors(kind) {
                    universe
                        .by_type
                        .entry(ancestor)
                        .or_default()
                        .push(object.clone());
                }
            }
            universe.all.push(object);
        }
        universe
    }

    pub fn objects(&self) -> &[Object] {
        &self.all
    }

    /// Objects usable for a parameter of the given type; untyped parameters
    /// and `object` range over everything.
    pub fn objects_of(&self, kind: Option<&str>) -> &[Object] {
        match kind {
            None | Some("object") => &self.all,
            Some(kind) => self.by_type.get(kind).map(Vec::as_slice).unwrap_or(&[]),
        }
    }

    /// Every assignment of objects to `params`, in declaration order.
    pub fn bindings(&self, params: &[Object]) -> Vec<Substitution> {
        let mut result = vec![Substitution::new()];
        for param in params {
            let candidates = self.objects_of(param.kind.as_deref());
            let mut next = Vec::with_capacity(result.len() * candidates.len());
            for sigma in &result {
                for object in candidates {
                    let mut extended = sigma.clone();
                    extended.insert(param.name.clone(), object.name.clone());
                    next.push(extended);
                }
            }
            result = next;
        }
        result
    }
}

/// Canonical cache key for a state: its set of true ground predicates.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StateKey(BTreeSet<Functional>);

impl StateKey {
    pub fn predicates(&self) -> &BTreeSet<Functional> {
        &self.0
    }
}

/// A set of true ground predicates, numeric fluent values and the
/// `total-cost`/`reward` bookkeeping. Equality and hashing only look at the
/// predicates.
#[derive(Debug, Clone)]
pub struct SymbolicState {
    predicates: BTreeSet<Functional>,
    functions: BTreeMap<Functional, f64>,
    pub total_cost: f64,
    pub reward: f64,
    universe: Arc<Universe>,
}

impl SymbolicState {
    /// `total-cost` and `reward` entries of `functions` go to the scalar fields.
    pub fn new(
        predicates: impl IntoIterator<Item = Functional>,
        functions: impl IntoIterator<Item = (Functional, f64)>,
        universe: Arc<Universe>,
    ) -> Self {
        let mut state = Self {
            predicates: predicates.into_iter().map(|p| p.strip_types()).collect(),
            functions: BTreeMap::new(),
            total_cost: 0.0,
            reward: 0.0,
            universe,
        };
        for (function, value) in functions {
            state.set_value(&function, value);
        }
        state
    }

    pub fn holds(&self, predicate: &Functional) -> bool {
        if predicate.name == "=" && predicate.args.len() == 2 {
            return predicate.args[0] == predicate.args[1];
        }
        self.predicates.contains(predicate)
    }

    /// Value of a numeric fluent; unset fluents read as 0.
    pub fn value(&self, function: &Functional) -> f64 {
        if *function == *TOTAL_COST {
            self.total_cost
        } else if *function == *REWARD {
            self.reward
        } else {
            self.functions.get(function).copied().unwrap_or(0.0)
        }
    }

    pub fn set_value(&mut self, function: &Functional, value: f64) {
        if *function == *TOTAL_COST {
            self.total_cost = value;
        } else if *function == *REWARD {
            self.reward = value;
        } else {
            self.functions.insert(function.strip_types(), value);
        }
    }

    pub fn add(&mut self, predicate: &Functional) {
        self.predicates.insert(predicate.strip_types());
    }

    pub fn delete(&mut self, predicate: &Functional) {
        self.predicates.remove(predicate);
    }

    pub fn predicates(&self) -> &BTreeSet<Functional> {
        &self.predicates
    }

    /// Numeric fluents other than `total-cost` and `reward`.
    pub fn functions(&self) -> &BTreeMap<Functional, f64> {
        &self.functions
    }

    pub fn universe(&self) -> &Arc<Universe> {
        &self.universe
    }

    pub fn key(&self) -> StateKey {
        StateKey(self.predicates.clone())
    }

    /// Drops every predicate whose name is not in `vocabulary`.
    pub fn project(&self, vocabulary: &BTreeSet<String>) -> Self {
        let mut projected = self.clone();
        projected
            .predicates
            .retain(|p| vocabulary.contains(&p.name));
        projected
    }
}

impl PartialEq for SymbolicState {
    fn eq(&self, other: &Self) -> bool {
        self.predicates == other.predicates
    }
}
impl Eq for SymbolicState {}

impl Hash for SymbolicState {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.predicates.hash(state)
    }
}

impl fmt::Display for SymbolicState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for predicate in &self.predicates {
            writeln!(f, "{}", predicate)?;
        }
        for (function, value) in &self.functions {
            writeln!(f, "{} = {}", function, value)?;
        }
        write!(f, "total-cost = {}, reward = {}", self.total_cost, self.reward)
    }
}
