use std::{collections::BTreeSet, fmt};

use enumset::EnumSet;
use indexmap::IndexMap;

use super::{fmt_typed_list, Action, Functional, Object, Requirement, REWARD, TOTAL_COST};

/// Type hierarchy as a child to parent map, in declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Types {
    parents: IndexMap<String, String>,
}

impl Types {
    pub fn insert(&mut self, child: impl Into<String>, parent: impl Into<String>) {
        self.parents.insert(child.into(), parent.into());
    }

    pub fn contains(&self, kind: &str) -> bool {
        kind == "object" || self.parents.contains_key(kind)
    }

    pub fn parent(&self, kind: &str) -> Option<&str> {
        self.parents.get(kind).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.parents.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.parents.iter().map(|(c, p)| (c.as_str(), p.as_str()))
    }

    /// `kind` followed by its ancestors, nearest first.
    pub fn ancestors(&self, kind: &str) -> Vec<String> {
        let mut chain = vec![kind.to_string()];
        let mut current = kind;
        while let Some(parent) = self.parent(current) {
            if chain.iter().any(|k| k == parent) {
                break;
            }
            chain.push(parent.to_string());
            current = parent;
        }
        chain
    }

    pub fn is_subtype(&self, kind: &str, ancestor: &str) -> bool {
        ancestor == "object" || self.ancestors(kind).iter().any(|k| k == ancestor)
    }
}

impl fmt::Display for Types {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let objects: Vec<Object> = self
            .parents
            .iter()
            .map(|(child, parent)| Object::new(child.clone(), Some(parent)))
            .collect();
        fmt_typed_list(f, &objects)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Domain {
    pub name: String,
    pub requirements: EnumSet<Requirement>,
    pub types: Types,
    pub constants: Vec<Object>,
    pub predicates: Vec<Functional>,
    pub functions: Vec<Functional>,
    pub actions: Vec<Action>,
}

impl Domain {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            requirements: EnumSet::EMPTY,
            types: Types::default(),
            constants: Vec::new(),
            predicates: Vec::new(),
            functions: Vec::new(),
            actions: Vec::new(),
        }
    }

    pub fn action(&self, name: &str) -> Option<&Action> {
        self.actions.iter().find(|a| a.name == name)
    }

    pub fn predicate_names(&self) -> BTreeSet<String> {
        self.predicates.iter().map(|p| p.name.clone()).collect()
    }

    /// `reward` is implicitly declared by `:rewards`.
    pub fn declares_function(&self, name: &str) -> bool {
        self.functions.iter().any(|f| f.name == name)
            || (name == REWARD.name && self.requirements.contains(Requirement::Rewards))
    }

    pub fn uses_costs(&self) -> bool {
        self.declares_function(&TOTAL_COST.name)
    }

    /// Predicates no action ever adds or deletes.
    pub fn static_predicates(&self) -> Vec<&Functional> {
        let modified: BTreeSet<String> = self
            .actions
            .iter()
            .flat_map(|a| a.effect.modified_predicates())
            .collect();
        self.predicates
            .iter()
            .filter(|p| !modified.contains(&p.name))
            .collect()
    }

    /// Functions no action ever assigns.
    pub fn static_functions(&self) -> Vec<&Functional> {
        let modified: BTreeSet<String> = self
            .actions
            .iter()
            .flat_map(|a| a.effect.modified_functions())
            .collect();
        self.functions
            .iter()
            .filter(|f| !modified.contains(&f.name))
            .collect()
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "(define (domain {})", self.name)?;
        if !self.requirements.is_empty() {
            write!(f, "  (:requirements")?;
            for requirement in self.requirements.iter() {
                write!(f, " {}", requirement)?;
            }
            writeln!(f, ")")?;
        }
        if !self.types.is_empty() {
            writeln!(f, "  (:types {})", self.types)?;
        }
        if !self.constants.is_empty() {
            write!(f, "  (:constants ")?;
            fmt_typed_list(f, &self.constants)?;
            writeln!(f, ")")?;
        }
        if !self.predicates.is_empty() {
            write!(f, "  (:predicates")?;
            for predicate in &self.predicates {
                write!(f, " {}", predicate.declaration())?;
            }
            writeln!(f, ")")?;
        }
        if !self.functions.is_empty() {
            write!(f, "  (:functions")?;
            for function in &self.functions {
                write!(f, " {}", function.declaration())?;
            }
            writeln!(f, ")")?;
        }
        for action in &self.actions {
            writeln!(f, "{}", action)?;
        }
        write!(f, ")")
    }
}
