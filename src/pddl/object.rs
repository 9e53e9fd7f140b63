use std::{
    cmp::Ordering,
    fmt,
    hash::{Hash, Hasher},
};

use super::Substitution;

/// An object constant or a `?variable`, optionally typed. Identity is the
/// name alone.
#[derive(Debug, Clone)]
pub struct Object {
    pub name: String,
    pub kind: Option<String>,
}

impl Object {
    pub fn new(name: impl Into<String>, kind: Option<&str>) -> Self {
        Self {
            name: name.into(),
            kind: kind.map(str::to_string),
        }
    }

    pub fn untyped(name: impl Into<String>) -> Self {
        Self::new(name, None)
    }

    pub fn is_variable(&self) -> bool {
        self.name.starts_with('?')
    }

    pub fn is_ground(&self) -> bool {
        !self.is_variable()
    }

    pub fn strip_type(&self) -> Self {
        Self::untyped(self.name.clone())
    }

    pub fn bind(&self, sigma: &Substitution) -> Self {
        match sigma.get(&self.name) {
            Some(value) => Self {
                name: value.clone(),
                kind: self.kind.clone(),
            },
            None => self.clone(),
        }
    }
}

impl PartialEq for Object {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}
impl Eq for Object {}

impl Hash for Object {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state)
    }
}

impl PartialOrd for Object {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Object {
    fn cmp(&self, other: &Self) -> Ordering {
        self.name.cmp(&other.name)
    }
}

impl fmt::Display for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Writes `a b - t1 c - t2` style declarations, grouping consecutive objects
/// of the same type.
pub(crate) fn fmt_typed_list(f: &mut fmt::Formatter<'_>, objects: &[Object]) -> fmt::Result {
    let any_typed = objects.iter().any(|o| o.kind.is_some());
    let mut first = true;
    let mut i = 0;
    while i < objects.len() {
        let kind = objects[i].kind.as_deref();
        let mut j = i;
        while j < objects.len() && objects[j].kind.as_deref() == kind {
            if !first {
                write!(f, " ")?;
            }
            first = false;
            write!(f, "{}", objects[j].name)?;
            j += 1;
        }
        match kind {
            Some(kind) => write!(f, " - {}", kind)?,
            None if any_typed => write!(f, " - object")?,
            None => (),
        }
        i = j;
    }
    Ok(())
}

/// A predicate or function application: a name and ordered arguments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Functional {
    pub name: String,
    pub args: Vec<Object>,
}

impl Functional {
    pub fn new(name: impl Into<String>, args: Vec<Object>) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }

    /// Ground application over untyped constants.
    pub fn ground(name: impl Into<String>, args: &[&str]) -> Self {
        Self::new(name, args.iter().map(|a| Object::untyped(*a)).collect())
    }

    pub fn arity(&self) -> usize {
        self.args.len()
    }

    pub fn is_ground(&self) -> bool {
        self.args.iter().all(Object::is_ground)
    }

    pub fn strip_types(&self) -> Self {
        Self::new(self.name.clone(), self.args.iter().map(Object::strip_type).collect())
    }

    pub fn bind(&self, sigma: &Substitution) -> Self {
        Self::new(self.name.clone(), self.args.iter().map(|a| a.bind(sigma)).collect())
    }

    pub fn signature(&self) -> (&str, usize) {
        (&self.name, self.args.len())
    }

    /// Displays as a typed declaration, `(name ?x - t)`.
    pub fn declaration(&self) -> Declaration<'_> {
        Declaration(self)
    }
}

impl fmt::Display for Functional {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}", self.name)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        write!(f, ")")
    }
}

pub struct Declaration<'a>(&'a Functional);

impl fmt::Display for Declaration<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}", self.0.name)?;
        if !self.0.args.is_empty() {
            write!(f, " ")?;
            fmt_typed_list(f, &self.0.args)?;
        }
        write!(f, ")")
    }
}
