use std::fmt;

use super::{fmt_number, fmt_typed_list, Functional, Object, Substitution, SymbolicState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithmeticOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl ArithmeticOp {
    fn apply(self, lhs: f64, rhs: f64) -> f64 {
        match self {
            ArithmeticOp::Add => lhs + rhs,
            ArithmeticOp::Sub => lhs - rhs,
            ArithmeticOp::Mul => lhs * rhs,
            ArithmeticOp::Div => lhs / rhs,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            ArithmeticOp::Add => "+",
            ArithmeticOp::Sub => "-",
            ArithmeticOp::Mul => "*",
            ArithmeticOp::Div => "/",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Lt,
    Gt,
    Le,
    Eq,
    Ge,
}

impl Comparison {
    fn apply(self, lhs: f64, rhs: f64) -> bool {
        match self {
            Comparison::Lt => lhs < rhs,
            Comparison::Gt => lhs > rhs,
            Comparison::Le => lhs <= rhs,
            Comparison::Eq => lhs == rhs,
            Comparison::Ge => lhs >= rhs,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Comparison::Lt => "<",
            Comparison::Gt => ">",
            Comparison::Le => "<=",
            Comparison::Eq => "=",
            Comparison::Ge => ">=",
        }
    }
}

/// Result of evaluating a query. Numbers are truthy when non-zero, booleans
/// count as 0 or 1.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Bool(bool),
    Number(f64),
}

impl Value {
    pub fn as_bool(self) -> bool {
        match self {
            Value::Bool(b) => b,
            Value::Number(n) => n != 0.0,
        }
    }

    pub fn as_number(self) -> f64 {
        match self {
            Value::Bool(true) => 1.0,
            Value::Bool(false) => 0.0,
            Value::Number(n) => n,
        }
    }
}

/// Goal descriptions, preconditions and numeric expressions. `Empty` is the
/// trivially true query and `Or(vec![])` the trivially false one.
#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    Empty,
    Predicate(Functional),
    Function(Functional),
    Constant(f64),
    Arithmetic(ArithmeticOp, Box<Query>, Box<Query>),
    Comparison(Comparison, Box<Query>, Box<Query>),
    And(Vec<Query>),
    Or(Vec<Query>),
    Not(Box<Query>),
    Imply(Box<Query>, Box<Query>),
    Forall(Vec<Object>, Box<Query>),
    Exists(Vec<Object>, Box<Query>),
}

/// Drops the quantified variables from `sigma` so they are not captured.
pub(crate) fn shadow(sigma: &Substitution, variables: &[Object]) -> Substitution {
    sigma
        .iter()
        .filter(|(k, _)| !variables.iter().any(|v| &v.name == *k))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

impl Query {
    pub fn falsity() -> Self {
        Query::Or(vec![])
    }

    pub fn is_false(&self) -> bool {
        matches!(self, Query::Or(children) if children.is_empty())
    }

    pub fn eval(&self, state: &SymbolicState) -> Value {
        match self {
            Query::Empty => Value::Bool(true),
            Query::Predicate(p) => Value::Bool(state.holds(p)),
            Query::Function(f) => Value::Number(state.value(f)),
            Query::Constant(c) => Value::Number(*c),
            Query::Arithmetic(op, lhs, rhs) => Value::Number(op.apply(
                lhs.eval(state).as_number(),
                rhs.eval(state).as_number(),
            )),
            Query::Comparison(cmp, lhs, rhs) => Value::Bool(cmp.apply(
                lhs.eval(state).as_number(),
                rhs.eval(state).as_number(),
            )),
            Query::And(children) => Value::Bool(children.iter().all(|q| q.holds(state))),
            Query::Or(children) => Value::Bool(children.iter().any(|q| q.holds(state))),
            Query::Not(q) => Value::Bool(!q.holds(state)),
            Query::Imply(lhs, rhs) => Value::Bool(!lhs.holds(state) || rhs.holds(state)),
            Query::Forall(variables, body) => Value::Bool(
                state
                    .universe()
                    .bindings(variables)
                    .iter()
                    .all(|sigma| body.bind(sigma).holds(state)),
            ),
            Query::Exists(variables, body) => Value::Bool(
                state
                    .universe()
                    .bindings(variables)
                    .iter()
                    .any(|sigma| body.bind(sigma).holds(state)),
            ),
        }
    }

    pub fn holds(&self, state: &SymbolicState) -> bool {
        self.eval(state).as_bool()
    }

    pub fn bind(&self, sigma: &Substitution) -> Self {
        match self {
            Query::Empty | Query::Constant(_) => self.clone(),
            Query::Predicate(p) => Query::Predicate(p.bind(sigma)),
            Query::Function(f) => Query::Function(f.bind(sigma)),
            Query::Arithmetic(op, lhs, rhs) => {
                Query::Arithmetic(*op, Box::new(lhs.bind(sigma)), Box::new(rhs.bind(sigma)))
            }
            Query::Comparison(cmp, lhs, rhs) => {
                Query::Comparison(*cmp, Box::new(lhs.bind(sigma)), Box::new(rhs.bind(sigma)))
            }
            Query::And(children) => Query::And(children.iter().map(|q| q.bind(sigma)).collect()),
            Query::Or(children) => Query::Or(children.iter().map(|q| q.bind(sigma)).collect()),
            Query::Not(q) => Query::Not(Box::new(q.bind(sigma))),
            Query::Imply(lhs, rhs) => {
                Query::Imply(Box::new(lhs.bind(sigma)), Box::new(rhs.bind(sigma)))
            }
            Query::Forall(variables, body) => Query::Forall(
                variables.clone(),
                Box::new(body.bind(&shadow(sigma, variables))),
            ),
            Query::Exists(variables, body) => Query::Exists(
                variables.clone(),
                Box::new(body.bind(&shadow(sigma, variables))),
            ),
        }
    }

    /// Folds constants and removes trivially true or false substructure.
    pub fn simplify(&self) -> Self {
        match self {
            Query::Arithmetic(op, lhs, rhs) => {
                let (lhs, rhs) = (lhs.simplify(), rhs.simplify());
                match (op, &lhs, &rhs) {
                    (_, Query::Constant(a), Query::Constant(b)) => Query::Constant(op.apply(*a, *b)),
                    (ArithmeticOp::Mul, Query::Constant(z), _)
                    | (ArithmeticOp::Mul, _, Query::Constant(z))
                        if *z == 0.0 =>
                    {
                        Query::Constant(0.0)
                    }
                    (ArithmeticOp::Mul, Query::Constant(one), other)
                    | (ArithmeticOp::Mul, other, Query::Constant(one))
                        if *one == 1.0 =>
                    {
                        other.clone()
                    }
                    (ArithmeticOp::Add, Query::Constant(zero), other)
                    | (ArithmeticOp::Add | ArithmeticOp::Sub, other, Query::Constant(zero))
                        if *zero == 0.0 =>
                    {
                        other.clone()
                    }
                    _ => Query::Arithmetic(*op, Box::new(lhs), Box::new(rhs)),
                }
            }
            Query::Comparison(cmp, lhs, rhs) => match (lhs.simplify(), rhs.simplify()) {
                (Query::Constant(a), Query::Constant(b)) => {
                    if cmp.apply(a, b) {
                        Query::Empty
                    } else {
                        Query::falsity()
                    }
                }
                (lhs, rhs) => Query::Comparison(*cmp, Box::new(lhs), Box::new(rhs)),
            },
            Query::And(children) => {
                let mut flat = Vec::with_capacity(children.len());
                for child in children.iter().map(Query::simplify) {
                    match child {
                        Query::Empty => (),
                        Query::And(grandchildren) => flat.extend(grandchildren),
                        q if q.is_false() => return Query::falsity(),
                        q => flat.push(q),
                    }
                }
                match flat.len() {
                    0 => Query::Empty,
                    1 => flat.remove(0),
                    _ => Query::And(flat),
                }
            }
            Query::Or(children) => {
                let mut flat = Vec::with_capacity(children.len());
                for child in children.iter().map(Query::simplify) {
                    match child {
                        Query::Empty => return Query::Empty,
                        Query::Or(grandchildren) => flat.extend(grandchildren),
                        q => flat.push(q),
                    }
                }
                if flat.len() == 1 {
                    flat.remove(0)
                } else {
                    Query::Or(flat)
                }
            }
            Query::Not(q) => match q.simplify() {
                Query::Empty => Query::falsity(),
                q if q.is_false() => Query::Empty,
                Query::Not(inner) => *inner,
                q => Query::Not(Box::new(q)),
            },
            Query::Imply(lhs, rhs) => match (lhs.simplify(), rhs.simplify()) {
                (Query::Empty, rhs) => rhs,
                (_, Query::Empty) => Query::Empty,
                (lhs, _) if lhs.is_false() => Query::Empty,
                (lhs, rhs) => Query::Imply(Box::new(lhs), Box::new(rhs)),
            },
            Query::Forall(variables, body) => match body.simplify() {
                Query::Empty => Query::Empty,
                body => Query::Forall(variables.clone(), Box::new(body)),
            },
            Query::Exists(variables, body) => match body.simplify() {
                Query::Empty => Query::Empty,
                body => Query::Exists(variables.clone(), Box::new(body)),
            },
            Query::Empty | Query::Predicate(_) | Query::Function(_) | Query::Constant(_) => {
                self.clone()
            }
        }
    }

    /// True when the query holds in every state.
    pub fn is_empty(&self) -> bool {
        matches!(self.simplify(), Query::Empty)
    }
}

fn fmt_children(f: &mut fmt::Formatter<'_>, head: &str, children: &[Query]) -> fmt::Result {
    write!(f, "({}", head)?;
    for child in children {
        write!(f, " {}", child)?;
    }
    write!(f, ")")
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Query::Empty => write!(f, "(and)"),
            Query::Predicate(p) | Query::Function(p) => write!(f, "{}", p),
            Query::Constant(c) => fmt_number(f, *c),
            Query::Arithmetic(op, lhs, rhs) => write!(f, "({} {} {})", op.symbol(), lhs, rhs),
            Query::Comparison(cmp, lhs, rhs) => write!(f, "({} {} {})", cmp.symbol(), lhs, rhs),
            Query::And(children) => fmt_children(f, "and", children),
            Query::Or(children) => fmt_children(f, "or", children),
            Query::Not(q) => write!(f, "(not {})", q),
            Query::Imply(lhs, rhs) => write!(f, "(imply {} {})", lhs, rhs),
            Query::Forall(variables, body) | Query::Exists(variables, body) => {
                let head = if matches!(self, Query::Forall(..)) {
                    "forall"
                } else {
                    "exists"
                };
                write!(f, "({} (", head)?;
                fmt_typed_list(f, variables)?;
                write!(f, ") {})", body)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pddl::{Types, Universe};
    use std::sync::Arc;

    fn pred(name: &str, args: &[&str]) -> Query {
        Query::Predicate(Functional::ground(name, args))
    }

    fn blocks_state() -> SymbolicState {
        let mut types = Types::default();
        types.insert("block", "object");
        let universe = Universe::new(
            vec![Object::new("a", Some("block")), Object::new("b", Some("block"))],
            &types,
        );
        SymbolicState::new(
            vec![
                Functional::ground("clear", &["a"]),
                Functional::ground("clear", &["b"]),
                Functional::ground("ontable", &["a"]),
            ],
            vec![(Functional::ground("height", &["a"]), 3.0)],
            Arc::new(universe),
        )
    }

    #[test]
    fn connectives() {
        let s = blocks_state();
        assert!(Query::And(vec![pred("clear", &["a"]), pred("ontable", &["a"])]).holds(&s));
        assert!(!Query::And(vec![pred("clear", &["a"]), pred("ontable", &["b"])]).holds(&s));
        assert!(Query::Or(vec![pred("holding", &["a"]), pred("clear", &["b"])]).holds(&s));
        assert!(!Query::falsity().holds(&s));
        assert!(Query::Empty.holds(&s));
        assert!(Query::Imply(Box::new(pred("ontable", &["b"])), Box::new(Query::falsity())).holds(&s));
        assert!(Query::Not(Box::new(pred("ontable", &["b"]))).holds(&s));
    }

    #[test]
    fn quantifiers() {
        let s = blocks_state();
        let x = Object::new("?x", Some("block"));
        let clear_x = Query::Predicate(Functional::new("clear", vec![x.clone()]));
        let ontable_x = Query::Predicate(Functional::new("ontable", vec![x.clone()]));
        assert!(Query::Forall(vec![x.clone()], Box::new(clear_x)).holds(&s));
        assert!(!Query::Forall(vec![x.clone()], Box::new(ontable_x.clone())).holds(&s));
        assert!(Query::Exists(vec![x], Box::new(ontable_x)).holds(&s));
    }

    #[test]
    fn numeric_comparison() {
        let s = blocks_state();
        let height = Query::Function(Functional::ground("height", &["a"]));
        let q = Query::Comparison(
            Comparison::Ge,
            Box::new(Query::Arithmetic(
                ArithmeticOp::Mul,
                Box::new(height),
                Box::new(Query::Constant(2.0)),
            )),
            Box::new(Query::Constant(6.0)),
        );
        assert!(q.holds(&s));
        assert_eq!(q.to_string(), "(>= (* (height a) 2) 6)");
    }

    #[test]
    fn bind_is_capture_avoiding() {
        let x = Object::untyped("?x");
        let q = Query::And(vec![
            Query::Predicate(Functional::new("p", vec![x.clone()])),
            Query::Forall(
                vec![x.clone()],
                Box::new(Query::Predicate(Functional::new("q", vec![x.clone()]))),
            ),
        ]);
        let sigma = Substitution::from([("?x".to_string(), "a".to_string())]);
        assert_eq!(q.bind(&sigma).to_string(), "(and (p a) (forall (?x) (q ?x)))");
    }

    #[test]
    fn simplify_folds_and_prunes() {
        let q = Query::And(vec![
            Query::Empty,
            Query::And(vec![pred("p", &[]), Query::Empty]),
            Query::Comparison(
                Comparison::Lt,
                Box::new(Query::Constant(1.0)),
                Box::new(Query::Constant(2.0)),
            ),
        ]);
        assert_eq!(q.simplify(), pred("p", &[]));
        assert!(Query::And(vec![Query::Empty, Query::And(vec![])]).is_empty());
        assert!(Query::Imply(Box::new(Query::falsity()), Box::new(pred("p", &[]))).is_empty());
        assert_eq!(
            Query::And(vec![pred("p", &[]), Query::falsity()]).simplify(),
            Query::falsity()
        );
        assert_eq!(
            Query::Arithmetic(
                ArithmeticOp::Mul,
                Box::new(Query::Constant(0.0)),
                Box::new(Query::Function(Functional::ground("f", &[]))),
            )
            .simplify(),
            Query::Constant(0.0)
        );
    }

    #[test]
    fn equality_predicate() {
        let s = blocks_state();
        assert!(pred("=", &["a", "a"]).holds(&s));
        assert!(!pred("=", &["a", "b"]).holds(&s));
    }
}
