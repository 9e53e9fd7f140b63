mod input;
mod span;

use std::{collections::HashMap, sync::Arc};

use enumset::{enum_set, EnumSet};
use nom::{
    branch::alt,
    bytes::complete::{is_not, tag_no_case, take_while},
    character::complete::{char, digit0, digit1, multispace1, satisfy},
    combinator::{cut, map, not, opt, recognize, value},
    error::ParseError,
    multi::{many0, many0_count, many1},
    sequence::{pair, preceded, terminated, tuple},
    Parser,
};

pub use input::Input;
pub use span::Span;

use crate::{
    pddl::{
        Action, ArithmeticOp, AssignOp, Comparison, Direction, Domain, Effect, Functional, Goal,
        InitialState, Metric, Object, Problem, Query, Requirement, Types,
    },
    Error, ErrorKind,
};

type IResult<'src, O> = nom::IResult<Input<'src>, O, Error>;

type Spanned<O> = (Span, O);

impl<'src> ParseError<Input<'src>> for Error {
    fn from_error_kind(input: Input<'src>, _kind: nom::error::ErrorKind) -> Self {
        let end = input.input_pos + input.src.chars().next().map_or(0, char::len_utf8);
        Error::at(ErrorKind::Syntax, input.span_end(end))
    }

    fn append(_input: Input<'src>, _kind: nom::error::ErrorKind, other: Self) -> Self {
        other
    }

    /// Keeps whichever alternative got further into the source.
    fn or(self, other: Self) -> Self {
        if other.span.start > self.span.start {
            other
        } else {
            self
        }
    }
}

/// Renames recoverable errors. Failures keep their kind.
#[inline]
fn err_name(ek: ErrorKind) -> impl Fn(nom::Err<Error>) -> nom::Err<Error> {
    move |e| match e {
        nom::Err::Error(mut old_e) => {
            old_e.kind = ek.clone();
            nom::Err::Error(old_e)
        }
        e => e,
    }
}

/// Fails with `UnsetRequirement` unless one of `any_of` has been declared.
#[inline]
fn requires<'src, O, F>(
    mut parser: F,
    any_of: EnumSet<Requirement>,
) -> impl FnMut(Input<'src>) -> IResult<'src, O>
where
    F: Parser<Input<'src>, O, Error>,
{
    move |input: Input<'src>| {
        let (i, o) = parser.parse(input)?;
        if input.requirements.is_disjoint(any_of) {
            Err(nom::Err::Failure(Error::at(
                ErrorKind::UnsetRequirement(any_of),
                input.span_end(i.input_pos),
            )))
        } else {
            Ok((i, o))
        }
    }
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

/// Whitespace and `;` comments.
#[inline]
fn ignore(input: Input) -> IResult<()> {
    value(
        (),
        many0_count(alt((
            value((), multispace1),
            value((), pair(char(';'), opt(is_not("\n")))),
        ))),
    )(input)
}

/// A case-insensitive keyword that is not the prefix of a longer name.
#[inline]
fn keyword<'src>(word: &'static str) -> impl FnMut(Input<'src>) -> IResult<'src, ()> {
    move |input| {
        value(
            (),
            terminated(
                terminated(tag_no_case(word), not(satisfy(is_name_char))),
                ignore,
            ),
        )(input)
        .map_err(err_name(ErrorKind::Tag(word)))
    }
}

#[inline]
fn minus(input: Input) -> IResult<()> {
    value((), terminated(char('-'), ignore))(input)
}

#[inline]
fn parens<'src, O, G>(mut parser: G) -> impl FnMut(Input<'src>) -> IResult<'src, O>
where
    G: Parser<Input<'src>, O, Error>,
{
    move |input: Input<'src>| {
        let open_paren_pos = input.input_pos;
        let (i, _) =
            terminated(char('('), ignore)(input).map_err(err_name(ErrorKind::Parenthesis))?;
        let (i, o) = parser.parse(i)?;
        let (i, _) = cut(terminated(char(')'), ignore))(i)
            .map_err(|e| {
                e.map(|mut e| {
                    e.kind = ErrorKind::UnclosedParenthesis(open_paren_pos);
                    e
                })
            })?;
        Ok((i, o))
    }
}

#[inline]
fn empty_parens(input: Input) -> IResult<()> {
    value((), tuple((char('('), ignore, char(')'), ignore)))(input)
}

fn name(input: Input) -> IResult<Spanned<String>> {
    let (i, o) = recognize(pair(
        satisfy(|c: char| c.is_ascii_alphanumeric() || c == '_'),
        take_while(is_name_char),
    ))(input)
    .map_err(err_name(ErrorKind::Name))?;
    let (i, _) = ignore(i)?;
    Ok((i, (o.span(), o.src.to_ascii_lowercase())))
}

fn variable(input: Input) -> IResult<Spanned<String>> {
    let (i, (_, (span, n))) = pair(char('?'), name)(input).map_err(err_name(ErrorKind::Variable))?;
    Ok((i, (Span { start: input.input_pos, ..span }, format!("?{}", n))))
}

fn term(input: Input) -> IResult<Object> {
    map(alt((variable, name)), |(_, n)| Object::untyped(n))(input)
}

fn decimal(input: Input) -> IResult<f64> {
    let (i, o) = recognize(pair(
        opt(char('-')),
        alt((
            recognize(pair(digit1, opt(pair(char('.'), digit0)))),
            recognize(pair(char('.'), digit1)),
        )),
    ))(input)
    .map_err(err_name(ErrorKind::Number))?;
    match o.src.parse::<f64>() {
        Ok(n) => Ok((i, n)),
        Err(_) => Err(nom::Err::Error(Error::at(ErrorKind::Number, o.span()))),
    }
}

/// A decimal or a `a/b` fraction.
fn number(input: Input) -> IResult<f64> {
    let (i, n) = decimal(input)?;
    let (i, d) = opt(preceded(char('/'), decimal))(i)?;
    let (i, _) = ignore(i)?;
    Ok((i, d.map_or(n, |d| n / d)))
}

/// `a b - t c` style declarations of names or variables.
fn typed_list<'src, F>(item: F) -> impl FnMut(Input<'src>) -> IResult<'src, Vec<Spanned<Object>>>
where
    F: FnMut(Input<'src>) -> IResult<'src, Spanned<String>> + Copy,
{
    move |input| {
        let (i, groups) = many0(pair(
            many1(item),
            opt(preceded(
                requires(minus, enum_set!(Requirement::Typing)),
                cut(name),
            )),
        ))(input)
        .map_err(err_name(ErrorKind::TypedList))?;
        let list = groups
            .into_iter()
            .flat_map(|(items, kind)| {
                items.into_iter().map(move |(span, n)| {
                    (span, Object::new(n, kind.as_ref().map(|(_, k)| k.as_str())))
                })
            })
            .collect();
        Ok((i, list))
    }
}

fn strip_spans<O>(list: Vec<Spanned<O>>) -> Vec<O> {
    list.into_iter().map(|(_, o)| o).collect()
}

fn atomic(input: Input) -> IResult<Functional> {
    parens(map(pair(name, many0(term)), |((_, n), args)| {
        Functional::new(n, args)
    }))(input)
}

fn requirements_def(input: Input) -> IResult<EnumSet<Requirement>> {
    use Requirement::*;
    let (mut i, declared) = parens(preceded(
        keyword(":requirements"),
        cut(many1(alt((
            value(Strips, keyword(":strips")),
            value(Typing, keyword(":typing")),
            value(NegativePreconditions, keyword(":negative-preconditions")),
            value(DisjunctivePreconditions, keyword(":disjunctive-preconditions")),
            value(Equality, keyword(":equality")),
            value(ExistentialPreconditions, keyword(":existential-preconditions")),
            value(UniversalPreconditions, keyword(":universal-preconditions")),
            value(QuantifiedPreconditions, keyword(":quantified-preconditions")),
            value(ConditionalEffects, keyword(":conditional-effects")),
            value(Adl, keyword(":adl")),
            value(ObjectFluents, keyword(":fluents")),
            value(NumericFluents, keyword(":numeric-fluents")),
            value(ActionCosts, keyword(":action-costs")),
            value(ProbabilisticEffects, keyword(":probabilistic-effects")),
            value(Rewards, keyword(":rewards")),
        )))),
    ))(input)?;
    let declared: EnumSet<Requirement> = declared.into_iter().collect();
    for requirement in declared.iter() {
        i.requirements |= requirement.closure();
    }
    Ok((i, declared))
}

fn fluent_requirements() -> EnumSet<Requirement> {
    use Requirement::*;
    enum_set!(ObjectFluents | NumericFluents | ActionCosts | Rewards)
}

fn f_exp(input: Input) -> IResult<Query> {
    alt((
        map(number, Query::Constant),
        parens(map(
            tuple((
                alt((
                    value(ArithmeticOp::Add, terminated(char('+'), ignore)),
                    value(ArithmeticOp::Sub, terminated(char('-'), ignore)),
                    value(ArithmeticOp::Mul, terminated(char('*'), ignore)),
                    value(ArithmeticOp::Div, terminated(char('/'), ignore)),
                )),
                f_exp,
                f_exp,
            )),
            |(op, lhs, rhs)| Query::Arithmetic(op, Box::new(lhs), Box::new(rhs)),
        )),
        map(requires(atomic, fluent_requirements()), Query::Function),
    ))(input)
}

fn quantified<'src, O, G>(
    word: &'static str,
    any_of: EnumSet<Requirement>,
    body: G,
) -> impl FnMut(Input<'src>) -> IResult<'src, (Vec<Object>, O)>
where
    G: Parser<Input<'src>, O, Error>,
{
    parens(preceded(
        requires(keyword(word), any_of),
        cut(pair(map(parens(typed_list(variable)), strip_spans), body)),
    ))
}

fn query(input: Input) -> IResult<Query> {
    use Requirement::*;
    alt((
        value(Query::Empty, empty_parens),
        parens(preceded(
            keyword("and"),
            map(cut(many0(query)), |children| {
                if children.is_empty() {
                    Query::Empty
                } else {
                    Query::And(children)
                }
            }),
        )),
        parens(preceded(
            requires(keyword("or"), enum_set!(DisjunctivePreconditions)),
            map(cut(many0(query)), Query::Or),
        )),
        parens(preceded(
            keyword("not"),
            map(cut(query), |q| Query::Not(Box::new(q))),
        )),
        parens(preceded(
            requires(keyword("imply"), enum_set!(DisjunctivePreconditions)),
            map(cut(pair(query, query)), |(l, r)| {
                Query::Imply(Box::new(l), Box::new(r))
            }),
        )),
        map(
            quantified("forall", enum_set!(UniversalPreconditions), query),
            |(vars, q)| Query::Forall(vars, Box::new(q)),
        ),
        map(
            quantified("exists", enum_set!(ExistentialPreconditions), query),
            |(vars, q)| Query::Exists(vars, Box::new(q)),
        ),
        parens(map(
            tuple((
                alt((
                    value(Comparison::Le, keyword("<=")),
                    value(Comparison::Ge, keyword(">=")),
                    value(Comparison::Lt, keyword("<")),
                    value(Comparison::Gt, keyword(">")),
                    value(Comparison::Eq, keyword("=")),
                )),
                f_exp,
                f_exp,
            )),
            |(cmp, lhs, rhs)| Query::Comparison(cmp, Box::new(lhs), Box::new(rhs)),
        )),
        parens(map(preceded(keyword("="), pair(term, term)), |(l, r)| {
            Query::Predicate(Functional::new("=", vec![l, r]))
        })),
        map(atomic, Query::Predicate),
    ))(input)
    .map_err(err_name(ErrorKind::Query))
}

fn probabilistic_effect(input: Input) -> IResult<Effect> {
    let (i, outcomes) = parens(preceded(
        requires(
            keyword("probabilistic"),
            enum_set!(Requirement::ProbabilisticEffects),
        ),
        cut(many1(pair(number, effect))),
    ))(input)?;
    match Effect::probabilistic(outcomes) {
        Ok(e) => Ok((i, e)),
        Err(mut e) => {
            e.span = input.span_end(i.input_pos);
            Err(nom::Err::Failure(e))
        }
    }
}

fn effect(input: Input) -> IResult<Effect> {
    use Requirement::*;
    alt((
        value(Effect::Empty, empty_parens),
        parens(preceded(
            keyword("and"),
            map(cut(many0(effect)), |children| {
                if children.is_empty() {
                    Effect::Empty
                } else {
                    Effect::And(children)
                }
            }),
        )),
        map(
            quantified("forall", enum_set!(ConditionalEffects), effect),
            |(vars, e)| Effect::Forall(vars, Box::new(e)),
        ),
        parens(preceded(
            requires(keyword("when"), enum_set!(ConditionalEffects)),
            map(cut(pair(query, effect)), |(q, e)| {
                Effect::Conditional(q, Box::new(e))
            }),
        )),
        probabilistic_effect,
        parens(preceded(keyword("not"), map(cut(atomic), Effect::Delete))),
        parens(map(
            tuple((
                requires(
                    alt((
                        value(AssignOp::Assign, keyword("assign")),
                        value(AssignOp::Increase, keyword("increase")),
                        value(AssignOp::Decrease, keyword("decrease")),
                        value(AssignOp::ScaleUp, keyword("scale-up")),
                        value(AssignOp::ScaleDown, keyword("scale-down")),
                    )),
                    fluent_requirements(),
                ),
                cut(atomic),
                cut(f_exp),
            )),
            |(op, function, value)| Effect::Assignment(op, function, value),
        )),
        map(atomic, Effect::Add),
    ))(input)
    .map_err(err_name(ErrorKind::Effect))
}

struct ParsedAction {
    action: Action,
    parameters: Vec<Spanned<Object>>,
}

fn action_def(input: Input) -> IResult<ParsedAction> {
    map(
        parens(preceded(
            keyword(":action"),
            cut(tuple((
                name,
                opt(preceded(keyword(":parameters"), parens(typed_list(variable)))),
                opt(preceded(keyword(":precondition"), query)),
                opt(preceded(keyword(":effect"), effect)),
            ))),
        )),
        |((_, name), parameters, precondition, effect)| {
            let parameters = parameters.unwrap_or_default();
            ParsedAction {
                action: Action::new(
                    name,
                    parameters.iter().map(|(_, o)| o.clone()).collect(),
                    precondition.unwrap_or(Query::Empty),
                    effect.unwrap_or(Effect::Empty),
                ),
                parameters,
            }
        },
    )(input)
    .map_err(err_name(ErrorKind::Action))
}

fn predicates_def(input: Input) -> IResult<Vec<Spanned<Functional>>> {
    parens(preceded(
        keyword(":predicates"),
        cut(many0(parens(map(
            pair(name, typed_list(variable)),
            |((span, n), args)| (span, Functional::new(n, strip_spans(args))),
        )))),
    ))(input)
}

fn functions_def(input: Input) -> IResult<Vec<Functional>> {
    parens(preceded(
        requires(keyword(":functions"), fluent_requirements()),
        cut(many0(terminated(
            parens(map(pair(name, typed_list(variable)), |((_, n), args)| {
                Functional::new(n, strip_spans(args))
            })),
            opt(pair(minus, keyword("number"))),
        ))),
    ))(input)
}

fn check_duplicates(
    names: &[(Span, &str)],
    kind: fn(String) -> ErrorKind,
) -> Result<(), Error> {
    let mut seen: HashMap<&str, Span> = HashMap::new();
    for (span, n) in names {
        if let Some(first) = seen.get(n) {
            return Err(Error::at(kind(n.to_string()), *span)
                .chained(Error::at(ErrorKind::FirstDefinedHere, *first)));
        }
        seen.insert(*n, *span);
    }
    Ok(())
}

fn check_types(objects: &[Spanned<Object>], types: &Types) -> Result<(), Error> {
    for (span, object) in objects {
        if let Some(kind) = &object.kind {
            if !types.contains(kind) {
                return Err(Error::at(ErrorKind::UndefinedType(kind.clone()), *span));
            }
        }
    }
    Ok(())
}

fn finish<'src, O>(
    input: Input<'src>,
    mut parser: impl FnMut(Input<'src>) -> IResult<'src, O>,
) -> Result<O, Error> {
    match preceded(ignore, |i| parser(i))(input) {
        Ok((rest, o)) if rest.src.is_empty() => Ok(o),
        Ok((rest, _)) => Err(Error::at(ErrorKind::TrailingInput, rest.span())),
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => Err(e),
        Err(nom::Err::Incomplete(_)) => Err(Error::at(ErrorKind::Syntax, input.span())),
    }
}

/// Parses a PPDDL domain.
/// ```
/// use ppddl_rs::parser::parse_domain;
/// let domain = parse_domain("(define (domain test) (:predicates (p)))").unwrap();
/// assert_eq!(domain.name, "test");
/// assert_eq!(domain.predicates.len(), 1);
/// ```
pub fn parse_domain(src: &str) -> Result<Domain, Error> {
    let (
        (),
        (_, name),
        requirements,
        types,
        constants,
        predicates,
        functions,
        actions,
    ) = finish(
        Input::new(src, false),
        parens(tuple((
            keyword("define"),
            parens(preceded(keyword("domain"), cut(name))),
            opt(requirements_def),
            opt(parens(preceded(
                requires(keyword(":types"), enum_set!(Requirement::Typing)),
                cut(typed_list(name)),
            ))),
            opt(parens(preceded(
                keyword(":constants"),
                cut(typed_list(name)),
            ))),
            opt(predicates_def),
            opt(functions_def),
            many0(action_def),
        ))),
    )?;

    let declared_types = types.unwrap_or_default();
    check_duplicates(
        &declared_types
            .iter()
            .map(|(s, o)| (*s, o.name.as_str()))
            .collect::<Vec<_>>(),
        ErrorKind::DuplicateType,
    )?;
    let mut types = Types::default();
    for (_, object) in &declared_types {
        types.insert(object.name.clone(), object.kind.as_deref().unwrap_or("object"));
    }
    for (span, object) in &declared_types {
        if let Some(parent) = &object.kind {
            if !types.contains(parent) {
                return Err(Error::at(ErrorKind::UndefinedType(parent.clone()), *span));
            }
        }
    }

    let constants = constants.unwrap_or_default();
    check_duplicates(
        &constants
            .iter()
            .map(|(s, o)| (*s, o.name.as_str()))
            .collect::<Vec<_>>(),
        ErrorKind::DuplicateObject,
    )?;
    check_types(&constants, &types)?;

    let predicates = predicates.unwrap_or_default();
    check_duplicates(
        &predicates
            .iter()
            .map(|(s, p)| (*s, p.name.as_str()))
            .collect::<Vec<_>>(),
        ErrorKind::DuplicatePredicate,
    )?;
    for parsed in &actions {
        check_types(&parsed.parameters, &types)?;
    }

    Ok(Domain {
        name,
        requirements: requirements.unwrap_or_default(),
        types,
        constants: strip_spans(constants),
        predicates: strip_spans(predicates),
        functions: functions.unwrap_or_default(),
        actions: actions.into_iter().map(|parsed| parsed.action).collect(),
    })
}

enum InitElement {
    Fact(Functional),
    Value(Functional, f64),
}

fn init_def(input: Input) -> IResult<InitialState> {
    map(
        parens(preceded(
            keyword(":init"),
            cut(many0(alt((
                map(
                    parens(preceded(keyword("="), pair(atomic, number))),
                    |(f, v)| InitElement::Value(f, v),
                ),
                map(atomic, InitElement::Fact),
            )))),
        )),
        |elements| {
            let mut init = InitialState::default();
            for element in elements {
                match element {
                    InitElement::Fact(p) => {
                        init.predicates.insert(p);
                    }
                    InitElement::Value(f, v) => {
                        init.functions.insert(f, v);
                    }
                }
            }
            init
        },
    )(input)
}

/// Parses a PPDDL problem over `domain`.
pub fn parse_problem(src: &str, domain: Arc<Domain>) -> Result<Problem, Error> {
    let mut input = Input::new(src, true);
    for requirement in domain.requirements.iter() {
        input.requirements |= requirement.closure();
    }
    let (
        (),
        (_, name),
        (domain_span, domain_name),
        _,
        objects,
        init,
        query,
        reward,
        metric,
    ) = finish(
        input,
        parens(tuple((
            keyword("define"),
            parens(preceded(keyword("problem"), cut(name))),
            parens(preceded(keyword(":domain"), cut(name))),
            opt(requirements_def),
            opt(parens(preceded(keyword(":objects"), cut(typed_list(name))))),
            init_def,
            parens(preceded(keyword(":goal"), cut(query))),
            opt(parens(preceded(
                requires(keyword(":goal-reward"), enum_set!(Requirement::Rewards)),
                cut(number),
            ))),
            opt(parens(preceded(
                keyword(":metric"),
                cut(pair(
                    alt((
                        value(Direction::Minimize, keyword("minimize")),
                        value(Direction::Maximize, keyword("maximize")),
                    )),
                    f_exp,
                )),
            ))),
        ))),
    )?;

    if domain_name != domain.name {
        return Err(Error::at(
            ErrorKind::MissmatchedDomain(domain_name),
            domain_span,
        ));
    }
    let objects = objects.unwrap_or_default();
    check_duplicates(
        &objects
            .iter()
            .map(|(s, o)| (*s, o.name.as_str()))
            .collect::<Vec<_>>(),
        ErrorKind::DuplicateObject,
    )?;
    if let Some((span, object)) = objects.iter().find(|(_, o)| domain.constants.contains(o)) {
        return Err(Error::at(ErrorKind::DuplicateObject(object.name.clone()), *span));
    }
    check_types(&objects, &domain.types)?;

    Ok(Problem {
        name,
        domain,
        objects: strip_spans(objects),
        init,
        goal: Goal {
            query,
            reward,
            metric: metric.map(|(direction, expression)| Metric {
                direction,
                expression,
            }),
        },
    })
}
