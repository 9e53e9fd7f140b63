use enumset::{enum_set, EnumSet, EnumSetType};

#[derive(EnumSetType, Debug)]
pub enum Requirement {
    /// Basic STRIPS-style adds and deletes
    Strips,
    /// Allow type names in declarations of variables
    Typing,
    /// Allow `not` in goal descriptions
    NegativePreconditions,
    /// Allow `or` in goal descriptions
    DisjunctivePreconditions,
    /// Support `=` as built-in predicate
    Equality,
    /// Allow `exists` in goal descriptions
    ExistentialPreconditions,
    /// Allow `forall` in goal descriptions
    UniversalPreconditions,
    /// Both existential and universal preconditions
    QuantifiedPreconditions,
    /// Allow `when` in action effects
    ConditionalEffects,
    /// Shorthand for the ADL feature set
    Adl,
    /// Allow function definitions and assignment effects
    ObjectFluents,
    NumericFluents,
    /// `(increase (total-cost) n)` effects and a `minimize (total-cost)` metric
    ActionCosts,
    /// `(probabilistic p1 e1 ...)` effects
    ProbabilisticEffects,
    /// The `(reward)` fluent and `:goal-reward`
    Rewards,
}

impl Requirement {
    /// The requirement together with everything it implies.
    pub fn closure(self) -> EnumSet<Requirement> {
        use Requirement::*;
        match self {
            Adl => enum_set!(
                Adl | Strips
                    | Typing
                    | NegativePreconditions
                    | DisjunctivePreconditions
                    | Equality
                    | ExistentialPreconditions
                    | UniversalPreconditions
                    | QuantifiedPreconditions
                    | ConditionalEffects
            ),
            QuantifiedPreconditions => enum_set!(
                QuantifiedPreconditions | ExistentialPreconditions | UniversalPreconditions
            ),
            other => EnumSet::only(other),
        }
    }

    /// Features a classical planner cannot handle.
    pub fn mdp_features() -> EnumSet<Requirement> {
        enum_set!(Requirement::ProbabilisticEffects | Requirement::Rewards)
    }
}

impl std::fmt::Display for Requirement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Requirement::Strips => write!(f, ":strips"),
            Requirement::Typing => write!(f, ":typing"),
            Requirement::NegativePreconditions => write!(f, ":negative-preconditions"),
            Requirement::DisjunctivePreconditions => write!(f, ":disjunctive-preconditions"),
            Requirement::Equality => write!(f, ":equality"),
            Requirement::ExistentialPreconditions => write!(f, ":existential-preconditions"),
            Requirement::UniversalPreconditions => write!(f, ":universal-preconditions"),
            Requirement::QuantifiedPreconditions => write!(f, ":quantified-preconditions"),
            Requirement::ConditionalEffects => write!(f, ":conditional-effects"),
            Requirement::Adl => write!(f, ":adl"),
            Requirement::ObjectFluents => write!(f, ":fluents"),
            Requirement::NumericFluents => write!(f, ":numeric-fluents"),
            Requirement::ActionCosts => write!(f, ":action-costs"),
            Requirement::ProbabilisticEffects => write!(f, ":probabilistic-effects"),
            Requirement::Rewards => write!(f, ":rewards"),
        }
    }
}
