use std::{
    fmt::{Debug, Display},
    ops::Range,
};

/// Span of a definition in the source code. `start` and `end` are byte offsets.
/// Also keeps track of whether the span is in the problem source or the domain.
#[derive(PartialEq, Eq, Clone, Copy, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub is_problem: bool,
}

impl Span {
    pub fn new(range: Range<usize>, is_problem: bool) -> Self {
        Self {
            start: range.start,
            end: range.end,
            is_problem,
        }
    }
}

impl Debug for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

impl Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

impl From<Span> for Range<usize> {
    fn from(span: Span) -> Self {
        span.start..span.end
    }
}
