use enumset::EnumSet;
use nom::{Compare, InputIter, InputLength, InputTake, Offset, Slice, UnspecializedInput};
use std::{
    ops::{RangeFrom, RangeTo},
    str::{CharIndices, Chars},
};

use super::Span;
use crate::pddl::Requirement;

/// Parser input: the remaining source, its byte offset in the whole file,
/// which file it is, and the requirements declared so far.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct Input<'src> {
    pub src: &'src str,
    pub input_pos: usize,
    pub is_problem: bool,
    pub requirements: EnumSet<Requirement>,
}

impl<'src> Input<'src> {
    pub fn new(src: &'src str, is_problem: bool) -> Self {
        Self {
            src,
            input_pos: 0,
            is_problem,
            requirements: EnumSet::EMPTY,
        }
    }

    /// Span from the start of this input to the absolute offset `end`.
    pub fn span_end(&self, end: usize) -> Span {
        Span::new(self.input_pos..end, self.is_problem)
    }

    /// Span covering this input.
    pub fn span(&self) -> Span {
        self.span_end(self.input_pos + self.src.len())
    }

    fn with_src(&self, src: &'src str, input_pos: usize) -> Self {
        Self {
            src,
            input_pos,
            ..*self
        }
    }
}

impl InputLength for Input<'_> {
    fn input_len(&self) -> usize {
        self.src.len()
    }
}

impl<'src> InputIter for Input<'src> {
    type Item = char;
    type Iter = CharIndices<'src>;
    type IterElem = Chars<'src>;

    fn iter_indices(&self) -> Self::Iter {
        self.src.iter_indices()
    }

    fn iter_elements(&self) -> Self::IterElem {
        self.src.iter_elements()
    }

    fn position<P>(&self, predicate: P) -> Option<usize>
    where
        P: Fn(Self::Item) -> bool,
    {
        self.src.position(predicate)
    }

    fn slice_index(&self, count: usize) -> Result<usize, nom::Needed> {
        self.src.slice_index(count)
    }
}

impl<'src> InputTake for Input<'src> {
    fn take(&self, count: usize) -> Self {
        self.with_src(&self.src[..count], self.input_pos)
    }

    fn take_split(&self, count: usize) -> (Self, Self) {
        let (prefix, suffix) = self.src.split_at(count);
        (
            self.with_src(suffix, self.input_pos + count),
            self.with_src(prefix, self.input_pos),
        )
    }
}

impl<'src> Compare<&str> for Input<'src> {
    fn compare(&self, t: &str) -> nom::CompareResult {
        self.src.compare(t)
    }

    fn compare_no_case(&self, t: &str) -> nom::CompareResult {
        self.src.compare_no_case(t)
    }
}

impl<'src> Slice<RangeFrom<usize>> for Input<'src> {
    fn slice(&self, range: RangeFrom<usize>) -> Self {
        let input_pos = self.input_pos + range.start;
        self.with_src(self.src.slice(range), input_pos)
    }
}

impl<'src> Slice<RangeTo<usize>> for Input<'src> {
    fn slice(&self, range: RangeTo<usize>) -> Self {
        self.with_src(self.src.slice(range), self.input_pos)
    }
}

impl<'src> Offset for Input<'src> {
    fn offset(&self, second: &Self) -> usize {
        self.src.offset(second.src)
    }
}

impl<'src> UnspecializedInput for Input<'src> {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_tracks_position() {
        let input = Input::new("(define x)", true);
        let (rest, taken) = input.take_split(7);
        assert_eq!(taken.src, "(define");
        assert_eq!(rest.src, " x)");
        assert_eq!(rest.input_pos, 7);
        assert_eq!(rest.span(), Span::new(7..10, true));
    }
}
