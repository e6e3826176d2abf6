use std::fmt::{self, Display};

/// The immutable ordered pair a [`zip`](crate::Promise::zip) resolves to.
/// `a.zip(&b)` always puts `a`'s value first, whichever side finishes
/// first.
///
/// # Examples
///
/// ```
/// use promise_chain::Tuple2;
/// let pair = Tuple2::new("rice", "veg");
/// assert_eq!(pair.first(), &"rice");
/// assert_eq!(pair.into_inner(), ("rice", "veg"));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tuple2<A, B> {
    first: A,
    second: B,
}

impl<A, B> Tuple2<A, B> {
    pub fn new(first: A, second: B) -> Self {
        Self { first, second }
    }

    pub fn first(&self) -> &A {
        &self.first
    }

    pub fn second(&self) -> &B {
        &self.second
    }

    pub fn into_inner(self) -> (A, B) {
        (self.first, self.second)
    }
}

impl<A, B> From<(A, B)> for Tuple2<A, B> {
    fn from((first, second): (A, B)) -> Self {
        Self::new(first, second)
    }
}

impl<A, B> From<Tuple2<A, B>> for (A, B) {
    fn from(pair: Tuple2<A, B>) -> Self {
        pair.into_inner()
    }
}

impl<A: Display, B: Display> Display for Tuple2<A, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.first, self.second)
    }
}
