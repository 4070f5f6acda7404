/// Stock combiners for materialized values, for use with the `*_mat`
/// composition methods.
///
/// ```rust
/// use flowweld::prelude::*;
///
/// let graph = Source::<u32>::maybe().to_mat(Sink::seq(), Keep::both);
/// # let _ = graph;
/// ```
#[derive(Debug, Clone, Copy)]
pub struct Keep;

impl Keep {
    /// Keep the value of the left-hand description
    pub fn left<L, R>(left: L, _right: R) -> L {
        left
    }

    /// Keep the value of the right-hand description
    pub fn right<L, R>(_left: L, right: R) -> R {
        right
    }

    /// Keep both values as a pair
    pub fn both<L, R>(left: L, right: R) -> (L, R) {
        (left, right)
    }

    /// Drop both values
    pub fn none<L, R>(_left: L, _right: R) {}
}
