//! Identity and composition of unary functions.

/// Return the argument unchanged.
pub fn identity<T>(x: T) -> T {
    x
}

/// `compose(f, g)` is the function `x -> f(g(x))`.
pub fn compose<A, B, C>(f: impl Fn(B) -> C, g: impl Fn(A) -> B) -> impl Fn(A) -> C {
    move |x| f(g(x))
}
