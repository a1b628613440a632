use num_traits::PrimInt;

/// Greatest common divisor of two non-negative integers.
///
pub fn gcd<N>(a: N, b: N) -> N
where
    N: PrimInt,
{
    let (mut a, mut b) = (a, b);
    while b != N::zero() {
        let r = a % b;
        a = b;
        b = r;
    }

    a
}

/// Greatest common divisor of all the values, `None` if there are none.
///
pub fn gcd_all<N, I>(values: I) -> Option<N>
where
    N: PrimInt,
    I: IntoIterator<Item = N>,
{
    values.into_iter().fold(None, |acc, value| match acc {
        None => Some(value),
        Some(acc) => Some(gcd(acc, value)),
    })
}
