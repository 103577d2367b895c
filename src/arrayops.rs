use std::iter::Sum;

use num_traits::{AsPrimitive, Float, ToPrimitive};

/// Create an evenly spaced grid from `start` up to and including `end` (within half a step)
pub fn gridspace<T: Float + ToPrimitive>(start: T, end: T, step: T) -> Vec<T> {
    let distance = end - start;
    let steps = (distance / step + T::from(0.5).unwrap())
        .floor()
        .to_usize()
        .unwrap_or_default();
    let mut result = Vec::with_capacity(steps + 1);
    for i in 0..=steps {
        result.push(start + T::from(i).unwrap() * step);
    }
    result
}

/// Trapezoid integration of `y` over `x`
pub fn trapz<
    A: Float + Clone + AsPrimitive<B> + 'static,
    B: Float + Clone + AsPrimitive<A> + 'static + Sum,
>(
    x: &[A],
    y: &[B],
) -> B {
    x.windows(2)
        .zip(y.windows(2))
        .map(|(xw, yw)| {
            let delta = xw[1] - xw[0];
            delta.as_() * B::from(0.5).unwrap() * (yw[1] + yw[0])
        })
        .sum()
}
