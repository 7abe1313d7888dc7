// A float trait on top of num_traits::Float, for the one constant the
// bounding-box math needs that num_traits doesn't provide.

use num_traits;

pub trait Float: num_traits::Float + num_traits::Bounded {
    fn two() -> Self;
}

impl Float for f32 {
    fn two() -> Self {
        2f32
    }
}

impl Float for f64 {
    fn two() -> Self {
        2.
    }
}