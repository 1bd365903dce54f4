use nalgebra as na;

/// Pixel coordinate or pixel extent
pub type Vector2i = na::Vector2<i32>;

pub type Vector2d = na::Vector2<f64>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize)]
pub struct ObjectId(pub usize);

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
