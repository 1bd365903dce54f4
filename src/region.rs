use serde::{Deserialize, Serialize};

use crate::image::Image;
use crate::my_types::*;

/// Axis-aligned pixel rectangle, `(x, y)` is the top-left corner
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Region {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Rectangle of `size` whose center is `center`, using integer halving
    pub fn centered(center: Vector2i, size: Vector2i) -> Self {
        Self {
            x: center.x.saturating_sub(size.x / 2),
            y: center.y.saturating_sub(size.y / 2),
            width: size.x,
            height: size.y,
        }
    }

    pub fn center(&self) -> Vector2i {
        Vector2i::new(
            self.x.saturating_add(self.width / 2),
            self.y.saturating_add(self.height / 2),
        )
    }

    pub fn size(&self) -> Vector2i {
        Vector2i::new(self.width, self.height)
    }

    pub fn is_degenerate(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    /// Whether every pixel of the region lies inside the image
    pub fn is_inside(&self, image: &Image) -> bool {
        self.x >= 0
            && self.y >= 0
            && self.x as i64 + self.width as i64 <= image.size(0) as i64
            && self.y as i64 + self.height as i64 <= image.size(1) as i64
    }

    /// The part of the region that overlaps the image, as pixel index ranges
    pub fn clip(&self, image: &Image) -> ([usize; 2], [usize; 2]) {
        let clip_axis = |start: i32, len: i32, limit: usize| -> [usize; 2] {
            let limit = limit as i64;
            let begin = (start as i64).clamp(0, limit);
            let end = (start as i64 + len.max(0) as i64).clamp(begin, limit);
            [begin as usize, end as usize]
        };
        (
            clip_axis(self.x, self.width, image.width),
            clip_axis(self.y, self.height, image.height),
        )
    }
}
