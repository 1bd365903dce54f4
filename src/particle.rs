use serde::Serialize;

use crate::my_types::*;
use crate::region::Region;

/// One position/scale hypothesis of an object's location
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Particle {
    pub position: Vector2i,
    pub scale: f64,
    pub weight: f64,
}

impl Particle {
    pub fn new(position: Vector2i, scale: f64, weight: f64) -> Self {
        Particle {
            position,
            scale,
            weight,
        }
    }

    /// Pixel extent of the particle for a reference size at scale 1
    pub fn size(&self, reference_size: Vector2i) -> Vector2i {
        scaled_size(reference_size, self.scale)
    }

    pub fn region(&self, reference_size: Vector2i) -> Region {
        Region::centered(self.position, self.size(reference_size))
    }
}

/// Truncates towards zero like the integer conversion of a pixel size
pub fn scaled_size(reference_size: Vector2i, scale: f64) -> Vector2i {
    reference_size.map(|s| (s as f64 * scale) as i32)
}

/// Best particle of a swarm at one frame
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Estimate {
    pub x: i32,
    pub y: i32,
    pub scale: f64,
    pub weight: f64,
    pub region: Region,
}

impl Estimate {
    pub fn new(particle: &Particle, reference_size: Vector2i) -> Self {
        Estimate {
            x: particle.position.x,
            y: particle.position.y,
            scale: particle.scale,
            weight: particle.weight,
            region: particle.region(reference_size),
        }
    }

    pub fn position(&self) -> Vector2i {
        Vector2i::new(self.x, self.y)
    }

    /// Whether the object counts as located this frame
    pub fn is_confident(&self, threshold: f64) -> bool {
        self.weight >= threshold
    }
}
