use crate::histogram::ColorHistogram;
use crate::image::Image;
use crate::my_types::*;
use crate::region::Region;

/// Multi-resolution color fingerprint of a region.
///
/// Level 0 covers the whole region; every following level halves the width
/// and height of the previous one around the same center.
#[derive(Clone, Debug)]
pub struct Signature {
    pub levels: Vec<ColorHistogram>,
    bins: [usize; 3],
    alpha: f64,
    score_scale: f64,
}

/// Regions of every level for a candidate at `center` with level-0 `size`
pub fn level_regions(center: Vector2i, size: Vector2i, depth: usize) -> impl Iterator<Item = Region> {
    (0..depth).map(move |level| Region::centered(center, size.map(|s| s >> level)))
}

impl Signature {
    pub fn compute(
        image: &Image,
        center: Vector2i,
        size: Vector2i,
        depth: usize,
        bins: [usize; 3],
        alpha: f64,
        score_scale: f64,
    ) -> Self {
        let levels = level_regions(center, size, depth)
            .map(|region| ColorHistogram::normalized(image, &region, bins))
            .collect();
        Self {
            levels,
            bins,
            alpha,
            score_scale,
        }
    }

    pub fn depth(&self) -> usize {
        self.levels.len()
    }

    /// Similarity of the candidate region to this signature.
    ///
    /// Returns None if any level of the candidate leaves the image. Per-level
    /// similarities `1 - distance` are weighted by `alpha^level`, so the most
    /// local levels count the most.
    pub fn compare(&self, image: &Image, center: Vector2i, size: Vector2i) -> Option<f64> {
        let mut weight = 0.;
        let mut alpha = 1.;
        for (region, reference) in level_regions(center, size, self.depth()).zip(&self.levels) {
            if !region.is_inside(image) {
                return None;
            }
            let hist = ColorHistogram::normalized(image, &region, self.bins);
            weight += alpha * (1. - reference.bhattacharyya(&hist));
            alpha *= self.alpha;
        }
        Some(self.score_scale * weight / (alpha - 1.))
    }

    /// Score of a candidate identical to the reference region.
    ///
    /// This is `score_scale / (alpha - 1)`, so 1 only when
    /// `score_scale == alpha - 1` as with the defaults (3 and 4).
    pub fn max_score(&self) -> f64 {
        let total = self.alpha.powi(self.depth() as i32);
        let weights: f64 = (0..self.depth()).map(|d| self.alpha.powi(d as i32)).sum();
        self.score_scale * weights / (total - 1.)
    }
}
