use ndarray as nd;

use crate::image::{Image, HUE_RANGE};
use crate::region::Region;

/// Joint hue/saturation/value histogram
#[derive(Clone, Debug, PartialEq)]
pub struct ColorHistogram {
    pub bins: nd::Array3<f32>,
}

impl ColorHistogram {
    /// Count the HSV pixels of `region` that fall inside `image`.
    ///
    /// Hue is binned over [0, 180), saturation and value over [0, 256).
    pub fn compute(image: &Image, region: &Region, bins: [usize; 3]) -> Self {
        let mut hist = nd::Array3::<f32>::zeros((bins[0], bins[1], bins[2]));
        let ranges = [HUE_RANGE as usize, 256, 256];
        let ([x0, x1], [y0, y1]) = region.clip(image);
        for y in y0..y1 {
            for x in x0..x1 {
                let pixel = image.pixel(x, y);
                let mut index = [0; 3];
                let mut in_range = true;
                for c in 0..3 {
                    let v = pixel[c] as usize;
                    if v >= ranges[c] {
                        in_range = false;
                        break;
                    }
                    index[c] = v * bins[c] / ranges[c];
                }
                if in_range {
                    hist[index] += 1.;
                }
            }
        }
        ColorHistogram { bins: hist }
    }

    /// Scale bins so they sum to one. An empty histogram stays empty.
    pub fn normalize(&mut self) {
        let sum = self.sum();
        if sum > 0. {
            self.bins /= sum;
        }
    }

    /// Histogram of the region, L1-normalized
    pub fn normalized(image: &Image, region: &Region, bins: [usize; 3]) -> Self {
        let mut hist = Self::compute(image, region, bins);
        hist.normalize();
        hist
    }

    pub fn sum(&self) -> f32 {
        self.bins.sum()
    }

    /// Bhattacharyya distance in [0, 1], 0 for identical distributions.
    ///
    /// Histograms with no mass on either side are at distance 1.
    pub fn bhattacharyya(&self, other: &ColorHistogram) -> f64 {
        assert_eq!(self.bins.dim(), other.bins.dim());

        let mut s1 = 0.;
        let mut s2 = 0.;
        let mut coefficient = 0.;
        nd::Zip::from(&self.bins)
            .and(&other.bins)
            .for_each(|&a, &b| {
                let (a, b) = (a as f64, b as f64);
                s1 += a;
                s2 += b;
                coefficient += (a * b).sqrt();
            });

        let norm = s1 * s2;
        if norm <= 0. {
            return 1.;
        }
        (1. - coefficient / norm.sqrt()).max(0.).sqrt()
    }
}
