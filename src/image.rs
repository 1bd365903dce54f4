use anyhow::{bail, Result};

pub const CHANNELS: usize = 3;

/// Exclusive upper bound of the hue channel after `to_hsv`
pub const HUE_RANGE: u16 = 180;

/// Row-major storage of 3-channel pixels, channels interleaved.
///
/// The same type holds RGB frames and their HSV conversion; which one a value
/// holds is up to the owner (see `Frame`).
#[derive(Clone, Debug)]
pub struct Image {
    pub data: Vec<u8>,
    pub width: usize,
    pub height: usize,
}

impl Image {
    /// Create an empty image
    pub fn empty() -> Image {
        Image {
            data: vec![],
            width: 0,
            height: 0,
        }
    }

    /// Create an image filled with one pixel value
    pub fn filled(width: usize, height: usize, pixel: [u8; 3]) -> Image {
        let mut data = Vec::with_capacity(width * height * CHANNELS);
        for _ in 0..width * height {
            data.extend_from_slice(&pixel);
        }
        Image {
            data,
            width,
            height,
        }
    }

    pub fn from_raw(width: usize, height: usize, data: Vec<u8>) -> Result<Image> {
        if data.len() != width * height * CHANNELS {
            bail!(
                "buffer of {} bytes does not hold a {width} x {height} image",
                data.len()
            );
        }
        Ok(Image {
            data,
            width,
            height,
        })
    }

    /// Clear the image storage
    pub fn clear(&mut self) {
        self.data.clear();
        self.width = 0;
        self.height = 0;
    }

    /// Get the size for a chosen dimension
    pub fn size(&self, dim: usize) -> usize {
        if dim == 0 {
            self.width
        } else {
            self.height
        }
    }

    #[inline(always)]
    pub fn pixel(&self, x: usize, y: usize) -> [u8; 3] {
        let i = (y * self.width + x) * CHANNELS;
        [self.data[i], self.data[i + 1], self.data[i + 2]]
    }

    #[inline(always)]
    pub fn set_pixel(&mut self, x: usize, y: usize, value: [u8; 3]) {
        let i = (y * self.width + x) * CHANNELS;
        self.data[i..i + CHANNELS].copy_from_slice(&value);
    }

    /// Paint a solid rectangle, clipped to the image
    pub fn fill_rect(&mut self, x: i32, y: i32, width: i32, height: i32, value: [u8; 3]) {
        let x0 = x.max(0) as usize;
        let y0 = y.max(0) as usize;
        let x1 = (x + width).clamp(0, self.width as i32) as usize;
        let y1 = (y + height).clamp(0, self.height as i32) as usize;
        for yy in y0..y1 {
            for xx in x0..x1 {
                self.set_pixel(xx, yy, value);
            }
        }
    }

    /// Convert an RGB image to HSV, writing into `out` and reusing its buffer.
    ///
    /// Ranges follow the 8-bit OpenCV convention: hue in [0, 180), saturation
    /// and value in [0, 255].
    pub fn to_hsv(&self, out: &mut Image) {
        out.data.clear();
        out.data.reserve(self.data.len());
        out.width = self.width;
        out.height = self.height;
        for rgb in self.data.chunks_exact(CHANNELS) {
            out.data.extend_from_slice(&rgb_to_hsv([rgb[0], rgb[1], rgb[2]]));
        }
    }
}

pub fn rgb_to_hsv(rgb: [u8; 3]) -> [u8; 3] {
    let [r, g, b] = rgb.map(|c| c as f32);
    let v = r.max(g).max(b);
    let min = r.min(g).min(b);
    let diff = v - min;

    let s = if v > 0. { 255. * diff / v } else { 0. };

    let mut h = if diff == 0. {
        0.
    } else if v == r {
        60. * (g - b) / diff
    } else if v == g {
        120. + 60. * (b - r) / diff
    } else {
        240. + 60. * (r - g) / diff
    };
    if h < 0. {
        h += 360.
    }

    let mut h = (h / 2.).round() as u16;
    if h >= HUE_RANGE {
        h -= HUE_RANGE;
    }
    [h as u8, s.round() as u8, v as u8]
}
