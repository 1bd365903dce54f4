use std::path::Path;

use anyhow::{anyhow, Context as AnyhowContext, Result};
use ::image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use ndarray as nd;
use rusttype::{Font, Scale};

use crate::image::{Image, CHANNELS};
use crate::my_types::*;
use crate::particle::Estimate;
use crate::region::Region;
use crate::tracker::Tracker;

const FONT_DATA: &[u8] = include_bytes!("../assets/DejaVuSansMono.ttf");

const BOX_COLOR: Rgb<u8> = Rgb([0, 0, 255]);
const TAG_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
const LABEL_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const TAG_HEIGHT: u32 = 14;
/// Advance of one label character, plus padding
const TAG_CHAR_WIDTH: u32 = 8;
const LABEL_SCALE: f32 = 12.;

pub trait AsArray {
    fn try_as_array(&self) -> Result<nd::Array3<u8>>;
}

impl AsArray for RgbImage {
    fn try_as_array(&self) -> Result<nd::Array3<u8>> {
        let (width, height) = self.dimensions();
        let a = nd::Array3::from_shape_vec(
            (height as usize, width as usize, CHANNELS),
            self.as_raw().clone(),
        )?;
        Ok(a)
    }
}

pub fn to_rgb_image(image: &Image) -> Result<RgbImage> {
    RgbImage::from_raw(image.width as u32, image.height as u32, image.data.clone())
        .ok_or(anyhow!("image buffer does not match {} x {}", image.width, image.height))
}

fn to_rect(region: &Region) -> Option<Rect> {
    if region.is_degenerate() {
        return None;
    }
    Some(Rect::at(region.x, region.y).of_size(region.width as u32, region.height as u32))
}

/// Draws located objects as boxes tagged with their id
pub struct Renderer {
    font: Font<'static>,
    show_all: bool,
}

impl Renderer {
    pub fn new(show_all: bool) -> Result<Self> {
        let font = Font::try_from_bytes(FONT_DATA).ok_or(anyhow!("cannot load label font"))?;
        Ok(Self { font, show_all })
    }

    /// Copy of `image` with confidently located objects drawn, and their
    /// whole swarm if `show_all`
    pub fn draw(
        &self,
        image: &Image,
        tracker: &Tracker,
        estimates: &[(ObjectId, Estimate)],
    ) -> Result<RgbImage> {
        let mut canvas = to_rgb_image(image)?;
        let threshold = tracker.config().confidence_threshold;
        for (id, estimate) in estimates {
            if !estimate.is_confident(threshold) {
                continue;
            }
            let Some(rect) = to_rect(&estimate.region) else {
                continue;
            };
            draw_hollow_rect_mut(&mut canvas, rect, BOX_COLOR);
            self.draw_tag(&mut canvas, rect.left(), rect.top(), *id);

            if !self.show_all {
                continue;
            }
            if let Some(filter) = tracker.get(*id) {
                for particle in filter.particles() {
                    if let Some(rect) = to_rect(&particle.region(filter.reference_size())) {
                        draw_hollow_rect_mut(&mut canvas, rect, BOX_COLOR);
                    }
                }
            }
        }
        Ok(canvas)
    }

    fn draw_tag(&self, canvas: &mut RgbImage, x: i32, y: i32, id: ObjectId) {
        let label = id.to_string();
        let width = TAG_CHAR_WIDTH * label.len() as u32 + 2;
        draw_filled_rect_mut(canvas, Rect::at(x, y).of_size(width, TAG_HEIGHT), TAG_COLOR);
        draw_text_mut(
            canvas,
            LABEL_COLOR,
            x + 1,
            y + 1,
            Scale::uniform(LABEL_SCALE),
            &self.font,
            &label,
        );
    }
}

pub fn save_image(image: &RgbImage, path: &Path) -> Result<()> {
    image
        .save(path)
        .with_context(|| format!("cannot save {}", path.display()))
}

/// Annotated frames and estimate boxes in a rerun recording
#[cfg(feature = "rerun")]
pub struct Recorder {
    recorder: rerun::RecordingStream,
}

#[cfg(feature = "rerun")]
impl Recorder {
    pub fn new(path: &Path) -> Result<Self> {
        let recorder = rerun::RecordingStreamBuilder::new("particle-tracker").save(path)?;
        Ok(Self { recorder })
    }

    pub fn log_frame(
        &self,
        frame_number: usize,
        image: &RgbImage,
        estimates: &[(ObjectId, Estimate)],
        threshold: f64,
    ) -> Result<()> {
        self.recorder.set_time_sequence("frame", frame_number as i64);
        self.recorder
            .log("camera/image", &rerun::Image::try_from(image.try_as_array()?)?)?;

        let located: Vec<_> = estimates
            .iter()
            .filter(|(_, estimate)| estimate.is_confident(threshold))
            .collect();
        let boxes = rerun::Boxes2D::from_mins_and_sizes(
            located
                .iter()
                .map(|(_, e)| (e.region.x as f32, e.region.y as f32)),
            located
                .iter()
                .map(|(_, e)| (e.region.width as f32, e.region.height as f32)),
        )
        .with_labels(located.iter().map(|(id, _)| id.to_string()));
        self.recorder.log("camera/image/estimates", &boxes)?;
        Ok(())
    }
}
