use std::path::Path;

use anyhow::{anyhow, bail, Result};
use cv2::prelude::*;
use opencv as cv2;

use crate::image::Image;

/// Sequential frame reader for a video file
pub struct VideoInput {
    capture: cv2::videoio::VideoCapture,
    bgr: cv2::core::Mat,
    rgb: cv2::core::Mat,
    image: Image,
}

impl VideoInput {
    pub fn new(path: &Path) -> Result<VideoInput> {
        let name = path
            .to_str()
            .ok_or(anyhow!("video path is not valid UTF-8: {}", path.display()))?;
        let capture = cv2::videoio::VideoCapture::from_file(name, cv2::videoio::CAP_ANY)?;
        if !capture.is_opened()? {
            bail!("cannot open video {}", path.display());
        }
        Ok(VideoInput {
            capture,
            bgr: cv2::core::Mat::default(),
            rgb: cv2::core::Mat::default(),
            image: Image::empty(),
        })
    }

    /// Decode the next frame as RGB
    pub fn read(&mut self) -> Result<&Image> {
        if !self.capture.read(&mut self.bgr)? {
            bail!("video has no more frames");
        }
        cv2::imgproc::cvt_color(&self.bgr, &mut self.rgb, cv2::imgproc::COLOR_BGR2RGB, 0)?;

        let size = self.rgb.size()?;
        self.image.data.clear();
        self.image.data.extend_from_slice(self.rgb.data_bytes()?);
        self.image.width = size.width as usize;
        self.image.height = size.height as usize;
        Ok(&self.image)
    }
}
