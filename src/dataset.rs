use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use anyhow::{bail, Result, Context as AnyhowContext};
use serde::Deserialize;
use log::{debug, warn};

use crate::image::Image;
use crate::region::Region;
#[cfg(feature = "video")]
use crate::video::VideoInput;

/// Scripted frame source and region selector.
///
/// `data.jsonl` holds one JSON object per line. A line with `"frame"` names
/// an image file relative to the dataset folder; a line with `"frames"` takes
/// the next frame of `data.mp4` (needs the `video` feature). Either may carry
/// `"select"`, a list of regions to start tracking on that frame.
pub struct Dataset {
    folder: PathBuf,
    reader: BufReader<File>,
    line: String,
    /// Number of frame lines
    pub length: u64,
    #[cfg(feature = "video")]
    video_input: Option<VideoInput>,
}

pub struct InputFrame {
    pub time: f64,
    /// RGB image
    pub image: Image,
    pub selections: Vec<Region>,
}

#[derive(Deserialize)]
struct Record {
    time: f64,
    frame: Option<String>,
    frames: Option<serde_json::Value>,
    #[serde(default)]
    select: Vec<Region>,
}

impl Dataset {
    pub fn new(path: &Path) -> Result<Dataset> {
        let data_path = path.join("data.jsonl");
        let file = File::open(&data_path)
            .with_context(|| format!("cannot open {}", data_path.display()))?;

        let mut length = 0;
        for line in BufReader::new(File::open(&data_path)?).lines() {
            if line?.contains("\"frame") {
                length += 1;
            }
        }

        #[cfg(feature = "video")]
        let video_input = {
            let video_path = path.join("data.mp4");
            if video_path.exists() {
                Some(VideoInput::new(&video_path)?)
            } else {
                None
            }
        };

        Ok(Dataset {
            folder: path.to_path_buf(),
            reader: BufReader::new(file),
            line: String::new(),
            length,
            #[cfg(feature = "video")]
            video_input,
        })
    }

    pub fn next(&mut self) -> Result<Option<InputFrame>> {
        loop {
            self.line.clear();
            match self.reader.read_line(&mut self.line) {
                Ok(0) => return Ok(None),
                Err(err) => bail!("Failed to read line {}", err),
                _ => {}
            }
            if self.line.trim().is_empty() {
                continue;
            }

            let record: Record = serde_json::from_str(&self.line)
                .context(format!("JSON deserialization failed for line: {}", self.line))?;

            let image = if let Some(name) = &record.frame {
                read_image(&self.folder.join(name))?
            } else if record.frames.is_some() {
                self.read_video()?
            } else {
                warn!("Unrecognised data format {}", self.line.trim_end());
                continue;
            };

            debug!("frame at {} with {} selections", record.time, record.select.len());
            return Ok(Some(InputFrame {
                time: record.time,
                image,
                selections: record.select,
            }));
        }
    }

    #[cfg(feature = "video")]
    fn read_video(&mut self) -> Result<Image> {
        match self.video_input.as_mut() {
            Some(video_input) => Ok(video_input.read()?.clone()),
            None => bail!("{} has no data.mp4", self.folder.display()),
        }
    }

    #[cfg(not(feature = "video"))]
    fn read_video(&mut self) -> Result<Image> {
        bail!("reading data.mp4 requires the `video` feature")
    }
}

/// Decode an image file to RGB
pub fn read_image(path: &Path) -> Result<Image> {
    let rgb = ::image::open(path)
        .with_context(|| format!("cannot decode {}", path.display()))?
        .to_rgb8();
    let (width, height) = rgb.dimensions();
    Image::from_raw(width as usize, height as usize, rgb.into_raw())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_dataset(name: &str, lines: &[&str]) -> PathBuf {
        let folder = std::env::temp_dir().join(format!("particle-tracker-{name}-{}", std::process::id()));
        std::fs::create_dir_all(&folder).unwrap();

        let mut rgb = ::image::RgbImage::new(16, 12);
        for (x, _, pixel) in rgb.enumerate_pixels_mut() {
            *pixel = if x < 8 { ::image::Rgb([255, 0, 0]) } else { ::image::Rgb([0, 0, 255]) };
        }
        rgb.save(folder.join("0000.png")).unwrap();

        let mut file = File::create(folder.join("data.jsonl")).unwrap();
        for line in lines {
            writeln!(file, "{line}").unwrap();
        }
        folder
    }

    #[test]
    fn test_read_frames() {
        let folder = write_dataset(
            "frames",
            &[
                r#"{"time": 0.0, "frame": "0000.png", "select": [{"x": 1, "y": 2, "width": 6, "height": 5}]}"#,
                r#"{"time": 0.5, "groundTruth": {}}"#,
                "",
                r#"{"time": 1.0, "frame": "0000.png"}"#,
            ],
        );
        let mut dataset = Dataset::new(&folder).unwrap();
        assert_eq!(dataset.length, 2);

        let first = dataset.next().unwrap().unwrap();
        assert_eq!(first.time, 0.);
        assert_eq!((first.image.width, first.image.height), (16, 12));
        assert_eq!(first.image.pixel(2, 2), [255, 0, 0]);
        assert_eq!(first.image.pixel(12, 2), [0, 0, 255]);
        assert_eq!(first.selections, vec![Region::new(1, 2, 6, 5)]);

        let second = dataset.next().unwrap().unwrap();
        assert_eq!(second.time, 1.);
        assert!(second.selections.is_empty());

        assert!(dataset.next().unwrap().is_none());
        std::fs::remove_dir_all(folder).unwrap();
    }

    #[test]
    fn test_bad_lines() {
        let folder = write_dataset("bad", &["not json", r#"{"time": 0.0, "frame": "missing.png"}"#]);
        let mut dataset = Dataset::new(&folder).unwrap();
        assert!(dataset.next().is_err());
        assert!(dataset.next().is_err());
        std::fs::remove_dir_all(folder).unwrap();
    }

    #[test]
    fn test_missing_dataset() {
        assert!(Dataset::new(Path::new("/nonexistent/particle-tracker")).is_err());
    }
}
