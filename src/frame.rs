use crate::image::Image;

/// A decoded color frame and its HSV representation
#[derive(Debug)]
pub struct Frame {
    /// RGB image, drawn on by the renderer
    pub image: Image,
    /// HSV image the filters score against
    pub hsv: Image,
}

impl Frame {
    pub fn new(input_image: &Image, unused_frame: Option<Frame>) -> Frame {
        let mut frame = if let Some(mut unused_frame) = unused_frame {
            // Move data buffer from old unused frame to the new frame to avoid allocation
            unused_frame.image.clear();
            unused_frame
        } else {
            Frame {
                image: Image::empty(),
                hsv: Image::empty(),
            }
        };

        frame.image.data.extend(input_image.data.iter());
        frame.image.width = input_image.width;
        frame.image.height = input_image.height;
        frame.image.to_hsv(&mut frame.hsv);

        frame
    }
}
