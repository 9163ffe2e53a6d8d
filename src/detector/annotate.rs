//! Annotation rendering
//!
//! Draws detection boxes onto a JPEG frame and re-encodes it.

use crate::error::Result;
use crate::models::{Detection, Frame};
use image::codecs::jpeg::JpegEncoder;
use image::{ImageFormat, Rgb, RgbImage};

/// Box outline colour
const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);

/// Outline thickness in pixels
const BOX_THICKNESS: u32 = 3;

const JPEG_QUALITY: u8 = 90;

/// Render `detections` onto `frame`
pub fn render_detections(frame: &Frame, detections: &[Detection]) -> Result<Frame> {
    let mut img = image::load_from_memory_with_format(frame.bytes(), ImageFormat::Jpeg)?.to_rgb8();

    for det in detections {
        draw_box(&mut img, det);
    }

    let mut out = Vec::with_capacity(frame.len());
    JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY).encode_image(&img)?;
    Ok(Frame::from_jpeg(out))
}

fn draw_box(img: &mut RgbImage, det: &Detection) {
    let (w, h) = img.dimensions();
    if w == 0 || h == 0 {
        return;
    }

    let clamp_x = |v: f32| (v.max(0.0) as u32).min(w - 1);
    let clamp_y = |v: f32| (v.max(0.0) as u32).min(h - 1);
    let (x1, x2) = (clamp_x(det.bbox.x1.min(det.bbox.x2)), clamp_x(det.bbox.x1.max(det.bbox.x2)));
    let (y1, y2) = (clamp_y(det.bbox.y1.min(det.bbox.y2)), clamp_y(det.bbox.y1.max(det.bbox.y2)));

    for t in 0..BOX_THICKNESS {
        let top = (y1 + t).min(y2);
        let bottom = y2.saturating_sub(t).max(y1);
        for x in x1..=x2 {
            img.put_pixel(x, top, BOX_COLOR);
            img.put_pixel(x, bottom, BOX_COLOR);
        }

        let left = (x1 + t).min(x2);
        let right = x2.saturating_sub(t).max(x1);
        for y in y1..=y2 {
            img.put_pixel(left, y, BOX_COLOR);
            img.put_pixel(right, y, BOX_COLOR);
        }
    }
}
