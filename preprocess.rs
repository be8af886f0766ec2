//! Input preparation for the MobileNetV2-based face classifiers.

use image::imageops::FilterType;
use image::ImageFormat;
use ndarray::Array4;

use crate::error::{Error, Result};

pub const INPUT_SIZE: u32 = 224;
pub const INPUT_SHAPE: [usize; 4] = [1, INPUT_SIZE as usize, INPUT_SIZE as usize, 3];

/// NHWC batch of one, channel values in [-1, 1].
pub type NormalizedTensor = Array4<f32>;

const ACCEPTED_FORMATS: &[ImageFormat] = &[ImageFormat::Jpeg, ImageFormat::Png];

pub fn preprocess(bytes: &[u8]) -> Result<NormalizedTensor> {
    let format = image::guess_format(bytes)?;
    if !ACCEPTED_FORMATS.contains(&format) {
        return Err(Error::ImageDecode(format!(
            "unsupported image format {format:?}"
        )));
    }
    let img = image::load_from_memory_with_format(bytes, format)?.to_rgb8();
    let resized = image::imageops::resize(&img, INPUT_SIZE, INPUT_SIZE, FilterType::CatmullRom);
    let data = rgb8_to_nhwc_mobilenet(&resized);
    let len = data.len();
    let tensor = Array4::from_shape_vec(INPUT_SHAPE, data).map_err(|_| Error::ShapeMismatch {
        expected: INPUT_SHAPE,
        actual: vec![len],
    })?;
    check_shape(tensor.shape())?;
    Ok(tensor)
}

pub fn check_shape(shape: &[usize]) -> Result<()> {
    if shape != INPUT_SHAPE {
        return Err(Error::ShapeMismatch {
            expected: INPUT_SHAPE,
            actual: shape.to_vec(),
        });
    }
    Ok(())
}

// Keras mobilenet_v2.preprocess_input: x / 127.5 - 1.
fn rgb8_to_nhwc_mobilenet(img: &image::RgbImage) -> Vec<f32> {
    let mut input: Vec<f32> = Vec::with_capacity((img.width() * img.height() * 3) as usize);
    for pixel in img.pixels() {
        input.extend_from_slice(&[
            pixel[0] as f32 / 127.5 - 1.0,
            pixel[1] as f32 / 127.5 - 1.0,
            pixel[2] as f32 / 127.5 - 1.0,
        ]);
    }
    input
}
