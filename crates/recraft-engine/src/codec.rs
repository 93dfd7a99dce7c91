//! Conversion between host tensors and encoded image bytes.
//!
//! Image tensors are `[batch, height, width, channels]` with 1 (L), 2 (LA),
//! 3 (RGB) or 4 (RGBA) channels; mask tensors are `[batch, height, width]`.
//! Only the first batch item is encoded. Decoding keeps the source colour
//! mode at 8 bits per channel.

use std::io::Cursor;

use anyhow::{bail, Context, Result};
use image::{DynamicImage, GrayImage, ImageBuffer, ImageFormat, Luma, LumaA, Pixel, Rgb, Rgba};
use ndarray::{Array3, Array4, ArrayView3, ArrayView4, Axis};

pub type ImageTensor = Array4<f32>;
pub type MaskTensor = Array3<f32>;

/// Midpoint of the 0–255 range; mask pixels at or above it become opaque.
pub const MASK_THRESHOLD: f32 = 127.5;

/// A tensor element that can be mapped onto the 0–255 byte scale.
pub trait Sample: Copy {
    /// Value on the 0–255 scale, clamped.
    fn level(self) -> f32;
}

impl Sample for f32 {
    fn level(self) -> f32 {
        if self.is_nan() {
            return 0.0;
        }
        (self * 255.0).clamp(0.0, 255.0)
    }
}

impl Sample for f64 {
    fn level(self) -> f32 {
        (self as f32).level()
    }
}

impl Sample for u8 {
    fn level(self) -> f32 {
        f32::from(self)
    }
}

pub fn quantize(level: f32) -> u8 {
    level.round().clamp(0.0, 255.0) as u8
}

pub fn binarize(level: f32) -> u8 {
    if level >= MASK_THRESHOLD {
        255
    } else {
        0
    }
}

/// Encodes the first image of the batch as PNG.
pub fn encode_image<S: Sample>(tensor: ArrayView4<'_, S>) -> Result<Vec<u8>> {
    let frame = first_frame(tensor)?;
    let (height, width, channels) = frame.dim();
    let (width, height) = dimensions(width, height)?;
    let raw = frame.iter().map(|sample| quantize(sample.level())).collect();

    let image = match channels {
        1 => DynamicImage::ImageLuma8(buffer::<Luma<u8>>(width, height, raw)?),
        2 => DynamicImage::ImageLumaA8(buffer::<LumaA<u8>>(width, height, raw)?),
        3 => DynamicImage::ImageRgb8(buffer::<Rgb<u8>>(width, height, raw)?),
        4 => DynamicImage::ImageRgba8(buffer::<Rgba<u8>>(width, height, raw)?),
        other => bail!("unsupported channel count {other}; expected 1, 2, 3 or 4"),
    };
    write_png(&image)
}

/// Encodes the first mask of the batch as a binary single-channel PNG.
pub fn encode_mask<S: Sample>(tensor: ArrayView3<'_, S>) -> Result<Vec<u8>> {
    if tensor.len_of(Axis(0)) == 0 {
        bail!("mask tensor batch is empty");
    }
    let frame = tensor.index_axis(Axis(0), 0);
    let (height, width) = frame.dim();
    let (width, height) = dimensions(width, height)?;
    let raw = frame.iter().map(|sample| binarize(sample.level())).collect();
    let mask: GrayImage = buffer(width, height, raw)?;
    write_png(&DynamicImage::ImageLuma8(mask))
}

/// Decodes any supported image file into a single-item `[0, 1]` batch.
pub fn decode_image(bytes: &[u8]) -> Result<ImageTensor> {
    let decoded = image::load_from_memory(bytes).context("failed decoding image bytes")?;
    let (width, height) = (decoded.width() as usize, decoded.height() as usize);
    let color = decoded.color();
    let (channels, raw) = match (color.has_color(), color.has_alpha()) {
        (false, false) => (1, decoded.to_luma8().into_raw()),
        (false, true) => (2, decoded.to_luma_alpha8().into_raw()),
        (true, false) => (3, decoded.to_rgb8().into_raw()),
        (true, true) => (4, decoded.to_rgba8().into_raw()),
    };
    let normalized = raw
        .into_iter()
        .map(|value| f32::from(value) / 255.0)
        .collect::<Vec<f32>>();
    Array4::from_shape_vec((1, height, width, channels), normalized)
        .context("decoded pixel buffer does not match image dimensions")
}

/// First channel of the first image, as a one-item mask batch.
pub fn mask_from_image(tensor: &ImageTensor) -> Result<MaskTensor> {
    let frame = first_frame(tensor.view())?;
    if frame.len_of(Axis(2)) == 0 {
        bail!("image tensor has no channels");
    }
    Ok(frame.index_axis(Axis(2), 0).to_owned().insert_axis(Axis(0)))
}

fn first_frame<S>(tensor: ArrayView4<'_, S>) -> Result<ArrayView3<'_, S>> {
    if tensor.len_of(Axis(0)) == 0 {
        bail!("image tensor batch is empty");
    }
    Ok(tensor.index_axis_move(Axis(0), 0))
}

fn dimensions(width: usize, height: usize) -> Result<(u32, u32)> {
    if width == 0 || height == 0 {
        bail!("image tensor has zero-sized dimensions ({width}x{height})");
    }
    let width = u32::try_from(width).context("image width exceeds u32")?;
    let height = u32::try_from(height).context("image height exceeds u32")?;
    Ok((width, height))
}

fn buffer<P>(width: u32, height: u32, raw: Vec<u8>) -> Result<ImageBuffer<P, Vec<u8>>>
where
    P: Pixel<Subpixel = u8>,
{
    ImageBuffer::from_raw(width, height, raw)
        .context("pixel buffer does not match tensor dimensions")
}

fn write_png(image: &DynamicImage) -> Result<Vec<u8>> {
    let mut cursor = Cursor::new(Vec::new());
    image
        .write_to(&mut cursor, ImageFormat::Png)
        .context("failed encoding PNG")?;
    Ok(cursor.into_inner())
}
