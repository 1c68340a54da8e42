//! Conversion between raster images and the normalized tensor domain.
//!
//! Networks see pixels linearly mapped from `[0, 255]` to `[-1, 1]` in an
//! `[H, W, 3]` tensor. Inputs larger than a bound are downscaled first so the
//! optimizer's per-step cost stays bounded.

use burn::tensor::backend::Backend;
use burn::tensor::{ElementConversion, Tensor, TensorData};
use image::imageops::FilterType;
use image::{ImageBuffer, ImageOutputFormat, Rgb, Rgb32FImage, RgbImage};
use reverie_abstraction::{DreamError, DreamResult};
use std::borrow::Cow;
use std::io::Cursor;
use tracing::debug;

/// Default bound on the larger image side.
pub const DEFAULT_MAX_DIMENSION: u32 = 512;

/// Resampling filter used when downscaling.
pub const RESIZE_FILTER: FilterType = FilterType::CatmullRom;

/// Dimensions of a `width` x `height` image scaled so neither side exceeds `max_dim`.
///
/// Images already within the bound keep their size. Sides never shrink below 1.
pub fn fit_within(width: u32, height: u32, max_dim: u32) -> (u32, u32) {
    let largest = width.max(height);
    if largest <= max_dim {
        return (width, height);
    }

    let scale = f64::from(max_dim) / f64::from(largest);
    let new_w = ((f64::from(width) * scale).round() as u32).max(1);
    let new_h = ((f64::from(height) * scale).round() as u32).max(1);
    (new_w, new_h)
}

/// Downscales `image` to fit within `max_dim`, borrowing it when no resize is needed.
pub fn resize_to_fit(image: &RgbImage, max_dim: u32) -> Cow<'_, RgbImage> {
    let (w, h) = image.dimensions();
    let (new_w, new_h) = fit_within(w, h, max_dim);

    if (new_w, new_h) == (w, h) {
        return Cow::Borrowed(image);
    }

    debug!(from = format!("{w}x{h}"), to = format!("{new_w}x{new_h}"), "Downscaling input image");
    Cow::Owned(image::imageops::resize(image, new_w, new_h, RESIZE_FILTER))
}

/// Resizes `image` to fit within `max_dim` and maps it into `[-1, 1]`.
///
/// # Errors
/// Returns `DreamError::ConfigurationError` if `max_dim` is zero and
/// `DreamError::ComputationError` for an empty image.
pub fn preprocess<B: Backend>(
    image: &RgbImage,
    max_dim: u32,
    device: &B::Device,
) -> DreamResult<Tensor<B, 3>> {
    if max_dim == 0 {
        return Err(DreamError::ConfigurationError(
            "maximum image dimension must be at least 1".to_string(),
        ));
    }
    if image.width() == 0 || image.height() == 0 {
        return Err(DreamError::ComputationError("input image is empty".to_string()));
    }

    let resized = resize_to_fit(image, max_dim);
    let (w, h) = resized.dimensions();
    let values: Vec<f32> = to_unit_range(&resized).into_raw().into_iter().map(|v| 2.0 * v - 1.0).collect();

    Ok(Tensor::from_data(TensorData::new(values, [h as usize, w as usize, 3]), device))
}

/// Maps an `[H, W, 3]` tensor in `[-1, 1]` back to 8-bit pixels.
///
/// Values are rounded to the nearest level; anything outside the domain saturates.
///
/// # Errors
/// Returns `DreamError::ComputationError` if the tensor is not a non-empty `[H, W, 3]` image.
pub fn postprocess<B: Backend>(tensor: Tensor<B, 3>) -> DreamResult<RgbImage> {
    let [height, width, channels] = tensor.dims();
    if channels != 3 || height == 0 || width == 0 {
        return Err(DreamError::ComputationError(format!(
            "cannot convert a [{height}, {width}, {channels}] tensor to an RGB image"
        )));
    }

    let values: Vec<f32> = tensor
        .into_data()
        .convert::<f32>()
        .to_vec()
        .map_err(|e| DreamError::ComputationError(format!("unreadable tensor data: {e:?}")))?;

    let pixels: Vec<u8> =
        values.iter().map(|v| (255.0 * (v + 1.0) / 2.0).round().clamp(0.0, 255.0) as u8).collect();

    let (width, height) = (dimension(width)?, dimension(height)?);
    RgbImage::from_raw(width, height, pixels).ok_or_else(|| {
        DreamError::ComputationError(format!("pixel buffer does not fit {width}x{height}"))
    })
}

/// Rescales 8-bit pixels to `[0, 1]` floats.
pub fn to_unit_range(image: &RgbImage) -> Rgb32FImage {
    ImageBuffer::from_fn(image.width(), image.height(), |x, y| {
        Rgb(image.get_pixel(x, y).0.map(|c| f32::from(c) / 255.0))
    })
}

/// Smallest and largest value of `tensor`.
pub fn pixel_range<B: Backend>(tensor: &Tensor<B, 3>) -> (f32, f32) {
    let min = tensor.clone().min().into_scalar().elem::<f32>();
    let max = tensor.clone().max().into_scalar().elem::<f32>();
    (min, max)
}

/// Decodes any format the `image` crate reads into RGB pixels.
///
/// # Errors
/// Returns `DreamError::ComputationError` if the bytes are not a decodable image.
pub fn decode(bytes: &[u8]) -> DreamResult<RgbImage> {
    image::load_from_memory(bytes)
        .map(|img| img.to_rgb8())
        .map_err(|e| DreamError::ComputationError(format!("failed to decode image: {e}")))
}

/// Encodes `image` as PNG.
///
/// # Errors
/// Returns `DreamError::ComputationError` if encoding fails.
pub fn encode_png(image: &RgbImage) -> DreamResult<Vec<u8>> {
    let mut buf = Cursor::new(Vec::new());
    image
        .write_to(&mut buf, ImageOutputFormat::Png)
        .map_err(|e| DreamError::ComputationError(format!("failed to encode PNG: {e}")))?;
    Ok(buf.into_inner())
}

fn dimension(side: usize) -> DreamResult<u32> {
    u32::try_from(side)
        .map_err(|_| DreamError::ComputationError(format!("image side {side} is too large")))
}
