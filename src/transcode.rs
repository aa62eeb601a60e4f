use std::io::Cursor;

use image::{
    codecs::avif::AvifEncoder,
    guess_format,
    imageops::FilterType,
    io::{Limits, Reader},
    ColorType, DynamicImage, ImageEncoder, ImageError, ImageOutputFormat,
};
use thiserror::Error;

// allocator limit for decoding, 1 GB
const MAX_DECODE_ALLOC: u64 = 1024 * 1024 * 1024;
// ravif speed, 1 (slowest) to 10
const AVIF_SPEED: u8 = 6;

#[derive(Debug, Error)]
pub enum TranscodeError {
    #[error("Format {0} not supported")]
    UnsupportedFormat(String),
    #[error("Unable to determine Image format")]
    UnknownSourceFormat,
    #[error("Unable to decode source image: {0}")]
    Decode(#[source] ImageError),
    #[error("Requested size {width}x{height} exceeds the maximum of {limit} pixels per side")]
    TooLarge { width: u32, height: u32, limit: u32 },
    #[error("Source image has no pixels")]
    EmptyImage,
    #[error("Error Converting to requested format: {0}")]
    Encode(#[source] ImageError),
    #[error("Error Converting to requested format: {0}")]
    WebP(String),
    #[error("Transcoding task did not complete: {0}")]
    Aborted(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetFormat {
    Jpeg,
    Png,
    WebP,
    Gif,
    Tiff,
    Bmp,
    Avif,
}

impl TargetFormat {
    pub fn from_extension(extension: &str) -> Result<TargetFormat, TranscodeError> {
        match extension.to_ascii_lowercase().as_str() {
            "jpeg" | "jpg" => Ok(TargetFormat::Jpeg),
            "png" => Ok(TargetFormat::Png),
            "webp" => Ok(TargetFormat::WebP),
            "gif" => Ok(TargetFormat::Gif),
            "tiff" | "tif" => Ok(TargetFormat::Tiff),
            "bmp" => Ok(TargetFormat::Bmp),
            "avif" => Ok(TargetFormat::Avif),
            _ => Err(TranscodeError::UnsupportedFormat(extension.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResizeRequest {
    pub width: u32,
    /// `None` keeps the source aspect ratio.
    pub height: Option<u32>,
    pub format: TargetFormat,
    pub quality: u8,
    /// Largest output width or height accepted.
    pub max_dimension: u32,
}

/// Decodes `bytes`, resizes and encodes the result in the requested format.
///
/// With both dimensions the image is scaled to cover the box and
/// center-cropped to exactly `width x height`. With only a width the height
/// follows from the source aspect ratio.
pub fn transcode(bytes: &[u8], request: ResizeRequest) -> Result<Vec<u8>, TranscodeError> {
    // reject before decoding when the requested box alone is out of bounds
    check_dimensions(request.width, request.height.unwrap_or(1), request.max_dimension)?;

    let image = decode(bytes)?;

    let image = match request.height {
        Some(height) => image.resize_to_fill(request.width, height, FilterType::Lanczos3),
        None => {
            let height = scaled_height(image.width(), image.height(), request.width)?;
            check_dimensions(request.width, height, request.max_dimension)?;
            image.resize_exact(request.width, height, FilterType::Lanczos3)
        }
    };

    encode(&image, request.format, request.quality)
}

/// Runs [`transcode`] on the blocking pool so the runtime threads stay free.
pub async fn transcode_blocking(
    bytes: Vec<u8>,
    request: ResizeRequest,
) -> Result<Vec<u8>, TranscodeError> {
    tokio::task::spawn_blocking(move || transcode(&bytes, request))
        .await
        .map_err(|e| TranscodeError::Aborted(e.to_string()))?
}

fn decode(bytes: &[u8]) -> Result<DynamicImage, TranscodeError> {
    let fetched_format = guess_format(bytes).map_err(|_| TranscodeError::UnknownSourceFormat)?;

    let mut decoder = Reader::new(Cursor::new(bytes));
    decoder.set_format(fetched_format);
    let mut limits = Limits::no_limits();
    limits.max_alloc = Some(MAX_DECODE_ALLOC);
    decoder.limits(limits);

    decoder.decode().map_err(TranscodeError::Decode)
}

fn check_dimensions(width: u32, height: u32, limit: u32) -> Result<(), TranscodeError> {
    if width > limit || height > limit {
        return Err(TranscodeError::TooLarge {
            width,
            height,
            limit,
        });
    }
    Ok(())
}

fn scaled_height(source_width: u32, source_height: u32, width: u32) -> Result<u32, TranscodeError> {
    if source_width == 0 || source_height == 0 {
        return Err(TranscodeError::EmptyImage);
    }
    let height = (f64::from(source_height) * f64::from(width) / f64::from(source_width)).round();
    Ok((height as u32).max(1))
}

fn encode(image: &DynamicImage, format: TargetFormat, quality: u8) -> Result<Vec<u8>, TranscodeError> {
    match format {
        TargetFormat::WebP => {
            let image = if image.color().has_alpha() {
                DynamicImage::ImageRgba8(image.to_rgba8())
            } else {
                DynamicImage::ImageRgb8(image.to_rgb8())
            };
            let encoder = webp::Encoder::from_image(&image)
                .map_err(|e| TranscodeError::WebP(e.to_string()))?;
            Ok(encoder.encode(f32::from(quality)).to_vec())
        }
        // jpeg has no alpha channel
        TargetFormat::Jpeg => write(
            &DynamicImage::ImageRgb8(image.to_rgb8()),
            ImageOutputFormat::Jpeg(quality),
        ),
        TargetFormat::Png => write(image, ImageOutputFormat::Png),
        TargetFormat::Gif => write(
            &DynamicImage::ImageRgba8(image.to_rgba8()),
            ImageOutputFormat::Gif,
        ),
        TargetFormat::Tiff => write(image, ImageOutputFormat::Tiff),
        TargetFormat::Bmp => write(image, ImageOutputFormat::Bmp),
        TargetFormat::Avif => {
            let rgba = image.to_rgba8();
            let mut buffer = Vec::new();
            AvifEncoder::new_with_speed_quality(&mut buffer, AVIF_SPEED, quality)
                .write_image(rgba.as_raw(), rgba.width(), rgba.height(), ColorType::Rgba8)
                .map_err(TranscodeError::Encode)?;
            Ok(buffer)
        }
    }
}

fn write(image: &DynamicImage, format: ImageOutputFormat) -> Result<Vec<u8>, TranscodeError> {
    let mut buffer = Cursor::new(Vec::new());
    image
        .write_to(&mut buffer, format)
        .map_err(TranscodeError::Encode)?;
    Ok(buffer.into_inner())
}
