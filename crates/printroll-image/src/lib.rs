use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use image::codecs::jpeg::{JpegEncoder, PixelDensity};
use image::codecs::png::PngEncoder;
use image::imageops::{self, FilterType};
use image::{DynamicImage, ExtendedColorType, ImageEncoder, Rgb, RgbImage};
use log::{info, warn};
use printroll_core::{plan_layout, LayoutParams, LayoutPlan};
use thiserror::Error;

pub use printroll_core::ImageSize;

pub const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);

#[derive(Debug, Error)]
pub enum ImagingError {
    #[error("failed to load '{}': {source}", .path.display())]
    Load {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("unsupported output format '{}'; expected .jpg, .jpeg or .png", .0.display())]
    UnsupportedOutput(PathBuf),
    #[error("failed to encode canvas: {0}")]
    Encode(#[from] image::ImageError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub fn image_size(image: &DynamicImage) -> ImageSize {
    ImageSize::new(image.width(), image.height())
}

pub fn estimate_rgb_bytes(size: ImageSize) -> u64 {
    (size.width as u64)
        .saturating_mul(size.height as u64)
        .saturating_mul(3)
}

/// Largest size with the same aspect ratio whose longer side is at most `target`.
/// Sizes that already fit are returned as is.
pub fn fit_within(size: ImageSize, target: u32) -> ImageSize {
    if (size.width <= target && size.height <= target) || size.width == 0 || size.height == 0 {
        return size;
    }

    let scale = target as f64 / size.width.max(size.height) as f64;
    let scaled = |side: u32| ((side as f64 * scale).round() as u32).clamp(1, target);
    if size.width >= size.height {
        ImageSize::new(target, scaled(size.height))
    } else {
        ImageSize::new(scaled(size.width), target)
    }
}

/// Downscales with Lanczos3 so neither side exceeds `target`. Never upscales.
pub fn resize_to_fit(image: DynamicImage, target: u32) -> DynamicImage {
    let current = image_size(&image);
    let fitted = fit_within(current, target);
    if fitted == current {
        return image;
    }
    image.resize_exact(fitted.width, fitted.height, FilterType::Lanczos3)
}

pub fn decode_photo(path: &Path) -> Result<DynamicImage, ImagingError> {
    image::open(path).map_err(|source| ImagingError::Load {
        path: path.to_path_buf(),
        source,
    })
}

#[derive(Debug, Clone)]
pub struct Composition {
    pub plan: LayoutPlan,
    pub canvas: RgbImage,
}

/// Lays out `images` in the given order and pastes them onto a white canvas.
/// Returns `None` when there is nothing to render.
pub fn pack(images: &[DynamicImage], params: &LayoutParams) -> Option<Composition> {
    let sizes: Vec<ImageSize> = images.iter().map(image_size).collect();
    let plan = plan_layout(&sizes, params)?;
    info!(
        "Arranging {} photos, ~{} per row",
        images.len(),
        plan.photos_per_row
    );
    let canvas = compose_canvas(images, &plan);
    Some(Composition { plan, canvas })
}

/// Pixels that land outside the canvas are clipped.
pub fn compose_canvas(images: &[DynamicImage], plan: &LayoutPlan) -> RgbImage {
    let size = ImageSize::new(plan.canvas_width, plan.total_height);
    info!(
        "Allocating {}x{} canvas (~{} MiB)",
        size.width,
        size.height,
        estimate_rgb_bytes(size) / (1024 * 1024)
    );
    let mut canvas = RgbImage::from_pixel(size.width, size.height, BACKGROUND);
    for placement in &plan.placements {
        let photo = images[placement.index].to_rgb8();
        imageops::replace(&mut canvas, &photo, placement.x as i64, placement.y as i64);
    }
    canvas
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Jpeg,
    Png,
}

impl OutputFormat {
    pub fn from_path(path: &Path) -> Result<Self, ImagingError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "jpg" | "jpeg" => Ok(Self::Jpeg),
            "png" => Ok(Self::Png),
            _ => Err(ImagingError::UnsupportedOutput(path.to_path_buf())),
        }
    }
}

pub fn encode_canvas<W: Write>(
    canvas: &RgbImage,
    writer: W,
    format: OutputFormat,
    quality: u8,
    dpi: u16,
) -> Result<(), ImagingError> {
    let (width, height) = canvas.dimensions();
    match format {
        OutputFormat::Jpeg => {
            let mut encoder = JpegEncoder::new_with_quality(writer, quality.clamp(1, 100));
            encoder.set_pixel_density(PixelDensity::dpi(dpi));
            encoder.encode(canvas.as_raw(), width, height, ExtendedColorType::Rgb8)?;
        }
        OutputFormat::Png => {
            warn!("PNG output does not carry the {} DPI density", dpi);
            PngEncoder::new(writer).write_image(canvas.as_raw(), width, height, ExtendedColorType::Rgb8)?;
        }
    }
    Ok(())
}

/// Encodes the canvas to `path`, creating parent directories.
pub fn write_canvas(
    canvas: &RgbImage,
    path: &Path,
    quality: u8,
    dpi: u16,
) -> Result<(), ImagingError> {
    let format = OutputFormat::from_path(path)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = BufWriter::new(File::create(path)?);
    encode_canvas(canvas, &mut writer, format, quality, dpi)?;
    writer.flush()?;
    Ok(())
}
