//! Photo discovery and loading.
//!
//! Everything that touches the filesystem before layout lives here, so the
//! packer can be driven with in-memory images.

use std::io;
use std::path::{Path, PathBuf};

use image::DynamicImage;
use log::{info, warn};
use printroll_core::{CoreError, ImageSize, LayoutParams};
use printroll_image::{decode_photo, image_size, resize_to_fit};
use walkdir::WalkDir;

pub const SUPPORTED_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

#[derive(Debug, Clone)]
pub struct LoadedPhoto {
    pub path: PathBuf,
    /// Decoded size before resizing.
    pub original: ImageSize,
    pub image: DynamicImage,
}

pub fn is_supported_photo(path: &Path) -> bool {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    SUPPORTED_EXTENSIONS.contains(&ext.as_str())
}

/// A link below the root whose target is gone. It is listed like any other
/// file but cannot be opened, so it is skipped the same way as a bad photo.
fn is_dangling_link(err: &walkdir::Error) -> bool {
    err.depth() > 0 && err.io_error().map(io::Error::kind) == Some(io::ErrorKind::NotFound)
}

fn walk_error(err: walkdir::Error) -> CoreError {
    let kind = err.io_error().map(io::Error::kind).unwrap_or(io::ErrorKind::Other);
    CoreError::Io(io::Error::new(kind, err.to_string()))
}

/// Lists photo files under `dir`, sorted by path. Symlinks are followed.
/// A directory that cannot be read is an error, not an empty result.
pub fn discover_photos(dir: &Path, recursive: bool) -> Result<Vec<PathBuf>, CoreError> {
    if !dir.exists() {
        return Err(CoreError::InputNotFound(dir.to_path_buf()));
    }
    if !dir.is_dir() {
        return Err(CoreError::InputNotDirectory(dir.to_path_buf()));
    }

    let walker = WalkDir::new(dir).follow_links(true);
    let walker = if recursive { walker } else { walker.max_depth(1) };
    let mut out = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) if is_dangling_link(&err) => {
                warn!("Skipping {}", err);
                continue;
            }
            Err(err) => return Err(walk_error(err)),
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let p = entry.into_path();
        if is_supported_photo(&p) {
            out.push(p);
        }
    }
    out.sort();
    Ok(out)
}

/// Decodes and resizes each path in order. Files that fail to decode are
/// logged and skipped.
pub fn load_photos(paths: &[PathBuf], target_size: u32) -> Vec<LoadedPhoto> {
    let mut photos = Vec::with_capacity(paths.len());
    for path in paths {
        let decoded = match decode_photo(path) {
            Ok(image) => image,
            Err(err) => {
                warn!("Error loading {}: {}", path.display(), err);
                continue;
            }
        };
        let original = image_size(&decoded);
        let image = resize_to_fit(decoded, target_size);
        let size = image_size(&image);
        let name = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
        info!("Loaded: {} - Size: {}x{}", name, size.width, size.height);
        photos.push(LoadedPhoto {
            path: path.clone(),
            original,
            image,
        });
    }
    photos
}

/// Discovery plus loading, resizing to `params.target_photo_size`. Fails with
/// [`CoreError::EmptyInput`] when no file matches or none of them decode.
pub fn collect_photos(
    dir: &Path,
    recursive: bool,
    params: &LayoutParams,
) -> Result<Vec<LoadedPhoto>, CoreError> {
    let paths = discover_photos(dir, recursive)?;
    if paths.is_empty() {
        return Err(CoreError::EmptyInput(dir.to_path_buf()));
    }
    info!("Found {} photos", paths.len());

    let photos = load_photos(&paths, params.target_photo_size);
    if photos.is_empty() {
        warn!("No images loaded!");
        return Err(CoreError::EmptyInput(dir.to_path_buf()));
    }
    Ok(photos)
}
