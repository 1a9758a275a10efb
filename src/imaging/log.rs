//! Debug dump of intermediate pipeline images.
//!
//! Every call is traced. Files are only written after a directory has been set
//! with [`set_image_log_dir`].

use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::sync::atomic::{AtomicUsize, Ordering};

use image::DynamicImage;

static LOG_DIR: OnceLock<PathBuf> = OnceLock::new();
static LOG_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// Enable writing logged images to `dir`.
///
/// Can only be set once per process; later calls return `false`.
pub fn set_image_log_dir(dir: impl AsRef<Path>) -> crate::Result<bool> {
    let dir = dir.as_ref();
    std::fs::create_dir_all(dir)?;
    Ok(LOG_DIR.set(dir.to_path_buf()).is_ok())
}

/// Directory logged images are written to, if any
pub fn image_log_dir() -> Option<&'static Path> {
    LOG_DIR.get().map(PathBuf::as_path)
}

/// Record an intermediate image under `label`.
///
/// Returns the written path when file logging is enabled. Write failures are
/// reported as warnings and never abort the caller.
pub fn log_img(image: &DynamicImage, label: &str) -> Option<PathBuf> {
    tracing::debug!("{}: {}x{} image", label, image.width(), image.height());

    let dir = LOG_DIR.get()?;
    let idx = LOG_COUNTER.fetch_add(1, Ordering::Relaxed);
    let path = dir.join(format!("{:03}_{}.png", idx, file_label(label)));

    match image.save(&path) {
        Ok(()) => Some(path),
        Err(e) => {
            tracing::warn!("Failed to log image {:?}: {}", path, e);
            None
        }
    }
}

fn file_label(label: &str) -> String {
    label
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect()
}
