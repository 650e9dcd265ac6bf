//! Image preparation for upload
//!
//! Platforms cap upload sizes (Bluesky at roughly 1 MB). Images over the
//! cap are downscaled with ImageMagick into a temporary file that is
//! removed when the `PreparedImage` is dropped.

use std::path::{Path, PathBuf};
use tempfile::TempPath;
use tokio::process::Command;

use crate::error::{PlatformError, Result};

/// Longest edge after downscaling; `>` only ever shrinks
const RESIZE_GEOMETRY: &str = "2048x2048>";
const JPEG_QUALITY: &str = "92";

/// An image ready to upload
#[derive(Debug)]
pub struct PreparedImage {
    path: PathBuf,
    temp: Option<TempPath>,
}

impl PreparedImage {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the image was re-encoded to fit the size limit
    pub fn was_resized(&self) -> bool {
        self.temp.is_some()
    }
}

/// Return `path` unchanged if it fits `max_bytes`, otherwise a downscaled copy
///
/// # Errors
///
/// Returns `PlatformError::Media` if the file cannot be read, ImageMagick is
/// not installed, the format is not JPEG or PNG, or the re-encoded image is
/// still over the limit.
pub async fn prepare_for_upload(path: &Path, max_bytes: u64) -> Result<PreparedImage> {
    let size = file_size(path)?;
    if size <= max_bytes {
        return Ok(PreparedImage {
            path: path.to_path_buf(),
            temp: None,
        });
    }

    tracing::info!(
        "Resizing before upload: {} ({:.2} MB > {:.2} MB)",
        path.display(),
        mb(size),
        mb(max_bytes)
    );

    let magick = which::which("magick")
        .or_else(|_| which::which("convert"))
        .map_err(|_| {
            PlatformError::Media(
                "ImageMagick is required to resize large images (magick/convert not found)".to_string(),
            )
        })?;

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();

    let output = match extension.as_str() {
        "jpg" | "jpeg" => {
            let out = temp_path(".jpg")?;
            run_magick(&magick, &jpeg_args(path, &out, max_bytes, false)).await?;
            out
        }
        "png" => {
            let out = temp_path(".png")?;
            run_magick(&magick, &png_args(path, &out)).await?;
            if file_size(&out)? > max_bytes {
                tracing::debug!("PNG still over limit after recompression, converting to JPEG");
                let jpeg = temp_path(".jpg")?;
                run_magick(&magick, &jpeg_args(path, &jpeg, max_bytes, true)).await?;
                jpeg
            } else {
                out
            }
        }
        other => {
            return Err(PlatformError::Media(format!(
                "Unsupported image format for auto-resize: .{}",
                other
            ))
            .into())
        }
    };

    let resized = file_size(&output)?;
    if resized > max_bytes {
        return Err(PlatformError::Media(format!(
            "Resized image still too large: {:.2} MB > {:.2} MB",
            mb(resized),
            mb(max_bytes)
        ))
        .into());
    }

    Ok(PreparedImage {
        path: output.to_path_buf(),
        temp: Some(output),
    })
}

fn jpeg_args(input: &Path, output: &Path, max_bytes: u64, flatten: bool) -> Vec<String> {
    let mut args = vec![
        input.display().to_string(),
        "-strip".to_string(),
        "-resize".to_string(),
        RESIZE_GEOMETRY.to_string(),
    ];
    if flatten {
        args.extend(
            ["-background", "white", "-alpha", "remove", "-alpha", "off"]
                .iter()
                .map(|s| s.to_string()),
        );
    }
    args.extend([
        "-define".to_string(),
        format!("jpeg:extent={}B", max_bytes),
        "-quality".to_string(),
        JPEG_QUALITY.to_string(),
        output.display().to_string(),
    ]);
    args
}

fn png_args(input: &Path, output: &Path) -> Vec<String> {
    vec![
        input.display().to_string(),
        "-strip".to_string(),
        "-resize".to_string(),
        RESIZE_GEOMETRY.to_string(),
        "-define".to_string(),
        "png:compression-level=9".to_string(),
        output.display().to_string(),
    ]
}

async fn run_magick(binary: &Path, args: &[String]) -> Result<()> {
    let output = Command::new(binary)
        .args(args)
        .output()
        .await
        .map_err(|e| PlatformError::Media(format!("Failed to run {}: {}", binary.display(), e)))?;

    if !output.status.success() {
        return Err(PlatformError::Media(format!(
            "{} exited with {}: {}",
            binary.display(),
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        ))
        .into());
    }
    Ok(())
}

fn temp_path(suffix: &str) -> Result<TempPath> {
    let file = tempfile::Builder::new()
        .prefix("throwback-")
        .suffix(suffix)
        .tempfile()
        .map_err(|e| PlatformError::Media(format!("Failed to create temp file: {}", e)))?;
    Ok(file.into_temp_path())
}

fn file_size(path: &Path) -> Result<u64> {
    std::fs::metadata(path)
        .map(|m| m.len())
        .map_err(|e| PlatformError::Media(format!("Failed to stat {}: {}", path.display(), e)).into())
}

fn mb(bytes: u64) -> f64 {
    bytes as f64 / (1024.0 * 1024.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ThrowbackError;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_small_image_passes_through() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("small.jpg");
        std::fs::write(&path, vec![0u8; 512]).unwrap();

        let prepared = prepare_for_upload(&path, 1024).await.unwrap();
        assert_eq!(prepared.path(), path.as_path());
        assert!(!prepared.was_resized());
    }

    #[tokio::test]
    async fn test_missing_image_is_media_error() {
        let err = prepare_for_upload(Path::new("/nonexistent/cover.jpg"), 1024)
            .await
            .unwrap_err();
        assert!(matches!(err, ThrowbackError::Platform(PlatformError::Media(_))));
    }

    #[test]
    fn test_jpeg_args_include_extent() {
        let args = jpeg_args(Path::new("in.png"), Path::new("out.jpg"), 1_000_000, true);
        assert_eq!(args.first().map(String::as_str), Some("in.png"));
        assert_eq!(args.last().map(String::as_str), Some("out.jpg"));
        assert!(args.contains(&"jpeg:extent=1000000B".to_string()));
        assert!(args.contains(&"white".to_string()));
    }

    #[test]
    fn test_png_args_shrink_only() {
        let args = png_args(Path::new("in.png"), Path::new("out.png"));
        assert!(args.contains(&"2048x2048>".to_string()));
        assert!(args.contains(&"png:compression-level=9".to_string()));
    }
}
