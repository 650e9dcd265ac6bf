//! Publisher abstraction and implementations
//!
//! Each publisher turns a rendered caption plus a list of image files into
//! one post on its platform and reports the platform's post id.
//!
//! # Examples
//!
//! ```no_run
//! use libthrowback::auth::load_bluesky_credentials;
//! use libthrowback::platforms::{bluesky::BlueskyClient, PublishRequest, Publisher};
//! use std::path::{Path, PathBuf};
//! use std::time::Duration;
//!
//! # async fn example() -> libthrowback::Result<()> {
//! let credentials = load_bluesky_credentials(Path::new("bluesky_auth.json"))?;
//! let client = BlueskyClient::new(credentials, 5, Duration::from_secs(30))?;
//!
//! let request = PublishRequest {
//!     text: "Throwback: Autumn Lake https://example.com/sets/autumn-lake".to_string(),
//!     images: vec![PathBuf::from("covers/autumn-lake.jpg")],
//!     alt_text: "Cover image for Autumn Lake".to_string(),
//! };
//! let published = client.publish(&request).await?;
//! println!("Posted: {}", published.post_id);
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;
use std::path::PathBuf;

use crate::error::{PlatformError, Result};
use crate::types::Platform;

pub mod bluesky;
pub mod twitter;

// Mock publisher is available for all builds (not just tests) to support integration tests
pub mod mock;

/// Everything a publisher needs to create one post
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PublishRequest {
    /// Final caption, already fitted to the platform's character budget
    pub text: String,
    /// Image files in manifest order
    pub images: Vec<PathBuf>,
    /// Alt text applied to every image
    pub alt_text: String,
}

/// A post that the platform accepted
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Published {
    /// Platform-specific post id (tweet id, AT URI)
    pub post_id: String,
    /// Public web URL, when one can be derived
    pub url: Option<String>,
}

/// Publisher trait for posting a throwback to one platform
///
/// Implementations must bound every network call with a request timeout;
/// a timeout surfaces as `PlatformError::Timeout`, never as a hang.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// The platform this publisher posts to
    fn platform(&self) -> Platform;

    /// Maximum caption length in characters
    fn character_limit(&self) -> usize {
        self.platform().character_limit()
    }

    /// Maximum number of images attached to one post
    fn max_images(&self) -> usize {
        4
    }

    /// Largest image upload in bytes; bigger files are downscaled first
    fn max_image_bytes(&self) -> u64;

    /// Publish the caption and images, returning the new post's id
    ///
    /// # Errors
    ///
    /// Returns `PlatformError` describing why the platform rejected or never
    /// received the post.
    async fn publish(&self, request: &PublishRequest) -> Result<Published>;
}

/// Map a non-success HTTP response to a `PlatformError`
///
/// `context` names the step that failed (e.g. "media upload") and is
/// included in the message together with the response body.
pub(crate) fn map_http_error(
    platform: Platform,
    status: StatusCode,
    body: &str,
    context: &str,
) -> PlatformError {
    let label = match platform {
        Platform::Twitter => "Twitter",
        Platform::Bluesky => "Bluesky",
    };
    let details = if body.trim().is_empty() {
        status.canonical_reason().unwrap_or("no details").to_string()
    } else {
        body.trim().to_string()
    };
    let message = format!("{} {} failed (HTTP {}): {}", label, context, status.as_u16(), details);

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => PlatformError::Authentication(message),
        StatusCode::TOO_MANY_REQUESTS => PlatformError::RateLimit(message),
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY | StatusCode::PAYLOAD_TOO_LARGE => {
            PlatformError::Validation(message)
        }
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => PlatformError::Timeout(message),
        _ if context.contains("upload") => PlatformError::Upload(message),
        _ => PlatformError::Posting(message),
    }
}

/// Read a response, returning the body on success or a mapped error
pub(crate) async fn checked_body(
    platform: Platform,
    response: reqwest::Response,
    context: &str,
) -> std::result::Result<String, PlatformError> {
    let status = response.status();
    let body = response.text().await.map_err(PlatformError::from)?;
    if status.is_success() {
        Ok(body)
    } else {
        Err(map_http_error(platform, status, &body, context))
    }
}
