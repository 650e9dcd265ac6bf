//! Twitter/X platform implementation
//!
//! Media goes through the v1.1 upload endpoint and the post through v2;
//! both are signed with OAuth 1.0a user-context credentials.

use async_trait::async_trait;
use base64::Engine;
use hmac::{Hmac, Mac};
use rand::distributions::Alphanumeric;
use rand::Rng;
use reqwest::multipart::{Form, Part};
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::json;
use sha1::Sha1;
use std::path::Path;
use std::time::Duration;

use crate::auth::TwitterCredentials;
use crate::error::{PlatformError, Result};
use crate::media::prepare_for_upload;
use crate::platforms::{checked_body, PublishRequest, Published, Publisher};
use crate::types::Platform;

const MEDIA_UPLOAD_URL: &str = "https://upload.twitter.com/1.1/media/upload.json";
const MEDIA_METADATA_URL: &str = "https://upload.twitter.com/1.1/media/metadata/create.json";
const CREATE_TWEET_URL: &str = "https://api.twitter.com/2/tweets";

type HmacSha1 = Hmac<Sha1>;

#[derive(Debug, Deserialize)]
struct MediaUploadResponse {
    media_id_string: String,
}

#[derive(Debug, Deserialize)]
struct CreateTweetResponse {
    data: CreateTweetData,
}

#[derive(Debug, Deserialize)]
struct CreateTweetData {
    id: String,
}

pub struct TwitterClient {
    http: reqwest::Client,
    credentials: TwitterCredentials,
    max_image_bytes: u64,
}

impl TwitterClient {
    /// Create a new Twitter client
    ///
    /// # Arguments
    ///
    /// * `credentials` - OAuth 1.0a consumer and access token pairs
    /// * `max_image_mb` - Upload cap in megabytes; larger images are downscaled
    /// * `timeout` - Per-request timeout
    pub fn new(credentials: TwitterCredentials, max_image_mb: u64, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PlatformError::Network(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            credentials,
            max_image_bytes: max_image_mb.saturating_mul(1024 * 1024),
        })
    }

    /// Build the `Authorization` header for one request
    ///
    /// Only query parameters take part in the signature; JSON and multipart
    /// bodies are excluded by the OAuth 1.0a rules.
    fn authorization(&self, method: &str, url: &str) -> std::result::Result<String, PlatformError> {
        let nonce: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(32)
            .map(char::from)
            .collect();
        let timestamp = chrono::Utc::now().timestamp().to_string();

        let mut oauth_params = vec![
            ("oauth_consumer_key".to_string(), self.credentials.api_key.clone()),
            ("oauth_nonce".to_string(), nonce),
            ("oauth_signature_method".to_string(), "HMAC-SHA1".to_string()),
            ("oauth_timestamp".to_string(), timestamp),
            ("oauth_token".to_string(), self.credentials.access_token.clone()),
            ("oauth_version".to_string(), "1.0".to_string()),
        ];

        let signature = sign_request(
            method,
            url,
            &oauth_params,
            self.credentials.api_secret.expose_secret(),
            self.credentials.access_token_secret.expose_secret(),
        )?;
        oauth_params.push(("oauth_signature".to_string(), signature));

        Ok(authorization_header(&oauth_params))
    }

    async fn upload_media(&self, path: &Path) -> std::result::Result<String, PlatformError> {
        let prepared = prepare_for_upload(path, self.max_image_bytes)
            .await
            .map_err(into_platform_error)?;

        let bytes = tokio::fs::read(prepared.path()).await.map_err(|e| {
            PlatformError::Media(format!("Failed to read {}: {}", prepared.path().display(), e))
        })?;
        let file_name = prepared
            .path()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image".to_string());
        let mime = mime_guess::from_path(prepared.path()).first_or_octet_stream();

        let part = Part::bytes(bytes)
            .file_name(file_name)
            .mime_str(mime.essence_str())
            .map_err(|e| PlatformError::Media(format!("Invalid media type {}: {}", mime, e)))?;
        let form = Form::new().part("media", part);

        let response = self
            .http
            .post(MEDIA_UPLOAD_URL)
            .header("Authorization", self.authorization("POST", MEDIA_UPLOAD_URL)?)
            .multipart(form)
            .send()
            .await?;
        let body = checked_body(Platform::Twitter, response, "media upload").await?;

        let parsed: MediaUploadResponse = serde_json::from_str(&body).map_err(|e| {
            PlatformError::Upload(format!("Unexpected media upload response ({}): {}", e, body))
        })?;
        tracing::debug!(
            "Uploaded {} to Twitter as media {}",
            path.display(),
            parsed.media_id_string
        );
        Ok(parsed.media_id_string)
    }

    /// Attach alt text to an uploaded image; failures are logged, not fatal
    async fn set_alt_text(&self, media_id: &str, alt_text: &str) {
        if alt_text.is_empty() {
            return;
        }
        let body = json!({
            "media_id": media_id,
            "alt_text": { "text": truncate_chars(alt_text, 1000) },
        });

        let result: std::result::Result<String, PlatformError> = async {
            let response = self
                .http
                .post(MEDIA_METADATA_URL)
                .header("Authorization", self.authorization("POST", MEDIA_METADATA_URL)?)
                .json(&body)
                .send()
                .await?;
            checked_body(Platform::Twitter, response, "media metadata").await
        }
        .await;

        if let Err(e) = result {
            tracing::warn!("Failed to set alt text on media {}: {}", media_id, e);
        }
    }

    async fn create_tweet(
        &self,
        text: &str,
        media_ids: &[String],
    ) -> std::result::Result<String, PlatformError> {
        let mut body = json!({ "text": text });
        if !media_ids.is_empty() {
            body["media"] = json!({ "media_ids": media_ids });
        }

        let response = self
            .http
            .post(CREATE_TWEET_URL)
            .header("Authorization", self.authorization("POST", CREATE_TWEET_URL)?)
            .json(&body)
            .send()
            .await?;
        let body = checked_body(Platform::Twitter, response, "post create").await?;

        let parsed: CreateTweetResponse = serde_json::from_str(&body).map_err(|e| {
            PlatformError::Posting(format!("Unexpected create tweet response ({}): {}", e, body))
        })?;
        Ok(parsed.data.id)
    }
}

#[async_trait]
impl Publisher for TwitterClient {
    fn platform(&self) -> Platform {
        Platform::Twitter
    }

    fn max_image_bytes(&self) -> u64 {
        self.max_image_bytes
    }

    async fn publish(&self, request: &PublishRequest) -> Result<Published> {
        tracing::debug!(
            "Posting to Twitter: {} characters, {} image(s)",
            request.text.chars().count(),
            request.images.len()
        );

        let mut media_ids = Vec::with_capacity(request.images.len());
        for image in request.images.iter().take(self.max_images()) {
            let media_id = self.upload_media(image).await?;
            self.set_alt_text(&media_id, &request.alt_text).await;
            media_ids.push(media_id);
        }

        let id = self.create_tweet(&request.text, &media_ids).await?;
        tracing::debug!("Posted to Twitter: {}", id);

        Ok(Published {
            url: Some(status_url(&id)),
            post_id: id,
        })
    }
}

pub fn status_url(id: &str) -> String {
    format!("https://x.com/i/web/status/{}", id)
}

/// Compute an OAuth 1.0a HMAC-SHA1 signature
///
/// `params` holds every oauth_* parameter (minus the signature) plus any
/// query or form parameters of the request, unencoded.
pub fn sign_request(
    method: &str,
    url: &str,
    params: &[(String, String)],
    consumer_secret: &str,
    token_secret: &str,
) -> std::result::Result<String, PlatformError> {
    let mut encoded: Vec<(String, String)> = params
        .iter()
        .map(|(k, v)| (percent_encode(k), percent_encode(v)))
        .collect();
    encoded.sort();

    let parameter_string = encoded
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");

    let base = format!(
        "{}&{}&{}",
        method.to_ascii_uppercase(),
        percent_encode(url),
        percent_encode(&parameter_string)
    );
    let key = format!("{}&{}", percent_encode(consumer_secret), percent_encode(token_secret));

    let mut mac = HmacSha1::new_from_slice(key.as_bytes())
        .map_err(|e| PlatformError::Authentication(format!("Invalid signing key: {}", e)))?;
    mac.update(base.as_bytes());
    Ok(base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes()))
}

fn authorization_header(oauth_params: &[(String, String)]) -> String {
    let fields = oauth_params
        .iter()
        .map(|(k, v)| format!("{}=\"{}\"", percent_encode(k), percent_encode(v)))
        .collect::<Vec<_>>()
        .join(", ");
    format!("OAuth {}", fields)
}

/// RFC 3986 encoding: everything but `A-Za-z0-9-._~`
fn percent_encode(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

fn into_platform_error(err: crate::error::ThrowbackError) -> PlatformError {
    match err {
        crate::error::ThrowbackError::Platform(e) => e,
        other => PlatformError::Media(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;

    fn params(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_signature_matches_documented_example() {
        // Worked example from Twitter's "Creating a signature" guide
        let params = params(&[
            ("status", "Hello Ladies + Gentlemen, a signed OAuth request!"),
            ("include_entities", "true"),
            ("oauth_consumer_key", "xvz1evFS4wEEPTGEFPHBog"),
            ("oauth_nonce", "kYjzVBB8Y0ZFabxSWbWovY3uYSQ2pTgmZeNu2VS4cg"),
            ("oauth_signature_method", "HMAC-SHA1"),
            ("oauth_timestamp", "1318622958"),
            ("oauth_token", "370773112-GmHxMAgYyLbNEtIKZeRNFsMKPR9EyMZeS9weJAEb"),
            ("oauth_version", "1.0"),
        ]);

        let signature = sign_request(
            "post",
            "https://api.twitter.com/1.1/statuses/update.json",
            &params,
            "kAcSOqF21Fu85e7zjz7ZN2U4ZRhfV3WpwPAoE3Z7kBw",
            "LswwdoUaIvS8ltyTt5jkRh4J50vUPVVHtR2YPi5kE",
        )
        .unwrap();

        assert_eq!(signature, "hCtSmYh+iHYCEqBWrE7C7hYmtUk=");
    }

    #[test]
    fn test_percent_encode_unreserved() {
        assert_eq!(percent_encode("Ladies + Gentlemen"), "Ladies%20%2B%20Gentlemen");
        assert_eq!(percent_encode("a-b.c_d~e"), "a-b.c_d~e");
        assert_eq!(percent_encode("!"), "%21");
    }

    #[test]
    fn test_authorization_header_format() {
        let header = authorization_header(&params(&[
            ("oauth_consumer_key", "key"),
            ("oauth_signature", "a+b="),
        ]));
        assert_eq!(
            header,
            r#"OAuth oauth_consumer_key="key", oauth_signature="a%2Bb%3D""#
        );
    }

    #[test]
    fn test_client_authorization_contains_all_oauth_fields() {
        let client = TwitterClient::new(
            TwitterCredentials {
                api_key: "ck".to_string(),
                api_secret: SecretString::from("cs".to_string()),
                access_token: "at".to_string(),
                access_token_secret: SecretString::from("ats".to_string()),
            },
            5,
            Duration::from_secs(5),
        )
        .unwrap();

        assert_eq!(client.max_image_bytes(), 5 * 1024 * 1024);
        assert_eq!(client.character_limit(), 280);

        let header = client.authorization("POST", CREATE_TWEET_URL).unwrap();
        assert!(header.starts_with("OAuth "));
        for field in [
            "oauth_consumer_key=\"ck\"",
            "oauth_nonce=",
            "oauth_signature_method=\"HMAC-SHA1\"",
            "oauth_timestamp=",
            "oauth_token=\"at\"",
            "oauth_version=\"1.0\"",
            "oauth_signature=",
        ] {
            assert!(header.contains(field), "missing {} in {}", field, header);
        }
    }

    #[test]
    fn test_status_url() {
        assert_eq!(status_url("1234"), "https://x.com/i/web/status/1234");
    }
}
