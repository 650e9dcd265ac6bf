//! Bluesky platform implementation
//!
//! Talks XRPC directly: one session per publish, one blob per image, then a
//! single `app.bsky.feed.post` record with an image embed and link facets.

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use regex::Regex;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;

use crate::auth::BlueskyCredentials;
use crate::error::{PlatformError, Result, ThrowbackError};
use crate::media::prepare_for_upload;
use crate::platforms::{checked_body, PublishRequest, Published, Publisher};
use crate::types::Platform;

/// Bluesky rejects blobs over roughly one megabyte
pub const BLUESKY_MAX_BLOB_BYTES: u64 = 1_000_000;

const MAX_ALT_TEXT_CHARS: usize = 1000;
const POST_COLLECTION: &str = "app.bsky.feed.post";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Session {
    access_jwt: String,
    did: String,
    #[serde(default)]
    handle: Option<String>,
}

impl Session {
    fn profile_ref(&self) -> &str {
        self.handle.as_deref().unwrap_or(&self.did)
    }
}

#[derive(Debug, Deserialize)]
struct UploadBlobResponse {
    blob: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct CreateRecordResponse {
    uri: String,
}

/// A rich-text facet marking a link by UTF-8 byte range
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Facet {
    pub index: ByteSlice,
    pub features: Vec<FacetFeature>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ByteSlice {
    pub byte_start: usize,
    pub byte_end: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FacetFeature {
    #[serde(rename = "$type")]
    pub kind: String,
    pub uri: String,
}

pub struct BlueskyClient {
    http: reqwest::Client,
    credentials: BlueskyCredentials,
    max_image_bytes: u64,
}

impl BlueskyClient {
    /// Create a new Bluesky client
    ///
    /// The upload cap is the smaller of `max_image_mb` and Bluesky's own blob
    /// limit.
    pub fn new(credentials: BlueskyCredentials, max_image_mb: u64, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PlatformError::Network(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            credentials,
            max_image_bytes: max_image_mb
                .saturating_mul(1024 * 1024)
                .min(BLUESKY_MAX_BLOB_BYTES),
        })
    }

    fn xrpc(&self, method: &str) -> String {
        format!("{}/xrpc/{}", self.credentials.service, method)
    }

    async fn create_session(&self) -> std::result::Result<Session, PlatformError> {
        tracing::debug!("Creating Bluesky session for {}", self.credentials.identifier);

        let response = self
            .http
            .post(self.xrpc("com.atproto.server.createSession"))
            .json(&json!({
                "identifier": self.credentials.identifier,
                "password": self.credentials.app_password.expose_secret(),
            }))
            .send()
            .await?;
        let body = checked_body(Platform::Bluesky, response, "authentication").await?;

        serde_json::from_str(&body).map_err(|_| {
            PlatformError::Authentication(
                "Bluesky session response missing accessJwt or did".to_string(),
            )
        })
    }

    async fn upload_blob(
        &self,
        session: &Session,
        path: &Path,
    ) -> std::result::Result<serde_json::Value, PlatformError> {
        let prepared = prepare_for_upload(path, self.max_image_bytes)
            .await
            .map_err(|e| match e {
                ThrowbackError::Platform(e) => e,
                other => PlatformError::Media(other.to_string()),
            })?;

        let bytes = tokio::fs::read(prepared.path()).await.map_err(|e| {
            PlatformError::Media(format!("Failed to read {}: {}", prepared.path().display(), e))
        })?;
        let mime = mime_guess::from_path(prepared.path()).first_or_octet_stream();

        let response = self
            .http
            .post(self.xrpc("com.atproto.repo.uploadBlob"))
            .bearer_auth(&session.access_jwt)
            .header(reqwest::header::CONTENT_TYPE, mime.essence_str())
            .body(bytes)
            .send()
            .await?;
        let body = checked_body(Platform::Bluesky, response, "blob upload").await?;

        let parsed: UploadBlobResponse = serde_json::from_str(&body)
            .map_err(|_| PlatformError::Upload("Bluesky blob upload response missing blob".to_string()))?;
        if parsed.blob.is_null() {
            return Err(PlatformError::Upload(
                "Bluesky blob upload response missing blob".to_string(),
            ));
        }
        Ok(parsed.blob)
    }

    async fn create_record(
        &self,
        session: &Session,
        record: serde_json::Value,
    ) -> std::result::Result<String, PlatformError> {
        let response = self
            .http
            .post(self.xrpc("com.atproto.repo.createRecord"))
            .bearer_auth(&session.access_jwt)
            .json(&json!({
                "repo": session.did,
                "collection": POST_COLLECTION,
                "record": record,
            }))
            .send()
            .await?;
        let body = checked_body(Platform::Bluesky, response, "createRecord").await?;

        let parsed: CreateRecordResponse = serde_json::from_str(&body).map_err(|e| {
            PlatformError::Posting(format!("Unexpected createRecord response ({}): {}", e, body))
        })?;
        Ok(parsed.uri)
    }
}

#[async_trait]
impl Publisher for BlueskyClient {
    fn platform(&self) -> Platform {
        Platform::Bluesky
    }

    fn max_image_bytes(&self) -> u64 {
        self.max_image_bytes
    }

    async fn publish(&self, request: &PublishRequest) -> Result<Published> {
        tracing::debug!(
            "Posting to Bluesky: {} characters, {} image(s)",
            request.text.chars().count(),
            request.images.len()
        );

        let session = self.create_session().await?;

        let mut blobs = Vec::with_capacity(request.images.len());
        for image in request.images.iter().take(self.max_images()) {
            blobs.push(self.upload_blob(&session, image).await?);
        }

        let record = post_record(&request.text, &blobs, &request.alt_text, &Utc::now());
        let uri = self.create_record(&session, record).await?;
        tracing::debug!("Posted to Bluesky: {}", uri);

        Ok(Published {
            url: web_url_from_at_uri(&uri, session.profile_ref()),
            post_id: uri,
        })
    }
}

/// Build the `app.bsky.feed.post` record body
fn post_record(
    text: &str,
    blobs: &[serde_json::Value],
    alt_text: &str,
    created_at: &chrono::DateTime<Utc>,
) -> serde_json::Value {
    let mut record = json!({
        "$type": POST_COLLECTION,
        "text": text,
        "createdAt": created_at.to_rfc3339_opts(SecondsFormat::Millis, true),
    });

    let facets = link_facets(text);
    if !facets.is_empty() {
        record["facets"] = json!(facets);
    }

    if !blobs.is_empty() {
        let alt: String = alt_text.chars().take(MAX_ALT_TEXT_CHARS).collect();
        let images: Vec<serde_json::Value> = blobs
            .iter()
            .map(|blob| json!({ "alt": alt, "image": blob }))
            .collect();
        record["embed"] = json!({
            "$type": "app.bsky.embed.images",
            "images": images,
        });
    }

    record
}

/// Find every `http(s)://` link and return facets over its UTF-8 byte range
///
/// Trailing sentence punctuation and closing brackets are not part of the link.
pub fn link_facets(text: &str) -> Vec<Facet> {
    static LINK: OnceLock<Regex> = OnceLock::new();
    let link = LINK.get_or_init(|| Regex::new(r"https?://\S+").expect("link pattern is valid"));

    link.find_iter(text)
        .filter_map(|m| {
            let url = m.as_str().trim_end_matches(&['.', ',', ';', ':', '!', '?', ')', ']', '}'][..]);
            if url.is_empty() {
                return None;
            }
            Some(Facet {
                index: ByteSlice {
                    byte_start: m.start(),
                    byte_end: m.start() + url.len(),
                },
                features: vec![FacetFeature {
                    kind: "app.bsky.richtext.facet#link".to_string(),
                    uri: url.to_string(),
                }],
            })
        })
        .collect()
}

/// Turn `at://{did}/app.bsky.feed.post/{rkey}` into a bsky.app link
pub fn web_url_from_at_uri(at_uri: &str, profile_ref: &str) -> Option<String> {
    let remainder = at_uri.strip_prefix("at://")?;
    let parts: Vec<&str> = remainder.split('/').collect();
    match parts.as_slice() {
        [_, collection, rkey] if *collection == POST_COLLECTION && !rkey.is_empty() => Some(format!(
            "https://bsky.app/profile/{}/post/{}",
            profile_ref, rkey
        )),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caption::truncate_caption;
    use chrono::TimeZone;
    use secrecy::SecretString;

    fn credentials() -> BlueskyCredentials {
        BlueskyCredentials {
            identifier: "rin.bsky.social".to_string(),
            app_password: SecretString::from("pw".to_string()),
            service: "https://pds.example.com".to_string(),
        }
    }

    #[test]
    fn test_link_facets_byte_offsets() {
        let text = "Throwback ✨ https://example.com/sets/autumn";
        let facets = link_facets(text);

        assert_eq!(facets.len(), 1);
        // "✨" is 3 bytes in UTF-8
        assert_eq!(facets[0].index.byte_start, "Throwback ✨ ".len());
        assert_eq!(facets[0].index.byte_start, 14);
        assert_eq!(facets[0].index.byte_end, text.len());
        assert_eq!(facets[0].features[0].uri, "https://example.com/sets/autumn");
    }

    #[test]
    fn test_link_facets_strip_trailing_punctuation() {
        let text = "See (https://example.com/a). And http://example.org/b!";
        let facets = link_facets(text);

        assert_eq!(facets.len(), 2);
        assert_eq!(facets[0].features[0].uri, "https://example.com/a");
        assert_eq!(
            &text[facets[0].index.byte_start..facets[0].index.byte_end],
            "https://example.com/a"
        );
        assert_eq!(facets[1].features[0].uri, "http://example.org/b");
    }

    #[test]
    fn test_truncated_caption_keeps_link_facet_intact() {
        let url = "https://example.com/sets/autumn-lake";
        let text = format!("Throwback to Autumn Lake {} #throwback #lake #autumn", url);

        for limit in 25..text.chars().count() {
            let caption = truncate_caption(&text, limit, "…");
            let facets = link_facets(&caption);
            if caption.contains("https://") {
                assert_eq!(facets.len(), 1, "limit {}: {}", limit, caption);
                assert_eq!(facets[0].features[0].uri, url, "limit {}: {}", limit, caption);
                assert_eq!(&caption[facets[0].index.byte_start..facets[0].index.byte_end], url);
            } else {
                assert!(facets.is_empty());
            }
        }

        let wrapped = truncate_caption(&format!("({}) more words", url), 20, "…");
        assert!(link_facets(&wrapped).is_empty());
    }

    #[test]
    fn test_link_facets_none() {
        assert!(link_facets("no links here, just ftp://nope").is_empty());
    }

    #[test]
    fn test_facet_serialization_shape() {
        let value = serde_json::to_value(link_facets("https://a.example")).unwrap();
        assert_eq!(
            value,
            json!([{
                "index": { "byteStart": 0, "byteEnd": 17 },
                "features": [{ "$type": "app.bsky.richtext.facet#link", "uri": "https://a.example" }],
            }])
        );
    }

    #[test]
    fn test_web_url_from_at_uri() {
        assert_eq!(
            web_url_from_at_uri("at://did:plc:abc123/app.bsky.feed.post/3kxyz", "rin.bsky.social"),
            Some("https://bsky.app/profile/rin.bsky.social/post/3kxyz".to_string())
        );
        assert_eq!(web_url_from_at_uri("https://bsky.app/x", "rin"), None);
        assert_eq!(
            web_url_from_at_uri("at://did:plc:abc123/app.bsky.feed.like/3kxyz", "rin"),
            None
        );
        assert_eq!(web_url_from_at_uri("at://did:plc:abc123/app.bsky.feed.post/", "rin"), None);
    }

    #[test]
    fn test_post_record_embed_and_alt_truncation() {
        let created_at = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let blob = json!({ "$type": "blob", "ref": { "$link": "bafk" }, "mimeType": "image/jpeg", "size": 10 });
        let long_alt = "a".repeat(1500);

        let record = post_record("Hi https://example.com", &[blob.clone()], &long_alt, &created_at);

        assert_eq!(record["$type"], "app.bsky.feed.post");
        assert_eq!(record["createdAt"], "2025-03-01T12:00:00.000Z");
        assert_eq!(record["facets"][0]["index"]["byteStart"], 3);
        assert_eq!(record["embed"]["$type"], "app.bsky.embed.images");
        assert_eq!(record["embed"]["images"][0]["image"], blob);
        assert_eq!(
            record["embed"]["images"][0]["alt"].as_str().unwrap().chars().count(),
            1000
        );
    }

    #[test]
    fn test_post_record_without_links_or_images() {
        let created_at = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let record = post_record("plain", &[], "alt", &created_at);
        assert!(record.get("facets").is_none());
        assert!(record.get("embed").is_none());
    }

    #[test]
    fn test_max_image_bytes_capped() {
        let client = BlueskyClient::new(credentials(), 5, Duration::from_secs(5)).unwrap();
        assert_eq!(client.max_image_bytes(), BLUESKY_MAX_BLOB_BYTES);
        assert_eq!(client.character_limit(), 300);
        assert_eq!(
            client.xrpc("com.atproto.repo.uploadBlob"),
            "https://pds.example.com/xrpc/com.atproto.repo.uploadBlob"
        );

        let small = BlueskyClient::new(credentials(), 0, Duration::from_secs(5)).unwrap();
        assert_eq!(small.max_image_bytes(), 0);
    }
}
