//! Credential file loading
//!
//! Each platform's credentials live in their own JSON file so they can be
//! rotated or moved independently of the rest of the configuration. Secret
//! values are held in `SecretString` and never appear in `Debug` output.

use secrecy::SecretString;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

use crate::error::{PlatformError, Result};

pub const DEFAULT_BLUESKY_SERVICE: &str = "https://bsky.social";

/// OAuth 1.0a user-context credentials for Twitter/X
#[derive(Debug)]
pub struct TwitterCredentials {
    pub api_key: String,
    pub api_secret: SecretString,
    pub access_token: String,
    pub access_token_secret: SecretString,
}

/// App-password credentials for a Bluesky PDS
#[derive(Debug)]
pub struct BlueskyCredentials {
    pub identifier: String,
    pub app_password: SecretString,
    pub service: String,
}

/// Load Twitter credentials
///
/// Required keys: `api_key`, `api_secret`, `access_token`,
/// `access_token_secret`. A `bearer_token` key, present in files written for
/// app-only access, is accepted and ignored: every request is user-signed.
///
/// # Errors
///
/// Returns `PlatformError::Authentication` if the file is missing, is not a
/// JSON object, or lacks a required key.
pub fn load_twitter_credentials(path: &Path) -> Result<TwitterCredentials> {
    let mut fields = read_auth_object(path, "Twitter")?;
    require(
        &fields,
        &["api_key", "api_secret", "access_token", "access_token_secret"],
        "Twitter",
    )?;

    let mut take = |key: &str| fields.remove(key).unwrap_or_default();
    let api_key = take("api_key");
    let api_secret = take("api_secret");
    let access_token = take("access_token");
    let access_token_secret = take("access_token_secret");

    Ok(TwitterCredentials {
        api_key,
        api_secret: SecretString::from(api_secret),
        access_token,
        access_token_secret: SecretString::from(access_token_secret),
    })
}

/// Load Bluesky credentials
///
/// Required keys: `identifier`, `app_password`. `service` defaults to
/// `https://bsky.social`.
///
/// # Errors
///
/// Returns `PlatformError::Authentication` if the file is missing, is not a
/// JSON object, or lacks a required key.
pub fn load_bluesky_credentials(path: &Path) -> Result<BlueskyCredentials> {
    let mut fields = read_auth_object(path, "Bluesky")?;
    require(&fields, &["identifier", "app_password"], "Bluesky")?;

    let identifier = fields.remove("identifier").unwrap_or_default();
    let app_password = fields.remove("app_password").unwrap_or_default();
    let service = fields
        .remove("service")
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_BLUESKY_SERVICE.to_string());

    Ok(BlueskyCredentials {
        identifier,
        app_password: SecretString::from(app_password),
        service: service.trim_end_matches('/').to_string(),
    })
}

/// Read a flat JSON object, stringifying scalar values
fn read_auth_object(path: &Path, label: &str) -> Result<HashMap<String, String>> {
    if !path.exists() {
        return Err(PlatformError::Authentication(format!(
            "{} auth file not found: {}",
            label,
            path.display()
        ))
        .into());
    }

    let content = std::fs::read_to_string(path).map_err(|e| {
        PlatformError::Authentication(format!(
            "Failed to read {} auth file {}: {}",
            label,
            path.display(),
            e
        ))
    })?;

    #[derive(Deserialize)]
    #[serde(transparent)]
    struct AuthObject(HashMap<String, serde_json::Value>);

    let object: AuthObject = serde_json::from_str(&content).map_err(|e| {
        PlatformError::Authentication(format!(
            "{} auth file must be a JSON object ({}): {}",
            label,
            path.display(),
            e
        ))
    })?;

    Ok(object
        .0
        .into_iter()
        .filter_map(|(k, v)| {
            let value = match v {
                serde_json::Value::String(s) => s,
                serde_json::Value::Number(n) => n.to_string(),
                serde_json::Value::Bool(b) => b.to_string(),
                _ => return None,
            };
            Some((k, value))
        })
        .collect())
}

fn require(fields: &HashMap<String, String>, keys: &[&str], label: &str) -> Result<()> {
    let missing: Vec<&str> = keys
        .iter()
        .copied()
        .filter(|k| fields.get(*k).map_or(true, |v| v.trim().is_empty()))
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(PlatformError::Authentication(format!(
            "{} auth missing required keys: {}",
            label,
            missing.join(", ")
        ))
        .into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ThrowbackError;
    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, body: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_load_twitter_credentials() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "twitter_auth.json",
            r#"{"api_key": "ck", "api_secret": "cs", "access_token": "at", "access_token_secret": "ats"}"#,
        );

        let creds = load_twitter_credentials(&path).unwrap();
        assert_eq!(creds.api_key, "ck");
        assert_eq!(creds.api_secret.expose_secret(), "cs");
        assert_eq!(creds.access_token_secret.expose_secret(), "ats");
    }

    #[test]
    fn test_twitter_bearer_token_is_ignored() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "twitter_auth.json",
            r#"{"api_key": "ck", "api_secret": "cs", "access_token": "at", "access_token_secret": "ats", "bearer_token": "AAAA"}"#,
        );

        let creds = load_twitter_credentials(&path).unwrap();
        assert_eq!(creds.access_token, "at");
        assert!(!format!("{:?}", creds).contains("AAAA"));
    }

    #[test]
    fn test_twitter_missing_keys_listed() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "t.json", r#"{"api_key": "ck", "access_token": ""}"#);

        let err = load_twitter_credentials(&path).unwrap_err();
        match err {
            ThrowbackError::Platform(PlatformError::Authentication(msg)) => {
                assert!(msg.contains("api_secret"));
                assert!(msg.contains("access_token,"));
                assert!(msg.contains("access_token_secret"));
            }
            other => panic!("Expected authentication error, got {:?}", other),
        }
    }

    #[test]
    fn test_bluesky_defaults_service() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "bluesky_auth.json",
            r#"{"identifier": "rin.bsky.social", "app_password": "xxxx-xxxx"}"#,
        );

        let creds = load_bluesky_credentials(&path).unwrap();
        assert_eq!(creds.identifier, "rin.bsky.social");
        assert_eq!(creds.service, DEFAULT_BLUESKY_SERVICE);
        assert_eq!(creds.app_password.expose_secret(), "xxxx-xxxx");
    }

    #[test]
    fn test_bluesky_custom_service_trailing_slash() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "b.json",
            r#"{"identifier": "me", "app_password": "pw", "service": "https://pds.example.com/"}"#,
        );
        let creds = load_bluesky_credentials(&path).unwrap();
        assert_eq!(creds.service, "https://pds.example.com");
    }

    #[test]
    fn test_missing_file() {
        let err = load_bluesky_credentials(Path::new("/nonexistent/bluesky.json")).unwrap_err();
        assert!(err.to_string().contains("Bluesky auth file not found"));
    }

    #[test]
    fn test_non_object_rejected() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "b.json", r#"["identifier"]"#);
        let err = load_bluesky_credentials(&path).unwrap_err();
        assert!(err.to_string().contains("must be a JSON object"));
    }

    #[test]
    fn test_secrets_not_in_debug_output() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "b.json",
            r#"{"identifier": "me", "app_password": "super-secret-pw"}"#,
        );
        let creds = load_bluesky_credentials(&path).unwrap();
        let debug_output = format!("{:?}", creds);
        assert!(!debug_output.contains("super-secret-pw"));
    }
}
