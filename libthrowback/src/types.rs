//! Core types for Throwback

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Target platform for a throwback post
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Twitter,
    Bluesky,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Twitter => "twitter",
            Platform::Bluesky => "bluesky",
        }
    }

    /// Character budget for a post on this platform
    pub fn character_limit(&self) -> usize {
        match self {
            Platform::Twitter => 280,
            Platform::Bluesky => 300,
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "twitter" | "x" => Ok(Platform::Twitter),
            "bluesky" | "bsky" => Ok(Platform::Bluesky),
            _ => Err(format!(
                "Invalid platform: '{}'. Valid options: twitter, bluesky",
                s
            )),
        }
    }
}

/// Which platforms a run should publish to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformSelection {
    Twitter,
    Bluesky,
    #[default]
    Both,
}

impl PlatformSelection {
    /// Platforms in publishing order
    pub fn platforms(&self) -> Vec<Platform> {
        match self {
            PlatformSelection::Twitter => vec![Platform::Twitter],
            PlatformSelection::Bluesky => vec![Platform::Bluesky],
            PlatformSelection::Both => vec![Platform::Twitter, Platform::Bluesky],
        }
    }
}

impl FromStr for PlatformSelection {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "both" | "all" => Ok(PlatformSelection::Both),
            other => other.parse::<Platform>().map(|p| match p {
                Platform::Twitter => PlatformSelection::Twitter,
                Platform::Bluesky => PlatformSelection::Bluesky,
            }),
        }
    }
}

/// A named, ordered group of images making up one throwback album
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThrowbackSet {
    pub name: String,
    pub images: Vec<String>,
    pub description: Option<String>,
    pub set_url: Option<String>,
    pub date_published: Option<String>,
    pub tags: Option<String>,
}

/// One completed publish attempt
///
/// Older history files wrote a single combined record per run with
/// `tweeted_at`, `twitter_post_id` or `bluesky_uri` and no `platform`.
/// Those records still parse; fields this version does not know about are
/// kept in `extra` so rewriting the ledger never drops them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub set_name: String,

    #[serde(rename = "posted_at", alias = "tweeted_at")]
    pub timestamp: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<Platform>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub set_url: Option<String>,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl HistoryRecord {
    pub fn new(set: &ThrowbackSet, platform: Platform, timestamp: DateTime<Utc>) -> Self {
        Self {
            set_name: set.name.clone(),
            timestamp,
            platform: Some(platform),
            post_id: None,
            post_url: None,
            set_url: set.set_url.clone(),
            extra: serde_json::Map::new(),
        }
    }

    pub fn with_post(mut self, post_id: String, post_url: Option<String>) -> Self {
        self.post_id = Some(post_id);
        self.post_url = post_url;
        self
    }
}
