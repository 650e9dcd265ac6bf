//! Throwback publish orchestration
//!
//! One run moves through `Selecting -> Rendering -> Publishing(p) ->
//! Recording(p) -> Done`, with the publish and record steps repeated for
//! each requested platform in order. Platforms are independent: a failure
//! on one is reported and the next is still attempted.
//!
//! A successful post is recorded immediately after it is accepted. A crash
//! between the two leaves the post unrecorded, so the set may come up again
//! before its threshold elapses.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info, warn};

use crate::auth::{load_bluesky_credentials, load_twitter_credentials};
use crate::caption::{CaptionRenderer, RenderContext, TemplatePaths, DEFAULT_ELLIPSIS};
use crate::eligibility::eligible;
use crate::error::{ConfigError, PlatformError, Result, ThrowbackError};
use crate::history::HistoryLedger;
use crate::platforms::{
    bluesky::BlueskyClient, twitter::TwitterClient, PublishRequest, Published, Publisher,
};
use crate::selector::{rng_for_seed, select};
use crate::types::{HistoryRecord, Platform, ThrowbackSet};

/// Where a run currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Selecting,
    Rendering,
    Publishing(Platform),
    Recording(Platform),
    Done,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Selecting => f.write_str("selecting"),
            RunState::Rendering => f.write_str("rendering"),
            RunState::Publishing(p) => write!(f, "publishing({})", p),
            RunState::Recording(p) => write!(f, "recording({})", p),
            RunState::Done => f.write_str("done"),
        }
    }
}

/// Inputs for one run
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub threshold_days: u32,
    /// Exact set name to post regardless of history
    pub override_set: Option<String>,
    pub seed: Option<String>,
    /// Platforms in publishing order
    pub platforms: Vec<Platform>,
    pub dry_run: bool,
    /// Append history records even when `dry_run` is set
    pub record_dry_run: bool,
    /// Directory manifest image names are resolved against
    pub images_dir: PathBuf,
    pub templates: TemplatePaths,
    pub ellipsis: String,
    pub twitter_limit: usize,
    pub bluesky_limit: usize,
}

impl RunOptions {
    pub fn new(images_dir: impl Into<PathBuf>, templates: TemplatePaths) -> Self {
        Self {
            threshold_days: 90,
            override_set: None,
            seed: None,
            platforms: vec![Platform::Twitter, Platform::Bluesky],
            dry_run: false,
            record_dry_run: false,
            images_dir: images_dir.into(),
            templates,
            ellipsis: DEFAULT_ELLIPSIS.to_string(),
            twitter_limit: Platform::Twitter.character_limit(),
            bluesky_limit: Platform::Bluesky.character_limit(),
        }
    }

    fn limit_for(&self, platform: Platform) -> usize {
        match platform {
            Platform::Twitter => self.twitter_limit,
            Platform::Bluesky => self.bluesky_limit,
        }
    }
}

/// Result of one platform within a run
#[derive(Debug, Clone, Serialize)]
pub struct PlatformOutcome {
    pub platform: Platform,
    pub success: bool,
    pub post_id: Option<String>,
    pub url: Option<String>,
    pub error: Option<String>,
    /// Caption as sent (or as it would have been sent in a dry run)
    pub caption: String,
    /// Whether a history record was persisted for this platform
    pub recorded: bool,
    /// Set when the post went out but the ledger write failed
    pub history_error: Option<String>,
}

impl PlatformOutcome {
    fn succeeded(platform: Platform, caption: String, published: Option<Published>) -> Self {
        let (post_id, url) = match published {
            Some(p) => (Some(p.post_id), p.url),
            None => (None, None),
        };
        Self {
            platform,
            success: true,
            post_id,
            url,
            error: None,
            caption,
            recorded: false,
            history_error: None,
        }
    }

    fn failed(platform: Platform, caption: String, error: String) -> Self {
        Self {
            platform,
            success: false,
            post_id: None,
            url: None,
            error: Some(error),
            caption,
            recorded: false,
            history_error: None,
        }
    }
}

/// Summary of a run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub set_name: String,
    pub set_url: Option<String>,
    pub dry_run: bool,
    pub outcomes: Vec<PlatformOutcome>,
}

impl RunReport {
    /// True only if every requested platform succeeded
    pub fn overall_success(&self) -> bool {
        !self.outcomes.is_empty() && self.outcomes.iter().all(|o| o.success)
    }

    pub fn exit_code(&self) -> i32 {
        if self.overall_success() {
            0
        } else {
            1
        }
    }

    pub fn outcome(&self, platform: Platform) -> Option<&PlatformOutcome> {
        self.outcomes.iter().find(|o| o.platform == platform)
    }
}

/// Drives one selection and publish cycle
pub struct PublishOrchestrator {
    sets: Vec<ThrowbackSet>,
    ledger: HistoryLedger,
    publishers: Vec<Box<dyn Publisher>>,
    /// Platforms whose publisher could not be built (e.g. bad credentials)
    unavailable: Vec<(Platform, PlatformError)>,
    state: RunState,
}

impl PublishOrchestrator {
    /// Create an orchestrator over a loaded manifest and ledger
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use chrono::Utc;
    /// use libthrowback::caption::TemplatePaths;
    /// use libthrowback::history::HistoryLedger;
    /// use libthrowback::manifest;
    /// use libthrowback::platforms::{mock::MockPublisher, Publisher};
    /// use libthrowback::poster::{PublishOrchestrator, RunOptions};
    /// use libthrowback::types::Platform;
    /// use std::path::Path;
    ///
    /// # async fn example() -> libthrowback::Result<()> {
    /// let sets = manifest::load(Path::new("manifest.json"))?;
    /// let ledger = HistoryLedger::load(Path::new("post_history.json"), &[])?;
    /// let publishers: Vec<Box<dyn Publisher>> = vec![Box::new(MockPublisher::success(Platform::Bluesky))];
    ///
    /// let mut orchestrator = PublishOrchestrator::new(sets, ledger, publishers);
    /// let mut options = RunOptions::new("covers", TemplatePaths::resolve(None, None, Path::new(".")));
    /// options.platforms = vec![Platform::Bluesky];
    ///
    /// let report = orchestrator.run(&options, Utc::now()).await?;
    /// println!("Posted {} ({})", report.set_name, report.overall_success());
    /// # Ok(())
    /// # }
    /// ```
    pub fn new(sets: Vec<ThrowbackSet>, ledger: HistoryLedger, publishers: Vec<Box<dyn Publisher>>) -> Self {
        Self {
            sets,
            ledger,
            publishers,
            unavailable: Vec::new(),
            state: RunState::Selecting,
        }
    }

    /// Mark a platform as unavailable; it will be reported as failed
    pub fn with_unavailable(mut self, platform: Platform, error: PlatformError) -> Self {
        self.unavailable.push((platform, error));
        self
    }

    pub fn ledger(&self) -> &HistoryLedger {
        &self.ledger
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    fn transition(&mut self, next: RunState) {
        tracing::debug!("Run state: {} -> {}", self.state, next);
        self.state = next;
    }

    /// Select a set, render captions, publish, and record
    ///
    /// # Errors
    ///
    /// Errors here abort the run before anything is posted:
    /// - `NoEligibleSets` / `SetNotFound` from selection
    /// - `ConfigError::ImageNotFound` if a set image is missing
    /// - `TemplateError` if any platform's caption fails to render
    ///
    /// Publish failures and ledger write failures never abort; they are
    /// reported per platform in the returned `RunReport`.
    pub async fn run(&mut self, options: &RunOptions, now: DateTime<Utc>) -> Result<RunReport> {
        self.state = RunState::Selecting;

        let set = {
            let candidates = eligible(
                &self.sets,
                &self.ledger,
                options.threshold_days,
                now,
                options.override_set.as_deref(),
            )?;
            let mut rng = rng_for_seed(options.seed.as_deref());
            select(&candidates, &mut rng).clone()
        };
        info!("Selected set: {}", set.name);

        let images = resolve_images(&set, &options.images_dir)?;

        self.transition(RunState::Rendering);
        let renderer = CaptionRenderer::new(options.ellipsis.clone());
        let mut captions = Vec::with_capacity(options.platforms.len());
        for &platform in &options.platforms {
            let mut limit = options.limit_for(platform);
            if let Some(publisher) = self.publisher_for(platform) {
                limit = limit.min(publisher.character_limit());
            }
            let context = RenderContext::new(&set, platform, limit);
            let caption = renderer.render(options.templates.for_platform(platform), &context)?;
            captions.push((platform, caption));
        }

        let alt_text = format!("Cover image for {}", set.name);
        let mut outcomes = Vec::with_capacity(captions.len());

        for (platform, caption) in captions {
            self.transition(RunState::Publishing(platform));

            let mut outcome = if options.dry_run {
                info!("[dry run] Would post to {}:\n{}", platform, caption);
                PlatformOutcome::succeeded(platform, caption, None)
            } else {
                self.publish_one(platform, caption, &images, &alt_text).await
            };

            let should_record = outcome.success && (!options.dry_run || options.record_dry_run);
            if should_record {
                self.transition(RunState::Recording(platform));
                let mut record = HistoryRecord::new(&set, platform, now);
                if let Some(post_id) = outcome.post_id.clone() {
                    record = record.with_post(post_id, outcome.url.clone());
                }
                match self.ledger.append(record) {
                    Ok(()) => outcome.recorded = true,
                    Err(e) => {
                        error!(
                            "Posted to {} but failed to record history for '{}': {}",
                            platform, set.name, e
                        );
                        outcome.history_error = Some(e.to_string());
                    }
                }
            }

            outcomes.push(outcome);
        }

        self.transition(RunState::Done);

        Ok(RunReport {
            set_name: set.name.clone(),
            set_url: set.set_url.clone(),
            dry_run: options.dry_run,
            outcomes,
        })
    }

    fn publisher_for(&self, platform: Platform) -> Option<&dyn Publisher> {
        self.publishers
            .iter()
            .find(|p| p.platform() == platform)
            .map(|p| p.as_ref())
    }

    async fn publish_one(
        &self,
        platform: Platform,
        caption: String,
        images: &[PathBuf],
        alt_text: &str,
    ) -> PlatformOutcome {
        let Some(publisher) = self.publisher_for(platform) else {
            let reason = self
                .unavailable
                .iter()
                .find(|(p, _)| *p == platform)
                .map(|(_, e)| e.to_string())
                .unwrap_or_else(|| format!("No publisher configured for {}", platform));
            warn!("Skipping {}: {}", platform, reason);
            return PlatformOutcome::failed(platform, caption, reason);
        };

        let request = PublishRequest {
            text: caption.clone(),
            images: images.iter().take(publisher.max_images()).cloned().collect(),
            alt_text: alt_text.to_string(),
        };

        info!("Posting to platform: {}", platform);
        match publisher.publish(&request).await {
            Ok(published) => {
                info!("Successfully posted to {}: {}", platform, published.post_id);
                PlatformOutcome::succeeded(platform, caption, Some(published))
            }
            Err(e) => {
                warn!("Failed to post to {}: {}", platform, e);
                PlatformOutcome::failed(platform, caption, e.to_string())
            }
        }
    }
}

/// Resolve a set's image names against `images_dir`, failing on the first missing file
fn resolve_images(set: &ThrowbackSet, images_dir: &Path) -> Result<Vec<PathBuf>> {
    set.images
        .iter()
        .map(|name| {
            let path = images_dir.join(name);
            if path.exists() {
                Ok(path)
            } else {
                Err(ConfigError::ImageNotFound(path).into())
            }
        })
        .collect()
}

/// Settings needed to build real publishers
#[derive(Debug, Clone)]
pub struct PublisherSettings {
    pub twitter_auth: PathBuf,
    pub bluesky_auth: PathBuf,
    pub max_image_mb: u64,
    pub timeout: Duration,
}

/// Build a publisher for each requested platform
///
/// A platform whose credentials cannot be loaded is returned in the second
/// list instead of failing the whole run, so the other platforms still post.
pub fn create_publishers(
    platforms: &[Platform],
    settings: &PublisherSettings,
) -> (Vec<Box<dyn Publisher>>, Vec<(Platform, PlatformError)>) {
    let mut publishers: Vec<Box<dyn Publisher>> = Vec::new();
    let mut unavailable = Vec::new();

    for &platform in platforms {
        let built: Result<Box<dyn Publisher>> = match platform {
            Platform::Twitter => load_twitter_credentials(&settings.twitter_auth)
                .and_then(|c| TwitterClient::new(c, settings.max_image_mb, settings.timeout))
                .map(|c| Box::new(c) as Box<dyn Publisher>),
            Platform::Bluesky => load_bluesky_credentials(&settings.bluesky_auth)
                .and_then(|c| BlueskyClient::new(c, settings.max_image_mb, settings.timeout))
                .map(|c| Box::new(c) as Box<dyn Publisher>),
        };

        match built {
            Ok(publisher) => publishers.push(publisher),
            Err(e) => {
                warn!("{} publisher unavailable: {}", platform, e);
                let error = match e {
                    ThrowbackError::Platform(e) => e,
                    other => PlatformError::Authentication(other.to_string()),
                };
                unavailable.push((platform, error));
            }
        }
    }

    (publishers, unavailable)
}
