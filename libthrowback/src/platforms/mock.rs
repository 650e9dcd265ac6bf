//! Mock publisher for testing
//!
//! Simulates a platform that succeeds, fails with a chosen `PlatformError`,
//! or responds after a delay. Every request it receives is recorded so
//! integration tests can check what would have been posted without
//! credentials or network access.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;

use crate::error::{PlatformError, Result};
use crate::platforms::{PublishRequest, Published, Publisher};
use crate::types::Platform;

/// Configuration for mock publisher behavior
#[derive(Debug, Clone)]
pub struct MockConfig {
    /// Platform this mock stands in for
    pub platform: Platform,

    /// Error to return from `publish`; `None` means success
    pub error: Option<PlatformError>,

    /// Delay before completing (simulates network latency)
    pub delay: Duration,

    /// Overrides the platform's character limit when set
    pub character_limit: Option<usize>,

    /// Number of times publish has been called
    pub publish_call_count: Arc<Mutex<usize>>,

    /// Requests that have been published (for verification)
    pub requests: Arc<Mutex<Vec<PublishRequest>>>,
}

impl MockConfig {
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            error: None,
            delay: Duration::from_millis(0),
            character_limit: None,
            publish_call_count: Arc::new(Mutex::new(0)),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

/// Mock publisher for testing
pub struct MockPublisher {
    config: MockConfig,
}

impl MockPublisher {
    pub fn new(config: MockConfig) -> Self {
        Self { config }
    }

    /// A mock that always succeeds
    pub fn success(platform: Platform) -> Self {
        Self::new(MockConfig::new(platform))
    }

    /// A mock that always fails with `error`
    pub fn failure(platform: Platform, error: PlatformError) -> Self {
        Self::new(MockConfig {
            error: Some(error),
            ..MockConfig::new(platform)
        })
    }

    /// A mock that succeeds after `delay`
    pub fn with_delay(platform: Platform, delay: Duration) -> Self {
        Self::new(MockConfig {
            delay,
            ..MockConfig::new(platform)
        })
    }

    /// Handle to the shared call counter, usable after the mock is boxed
    pub fn call_counter(&self) -> Arc<Mutex<usize>> {
        Arc::clone(&self.config.publish_call_count)
    }

    /// Handle to the shared request log, usable after the mock is boxed
    pub fn request_log(&self) -> Arc<Mutex<Vec<PublishRequest>>> {
        Arc::clone(&self.config.requests)
    }

    pub fn publish_call_count(&self) -> usize {
        *self.config.publish_call_count.lock().unwrap()
    }

    pub fn requests(&self) -> Vec<PublishRequest> {
        self.config.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Publisher for MockPublisher {
    fn platform(&self) -> Platform {
        self.config.platform
    }

    fn character_limit(&self) -> usize {
        self.config
            .character_limit
            .unwrap_or_else(|| self.config.platform.character_limit())
    }

    fn max_image_bytes(&self) -> u64 {
        u64::MAX
    }

    async fn publish(&self, request: &PublishRequest) -> Result<Published> {
        *self.config.publish_call_count.lock().unwrap() += 1;

        if !self.config.delay.is_zero() {
            sleep(self.config.delay).await;
        }

        if let Some(error) = &self.config.error {
            return Err(error.clone().into());
        }

        self.config.requests.lock().unwrap().push(request.clone());

        let post_id = format!("{}:mock-{}", self.config.platform, uuid::Uuid::new_v4());
        Ok(Published {
            url: Some(format!("https://mock.invalid/{}", post_id)),
            post_id,
        })
    }
}
