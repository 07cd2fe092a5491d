//! Best-effort downstream sink for newly-added posts.
//!
//! One POST per completed task with the added rows as JSON array. Failures
//! are logged and never retried; they do not affect task status.

use std::time::Duration;

use crate::config::SinkSettings;
use crate::models::Post;

#[derive(Clone)]
pub struct PostSink {
    client: reqwest::Client,
    endpoint: String,
}

impl PostSink {
    pub fn new(settings: &SinkSettings) -> Option<Self> {
        if !settings.enabled {
            return None;
        }
        let client = match reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
        {
            Ok(client) => client,
            Err(err) => {
                tracing::warn!(error = %err, "post sink disabled: http client build failed");
                return None;
            }
        };
        Some(PostSink {
            client,
            endpoint: settings.endpoint(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub async fn send_posts(&self, posts: &[Post]) {
        match self.client.post(&self.endpoint).json(posts).send().await {
            Ok(response) if response.status().is_success() => {
                tracing::debug!(count = posts.len(), "forwarded added posts to sink");
            }
            Ok(response) => {
                tracing::warn!(status = %response.status(), "post sink rejected the payload");
            }
            Err(err) => {
                tracing::warn!(error = %err, "post sink unreachable");
            }
        }
    }
}
