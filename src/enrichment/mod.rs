// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Resilient access to the enrichment service
//!
//! Every call goes through one retry loop: bounded attempts, a per-attempt
//! timeout, credential rotation after each failure and a non-blocking delay
//! between attempts. Running out of attempts is an error, never an empty
//! summary.

pub mod credentials;
pub mod response;

use image::GenericImageView;
use std::future::Future;
use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::{AppConfig, EngineConfig, PromptConfig, RetryPolicy};
use crate::llm::{ChatClient, ChatMessage, ChatRequest, CompletionBackend};
use crate::scheduler::FileSummary;
use crate::{Result, WizardError};

pub use credentials::CredentialPool;
pub use response::{FileMove, SearchHit};

/// Longest image side sent to the vision model
const MAX_IMAGE_SIDE: u32 = 1024;

/// A backend together with the model and credentials used on it
pub struct Channel {
    backend: Arc<dyn CompletionBackend>,
    model: String,
    pool: CredentialPool,
}

impl Channel {
    pub fn new(backend: Arc<dyn CompletionBackend>, engine: &EngineConfig) -> Self {
        Self {
            backend,
            model: engine.model.clone(),
            pool: CredentialPool::new(engine.api_keys.clone()),
        }
    }
}

/// Client for summarization, tree proposals and search
pub struct EnrichmentClient {
    text: Channel,
    image: Channel,
    policy: RetryPolicy,
    timeout: Duration,
    prompts: PromptConfig,
}

impl EnrichmentClient {
    /// Build HTTP channels from configuration
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let text = ChatClient::new(&config.text.endpoint, config.timeout())?;
        let image = ChatClient::new(&config.image.endpoint, config.timeout())?;
        Ok(Self::new(Arc::new(text), Arc::new(image), config))
    }

    pub fn new(
        text_backend: Arc<dyn CompletionBackend>,
        image_backend: Arc<dyn CompletionBackend>,
        config: &AppConfig,
    ) -> Self {
        Self {
            text: Channel::new(text_backend, &config.text),
            image: Channel::new(image_backend, &config.image),
            policy: config.retry.clone(),
            timeout: config.timeout(),
            prompts: config.prompts.clone(),
        }
    }

    /// Summarize extracted document text
    pub async fn summarize_text(&self, content: &str) -> Result<String> {
        let request = ChatRequest::new(
            &self.text.model,
            vec![ChatMessage::system(self.prompts.document.as_str()), ChatMessage::user(content)],
        );
        let request = &request;
        let backend = &self.text.backend;

        self.with_retry(&self.text, "summarize_text", move |key| async move {
            non_empty(backend.complete(request, key.as_deref()).await?)
        })
        .await
    }

    /// Describe the image stored at `path`
    pub async fn summarize_image(&self, path: &Path) -> Result<String> {
        let raw = tokio::fs::read(path).await.map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                WizardError::MissingFile(path.to_path_buf())
            } else {
                WizardError::FileSystem(e)
            }
        })?;
        let jpeg = prepare_image(raw).await?;

        let jpeg = jpeg.as_slice();
        let backend = &self.image.backend;
        let model = self.image.model.as_str();
        let prompt = self.prompts.image.as_str();

        self.with_retry(&self.image, "summarize_image", move |key| async move {
            non_empty(backend.describe_image(model, prompt, jpeg, key.as_deref()).await?)
        })
        .await
    }

    /// Ask for a new location for every file in one batch
    pub async fn propose_tree(&self, batch: &[FileSummary]) -> Result<Vec<FileMove>> {
        let request = ChatRequest::new(
            &self.text.model,
            vec![
                ChatMessage::system(self.prompts.file_tree.as_str()),
                ChatMessage::user(serde_json::to_string(batch)?),
            ],
        );
        let request = &request;
        let backend = &self.text.backend;

        self.with_retry(&self.text, "propose_tree", move |key| async move {
            let reply = backend.complete(request, key.as_deref()).await?;
            response::parse_files(&reply)
        })
        .await
    }

    /// Ask which files in one batch match `query`
    pub async fn search(&self, batch: &[FileSummary], query: &str) -> Result<Vec<SearchHit>> {
        let request = ChatRequest::new(
            &self.text.model,
            vec![
                ChatMessage::system(self.prompts.search.replace("{query}", query)),
                ChatMessage::user(serde_json::to_string(batch)?),
            ],
        );
        let request = &request;
        let backend = &self.text.backend;

        self.with_retry(&self.text, "search", move |key| async move {
            let reply = backend.complete(request, key.as_deref()).await?;
            response::parse_files(&reply)
        })
        .await
    }

    async fn with_retry<T, F, Fut>(&self, channel: &Channel, operation: &str, call: F) -> Result<T>
    where
        F: Fn(Option<String>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            let key = channel.pool.current();
            let outcome = match tokio::time::timeout(self.timeout, call(key)).await {
                Ok(outcome) => outcome,
                Err(_) => Err(WizardError::TransientService(format!(
                    "no reply within {:?}",
                    self.timeout
                ))),
            };

            match outcome {
                Ok(value) => {
                    if attempt > 1 {
                        debug!("{} succeeded on attempt {}", operation, attempt);
                    }
                    return Ok(value);
                }
                Err(e) if e.is_retryable() => {
                    warn!("{} attempt {}/{} failed: {}", operation, attempt, max_attempts, e);
                    channel.pool.advance();
                    last_error = e.to_string();
                    if attempt < max_attempts {
                        tokio::time::sleep(self.policy.delay_after(attempt)).await;
                    }
                }
                Err(e) => return Err(e),
            }
        }

        Err(WizardError::EnrichmentUnavailable {
            attempts: max_attempts,
            last_error,
        })
    }
}

fn non_empty(reply: String) -> Result<String> {
    let trimmed = reply.trim();
    if trimmed.is_empty() {
        return Err(WizardError::InvalidServiceResponse("empty summary".to_string()));
    }
    Ok(trimmed.to_string())
}

/// Downscale large images and re-encode as JPEG; undecodable input is sent as-is
/// Downscale and re-encode as JPEG; bytes that do not decode are rejected
async fn prepare_image(raw: Vec<u8>) -> Result<Vec<u8>> {
    tokio::task::spawn_blocking(move || {
        shrink_to_jpeg(&raw).map_err(|e| WizardError::Extraction(format!("Unsupported image: {}", e)))
    })
    .await?
}

fn shrink_to_jpeg(raw: &[u8]) -> Result<Vec<u8>> {
    let img = image::load_from_memory(raw)?;

    let img = if img.width() > MAX_IMAGE_SIDE || img.height() > MAX_IMAGE_SIDE {
        img.resize(MAX_IMAGE_SIDE, MAX_IMAGE_SIDE, image::imageops::FilterType::Triangle)
    } else {
        img
    };

    // JPEG has no alpha channel
    let img = image::DynamicImage::ImageRgb8(img.to_rgb8());
    let (width, height) = img.dimensions();
    debug!("Encoding {}x{} image for upload", width, height);

    let mut buffer = Vec::new();
    img.write_to(&mut std::io::Cursor::new(&mut buffer), image::ImageFormat::Jpeg)?;
    Ok(buffer)
}
