// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Chat-completion client for OpenAI-compatible APIs

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::{Result, WizardError};

/// One role-tagged message
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    pub content: MessageContent,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ImageUrl {
    pub url: String,
}

impl ChatMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self { role: "system".to_string(), content: MessageContent::Text(text.into()) }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self { role: "user".to_string(), content: MessageContent::Text(text.into()) }
    }

    /// User message carrying a prompt and an inline JPEG
    pub fn user_with_image(prompt: &str, jpeg: &[u8]) -> Self {
        let url = format!("data:image/jpeg;base64,{}", general_purpose::STANDARD.encode(jpeg));
        Self {
            role: "user".to_string(),
            content: MessageContent::Parts(vec![
                ContentPart::Text { text: prompt.to_string() },
                ContentPart::ImageUrl { image_url: ImageUrl { url } },
            ]),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub stream: bool,
    pub temperature: f32,
}

impl ChatRequest {
    pub fn new(model: &str, messages: Vec<ChatMessage>) -> Self {
        Self { model: model.to_string(), messages, stream: false, temperature: 0.0 }
    }
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ReplyMessage,
}

#[derive(Deserialize)]
struct ReplyMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct GeneratedText {
    generated_text: String,
}

/// Transport to the enrichment service.
///
/// `api_key` is `None` for endpoints without authentication.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Send a chat request and return the reply text
    async fn complete(&self, request: &ChatRequest, api_key: Option<&str>) -> Result<String>;

    /// Describe a JPEG image; by default an inline image in a chat request
    async fn describe_image(
        &self,
        model: &str,
        prompt: &str,
        jpeg: &[u8],
        api_key: Option<&str>,
    ) -> Result<String> {
        let request = ChatRequest::new(model, vec![ChatMessage::user_with_image(prompt, jpeg)]);
        self.complete(&request, api_key).await
    }
}

/// HTTP client for one OpenAI-compatible endpoint
pub struct ChatClient {
    client: Client,
    base_url: String,
}

impl ChatClient {
    /// Create a new client
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;

        // Normalize URL
        let base_url = base_url
            .trim_end_matches('/')
            .trim_end_matches("/chat/completions")
            .to_string();

        Ok(Self { client, base_url })
    }

    /// Hugging Face inference hosts take raw image bytes instead of chat requests
    fn is_hosted_inference(&self) -> bool {
        self.base_url.to_lowercase().contains("huggingface.co")
    }

    fn authorize(builder: reqwest::RequestBuilder, api_key: Option<&str>) -> reqwest::RequestBuilder {
        match api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(WizardError::TransientService(format!("service returned status {}: {}", status, body)))
    }
}

#[async_trait]
impl CompletionBackend for ChatClient {
    async fn complete(&self, request: &ChatRequest, api_key: Option<&str>) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);
        debug!("Sending chat request: model={}", request.model);

        let response = Self::authorize(self.client.post(&url), api_key)
            .json(request)
            .send()
            .await?;
        let response = Self::check_status(response).await?;

        let reply: ChatResponse = response.json().await?;
        reply
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| WizardError::InvalidServiceResponse("reply has no message content".to_string()))
    }

    async fn describe_image(
        &self,
        model: &str,
        prompt: &str,
        jpeg: &[u8],
        api_key: Option<&str>,
    ) -> Result<String> {
        if !self.is_hosted_inference() {
            let request = ChatRequest::new(model, vec![ChatMessage::user_with_image(prompt, jpeg)]);
            return self.complete(&request, api_key).await;
        }

        let url = format!("{}/{}", self.base_url.replace("v1", "models"), model);
        debug!("Sending image to hosted inference: {}", url);

        let response = Self::authorize(self.client.post(&url), api_key)
            .body(jpeg.to_vec())
            .send()
            .await?;
        let response = Self::check_status(response).await?;

        let generated: Vec<GeneratedText> = response.json().await?;
        generated
            .into_iter()
            .next()
            .map(|g| g.generated_text)
            .ok_or_else(|| WizardError::InvalidServiceResponse("empty caption list".to_string()))
    }
}

#[cfg(test)]
pub(crate) mod mock {
    //! Scripted stand-in for the enrichment service

    use super::*;
    use std::sync::Mutex;

    type Responder = dyn Fn(&ChatRequest) -> Result<String> + Send + Sync;

    pub struct ScriptedBackend {
        responder: Box<Responder>,
        calls: Mutex<Vec<(ChatRequest, Option<String>)>>,
    }

    impl ScriptedBackend {
        pub fn new(responder: impl Fn(&ChatRequest) -> Result<String> + Send + Sync + 'static) -> Self {
            Self { responder: Box::new(responder), calls: Mutex::new(Vec::new()) }
        }

        /// Always answers with the same text
        pub fn replying(text: &str) -> Self {
            let text = text.to_string();
            Self::new(move |_| Ok(text.clone()))
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }

        pub fn keys_used(&self) -> Vec<Option<String>> {
            self.calls.lock().unwrap().iter().map(|(_, k)| k.clone()).collect()
        }

        pub fn requests(&self) -> Vec<ChatRequest> {
            self.calls.lock().unwrap().iter().map(|(r, _)| r.clone()).collect()
        }
    }

    /// Concatenated text of every message in a request
    pub fn request_text(request: &ChatRequest) -> String {
        request
            .messages
            .iter()
            .map(|m| match &m.content {
                MessageContent::Text(t) => t.clone(),
                MessageContent::Parts(parts) => parts
                    .iter()
                    .map(|p| match p {
                        ContentPart::Text { text } => text.clone(),
                        ContentPart::ImageUrl { .. } => "<image>".to_string(),
                    })
                    .collect::<Vec<_>>()
                    .join(" "),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[async_trait]
    impl CompletionBackend for ScriptedBackend {
        async fn complete(&self, request: &ChatRequest, api_key: Option<&str>) -> Result<String> {
            self.calls
                .lock()
                .unwrap()
                .push((request.clone(), api_key.map(String::from)));
            (self.responder)(request)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_normalization() {
        let client = ChatClient::new("https://api.groq.com/openai/v1/chat/completions/", Duration::from_secs(5)).unwrap();
        assert_eq!(client.base_url, "https://api.groq.com/openai/v1");
        assert!(!client.is_hosted_inference());

        let hf = ChatClient::new("https://api-inference.huggingface.co/v1", Duration::from_secs(5)).unwrap();
        assert!(hf.is_hosted_inference());
    }

    #[test]
    fn test_image_message_serialization() {
        let message = ChatMessage::user_with_image("describe", b"\xff\xd8");
        let json = serde_json::to_value(&message).unwrap();

        assert_eq!(json["role"], "user");
        assert_eq!(json["content"][0]["type"], "text");
        assert_eq!(json["content"][0]["text"], "describe");
        assert_eq!(json["content"][1]["type"], "image_url");
        assert_eq!(json["content"][1]["image_url"]["url"], "data:image/jpeg;base64,/9g=");
    }

    #[test]
    fn test_text_message_serializes_as_string() {
        let request = ChatRequest::new("m", vec![ChatMessage::system("be brief"), ChatMessage::user("hi")]);
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["messages"][0]["content"], "be brief");
        assert_eq!(json["stream"], false);
        assert_eq!(json["temperature"], 0.0);
    }

    #[tokio::test]
    async fn test_default_describe_image_goes_through_complete() {
        let backend = mock::ScriptedBackend::replying("a red bicycle");
        let caption = backend.describe_image("llava", "describe", b"img", Some("k")).await.unwrap();

        assert_eq!(caption, "a red bicycle");
        assert_eq!(backend.keys_used(), vec![Some("k".to_string())]);
        assert!(mock::request_text(&backend.requests()[0]).contains("<image>"));
    }
}
