//! Relay to the hosted chat-completion endpoint.
//!
//! Failures never surface as HTTP errors: the caller gets the error text in
//! place of an answer.

use anyhow::{Context, Result};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::config::Config;

const SYSTEM_PROMPT: &str = "You are an inflight medical assistant. Provide helpful, accurate medical advice for passengers during flights. Be concise but thorough.";
const PLACEHOLDER_KEY: &str = "your_groq_api_key_here";
const MAX_TOKENS: u32 = 500;
const TEMPERATURE: f64 = 0.7;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Error: GROQ_API_KEY not found in environment variables. Please set your Groq API key in the .env file.")]
    MissingKey,

    #[error("[Error] {}: {body}", .status.as_u16())]
    Upstream { status: StatusCode, body: String },

    #[error("Error connecting to Groq API: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Error connecting to Groq API: {0}")]
    Malformed(String),
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: [Message<'a>; 2],
    max_tokens: u32,
    temperature: f64,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: String,
}

pub struct ChatRelay {
    client: Client,
    url: String,
    model: String,
    api_key: Option<String>,
}

impl ChatRelay {
    pub fn new(cfg: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(cfg.chat_timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .context("failed to build chat HTTP client")?;
        let api_key = cfg
            .groq_api_key
            .clone()
            .filter(|k| !k.trim().is_empty() && k != PLACEHOLDER_KEY);
        Ok(Self {
            client,
            url: cfg.groq_api_url.clone(),
            model: cfg.groq_model.clone(),
            api_key,
        })
    }

    pub fn has_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Answers `input`, or describes why no answer could be obtained.
    pub async fn chat(&self, input: &str) -> String {
        match self.complete(input).await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!("chat relay failed: {}", e);
                e.to_string()
            }
        }
    }

    pub async fn complete(&self, input: &str) -> Result<String, ChatError> {
        let key = self.api_key.as_deref().ok_or(ChatError::MissingKey)?;

        let body = CompletionRequest {
            model: &self.model,
            messages: [
                Message {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                Message {
                    role: "user",
                    content: input,
                },
            ],
            max_tokens: MAX_TOKENS,
            temperature: TEMPERATURE,
        };

        let resp = self
            .client
            .post(&self.url)
            .bearer_auth(key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if status != StatusCode::OK {
            let body = resp.text().await.unwrap_or_default();
            return Err(ChatError::Upstream { status, body });
        }

        let out: CompletionResponse = resp.json().await?;
        out.choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| ChatError::Malformed("response contained no choices".to_string()))
    }
}
