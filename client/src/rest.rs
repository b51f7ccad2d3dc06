use async_trait::async_trait;
use chrono::Utc;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use war_api::prelude::*;

use crate::error::{ClientError, Result};

/// The backend endpoints a war view polls and posts to.
#[async_trait]
pub trait WarBackend: Send + Sync {
    async fn war(&self, war_id: &WarId) -> Result<WarSnapshot>;

    async fn trades(&self, war_id: &WarId) -> Result<Vec<TradeEvent>>;

    async fn chat(&self, war_id: &WarId) -> Result<Vec<ChatMessage>>;

    /// User state stored at a derived address. `None` when the user has
    /// never pledged in this war.
    async fn user_state(&self, address: &str) -> Result<Option<UserState>>;

    async fn send_chat(&self, token: &str, war_id: &WarId, body: &str) -> Result<ChatMessage>;
}

pub struct RestClient {
    http: reqwest::Client,
    base_url: String,
}

impl RestClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.http.get(self.url(path)).send().await?;
        read_envelope(response).await
    }
}

#[async_trait]
impl WarBackend for RestClient {
    async fn war(&self, war_id: &WarId) -> Result<WarSnapshot> {
        self.get(&format!("/wars/{}", war_id)).await
    }

    async fn trades(&self, war_id: &WarId) -> Result<Vec<TradeEvent>> {
        let raw: Vec<Value> = self.get(&format!("/wars/{}/trades", war_id)).await?;
        let now = Utc::now().timestamp();
        Ok(raw.iter().map(|trade| decode_trade(trade, now)).collect())
    }

    async fn chat(&self, war_id: &WarId) -> Result<Vec<ChatMessage>> {
        let raw: Vec<Value> = self.get(&format!("/wars/{}/chat", war_id)).await?;
        let now = Utc::now();
        Ok(raw
            .iter()
            .map(|message| {
                let mut message = decode_chat(message, now);
                if message.war_id.is_empty() {
                    message.war_id = war_id.clone();
                }
                message
            })
            .collect())
    }

    async fn user_state(&self, address: &str) -> Result<Option<UserState>> {
        match self.get(&format!("/user-state/{}", address)).await {
            Ok(state) => Ok(Some(state)),
            Err(ClientError::Http { status, .. }) if status == StatusCode::NOT_FOUND.as_u16() => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn send_chat(&self, token: &str, war_id: &WarId, body: &str) -> Result<ChatMessage> {
        let response = self
            .http
            .post(self.url(&format!("/wars/{}/chat", war_id)))
            .bearer_auth(token)
            .json(&json!({ "warId": war_id, "message": body }))
            .send()
            .await?;
        let raw: Value = read_envelope(response).await?;
        let mut message = decode_chat(&raw, Utc::now());
        if message.war_id.is_empty() {
            message.war_id = war_id.clone();
        }
        Ok(message)
    }
}

async fn read_envelope<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    let body = response.bytes().await?;
    if !status.is_success() {
        return Err(ClientError::Http {
            status: status.as_u16(),
            message: error_message(&body),
        });
    }
    let envelope: Envelope<T> = serde_json::from_slice(&body)?;
    Ok(envelope.data)
}

/// The human-readable part of an error body, if any.
fn error_message(body: &[u8]) -> Option<String> {
    if let Ok(value) = serde_json::from_slice::<Value>(body) {
        return ["message", "error"]
            .iter()
            .find_map(|key| value.get(*key).and_then(Value::as_str))
            .map(str::to_string);
    }
    let text = String::from_utf8_lossy(body).trim().to_string();
    (!text.is_empty()).then_some(text)
}
