use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::{header::HeaderMap, header::HeaderValue, Method};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::scheduling::DbId;

use crate::supabase::SupabaseClient;

/// A message handed to the messaging service after a scheduling commit.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct OutboundMessage {
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub appointment_id: Option<DbId>,
    pub content: String,
}

impl OutboundMessage {
    pub fn new(sender_id: Uuid, receiver_id: Uuid, appointment_id: Option<DbId>, content: impl Into<String>) -> Self {
        Self {
            sender_id,
            receiver_id,
            appointment_id,
            content: content.into(),
        }
    }
}

/// Best-effort delivery sink. Implementations may fail; callers log and move on.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, message: &OutboundMessage) -> Result<()>;
}

/// Delivers every message, logging failures. Never fails itself: by the time
/// this runs the scheduling change is already committed.
pub async fn dispatch(notifier: &dyn Notifier, messages: &[OutboundMessage]) -> usize {
    let mut delivered = 0;
    for message in messages {
        match notifier.send(message).await {
            Ok(()) => delivered += 1,
            Err(e) => warn!(
                "Failed to deliver notification to {} (appointment {:?}): {}",
                message.receiver_id, message.appointment_id, e
            ),
        }
    }
    debug!("Delivered {}/{} notifications", delivered, messages.len());
    delivered
}

/// Writes messages to the `messages` table through the Supabase REST gateway.
pub struct SupabaseNotifier {
    supabase: SupabaseClient,
}

impl SupabaseNotifier {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }
}

#[async_trait]
impl Notifier for SupabaseNotifier {
    async fn send(&self, message: &OutboundMessage) -> Result<()> {
        let mut headers = HeaderMap::new();
        headers.insert("Prefer", HeaderValue::from_static("return=representation"));

        let body = json!({
            "sender_id": message.sender_id,
            "receiver_id": message.receiver_id,
            "appointment_id": message.appointment_id,
            "content": message.content,
        });

        let created: Vec<Value> = self
            .supabase
            .request_with_headers(Method::POST, "/rest/v1/messages", None, Some(body), Some(headers))
            .await?;

        if created.is_empty() {
            return Err(anyhow!("Messaging service stored no message"));
        }
        Ok(())
    }
}

/// Used when no messaging backend is configured.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, message: &OutboundMessage) -> Result<()> {
        info!(
            "Notification for {} (appointment {:?}): {}",
            message.receiver_id, message.appointment_id, message.content
        );
        Ok(())
    }
}
