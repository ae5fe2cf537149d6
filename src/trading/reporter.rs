//! Outbound reporting: alerts and transaction lines.
//!
//! Delivery is fire-and-forget. A failed report is logged and dropped,
//! never retried, and never fails the invocation that produced it.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, warn};

const DELIVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Sink for human-readable execution reports.
#[async_trait]
pub trait Reporter: Send + Sync {
    /// Deliver an error/alert message.
    async fn alert(&self, message: &str);

    /// Deliver one transaction line of a flushed ledger.
    async fn transaction(&self, message: &str);
}

/// Posts reports to two Discord webhooks: one channel for alerts, one for
/// the transaction trail.
pub struct DiscordReporter {
    http: Client,
    error_url: String,
    transaction_url: String,
}

impl DiscordReporter {
    pub fn new(error_url: String, transaction_url: String) -> Result<Self, reqwest::Error> {
        let http = Client::builder().timeout(DELIVERY_TIMEOUT).build()?;
        Ok(Self {
            http,
            error_url,
            transaction_url,
        })
    }

    async fn post(&self, url: &str, content: String) {
        let result = self
            .http
            .post(url)
            .form(&[("content", content.as_str())])
            .send()
            .await;

        match result {
            Ok(response) if !response.status().is_success() => {
                warn!(status = %response.status(), "report delivery rejected");
            }
            Ok(_) => debug!("report delivered"),
            Err(e) => warn!(error = %e, "report delivery failed"),
        }
    }
}

#[async_trait]
impl Reporter for DiscordReporter {
    async fn alert(&self, message: &str) {
        self.post(&self.error_url, format!("@everyone {}", message))
            .await;
    }

    async fn transaction(&self, message: &str) {
        self.post(&self.transaction_url, message.to_string()).await;
    }
}

/// Reporter used when reporting is disabled.
pub struct NullReporter;

#[async_trait]
impl Reporter for NullReporter {
    async fn alert(&self, message: &str) {
        debug!(message = %message, "alert (reporting disabled)");
    }

    async fn transaction(&self, message: &str) {
        debug!(message = %message, "transaction (reporting disabled)");
    }
}

#[cfg(test)]
pub mod recording {
    //! Reporter that captures messages for assertions.

    use std::sync::Mutex;

    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Delivered {
        Alert(String),
        Transaction(String),
    }

    #[derive(Default)]
    pub struct RecordingReporter {
        messages: Mutex<Vec<Delivered>>,
    }

    impl RecordingReporter {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn messages(&self) -> Vec<Delivered> {
            self.messages.lock().unwrap().clone()
        }

        pub fn transactions(&self) -> Vec<String> {
            self.messages()
                .into_iter()
                .filter_map(|m| match m {
                    Delivered::Transaction(s) => Some(s),
                    _ => None,
                })
                .collect()
        }

        pub fn alerts(&self) -> Vec<String> {
            self.messages()
                .into_iter()
                .filter_map(|m| match m {
                    Delivered::Alert(s) => Some(s),
                    _ => None,
                })
                .collect()
        }
    }

    #[async_trait]
    impl Reporter for RecordingReporter {
        async fn alert(&self, message: &str) {
            self.messages
                .lock()
                .unwrap()
                .push(Delivered::Alert(message.to_string()));
        }

        async fn transaction(&self, message: &str) {
            self.messages
                .lock()
                .unwrap()
                .push(Delivered::Transaction(message.to_string()));
        }
    }
}
