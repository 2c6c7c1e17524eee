//! Best-effort local order log: a JSON array file appended to by
//! read-modify-write. This is backup, not a system of record; there is
//! no locking, and concurrent appends may lose entries.

use crate::error::Result;
use crate::order::OrderRecord;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::fs;
use tracing::warn;

/// An order as it sits in the log file: the record plus the time it
/// was persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedOrder {
    #[serde(flatten)]
    pub order: OrderRecord,
    #[serde(rename = "savedAt")]
    pub saved_at: DateTime<Utc>,
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn append(&self, order: &OrderRecord) -> Result<SavedOrder>;
}

pub struct JsonFileOrderStore {
    path: PathBuf,
}

impl JsonFileOrderStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Missing or unparseable files read as empty; the log never blocks
    /// order processing over its own state.
    pub async fn read_all(&self) -> Vec<SavedOrder> {
        match fs::read(&self.path).await {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(orders) => orders,
                Err(e) => {
                    warn!(path = %self.path.display(), "order log unreadable, starting fresh: {e}");
                    Vec::new()
                }
            },
            Err(_) => Vec::new(),
        }
    }
}

#[async_trait]
impl OrderStore for JsonFileOrderStore {
    async fn append(&self, order: &OrderRecord) -> Result<SavedOrder> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut orders = self.read_all().await;
        let saved = SavedOrder {
            order: order.clone(),
            saved_at: Utc::now(),
        };
        orders.push(saved.clone());

        let json = serde_json::to_vec_pretty(&orders)?;
        fs::write(&self.path, json).await?;
        Ok(saved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn order(session_id: &str) -> OrderRecord {
        serde_json::from_value(json!({
            "stripeSessionId": session_id,
            "stripeCustomerId": null,
            "orderDate": "2025-08-25T12:00:00Z",
            "orderTotal": 49.99,
            "currency": "cad",
            "paymentStatus": "paid",
            "customerName": "Ada",
            "customerEmail": "ada@example.com",
            "customerPhone": "",
            "shippingAddress": null,
            "productId": "doc_1",
            "productTitle": "Sunset Print",
            "productPrice": "49.99",
            "productSlug": "sunset-print",
            "orderNotes": ""
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn round_trip_appends_record_with_saved_at() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileOrderStore::new(dir.path().join("orders.json"));

        let saved = store.append(&order("cs_1")).await.unwrap();
        let read_back = store.read_all().await;

        assert_eq!(read_back.len(), 1);
        assert_eq!(read_back.last().unwrap(), &saved);
        assert_eq!(read_back[0].order.stripe_session_id, "cs_1");
    }

    #[tokio::test]
    async fn corrupt_file_reads_as_empty_and_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("orders.json");
        std::fs::write(&path, "not json at all").unwrap();

        let store = JsonFileOrderStore::new(&path);
        assert!(store.read_all().await.is_empty());

        store.append(&order("cs_1")).await.unwrap();
        assert_eq!(store.read_all().await.len(), 1);
    }

    #[tokio::test]
    async fn missing_parent_directory_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileOrderStore::new(dir.path().join("tmp/nested/orders.json"));
        store.append(&order("cs_1")).await.unwrap();
        assert_eq!(store.read_all().await.len(), 1);
    }

    #[tokio::test]
    async fn duplicate_appends_are_not_deduplicated() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileOrderStore::new(dir.path().join("orders.json"));

        store.append(&order("cs_1")).await.unwrap();
        store.append(&order("cs_1")).await.unwrap();

        let orders = store.read_all().await;
        assert_eq!(orders.len(), 2);
        assert_eq!(orders[0].order.stripe_session_id, "cs_1");
        assert_eq!(orders[1].order.stripe_session_id, "cs_1");
    }

    #[test]
    fn log_entry_serializes_flat_with_saved_at() {
        let saved = SavedOrder {
            order: order("cs_1"),
            saved_at: "2025-08-25T12:34:56Z".parse().unwrap(),
        };
        let value = serde_json::to_value(&saved).unwrap();
        assert_eq!(value["stripeSessionId"], "cs_1");
        assert_eq!(value["savedAt"], "2025-08-25T12:34:56Z");
    }
}
