//! In-memory append-only message store.
//!
//! The default [`DeliverySink`]: accepts every well-formed delivery, assigns
//! it an increasing id and keeps it for later listing.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::delivery::DeliverySink;
use crate::error::DeliveryError;
use crate::relay::Delivery;

/// A delivered message as kept by the store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: u64,
    pub sender_id: String,
    pub receiver_id: String,
    pub payload: String,
}

/// Thread-safe append-only store.
#[derive(Debug, Default)]
pub struct MessageStore {
    messages: RwLock<Vec<StoredMessage>>,
}

impl MessageStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a message and returns its id. Ids start at 1.
    pub fn append(&self, delivery: &Delivery) -> Result<u64, DeliveryError> {
        if delivery.sender.is_empty() || delivery.receiver.is_empty() || delivery.payload.is_empty() {
            return Err(DeliveryError::Rejected(
                "missing sender, receiver or payload".to_string(),
            ));
        }

        let mut messages = self.messages.write();
        let id = messages.len() as u64 + 1;
        messages.push(StoredMessage {
            id,
            sender_id: delivery.sender.clone(),
            receiver_id: delivery.receiver.clone(),
            payload: delivery.payload.clone(),
        });
        Ok(id)
    }

    /// Returns all messages in insertion order.
    pub fn list(&self) -> Vec<StoredMessage> {
        self.messages.read().clone()
    }

    /// Returns the messages addressed to `receiver_id`.
    pub fn for_receiver(&self, receiver_id: &str) -> Vec<StoredMessage> {
        self.messages
            .read()
            .iter()
            .filter(|m| m.receiver_id == receiver_id)
            .cloned()
            .collect()
    }

    /// Number of stored messages.
    pub fn len(&self) -> usize {
        self.messages.read().len()
    }

    /// Returns true if nothing has been stored.
    pub fn is_empty(&self) -> bool {
        self.messages.read().is_empty()
    }
}

impl DeliverySink for MessageStore {
    fn deliver(&self, delivery: &Delivery) -> Result<(), DeliveryError> {
        self.append(delivery).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delivery(receiver: &str, payload: &str) -> Delivery {
        Delivery {
            sender: "srv_6c3a7".into(),
            receiver: receiver.into(),
            payload: payload.into(),
        }
    }

    #[test]
    fn test_append_assigns_increasing_ids() {
        let store = MessageStore::new();
        assert!(store.is_empty());
        assert_eq!(store.append(&delivery("srv_70f8b", "one")).unwrap(), 1);
        assert_eq!(store.append(&delivery("sat_1", "two")).unwrap(), 2);
        assert_eq!(store.len(), 2);
        assert_eq!(store.list()[1].payload, "two");
    }

    #[test]
    fn test_for_receiver() {
        let store = MessageStore::new();
        store.deliver(&delivery("x", "1")).unwrap();
        store.deliver(&delivery("y", "2")).unwrap();
        store.deliver(&delivery("x", "3")).unwrap();

        let for_x = store.for_receiver("x");
        assert_eq!(for_x.len(), 2);
        assert_eq!(for_x[1].id, 3);
    }

    #[test]
    fn test_rejects_incomplete() {
        let store = MessageStore::new();
        assert!(matches!(
            store.deliver(&delivery("x", "")),
            Err(DeliveryError::Rejected(_))
        ));
        assert!(store.is_empty());
    }
}
