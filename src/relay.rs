//! Relay instructions and per-port relay state.

use serde::{Deserialize, Serialize};

use crate::types::PortId;

/// A message in flight: where it started, where it must end, and its body.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction {
    pub origin: PortId,
    pub objective: PortId,
    pub payload: String,
}

impl Instruction {
    /// Creates a new instruction.
    pub fn new(origin: PortId, objective: PortId, payload: impl Into<String>) -> Self {
        Self {
            origin,
            objective,
            payload: payload.into(),
        }
    }
}

/// Relay state of a single port.
///
/// A port either holds nothing or holds exactly one instruction that is
/// waiting for its next hop.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelayState {
    #[default]
    Idle,
    RelayPending(Instruction),
}

impl RelayState {
    /// Returns true if the port holds no instruction.
    pub fn is_idle(&self) -> bool {
        matches!(self, RelayState::Idle)
    }

    /// Returns true if the port holds an instruction.
    pub fn is_pending(&self) -> bool {
        matches!(self, RelayState::RelayPending(_))
    }

    /// Returns the held instruction, if any.
    pub fn instruction(&self) -> Option<&Instruction> {
        match self {
            RelayState::Idle => None,
            RelayState::RelayPending(instruction) => Some(instruction),
        }
    }

    /// Takes the held instruction, leaving the port idle.
    pub fn take(&mut self) -> Option<Instruction> {
        match std::mem::take(self) {
            RelayState::Idle => None,
            RelayState::RelayPending(instruction) => Some(instruction),
        }
    }
}

/// A completed relay, handed to the delivery sink.
///
/// Ids are base node ids; port suffixes are stripped.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delivery {
    #[serde(rename = "sender_id")]
    pub sender: String,
    #[serde(rename = "receiver_id", alias = "reciever_id")]
    pub receiver: String,
    pub payload: String,
}

/// An originate command as received at the boundary.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendRequest {
    pub origin: String,
    pub destination: String,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_take() {
        let instruction = Instruction::new(PortId::new("a", 1), PortId::new("c", 1), "hi");
        let mut state = RelayState::RelayPending(instruction.clone());

        assert!(state.is_pending());
        assert_eq!(state.instruction(), Some(&instruction));
        assert_eq!(state.take(), Some(instruction));
        assert!(state.is_idle());
        assert_eq!(state.take(), None);
    }

    #[test]
    fn test_delivery_wire_names() {
        let delivery = Delivery {
            sender: "sat_1".into(),
            receiver: "srv_2".into(),
            payload: "hello".into(),
        };
        let json = serde_json::to_value(&delivery).unwrap();
        assert_eq!(json["sender_id"], "sat_1");
        assert_eq!(json["receiver_id"], "srv_2");

        let parsed: Delivery = serde_json::from_str(
            r#"{"sender_id": "a", "reciever_id": "b", "payload": "p"}"#,
        )
        .unwrap();
        assert_eq!(parsed.receiver, "b");
    }

    #[test]
    fn test_send_request_parse() {
        let req: SendRequest = serde_json::from_str(
            r#"{"origin": "srv_6c3a7", "destination": "srv_70f8b", "message": "Hello"}"#,
        )
        .unwrap();
        assert_eq!(req.origin, "srv_6c3a7");
        assert_eq!(req.message, "Hello");
    }
}
