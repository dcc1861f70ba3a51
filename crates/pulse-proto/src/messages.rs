//! Wire messages sent to viewers.
//!
//! Every frame is a JSON object `{"type": ..., "payload": ...}`. Only the
//! `state` type exists today; the tag leaves room for more.

use serde::{Deserialize, Serialize};

use crate::error::{ProtoError, ProtoResult};
use crate::types::ClusterState;

/// Message pushed from the server to a viewer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "lowercase")]
pub enum WireMessage {
    /// Full cluster state.
    State(ClusterState),
}

/// Borrowing twin of [`WireMessage::State`], so encoding never clones a snapshot.
#[derive(Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "lowercase")]
enum WireFrame<'a> {
    State(&'a ClusterState),
}

impl WireMessage {
    /// Encode a `state` frame for the given cluster state.
    ///
    /// # Errors
    ///
    /// Returns [`ProtoError::Encoding`] if serialization fails.
    pub fn encode_state(state: &ClusterState) -> ProtoResult<String> {
        serde_json::to_string(&WireFrame::State(state))
            .map_err(|e| ProtoError::Encoding(e.to_string()))
    }

    /// Encode this message.
    ///
    /// # Errors
    ///
    /// Returns [`ProtoError::Encoding`] if serialization fails.
    pub fn encode(&self) -> ProtoResult<String> {
        match self {
            Self::State(state) => Self::encode_state(state),
        }
    }

    /// Decode a frame received from the server.
    ///
    /// # Errors
    ///
    /// Returns [`ProtoError::Decoding`] for malformed JSON or an unknown type.
    pub fn decode(frame: &str) -> ProtoResult<Self> {
        serde_json::from_str(frame).map_err(|e| ProtoError::Decoding(e.to_string()))
    }

    /// The `type` tag of this message.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::State(_) => "state",
        }
    }
}
