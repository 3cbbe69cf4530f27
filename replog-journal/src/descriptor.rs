//! Operation descriptor schema.
//!
//! A journaled REQUEST payload is the JSON encoding of an
//! [`OperationDescriptor`]: an explicit, versioned description of the
//! outbound call, complete enough for the transport to replay it later
//! without any other state.

use crate::error::JournalError;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Current descriptor schema version, embedded in every encoded payload.
pub const DESCRIPTOR_SCHEMA: u32 = 1;

/// HTTP method of a journaled operation.
///
/// Only mutating methods appear here; idempotent fetches are not journaled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Post,
    Put,
    Patch,
    Delete,
}

/// How the transport should decode the response body on replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseKind {
    /// No body expected.
    #[default]
    Empty,
    /// JSON body.
    Json,
    /// Plain text body.
    Text,
}

/// Versioned descriptor of an outbound operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationDescriptor {
    /// Schema version; checked on decode.
    #[serde(default = "default_schema")]
    pub schema: u32,
    /// HTTP method.
    pub method: Method,
    /// Request target (path and query, relative to the service base URL).
    pub target: String,
    /// Extra request headers.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub headers: Vec<(String, String)>,
    /// Request body.
    #[serde(default)]
    pub body: serde_json::Value,
    /// Status code that counts as the expected success outcome.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_status: Option<u16>,
    /// Response decoding hint for replay.
    #[serde(default)]
    pub response_kind: ResponseKind,
}

fn default_schema() -> u32 {
    DESCRIPTOR_SCHEMA
}

impl OperationDescriptor {
    /// Creates a descriptor with default headers, outcome, and response kind.
    pub fn new(method: Method, target: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            schema: DESCRIPTOR_SCHEMA,
            method,
            target: target.into(),
            headers: Vec::new(),
            body,
            expected_status: None,
            response_kind: ResponseKind::default(),
        }
    }

    /// Encodes the descriptor into its journal payload form.
    pub fn encode(&self) -> Result<Bytes, JournalError> {
        Ok(Bytes::from(serde_json::to_vec(self)?))
    }

    /// Decodes a descriptor from a journal payload, rejecting unknown
    /// schema versions.
    pub fn decode(payload: &[u8]) -> Result<Self, JournalError> {
        let descriptor: Self = serde_json::from_slice(payload)?;
        if descriptor.schema != DESCRIPTOR_SCHEMA {
            return Err(JournalError::UnsupportedSchema {
                found: descriptor.schema,
                supported: DESCRIPTOR_SCHEMA,
            });
        }
        Ok(descriptor)
    }
}
