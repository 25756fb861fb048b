//! The result shapes handed back to signature requesters

use serde::Serialize;
use serde_json::{Map, Value};

use crate::{error, CredentialError, SignaturePacket};

/// The body answered to a signature request
///
/// Success and failure are distinguished by `errcode`, which is `0` only for
/// a granted signature.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum PermissionResponse {
    /// A signature was issued
    Granted {
        /// Always `0`
        errcode: i64,
        /// The signature
        #[serde(flatten)]
        packet: SignaturePacket,
    },
    /// No signature could be issued
    Denied(Map<String, Value>),
}

impl PermissionResponse {
    /// The `errcode` of the response
    pub fn errcode(&self) -> i64 {
        match self {
            Self::Granted { errcode, .. } => *errcode,
            Self::Denied(payload) => error::fault_code(payload),
        }
    }
}

impl From<SignaturePacket> for PermissionResponse {
    fn from(packet: SignaturePacket) -> Self {
        Self::Granted { errcode: 0, packet }
    }
}

impl From<CredentialError> for PermissionResponse {
    fn from(err: CredentialError) -> Self {
        Self::Denied(err.to_payload())
    }
}

impl From<Result<SignaturePacket, CredentialError>> for PermissionResponse {
    fn from(result: Result<SignaturePacket, CredentialError>) -> Self {
        match result {
            Ok(packet) => packet.into(),
            Err(err) => err.into(),
        }
    }
}
