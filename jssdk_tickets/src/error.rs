//! Failures while obtaining credentials or signing

use serde_json::{Map, Value};
use thiserror::Error;

use crate::AppId;

/// Error code reported when a tenant is not registered
///
/// Matches the code the authority itself uses for an invalid `appid`, so
/// callers see the same shape whichever side detects the problem.
pub const UNKNOWN_TENANT_ERRCODE: i64 = 40013;

/// Error code reported when the authority could not be reached
pub const TRANSPORT_ERRCODE: i64 = -1;

/// Error code reported when there is no ticket to sign with
pub const SIGNING_PRECONDITION_ERRCODE: i64 = -2;

/// A rejection returned by the authority with a non-zero `errcode`
///
/// The complete body is retained so that it can be handed back to the
/// caller exactly as the authority produced it.
#[derive(Clone, Debug, PartialEq)]
pub struct UpstreamFault {
    errcode: i64,
    payload: Map<String, Value>,
}

impl UpstreamFault {
    /// Wraps an error body returned by the authority
    ///
    /// A numeric string `errcode` is read as its number. One that cannot be
    /// read at all is reported as [`TRANSPORT_ERRCODE`], never as `0`.
    pub fn from_payload(payload: Map<String, Value>) -> Self {
        let errcode = fault_code(&payload);
        Self { errcode, payload }
    }

    /// The authority's error code
    #[inline]
    pub fn errcode(&self) -> i64 {
        self.errcode
    }

    /// The authority's error message, if it sent one
    pub fn errmsg(&self) -> Option<&str> {
        self.payload.get("errmsg").and_then(Value::as_str)
    }

    /// The body exactly as returned by the authority
    #[inline]
    pub fn payload(&self) -> &Map<String, Value> {
        &self.payload
    }
}

/// Reads the `errcode` of a body known to describe a failure
pub(crate) fn fault_code(payload: &Map<String, Value>) -> i64 {
    match payload.get("errcode") {
        Some(Value::String(code)) => code.trim().parse::<i64>().ok(),
        Some(code) => code.as_i64(),
        None => None,
    }
    .filter(|code| *code != 0)
    .unwrap_or(TRANSPORT_ERRCODE)
}

impl std::fmt::Display for UpstreamFault {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "errcode {}", self.errcode)?;
        if let Some(msg) = self.errmsg() {
            write!(f, ": {}", msg)?;
        }
        Ok(())
    }
}

/// An error while talking to the authority at the HTTP layer
#[derive(Debug, Error)]
pub enum TransportError {
    /// Unable to send a request to the authority
    #[cfg(feature = "wechat")]
    #[error("error sending request to authority")]
    RequestSend(#[source] reqwest::Error),
    /// Unable to read the response
    #[cfg(feature = "wechat")]
    #[error("error reading response body")]
    BodyRead(#[source] reqwest::Error),
    /// The authority answered with an unexpected HTTP status
    #[error("authority responded with HTTP status {status}: {body}")]
    Status {
        /// The HTTP status code
        status: u16,
        /// The body of the response
        body: String,
    },
    /// The response body could not be understood
    #[error("error deserializing response body from authority")]
    Decode(#[from] serde_json::Error),
}

/// An error reported by an [`Upstream`][crate::upstream::Upstream] implementation
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// The authority rejected the request
    #[error("authority rejected request: {0}")]
    Rejected(UpstreamFault),
    /// The authority could not be reached or its answer could not be read
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// An error obtaining a signature for a tenant
#[derive(Debug, Error)]
pub enum CredentialError {
    /// The tenant is not present in the registry
    #[error("tenant {app_id} is not registered")]
    UnknownTenant {
        /// The requested tenant
        app_id: AppId,
    },
    /// The authority returned a non-zero `errcode`
    #[error("authority rejected request: {0}")]
    UpstreamRejected(UpstreamFault),
    /// The authority could not be reached
    #[error("unable to reach authority")]
    Transport(#[source] TransportError),
    /// No ticket has ever been obtained for the tenant
    #[error("no jsapi ticket available to sign with")]
    SigningPrecondition,
}

impl From<UpstreamError> for CredentialError {
    fn from(err: UpstreamError) -> Self {
        match err {
            UpstreamError::Rejected(fault) => Self::UpstreamRejected(fault),
            UpstreamError::Transport(err) => Self::Transport(err),
        }
    }
}

impl CredentialError {
    /// The `errcode` reported to callers for this error
    pub fn errcode(&self) -> i64 {
        match self {
            Self::UnknownTenant { .. } => UNKNOWN_TENANT_ERRCODE,
            Self::UpstreamRejected(fault) => fault.errcode(),
            Self::Transport(_) => TRANSPORT_ERRCODE,
            Self::SigningPrecondition => SIGNING_PRECONDITION_ERRCODE,
        }
    }

    /// The error body reported to callers
    ///
    /// Rejections from the authority are passed through untouched. All other
    /// errors are described as `{errcode, errmsg}`.
    pub fn to_payload(&self) -> Map<String, Value> {
        let errmsg = match self {
            Self::UpstreamRejected(fault) => return fault.payload().clone(),
            Self::UnknownTenant { .. } => "invalid appid".to_owned(),
            Self::Transport(err) => format!("upstream unavailable: {}", err),
            Self::SigningPrecondition => "jsapi ticket unavailable".to_owned(),
        };

        let mut payload = Map::new();
        payload.insert("errcode".to_owned(), self.errcode().into());
        payload.insert("errmsg".to_owned(), errmsg.into());
        payload
    }
}
