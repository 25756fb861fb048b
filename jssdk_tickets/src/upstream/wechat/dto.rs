//! DTOs for interacting with the WeChat API

use jssdk_clock::DurationSecs;
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{Map, Value};

use crate::{
    error::{TransportError, UpstreamError, UpstreamFault},
    upstream::Grant,
    AccessToken, JsapiTicket,
};

#[derive(Debug, Deserialize)]
pub(crate) struct AccessTokenResponse {
    pub access_token: AccessToken,
    pub expires_in: DurationSecs,
}

impl From<AccessTokenResponse> for Grant<AccessToken> {
    fn from(resp: AccessTokenResponse) -> Self {
        Grant::new(resp.access_token, resp.expires_in)
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct TicketResponse {
    pub ticket: JsapiTicket,
    pub expires_in: DurationSecs,
}

impl From<TicketResponse> for Grant<JsapiTicket> {
    fn from(resp: TicketResponse) -> Self {
        Grant::new(resp.ticket, resp.expires_in)
    }
}

/// Splits a response body into a rejection or a successful payload
///
/// The token endpoint omits `errcode` on success while the ticket endpoint
/// sends `0`, so both are treated as success. Any other `errcode`, including
/// one that is not an integer, is a rejection.
pub(crate) fn interpret<T: DeserializeOwned>(body: &[u8]) -> Result<T, UpstreamError> {
    let payload: Map<String, Value> = serde_json::from_slice(body).map_err(TransportError::from)?;

    let accepted = match payload.get("errcode") {
        None => true,
        Some(code) => code.as_i64() == Some(0),
    };
    if !accepted {
        return Err(UpstreamError::Rejected(UpstreamFault::from_payload(payload)));
    }

    Ok(serde_json::from_value(Value::Object(payload)).map_err(TransportError::from)?)
}
