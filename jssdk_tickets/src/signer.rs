//! JS-SDK permission signatures

use jssdk_clock::{Clock, System, UnixMillis};
use rand::{distributions::Alphanumeric, Rng};
use ring::digest;
use serde::{Deserialize, Serialize};

use crate::{AppId, AppIdRef, CredentialError, JsapiTicketRef};

const NONCE_LEN: usize = 16;

/// Everything a page needs to pass to `wx.config`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignaturePacket {
    /// The tenant the signature was made for
    pub app_id: AppId,
    /// When the signature was made, in milliseconds since the Unix epoch
    pub timestamp: UnixMillis,
    /// The random nonce included in the signature
    pub nonce_str: String,
    /// The lowercase hex SHA-1 signature
    pub signature: String,
}

/// Signs page URLs with a tenant's jsapi ticket
#[derive(Clone, Copy, Debug, Default)]
pub struct HashSigner<C = System> {
    clock: C,
}

impl HashSigner {
    /// Constructs a signer using the system clock
    pub const fn new() -> Self {
        Self { clock: System }
    }
}

impl<C> HashSigner<C> {
    /// Uses `clock` to timestamp signatures
    pub fn with_clock<D>(self, clock: D) -> HashSigner<D> {
        HashSigner { clock }
    }
}

impl<C: Clock> HashSigner<C> {
    /// Signs `url` for a tenant with a fresh nonce and the current time
    ///
    /// Fails with [`CredentialError::SigningPrecondition`] if there is no
    /// ticket to sign with.
    pub fn sign(
        &self,
        app_id: &AppIdRef,
        ticket: Option<&JsapiTicketRef>,
        url: &str,
    ) -> Result<SignaturePacket, CredentialError> {
        let ticket = ticket.ok_or(CredentialError::SigningPrecondition)?;
        let nonce_str = generate_nonce();
        let timestamp = self.clock.now();
        let signature = signature(ticket, &nonce_str, timestamp, url);

        tracing::debug!(app_id = %app_id, timestamp = timestamp.0, "signed url");

        Ok(SignaturePacket {
            app_id: app_id.to_owned(),
            timestamp,
            nonce_str,
            signature,
        })
    }
}

/// The string that is hashed to produce a signature
///
/// Field order and naming are fixed by the verifying party.
pub fn canonical_string(
    ticket: &JsapiTicketRef,
    nonce: &str,
    timestamp: UnixMillis,
    url: &str,
) -> String {
    format!(
        "jsapi_ticket={}&noncestr={}&timestamp={}&url={}",
        ticket.as_str(),
        nonce,
        timestamp,
        url
    )
}

/// Computes the signature over the given fields
pub fn signature(ticket: &JsapiTicketRef, nonce: &str, timestamp: UnixMillis, url: &str) -> String {
    let canonical = canonical_string(ticket, nonce, timestamp, url);
    hex::encode(digest::digest(&digest::SHA1_FOR_LEGACY_USE_ONLY, canonical.as_bytes()))
}

fn generate_nonce() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(NONCE_LEN)
        .map(char::from)
        .collect()
}
