//! The authority that issues access tokens and jsapi tickets

use async_trait::async_trait;
use jssdk_clock::DurationSecs;

use crate::{error::UpstreamError, AccessToken, AccessTokenRef, AppIdRef, AppSecretRef, JsapiTicket};

#[cfg(feature = "wechat")]
#[cfg_attr(docsrs, doc(cfg(feature = "wechat")))]
pub mod wechat;

#[cfg(feature = "wechat")]
pub use wechat::WechatUpstream;

/// A credential granted by the authority along with its declared lifetime
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Grant<T> {
    /// The credential itself
    pub credential: T,
    /// How long the authority says the credential remains valid
    pub expires_in: DurationSecs,
}

impl<T> Grant<T> {
    /// Constructs a new grant
    pub fn new(credential: T, expires_in: DurationSecs) -> Self {
        Self {
            credential,
            expires_in,
        }
    }
}

/// An asynchronous source of credentials from the issuing authority
///
/// Implementations are responsible only for the exchange itself; caching and
/// renewal are handled by the managers in this crate.
#[async_trait]
pub trait Upstream: Send + Sync {
    /// Exchanges a tenant's id and secret for an access token
    async fn fetch_access_token(
        &self,
        app_id: &AppIdRef,
        secret: &AppSecretRef,
    ) -> Result<Grant<AccessToken>, UpstreamError>;

    /// Exchanges an access token for a jsapi ticket
    async fn fetch_jsapi_ticket(
        &self,
        access_token: &AccessTokenRef,
    ) -> Result<Grant<JsapiTicket>, UpstreamError>;
}
