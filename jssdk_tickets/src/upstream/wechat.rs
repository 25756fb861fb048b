//! An upstream that talks to the WeChat official accounts API

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use super::{Grant, Upstream};
use crate::{
    error::{TransportError, UpstreamError},
    AccessToken, AccessTokenRef, AppIdRef, AppSecretRef, JsapiTicket,
};

pub(crate) mod dto;

/// The public endpoint of the WeChat API
pub const DEFAULT_BASE_URL: &str = "https://api.weixin.qq.com";

/// Requests credentials from the WeChat API over HTTP
#[derive(Clone, Debug)]
pub struct WechatUpstream {
    client: reqwest::Client,
    base_url: String,
}

impl WechatUpstream {
    /// Constructs a new upstream against `base_url`
    ///
    /// `base_url` may carry a path prefix when the API is reached through a
    /// proxy; the `cgi-bin` paths are appended to it.
    pub fn new(client: reqwest::Client, base_url: reqwest::Url) -> Self {
        Self {
            client,
            base_url: base_url.as_str().trim_end_matches('/').to_owned(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }
}

#[async_trait]
impl Upstream for WechatUpstream {
    #[tracing::instrument(skip_all, fields(app_id = %app_id))]
    async fn fetch_access_token(
        &self,
        app_id: &AppIdRef,
        secret: &AppSecretRef,
    ) -> Result<Grant<AccessToken>, UpstreamError> {
        let resp: dto::AccessTokenResponse = call(
            &self.client,
            self.endpoint("cgi-bin/token"),
            &[
                ("grant_type", "client_credential"),
                ("appid", app_id.as_str()),
                ("secret", secret.as_str()),
            ],
        )
        .await?;

        tracing::debug!(expires_in = resp.expires_in.0, "received access token");
        Ok(resp.into())
    }

    #[tracing::instrument(skip_all)]
    async fn fetch_jsapi_ticket(
        &self,
        access_token: &AccessTokenRef,
    ) -> Result<Grant<JsapiTicket>, UpstreamError> {
        let resp: dto::TicketResponse = call(
            &self.client,
            self.endpoint("cgi-bin/ticket/getticket"),
            &[("access_token", access_token.as_str()), ("type", "jsapi")],
        )
        .await?;

        tracing::debug!(expires_in = resp.expires_in.0, "received jsapi ticket");
        Ok(resp.into())
    }
}

// The query carries the secret or the access token, so only the URL is recorded
#[tracing::instrument(err, skip_all, fields(url = %url))]
async fn call<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: String,
    query: &[(&str, &str)],
) -> Result<T, UpstreamError> {
    tracing::trace!("requesting credential from authority");

    let resp = client
        .get(&url)
        .query(query)
        .send()
        .await
        .map_err(TransportError::RequestSend)?;

    let status = resp.status();
    tracing::debug!(
        response.status = status.as_u16(),
        "received response from issuing authority"
    );

    if !status.is_success() {
        let body = resp.text().await.map_err(TransportError::BodyRead)?;
        return Err(TransportError::Status {
            status: status.as_u16(),
            body,
        }
        .into());
    }

    let body = resp.bytes().await.map_err(TransportError::BodyRead)?;
    dto::interpret(&body)
}
