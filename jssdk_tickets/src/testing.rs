//! A scripted authority for exercising the managers without a network

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use async_trait::async_trait;
use jssdk_clock::DurationSecs;
use serde_json::{Map, Value};

use crate::{
    error::{TransportError, UpstreamError, UpstreamFault},
    upstream::{Grant, Upstream},
    AccessToken, AccessTokenRef, AppId, AppIdRef, AppSecret, AppSecretRef, JsapiTicket,
    TenantRegistry,
};

pub(crate) const APP_ID: &str = "wx-tenant";
pub(crate) const LIFETIME: DurationSecs = DurationSecs(7200);

type Scripted<T> = Mutex<VecDeque<Result<Grant<T>, UpstreamError>>>;

/// Hands out `token-N` / `ticket-N` unless a response has been queued
#[derive(Default)]
pub(crate) struct ScriptedUpstream {
    tokens: Scripted<AccessToken>,
    tickets: Scripted<JsapiTicket>,
    token_calls: AtomicUsize,
    ticket_calls: AtomicUsize,
    tokens_used: Mutex<Vec<String>>,
}

impl ScriptedUpstream {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn queue_token(&self, response: Result<Grant<AccessToken>, UpstreamError>) {
        self.tokens.lock().unwrap().push_back(response);
    }

    pub(crate) fn queue_ticket(&self, response: Result<Grant<JsapiTicket>, UpstreamError>) {
        self.tickets.lock().unwrap().push_back(response);
    }

    pub(crate) fn token_calls(&self) -> usize {
        self.token_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn ticket_calls(&self) -> usize {
        self.ticket_calls.load(Ordering::SeqCst)
    }

    /// The access tokens presented when tickets were requested, in order
    pub(crate) fn tokens_used(&self) -> Vec<String> {
        self.tokens_used.lock().unwrap().clone()
    }
}

#[async_trait]
impl Upstream for ScriptedUpstream {
    async fn fetch_access_token(
        &self,
        _app_id: &AppIdRef,
        _secret: &AppSecretRef,
    ) -> Result<Grant<AccessToken>, UpstreamError> {
        let n = self.token_calls.fetch_add(1, Ordering::SeqCst) + 1;
        // give other callers a chance to interleave with this fetch
        tokio::task::yield_now().await;

        let scripted = self.tokens.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| {
            Ok(Grant::new(
                AccessToken::from(format!("token-{}", n)),
                LIFETIME,
            ))
        })
    }

    async fn fetch_jsapi_ticket(
        &self,
        access_token: &AccessTokenRef,
    ) -> Result<Grant<JsapiTicket>, UpstreamError> {
        let n = self.ticket_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.tokens_used
            .lock()
            .unwrap()
            .push(access_token.as_str().to_owned());
        tokio::task::yield_now().await;

        let scripted = self.tickets.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| {
            Ok(Grant::new(
                JsapiTicket::from(format!("ticket-{}", n)),
                LIFETIME,
            ))
        })
    }
}

pub(crate) fn registry() -> Arc<TenantRegistry> {
    Arc::new(TenantRegistry::new([(
        AppId::from_static(APP_ID),
        AppSecret::from_static("tenant-secret"),
    )]))
}

pub(crate) fn app_id() -> AppId {
    AppId::from_static(APP_ID)
}

pub(crate) fn rejection(errcode: i64, errmsg: &str) -> UpstreamError {
    let mut payload = Map::new();
    payload.insert("errcode".to_owned(), Value::from(errcode));
    payload.insert("errmsg".to_owned(), Value::from(errmsg));
    UpstreamError::Rejected(UpstreamFault::from_payload(payload))
}

pub(crate) fn unreachable() -> UpstreamError {
    UpstreamError::Transport(TransportError::Status {
        status: 503,
        body: "service unavailable".to_owned(),
    })
}
