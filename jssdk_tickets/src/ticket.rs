use std::{collections::HashMap, fmt, sync::Arc};

use async_trait::async_trait;
use jssdk_clock::DurationSecs;
use tokio::sync::Mutex;

use crate::{
    renewal::{RenewalHandle, Renew},
    upstream::{Grant, Upstream},
    AppId, AppIdRef, CredentialError, JsapiTicket, TokenManager,
};

#[derive(Debug, Default)]
struct TicketRecord {
    value: Option<JsapiTicket>,
    renewal: Option<RenewalHandle>,
}

type Slot = Arc<Mutex<TicketRecord>>;

struct Inner {
    tokens: TokenManager,
    upstream: Arc<dyn Upstream>,
    records: Mutex<HashMap<AppId, Slot>>,
}

impl Inner {
    async fn slot(&self, app_id: &AppIdRef) -> Slot {
        self.records
            .lock()
            .await
            .entry(app_id.to_owned())
            .or_default()
            .clone()
    }

    async fn existing_slot(&self, app_id: &AppIdRef) -> Option<Slot> {
        self.records.lock().await.get(app_id).cloned()
    }

    // Lock order is always ticket record, then token record.
    #[tracing::instrument(skip_all, fields(app_id = %app_id))]
    async fn fetch(
        &self,
        app_id: &AppIdRef,
        record: &mut TicketRecord,
    ) -> Result<Grant<JsapiTicket>, CredentialError> {
        let token = self.tokens.get_token(app_id).await?;
        let grant = self.upstream.fetch_jsapi_ticket(&token).await?;

        record.value = Some(grant.credential.clone());
        self.tokens.acknowledge_refresh(app_id, &token).await;

        tracing::info!(expires_in = grant.expires_in.0, "stored new jsapi ticket");
        Ok(grant)
    }
}

#[async_trait]
impl Renew for Inner {
    const KIND: &'static str = "jsapi_ticket";

    async fn renew(&self, app_id: &AppIdRef) -> Result<DurationSecs, CredentialError> {
        let slot = self.slot(app_id).await;
        let mut record = slot.lock().await;
        let grant = self.fetch(app_id, &mut record).await?;
        Ok(grant.expires_in)
    }
}

/// Owns the jsapi ticket of every tenant
///
/// Tickets are derived from the tenant's access token and are only fetched
/// for a caller when that token has just been refreshed. Otherwise the cached
/// ticket is served as is. Like tokens, tickets renew themselves in the
/// background when the lifetime declared by the authority runs out.
#[derive(Clone)]
pub struct TicketManager {
    inner: Arc<Inner>,
}

impl TicketManager {
    /// Constructs a manager deriving tickets from the tokens held by `tokens`
    pub fn new(tokens: TokenManager, upstream: Arc<dyn Upstream>) -> Self {
        Self {
            inner: Arc::new(Inner {
                tokens,
                upstream,
                records: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Gets the ticket for a tenant
    ///
    /// When `token_just_refreshed` is false the cached ticket is returned
    /// without any I/O, which may be `None` if no ticket has been obtained.
    /// Otherwise a new ticket is fetched using the current token. On failure
    /// the token stays marked as refreshed, so the next call tries again.
    pub async fn get_ticket(
        &self,
        app_id: &AppIdRef,
        token_just_refreshed: bool,
    ) -> Result<Option<JsapiTicket>, CredentialError> {
        if !token_just_refreshed {
            return Ok(self.current(app_id).await);
        }

        if !self.inner.tokens.registry().contains(app_id) {
            return Err(CredentialError::UnknownTenant {
                app_id: app_id.to_owned(),
            });
        }

        let slot = self.inner.slot(app_id).await;
        let mut record = slot.lock().await;

        // Another caller may have consumed the refresh while we waited
        if record.value.is_some() && !self.inner.tokens.just_refreshed(app_id).await {
            tracing::trace!(app_id = %app_id, "jsapi ticket already derived from current token");
            return Ok(record.value.clone());
        }

        let grant = self.inner.fetch(app_id, &mut record).await?;
        record.renewal = Some(RenewalHandle::spawn(
            Arc::downgrade(&self.inner),
            app_id.to_owned(),
            grant.expires_in,
        ));

        Ok(Some(grant.credential))
    }

    /// The cached ticket, without fetching
    pub async fn current(&self, app_id: &AppIdRef) -> Option<JsapiTicket> {
        let slot = self.inner.existing_slot(app_id).await?;
        let record = slot.lock().await;
        record.value.clone()
    }

    /// Whether a renewal is currently scheduled for the tenant
    pub async fn renewal_scheduled(&self, app_id: &AppIdRef) -> bool {
        match self.inner.existing_slot(app_id).await {
            Some(slot) => slot
                .lock()
                .await
                .renewal
                .as_ref()
                .map_or(false, |r| !r.is_finished()),
            None => false,
        }
    }
}

impl fmt::Debug for TicketManager {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("TicketManager")
            .field("tokens", &self.inner.tokens)
            .finish()
    }
}
