use std::{collections::HashMap, fmt, sync::Arc};

use async_trait::async_trait;
use jssdk_clock::DurationSecs;
use tokio::sync::Mutex;

use crate::{
    renewal::{RenewalHandle, Renew},
    upstream::{Grant, Upstream},
    AccessToken, AccessTokenRef, AppId, AppIdRef, AppSecretRef, CredentialError, TenantRegistry,
};

#[derive(Debug, Default)]
struct TokenRecord {
    value: Option<AccessToken>,
    just_refreshed: bool,
    renewal: Option<RenewalHandle>,
}

type Slot = Arc<Mutex<TokenRecord>>;

struct Inner {
    registry: Arc<TenantRegistry>,
    upstream: Arc<dyn Upstream>,
    records: Mutex<HashMap<AppId, Slot>>,
}

impl Inner {
    fn secret(&self, app_id: &AppIdRef) -> Result<&AppSecretRef, CredentialError> {
        self.registry
            .secret(app_id)
            .ok_or_else(|| CredentialError::UnknownTenant {
                app_id: app_id.to_owned(),
            })
    }

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

    #[tracing::instrument(skip_all, fields(app_id = %app_id))]
    async fn fetch(
        &self,
        app_id: &AppIdRef,
        record: &mut TokenRecord,
    ) -> Result<Grant<AccessToken>, CredentialError> {
        let secret = self.secret(app_id)?;
        let grant = self.upstream.fetch_access_token(app_id, secret).await?;

        record.value = Some(grant.credential.clone());
        record.just_refreshed = true;

        tracing::info!(
            expires_in = grant.expires_in.0,
            "stored new access token"
        );
        Ok(grant)
    }
}

#[async_trait]
impl Renew for Inner {
    const KIND: &'static str = "access_token";

    async fn renew(&self, app_id: &AppIdRef) -> Result<DurationSecs, CredentialError> {
        let slot = self.slot(app_id).await;
        let mut record = slot.lock().await;
        let grant = self.fetch(app_id, &mut record).await?;
        Ok(grant.expires_in)
    }
}

/// Owns the access token of every tenant
///
/// A token is fetched from the authority the first time it is asked for and
/// afterwards served from memory. Freshness is maintained by a background
/// renewal scheduled for the lifetime the authority declared, never by
/// inspecting the token when it is read.
///
/// All fetches for a tenant, whether made for a caller or by the renewal
/// timer, are serialized, so concurrent callers share a single request.
#[derive(Clone)]
pub struct TokenManager {
    inner: Arc<Inner>,
}

impl TokenManager {
    /// Constructs a manager for the tenants in `registry`
    pub fn new(registry: Arc<TenantRegistry>, upstream: Arc<dyn Upstream>) -> Self {
        Self {
            inner: Arc::new(Inner {
                registry,
                upstream,
                records: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// The tenants this manager serves
    #[inline]
    pub fn registry(&self) -> &TenantRegistry {
        &self.inner.registry
    }

    /// Gets the cached token for a tenant, fetching it if there is none
    ///
    /// A successful fetch marks the token as just refreshed and schedules its
    /// renewal. A failed fetch schedules nothing; the next call tries again.
    pub async fn get_token(&self, app_id: &AppIdRef) -> Result<AccessToken, CredentialError> {
        self.inner.secret(app_id)?;

        let slot = self.inner.slot(app_id).await;
        let mut record = slot.lock().await;

        if let Some(token) = &record.value {
            tracing::trace!(app_id = %app_id, "access token served from cache");
            return Ok(token.clone());
        }

        let grant = self.inner.fetch(app_id, &mut record).await?;
        record.renewal = Some(RenewalHandle::spawn(
            Arc::downgrade(&self.inner),
            app_id.to_owned(),
            grant.expires_in,
        ));

        Ok(grant.credential)
    }

    /// Discards the cached token and cancels its pending renewal
    ///
    /// The next call to [`get_token`][Self::get_token] fetches a new one.
    pub async fn invalidate(&self, app_id: &AppIdRef) {
        if let Some(slot) = self.inner.existing_slot(app_id).await {
            let mut record = slot.lock().await;
            record.value = None;
            record.renewal = None;
            tracing::debug!(app_id = %app_id, "access token invalidated");
        }
    }

    /// The cached token, without fetching
    pub async fn current(&self, app_id: &AppIdRef) -> Option<AccessToken> {
        let slot = self.inner.existing_slot(app_id).await?;
        let record = slot.lock().await;
        record.value.clone()
    }

    /// Whether the cached token was replaced since a ticket was last derived from it
    pub async fn just_refreshed(&self, app_id: &AppIdRef) -> bool {
        match self.inner.existing_slot(app_id).await {
            Some(slot) => slot.lock().await.just_refreshed,
            None => false,
        }
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

    /// Records that a ticket has been derived from `used`
    ///
    /// The flag is left alone if the token was replaced in the meantime, as
    /// the ticket then belongs to a superseded token.
    pub(crate) async fn acknowledge_refresh(&self, app_id: &AppIdRef, used: &AccessTokenRef) {
        if let Some(slot) = self.inner.existing_slot(app_id).await {
            let mut record = slot.lock().await;
            if record.value.as_deref() == Some(used) {
                record.just_refreshed = false;
            }
        }
    }
}

impl fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("TokenManager")
            .field("registry", &self.inner.registry)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use color_eyre::Result;

    use super::*;
    use crate::testing::{self, ScriptedUpstream};
    use crate::AppId;

    #[tokio::test]
    async fn first_call_fetches_then_serves_from_cache() -> Result<()> {
        let upstream = ScriptedUpstream::new();
        let tokens = TokenManager::new(testing::registry(), upstream.clone());
        let app_id = testing::app_id();

        let first = tokens.get_token(&app_id).await?;
        let second = tokens.get_token(&app_id).await?;

        assert_eq!(first.as_str(), "token-1");
        assert_eq!(second, first);
        assert_eq!(upstream.token_calls(), 1);
        assert!(tokens.just_refreshed(&app_id).await);
        assert!(tokens.renewal_scheduled(&app_id).await);
        Ok(())
    }

    #[tokio::test]
    async fn unknown_tenant_never_reaches_the_authority() {
        let upstream = ScriptedUpstream::new();
        let tokens = TokenManager::new(testing::registry(), upstream.clone());

        let err = tokens
            .get_token(&AppId::from_static("wx-stranger"))
            .await
            .unwrap_err();

        assert!(matches!(err, CredentialError::UnknownTenant { .. }));
        assert_eq!(upstream.token_calls(), 0);
    }

    #[tokio::test]
    async fn rejection_is_not_cached_and_not_rescheduled() -> Result<()> {
        let upstream = ScriptedUpstream::new();
        upstream.queue_token(Err(testing::rejection(40125, "invalid appsecret")));
        let tokens = TokenManager::new(testing::registry(), upstream.clone());
        let app_id = testing::app_id();

        let err = tokens.get_token(&app_id).await.unwrap_err();
        assert_eq!(err.errcode(), 40125);
        assert!(!tokens.renewal_scheduled(&app_id).await);
        assert_eq!(tokens.current(&app_id).await, None);

        let token = tokens.get_token(&app_id).await?;
        assert_eq!(token.as_str(), "token-2");
        assert_eq!(upstream.token_calls(), 2);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn renews_once_at_the_declared_lifetime() -> Result<()> {
        let upstream = ScriptedUpstream::new();
        upstream.queue_token(Ok(Grant::new(
            AccessToken::from_static("short-lived"),
            DurationSecs(60),
        )));
        let tokens = TokenManager::new(testing::registry(), upstream.clone());
        let app_id = testing::app_id();

        tokens.get_token(&app_id).await?;
        tokens.acknowledge_refresh(&app_id, &AccessToken::from_static("short-lived")).await;
        assert!(!tokens.just_refreshed(&app_id).await);

        tokio::time::sleep(Duration::from_secs(59)).await;
        assert_eq!(upstream.token_calls(), 1);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(upstream.token_calls(), 2);
        assert_eq!(tokens.current(&app_id).await.unwrap().as_str(), "token-2");
        assert!(tokens.just_refreshed(&app_id).await);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn failed_renewal_keeps_token_and_stops() -> Result<()> {
        let upstream = ScriptedUpstream::new();
        upstream.queue_token(Ok(Grant::new(
            AccessToken::from_static("kept"),
            DurationSecs(60),
        )));
        upstream.queue_token(Err(testing::unreachable()));
        let tokens = TokenManager::new(testing::registry(), upstream.clone());
        let app_id = testing::app_id();

        tokens.get_token(&app_id).await?;
        tokio::time::sleep(Duration::from_secs(61)).await;

        assert_eq!(upstream.token_calls(), 2);
        assert!(!tokens.renewal_scheduled(&app_id).await);
        assert_eq!(tokens.current(&app_id).await.unwrap().as_str(), "kept");

        tokio::time::sleep(Duration::from_secs(7200)).await;
        assert_eq!(upstream.token_calls(), 2);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn invalidation_cancels_the_pending_renewal() -> Result<()> {
        let upstream = ScriptedUpstream::new();
        upstream.queue_token(Ok(Grant::new(
            AccessToken::from_static("first"),
            DurationSecs(100),
        )));
        let tokens = TokenManager::new(testing::registry(), upstream.clone());
        let app_id = testing::app_id();

        tokens.get_token(&app_id).await?;
        tokio::time::sleep(Duration::from_secs(50)).await;

        tokens.invalidate(&app_id).await;
        assert_eq!(tokens.current(&app_id).await, None);
        let forced = tokens.get_token(&app_id).await?;
        assert_eq!(forced.as_str(), "token-2");

        // the original timer would have fired at 100s
        tokio::time::sleep(Duration::from_secs(70)).await;
        assert_eq!(upstream.token_calls(), 2);
        assert_eq!(tokens.current(&app_id).await, Some(forced));
        Ok(())
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_fetch() -> Result<()> {
        let upstream = ScriptedUpstream::new();
        let tokens = TokenManager::new(testing::registry(), upstream.clone());
        let app_id = testing::app_id();

        let (a, b) = tokio::join!(tokens.get_token(&app_id), tokens.get_token(&app_id));

        assert_eq!(a?, b?);
        assert_eq!(upstream.token_calls(), 1);
        Ok(())
    }
}
