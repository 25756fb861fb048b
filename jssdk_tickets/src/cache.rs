use std::sync::Arc;

use jssdk_clock::{Clock, System};

use crate::{
    upstream::Upstream, AppIdRef, CredentialError, HashSigner, SignaturePacket, TenantRegistry,
    TicketManager, TokenManager,
};

/// Issues signatures for tenants, keeping their credentials fresh
///
/// The cache chains each tenant's access token to its jsapi ticket: a ticket
/// is only fetched right after the token it derives from, and both renew
/// themselves in the background when the authority says they expire.
#[derive(Clone, Debug)]
pub struct CredentialCache<C = System> {
    tokens: TokenManager,
    tickets: TicketManager,
    signer: HashSigner<C>,
}

impl CredentialCache {
    /// Constructs a cache for the tenants in `registry`
    pub fn new(registry: TenantRegistry, upstream: Arc<dyn Upstream>) -> Self {
        let tokens = TokenManager::new(Arc::new(registry), upstream.clone());
        let tickets = TicketManager::new(tokens.clone(), upstream);

        Self {
            tokens,
            tickets,
            signer: HashSigner::new(),
        }
    }
}

impl<C> CredentialCache<C> {
    /// Uses `clock` to timestamp signatures
    pub fn with_clock<D>(self, clock: D) -> CredentialCache<D> {
        CredentialCache {
            tokens: self.tokens,
            tickets: self.tickets,
            signer: self.signer.with_clock(clock),
        }
    }

    /// The tenants this cache serves
    #[inline]
    pub fn registry(&self) -> &TenantRegistry {
        self.tokens.registry()
    }

    /// The access token manager
    #[inline]
    pub fn tokens(&self) -> &TokenManager {
        &self.tokens
    }

    /// The jsapi ticket manager
    #[inline]
    pub fn tickets(&self) -> &TicketManager {
        &self.tickets
    }
}

impl<C: Clock> CredentialCache<C> {
    /// Signs `url` for a tenant, fetching credentials only if needed
    ///
    /// Any rejection from the authority is returned as-is and stops the chain.
    #[tracing::instrument(skip_all, fields(app_id = %app_id))]
    pub async fn get_permission(
        &self,
        app_id: &AppIdRef,
        url: &str,
    ) -> Result<SignaturePacket, CredentialError> {
        self.tokens.get_token(app_id).await?;
        let refreshed = self.tokens.just_refreshed(app_id).await;
        let ticket = self.tickets.get_ticket(app_id, refreshed).await?;
        self.signer.sign(app_id, ticket.as_deref(), url)
    }

    /// Signs `url` for a tenant after forcing new credentials
    ///
    /// The cached token is discarded, so a new token and a new ticket are
    /// always fetched.
    #[tracing::instrument(skip_all, fields(app_id = %app_id))]
    pub async fn get_permission_with_refresh(
        &self,
        app_id: &AppIdRef,
        url: &str,
    ) -> Result<SignaturePacket, CredentialError> {
        self.tokens.invalidate(app_id).await;
        self.get_permission(app_id, url).await
    }
}
