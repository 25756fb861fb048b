use std::{error, fmt, sync::Weak};

use async_trait::async_trait;
use jssdk_clock::DurationSecs;
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::{AppId, AppIdRef, CredentialError};

/// Shortest delay between renewals, so that a zero lifetime cannot spin
const MIN_DELAY: DurationSecs = DurationSecs(1);

/// A credential owner that can refetch a tenant's credential in the background
#[async_trait]
pub(crate) trait Renew: Send + Sync + 'static {
    /// The kind of credential being renewed, used when logging
    const KIND: &'static str;

    /// Refetches and stores the credential, returning its new lifetime
    async fn renew(&self, app_id: &AppIdRef) -> Result<DurationSecs, CredentialError>;
}

/// The outstanding renewal timer for one tenant's credential
///
/// Dropping the handle cancels the timer.
pub(crate) struct RenewalHandle {
    app_id: AppId,
    kind: &'static str,
    join: JoinHandle<()>,
}

impl RenewalHandle {
    /// Schedules a renewal of `app_id`'s credential after `delay`
    ///
    /// After each successful renewal the next one is scheduled using the
    /// freshly declared lifetime. The first failure ends the chain.
    pub(crate) fn spawn<R: Renew>(target: Weak<R>, app_id: AppId, delay: DurationSecs) -> Self {
        let span = tracing::debug_span!("renewal", kind = R::KIND, app_id = %app_id);
        let join = tokio::spawn(renew_forever(target, app_id.clone(), delay).instrument(span));
        Self {
            app_id,
            kind: R::KIND,
            join,
        }
    }

    /// Whether the renewal chain has ended
    pub(crate) fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}

impl Drop for RenewalHandle {
    fn drop(&mut self) {
        if !self.join.is_finished() {
            tracing::debug!(
                kind = self.kind,
                app_id = %self.app_id,
                "cancelling pending renewal"
            );
            self.join.abort();
        }
    }
}

impl fmt::Debug for RenewalHandle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("RenewalHandle")
            .field("app_id", &self.app_id)
            .field("kind", &self.kind)
            .field("finished", &self.join.is_finished())
            .finish()
    }
}

async fn renew_forever<R: Renew>(target: Weak<R>, app_id: AppId, first_delay: DurationSecs) {
    let mut delay = first_delay;

    loop {
        let wait = delay.max(MIN_DELAY);
        tracing::debug!(delay = wait.0, "waiting for credential to expire");
        tokio::time::sleep(wait.into()).await;

        let Some(target) = target.upgrade() else {
            tracing::info!("credential owner dropped, halting renewals");
            return;
        };

        tracing::debug!("renewing credential");
        match target.renew(&app_id).await {
            Ok(lifetime) => delay = lifetime,
            Err(error) => {
                tracing::warn!(
                    error = (&error as &dyn error::Error),
                    "error renewing credential, renewal stopped"
                );
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
        time::Duration,
    };

    use tracing_test::traced_test;

    use super::*;

    #[derive(Default)]
    struct Counter {
        calls: AtomicUsize,
        fail_on: Option<usize>,
    }

    #[async_trait]
    impl Renew for Counter {
        const KIND: &'static str = "test";

        async fn renew(&self, _: &AppIdRef) -> Result<DurationSecs, CredentialError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if Some(n) == self.fail_on {
                Err(CredentialError::SigningPrecondition)
            } else {
                Ok(DurationSecs(10))
            }
        }
    }

    fn calls(c: &Counter) -> usize {
        c.calls.load(Ordering::SeqCst)
    }

    #[tokio::test(start_paused = true)]
    async fn fires_at_the_declared_lifetime_and_not_before() {
        let target = Arc::new(Counter::default());
        let _handle =
            RenewalHandle::spawn(Arc::downgrade(&target), AppId::from_static("wx"), DurationSecs(30));

        tokio::time::sleep(Duration::from_secs(29)).await;
        assert_eq!(calls(&target), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(calls(&target), 1);

        // re-armed with the lifetime returned by the renewal
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(calls(&target), 2);
    }

    #[tokio::test(start_paused = true)]
    #[traced_test]
    async fn failure_ends_the_chain() {
        let target = Arc::new(Counter {
            fail_on: Some(1),
            ..Counter::default()
        });
        let handle =
            RenewalHandle::spawn(Arc::downgrade(&target), AppId::from_static("wx"), DurationSecs(5));

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(calls(&target), 1);
        assert!(handle.is_finished());
        assert!(logs_contain("renewal stopped"));
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_handle_cancels_the_timer() {
        let target = Arc::new(Counter::default());
        let handle =
            RenewalHandle::spawn(Arc::downgrade(&target), AppId::from_static("wx"), DurationSecs(5));

        tokio::time::sleep(Duration::from_secs(4)).await;
        drop(handle);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(calls(&target), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn halts_once_the_owner_is_gone() {
        let target = Arc::new(Counter::default());
        let handle =
            RenewalHandle::spawn(Arc::downgrade(&target), AppId::from_static("wx"), DurationSecs(5));
        drop(target);

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(handle.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn zero_lifetime_does_not_spin() {
        let target = Arc::new(Counter::default());
        let _handle =
            RenewalHandle::spawn(Arc::downgrade(&target), AppId::from_static("wx"), DurationSecs(0));

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(calls(&target), 0);

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(calls(&target), 1);
    }
}
