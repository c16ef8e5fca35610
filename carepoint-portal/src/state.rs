use std::sync::Arc;
use std::time::Duration;

use carepoint_booking::{
    BookingOrchestrator, ClinicBackend, IntervalScheduler, MutationRefresh, VitalsDraftStore,
};
use carepoint_core::{IdentityProvider, KeyValueStore, MemoryStore, MockIdentityProvider, SessionStore};
use carepoint_schedule::SlotPolicy;
use carepoint_shared::Role;
use carepoint_store::{Config, FileStore, HttpClinicBackend};

use crate::middleware::AccessGuard;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BookingRules {
    pub slots: SlotPolicy,
    pub after_mutation: MutationRefresh,
    pub poll_period: Duration,
}

impl Default for BookingRules {
    fn default() -> Self {
        Self {
            slots: SlotPolicy::default(),
            after_mutation: MutationRefresh::ReloadView,
            poll_period: Duration::from_secs(10),
        }
    }
}

/// Everything a portal component needs, passed explicitly.
#[derive(Clone)]
pub struct PortalContext {
    pub sessions: SessionStore,
    /// Per-run store for drafts; never outlives the process.
    pub transient: Arc<dyn KeyValueStore>,
    pub identity: Arc<dyn IdentityProvider>,
    pub backend: Arc<dyn ClinicBackend>,
    pub rules: BookingRules,
}

impl PortalContext {
    pub fn new(
        sessions: SessionStore,
        transient: Arc<dyn KeyValueStore>,
        identity: Arc<dyn IdentityProvider>,
        backend: Arc<dyn ClinicBackend>,
        rules: BookingRules,
    ) -> Self {
        Self {
            sessions,
            transient,
            identity,
            backend,
            rules,
        }
    }

    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let sessions = SessionStore::new(Arc::new(FileStore::open(&config.storage.session_dir)?));
        let backend = HttpClinicBackend::new(&config.api.base_url, config.api.request_timeout(), sessions.clone())?;
        let identity = MockIdentityProvider::new(&config.identity.mock_secret, config.identity.token_ttl_seconds);

        Ok(Self::new(
            sessions,
            Arc::new(MemoryStore::new()),
            Arc::new(identity),
            Arc::new(backend),
            BookingRules {
                slots: config.booking.slot_policy(),
                after_mutation: config.booking.mutation_refresh(),
                poll_period: config.polling.period(),
            },
        ))
    }

    pub fn guard(&self) -> AccessGuard {
        AccessGuard::new(self.sessions.clone())
    }

    pub fn drafts(&self) -> VitalsDraftStore {
        VitalsDraftStore::new(self.transient.clone())
    }

    pub fn orchestrator(&self, role: Role) -> Arc<BookingOrchestrator> {
        Arc::new(BookingOrchestrator::new(
            self.backend.clone(),
            self.sessions.clone(),
            self.drafts(),
            self.rules.slots,
            self.rules.after_mutation,
            role,
        ))
    }

    pub fn scheduler(&self) -> IntervalScheduler {
        IntervalScheduler::new(self.rules.poll_period)
    }
}
