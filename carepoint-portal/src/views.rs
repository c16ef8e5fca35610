use std::sync::Arc;

use carepoint_booking::{
    AppointmentRecord, AppointmentStatus, BookingOrchestrator, BookingRequest, DoctorCard, HealthMetrics,
    IntervalScheduler, RefreshScheduler, ViewEvent, VitalsInput, VitalsRecord,
};
use carepoint_core::Session;
use carepoint_schedule::DoctorQuery;
use carepoint_shared::{Role, ViewRefreshed};
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::error::PortalError;
use crate::state::PortalContext;

/// Guarded, polling view shared by both portals.
struct PortalView {
    session: Session,
    orchestrator: Arc<BookingOrchestrator>,
    scheduler: IntervalScheduler,
    load_errors: Vec<PortalError>,
}

impl PortalView {
    async fn open(ctx: &PortalContext, role: Role) -> Result<Self, PortalError> {
        let session = ctx.guard().authorize(&[role])?;
        let orchestrator = ctx.orchestrator(role);

        let mut load_errors = Vec::new();
        if let Err(e) = orchestrator.refresh().await {
            warn!("Initial {} view load failed: {}", role, e);
            load_errors.push(e.into());
        }

        let mut scheduler = ctx.scheduler();
        scheduler.start(orchestrator.polling_job());
        info!("{} portal opened for {}", role, session.email);

        Ok(Self {
            session,
            orchestrator,
            scheduler,
            load_errors,
        })
    }

    fn close(&mut self) {
        self.scheduler.stop();
    }
}

pub struct PatientView {
    inner: PortalView,
}

impl PatientView {
    /// Requires a PATIENT session.
    pub async fn open(ctx: &PortalContext) -> Result<Self, PortalError> {
        let mut inner = PortalView::open(ctx, Role::Patient).await?;
        if let Err(e) = inner.orchestrator.load_latest_vitals().await {
            warn!("Latest vitals unavailable: {}", e);
            inner.load_errors.push(e.into());
        }
        Ok(Self { inner })
    }

    pub fn session(&self) -> &Session {
        &self.inner.session
    }

    pub async fn search(&self, query: &DoctorQuery) -> Result<Vec<DoctorCard>, PortalError> {
        Ok(self.inner.orchestrator.search_doctors(query).await?)
    }

    /// Validate and cache vitals without booking.
    pub fn draft_vitals(&self, input: &VitalsInput, reason_code: &str) -> Result<VitalsRecord, PortalError> {
        Ok(self.inner.orchestrator.capture_vitals(input, reason_code)?)
    }

    pub fn saved_draft(&self) -> Option<VitalsRecord> {
        self.inner.orchestrator.drafts().load().map(|draft| draft.vitals)
    }

    pub async fn book(&self, request: BookingRequest) -> Result<AppointmentRecord, PortalError> {
        Ok(self.inner.orchestrator.submit_booking(request).await?)
    }

    pub async fn cancel(&self, appointment_id: &str) -> Result<AppointmentStatus, PortalError> {
        Ok(self.inner.orchestrator.cancel(appointment_id).await?)
    }

    pub async fn refresh(&self) -> Result<ViewRefreshed, PortalError> {
        Ok(self.inner.orchestrator.refresh().await?)
    }

    /// Own appointments, newest first.
    pub async fn appointments(&self) -> Vec<AppointmentRecord> {
        self.inner.orchestrator.snapshot().await.appointments
    }

    pub async fn latest_vitals(&self) -> Option<HealthMetrics> {
        self.inner.orchestrator.snapshot().await.latest_metrics
    }

    /// Refreshes and background failures after `open`.
    pub fn subscribe(&self) -> broadcast::Receiver<ViewEvent> {
        self.inner.orchestrator.subscribe()
    }

    /// Failures hit while opening; the view still opened with what loaded.
    pub fn load_errors(&self) -> &[PortalError] {
        &self.inner.load_errors
    }

    pub fn is_polling(&self) -> bool {
        self.inner.scheduler.is_running()
    }

    pub fn close(mut self) {
        self.inner.close();
    }
}

pub struct DoctorView {
    inner: PortalView,
}

impl DoctorView {
    /// Requires a DOCTOR session.
    pub async fn open(ctx: &PortalContext) -> Result<Self, PortalError> {
        Ok(Self {
            inner: PortalView::open(ctx, Role::Doctor).await?,
        })
    }

    pub fn session(&self) -> &Session {
        &self.inner.session
    }

    pub async fn pending(&self) -> Vec<AppointmentRecord> {
        self.inner.orchestrator.snapshot().await.pending
    }

    pub async fn confirmed(&self) -> Vec<AppointmentRecord> {
        self.inner.orchestrator.snapshot().await.confirmed
    }

    pub async fn confirm(&self, appointment_id: &str) -> Result<AppointmentStatus, PortalError> {
        Ok(self.inner.orchestrator.confirm(appointment_id).await?)
    }

    pub async fn decline(&self, appointment_id: &str) -> Result<AppointmentStatus, PortalError> {
        Ok(self.inner.orchestrator.decline(appointment_id).await?)
    }

    pub async fn patient_summary(&self, appointment_id: &str) -> Result<Option<HealthMetrics>, PortalError> {
        Ok(self.inner.orchestrator.load_patient_summary(appointment_id).await?)
    }

    pub async fn refresh(&self) -> Result<ViewRefreshed, PortalError> {
        Ok(self.inner.orchestrator.refresh().await?)
    }

    /// Refreshes and background failures after `open`.
    pub fn subscribe(&self) -> broadcast::Receiver<ViewEvent> {
        self.inner.orchestrator.subscribe()
    }

    /// Failures hit while opening; the view still opened with what loaded.
    pub fn load_errors(&self) -> &[PortalError] {
        &self.inner.load_errors
    }

    pub fn is_polling(&self) -> bool {
        self.inner.scheduler.is_running()
    }

    pub fn close(mut self) {
        self.inner.close();
    }
}
