use std::sync::Arc;

use carepoint_core::validation::ValidationErrors;
use carepoint_core::SessionStore;
use carepoint_schedule::{DoctorAvailability, DoctorQuery, SlotEngine, SlotPolicy};
use carepoint_shared::{Role, ViewRefreshed};
use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use thiserror::Error;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, error, info, warn};

use crate::backend::{ClientError, ClinicBackend};
use crate::lifecycle::{AppointmentAction, AppointmentStateMachine, TransitionError};
use crate::models::{AppointmentRecord, AppointmentStatus, HealthMetrics, NewAppointment};
use crate::scheduler::RefreshJob;
use crate::vitals::{VitalsDraftStore, VitalsInput, VitalsRecord, VitalsSchema};

#[derive(Debug, Error)]
pub enum BookingError {
    #[error("The selected slot is no longer offered. Please pick another one.")]
    StaleSlot {
        doctor_id: String,
        slot: DateTime<Utc>,
    },

    #[error("Please correct the highlighted fields: {0}")]
    Validation(#[from] ValidationErrors),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("Appointment {0} is not in the current list")]
    UnknownAppointment(String),

    #[error(transparent)]
    Backend(#[from] ClientError),
}

/// What happens after a successful mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MutationRefresh {
    /// Re-fetch the view once the backend has acknowledged.
    #[default]
    ReloadView,
    /// Leave the view alone until the next polling tick.
    AwaitNextTick,
}

/// A patient's booking request.
#[derive(Debug, Clone)]
pub struct BookingRequest {
    pub doctor_id: String,
    pub slot: DateTime<Utc>,
    pub reason_code: String,
    pub vitals: VitalsInput,
}

/// A search result with the slots offered for it.
#[derive(Debug, Clone, PartialEq)]
pub struct DoctorCard {
    pub doctor: DoctorAvailability,
    pub slots: Vec<DateTime<Utc>>,
}

/// Published to view subscribers after every background load.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewEvent {
    Refreshed(ViewRefreshed),
    /// A refresh or vitals load failed; the cached view is unchanged.
    Failed { role: Role, error: ClientError },
}

/// Cached view state. Replaced wholesale by every refresh.
#[derive(Debug, Clone, Default)]
pub struct ViewState {
    /// Patient view: own appointments, newest first.
    pub appointments: Vec<AppointmentRecord>,
    /// Doctor view: requests awaiting a decision.
    pub pending: Vec<AppointmentRecord>,
    /// Doctor view: accepted appointments.
    pub confirmed: Vec<AppointmentRecord>,
    pub doctors: Vec<DoctorCard>,
    pub latest_metrics: Option<HealthMetrics>,
    pub last_refreshed: Option<DateTime<Utc>>,
}

impl ViewState {
    pub fn find(&self, appointment_id: &str) -> Option<&AppointmentRecord> {
        self.appointments
            .iter()
            .chain(&self.pending)
            .chain(&self.confirmed)
            .find(|a| a.appointment_id == appointment_id)
    }

    fn offers(&self, doctor_id: &str, slot: &DateTime<Utc>) -> bool {
        self.doctors
            .iter()
            .any(|card| card.doctor.doctor_id == doctor_id && card.slots.contains(slot))
    }
}

/// Drives booking and appointment actions for one signed-in user and keeps
/// that user's view in step with the backend.
pub struct BookingOrchestrator {
    backend: Arc<dyn ClinicBackend>,
    sessions: SessionStore,
    drafts: VitalsDraftStore,
    slots: SlotEngine,
    refresh_policy: MutationRefresh,
    role: Role,
    state: RwLock<ViewState>,
    events: broadcast::Sender<ViewEvent>,
}

impl BookingOrchestrator {
    pub fn new(
        backend: Arc<dyn ClinicBackend>,
        sessions: SessionStore,
        drafts: VitalsDraftStore,
        slot_policy: SlotPolicy,
        refresh_policy: MutationRefresh,
        role: Role,
    ) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            backend,
            sessions,
            drafts,
            slots: SlotEngine::new(slot_policy),
            refresh_policy,
            role,
            state: RwLock::new(ViewState::default()),
            events,
        }
    }

    pub fn drafts(&self) -> &VitalsDraftStore {
        &self.drafts
    }

    pub async fn snapshot(&self) -> ViewState {
        self.state.read().await.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ViewEvent> {
        self.events.subscribe()
    }

    /// List doctors for `query` and record the slots offered for each.
    pub async fn search_doctors(&self, query: &DoctorQuery) -> Result<Vec<DoctorCard>, BookingError> {
        let doctors = self.backend.list_doctors(query).await?;
        let now = Utc::now();

        let cards: Vec<DoctorCard> = doctors
            .into_iter()
            .filter(|d| query.matches(d))
            .map(|doctor| {
                let slots = self.slots.bookable_slots(&doctor, now);
                DoctorCard { doctor, slots }
            })
            .collect();

        debug!("Search returned {} doctors", cards.len());
        self.state.write().await.doctors = cards.clone();
        Ok(cards)
    }

    /// Validate vitals for `reason_code` and cache them as the draft.
    pub fn capture_vitals(&self, input: &VitalsInput, reason_code: &str) -> Result<VitalsRecord, ValidationErrors> {
        let record = VitalsSchema::for_reason(reason_code)?.validate(input)?;
        self.cache_draft(&record);
        Ok(record)
    }

    /// Request an appointment. Nothing is sent unless the slot is one the
    /// last search offered and the vitals validate.
    pub async fn submit_booking(&self, request: BookingRequest) -> Result<AppointmentRecord, BookingError> {
        if !self.state.read().await.offers(&request.doctor_id, &request.slot) {
            warn!("Rejected booking for a slot not on offer: {}", request.slot);
            return Err(BookingError::StaleSlot {
                doctor_id: request.doctor_id,
                slot: request.slot,
            });
        }

        let schema = VitalsSchema::for_reason(&request.reason_code)?;
        let vitals = schema.validate(&request.vitals)?;
        self.cache_draft(&vitals);

        let session = self.sessions.load().ok_or(ClientError::SessionExpired)?;
        let reason_code = schema.reason().code.to_string();

        let body = NewAppointment {
            doctor_id: request.doctor_id.clone(),
            slot_iso: request.slot,
            vitals,
            reason_code: reason_code.clone(),
        };
        let created = self.backend.create_appointment(&body).await?;
        info!("Appointment {} requested for {}", created.appointment_id, request.slot);

        let doctor_name = {
            let state = self.state.read().await;
            state
                .doctors
                .iter()
                .find(|c| c.doctor.doctor_id == request.doctor_id)
                .map(|c| c.doctor.display_name())
        };

        let record = AppointmentRecord {
            appointment_id: created.appointment_id,
            doctor_id: request.doctor_id,
            patient_id: session.subject_id.clone().unwrap_or_else(|| session.email.clone()),
            slot_iso: request.slot,
            status: created.status.unwrap_or(AppointmentStatus::Pending),
            reason_code: Some(reason_code),
            created_at: Some(created.created_at.unwrap_or_else(Utc::now)),
            patient_email: Some(session.email),
            doctor_name,
        };

        self.drafts.clear();

        if self.refresh_policy == MutationRefresh::ReloadView {
            self.reload_after_mutation().await;
            if let Err(e) = self.load_latest_vitals().await {
                warn!("Failed to reload latest vitals: {}", e);
            }
        }

        Ok(record)
    }

    /// Validate `action` locally for this user's role, then ask the backend.
    /// A backend rejection is returned as is and the cached view is left for
    /// the next refresh to reconcile.
    pub async fn request_transition(
        &self,
        appointment_id: &str,
        action: AppointmentAction,
    ) -> Result<AppointmentStatus, BookingError> {
        let current = self
            .state
            .read()
            .await
            .find(appointment_id)
            .map(|a| a.status)
            .ok_or_else(|| BookingError::UnknownAppointment(appointment_id.to_string()))?;

        if let Err(e) = AppointmentStateMachine::validate_action(current, action, self.role) {
            warn!("Blocked {:?} on appointment {}: {}", action, appointment_id, e);
            return Err(e.into());
        }

        let status = match self.backend.transition_appointment(appointment_id, action).await {
            Ok(status) => status,
            Err(e) => {
                warn!("Backend refused {:?} on appointment {}: {}", action, appointment_id, e);
                return Err(e.into());
            }
        };
        info!("Appointment {} is now {}", appointment_id, status);
        self.apply_status(appointment_id, status).await;

        if self.refresh_policy == MutationRefresh::ReloadView {
            self.reload_after_mutation().await;
        }
        Ok(status)
    }

    pub async fn confirm(&self, appointment_id: &str) -> Result<AppointmentStatus, BookingError> {
        self.request_transition(appointment_id, AppointmentAction::Confirm).await
    }

    pub async fn decline(&self, appointment_id: &str) -> Result<AppointmentStatus, BookingError> {
        self.request_transition(appointment_id, AppointmentAction::Decline).await
    }

    pub async fn cancel(&self, appointment_id: &str) -> Result<AppointmentStatus, BookingError> {
        self.request_transition(appointment_id, AppointmentAction::Cancel).await
    }

    /// One polling tick: re-fetch this role's lists and replace them.
    /// Failures are returned and also published to subscribers.
    pub async fn refresh(&self) -> Result<ViewRefreshed, BookingError> {
        match self.reload_lists().await {
            Ok(event) => {
                debug!("View refreshed: {} appointments", event.appointment_count);
                self.publish(ViewEvent::Refreshed(event.clone()));
                Ok(event)
            }
            Err(e) => {
                self.publish_failure(&e);
                Err(e.into())
            }
        }
    }

    async fn reload_lists(&self) -> Result<ViewRefreshed, ClientError> {
        let now = Utc::now();
        match self.role {
            Role::Patient => {
                let mut appointments = self.backend.list_patient_appointments().await?;
                appointments.sort_by(|a, b| b.recency().cmp(&a.recency()));

                let mut state = self.state.write().await;
                let pending_count = count_status(&appointments, AppointmentStatus::Pending);
                let appointment_count = appointments.len();
                state.appointments = appointments;
                state.last_refreshed = Some(now);
                Ok(ViewRefreshed {
                    role: self.role,
                    appointment_count,
                    pending_count,
                    refreshed_at: now.timestamp(),
                })
            }
            Role::Doctor => {
                let pending = self.backend.list_doctor_appointments(Some(AppointmentStatus::Pending)).await?;
                let confirmed = self.backend.list_doctor_appointments(Some(AppointmentStatus::Confirmed)).await?;

                let mut state = self.state.write().await;
                let event = ViewRefreshed {
                    role: self.role,
                    appointment_count: pending.len() + confirmed.len(),
                    pending_count: pending.len(),
                    refreshed_at: now.timestamp(),
                };
                state.pending = pending;
                state.confirmed = confirmed;
                state.last_refreshed = Some(now);
                Ok(event)
            }
        }
    }

    /// The signed-in patient's latest recorded vitals. Failures clear the
    /// cached metrics and are published to subscribers.
    pub async fn load_latest_vitals(&self) -> Result<Option<HealthMetrics>, BookingError> {
        let result = match self.sessions.load() {
            Some(session) => {
                let subject = session.subject_id.unwrap_or(session.email);
                self.backend.latest_health(&subject, None).await
            }
            None => Err(ClientError::SessionExpired),
        };

        let mut state = self.state.write().await;
        match result {
            Ok(metrics) => {
                state.latest_metrics = metrics.clone();
                Ok(metrics)
            }
            Err(e) => {
                state.latest_metrics = None;
                drop(state);
                self.publish_failure(&e);
                Err(e.into())
            }
        }
    }

    /// Health summary of the patient behind one of this doctor's appointments.
    pub async fn load_patient_summary(&self, appointment_id: &str) -> Result<Option<HealthMetrics>, BookingError> {
        let patient_id = self
            .state
            .read()
            .await
            .find(appointment_id)
            .map(|a| a.patient_id.clone())
            .ok_or_else(|| BookingError::UnknownAppointment(appointment_id.to_string()))?;

        Ok(self.backend.latest_health(&patient_id, Some(appointment_id)).await?)
    }

    /// Job for a [`RefreshScheduler`](crate::scheduler::RefreshScheduler)
    /// that runs [`refresh`](Self::refresh). Failures are logged here and
    /// reach subscribers as [`ViewEvent::Failed`].
    pub fn polling_job(self: &Arc<Self>) -> RefreshJob {
        let orchestrator = Arc::clone(self);
        Arc::new(move || {
            let orchestrator = orchestrator.clone();
            async move {
                if let Err(e) = orchestrator.refresh().await {
                    error!("Refresh failed: {}", e);
                }
            }
            .boxed()
        })
    }

    fn publish(&self, event: ViewEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn publish_failure(&self, error: &ClientError) {
        self.publish(ViewEvent::Failed {
            role: self.role,
            error: error.clone(),
        });
    }

    fn cache_draft(&self, vitals: &VitalsRecord) {
        if let Err(e) = self.drafts.save(vitals) {
            warn!("Failed to cache vitals draft: {}", e);
        }
    }

    /// Record an acknowledged status on the cached copy.
    async fn apply_status(&self, appointment_id: &str, status: AppointmentStatus) {
        let mut state = self.state.write().await;
        let ViewState {
            appointments,
            pending,
            confirmed,
            ..
        } = &mut *state;
        for record in appointments
            .iter_mut()
            .chain(pending.iter_mut())
            .chain(confirmed.iter_mut())
            .filter(|a| a.appointment_id == appointment_id)
        {
            record.status = status;
        }
    }

    async fn reload_after_mutation(&self) {
        if let Err(e) = self.refresh().await {
            warn!("Reload after mutation failed, waiting for the next tick: {}", e);
        }
    }
}

fn count_status(appointments: &[AppointmentRecord], status: AppointmentStatus) -> usize {
    appointments.iter().filter(|a| a.status == status).count()
}
