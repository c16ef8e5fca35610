pub mod backend;
pub mod lifecycle;
pub mod mock;
pub mod models;
pub mod orchestrator;
pub mod scheduler;
pub mod vitals;

pub use backend::{ClientError, ClinicBackend};
pub use lifecycle::{AppointmentAction, AppointmentStateMachine, TransitionError};
pub use mock::MockClinicBackend;
pub use models::{AppointmentRecord, AppointmentStatus, CreatedAppointment, HealthMetrics, NewAppointment};
pub use orchestrator::{BookingError, BookingOrchestrator, BookingRequest, DoctorCard, MutationRefresh, ViewEvent, ViewState};
pub use scheduler::{IntervalScheduler, RefreshJob, RefreshScheduler};
pub use vitals::{VitalsDraftStore, VitalsInput, VitalsRecord, VitalsSchema};
