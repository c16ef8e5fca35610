pub mod auth;
pub mod error;
pub mod middleware;
pub mod state;
pub mod views;

pub use error::{failure_message, PortalError};
pub use middleware::{landing_for, AccessGuard, GuardError, View};
pub use state::{BookingRules, PortalContext};
pub use views::{DoctorView, PatientView};
