pub mod guard;

pub use guard::{landing_for, AccessGuard, GuardError, View};
