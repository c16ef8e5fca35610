pub mod instant;
pub mod models;
pub mod pii;

pub use instant::{format_instant, parse_instant};
pub use models::events::ViewRefreshed;
pub use models::role::Role;
pub use pii::Masked;
