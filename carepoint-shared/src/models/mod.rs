pub mod events;
pub mod role;
