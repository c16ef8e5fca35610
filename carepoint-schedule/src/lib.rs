pub mod doctor;
pub mod slots;

pub use doctor::{DoctorAvailability, DoctorQuery};
pub use slots::{future_slots, future_slots_at, generate_slots, generate_slots_from, slot_key, SlotEngine, SlotPolicy};
