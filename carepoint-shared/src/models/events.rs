use crate::models::role::Role;

/// Published after every successful view refresh (polling tick or
/// reload-after-mutation). Counts reflect the freshly replaced lists.
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
pub struct ViewRefreshed {
    pub role: Role,
    pub appointment_count: usize,
    pub pending_count: usize,
    pub refreshed_at: i64,
}
