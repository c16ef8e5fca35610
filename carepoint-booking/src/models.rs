use std::fmt;

use carepoint_shared::instant::{iso, iso_opt};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::vitals::VitalsRecord;

/// Appointment status in the lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppointmentStatus {
    Pending,
    Confirmed,
    Declined,
    Cancelled,
}

impl AppointmentStatus {
    pub const ALL: [AppointmentStatus; 4] = [
        AppointmentStatus::Pending,
        AppointmentStatus::Confirmed,
        AppointmentStatus::Declined,
        AppointmentStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Pending => "PENDING",
            AppointmentStatus::Confirmed => "CONFIRMED",
            AppointmentStatus::Declined => "DECLINED",
            AppointmentStatus::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A booked appointment as the backend reports it. The portal only holds
/// per-view copies; the backend record is authoritative.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentRecord {
    pub appointment_id: String,
    #[serde(default)]
    pub doctor_id: String,
    #[serde(default)]
    pub patient_id: String,
    #[serde(rename = "slotISO", with = "iso")]
    pub slot_iso: DateTime<Utc>,
    pub status: AppointmentStatus,
    #[serde(default, alias = "reason", skip_serializing_if = "Option::is_none")]
    pub reason_code: Option<String>,
    #[serde(default, with = "iso_opt", skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doctor_name: Option<String>,
}

impl AppointmentRecord {
    /// Ordering key for newest-first lists: creation time, else the slot.
    pub fn recency(&self) -> DateTime<Utc> {
        self.created_at.unwrap_or(self.slot_iso)
    }
}

/// Body of `POST /appointments`.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewAppointment {
    pub doctor_id: String,
    #[serde(rename = "slotISO", with = "iso")]
    pub slot_iso: DateTime<Utc>,
    pub vitals: VitalsRecord,
    pub reason_code: String,
}

/// Acknowledgment of a create. The backend may answer with the full record
/// or only `{appointmentId, status}`; both decode here.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CreatedAppointment {
    pub appointment_id: String,
    #[serde(default)]
    pub status: Option<AppointmentStatus>,
    #[serde(default, with = "iso_opt")]
    pub created_at: Option<DateTime<Utc>>,
}

/// Latest health metrics for a patient, as free-form JSON fields.
pub type HealthMetrics = serde_json::Map<String, serde_json::Value>;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_record_accepts_naive_created_at() {
        let record: AppointmentRecord = serde_json::from_value(json!({
            "appointmentId": "a-1",
            "doctorId": "doc-1",
            "patientId": "pat-1",
            "slotISO": "2024-01-02T09:00:00.000Z",
            "status": "PENDING",
            "reason": "GENERAL",
            "createdAt": "2024-01-01T08:15:30.123456",
        }))
        .unwrap();

        assert_eq!(record.reason_code.as_deref(), Some("GENERAL"));
        assert_eq!(
            record.created_at.map(|c| c.timestamp()),
            Some(Utc.with_ymd_and_hms(2024, 1, 1, 8, 15, 30).unwrap().timestamp())
        );
        assert_eq!(record.recency(), record.created_at.unwrap());
    }

    #[test]
    fn test_unknown_status_is_rejected() {
        let result = serde_json::from_value::<AppointmentRecord>(json!({
            "appointmentId": "a-1",
            "slotISO": "2024-01-02T09:00:00Z",
            "status": "RESCHEDULED",
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_created_ack_minimal() {
        let ack: CreatedAppointment =
            serde_json::from_value(json!({ "appointmentId": "a-9", "status": "PENDING" })).unwrap();
        assert_eq!(ack.status, Some(AppointmentStatus::Pending));
        assert_eq!(ack.created_at, None);
    }
}
