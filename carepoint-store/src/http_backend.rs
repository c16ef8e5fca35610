use std::time::Duration;

use async_trait::async_trait;
use carepoint_booking::{
    AppointmentAction, AppointmentRecord, AppointmentStatus, ClientError, ClinicBackend, CreatedAppointment,
    HealthMetrics, NewAppointment,
};
use carepoint_core::SessionStore;
use carepoint_schedule::{DoctorAvailability, DoctorQuery};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

#[derive(Deserialize)]
struct Items<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
}

#[derive(Deserialize)]
struct StatusAck {
    status: AppointmentStatus,
}

#[derive(Deserialize)]
struct HealthEnvelope {
    #[serde(default)]
    item: Option<Value>,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

/// [`ClinicBackend`] over the clinic REST API. The bearer id token is read
/// from the session store on every call.
pub struct HttpClinicBackend {
    client: reqwest::Client,
    base_url: String,
    sessions: SessionStore,
}

impl HttpClinicBackend {
    pub fn new(base_url: &str, timeout: Duration, sessions: SessionStore) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10).min(timeout))
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            sessions,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Attach the bearer token, send, and decode. `None` for an empty body.
    async fn call<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<Option<T>, ClientError> {
        let session = self.sessions.load().ok_or(ClientError::SessionExpired)?;

        let response = request
            .bearer_auth(session.id_token.expose())
            .send()
            .await
            .map_err(|e| ClientError::Network(e.to_string()))?;

        handle_response(response).await
    }
}

async fn handle_response<T: DeserializeOwned>(response: Response) -> Result<Option<T>, ClientError> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| ClientError::Network(e.to_string()))?;

    if !status.is_success() {
        let error = rejection(status, &body);
        warn!("Backend answered {}: {}", status.as_u16(), error);
        return Err(error);
    }

    decode_body(status, &body)
}

fn rejection(status: StatusCode, body: &str) -> ClientError {
    let message = serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.message)
        .filter(|m| !m.trim().is_empty())
        .or_else(|| status.canonical_reason().map(str::to_string))
        .unwrap_or_else(|| format!("Request failed with status {}", status.as_u16()));

    ClientError::Rejected {
        status: status.as_u16(),
        message,
    }
}

fn decode_body<T: DeserializeOwned>(status: StatusCode, body: &str) -> Result<Option<T>, ClientError> {
    if status == StatusCode::NO_CONTENT || body.trim().is_empty() {
        return Ok(None);
    }
    serde_json::from_str(body)
        .map(Some)
        .map_err(|e| ClientError::Decode(e.to_string()))
}

/// Metrics from `{item: {metrics}}` or `{item: {summary}}`.
fn metrics_of(envelope: HealthEnvelope) -> Option<HealthMetrics> {
    let mut item = match envelope.item? {
        Value::Object(item) => item,
        _ => return None,
    };
    ["metrics", "summary"].into_iter().find_map(|key| match item.remove(key) {
        Some(Value::Object(metrics)) => Some(metrics),
        _ => None,
    })
}

/// Doctor entries that decode. A malformed profile is skipped rather than
/// failing the whole listing.
fn usable_doctors(items: Vec<Value>) -> Vec<DoctorAvailability> {
    items
        .into_iter()
        .filter_map(|item| match serde_json::from_value::<DoctorAvailability>(item) {
            Ok(doctor) => Some(doctor),
            Err(e) => {
                warn!("Skipping malformed doctor entry: {}", e);
                None
            }
        })
        .collect()
}

#[async_trait]
impl ClinicBackend for HttpClinicBackend {
    async fn list_doctors(&self, query: &DoctorQuery) -> Result<Vec<DoctorAvailability>, ClientError> {
        let request = self.client.get(self.url("/doctors")).query(&query.query_pairs());
        let body: Option<Items<Value>> = self.call(request).await?;
        Ok(body.map(|b| usable_doctors(b.items)).unwrap_or_default())
    }

    async fn create_appointment(&self, request: &NewAppointment) -> Result<CreatedAppointment, ClientError> {
        debug!("Requesting slot {} with {}", request.slot_iso, request.doctor_id);
        let http = self.client.post(self.url("/appointments")).json(request);
        self.call(http)
            .await?
            .ok_or_else(|| ClientError::Decode("empty response to appointment request".to_string()))
    }

    async fn list_patient_appointments(&self) -> Result<Vec<AppointmentRecord>, ClientError> {
        let body: Option<Items<AppointmentRecord>> =
            self.call(self.client.get(self.url("/appointments/patient"))).await?;
        Ok(body.map(|b| b.items).unwrap_or_default())
    }

    async fn list_doctor_appointments(
        &self,
        status: Option<AppointmentStatus>,
    ) -> Result<Vec<AppointmentRecord>, ClientError> {
        let mut request = self.client.get(self.url("/appointments/doctor"));
        if let Some(status) = status {
            request = request.query(&[("status", status.as_str())]);
        }
        let body: Option<Items<AppointmentRecord>> = self.call(request).await?;
        Ok(body.map(|b| b.items).unwrap_or_default())
    }

    async fn transition_appointment(
        &self,
        appointment_id: &str,
        action: AppointmentAction,
    ) -> Result<AppointmentStatus, ClientError> {
        let path = format!(
            "/appointments/{}/{}",
            urlencoding::encode(appointment_id),
            action.path_segment()
        );
        let ack: Option<StatusAck> = self.call(self.client.post(self.url(&path))).await?;
        Ok(ack.map(|a| a.status).unwrap_or_else(|| action.target()))
    }

    async fn latest_health(
        &self,
        subject_id: &str,
        appointment_id: Option<&str>,
    ) -> Result<Option<HealthMetrics>, ClientError> {
        let path = format!("/patient-health/{}/latest", urlencoding::encode(subject_id));
        let mut request = self.client.get(self.url(&path));
        if let Some(appointment_id) = appointment_id {
            request = request.query(&[("appointmentId", appointment_id)]);
        }
        let envelope: Option<HealthEnvelope> = self.call(request).await?;
        Ok(envelope.and_then(metrics_of))
    }
}
