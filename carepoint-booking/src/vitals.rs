//! Vitals captured with every booking request.
//!
//! Three measurements are mandatory for every visit; the reason for the
//! visit may add further fields. Input arrives as raw form strings keyed by
//! field name and is validated into a typed [`VitalsRecord`] before anything
//! is sent to the backend.

use std::collections::BTreeMap;
use std::sync::Arc;

use carepoint_core::validation::ValidationErrors;
use carepoint_core::{CoreError, CoreResult, KeyValueStore};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Transient-store key of the cached vitals draft.
pub const VITALS_DRAFT_KEY: &str = "carepoint.vitals-draft";

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldKind {
    /// Inclusive numeric range; `whole` rejects fractions.
    Number { min: f64, max: f64, whole: bool },
    Choice { options: &'static [&'static str] },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VitalField {
    pub name: &'static str,
    pub label: &'static str,
    pub kind: FieldKind,
    pub required: bool,
}

impl VitalField {
    const fn number(name: &'static str, label: &'static str, min: f64, max: f64, required: bool) -> Self {
        Self {
            name,
            label,
            kind: FieldKind::Number { min, max, whole: false },
            required,
        }
    }

    const fn whole_number(name: &'static str, label: &'static str, min: f64, max: f64, required: bool) -> Self {
        Self {
            name,
            label,
            kind: FieldKind::Number { min, max, whole: true },
            required,
        }
    }

    const fn choice(name: &'static str, label: &'static str, options: &'static [&'static str], required: bool) -> Self {
        Self {
            name,
            label,
            kind: FieldKind::Choice { options },
            required,
        }
    }
}

pub const HEIGHT_CM: &str = "heightCm";
pub const WEIGHT_KG: &str = "weightKg";
pub const TEMPERATURE_C: &str = "temperatureC";

pub static MANDATORY_VITALS: [VitalField; 3] = [
    VitalField::number(HEIGHT_CM, "Height (cm)", 100.0, 220.0, true),
    VitalField::number(WEIGHT_KG, "Weight (kg)", 30.0, 250.0, true),
    VitalField::number(TEMPERATURE_C, "Temperature (°C)", 34.0, 42.0, true),
];

const YES_NO: &[&str] = &["YES", "NO"];

const JOINT_PAIN_FIELDS: &[VitalField] = &[
    VitalField::whole_number("painScale", "Pain scale (0-10)", 0.0, 10.0, true),
    VitalField::choice("affectedArea", "Affected area", &["KNEE", "SHOULDER", "BACK", "HIP", "NECK"], true),
];

const SKIN_RASH_FIELDS: &[VitalField] = &[
    VitalField::choice("rashArea", "Rash area", &["FACE", "TORSO", "ARMS", "LEGS"], true),
    VitalField::choice("itching", "Itching", YES_NO, false),
];

const RESPIRATORY_FIELDS: &[VitalField] = &[
    VitalField::number("oxygenSaturation", "Oxygen saturation (%)", 70.0, 100.0, false),
    VitalField::choice("shortnessOfBreath", "Shortness of breath", YES_NO, true),
];

/// A bookable reason for a visit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReasonProfile {
    pub code: &'static str,
    pub label: &'static str,
    pub suggested_specialty: &'static str,
    pub extra_fields: &'static [VitalField],
}

pub const DEFAULT_REASON: &str = "GENERAL";

pub static REASONS: [ReasonProfile; 4] = [
    ReasonProfile {
        code: DEFAULT_REASON,
        label: "General consultation",
        suggested_specialty: "General Medicine",
        extra_fields: &[],
    },
    ReasonProfile {
        code: "JOINT_PAIN",
        label: "Joint pain",
        suggested_specialty: "Orthopedics",
        extra_fields: JOINT_PAIN_FIELDS,
    },
    ReasonProfile {
        code: "SKIN_RASH",
        label: "Skin rash",
        suggested_specialty: "Dermatology",
        extra_fields: SKIN_RASH_FIELDS,
    },
    ReasonProfile {
        code: "RESPIRATORY",
        label: "Breathing problems",
        suggested_specialty: "Pulmonology",
        extra_fields: RESPIRATORY_FIELDS,
    },
];

pub fn reason_profile(code: &str) -> Option<&'static ReasonProfile> {
    REASONS.iter().find(|r| r.code.eq_ignore_ascii_case(code.trim()))
}

/// Raw form values keyed by field name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VitalsInput {
    values: BTreeMap<String, String>,
}

impl VitalsInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: &str, value: impl Into<String>) -> Self {
        self.set(field, value);
        self
    }

    pub fn set(&mut self, field: &str, value: impl Into<String>) {
        self.values.insert(field.to_string(), value.into());
    }

    /// Trimmed value, `None` when absent or blank.
    pub fn get(&self, field: &str) -> Option<&str> {
        self.values
            .get(field)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for VitalsInput {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum VitalValue {
    Number(f64),
    Text(String),
}

impl VitalValue {
    fn to_input(&self) -> String {
        match self {
            VitalValue::Number(n) => n.to_string(),
            VitalValue::Text(s) => s.clone(),
        }
    }
}

/// Validated vitals as sent to the backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VitalsRecord {
    pub height_cm: f64,
    pub weight_kg: f64,
    pub temperature_c: f64,
    #[serde(flatten)]
    pub extra: BTreeMap<String, VitalValue>,
}

impl VitalsRecord {
    /// Form values that reproduce this record, for prefilling.
    pub fn to_input(&self) -> VitalsInput {
        let mut input = VitalsInput::new()
            .with(HEIGHT_CM, self.height_cm.to_string())
            .with(WEIGHT_KG, self.weight_kg.to_string())
            .with(TEMPERATURE_C, self.temperature_c.to_string());
        for (field, value) in &self.extra {
            input.set(field, value.to_input());
        }
        input
    }
}

/// The fields a booking for one reason must carry.
#[derive(Debug, Clone)]
pub struct VitalsSchema {
    reason: &'static ReasonProfile,
}

impl VitalsSchema {
    /// Unknown reason codes are a validation failure on `reasonCode`.
    pub fn for_reason(code: &str) -> Result<Self, ValidationErrors> {
        match reason_profile(code) {
            Some(reason) => Ok(Self { reason }),
            None => {
                let mut errors = ValidationErrors::new();
                errors.add("reasonCode", format!("Unknown reason code: {}", code));
                Err(errors)
            }
        }
    }

    pub fn reason(&self) -> &'static ReasonProfile {
        self.reason
    }

    pub fn fields(&self) -> impl Iterator<Item = &'static VitalField> {
        MANDATORY_VITALS.iter().chain(self.reason.extra_fields.iter())
    }

    /// One error per failing field; nothing partial is returned.
    pub fn validate(&self, input: &VitalsInput) -> Result<VitalsRecord, ValidationErrors> {
        let mut errors = ValidationErrors::new();
        let mut values: BTreeMap<&'static str, VitalValue> = BTreeMap::new();

        for field in self.fields() {
            let Some(raw) = input.get(field.name) else {
                if field.required {
                    errors.add(field.name, "Required");
                }
                continue;
            };

            match check_field(field, raw) {
                Ok(value) => {
                    values.insert(field.name, value);
                }
                Err(message) => errors.add(field.name, message),
            }
        }

        errors.into_result()?;

        let mut number = |name: &str| match values.remove(name) {
            Some(VitalValue::Number(n)) => n,
            _ => f64::NAN,
        };
        let height_cm = number(HEIGHT_CM);
        let weight_kg = number(WEIGHT_KG);
        let temperature_c = number(TEMPERATURE_C);

        Ok(VitalsRecord {
            height_cm,
            weight_kg,
            temperature_c,
            extra: values.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
        })
    }
}

fn check_field(field: &VitalField, raw: &str) -> Result<VitalValue, String> {
    match field.kind {
        FieldKind::Number { min, max, whole } => {
            let value: f64 = raw
                .parse()
                .ok()
                .filter(|v: &f64| v.is_finite())
                .ok_or_else(|| "Must be a number".to_string())?;
            if whole && value.fract() != 0.0 {
                return Err("Must be a whole number".to_string());
            }
            if value < min || value > max {
                return Err(format!("Value must be between {} and {}", min, max));
            }
            Ok(VitalValue::Number(value))
        }
        FieldKind::Choice { options } => {
            let upper = raw.to_uppercase();
            options
                .iter()
                .find(|o| **o == upper)
                .map(|o| VitalValue::Text(o.to_string()))
                .ok_or_else(|| format!("Select one of: {}", options.join(", ")))
        }
    }
}

/// Vitals cached between capture and booking.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VitalsDraft {
    pub vitals: VitalsRecord,
    #[serde(with = "carepoint_shared::instant::iso")]
    pub captured_at: DateTime<Utc>,
}

/// Draft cache over the transient store.
#[derive(Clone)]
pub struct VitalsDraftStore {
    store: Arc<dyn KeyValueStore>,
}

impl VitalsDraftStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub fn save(&self, vitals: &VitalsRecord) -> CoreResult<()> {
        let draft = VitalsDraft {
            vitals: vitals.clone(),
            captured_at: Utc::now(),
        };
        let raw = serde_json::to_string(&draft).map_err(|e| CoreError::StorageError(e.to_string()))?;
        self.store.set(VITALS_DRAFT_KEY, &raw)
    }

    /// The cached draft; unreadable drafts are dropped.
    pub fn load(&self) -> Option<VitalsDraft> {
        let raw = match self.store.get(VITALS_DRAFT_KEY) {
            Ok(raw) => raw?,
            Err(e) => {
                warn!("Failed to read vitals draft: {}", e);
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(draft) => Some(draft),
            Err(e) => {
                debug!("Dropping unreadable vitals draft: {}", e);
                self.clear();
                None
            }
        }
    }

    pub fn clear(&self) {
        if let Err(e) = self.store.remove(VITALS_DRAFT_KEY) {
            warn!("Failed to clear vitals draft: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use carepoint_core::MemoryStore;
    use serde_json::json;

    fn general() -> VitalsInput {
        VitalsInput::new()
            .with(HEIGHT_CM, "180")
            .with(WEIGHT_KG, "75.5")
            .with(TEMPERATURE_C, " 36.6 ")
    }

    #[test]
    fn test_general_vitals_valid() {
        let record = VitalsSchema::for_reason("GENERAL").unwrap().validate(&general()).unwrap();
        assert_eq!(record.height_cm, 180.0);
        assert_eq!(record.weight_kg, 75.5);
        assert_eq!(record.temperature_c, 36.6);
        assert!(record.extra.is_empty());

        assert_eq!(
            serde_json::to_value(&record).unwrap(),
            json!({ "heightCm": 180.0, "weightKg": 75.5, "temperatureC": 36.6 })
        );
    }

    #[test]
    fn test_one_error_per_failing_field() {
        let input = VitalsInput::new().with(HEIGHT_CM, "250").with(WEIGHT_KG, "  ");
        let errors = VitalsSchema::for_reason("GENERAL").unwrap().validate(&input).unwrap_err();

        assert_eq!(errors.len(), 3);
        assert_eq!(errors.for_field(HEIGHT_CM), Some("Value must be between 100 and 220"));
        assert_eq!(errors.for_field(WEIGHT_KG), Some("Required"));
        assert_eq!(errors.for_field(TEMPERATURE_C), Some("Required"));
    }

    #[test]
    fn test_range_is_inclusive() {
        let input = VitalsInput::new()
            .with(HEIGHT_CM, "100")
            .with(WEIGHT_KG, "250")
            .with(TEMPERATURE_C, "abc");
        let errors = VitalsSchema::for_reason("GENERAL").unwrap().validate(&input).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors.for_field(TEMPERATURE_C), Some("Must be a number"));
    }

    #[test]
    fn test_reason_specific_fields() {
        let schema = VitalsSchema::for_reason("joint_pain").unwrap();
        assert_eq!(schema.reason().suggested_specialty, "Orthopedics");

        let errors = schema.validate(&general().with("affectedArea", "ELBOW")).unwrap_err();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors.for_field("painScale"), Some("Required"));
        assert_eq!(
            errors.for_field("affectedArea"),
            Some("Select one of: KNEE, SHOULDER, BACK, HIP, NECK")
        );

        let record = schema
            .validate(&general().with("painScale", "7").with("affectedArea", "knee"))
            .unwrap();
        assert_eq!(record.extra.get("painScale"), Some(&VitalValue::Number(7.0)));

        let errors = schema
            .validate(&general().with("painScale", "7.5").with("affectedArea", "knee"))
            .unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors.for_field("painScale"), Some("Must be a whole number"));
        assert_eq!(
            schema
                .validate(&general().with("painScale", "10.0").with("affectedArea", "knee"))
                .unwrap()
                .extra
                .get("painScale"),
            Some(&VitalValue::Number(10.0))
        );
        assert_eq!(record.extra.get("affectedArea"), Some(&VitalValue::Text("KNEE".to_string())));
    }

    #[test]
    fn test_optional_fields_may_be_blank() {
        let schema = VitalsSchema::for_reason("RESPIRATORY").unwrap();
        let record = schema.validate(&general().with("shortnessOfBreath", "NO")).unwrap();
        assert!(!record.extra.contains_key("oxygenSaturation"));

        let errors = schema
            .validate(&general().with("shortnessOfBreath", "NO").with("oxygenSaturation", "65"))
            .unwrap_err();
        assert_eq!(errors.for_field("oxygenSaturation"), Some("Value must be between 70 and 100"));
    }

    #[test]
    fn test_unknown_reason() {
        let errors = VitalsSchema::for_reason("HEADACHE").unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors.for_field("reasonCode").is_some());
    }

    #[test]
    fn test_draft_cache() {
        let kv = Arc::new(MemoryStore::new());
        let drafts = VitalsDraftStore::new(kv.clone());
        assert!(drafts.load().is_none());

        let schema = VitalsSchema::for_reason("SKIN_RASH").unwrap();
        let record = schema.validate(&general().with("rashArea", "ARMS").with("itching", "yes")).unwrap();
        drafts.save(&record).unwrap();

        let draft = drafts.load().unwrap();
        assert_eq!(draft.vitals, record);
        assert_eq!(schema.validate(&draft.vitals.to_input()).unwrap(), record);

        drafts.clear();
        assert!(drafts.load().is_none());

        kv.set(VITALS_DRAFT_KEY, "garbage").unwrap();
        assert!(drafts.load().is_none());
        assert_eq!(kv.get(VITALS_DRAFT_KEY).unwrap(), None);
    }
}
