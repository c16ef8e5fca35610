use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// A doctor as listed by `GET /doctors`, with the availability the backend
/// holds for them. The portal only reads and filters `avail_slots`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase", from = "RawDoctor")]
pub struct DoctorAvailability {
    pub doctor_id: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub specialty: Option<String>,
    pub city: Option<String>,
    pub languages: Vec<String>,
    pub avail_slots: Vec<String>,
}

impl DoctorAvailability {
    pub fn display_name(&self) -> String {
        let name = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(" ");
        if name.trim().is_empty() {
            self.doctor_id.clone()
        } else {
            name
        }
    }
}

/// Wire shape. Older records nest specialty, city and slots under
/// `doctorProfile` and key the doctor by `userId`; both layouts are accepted.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDoctor {
    #[serde(alias = "userId")]
    doctor_id: String,
    #[serde(default)]
    first_name: Option<String>,
    #[serde(default)]
    last_name: Option<String>,
    #[serde(default)]
    specialty: Option<String>,
    #[serde(default)]
    city: Option<String>,
    #[serde(default)]
    location: Option<String>,
    #[serde(default, deserialize_with = "string_list")]
    languages: Vec<String>,
    #[serde(default, deserialize_with = "string_list_strict")]
    avail_slots: Vec<String>,
    #[serde(default)]
    doctor_profile: Option<RawProfile>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct RawProfile {
    #[serde(default)]
    specialty: Option<String>,
    #[serde(default)]
    city: Option<String>,
    #[serde(default, deserialize_with = "string_list")]
    languages: Vec<String>,
    #[serde(default, deserialize_with = "string_list_strict")]
    avail_slots: Vec<String>,
}

impl From<RawDoctor> for DoctorAvailability {
    fn from(raw: RawDoctor) -> Self {
        let profile = raw.doctor_profile.unwrap_or_default();
        let pick_list = |top: Vec<String>, nested: Vec<String>| if nested.is_empty() { top } else { nested };

        Self {
            doctor_id: raw.doctor_id,
            first_name: raw.first_name,
            last_name: raw.last_name,
            specialty: profile.specialty.or(raw.specialty),
            city: profile.city.or(raw.city).or(raw.location),
            languages: pick_list(raw.languages, profile.languages),
            avail_slots: pick_list(raw.avail_slots, profile.avail_slots),
        }
    }
}

/// Array of strings or a comma-separated string; anything else is empty.
fn string_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    let items: Vec<String> = match value {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        Value::String(s) => s.split(',').map(str::to_string).collect(),
        _ => Vec::new(),
    };
    Ok(items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect())
}

/// Array of strings only; a non-array value is treated as "no slots".
fn string_list_strict<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    })
}

/// Search filters for `GET /doctors`. The backend matches loosely
/// (substring), so the portal re-applies exact matches on specialty and city.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DoctorQuery {
    pub specialty: Option<String>,
    pub location: Option<String>,
    pub language: Option<String>,
}

impl DoctorQuery {
    pub fn for_specialty(specialty: &str) -> Self {
        Self {
            specialty: Some(specialty.to_string()),
            ..Default::default()
        }
    }

    pub fn with_location(mut self, location: &str) -> Self {
        self.location = Some(location.to_string());
        self
    }

    pub fn with_language(mut self, language: &str) -> Self {
        self.language = Some(language.to_string());
        self
    }

    /// Non-empty filters as query parameters.
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        [
            ("specialty", &self.specialty),
            ("location", &self.location),
            ("language", &self.language),
        ]
        .into_iter()
        .filter_map(|(key, value)| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(|v| (key, v.to_string()))
        })
        .collect()
    }

    pub fn matches(&self, doctor: &DoctorAvailability) -> bool {
        let exact = |filter: &Option<String>, value: &Option<String>| match filter.as_deref().map(str::trim) {
            None | Some("") => true,
            Some(wanted) => value.as_deref() == Some(wanted),
        };

        let language_ok = match self.language.as_deref().map(str::trim) {
            None | Some("") => true,
            Some(wanted) => doctor.languages.iter().any(|l| l.eq_ignore_ascii_case(wanted)),
        };

        exact(&self.specialty, &doctor.specialty) && exact(&self.location, &doctor.city) && language_ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_flat_layout() {
        let doctor: DoctorAvailability = serde_json::from_value(json!({
            "doctorId": "doc-1",
            "firstName": "Ada",
            "lastName": "Lovelace",
            "specialty": "Cardiology",
            "location": "Paris",
            "languages": "French, English",
            "availSlots": ["2024-01-02T09:00:00Z"],
        }))
        .unwrap();

        assert_eq!(doctor.city.as_deref(), Some("Paris"));
        assert_eq!(doctor.languages, vec!["French", "English"]);
        assert_eq!(doctor.avail_slots.len(), 1);
        assert_eq!(doctor.display_name(), "Ada Lovelace");
    }

    #[test]
    fn test_nested_profile_layout() {
        let doctor: DoctorAvailability = serde_json::from_value(json!({
            "userId": "doc-2",
            "doctorProfile": {
                "specialty": "Dermatology",
                "city": "Lyon",
                "availSlots": "not-a-list",
            },
        }))
        .unwrap();

        assert_eq!(doctor.doctor_id, "doc-2");
        assert_eq!(doctor.specialty.as_deref(), Some("Dermatology"));
        assert_eq!(doctor.city.as_deref(), Some("Lyon"));
        assert!(doctor.avail_slots.is_empty());
        assert_eq!(doctor.display_name(), "doc-2");
    }

    #[test]
    fn test_query_filters() {
        let doctor = DoctorAvailability {
            doctor_id: "doc-1".to_string(),
            specialty: Some("Cardiology".to_string()),
            city: Some("Paris".to_string()),
            languages: vec!["French".to_string()],
            ..Default::default()
        };

        assert!(DoctorQuery::default().matches(&doctor));
        assert!(DoctorQuery::for_specialty("Cardiology").with_location("Paris").matches(&doctor));
        assert!(!DoctorQuery::for_specialty("Cardio").matches(&doctor));
        assert!(!DoctorQuery::for_specialty("Cardiology").with_location("Lyon").matches(&doctor));
        assert!(DoctorQuery::default().with_language("french").matches(&doctor));

        let pairs = DoctorQuery::for_specialty("Cardiology").with_location(" ").query_pairs();
        assert_eq!(pairs, vec![("specialty", "Cardiology".to_string())]);
    }
}
