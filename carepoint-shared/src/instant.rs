//! ISO-8601 instants as they travel between the portal and the clinic backend.
//!
//! Slots are keyed by their instant string, so every instant the portal emits
//! goes through [`format_instant`]. Parsing is lenient: the backend writes
//! RFC 3339 for slots but naive UTC timestamps for `createdAt`, and doctor
//! profiles may carry minute-precision values.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"];

/// Parse an instant. Values without an offset are read as UTC.
pub fn parse_instant(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }

    let naive = value.strip_suffix('Z').unwrap_or(value);
    NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(naive, format).ok())
        .map(|dt| dt.and_utc())
}

/// Canonical wire form, e.g. `2024-01-01T09:00:00.000Z`.
pub fn format_instant(instant: &DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// `#[serde(with = "carepoint_shared::instant::iso")]`
pub mod iso {
    use super::{format_instant, parse_instant};
    use chrono::{DateTime, Utc};
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(instant: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format_instant(instant))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse_instant(&raw).ok_or_else(|| D::Error::custom(format!("invalid instant: {}", raw)))
    }
}

/// Optional variant of [`iso`]. Unparseable values become `None`.
pub mod iso_opt {
    use super::{format_instant, parse_instant};
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(instant: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match instant {
            Some(value) => serializer.serialize_some(&format_instant(value)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.as_deref().and_then(parse_instant))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_variants() {
        let expected = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();

        assert_eq!(parse_instant("2024-01-01T12:00:00Z"), Some(expected));
        assert_eq!(parse_instant("2024-01-01T12:00:00.000Z"), Some(expected));
        assert_eq!(parse_instant("2024-01-01T13:00:00+01:00"), Some(expected));
        assert_eq!(parse_instant("2024-01-01T12:00:00"), Some(expected));
        assert_eq!(parse_instant("2024-01-01T12:00Z"), Some(expected));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!(parse_instant(""), None);
        assert_eq!(parse_instant("tomorrow"), None);
        assert_eq!(parse_instant("2024-13-01T00:00:00Z"), None);
    }

    #[test]
    fn test_format_is_millisecond_zulu() {
        let instant = Utc.with_ymd_and_hms(2024, 3, 4, 9, 30, 0).unwrap();
        assert_eq!(format_instant(&instant), "2024-03-04T09:30:00.000Z");
    }
}
