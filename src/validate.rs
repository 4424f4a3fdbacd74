//! Payload validation and coercion for submissions.
//!
//! Works on raw JSON so that every missing field can be reported at once,
//! by name, before anything is written.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::config::ProvenanceDefaults;
use crate::error::ValidationError;
use crate::models::{NewAlert, NewReading};

// ---

pub const READING_FIELDS: &[&str] = &["id_sensor", "umidade_solo", "temperatura_ar", "precipitacao_mm"];

pub const ALERT_FIELDS: &[&str] = &["id_produtor", "codigo_severidade", "descricao_alerta"];

/// Validate a reading payload.
///
/// `now` stamps readings that arrive without a `timestamp`; provenance tags
/// fall back to `defaults`.
pub fn reading_from_payload(
    payload: &Value,
    defaults: &ProvenanceDefaults,
    now: DateTime<Utc>,
) -> Result<NewReading, ValidationError> {
    // ---
    let obj = as_object(payload)?;
    require_fields(obj, READING_FIELDS)?;

    Ok(NewReading {
        id_sensor: integer_field(obj, "id_sensor")?,
        umidade_solo: float_field(obj, "umidade_solo")?,
        temperatura_ar: float_field(obj, "temperatura_ar")?,
        precipitacao_mm: float_field(obj, "precipitacao_mm")?,
        timestamp: optional_timestamp(obj, "timestamp")?.unwrap_or(now),
        farm_id: Some(optional_text(obj, "farm_id")?.unwrap_or_else(|| defaults.farm_id.clone())),
        team_name: Some(optional_text(obj, "team_name")?.unwrap_or_else(|| defaults.team_name.clone())),
    })
}

/// Validate an alert payload.
///
/// The severity code is kept verbatim; resolving it is the primary store's job.
pub fn alert_from_payload(payload: &Value, now: DateTime<Utc>) -> Result<NewAlert, ValidationError> {
    // ---
    let obj = as_object(payload)?;
    require_fields(obj, ALERT_FIELDS)?;

    let id_leitura = match obj.get("id_leitura") {
        None | Some(Value::Null) => None,
        Some(value) => Some(coerce_integer("id_leitura", value)?),
    };

    Ok(NewAlert {
        id_produtor: integer_field(obj, "id_produtor")?,
        codigo_severidade: text_field(obj, "codigo_severidade")?,
        descricao_alerta: text_field(obj, "descricao_alerta")?,
        id_leitura,
        timestamp: optional_timestamp(obj, "timestamp")?.unwrap_or(now),
    })
}

fn as_object(payload: &Value) -> Result<&Map<String, Value>, ValidationError> {
    payload.as_object().ok_or(ValidationError::NotAnObject)
}

fn require_fields(obj: &Map<String, Value>, required: &'static [&'static str]) -> Result<(), ValidationError> {
    // ---
    let missing: Vec<&'static str> = required
        .iter()
        .copied()
        .filter(|field| !obj.contains_key(*field))
        .collect();

    if missing.is_empty() {
        return Ok(());
    }
    Err(ValidationError::MissingFields {
        missing,
        required,
        received: obj.keys().cloned().collect(),
    })
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ValidationError {
    ValidationError::InvalidField {
        field,
        reason: reason.into(),
    }
}

static NULL: Value = Value::Null;

fn field_value<'a>(obj: &'a Map<String, Value>, field: &str) -> &'a Value {
    obj.get(field).unwrap_or(&NULL)
}

fn integer_field(obj: &Map<String, Value>, field: &'static str) -> Result<i64, ValidationError> {
    coerce_integer(field, field_value(obj, field))
}

fn coerce_integer(field: &'static str, value: &Value) -> Result<i64, ValidationError> {
    // ---
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                return Ok(i);
            }
            match n.as_f64() {
                Some(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => Ok(f as i64),
                _ => Err(invalid(field, format!("must be an integer, got {n}"))),
            }
        }
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| invalid(field, format!("must be an integer, got {s:?}"))),
        other => Err(invalid(field, format!("must be an integer, got {other}"))),
    }
}

fn float_field(obj: &Map<String, Value>, field: &'static str) -> Result<f64, ValidationError> {
    // ---
    let value = field_value(obj, field);
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match parsed {
        Some(f) if f.is_finite() => Ok(f),
        _ => Err(invalid(field, format!("must be a number, got {value}"))),
    }
}

fn text_field(obj: &Map<String, Value>, field: &'static str) -> Result<String, ValidationError> {
    // ---
    match field_value(obj, field) {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(invalid(field, format!("must be a string, got {other}"))),
    }
}

fn optional_text(obj: &Map<String, Value>, field: &'static str) -> Result<Option<String>, ValidationError> {
    match obj.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(_) => text_field(obj, field).map(Some),
    }
}

fn optional_timestamp(
    obj: &Map<String, Value>,
    field: &'static str,
) -> Result<Option<DateTime<Utc>>, ValidationError> {
    // ---
    match obj.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => DateTime::parse_from_rfc3339(s)
            .map(|ts| Some(ts.with_timezone(&Utc)))
            .map_err(|e| invalid(field, format!("must be an RFC 3339 timestamp: {e}"))),
        Some(other) => Err(invalid(field, format!("must be an RFC 3339 string, got {other}"))),
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn defaults() -> ProvenanceDefaults {
        ProvenanceDefaults {
            farm_id: "FARM_WaterWise_2025".to_string(),
            team_name: "GRUPO_WATERWISE".to_string(),
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_valid_reading_gets_defaults() {
        // ---
        let payload = json!({"id_sensor": 3, "umidade_solo": 18.2, "temperatura_ar": 31.5, "precipitacao_mm": 0.0});
        let reading = reading_from_payload(&payload, &defaults(), now()).unwrap();

        assert_eq!(reading.id_sensor, 3);
        assert_eq!(reading.umidade_solo, 18.2);
        assert_eq!(reading.precipitacao_mm, 0.0);
        assert_eq!(reading.timestamp, now());
        assert_eq!(reading.farm_id.as_deref(), Some("FARM_WaterWise_2025"));
        assert_eq!(reading.team_name.as_deref(), Some("GRUPO_WATERWISE"));
    }

    #[test]
    fn test_missing_field_is_named() {
        // ---
        let payload = json!({"id_sensor": 3, "umidade_solo": 18.2, "precipitacao_mm": 0.0});
        let err = reading_from_payload(&payload, &defaults(), now()).unwrap_err();

        match err {
            ValidationError::MissingFields { missing, received, .. } => {
                assert_eq!(missing, vec!["temperatura_ar"]);
                assert_eq!(received.len(), 3);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_numeric_strings_are_coerced() {
        // ---
        let payload = json!({
            "id_sensor": "7",
            "umidade_solo": "55.5",
            "temperatura_ar": 20,
            "precipitacao_mm": "12",
            "farm_id": "FARM_NORTE",
            "timestamp": "2025-06-01T09:30:00-03:00"
        });
        let reading = reading_from_payload(&payload, &defaults(), now()).unwrap();

        assert_eq!(reading.id_sensor, 7);
        assert_eq!(reading.umidade_solo, 55.5);
        assert_eq!(reading.temperatura_ar, 20.0);
        assert_eq!(reading.farm_id.as_deref(), Some("FARM_NORTE"));
        assert_eq!(reading.timestamp, Utc.with_ymd_and_hms(2025, 6, 1, 12, 30, 0).unwrap());
    }

    #[test]
    fn test_coercion_failures() {
        // ---
        let bad_sensor = json!({"id_sensor": 3.7, "umidade_solo": 1, "temperatura_ar": 1, "precipitacao_mm": 1});
        assert!(matches!(
            reading_from_payload(&bad_sensor, &defaults(), now()),
            Err(ValidationError::InvalidField { field: "id_sensor", .. })
        ));

        let bad_moisture = json!({"id_sensor": 3, "umidade_solo": "wet", "temperatura_ar": 1, "precipitacao_mm": 1});
        assert!(matches!(
            reading_from_payload(&bad_moisture, &defaults(), now()),
            Err(ValidationError::InvalidField { field: "umidade_solo", .. })
        ));

        let null_temp = json!({"id_sensor": 3, "umidade_solo": 1, "temperatura_ar": null, "precipitacao_mm": 1});
        assert!(matches!(
            reading_from_payload(&null_temp, &defaults(), now()),
            Err(ValidationError::InvalidField { field: "temperatura_ar", .. })
        ));

        let nan = json!({"id_sensor": 3, "umidade_solo": 1, "temperatura_ar": "NaN", "precipitacao_mm": 1});
        assert!(reading_from_payload(&nan, &defaults(), now()).is_err());
    }

    #[test]
    fn test_non_object_payload() {
        // ---
        assert!(matches!(
            reading_from_payload(&json!([1, 2, 3]), &defaults(), now()),
            Err(ValidationError::NotAnObject)
        ));
        assert!(matches!(alert_from_payload(&json!("alerta"), now()), Err(ValidationError::NotAnObject)));
    }

    #[test]
    fn test_alert_keeps_raw_severity_code() {
        // ---
        let payload = json!({"id_produtor": 1, "codigo_severidade": "URGENTE", "descricao_alerta": "Chuva forte", "id_leitura": 9});
        let alert = alert_from_payload(&payload, now()).unwrap();

        assert_eq!(alert.codigo_severidade, "URGENTE");
        assert_eq!(alert.id_leitura, Some(9));
        assert_eq!(alert.timestamp, now());
    }

    #[test]
    fn test_alert_missing_fields() {
        // ---
        let err = alert_from_payload(&json!({"id_produtor": 1}), now()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "missing required fields: codigo_severidade, descricao_alerta"
        );
    }
}
