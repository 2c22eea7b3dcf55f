//! Kafka REST record batch carrying one prediction.
//!
//! The wire shape is fixed by the collector:
//!
//! ```text
//! {"records":[{"value":{"coordinates":[<c0>,<c1>], "prediction": <token> }}]}
//! ```
//!
//! `<token>` is inserted bare. Collectors expect a number there, and class
//! labels arrive with one trailing character of noise that is stripped first.

use crate::error::{Result, VisionError};

/// Derive the bare prediction token from a class label.
///
/// Drops exactly one trailing character. Single-character labels are used as
/// they are, since stripping would leave nothing to send.
pub fn prediction_token(label: &str) -> Result<&str> {
    let mut chars = label.chars();
    match (chars.next_back(), chars.as_str()) {
        (None, _) => Err(VisionError::Report {
            message: "cannot report an empty label".to_string(),
        }),
        (Some(_), "") => Ok(label),
        (Some(_), rest) => Ok(rest),
    }
}

/// Coordinates plus prediction token, ready to serialize.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportPayload {
    pub coordinates: [f64; 2],
    pub token: String,
}

impl ReportPayload {
    pub fn new(label: &str, coordinates: [f64; 2]) -> Result<Self> {
        Ok(Self {
            coordinates,
            token: prediction_token(label)?.to_string(),
        })
    }

    /// Serialize to the collector's body format.
    pub fn to_wire(&self) -> Result<String> {
        let [c0, c1] = self.coordinates;
        Ok(format!(
            "{{\"records\":[{{\"value\":{{\"coordinates\":[{},{}], \"prediction\": {} }}}}]}}",
            coordinate(c0)?,
            coordinate(c1)?,
            self.token
        ))
    }
}

fn coordinate(value: f64) -> Result<String> {
    if !value.is_finite() {
        return Err(VisionError::Report {
            message: format!("coordinate {value} is not a finite number"),
        });
    }
    serde_json::to_string(&value).map_err(|e| VisionError::Report {
        message: format!("cannot serialize coordinate: {e}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_strips_one_trailing_character() {
        assert_eq!(prediction_token("42\r").unwrap(), "42");
        assert_eq!(prediction_token("cat").unwrap(), "ca");
        assert_eq!(prediction_token("7,").unwrap(), "7");
    }

    #[test]
    fn test_single_character_label_is_kept() {
        assert_eq!(prediction_token("3").unwrap(), "3");
    }

    #[test]
    fn test_token_strips_multibyte_character() {
        assert_eq!(prediction_token("12€").unwrap(), "12");
    }

    #[test]
    fn test_empty_label_is_report_error() {
        assert!(matches!(
            prediction_token(""),
            Err(VisionError::Report { .. })
        ));
    }

    #[test]
    fn test_wire_format_exact() {
        let payload = ReportPayload::new("3", [12.5, 0.25]).unwrap();
        assert_eq!(
            payload.to_wire().unwrap(),
            r#"{"records":[{"value":{"coordinates":[12.5,0.25], "prediction": 3 }}]}"#
        );
    }

    #[test]
    fn test_wire_token_is_unquoted() {
        let payload = ReportPayload::new("17x", [1.0, 2.0]).unwrap();
        let body = payload.to_wire().unwrap();
        assert!(body.contains("\"prediction\": 17 "));
        assert!(!body.contains("\"17\""));

        let parsed: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(parsed["records"][0]["value"]["prediction"], 17);
        assert_eq!(parsed["records"][0]["value"]["coordinates"][1], 2.0);
    }

    #[test]
    fn test_non_finite_coordinate_is_report_error() {
        let payload = ReportPayload::new("3", [f64::NAN, 1.0]).unwrap();
        assert!(payload.to_wire().is_err());
    }
}
