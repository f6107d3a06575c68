use rollcall_core::validation::{as_object, read_integer, NOT_POSITIVE};
use rollcall_core::{CoreResult, ValidationErrors};
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BookingRequest {
    pub event_id: i64,
    pub attendee_id: i64,
}

impl BookingRequest {
    /// Reads `event_id` and `attendee_id` from a decoded body. Both must be positive
    /// integers; every offending field is reported at once.
    pub fn from_json(body: &Value) -> CoreResult<Self> {
        let obj = as_object(body)?;
        let mut errors = ValidationErrors::new();

        let mut read_id = |field: &str, missing: &str| {
            match read_integer(obj, field, &mut errors) {
                Some(id) if id > 0 => Some(id),
                Some(_) => {
                    errors.add(field, NOT_POSITIVE);
                    None
                }
                None => {
                    errors.add(field, missing);
                    None
                }
            }
        };

        let event_id = read_id("event_id", "Event is required");
        let attendee_id = read_id("attendee_id", "Attendee is required");

        match (event_id, attendee_id) {
            (Some(event_id), Some(attendee_id)) if errors.is_empty() => Ok(Self {
                event_id,
                attendee_id,
            }),
            _ => Err(errors.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollcall_core::CoreError;
    use rstest::rstest;
    use serde_json::json;

    #[test]
    fn test_reads_both_ids() {
        let request = BookingRequest::from_json(&json!({"event_id": 4, "attendee_id": 9})).unwrap();
        assert_eq!(request, BookingRequest { event_id: 4, attendee_id: 9 });
    }

    #[rstest]
    #[case(json!({}), Some("Event is required"), Some("Attendee is required"))]
    #[case(json!({"event_id": 1}), None, Some("Attendee is required"))]
    #[case(json!({"event_id": null, "attendee_id": 2}), Some("Event is required"), None)]
    #[case(json!({"event_id": "1", "attendee_id": 2}), Some("This value should be of type integer."), None)]
    #[case(json!({"event_id": 1.5, "attendee_id": 0}), Some("This value should be of type integer."), Some("This value should be positive."))]
    fn test_reports_each_bad_field(
        #[case] body: Value,
        #[case] event_error: Option<&str>,
        #[case] attendee_error: Option<&str>,
    ) {
        match BookingRequest::from_json(&body) {
            Err(CoreError::ValidationError(errors)) => {
                assert_eq!(errors.get("event_id"), event_error);
                assert_eq!(errors.get("attendee_id"), attendee_error);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_non_object_body_is_malformed() {
        assert!(matches!(
            BookingRequest::from_json(&json!([1, 2])),
            Err(CoreError::MalformedPayload(_))
        ));
    }
}
