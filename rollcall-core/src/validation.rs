//! Pure input validation.
//!
//! Every function here works on decoded JSON values and returns either a typed value or a
//! field → message map. Nothing in this module touches a store, so the rules can be tested
//! in isolation and reused by the HTTP layer and the services alike.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, SubsecRound, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::locations::LocationWhitelist;
use crate::models::{Event, EventDraft, EventFilter};
use crate::CoreError;

pub const NOT_BLANK: &str = "This value should not be blank.";
pub const NOT_INTEGER: &str = "This value should be of type integer.";
pub const NOT_STRING: &str = "This value should be of type string.";
pub const NOT_DATETIME: &str = "This value is not a valid datetime.";
pub const NOT_POSITIVE: &str = "This value should be positive.";
pub const END_BEFORE_START: &str = "End date must be after start date.";
pub const UNKNOWN_LOCATION: &str = "This value is not a valid location.";

pub const MAX_TITLE_LEN: usize = 255;
pub const MAX_LOCATION_LEN: usize = 100;
pub const MAX_NAME_LEN: usize = 100;
pub const MAX_EMAIL_LEN: usize = 150;

// Same shape as the HTML5 email rule: local part of the permitted ASCII set, then one or
// more dot-separated DNS labels.
static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)+$",
    )
    .expect("email pattern is valid")
});

/// Field-level validation failures, keyed by the request field name.
///
/// Only the first failure per field is kept, so the reported message is always the most
/// basic problem with that field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(BTreeMap<String, String>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(field: &str, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0.entry(field.to_string()).or_insert_with(|| message.into());
    }

    pub fn has(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn into_result<T>(self, value: T) -> Result<T, ValidationErrors> {
        if self.is_empty() {
            Ok(value)
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, message) in &self.0 {
            if !first {
                f.write_str(", ")?;
            }
            write!(f, "{field}: {message}")?;
            first = false;
        }
        Ok(())
    }
}

fn too_long(max: usize) -> String {
    format!("This value is too long. It should have {max} characters or less.")
}

// ============================================================================
// Field readers
// ============================================================================

/// Request bodies must be JSON objects; anything else is treated as undecodable.
pub fn as_object(body: &Value) -> Result<&Map<String, Value>, CoreError> {
    body.as_object()
        .ok_or_else(|| CoreError::MalformedPayload("Invalid JSON".to_string()))
}

/// Reads an optional string field. `null` and absence both mean "not supplied".
pub fn read_text(obj: &Map<String, Value>, field: &str, errors: &mut ValidationErrors) -> Option<String> {
    match obj.get(field) {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.trim().to_string()),
        Some(_) => {
            errors.add(field, NOT_STRING);
            None
        }
    }
}

/// Reads an optional integer field. Floats and numeric strings are rejected.
pub fn read_integer(obj: &Map<String, Value>, field: &str, errors: &mut ValidationErrors) -> Option<i64> {
    match obj.get(field) {
        None | Some(Value::Null) => None,
        Some(value) => match value.as_i64() {
            Some(n) => Some(n),
            None => {
                errors.add(field, NOT_INTEGER);
                None
            }
        },
    }
}

pub fn read_timestamp(
    obj: &Map<String, Value>,
    field: &str,
    errors: &mut ValidationErrors,
) -> Option<DateTime<Utc>> {
    let raw = read_text(obj, field, errors)?;
    match parse_timestamp(&raw) {
        Some(ts) => Some(ts),
        None => {
            errors.add(field, NOT_DATETIME);
            None
        }
    }
}

/// Parses an RFC 3339 timestamp, or a naive date/datetime interpreted as UTC.
///
/// Sub-microsecond precision is dropped so that values survive a round trip through
/// Postgres `TIMESTAMPTZ` unchanged.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc).trunc_subsecs(6));
    }

    const NAIVE_FORMATS: [&str; 4] = [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M",
    ];
    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc().trunc_subsecs(6));
        }
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

// ============================================================================
// Attendees
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttendeeInput {
    pub name: String,
    pub email: String,
}

/// Validates a register/update attendee body. Both fields are always required.
pub fn attendee_input(body: &Value) -> Result<AttendeeInput, CoreError> {
    let obj = as_object(body)?;
    let mut errors = ValidationErrors::new();

    let name = read_text(obj, "name", &mut errors).unwrap_or_default();
    let email = read_text(obj, "email", &mut errors).unwrap_or_default();

    if name.is_empty() {
        errors.add("name", "Name is required.");
    } else if name.chars().count() > MAX_NAME_LEN {
        errors.add("name", too_long(MAX_NAME_LEN));
    }

    if email.is_empty() {
        errors.add("email", "Email is required.");
    } else if !is_valid_email(&email) {
        errors.add("email", "Email is not valid.");
    } else if email.chars().count() > MAX_EMAIL_LEN {
        errors.add("email", too_long(MAX_EMAIL_LEN));
    }

    Ok(errors.into_result(AttendeeInput { name, email })?)
}

// ============================================================================
// Events
// ============================================================================

/// Event fields as supplied by a client. `None` means "not supplied".
///
/// Used directly as the partial update payload, and as the candidate record that the
/// invariant checks run over.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub capacity: Option<i64>,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
}

impl EventPatch {
    fn read(obj: &Map<String, Value>, errors: &mut ValidationErrors) -> Self {
        Self {
            title: read_text(obj, "title", errors),
            description: read_text(obj, "description", errors),
            location: read_text(obj, "location", errors),
            capacity: read_integer(obj, "capacity", errors),
            starts_at: read_timestamp(obj, "startsAt", errors),
            ends_at: read_timestamp(obj, "endsAt", errors),
        }
    }

    /// Fills every field this patch leaves out from `current`.
    pub fn overlay(&self, current: &Event) -> EventPatch {
        EventPatch {
            title: Some(self.title.clone().unwrap_or_else(|| current.title.clone())),
            description: Some(
                self.description
                    .clone()
                    .unwrap_or_else(|| current.description.clone()),
            ),
            location: Some(self.location.clone().unwrap_or_else(|| current.location.clone())),
            capacity: Some(self.capacity.unwrap_or(i64::from(current.capacity))),
            starts_at: Some(self.starts_at.unwrap_or(current.starts_at)),
            ends_at: Some(self.ends_at.unwrap_or(current.ends_at)),
        }
    }
}

/// Runs every event invariant over a candidate record, returning the draft only when all
/// of them hold.
fn check_event(
    candidate: &EventPatch,
    locations: &LocationWhitelist,
    errors: &mut ValidationErrors,
) -> Option<EventDraft> {
    let title = candidate.title.clone().unwrap_or_default();
    if title.is_empty() {
        errors.add("title", NOT_BLANK);
    } else if title.chars().count() > MAX_TITLE_LEN {
        errors.add("title", too_long(MAX_TITLE_LEN));
    }

    let description = candidate.description.clone().unwrap_or_default();
    if description.is_empty() {
        errors.add("description", NOT_BLANK);
    }

    let location = candidate.location.clone().unwrap_or_default();
    if location.is_empty() {
        errors.add("location", NOT_BLANK);
    } else if location.chars().count() > MAX_LOCATION_LEN {
        errors.add("location", too_long(MAX_LOCATION_LEN));
    } else if !locations.contains(&location) {
        errors.add("location", UNKNOWN_LOCATION);
    }

    let capacity = match candidate.capacity {
        None => {
            errors.add("capacity", NOT_BLANK);
            None
        }
        Some(n) if n <= 0 => {
            errors.add("capacity", NOT_POSITIVE);
            None
        }
        Some(n) => match i32::try_from(n) {
            Ok(n) => Some(n),
            Err(_) => {
                errors.add("capacity", format!("This value should be {} or less.", i32::MAX));
                None
            }
        },
    };

    if candidate.starts_at.is_none() {
        errors.add("startsAt", NOT_BLANK);
    }
    if candidate.ends_at.is_none() {
        errors.add("endsAt", NOT_BLANK);
    }
    if let (Some(starts_at), Some(ends_at)) = (candidate.starts_at, candidate.ends_at) {
        if ends_at <= starts_at {
            errors.add("endsAt", END_BEFORE_START);
        }
    }

    if !errors.is_empty() {
        return None;
    }

    Some(EventDraft {
        title,
        description,
        location,
        capacity: capacity?,
        starts_at: candidate.starts_at?,
        ends_at: candidate.ends_at?,
    })
}

/// Validates a create-event body. Every field is required.
pub fn new_event(body: &Value, locations: &LocationWhitelist) -> Result<EventDraft, CoreError> {
    let obj = as_object(body)?;
    let mut errors = ValidationErrors::new();
    let candidate = EventPatch::read(obj, &mut errors);

    match check_event(&candidate, locations, &mut errors) {
        Some(draft) => Ok(draft),
        None => Err(CoreError::ValidationError(errors)),
    }
}

/// Decodes an update-event body. Only field types are checked here; the invariants run
/// in [`merge_event`] once the stored record is known.
pub fn event_patch(body: &Value) -> Result<EventPatch, CoreError> {
    let obj = as_object(body)?;
    let mut errors = ValidationErrors::new();
    let patch = EventPatch::read(obj, &mut errors);
    Ok(errors.into_result(patch)?)
}

/// Applies `patch` to `current` and re-validates the whole resulting record, including
/// the cross-field date check when only one side of it changed.
pub fn merge_event(
    current: &Event,
    patch: &EventPatch,
    locations: &LocationWhitelist,
) -> Result<Event, ValidationErrors> {
    let mut errors = ValidationErrors::new();
    let candidate = patch.overlay(current);

    match check_event(&candidate, locations, &mut errors) {
        Some(draft) => Ok(Event::from_draft(current.id, draft)),
        None => Err(errors),
    }
}

/// Builds a listing filter from raw query-string values. Empty values are ignored.
pub fn event_filter(
    location: Option<&str>,
    title: Option<&str>,
    start_date: Option<&str>,
    end_date: Option<&str>,
) -> Result<EventFilter, ValidationErrors> {
    let non_empty = |value: Option<&str>| {
        value
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };

    let mut errors = ValidationErrors::new();
    let mut parse_bound = |field: &str, raw: Option<String>| {
        let raw = raw?;
        let parsed = parse_timestamp(&raw);
        if parsed.is_none() {
            errors.add(field, NOT_DATETIME);
        }
        parsed
    };

    let start_date = parse_bound("startDate", non_empty(start_date));
    let end_date = parse_bound("endDate", non_empty(end_date));

    errors.into_result(EventFilter {
        location: non_empty(location),
        title: non_empty(title),
        start_date,
        end_date,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;
    use serde_json::json;

    fn whitelist() -> LocationWhitelist {
        LocationWhitelist::new(["India", "Germany"])
    }

    fn valid_event_body() -> Value {
        json!({
            "title": "RustConf",
            "description": "Talks and workshops",
            "location": "India",
            "capacity": 2,
            "startsAt": "2025-06-09T10:00:00+00:00",
            "endsAt": "2025-06-09T12:00:00+00:00",
        })
    }

    fn stored_event() -> Event {
        let draft = new_event(&valid_event_body(), &whitelist()).unwrap();
        Event::from_draft(7, draft)
    }

    #[rstest]
    #[case("2025-06-09T10:00:00Z", (2025, 6, 9, 10, 0, 0))]
    #[case("2025-06-09T12:00:00+02:00", (2025, 6, 9, 10, 0, 0))]
    #[case("2025-06-09 10:00:00", (2025, 6, 9, 10, 0, 0))]
    #[case("2025-06-09T10:00", (2025, 6, 9, 10, 0, 0))]
    #[case("2025-06-09", (2025, 6, 9, 0, 0, 0))]
    fn test_parse_timestamp_formats(#[case] raw: &str, #[case] expected: (i32, u32, u32, u32, u32, u32)) {
        let (y, mo, d, h, mi, s) = expected;
        assert_eq!(
            parse_timestamp(raw),
            Some(Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap())
        );
    }

    #[test]
    fn test_parse_timestamp_rejects_garbage_and_truncates_nanos() {
        assert_eq!(parse_timestamp("next tuesday"), None);
        assert_eq!(parse_timestamp(""), None);

        let ts = parse_timestamp("2025-06-09T10:00:00.123456789Z").unwrap();
        assert_eq!(ts.timestamp_subsec_nanos(), 123_456_000);
    }

    #[rstest]
    #[case("a@example.com", true)]
    #[case("first.last+tag@sub.example.org", true)]
    #[case("no-at-sign.example.com", false)]
    #[case("a@localhost", false)]
    #[case("spaces in@example.com", false)]
    #[case("a@-example.com", false)]
    fn test_email_syntax(#[case] email: &str, #[case] valid: bool) {
        assert_eq!(is_valid_email(email), valid);
    }

    #[test]
    fn test_attendee_input_requires_both_fields() {
        let err = attendee_input(&json!({})).unwrap_err();
        let CoreError::ValidationError(errors) = err else {
            panic!("expected validation error");
        };
        assert_eq!(errors.get("name"), Some("Name is required."));
        assert_eq!(errors.get("email"), Some("Email is required."));
    }

    #[test]
    fn test_attendee_input_rejects_bad_email_and_trims() {
        let err = attendee_input(&json!({"name": "Jane", "email": "nope"})).unwrap_err();
        assert!(matches!(err, CoreError::ValidationError(ref e) if e.get("email") == Some("Email is not valid.")));

        let input = attendee_input(&json!({"name": "  Jane ", "email": "jane@example.com"})).unwrap();
        assert_eq!(input.name, "Jane");
    }

    #[test]
    fn test_non_object_body_is_malformed() {
        assert!(matches!(attendee_input(&json!([1, 2])), Err(CoreError::MalformedPayload(_))));
        assert!(matches!(new_event(&json!("x"), &whitelist()), Err(CoreError::MalformedPayload(_))));
    }

    #[test]
    fn test_new_event_accepts_valid_body() {
        let draft = new_event(&valid_event_body(), &whitelist()).unwrap();
        assert_eq!(draft.capacity, 2);
        assert_eq!(draft.location, "India");
        assert!(draft.ends_at > draft.starts_at);
    }

    #[test]
    fn test_new_event_reports_every_broken_field() {
        let body = json!({
            "title": "  ",
            "location": "Atlantis",
            "capacity": 0,
            "startsAt": "2025-06-09T10:00:00Z",
            "endsAt": "2025-06-09T10:00:00Z",
        });
        let Err(CoreError::ValidationError(errors)) = new_event(&body, &whitelist()) else {
            panic!("expected validation error");
        };
        assert_eq!(errors.get("title"), Some(NOT_BLANK));
        assert_eq!(errors.get("description"), Some(NOT_BLANK));
        assert_eq!(errors.get("location"), Some(UNKNOWN_LOCATION));
        assert_eq!(errors.get("capacity"), Some(NOT_POSITIVE));
        assert_eq!(errors.get("endsAt"), Some(END_BEFORE_START));
        assert!(!errors.has("startsAt"));
    }

    #[test]
    fn test_new_event_type_errors_win_over_blank() {
        let mut body = valid_event_body();
        body["capacity"] = json!("ten");
        body["startsAt"] = json!("not a date");
        let Err(CoreError::ValidationError(errors)) = new_event(&body, &whitelist()) else {
            panic!("expected validation error");
        };
        assert_eq!(errors.get("capacity"), Some(NOT_INTEGER));
        assert_eq!(errors.get("startsAt"), Some(NOT_DATETIME));
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn test_merge_event_keeps_absent_fields() {
        let current = stored_event();
        let patch = event_patch(&json!({"title": "RustConf 2025", "description": null})).unwrap();

        let merged = merge_event(&current, &patch, &whitelist()).unwrap();
        assert_eq!(merged.id, current.id);
        assert_eq!(merged.title, "RustConf 2025");
        assert_eq!(merged.description, current.description);
        assert_eq!(merged.capacity, current.capacity);
    }

    #[test]
    fn test_merge_event_rechecks_dates_when_one_side_changes() {
        let current = stored_event();
        let patch = event_patch(&json!({"endsAt": "2025-06-09T09:00:00Z"})).unwrap();

        let errors = merge_event(&current, &patch, &whitelist()).unwrap_err();
        assert_eq!(errors.get("endsAt"), Some(END_BEFORE_START));
    }

    #[test]
    fn test_event_patch_rejects_wrong_types() {
        let Err(CoreError::ValidationError(errors)) = event_patch(&json!({"capacity": 1.5, "title": 3})) else {
            panic!("expected validation error");
        };
        assert_eq!(errors.get("capacity"), Some(NOT_INTEGER));
        assert_eq!(errors.get("title"), Some(NOT_STRING));
    }

    #[test]
    fn test_event_filter_parses_bounds() {
        let filter = event_filter(Some("India"), Some(""), Some("2025-06-01"), None).unwrap();
        assert_eq!(filter.location.as_deref(), Some("India"));
        assert_eq!(filter.title, None);
        assert_eq!(filter.start_date, Some(Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap()));

        let errors = event_filter(None, None, None, Some("soon")).unwrap_err();
        assert_eq!(errors.get("endDate"), Some(NOT_DATETIME));
    }
}
