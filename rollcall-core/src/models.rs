use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attendee {
    pub id: i64,
    pub name: String,
    pub email: String,
}

/// A persisted event. Its bookings are never held inline; occupancy is always queried.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub location: String,
    pub capacity: i32,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
}

impl Event {
    pub fn from_draft(id: i64, draft: EventDraft) -> Self {
        Self {
            id,
            title: draft.title,
            description: draft.description,
            location: draft.location,
            capacity: draft.capacity,
            starts_at: draft.starts_at,
            ends_at: draft.ends_at,
        }
    }
}

/// Validated event fields that have not been assigned an id yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventDraft {
    pub title: String,
    pub description: String,
    pub location: String,
    pub capacity: i32,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
}

/// An event together with its live occupancy at query time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventListing {
    #[serde(flatten)]
    pub event: Event,
    pub booked: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: i64,
    pub event_id: i64,
    pub attendee_id: i64,
    pub created_at: DateTime<Utc>,
}

/// Optional predicates for event listings. Every supplied predicate must hold.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventFilter {
    /// Exact location match.
    pub location: Option<String>,
    /// Case-insensitive substring of the title.
    pub title: Option<String>,
    /// Lower bound on `starts_at`, inclusive.
    pub start_date: Option<DateTime<Utc>>,
    /// Upper bound on `ends_at`, inclusive.
    pub end_date: Option<DateTime<Utc>>,
}

impl EventFilter {
    pub fn matches(&self, event: &Event) -> bool {
        if let Some(location) = &self.location {
            if &event.location != location {
                return false;
            }
        }
        if let Some(title) = &self.title {
            if !event.title.to_lowercase().contains(&title.to_lowercase()) {
                return false;
            }
        }
        if let Some(start) = self.start_date {
            if event.starts_at < start {
                return false;
            }
        }
        if let Some(end) = self.end_date {
            if event.ends_at > end {
                return false;
            }
        }
        true
    }
}

/// Limits applied to listing requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Pagination {
    pub default_limit: u32,
    pub max_limit: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            default_limit: 10,
            max_limit: 100,
        }
    }
}

/// A 1-indexed page request whose limit has already been clamped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub limit: u32,
}

impl PageRequest {
    pub fn new(page: Option<i64>, limit: Option<i64>, rules: &Pagination) -> Self {
        let max_limit = rules.max_limit.max(1);
        let page = page.unwrap_or(1).clamp(1, i64::from(u32::MAX));
        let limit = limit
            .unwrap_or(i64::from(rules.default_limit))
            .clamp(1, i64::from(max_limit));

        Self {
            page: u32::try_from(page).unwrap_or(1),
            limit: u32::try_from(limit).unwrap_or(max_limit),
        }
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.limit)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page<T> {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub data: Vec<T>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_event() -> Event {
        Event {
            id: 1,
            title: "Rust Meetup".to_string(),
            description: "Monthly".to_string(),
            location: "India".to_string(),
            capacity: 10,
            starts_at: Utc.with_ymd_and_hms(2025, 6, 9, 10, 0, 0).unwrap(),
            ends_at: Utc.with_ymd_and_hms(2025, 6, 9, 12, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_page_request_clamps_limit() {
        let rules = Pagination::default();
        assert_eq!(PageRequest::new(None, None, &rules), PageRequest { page: 1, limit: 10 });
        assert_eq!(PageRequest::new(Some(0), Some(0), &rules), PageRequest { page: 1, limit: 1 });
        assert_eq!(PageRequest::new(Some(-4), Some(500), &rules), PageRequest { page: 1, limit: 100 });
        assert_eq!(PageRequest::new(Some(3), Some(20), &rules).offset(), 40);
    }

    #[test]
    fn test_filter_matches_each_predicate() {
        let event = sample_event();
        let mut filter = EventFilter::default();
        assert!(filter.matches(&event));

        filter.title = Some("meet".to_string());
        assert!(filter.matches(&event));

        filter.location = Some("Japan".to_string());
        assert!(!filter.matches(&event));

        filter.location = Some("India".to_string());
        filter.start_date = Some(Utc.with_ymd_and_hms(2025, 6, 9, 10, 0, 0).unwrap());
        filter.end_date = Some(Utc.with_ymd_and_hms(2025, 6, 9, 11, 59, 0).unwrap());
        assert!(!filter.matches(&event));
    }

    #[test]
    fn test_event_serializes_camel_case_with_booked() {
        let listing = EventListing { event: sample_event(), booked: 3 };
        let json = serde_json::to_value(&listing).unwrap();
        assert_eq!(json["startsAt"], "2025-06-09T10:00:00Z");
        assert_eq!(json["endsAt"], "2025-06-09T12:00:00Z");
        assert_eq!(json["booked"], 3);
        assert_eq!(json["capacity"], 10);
    }
}
