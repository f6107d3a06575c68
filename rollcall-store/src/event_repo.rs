use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rollcall_core::{
    Event, EventDraft, EventFilter, EventGuard, EventListing, EventRepository, PageRequest, StoreError,
};
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::debug;

use crate::booking_repo::PgEventGuard;
use crate::database::map_db_error;

pub(crate) const EVENT_COLUMNS: &str =
    "e.id, e.title, e.description, e.location, e.capacity, e.starts_at, e.ends_at";

pub struct StoreEventRepository {
    pool: PgPool,
}

impl StoreEventRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct EventRow {
    id: i64,
    title: String,
    description: String,
    location: String,
    capacity: i32,
    starts_at: DateTime<Utc>,
    ends_at: DateTime<Utc>,
}

impl From<EventRow> for Event {
    fn from(row: EventRow) -> Self {
        Event {
            id: row.id,
            title: row.title,
            description: row.description,
            location: row.location,
            capacity: row.capacity,
            starts_at: row.starts_at,
            ends_at: row.ends_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct EventListingRow {
    #[sqlx(flatten)]
    event: EventRow,
    booked: i64,
}

/// Escapes `%`, `_` and `\` so user input matches literally inside a LIKE pattern.
fn escape_like(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn push_filters(qb: &mut QueryBuilder<'_, Postgres>, filter: &EventFilter) {
    qb.push(" WHERE TRUE");
    if let Some(location) = &filter.location {
        qb.push(" AND e.location = ").push_bind(location.clone());
    }
    if let Some(title) = &filter.title {
        qb.push(" AND LOWER(e.title) LIKE ")
            .push_bind(format!("%{}%", escape_like(&title.to_lowercase())));
    }
    if let Some(start) = filter.start_date {
        qb.push(" AND e.starts_at >= ").push_bind(start);
    }
    if let Some(end) = filter.end_date {
        qb.push(" AND e.ends_at <= ").push_bind(end);
    }
}

#[async_trait]
impl EventRepository for StoreEventRepository {
    async fn insert_event(&self, draft: &EventDraft) -> Result<Event, StoreError> {
        let row = sqlx::query_as::<_, EventRow>(
            r#"
            INSERT INTO events AS e (title, description, location, capacity, starts_at, ends_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING e.id, e.title, e.description, e.location, e.capacity, e.starts_at, e.ends_at
            "#,
        )
        .bind(&draft.title)
        .bind(&draft.description)
        .bind(&draft.location)
        .bind(draft.capacity)
        .bind(draft.starts_at)
        .bind(draft.ends_at)
        .fetch_one(&self.pool)
        .await
        .map_err(map_db_error)?;

        Ok(row.into())
    }

    async fn find_event(&self, id: i64) -> Result<Option<Event>, StoreError> {
        let sql = format!("SELECT {EVENT_COLUMNS} FROM events e WHERE e.id = $1");
        let row = sqlx::query_as::<_, EventRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_db_error)?;

        Ok(row.map(Event::from))
    }

    async fn list_events(
        &self,
        filter: &EventFilter,
        page: &PageRequest,
    ) -> Result<(Vec<EventListing>, u64), StoreError> {
        let mut count_qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM events e");
        push_filters(&mut count_qb, filter);
        let total = count_qb
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await
            .map_err(map_db_error)?;

        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "SELECT {EVENT_COLUMNS}, (SELECT COUNT(*) FROM bookings b WHERE b.event_id = e.id) AS booked FROM events e"
        ));
        push_filters(&mut qb, filter);
        qb.push(" ORDER BY e.starts_at ASC, e.id ASC LIMIT ")
            .push_bind(i64::from(page.limit))
            .push(" OFFSET ")
            .push_bind(i64::try_from(page.offset()).unwrap_or(i64::MAX));

        let rows = qb
            .build_query_as::<EventListingRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(map_db_error)?;

        debug!("Listed {} of {} events", rows.len(), total);

        let listings = rows
            .into_iter()
            .map(|row| EventListing {
                event: row.event.into(),
                booked: row.booked,
            })
            .collect();

        Ok((listings, u64::try_from(total).unwrap_or_default()))
    }

    async fn count_bookings(&self, event_id: i64) -> Result<i64, StoreError> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM bookings WHERE event_id = $1")
            .bind(event_id)
            .fetch_one(&self.pool)
            .await
            .map_err(map_db_error)
    }

    async fn lock_event(
        &self,
        id: i64,
        wait: Duration,
    ) -> Result<Option<Box<dyn EventGuard>>, StoreError> {
        let guard = PgEventGuard::acquire(&self.pool, id, wait).await?;
        Ok(guard.map(|g| Box::new(g) as Box<dyn EventGuard>))
    }
}
