use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rollcall_core::{Booking, Event, EventGuard, StoreError};
use sqlx::{PgPool, Postgres, Transaction};
use tracing::debug;

use crate::database::map_db_error;
use crate::event_repo::{EventRow, EVENT_COLUMNS};

#[derive(sqlx::FromRow)]
struct BookingRow {
    id: i64,
    event_id: i64,
    attendee_id: i64,
    created_at: DateTime<Utc>,
}

impl From<BookingRow> for Booking {
    fn from(row: BookingRow) -> Self {
        Booking {
            id: row.id,
            event_id: row.event_id,
            attendee_id: row.attendee_id,
            created_at: row.created_at,
        }
    }
}

/// An open transaction holding `FOR UPDATE` on one event row.
///
/// Every admission decision and every update or delete of the event runs inside one of
/// these, so the occupancy counted here cannot change until the transaction ends.
/// Dropping the guard rolls the transaction back.
pub struct PgEventGuard {
    tx: Transaction<'static, Postgres>,
    event: Event,
}

impl PgEventGuard {
    pub async fn acquire(pool: &PgPool, id: i64, wait: Duration) -> Result<Option<Self>, StoreError> {
        let mut tx = pool.begin().await.map_err(map_db_error)?;

        // Scoped to this transaction, so the pooled connection is unaffected afterwards.
        let wait_ms = wait.as_millis().max(1);
        sqlx::query("SELECT set_config('lock_timeout', $1, true)")
            .bind(format!("{wait_ms}ms"))
            .execute(&mut *tx)
            .await
            .map_err(map_db_error)?;

        let sql = format!("SELECT {EVENT_COLUMNS} FROM events e WHERE e.id = $1 FOR UPDATE");
        let row = sqlx::query_as::<_, EventRow>(&sql)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(map_db_error)?;

        Ok(row.map(|row| Self { tx, event: row.into() }))
    }
}

#[async_trait]
impl EventGuard for PgEventGuard {
    fn event(&self) -> &Event {
        &self.event
    }

    async fn attendee_exists(&mut self, attendee_id: i64) -> Result<bool, StoreError> {
        sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM attendees WHERE id = $1)")
            .bind(attendee_id)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(map_db_error)
    }

    async fn has_booking(&mut self, attendee_id: i64) -> Result<bool, StoreError> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM bookings WHERE event_id = $1 AND attendee_id = $2)",
        )
        .bind(self.event.id)
        .bind(attendee_id)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(map_db_error)
    }

    async fn booked_count(&mut self) -> Result<i64, StoreError> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM bookings WHERE event_id = $1")
            .bind(self.event.id)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(map_db_error)
    }

    async fn insert_booking(
        &mut self,
        attendee_id: i64,
        created_at: DateTime<Utc>,
    ) -> Result<Booking, StoreError> {
        let row = sqlx::query_as::<_, BookingRow>(
            r#"
            INSERT INTO bookings (event_id, attendee_id, created_at)
            VALUES ($1, $2, $3)
            RETURNING id, event_id, attendee_id, created_at
            "#,
        )
        .bind(self.event.id)
        .bind(attendee_id)
        .bind(created_at)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(map_db_error)?;

        Ok(row.into())
    }

    async fn save_event(&mut self, event: &Event) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE events
            SET title = $1, description = $2, location = $3, capacity = $4, starts_at = $5, ends_at = $6
            WHERE id = $7
            "#,
        )
        .bind(&event.title)
        .bind(&event.description)
        .bind(&event.location)
        .bind(event.capacity)
        .bind(event.starts_at)
        .bind(event.ends_at)
        .bind(self.event.id)
        .execute(&mut *self.tx)
        .await
        .map_err(map_db_error)?;

        self.event = Event { id: self.event.id, ..event.clone() };
        Ok(())
    }

    async fn delete_event(&mut self) -> Result<u64, StoreError> {
        let removed = sqlx::query("DELETE FROM bookings WHERE event_id = $1")
            .bind(self.event.id)
            .execute(&mut *self.tx)
            .await
            .map_err(map_db_error)?
            .rows_affected();

        sqlx::query("DELETE FROM events WHERE id = $1")
            .bind(self.event.id)
            .execute(&mut *self.tx)
            .await
            .map_err(map_db_error)?;

        debug!("Deleted event {} with {} bookings", self.event.id, removed);
        Ok(removed)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await.map_err(map_db_error)
    }
}
