use async_trait::async_trait;
use rollcall_core::{Attendee, AttendeeRepository, StoreError};
use sqlx::PgPool;

use crate::database::map_db_error;

pub struct StoreAttendeeRepository {
    pool: PgPool,
}

impl StoreAttendeeRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// Internal struct for type-safe querying
#[derive(sqlx::FromRow)]
struct AttendeeRow {
    id: i64,
    name: String,
    email: String,
}

impl From<AttendeeRow> for Attendee {
    fn from(row: AttendeeRow) -> Self {
        Attendee {
            id: row.id,
            name: row.name,
            email: row.email,
        }
    }
}

#[async_trait]
impl AttendeeRepository for StoreAttendeeRepository {
    async fn insert_attendee(&self, name: &str, email: &str) -> Result<Attendee, StoreError> {
        let row = sqlx::query_as::<_, AttendeeRow>(
            "INSERT INTO attendees (name, email) VALUES ($1, $2) RETURNING id, name, email",
        )
        .bind(name)
        .bind(email)
        .fetch_one(&self.pool)
        .await
        .map_err(map_db_error)?;

        Ok(row.into())
    }

    async fn update_attendee(
        &self,
        id: i64,
        name: &str,
        email: &str,
    ) -> Result<Option<Attendee>, StoreError> {
        let row = sqlx::query_as::<_, AttendeeRow>(
            "UPDATE attendees SET name = $1, email = $2 WHERE id = $3 RETURNING id, name, email",
        )
        .bind(name)
        .bind(email)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_error)?;

        Ok(row.map(Attendee::from))
    }

    async fn find_attendee(&self, id: i64) -> Result<Option<Attendee>, StoreError> {
        let row = sqlx::query_as::<_, AttendeeRow>("SELECT id, name, email FROM attendees WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_db_error)?;

        Ok(row.map(Attendee::from))
    }

    async fn find_attendee_by_email(&self, email: &str) -> Result<Option<Attendee>, StoreError> {
        let row = sqlx::query_as::<_, AttendeeRow>("SELECT id, name, email FROM attendees WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_db_error)?;

        Ok(row.map(Attendee::from))
    }

    async fn list_attendees(&self) -> Result<Vec<Attendee>, StoreError> {
        let rows = sqlx::query_as::<_, AttendeeRow>("SELECT id, name, email FROM attendees ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(map_db_error)?;

        Ok(rows.into_iter().map(Attendee::from).collect())
    }
}
