use crate::config::DatabaseConfig;
use crate::error::RegistrationError;
use crate::registration::{InsertedRegistration, NewRegistration, Registration};
use crate::repository::RegistrationRepository;
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// Columns selected for a full registration, in struct order
const REGISTRATION_COLUMNS: &str = r#"
    id, name, guardian_name, address, mobile, residency,
    jee_rank, eapcet_rank, board_10th, max_marks_10th,
    marks_obtained_10th, gpa_10th, board_12th, max_marks_12th,
    marks_obtained_12th, percentage_12th, priorities,
    photo, memo_10th, memo_12th, eapcet_hall_ticket,
    eapcet_rank_card, jee_hall_ticket, jee_rank_card, submitted_at
"#;

/// Registration repository backed by PostgreSQL
pub struct PgRegistrationRepository {
    pool: PgPool,
}

impl PgRegistrationRepository {
    /// Create a new repository with connection pool
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.connect_timeout())
            .idle_timeout(Some(config.idle_timeout()))
            .connect(&config.url)
            .await
            .context("Failed to connect to PostgreSQL")?;

        info!("Connected to PostgreSQL database");

        Ok(Self { pool })
    }

    /// Run database migrations
    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run migrations")?;

        info!("Database migrations completed");
        Ok(())
    }
}

#[async_trait]
impl RegistrationRepository for PgRegistrationRepository {
    #[instrument(skip(self, registration), fields(name = %registration.name))]
    async fn insert(
        &self,
        registration: &NewRegistration,
    ) -> Result<InsertedRegistration, RegistrationError> {
        let inserted: InsertedRegistration = sqlx::query_as(
            r#"
            INSERT INTO registrations (
                id, name, guardian_name, address, mobile, residency,
                jee_rank, eapcet_rank, board_10th, max_marks_10th,
                marks_obtained_10th, gpa_10th, board_12th, max_marks_12th,
                marks_obtained_12th, percentage_12th, priorities,
                photo, memo_10th, memo_12th, eapcet_hall_ticket,
                eapcet_rank_card, jee_hall_ticket, jee_rank_card, submitted_at
            ) VALUES (
                $1, $2, $3, $4, $5, $6,
                $7, $8, $9, $10,
                $11, $12, $13, $14,
                $15, $16, $17,
                $18, $19, $20, $21,
                $22, $23, $24, NOW()
            )
            RETURNING id, submitted_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&registration.name)
        .bind(&registration.guardian_name)
        .bind(&registration.address)
        .bind(&registration.mobile)
        .bind(&registration.residency)
        .bind(registration.jee_rank)
        .bind(registration.eapcet_rank)
        .bind(&registration.board_10th)
        .bind(registration.max_marks_10th)
        .bind(registration.marks_obtained_10th)
        .bind(registration.gpa_10th)
        .bind(&registration.board_12th)
        .bind(registration.max_marks_12th)
        .bind(registration.marks_obtained_12th)
        .bind(registration.percentage_12th)
        .bind(&registration.priorities)
        .bind(&registration.photo)
        .bind(&registration.memo_10th)
        .bind(&registration.memo_12th)
        .bind(&registration.eapcet_hall_ticket)
        .bind(&registration.eapcet_rank_card)
        .bind(&registration.jee_hall_ticket)
        .bind(&registration.jee_rank_card)
        .fetch_one(&self.pool)
        .await?;

        debug!(id = %inserted.id, "Registration persisted");

        metrics::counter!("registration.rows_inserted").increment(1);

        Ok(inserted)
    }

    #[instrument(skip(self))]
    async fn fetch(&self, id: Uuid) -> Result<Option<Registration>, RegistrationError> {
        let registration = sqlx::query_as::<_, Registration>(&format!(
            "SELECT {REGISTRATION_COLUMNS} FROM registrations WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(registration)
    }

    #[instrument(skip(self))]
    async fn fetch_all(&self) -> Result<Vec<Registration>, RegistrationError> {
        let registrations = sqlx::query_as::<_, Registration>(&format!(
            "SELECT {REGISTRATION_COLUMNS} FROM registrations ORDER BY seq ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        debug!(count = registrations.len(), "Fetched registrations");

        Ok(registrations)
    }

    async fn ping(&self) -> Result<(), RegistrationError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
