use crate::config::{DatabaseConfig, StoreBackend};
use crate::error::RegistrationError;
use crate::pg_repository::PgRegistrationRepository;
use crate::registration::{InsertedRegistration, Registration};
use crate::repository::{InMemoryRegistrationRepository, RegistrationRepository};
use crate::schema::RegistrationSchema;
use crate::submission::SubmissionForm;
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Create, fetch and enumerate registrations
#[derive(Clone)]
pub struct RecordStore {
    schema: Arc<RegistrationSchema>,
    repository: Arc<dyn RegistrationRepository>,
}

impl RecordStore {
    pub fn new(schema: Arc<RegistrationSchema>, repository: Arc<dyn RegistrationRepository>) -> Self {
        Self { schema, repository }
    }

    pub fn schema(&self) -> &RegistrationSchema {
        &self.schema
    }

    /// Validate a submission and persist it
    #[instrument(skip(self, form), fields(applicant = form.applicant_name().unwrap_or_default()))]
    pub async fn create(
        &self,
        form: &SubmissionForm,
    ) -> Result<InsertedRegistration, RegistrationError> {
        let registration = self.schema.validate(form).map_err(|e| {
            warn!(field = e.field().unwrap_or_default(), error = %e, "Rejected registration");
            metrics::counter!("registration.validation_rejected").increment(1);
            e
        })?;

        let inserted = self.repository.insert(&registration).await?;

        info!(id = %inserted.id, "Registration created");
        metrics::counter!("registration.created").increment(1);

        Ok(inserted)
    }

    #[instrument(skip(self))]
    pub async fn get(&self, id: Uuid) -> Result<Registration, RegistrationError> {
        self.repository
            .fetch(id)
            .await?
            .ok_or_else(|| RegistrationError::NotFound("Registration".to_string()))
    }

    /// Every stored registration in insertion order
    pub async fn list(&self) -> Result<Vec<Registration>, RegistrationError> {
        self.repository.fetch_all().await
    }

    pub async fn ping(&self) -> Result<(), RegistrationError> {
        self.repository.ping().await
    }
}

/// Open the configured repository backend, running migrations if enabled
pub async fn open_repository(config: &DatabaseConfig) -> Result<Arc<dyn RegistrationRepository>> {
    match config.backend {
        StoreBackend::Postgres => {
            let repository = PgRegistrationRepository::new(config)
                .await
                .context("Failed to initialize registration repository")?;

            if config.run_migrations {
                repository
                    .run_migrations()
                    .await
                    .context("Failed to run database migrations")?;
            }

            Ok(Arc::new(repository))
        }
        StoreBackend::Memory => {
            warn!("Using in-memory registration store; records are lost on restart");
            Ok(Arc::new(InMemoryRegistrationRepository::new()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::MockRegistrationRepository;
    use crate::schema::AttachmentField;
    use crate::test_support::{memory_store, valid_form, PNG_1X1};

    #[tokio::test]
    async fn test_create_then_get_round_trips_attachments() {
        let store = memory_store();
        let form = valid_form()
            .with_text("jeeRank", "1520")
            .with_attachment(AttachmentField::Photo, PNG_1X1.to_vec())
            .with_priorities(vec!["CSE".to_string(), String::new(), "ECE".to_string()]);

        let inserted = store.create(&form).await.unwrap();
        let stored = store.get(inserted.id).await.unwrap();

        assert_eq!(stored.id, inserted.id);
        assert_eq!(stored.jee_rank, Some(1520.0));
        assert_eq!(stored.attachment(AttachmentField::Photo), Some(PNG_1X1));
        assert_eq!(
            stored.attachment(AttachmentField::Memo12th),
            form.attachment(AttachmentField::Memo12th)
        );
        assert_eq!(stored.attachment(AttachmentField::JeeRankCard), None);
        assert_eq!(stored.priorities, ["CSE", "", "ECE"]);
    }

    #[tokio::test]
    async fn test_invalid_submission_is_not_persisted() {
        let store = memory_store();
        let form = valid_form().with_text("percentage12th", "ninety");

        let err = store.create(&form).await.unwrap_err();
        assert_eq!(err.field(), Some("percentage12th"));
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_submission_never_reaches_repository() {
        let mut repository = MockRegistrationRepository::new();
        repository.expect_insert().never();

        let store = RecordStore::new(
            Arc::new(RegistrationSchema::standard()),
            Arc::new(repository),
        );
        let err = store.create(&valid_form().with_text("name", "")).await.unwrap_err();
        assert_eq!(err.field(), Some("name"));
    }

    #[tokio::test]
    async fn test_backend_failure_is_persistence_error() {
        let mut repository = MockRegistrationRepository::new();
        repository
            .expect_insert()
            .times(1)
            .returning(|_| Err(RegistrationError::Persistence(sqlx::Error::PoolTimedOut)));

        let store = RecordStore::new(
            Arc::new(RegistrationSchema::standard()),
            Arc::new(repository),
        );
        let err = store.create(&valid_form()).await.unwrap_err();
        assert!(matches!(err, RegistrationError::Persistence(_)));
    }

    #[tokio::test]
    async fn test_unknown_id_is_not_found() {
        let store = memory_store();
        let err = store.get(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, RegistrationError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_memory_backend_opens_without_database() {
        let config = DatabaseConfig {
            backend: StoreBackend::Memory,
            ..Default::default()
        };
        let repository = open_repository(&config).await.unwrap();
        assert!(repository.ping().await.is_ok());
        assert!(repository.fetch_all().await.unwrap().is_empty());
    }
}
