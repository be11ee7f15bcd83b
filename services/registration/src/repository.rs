use crate::error::RegistrationError;
use crate::registration::{InsertedRegistration, NewRegistration, Registration};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use tracing::debug;
use uuid::Uuid;

/// Persistence backend behind the record store
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RegistrationRepository: Send + Sync {
    /// Persist a validated registration, assigning its id and timestamp
    async fn insert(
        &self,
        registration: &NewRegistration,
    ) -> Result<InsertedRegistration, RegistrationError>;

    /// Fetch one registration by id
    async fn fetch(&self, id: Uuid) -> Result<Option<Registration>, RegistrationError>;

    /// Fetch every registration in insertion order
    async fn fetch_all(&self) -> Result<Vec<Registration>, RegistrationError>;

    /// Check that the backend is reachable
    async fn ping(&self) -> Result<(), RegistrationError>;
}

/// Process-local repository for development and tests
#[derive(Default)]
pub struct InMemoryRegistrationRepository {
    records: RwLock<Vec<Registration>>,
}

impl InMemoryRegistrationRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[async_trait]
impl RegistrationRepository for InMemoryRegistrationRepository {
    async fn insert(
        &self,
        registration: &NewRegistration,
    ) -> Result<InsertedRegistration, RegistrationError> {
        let inserted = InsertedRegistration {
            id: Uuid::new_v4(),
            submitted_at: Utc::now(),
        };

        self.records
            .write()
            .push(Registration::from_new(inserted, registration.clone()));

        debug!(id = %inserted.id, "Stored registration in memory");
        Ok(inserted)
    }

    async fn fetch(&self, id: Uuid) -> Result<Option<Registration>, RegistrationError> {
        Ok(self.records.read().iter().find(|r| r.id == id).cloned())
    }

    async fn fetch_all(&self) -> Result<Vec<Registration>, RegistrationError> {
        Ok(self.records.read().clone())
    }

    async fn ping(&self) -> Result<(), RegistrationError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::RegistrationSchema;
    use crate::test_support::valid_form;

    #[tokio::test]
    async fn test_insert_then_fetch() {
        let repository = InMemoryRegistrationRepository::new();
        let new = RegistrationSchema::standard().validate(&valid_form()).unwrap();

        let inserted = repository.insert(&new).await.unwrap();
        let stored = repository.fetch(inserted.id).await.unwrap().unwrap();

        assert_eq!(stored.id, inserted.id);
        assert_eq!(stored.submitted_at, inserted.submitted_at);
        assert_eq!(stored.name, new.name);
        assert_eq!(stored.memo_12th.as_deref(), Some(new.memo_12th.as_slice()));
        assert!(repository.fetch(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_fetch_all_keeps_insertion_order() {
        let repository = InMemoryRegistrationRepository::new();
        let schema = RegistrationSchema::standard();

        let mut ids = Vec::new();
        for name in ["First", "Second", "Third"] {
            let new = schema.validate(&valid_form().with_text("name", name)).unwrap();
            ids.push(repository.insert(&new).await.unwrap().id);
        }

        let all = repository.fetch_all().await.unwrap();
        assert_eq!(all.iter().map(|r| r.id).collect::<Vec<_>>(), ids);
        assert_eq!(all[2].name, "Third");
        assert_eq!(repository.len(), 3);
        assert!(repository.ping().await.is_ok());
    }
}
