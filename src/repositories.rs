use async_trait::async_trait;

use crate::models::clients::{Client, ClientListParams, ClientUpdate, NewClient};
use crate::models::query::ListPage;
use crate::models::visits::{NewVisit, Visit, VisitListParams, VisitUpdate};

pub mod memory;
pub mod postgres;
pub mod sample;

pub use memory::MemStorage;
pub use postgres::PgStorage;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Client {0} does not exist")]
    MissingClient(i32),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Persistence boundary for clients and their visits.
///
/// `get`/`update` return `Ok(None)` for unknown ids and `delete` returns
/// `Ok(false)`; errors are reserved for backend failures and broken
/// references.
#[async_trait]
pub trait Storage: Send + Sync + 'static {
    async fn get_client(&self, id: i32) -> Result<Option<Client>, StorageError>;

    async fn list_clients(&self, params: &ClientListParams)
        -> Result<ListPage<Client>, StorageError>;

    async fn create_client(&self, client: NewClient) -> Result<Client, StorageError>;

    async fn update_client(
        &self,
        id: i32,
        changes: ClientUpdate,
    ) -> Result<Option<Client>, StorageError>;

    /// Removes the client and every visit recorded for it.
    async fn delete_client(&self, id: i32) -> Result<bool, StorageError>;

    async fn get_visit(&self, id: i32) -> Result<Option<Visit>, StorageError>;

    async fn list_visits(&self, params: &VisitListParams) -> Result<ListPage<Visit>, StorageError>;

    async fn create_visit(&self, visit: NewVisit) -> Result<Visit, StorageError>;

    async fn update_visit(
        &self,
        id: i32,
        changes: VisitUpdate,
    ) -> Result<Option<Visit>, StorageError>;

    async fn delete_visit(&self, id: i32) -> Result<bool, StorageError>;
}
