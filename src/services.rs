use std::sync::Arc;

use anyhow::Context;

use crate::models::ValidationError;
use crate::repositories::{sample, MemStorage, PgStorage, Storage, StorageError};
use crate::settings::{Settings, StorageBackend};

pub mod http;
pub mod photos;

use photos::{LocalPhotoStore, PhotoStore, S3PhotoStore};

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Upload(String),
    /// `context` is returned to the caller; `details` only reaches the log.
    #[error("{context}: {details}")]
    Storage { context: String, details: String },
}

impl ServiceError {
    pub fn not_found(what: &str) -> Self {
        ServiceError::NotFound(format!("{} not found", what))
    }

    pub fn storage(context: &str, error: impl std::fmt::Display) -> Self {
        ServiceError::Storage {
            context: context.to_string(),
            details: error.to_string(),
        }
    }

    /// Maps a storage failure, turning a dangling client reference into 404.
    pub fn from_storage(context: &str, error: StorageError) -> Self {
        match error {
            StorageError::MissingClient(_) => ServiceError::not_found("Client"),
            other => ServiceError::storage(context, other),
        }
    }
}

impl From<ValidationError> for ServiceError {
    fn from(error: ValidationError) -> Self {
        ServiceError::Validation(error.0)
    }
}

async fn build_storage(settings: &Settings) -> Result<Arc<dyn Storage>, anyhow::Error> {
    let storage: Arc<dyn Storage> = match settings.storage.backend {
        StorageBackend::Postgres => {
            let postgres = settings
                .postgres
                .as_ref()
                .context("storage.backend is postgres but no [postgres] section is configured")?;
            let storage = PgStorage::connect(&postgres.url, postgres.max_connections)
                .await
                .context("Could not connect to database.")?;
            log::info!("Using PostgreSQL storage.");
            Arc::new(storage)
        }
        StorageBackend::Memory => {
            log::warn!("Using in-memory storage; data is lost on restart.");
            Arc::new(MemStorage::new())
        }
    };

    if settings.storage.seed_sample_data {
        let seeded = sample::seed_sample_data(storage.as_ref()).await?;
        log::info!("Seeded {} sample clients.", seeded);
    }

    Ok(storage)
}

fn build_photo_store(settings: &Settings) -> Arc<dyn PhotoStore> {
    match &settings.photos.s3 {
        Some(s3) => {
            log::info!("Storing client photos in bucket {}.", s3.bucket);
            Arc::new(S3PhotoStore::new(s3))
        }
        None => {
            log::info!("Storing client photos under {}.", settings.photos.directory);
            Arc::new(LocalPhotoStore::new(
                &settings.photos.directory,
                &settings.photos.public_path,
            ))
        }
    }
}

pub async fn start_services(settings: Settings) -> Result<(), anyhow::Error> {
    let storage = build_storage(&settings).await?;
    let photo_store = build_photo_store(&settings);

    let state = http::AppState {
        storage,
        photo_store,
        max_photo_bytes: settings.photos.max_bytes,
    };

    // Only locally stored photos need serving from here.
    let static_photos = settings.photos.s3.is_none().then(|| http::StaticPhotos {
        public_path: settings.photos.public_path.clone(),
        directory: settings.photos.directory.clone().into(),
    });

    http::start_http_server(state, static_photos, &settings.server.listen).await
}
