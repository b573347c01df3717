use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

pub const DEFAULT_MAX_PHOTO_BYTES: usize = 5 * 1024 * 1024;

#[derive(Debug, Deserialize)]
pub struct Server {
    pub listen: String,
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Postgres,
    Memory,
}

#[derive(Debug, Deserialize)]
pub struct Storage {
    pub backend: StorageBackend,
    #[serde(default)]
    pub seed_sample_data: bool,
}

#[derive(Debug, Deserialize)]
pub struct Postgres {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

#[derive(Clone, Debug, Deserialize)]
pub struct S3 {
    pub bucket: String,
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    /// S3-compatible endpoint, e.g. MinIO. Unset means AWS.
    pub endpoint: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Photos {
    pub directory: String,
    pub public_path: String,
    #[serde(default = "default_max_photo_bytes")]
    pub max_bytes: usize,
    /// Presence of these credentials switches uploads to object storage.
    pub s3: Option<S3>,
}

fn default_max_photo_bytes() -> usize {
    DEFAULT_MAX_PHOTO_BYTES
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub server: Server,
    pub storage: Storage,
    pub postgres: Option<Postgres>,
    pub photos: Photos,
}

impl Settings {
    /// Reads `path`, then lets `CLIENTBOOK_<SECTION>__<KEY>` variables
    /// override individual values.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .set_default("server.listen", "0.0.0.0:5000")?
            .set_default("storage.backend", "postgres")?
            .set_default("photos.directory", "uploads")?
            .set_default("photos.public_path", "/uploads")?
            .add_source(File::with_name(path).required(false))
            .add_source(
                Environment::with_prefix("CLIENTBOOK")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        config.try_deserialize()
    }
}
