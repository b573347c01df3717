use std::path::{Path, PathBuf};

use async_trait::async_trait;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use bytes::Bytes;
use uuid::Uuid;

use crate::settings;

const ALLOWED_IMAGE_TYPES: [&str; 4] = ["jpeg", "jpg", "png", "gif"];

#[derive(Debug, thiserror::Error)]
pub enum PhotoStoreError {
    #[error("Could not write photo: {0}")]
    Io(#[from] std::io::Error),
    #[error("Object storage error: {0}")]
    ObjectStore(String),
}

/// Where uploaded photos end up. `put` returns the URL clients use to fetch
/// the stored object.
#[async_trait]
pub trait PhotoStore: Send + Sync + 'static {
    async fn put(
        &self,
        key: &str,
        data: Bytes,
        content_type: &str,
    ) -> Result<String, PhotoStoreError>;
}

pub struct LocalPhotoStore {
    directory: PathBuf,
    public_path: String,
}

impl LocalPhotoStore {
    pub fn new(directory: impl Into<PathBuf>, public_path: &str) -> Self {
        LocalPhotoStore {
            directory: directory.into(),
            public_path: public_path.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl PhotoStore for LocalPhotoStore {
    async fn put(
        &self,
        key: &str,
        data: Bytes,
        _content_type: &str,
    ) -> Result<String, PhotoStoreError> {
        let path = self.directory.join(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, &data).await?;

        log::debug!("Stored {} bytes at {}", data.len(), path.display());

        Ok(format!("{}/{}", self.public_path, key))
    }
}

pub struct S3PhotoStore {
    client: aws_sdk_s3::Client,
    bucket: String,
    region: String,
    endpoint: Option<String>,
}

impl S3PhotoStore {
    pub fn new(config: &settings::S3) -> Self {
        let credentials = Credentials::new(
            config.access_key_id.clone(),
            config.secret_access_key.clone(),
            None,
            None,
            "clientbook-settings",
        );

        let mut builder = aws_sdk_s3::config::Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .credentials_provider(credentials);
        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint.clone()).force_path_style(true);
        }

        S3PhotoStore {
            client: aws_sdk_s3::Client::from_conf(builder.build()),
            bucket: config.bucket.clone(),
            region: config.region.clone(),
            endpoint: config.endpoint.clone(),
        }
    }

    fn object_url(&self, key: &str) -> String {
        match &self.endpoint {
            Some(endpoint) => format!("{}/{}/{}", endpoint.trim_end_matches('/'), self.bucket, key),
            None => format!("https://{}.s3.{}.amazonaws.com/{}", self.bucket, self.region, key),
        }
    }
}

#[async_trait]
impl PhotoStore for S3PhotoStore {
    async fn put(
        &self,
        key: &str,
        data: Bytes,
        content_type: &str,
    ) -> Result<String, PhotoStoreError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(data.into())
            .send()
            .await
            .map_err(|e| PhotoStoreError::ObjectStore(e.to_string()))?;

        Ok(self.object_url(key))
    }
}

/// Checks that both the declared MIME type and the file extension name an
/// allowed image format. Returns the lowercased extension.
pub fn image_extension(file_name: &str, content_type: Option<&str>) -> Option<String> {
    let mime: mime::Mime = content_type?.parse().ok()?;
    if mime.type_() != mime::IMAGE || !ALLOWED_IMAGE_TYPES.contains(&mime.subtype().as_str()) {
        return None;
    }

    let extension = Path::new(file_name)
        .extension()?
        .to_str()?
        .to_ascii_lowercase();
    if !ALLOWED_IMAGE_TYPES.contains(&extension.as_str()) {
        return None;
    }

    Some(extension)
}

pub fn content_type_for(extension: &str) -> &'static str {
    match extension {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        _ => "application/octet-stream",
    }
}

/// Storage key namespaced by client, with a random name so repeated uploads
/// never overwrite each other.
pub fn photo_key(client_id: i32, extension: &str) -> String {
    format!("clients/{}/{}.{}", client_id, Uuid::new_v4().simple(), extension)
}
