//! S3-compatible object store (MinIO in the default deployment).
//!
//! Uses path-style addressing and static credentials, which is what MinIO
//! expects out of the box.

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;

use crate::error::StoreError;
use crate::object_store::ObjectStore;

/// Name reported for the static credentials provider.
const CREDENTIALS_PROVIDER: &str = "busalert-static";

/// Connection settings for an S3-compatible endpoint.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Full endpoint URL, e.g. `http://localhost:9000`.
    pub endpoint: String,
    pub access_key: String,
    pub secret_key: String,
    pub bucket: String,
    pub region: String,
}

impl StoreConfig {
    /// Read the `MINIO_*` variables through `lookup`, with local-MinIO
    /// defaults.
    ///
    /// | Env Var            | Default          |
    /// |--------------------|------------------|
    /// | `MINIO_ENDPOINT`   | `localhost:9000` |
    /// | `MINIO_ACCESS_KEY` | `minioadmin`     |
    /// | `MINIO_SECRET_KEY` | `minioadmin`     |
    /// | `MINIO_BUCKET`     | `bus-alerts`     |
    /// | `MINIO_REGION`     | `us-east-1`      |
    /// | `MINIO_SECURE`     | `false`          |
    ///
    /// A bare `host:port` endpoint gets `http://`, or `https://` when
    /// `MINIO_SECURE` is `true`, `1` or `yes`.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str, default: &str| lookup(name).unwrap_or_else(|| default.to_string());
        let secure = matches!(
            var("MINIO_SECURE", "false").trim().to_ascii_lowercase().as_str(),
            "true" | "1" | "yes"
        );

        Self {
            endpoint: normalize_endpoint(&var("MINIO_ENDPOINT", "localhost:9000"), secure),
            access_key: var("MINIO_ACCESS_KEY", "minioadmin"),
            secret_key: var("MINIO_SECRET_KEY", "minioadmin"),
            bucket: var("MINIO_BUCKET", "bus-alerts"),
            region: var("MINIO_REGION", "us-east-1"),
        }
    }
}

fn normalize_endpoint(raw: &str, secure: bool) -> String {
    let raw = raw.trim().trim_end_matches('/');
    if raw.contains("://") {
        raw.to_string()
    } else if secure {
        format!("https://{raw}")
    } else {
        format!("http://{raw}")
    }
}

/// [`ObjectStore`] over a single S3 bucket.
pub struct S3Store {
    client: aws_sdk_s3::Client,
    bucket: String,
}

fn request_error<E>(err: E) -> StoreError
where
    E: std::error::Error + 'static,
{
    StoreError::Request(DisplayErrorContext(err).to_string())
}

impl S3Store {
    /// Build a client for `config`. No request is made until first use.
    pub async fn connect(config: &StoreConfig) -> Self {
        let credentials = Credentials::new(
            config.access_key.clone(),
            config.secret_key.clone(),
            None,
            None,
            CREDENTIALS_PROVIDER,
        );

        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .endpoint_url(config.endpoint.clone())
            .credentials_provider(credentials)
            .load()
            .await;

        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(true)
            .build();

        tracing::info!(
            endpoint = %config.endpoint,
            bucket = %config.bucket,
            "Object store client configured",
        );

        Self {
            client: aws_sdk_s3::Client::from_conf(s3_config),
            bucket: config.bucket.clone(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Create the bucket if it does not exist yet.
    ///
    /// Losing a creation race to another process is not an error.
    pub async fn ensure_bucket(&self) -> Result<(), StoreError> {
        match self.client.head_bucket().bucket(&self.bucket).send().await {
            Ok(_) => return Ok(()),
            Err(e) if e.as_service_error().is_some_and(|se| se.is_not_found()) => {}
            Err(e) => return Err(request_error(e)),
        }

        match self.client.create_bucket().bucket(&self.bucket).send().await {
            Ok(_) => {
                tracing::info!(bucket = %self.bucket, "Created bucket");
                Ok(())
            }
            Err(e)
                if e.as_service_error().is_some_and(|se| {
                    se.is_bucket_already_owned_by_you() || se.is_bucket_already_exists()
                }) =>
            {
                Ok(())
            }
            Err(e) => Err(request_error(e)),
        }
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn put(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<(), StoreError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(request_error)?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        let output = match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(output) => output,
            Err(e) if e.as_service_error().is_some_and(|se| se.is_no_such_key()) => {
                return Err(StoreError::NotFound {
                    key: key.to_string(),
                });
            }
            Err(e) => return Err(request_error(e)),
        };

        let data = output.body.collect().await.map_err(request_error)?;
        Ok(data.into_bytes().to_vec())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(prefix)
            .into_paginator()
            .send();

        let mut keys = Vec::new();
        while let Some(page) = pages.next().await {
            let page = page.map_err(request_error)?;
            keys.extend(
                page.contents()
                    .iter()
                    .filter_map(|object| object.key().map(str::to_string)),
            );
        }
        Ok(keys)
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(request_error)?;
        Ok(())
    }
}
