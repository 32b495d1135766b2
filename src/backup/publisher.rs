// influxbackup/src/backup/publisher.rs
use aws_sdk_s3 as s3;
use log::info;
use s3::config::Region;
use s3::error::DisplayErrorContext;
use s3::primitives::ByteStream;
use std::fmt;
use tokio::runtime::{Builder as RuntimeBuilder, Runtime};
use url::Url;

use super::key::{HexKeyDeriver, KeyDeriver};
use crate::config::StorageConfig;
use crate::errors::{BackupError, Result};

/// Content type attached to uploaded backup archives.
pub const ARCHIVE_CONTENT_TYPE: &str = "archive/gzip-tar";

/// A payload ready to be stored, with the logical key it should be stored under.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub key: String,
    pub payload: Vec<u8>,
    pub content_type: String,
}

/// Where a published artifact ended up. Opaque to callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locator(String);

impl Locator {
    pub fn new(location: impl Into<String>) -> Self {
        Self(location.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stores artifacts somewhere durable. Either the whole artifact is stored and
/// a locator comes back, or an error does and nothing should be assumed stored.
pub trait Publisher {
    fn publish(&self, artifact: Artifact) -> Result<Locator>;
}

/// Publishes artifacts to an S3-compatible bucket (AWS S3, DigitalOcean Spaces, MinIO).
///
/// The SDK is async; the publisher owns a private current-thread runtime and
/// blocks on each upload, so it must not be used from inside another runtime.
pub struct S3Publisher<K = HexKeyDeriver> {
    client: s3::Client,
    bucket_name: String,
    base_url: Url,
    key_deriver: K,
    runtime: Runtime,
}

impl S3Publisher<HexKeyDeriver> {
    pub fn connect(storage: &StorageConfig) -> Result<Self> {
        Self::with_key_deriver(storage, HexKeyDeriver)
    }
}

impl<K: KeyDeriver> S3Publisher<K> {
    pub fn with_key_deriver(storage: &StorageConfig, key_deriver: K) -> Result<Self> {
        let runtime = RuntimeBuilder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| {
                BackupError::Configuration(format!("failed to start runtime for S3 client: {e}"))
            })?;

        let mut loader = aws_config::defaults(s3::config::BehaviorVersion::latest());
        if let Some(region) = &storage.region {
            loader = loader.region(Region::new(region.clone()));
        }
        if let Some(endpoint_url) = &storage.endpoint_url {
            loader = loader.endpoint_url(endpoint_url);
        }
        if let Some(credentials) = &storage.credentials {
            loader = loader.credentials_provider(s3::config::Credentials::new(
                &credentials.access_key_id,
                &credentials.secret_access_key,
                None,     // session_token
                None,     // expiry
                "Static", // provider_name
            ));
        }
        let sdk_config = runtime.block_on(loader.load());

        let mut s3_config = s3::config::Builder::from(&sdk_config);
        if storage.endpoint_url.is_some() {
            // Custom endpoints rarely support virtual-hosted buckets.
            s3_config = s3_config.force_path_style(true);
        }
        let client = s3::Client::from_conf(s3_config.build());

        let region = sdk_config.region().map(|r| r.as_ref().to_string());
        let base_url = locator_base(
            storage.endpoint_url.as_deref(),
            &storage.bucket_name,
            region.as_deref(),
        )?;

        Ok(Self {
            client,
            bucket_name: storage.bucket_name.clone(),
            base_url,
            key_deriver,
            runtime,
        })
    }
}

impl<K: KeyDeriver> S3Publisher<K> {
    /// Bucket key and public locator for an artifact stored as `logical_key`.
    fn object_location(&self, logical_key: &str) -> Result<(String, Locator)> {
        let key = self.key_deriver.derive_key(logical_key);
        let locator = locator_for(&self.base_url, &key)?;
        Ok((key, locator))
    }
}

impl<K: KeyDeriver> Publisher for S3Publisher<K> {
    fn publish(&self, artifact: Artifact) -> Result<Locator> {
        ensure_payload(&artifact)?;
        let Artifact {
            key: logical_key,
            payload,
            content_type,
        } = artifact;
        let (key, locator) = self.object_location(&logical_key)?;

        info!(
            "Uploading {} bytes to S3 bucket {} with key {}",
            payload.len(),
            self.bucket_name,
            key
        );

        self.runtime
            .block_on(
                self.client
                    .put_object()
                    .bucket(&self.bucket_name)
                    .key(&key)
                    .content_type(content_type)
                    .body(ByteStream::from(payload))
                    .send(),
            )
            .map_err(|err| BackupError::Publish {
                key: logical_key.clone(),
                destination: self.bucket_name.clone(),
                message: DisplayErrorContext(&err).to_string(),
            })?;

        info!(
            "✅ Successfully uploaded {} to S3 bucket {} at {}",
            logical_key, self.bucket_name, locator
        );
        Ok(locator)
    }
}

fn ensure_payload(artifact: &Artifact) -> Result<()> {
    if artifact.payload.is_empty() {
        return Err(BackupError::EmptyPayload {
            key: artifact.key.clone(),
        });
    }
    Ok(())
}

/// Base URL objects of `bucket` are reachable under. Custom endpoints are
/// addressed path-style, AWS itself virtual-hosted style.
fn locator_base(endpoint_url: Option<&str>, bucket: &str, region: Option<&str>) -> Result<Url> {
    let raw = match (endpoint_url, region) {
        (Some(endpoint), _) => format!("{}/{}/", endpoint.trim_end_matches('/'), bucket),
        (None, Some(region)) => format!("https://{bucket}.s3.{region}.amazonaws.com/"),
        (None, None) => format!("https://{bucket}.s3.amazonaws.com/"),
    };
    Url::parse(&raw)
        .map_err(|e| BackupError::Configuration(format!("invalid storage location {raw}: {e}")))
}

fn locator_for(base: &Url, key: &str) -> Result<Locator> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| {
            BackupError::Configuration(format!("storage location {base} cannot hold object keys"))
        })?
        .pop_if_empty()
        .push(key);
    Ok(Locator::new(url))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StaticCredentials;

    // Nothing listens on port 1, so every request fails fast without a network.
    fn unreachable_publisher() -> anyhow::Result<S3Publisher> {
        Ok(S3Publisher::connect(&StorageConfig {
            bucket_name: "test-bucket".to_string(),
            region: Some("us-east-1".to_string()),
            endpoint_url: Some("http://127.0.0.1:1".to_string()),
            credentials: Some(StaticCredentials {
                access_key_id: "AKIDEXAMPLE".to_string(),
                secret_access_key: "secret".to_string(),
            }),
        })?)
    }

    #[test]
    fn failed_upload_reports_logical_key_and_bucket() -> anyhow::Result<()> {
        let publisher = unreachable_publisher()?;

        let err = publisher
            .publish(Artifact {
                key: "dump_1.tar.gz".to_string(),
                payload: vec![0x1f, 0x8b, 0x08],
                content_type: ARCHIVE_CONTENT_TYPE.to_string(),
            })
            .expect_err("nothing is listening on the endpoint");

        match &err {
            BackupError::Publish {
                key, destination, ..
            } => {
                assert_eq!(key, "dump_1.tar.gz");
                assert_eq!(destination, "test-bucket");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.to_string().starts_with(
            "failed to upload item with key dump_1.tar.gz to bucket test-bucket"
        ));
        Ok(())
    }

    #[test]
    fn locator_points_at_derived_key() -> anyhow::Result<()> {
        let publisher = unreachable_publisher()?;

        let (key, locator) = publisher.object_location("dump_1.tar.gz")?;

        assert_eq!(key, "64756d70_dump_1.tar.gz");
        assert_eq!(
            locator.as_str(),
            "http://127.0.0.1:1/test-bucket/64756d70_dump_1.tar.gz"
        );
        Ok(())
    }

    #[test]
    fn empty_payload_never_reaches_the_bucket() -> anyhow::Result<()> {
        let publisher = unreachable_publisher()?;

        let err = publisher
            .publish(Artifact {
                key: "dump_1.tar.gz".to_string(),
                payload: Vec::new(),
                content_type: ARCHIVE_CONTENT_TYPE.to_string(),
            })
            .expect_err("empty payload");

        assert!(matches!(err, BackupError::EmptyPayload { .. }));
        Ok(())
    }

    #[test]
    fn aws_locator_is_virtual_hosted() -> anyhow::Result<()> {
        let base = locator_base(None, "my-bucket", Some("eu-central-1"))?;
        let locator = locator_for(&base, "64756d70_dump_20240101120000.tar.gz")?;
        assert_eq!(
            locator.as_str(),
            "https://my-bucket.s3.eu-central-1.amazonaws.com/64756d70_dump_20240101120000.tar.gz"
        );
        Ok(())
    }

    #[test]
    fn aws_locator_without_region_uses_global_endpoint() -> anyhow::Result<()> {
        let base = locator_base(None, "my-bucket", None)?;
        let locator = locator_for(&base, "6b6579_key")?;
        assert_eq!(locator.as_str(), "https://my-bucket.s3.amazonaws.com/6b6579_key");
        Ok(())
    }

    #[test]
    fn custom_endpoint_locator_is_path_style() -> anyhow::Result<()> {
        let base = locator_base(Some("https://nyc3.digitaloceanspaces.com/"), "backups", None)?;
        let locator = locator_for(&base, "6b6579_key")?;
        assert_eq!(
            locator.as_str(),
            "https://nyc3.digitaloceanspaces.com/backups/6b6579_key"
        );
        Ok(())
    }

    #[test]
    fn invalid_endpoint_is_a_configuration_error() {
        let err = locator_base(Some("not a url"), "backups", None).expect_err("invalid endpoint");
        assert!(matches!(err, BackupError::Configuration(_)));
    }

    #[test]
    fn empty_payload_is_rejected_with_key() {
        let artifact = Artifact {
            key: "dump_20240101120000.tar.gz".to_string(),
            payload: Vec::new(),
            content_type: ARCHIVE_CONTENT_TYPE.to_string(),
        };
        let err = ensure_payload(&artifact).expect_err("empty payload");
        assert!(err.to_string().contains("dump_20240101120000.tar.gz"));
    }

    #[test]
    fn locator_displays_as_its_location() {
        let locator = Locator::new("https://some.aws.url/snapshot/key");
        assert_eq!(locator.to_string(), "https://some.aws.url/snapshot/key");
    }
}
