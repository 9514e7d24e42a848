//! S3-backed storage adapter: a thin synchronous facade over `aws-sdk-s3`.
//!
//! This crate's core is entirely synchronous; rather than thread async/await
//! through every manifest/journal sync function, each [`S3Client`] owns a
//! small dedicated Tokio runtime and blocks on it per call, the way a
//! `boto3` client blocks per call. Construction is cheap and per-operation.

use std::path::Path;

use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use tokio::runtime::Runtime;

use crate::error::{Error, Result};

use super::{ByteSource, ObjectVersion};

pub struct S3Store {
    client: Client,
    rt: Runtime,
}

impl S3Store {
    pub fn new(endpoint: Option<&str>) -> Result<Self> {
        let rt = Runtime::new().map_err(Error::from)?;
        let client = rt.block_on(async {
            let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
            if let Some(endpoint) = endpoint {
                loader = loader.endpoint_url(endpoint);
            }
            let config = loader.load().await;
            Client::new(&config)
        });
        Ok(S3Store { client, rt })
    }

    pub fn exists(&self, bucket: &str, key: &str) -> Result<bool> {
        let result = self.rt.block_on(self.client.head_object().bucket(bucket).key(key).send());
        match result {
            Ok(_) => Ok(true),
            Err(err) => {
                if err.as_service_error().map(|e| e.is_not_found()).unwrap_or(false) {
                    Ok(false)
                } else {
                    Err(Error::Io(std::io::Error::new(std::io::ErrorKind::Other, err.to_string())))
                }
            }
        }
    }

    pub fn upload_bytes(&self, data: Vec<u8>, bucket: &str, key: &str) -> Result<Option<String>> {
        let out = self.rt.block_on(
            self.client
                .put_object()
                .bucket(bucket)
                .key(key)
                .body(ByteStream::from(data))
                .send(),
        );
        let out = out.map_err(|e| Error::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string())))?;
        Ok(out.version_id().map(|s| s.to_string()))
    }

    pub fn upload_file(&self, source: &Path, bucket: &str, key: &str) -> Result<Option<String>> {
        let data = std::fs::read(source)?;
        self.upload_bytes(data, bucket, key)
    }

    pub fn download_bytes(&self, bucket: &str, key: &str, version: Option<&str>) -> Result<Vec<u8>> {
        let mut req = self.client.get_object().bucket(bucket).key(key);
        if let Some(v) = version {
            req = req.version_id(v);
        }
        let out = self
            .rt
            .block_on(req.send())
            .map_err(|e| Error::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string())))?;
        let bytes = self
            .rt
            .block_on(out.body.collect())
            .map_err(|e| Error::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string())))?;
        Ok(bytes.into_bytes().to_vec())
    }

    pub fn download_file(&self, bucket: &str, key: &str, local_path: &Path, version: Option<&str>) -> Result<()> {
        let data = self.download_bytes(bucket, key, version)?;
        super::local::ensure_parent_dir(local_path)?;
        std::fs::write(local_path, data)?;
        Ok(())
    }

    pub fn list_versions(&self, bucket: &str, prefix: &str) -> Result<Vec<ObjectVersion>> {
        let out = self
            .rt
            .block_on(self.client.list_object_versions().bucket(bucket).prefix(prefix).send())
            .map_err(|e| Error::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string())))?;
        let mut versions: Vec<ObjectVersion> = out
            .versions()
            .iter()
            .filter_map(|v| {
                let version_id = v.version_id()?.to_string();
                let last_modified = v
                    .last_modified()
                    .and_then(|d| chrono::DateTime::from_timestamp(d.secs(), 0))
                    .unwrap_or_default();
                Some(ObjectVersion { version_id, last_modified })
            })
            .collect();
        versions.sort_by(|a, b| b.last_modified.cmp(&a.last_modified));
        Ok(versions)
    }

    fn range_get(&self, bucket: &str, key: &str, start: u64, end_inclusive: u64) -> Result<Vec<u8>> {
        let range = format!("bytes={start}-{end_inclusive}");
        let out = self
            .rt
            .block_on(self.client.get_object().bucket(bucket).key(key).range(range).send())
            .map_err(|e| Error::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string())))?;
        let bytes = self
            .rt
            .block_on(out.body.collect())
            .map_err(|e| Error::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string())))?;
        Ok(bytes.into_bytes().to_vec())
    }

    fn head_len(&self, bucket: &str, key: &str) -> Result<u64> {
        let out = self
            .rt
            .block_on(self.client.head_object().bucket(bucket).key(key).send())
            .map_err(|e| Error::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string())))?;
        Ok(out.content_length().unwrap_or(0) as u64)
    }
}

/// Adapts an S3 object to the [`ByteSource`] interface via byte-range GETs,
/// with no local cache — each `read_range` call is its own request.
pub struct S3ByteSource {
    store: S3Store,
    bucket: String,
    key: String,
}

impl S3ByteSource {
    pub fn new(store: S3Store, bucket: impl Into<String>, key: impl Into<String>) -> Self {
        S3ByteSource { store, bucket: bucket.into(), key: key.into() }
    }
}

impl ByteSource for S3ByteSource {
    fn len(&self) -> Result<u64> {
        self.store.head_len(&self.bucket, &self.key)
    }

    fn read_range(&self, offset: u64, len: u64) -> Result<Vec<u8>> {
        if len == 0 {
            return Ok(Vec::new());
        }
        self.store.range_get(&self.bucket, &self.key, offset, offset + len - 1)
    }
}
