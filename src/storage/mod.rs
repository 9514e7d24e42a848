//! Storage adapters (C4): a uniform object-store interface over local
//! filesystem paths and `s3://` URLs, plus the random-access byte-source
//! abstraction the CDB reader is built on.

mod local;
mod s3;

pub use local::{ensure_parent_dir, LocalByteSource};
pub use s3::{S3ByteSource, S3Store};

use std::path::Path;

use crate::error::Result;

/// A random-access source of bytes: a local file (pread) or an S3 object
/// (ranged GET). The CDB reader in [`crate::cdb`] depends only on this.
pub trait ByteSource {
    fn len(&self) -> Result<u64>;
    fn read_range(&self, offset: u64, len: u64) -> Result<Vec<u8>>;

    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

impl<T: ByteSource + ?Sized> ByteSource for Box<T> {
    fn len(&self) -> Result<u64> {
        (**self).len()
    }

    fn read_range(&self, offset: u64, len: u64) -> Result<Vec<u8>> {
        (**self).read_range(offset, len)
    }
}

/// A parsed `s3://bucket/key` URL, or a plain local path.
#[derive(Debug, Clone)]
pub enum StoreUrl {
    Local(std::path::PathBuf),
    S3 { bucket: String, key: String },
}

impl StoreUrl {
    pub fn parse(path: &str) -> Result<StoreUrl> {
        if let Some(rest) = path.strip_prefix("s3://") {
            let mut parts = rest.splitn(2, '/');
            let bucket = parts
                .next()
                .filter(|b| !b.is_empty())
                .ok_or_else(|| crate::error::Error::config(format!("invalid s3 url: {path}")))?;
            let key = parts.next().unwrap_or("");
            Ok(StoreUrl::S3 { bucket: bucket.to_string(), key: key.to_string() })
        } else {
            Ok(StoreUrl::Local(std::path::PathBuf::from(path)))
        }
    }

    pub fn is_s3(&self) -> bool {
        matches!(self, StoreUrl::S3 { .. })
    }

    /// Join a relative path component the way `os.path.join` does.
    pub fn join(&self, component: &str) -> String {
        match self {
            StoreUrl::Local(p) => p.join(component).to_string_lossy().into_owned(),
            StoreUrl::S3 { bucket, key } => {
                if key.is_empty() {
                    format!("s3://{bucket}/{component}")
                } else {
                    format!("s3://{bucket}/{}/{component}", key.trim_end_matches('/'))
                }
            }
        }
    }
}

/// Rewrite `filename` (rooted under `source`) to the equivalent path rooted
/// under `destination`, mirroring `os.path.join(destination, os.path.relpath(filename, source))`.
pub fn swap_path(filename: &str, source: &str, destination: &str) -> Result<String> {
    let filename_path = std::path::Path::new(filename);
    let source_path = std::path::Path::new(source);
    let rel = filename_path
        .strip_prefix(source_path)
        .map_err(|_| crate::error::Error::config(format!("{filename} is not rooted under {source}")))?;
    let dest = StoreUrl::parse(destination)?;
    Ok(dest.join(&rel.to_string_lossy()))
}

/// One S3 object version entry, newest first, as returned by `list_versions`.
#[derive(Debug, Clone)]
pub struct ObjectVersion {
    pub version_id: String,
    pub last_modified: chrono::DateTime<chrono::Utc>,
}

/// `head`: a 404 maps to `Ok(false)` rather than an error, per the storage
/// adapter contract.
pub fn exists(url: &str, endpoint: Option<&str>) -> Result<bool> {
    match StoreUrl::parse(url)? {
        StoreUrl::Local(p) => Ok(local::exists(&p)),
        StoreUrl::S3 { bucket, key } => S3Store::new(endpoint)?.exists(&bucket, &key),
    }
}

pub fn upload_bytes(data: Vec<u8>, url: &str, endpoint: Option<&str>) -> Result<Option<String>> {
    match StoreUrl::parse(url)? {
        StoreUrl::Local(p) => {
            ensure_parent_dir(&p)?;
            std::fs::write(p, data)?;
            Ok(None)
        }
        StoreUrl::S3 { bucket, key } => S3Store::new(endpoint)?.upload_bytes(data, &bucket, &key),
    }
}

pub fn upload_file(source: &Path, url: &str, endpoint: Option<&str>) -> Result<Option<String>> {
    match StoreUrl::parse(url)? {
        StoreUrl::Local(p) => {
            ensure_parent_dir(&p)?;
            std::fs::copy(source, p)?;
            Ok(None)
        }
        StoreUrl::S3 { bucket, key } => S3Store::new(endpoint)?.upload_file(source, &bucket, &key),
    }
}

pub fn download_bytes(url: &str, endpoint: Option<&str>, version: Option<&str>) -> Result<Vec<u8>> {
    match StoreUrl::parse(url)? {
        StoreUrl::Local(p) => Ok(std::fs::read(p)?),
        StoreUrl::S3 { bucket, key } => S3Store::new(endpoint)?.download_bytes(&bucket, &key, version),
    }
}

pub fn download_file(url: &str, local_path: &std::path::Path, endpoint: Option<&str>) -> Result<()> {
    match StoreUrl::parse(url)? {
        StoreUrl::Local(p) => {
            ensure_parent_dir(local_path)?;
            std::fs::copy(p, local_path)?;
            Ok(())
        }
        StoreUrl::S3 { bucket, key } => S3Store::new(endpoint)?.download_file(&bucket, &key, local_path, None),
    }
}

pub fn list_versions(url: &str, endpoint: Option<&str>) -> Result<Vec<ObjectVersion>> {
    match StoreUrl::parse(url)? {
        StoreUrl::Local(_) => Ok(Vec::new()),
        StoreUrl::S3 { bucket, key } => S3Store::new(endpoint)?.list_versions(&bucket, &key),
    }
}

/// A random-access [`ByteSource`] for `url`, local or S3.
pub fn byte_source(url: &str, endpoint: Option<&str>) -> Result<Box<dyn ByteSource>> {
    match StoreUrl::parse(url)? {
        StoreUrl::Local(p) => Ok(Box::new(LocalByteSource::open(p))),
        StoreUrl::S3 { bucket, key } => Ok(Box::new(S3ByteSource::new(S3Store::new(endpoint)?, bucket, key))),
    }
}
