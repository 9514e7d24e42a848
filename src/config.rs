//! Configuration file schema and validation.
//!
//! A run is driven by a small TOML file naming the local directories and
//! the S3 destination; the tag is supplied per-invocation on the CLI
//! instead, since one config commonly drives many backup runs.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::storage::StoreUrl;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub hotbackup_path: PathBuf,
    pub ring_path: PathBuf,
    pub leveled_path: PathBuf,
    pub s3_path: String,
    #[serde(default)]
    pub hints_files: bool,
    pub s3_endpoint: Option<String>,
}

impl Config {
    pub fn load(path: &Path) -> Result<Config> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("cannot read config file {}: {e}", path.display())))?;
        let config: Config = toml::from_str(&text).map_err(|e| Error::config(format!("invalid config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        check_existing_dir("hotbackup_path", &self.hotbackup_path)?;
        check_existing_dir("ring_path", &self.ring_path)?;
        check_existing_dir("leveled_path", &self.leveled_path)?;
        check_s3_url("s3_path", &self.s3_path)?;
        if let Some(endpoint) = &self.s3_endpoint {
            check_endpoint_url("s3_endpoint", endpoint)?;
        }
        Ok(())
    }
}

fn check_existing_dir(field: &str, path: &Path) -> Result<()> {
    if !path.is_dir() {
        return Err(Error::config(format!("{field} is not an existing directory: {}", path.display())));
    }
    Ok(())
}

fn check_s3_url(field: &str, value: &str) -> Result<()> {
    match StoreUrl::parse(value)? {
        StoreUrl::S3 { .. } => Ok(()),
        StoreUrl::Local(_) => Err(Error::config(format!("{field} must be an s3:// url, got {value}"))),
    }
}

fn check_endpoint_url(field: &str, value: &str) -> Result<()> {
    let url = url::Url::parse(value).map_err(|e| Error::config(format!("{field} is not a valid url: {e}")))?;
    if !url.path().is_empty() && url.path() != "/" {
        return Err(Error::config(format!("{field} must not carry a path component: {value}")));
    }
    Ok(())
}

/// A backup tag: `[A-Za-z0-9]+`, validated before it touches any S3 key.
pub fn validate_tag(tag: &str) -> Result<()> {
    if !tag.is_empty() && tag.bytes().all(|b| b.is_ascii_alphanumeric()) {
        Ok(())
    } else {
        Err(Error::config(format!("tag must match [A-Za-z0-9]+, got {tag:?}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(dir: &Path, s3_path: &str) -> PathBuf {
        let hotbackup = dir.join("hotbackup");
        let ring = dir.join("ring");
        let leveled = dir.join("leveled");
        std::fs::create_dir_all(&hotbackup).unwrap();
        std::fs::create_dir_all(&ring).unwrap();
        std::fs::create_dir_all(&leveled).unwrap();

        let path = dir.join("config.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        write!(
            f,
            "hotbackup_path = {:?}\nring_path = {:?}\nleveled_path = {:?}\ns3_path = {:?}\nhints_files = true\n",
            hotbackup.to_str().unwrap(),
            ring.to_str().unwrap(),
            leveled.to_str().unwrap(),
            s3_path,
        )
        .unwrap();
        path
    }

    #[test]
    fn valid_config_loads() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(dir.path(), "s3://my-bucket/backups");
        let config = Config::load(&path).unwrap();
        assert_eq!(config.s3_path, "s3://my-bucket/backups");
        assert!(config.hints_files);
        assert!(config.s3_endpoint.is_none());
    }

    #[test]
    fn non_s3_path_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(dir.path(), "/local/not/s3");
        assert!(Config::load(&path).is_err());
    }

    #[test]
    fn tag_validation() {
        assert!(validate_tag("release42").is_ok());
        assert!(validate_tag("bad tag").is_err());
        assert!(validate_tag("bad/tag").is_err());
        assert!(validate_tag("").is_err());
    }
}
