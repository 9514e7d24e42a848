//! Manifest sync (C7): per-partition journal manifests, and the top-level
//! `MANIFESTS` history object that records every uploaded manifest version.

use std::path::Path;

use log::debug;

use crate::cdb::CdbReader;
use crate::error::{Error, Result};
use crate::etf::{self, Term};
use crate::storage::{self, LocalByteSource};

/// A journal manifest: an ordered list of `(start_sqn, base_path, owner_pid,
/// last_key)` entries, newest first. Entries are kept as raw [`Term`]s so
/// that fields this crate never interprets (`owner_pid`, `last_key`) survive
/// a read/rewrite/write round trip bit-identically.
#[derive(Debug, Clone)]
pub struct Manifest {
    pub entries: Vec<Term>,
}

fn entry_fields(entry: &Term) -> Result<&[Term]> {
    entry
        .as_tuple()
        .filter(|f| f.len() == 4)
        .ok_or_else(|| Error::parse("manifest entry is not a 4-tuple"))
}

pub fn entry_start_sqn(entry: &Term) -> Result<i64> {
    entry_fields(entry)?[0]
        .as_i64()
        .ok_or_else(|| Error::parse("manifest entry start_sqn is not an integer"))
}

pub fn entry_base_path(entry: &Term) -> Result<String> {
    let bytes = entry_fields(entry)?[1]
        .as_binary()
        .ok_or_else(|| Error::parse("manifest entry base_path is not a binary"))?;
    String::from_utf8(bytes.to_vec()).map_err(|_| Error::parse("manifest entry base_path is not valid utf-8"))
}

pub fn entry_last_key(entry: &Term) -> Result<&Term> {
    Ok(&entry_fields(entry)?[3])
}

/// Rewrite field 1 (`base_path`) of a manifest entry from a `source`-rooted
/// path to a `destination`-rooted one, leaving the other three fields
/// untouched.
pub fn update_journal_filename(entry: &Term, source: &str, destination: &str) -> Result<Term> {
    let fields = entry_fields(entry)?;
    let base_path = entry_base_path(entry)?;
    let rewritten = storage::swap_path(&base_path, source, destination)?;
    Ok(Term::tuple(vec![
        fields[0].clone(),
        Term::binary(rewritten.into_bytes()),
        fields[2].clone(),
        fields[3].clone(),
    ]))
}

fn decode_manifest_term(term: Term) -> Result<Manifest> {
    let entries = term
        .as_list()
        .ok_or_else(|| Error::parse("manifest is not a list"))?
        .to_vec();
    Ok(Manifest { entries })
}

/// Read a manifest from a local path or `s3://...` URL, optionally pinned
/// to a specific object-store version.
pub fn read_manifest(source: &str, version: Option<&str>, endpoint: Option<&str>) -> Result<Manifest> {
    if version.is_none() && !storage::exists(source, endpoint)? {
        return Err(Error::not_found("Could not open journal manifest. Check provided TAG or s3_path."));
    }
    let bytes = if let Some(version) = version {
        match crate::storage::StoreUrl::parse(source)? {
            crate::storage::StoreUrl::S3 { .. } => download_versioned(source, version, endpoint)?,
            crate::storage::StoreUrl::Local(_) => storage::download_bytes(source, endpoint, None)?,
        }
    } else {
        storage::download_bytes(source, endpoint, None)?
    };
    decode_manifest_term(etf::decode(&bytes)?)
}

fn download_versioned(url: &str, version: &str, endpoint: Option<&str>) -> Result<Vec<u8>> {
    match crate::storage::StoreUrl::parse(url)? {
        crate::storage::StoreUrl::S3 { bucket, key } => {
            crate::storage::S3Store::new(endpoint)?.download_bytes(&bucket, &key, Some(version))
        }
        crate::storage::StoreUrl::Local(_) => storage::download_bytes(url, endpoint, None),
    }
}

/// Write a manifest to a local path, compressed-wrapper ETF, creating any
/// missing parent directories.
pub fn save_local_manifest(manifest: &Manifest, path: &Path) -> Result<()> {
    crate::storage::ensure_parent_dir(path)?;
    let term = Term::proper_list(manifest.entries.clone());
    let bytes = etf::encode(&term, Some(6))?;
    std::fs::write(path, bytes)?;
    Ok(())
}

/// Upload `manifest` to `{destination}/{partition}/journal/journal_manifest/{tag}.man`,
/// returning the URL and, if the store is versioned, the resulting version id.
pub fn upload_new_manifest(
    manifest: &Manifest,
    partition: &num_bigint::BigInt,
    destination: &str,
    tag: &str,
    endpoint: Option<&str>,
) -> Result<(String, Option<String>)> {
    let term = Term::proper_list(manifest.entries.clone());
    let bytes = etf::encode(&term, Some(6))?;
    let url = format!("{destination}/{partition}/journal/journal_manifest/{tag}.man");
    let version_id = storage::upload_bytes(bytes, &url, endpoint)?;
    Ok((url, version_id))
}

/// Build a hints CDB for the journal at `journal_path`, leaving it for the
/// caller to upload and then remove.
fn build_hints_file(journal_path: &Path, hints_path: &Path) -> Result<()> {
    let reader = CdbReader::new(LocalByteSource::open(journal_path));
    let keys = reader.keys()?;
    crate::hints::create_hints_file(hints_path, &keys)
}

/// Upload a partition's journal (and, if requested, a freshly built hints
/// CDB) to `dest`, unless it is already present there (idempotent).
pub fn maybe_upload_journal(
    entry: &Term,
    source: &str,
    dest: &str,
    build_hints: bool,
    endpoint: Option<&str>,
) -> Result<()> {
    let base_path = entry_base_path(entry)?;
    let journal_file = format!("{base_path}.cdb");
    let dest_url = storage::swap_path(&journal_file, source, dest)?;

    if storage::exists(&dest_url, endpoint)? {
        debug!("journal already present at {dest_url}, skipping upload");
        return Ok(());
    }

    if build_hints {
        let hints_local = Path::new(&format!("{base_path}.hints.cdb")).to_path_buf();
        build_hints_file(Path::new(&journal_file), &hints_local)?;
        let hints_dest = storage::swap_path(hints_local.to_string_lossy().as_ref(), source, dest)?;
        storage::upload_file(&hints_local, &hints_dest, endpoint)?;
        std::fs::remove_file(&hints_local)?;
    }

    storage::upload_file(Path::new(&journal_file), &dest_url, endpoint)?;
    Ok(())
}

/// Download a partition's journal from `source` to `dest` unless a local
/// copy already exists; an existing local file is never overwritten.
/// `entry.base_path` is already rooted under `source` (the manifest was
/// read back from the tagged S3 copy, whose paths were rewritten at
/// backup time).
pub fn maybe_download_journal(entry: &Term, source: &str, dest: &str, endpoint: Option<&str>) -> Result<()> {
    let base_path = entry_base_path(entry)?;
    let journal_source_url = format!("{base_path}.cdb");
    let journal_local_path = storage::swap_path(&journal_source_url, source, dest)?;
    let local_path = Path::new(&journal_local_path);

    if local_path.exists() {
        debug!("local journal already present at {journal_local_path}, skipping download");
        return Ok(());
    }

    crate::storage::ensure_parent_dir(local_path)?;
    storage::download_file(&journal_source_url, local_path, endpoint)
}

/// The top-level `{s3_path}/MANIFESTS` object: an ETF-encoded list of
/// `(manifest_url, version_id)` pairs, append-only.
fn manifests_url(s3_path: &str) -> String {
    format!("{}/MANIFESTS", s3_path.trim_end_matches('/'))
}

pub fn get_manifests(s3_path: &str, endpoint: Option<&str>) -> Result<Vec<(String, String)>> {
    let url = manifests_url(s3_path);
    if !storage::exists(&url, endpoint)? {
        return Ok(Vec::new());
    }
    let bytes = storage::download_bytes(&url, endpoint, None)?;
    let term = etf::decode(&bytes)?;
    let entries = term.as_list().ok_or_else(|| Error::parse("MANIFESTS object is not a list"))?;
    entries
        .iter()
        .map(|pair| {
            let fields = pair.as_tuple().filter(|f| f.len() == 2).ok_or_else(|| Error::parse("MANIFESTS entry is not a pair"))?;
            let url = fields[0].as_binary().ok_or_else(|| Error::parse("MANIFESTS entry url is not a binary"))?;
            let version = fields[1].as_binary().ok_or_else(|| Error::parse("MANIFESTS entry version is not a binary"))?;
            Ok((String::from_utf8_lossy(url).into_owned(), String::from_utf8_lossy(version).into_owned()))
        })
        .collect()
}

pub fn get_manifests_versions(s3_path: &str, endpoint: Option<&str>) -> Result<Vec<storage::ObjectVersion>> {
    storage::list_versions(&manifests_url(s3_path), endpoint)
}

pub fn upload_manifests(
    s3_path: &str,
    manifest_url: &str,
    manifest_version_id: Option<&str>,
    endpoint: Option<&str>,
) -> Result<()> {
    let mut existing = get_manifests(s3_path, endpoint)?;
    existing.push((manifest_url.to_string(), manifest_version_id.unwrap_or("").to_string()));

    let term = Term::proper_list(
        existing
            .into_iter()
            .map(|(url, version)| Term::tuple(vec![Term::binary(url.into_bytes()), Term::binary(version.into_bytes())]))
            .collect(),
    );
    let bytes = etf::encode(&term, None)?;
    storage::upload_bytes(bytes, &manifests_url(s3_path), endpoint)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_entry(sqn: i64, base_path: &str) -> Term {
        Term::tuple(vec![
            Term::integer(num_bigint::BigInt::from(sqn)),
            Term::binary(base_path.as_bytes().to_vec()),
            Term::atom("owner_pid_placeholder"),
            Term::atom("null"),
        ])
    }

    #[test]
    fn manifest_round_trips_through_local_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("0.man");
        let manifest = Manifest {
            entries: vec![make_entry(5, "/data/1/journal/journal_files/5_abc"), make_entry(1, "/data/1/journal/journal_files/1_def")],
        };
        save_local_manifest(&manifest, &path).unwrap();

        let read_back = read_manifest(path.to_str().unwrap(), None, None).unwrap();
        assert_eq!(read_back.entries.len(), 2);
        assert_eq!(entry_start_sqn(&read_back.entries[0]).unwrap(), 5);
        assert_eq!(entry_base_path(&read_back.entries[0]).unwrap(), "/data/1/journal/journal_files/5_abc");
    }

    #[test]
    fn update_journal_filename_rewrites_only_base_path() {
        let entry = make_entry(5, "/data/1/journal/journal_files/5_abc");
        let updated = update_journal_filename(&entry, "/data", "s3://bucket/backup").unwrap();
        assert_eq!(entry_base_path(&updated).unwrap(), "s3://bucket/backup/1/journal/journal_files/5_abc");
        assert_eq!(entry_start_sqn(&updated).unwrap(), 5);
        assert_eq!(entry_last_key(&updated).unwrap(), entry_last_key(&entry).unwrap());
    }

    #[test]
    fn manifests_history_round_trips_through_local_disk() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().to_str().unwrap().to_string();
        assert!(get_manifests(&base, None).unwrap().is_empty());

        upload_manifests(&base, "s3://bucket/1/journal/journal_manifest/tagA.man", Some("v1"), None).unwrap();
        upload_manifests(&base, "s3://bucket/1/journal/journal_manifest/tagB.man", Some("v2"), None).unwrap();

        let history = get_manifests(&base, None).unwrap();
        assert_eq!(
            history,
            vec![
                ("s3://bucket/1/journal/journal_manifest/tagA.man".to_string(), "v1".to_string()),
                ("s3://bucket/1/journal/journal_manifest/tagB.man".to_string(), "v2".to_string()),
            ]
        );
    }
}
