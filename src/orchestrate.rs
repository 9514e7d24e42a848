//! Top-level orchestration (C8): backup, restore, retrieve, list-versions.
//!
//! Each action binds a [`Config`] plus a per-invocation tag (except
//! `list-versions`, which has no tag) and walks the owned partitions of
//! this node's ring — sequentially by default, or concurrently per
//! partition when built with the `parallel` feature (see `backup`/`restore`).

use log::{info, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::etf::Term;
use crate::journal::{decode_journal_object, JournalValue, RiakObject};
use crate::manifest::{self, Manifest};
use crate::ring;
use crate::router;

fn partition_root(root: &std::path::Path, partition: &num_bigint::BigInt) -> String {
    root.join(partition.to_string()).to_string_lossy().into_owned()
}

fn backup_partition(config: &Config, partition: &num_bigint::BigInt, tag: &str) -> Result<()> {
    let endpoint = config.s3_endpoint.as_deref();
    let source = partition_root(&config.hotbackup_path, partition);
    let manifest_path = format!("{source}/journal/journal_manifest/0.man");
    info!("backup: partition {partition} manifest {manifest_path}");

    // source/dest for path rewriting are the bare config roots, not
    // partition-rooted: entry.base_path is already an absolute path that
    // embeds the partition index, and swap_path's relpath needs that root
    // to retain the {partition}/ segment in the rewritten path.
    let hotbackup_root = config.hotbackup_path.to_string_lossy();
    let manifest = manifest::read_manifest(&manifest_path, None, None)?;
    for entry in &manifest.entries {
        manifest::maybe_upload_journal(entry, &hotbackup_root, &config.s3_path, config.hints_files, endpoint)?;
    }

    let rewritten_entries = manifest
        .entries
        .iter()
        .map(|entry| manifest::update_journal_filename(entry, &hotbackup_root, &config.s3_path))
        .collect::<Result<Vec<Term>>>()?;
    let rewritten = Manifest { entries: rewritten_entries };

    let (url, version_id) = manifest::upload_new_manifest(&rewritten, partition, &config.s3_path, tag, endpoint)?;
    manifest::upload_manifests(&config.s3_path, &url, version_id.as_deref(), endpoint)?;
    info!("backup: partition {partition} complete");
    Ok(())
}

/// Mirror this node's owned partitions to S3 under `tag`. With the
/// `parallel` feature, partitions are processed concurrently (each touches
/// disjoint paths, so there is no shared mutable state to race on).
pub fn backup(config: &Config, tag: &str) -> Result<()> {
    crate::config::validate_tag(tag)?;
    let ring_file = ring::find_latest_ring(&config.ring_path)?;
    let partitions = ring::get_owned_partitions(&ring_file)?;

    #[cfg(feature = "parallel")]
    {
        use rayon::prelude::*;
        partitions.par_iter().try_for_each(|partition| backup_partition(config, partition, tag))?;
    }
    #[cfg(not(feature = "parallel"))]
    {
        for partition in &partitions {
            backup_partition(config, partition, tag)?;
        }
    }

    info!("backup: tag {tag} complete over {} partition(s)", partitions.len());
    Ok(())
}

fn restore_partition(config: &Config, partition: &num_bigint::BigInt, tag: &str) -> Result<()> {
    let endpoint = config.s3_endpoint.as_deref();
    let manifest_url = format!("{}/{partition}/journal/journal_manifest/{tag}.man", config.s3_path);
    info!("restore: partition {partition} manifest {manifest_url}");

    // See backup_partition: source/dest here are the bare config roots so
    // swap_path's relpath retains the {partition}/ segment.
    let leveled_root = config.leveled_path.to_string_lossy();
    let manifest = manifest::read_manifest(&manifest_url, None, endpoint)?;
    for entry in &manifest.entries {
        manifest::maybe_download_journal(entry, &config.s3_path, &leveled_root, endpoint)?;
    }

    let rewritten_entries = manifest
        .entries
        .iter()
        .map(|entry| manifest::update_journal_filename(entry, &config.s3_path, &leveled_root))
        .collect::<Result<Vec<Term>>>()?;
    let rewritten = Manifest { entries: rewritten_entries };
    let dest = partition_root(&config.leveled_path, partition);
    let local_manifest_path = std::path::Path::new(&dest).join("journal/journal_manifest/0.man");
    manifest::save_local_manifest(&rewritten, &local_manifest_path)?;
    info!("restore: partition {partition} complete");
    Ok(())
}

/// Stage a tagged S3 backup back onto local disk. With the `parallel`
/// feature, partitions are processed concurrently.
pub fn restore(config: &Config, tag: &str) -> Result<()> {
    crate::config::validate_tag(tag)?;
    let ring_file = ring::find_latest_ring(&config.ring_path)?;
    let partitions = ring::get_owned_partitions(&ring_file)?;

    #[cfg(feature = "parallel")]
    {
        use rayon::prelude::*;
        partitions.par_iter().try_for_each(|partition| restore_partition(config, partition, tag))?;
    }
    #[cfg(not(feature = "parallel"))]
    {
        for partition in &partitions {
            restore_partition(config, partition, tag)?;
        }
    }

    info!("restore: tag {tag} complete over {} partition(s)", partitions.len());
    Ok(())
}

/// Build the ETF-encoded journal key for `(sqn, bucket, key, buckettype?)`.
fn journal_key(sqn: i64, bucket: &[u8], key: &[u8], buckettype: Option<&[u8]>) -> Term {
    let bucket_ref = match buckettype {
        Some(t) => Term::tuple(vec![Term::binary(t.to_vec()), Term::binary(bucket.to_vec())]),
        None => Term::binary(bucket.to_vec()),
    };
    Term::tuple(vec![
        Term::integer(num_bigint::BigInt::from(sqn)),
        Term::atom("stnd"),
        Term::tuple(vec![Term::atom("o_rkv"), bucket_ref, Term::binary(key.to_vec()), Term::atom("null")]),
    ])
}

/// The outcome of a `retrieve` scan. A miss is not an error — it is a
/// normal, terminal state that the caller reports and exits cleanly from.
pub enum RetrieveOutcome {
    Found { journal_file: String, sqn: u32, riak_object: RiakObject },
    NotFoundInBackup,
}

/// Locate and decode a single object from a tagged backup, scanning
/// journals newest-first within the owning partition's manifest.
pub fn retrieve(config: &Config, tag: &str, bucket: &[u8], key: &[u8], buckettype: Option<&[u8]>) -> Result<RetrieveOutcome> {
    crate::config::validate_tag(tag)?;
    let ring_file = ring::find_latest_ring(&config.ring_path)?;
    let ring_size = ring::get_ring_size(&ring_file)?;
    let partition = router::find_primary_partition(ring_size, bucket, key, buckettype);
    let endpoint = config.s3_endpoint.as_deref();
    info!("retrieve: primary partition is {partition}");

    let manifest_url = format!("{}/{partition}/journal/journal_manifest/{tag}.man", config.s3_path);
    let manifest = manifest::read_manifest(&manifest_url, None, endpoint)?;
    info!("retrieve: loaded manifest, {} journal(s) to check", manifest.entries.len());

    for entry in &manifest.entries {
        let base_path = manifest::entry_base_path(entry)?;
        let hints_url = format!("{base_path}.hints.cdb");
        let journal_url = format!("{base_path}.cdb");
        info!("retrieve: checking {hints_url}");

        if !crate::storage::exists(&hints_url, endpoint)? {
            warn!("retrieve: hints file absent at {hints_url}, treating as a miss for this journal");
            continue;
        }
        let hints_source = crate::storage::byte_source(&hints_url, endpoint)?;
        let hints_reader = crate::cdb::CdbReader::new(hints_source);
        let sqn = match crate::hints::get_sqn(&hints_reader, bucket, key, buckettype)? {
            Some(sqn) => sqn,
            None => {
                warn!("retrieve: key not present in hints at {hints_url}, treating as a miss for this journal");
                continue;
            }
        };
        info!("retrieve: found SQN {sqn} in {journal_url}");

        let journal_source = crate::storage::byte_source(&journal_url, endpoint)?;
        let journal_reader = crate::cdb::CdbReader::new(journal_source);
        let jkey = journal_key(sqn as i64, bucket, key, buckettype);
        let jkey_bytes = crate::etf::encode(&jkey, None)?;

        let record = match journal_reader.get_raw(&jkey_bytes)? {
            Some(record) => record,
            None => continue,
        };
        let value = decode_journal_object(&jkey_bytes, &record)?;
        let bytes = match value {
            JournalValue::Binary(bytes) => bytes,
            JournalValue::Term(_) => return Err(Error::integrity("decoded journal value is not a binary riak object")),
        };
        let riak_object = RiakObject::decode(&bytes)?;
        return Ok(RetrieveOutcome::Found { journal_file: journal_url, sqn, riak_object });
    }

    Ok(RetrieveOutcome::NotFoundInBackup)
}

pub fn list_versions(config: &Config) -> Result<Vec<crate::storage::ObjectVersion>> {
    manifest::get_manifests_versions(&config.s3_path, config.s3_endpoint.as_deref())
}
