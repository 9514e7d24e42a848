//! Hints index (C5): a CDB mapping `(bucket_ref, key)` to the journal SQN
//! that last wrote it, used by retrieve to skip journals that cannot
//! contain a given key.

use std::path::Path;

use crate::cdb::{write_int_cdb, CdbReader};
use crate::error::Result;
use crate::etf::{self, Term};
use crate::storage::ByteSource;

fn bucket_ref(bucket: &[u8], buckettype: Option<&[u8]>) -> Term {
    match buckettype {
        Some(t) => Term::tuple(vec![Term::binary(t.to_vec()), Term::binary(bucket.to_vec())]),
        None => Term::binary(bucket.to_vec()),
    }
}

fn hints_key_bytes(bucket: &[u8], key: &[u8], buckettype: Option<&[u8]>) -> Result<Vec<u8>> {
    let term = Term::tuple(vec![bucket_ref(bucket, buckettype), Term::binary(key.to_vec())]);
    etf::encode(&term, None)
}

/// Extract `(bucket_ref, key)` out of a journal key term, so a hints entry
/// can be derived for it without re-deciding typed-vs-untyped buckets.
fn hints_key_from_journal_key(journal_key: &Term) -> Result<Vec<u8>> {
    let fields = journal_key
        .as_tuple()
        .ok_or_else(|| crate::error::Error::parse("journal key is not a tuple"))?;
    let inner = fields
        .get(2)
        .and_then(|t| t.as_tuple())
        .ok_or_else(|| crate::error::Error::parse("journal key inner tuple missing"))?;
    let bucket_ref_term = inner.get(1).ok_or_else(|| crate::error::Error::parse("journal key missing bucket_ref"))?;
    let key_term = inner.get(2).ok_or_else(|| crate::error::Error::parse("journal key missing key"))?;
    let pair = Term::tuple(vec![bucket_ref_term.clone(), key_term.clone()]);
    etf::encode(&pair, None)
}

/// Build a hints CDB at `path` from the (already ETF-encoded) keys of a
/// journal CDB.
pub fn create_hints_file(path: &Path, journal_keys: &[Vec<u8>]) -> Result<()> {
    let mut entries = Vec::with_capacity(journal_keys.len());
    for key_bytes in journal_keys {
        let term = etf::decode(key_bytes)?;
        let fields = term
            .as_tuple()
            .ok_or_else(|| crate::error::Error::parse("journal key is not a tuple"))?;
        let sqn = fields
            .get(0)
            .and_then(|t| t.as_i64())
            .ok_or_else(|| crate::error::Error::parse("journal key missing sqn"))?;
        let hints_key = hints_key_from_journal_key(&term)?;
        entries.push((hints_key, sqn as u32));
    }
    write_int_cdb(path, &entries)
}

/// Query a hints CDB for `(bucket, key, buckettype?)`, returning the SQN if
/// present. A miss means the journal does not contain this key at any SQN.
pub fn get_sqn<S: ByteSource>(
    reader: &CdbReader<S>,
    bucket: &[u8],
    key: &[u8],
    buckettype: Option<&[u8]>,
) -> Result<Option<u32>> {
    let probe_key = hints_key_bytes(bucket, key, buckettype)?;
    reader.get_int(&probe_key)
}
