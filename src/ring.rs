//! Ring reader (C2): locate the node's ring file and read ring size /
//! owned-partition membership out of the `riak_core_ring` ETF term.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::etf::{self, Term};

/// Find the lexicographically greatest `riak_core_ring.*` entry in `dir`.
pub fn find_latest_ring(dir: &Path) -> Result<PathBuf> {
    let mut candidates: Vec<String> = fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .filter_map(|e| e.file_name().into_string().ok())
        .filter(|name| name.starts_with("riak_core_ring."))
        .collect();
    candidates.sort();
    candidates
        .pop()
        .map(|name| dir.join(name))
        .ok_or_else(|| Error::not_found(format!("no riak_core_ring file found in {}", dir.display())))
}

fn decode_ring(path: &Path) -> Result<Term> {
    let bytes = fs::read(path)?;
    etf::decode(&bytes)
}

/// `term[3]` is `(ring_size, owners)`; `term[1]` is the node's own identity.
fn ring_tuple(term: &Term) -> Result<&[Term]> {
    term.as_tuple()
        .filter(|items| items.len() > 3)
        .ok_or_else(|| Error::parse("ring term is not a tuple with an owners slot"))
}

pub fn get_ring_size(path: &Path) -> Result<u64> {
    let term = decode_ring(path)?;
    let items = ring_tuple(&term)?;
    let pair = items[3]
        .as_tuple()
        .ok_or_else(|| Error::parse("ring term[3] is not a (ring_size, owners) pair"))?;
    pair.get(0)
        .and_then(|t| t.as_i64())
        .map(|v| v as u64)
        .ok_or_else(|| Error::parse("ring_size is not an integer"))
}

/// Partitions owned by this node, in the order the ring term lists them.
pub fn get_owned_partitions(path: &Path) -> Result<Vec<num_bigint::BigInt>> {
    let term = decode_ring(path)?;
    let items = ring_tuple(&term)?;
    let node_identity = &items[1];

    let pair = items[3]
        .as_tuple()
        .ok_or_else(|| Error::parse("ring term[3] is not a (ring_size, owners) pair"))?;
    let owners = pair
        .get(1)
        .and_then(|t| t.as_list())
        .ok_or_else(|| Error::parse("ring term[3][1] is not an owners list"))?;

    let mut owned = Vec::new();
    for entry in owners {
        let fields = entry
            .as_tuple()
            .ok_or_else(|| Error::parse("owner entry is not a (partition_index, owner_node) tuple"))?;
        let (idx, owner) = (
            fields.get(0).ok_or_else(|| Error::parse("owner entry missing partition_index"))?,
            fields.get(1).ok_or_else(|| Error::parse("owner entry missing owner_node"))?,
        );
        if owner == node_identity {
            let idx = idx.as_bigint().ok_or_else(|| Error::parse("partition_index is not an integer"))?;
            owned.push(idx);
        }
    }
    Ok(owned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::etf::Term;
    use std::io::Write;

    fn write_ring(dir: &Path, node: &str, owners: Vec<(u64, &str)>) -> PathBuf {
        let node_atom = Term::atom(node);
        let owners_list = Term::proper_list(
            owners
                .into_iter()
                .map(|(idx, owner)| Term::tuple(vec![Term::integer(num_bigint::BigInt::from(idx)), Term::atom(owner)]))
                .collect(),
        );
        let ring_term = Term::tuple(vec![
            Term::SmallInt(0),
            node_atom,
            Term::SmallInt(0),
            Term::tuple(vec![Term::SmallInt(64), owners_list]),
        ]);
        let bytes = etf::encode(&ring_term, None).unwrap();
        let path = dir.join("riak_core_ring.20240101120000");
        let mut f = fs::File::create(&path).unwrap();
        f.write_all(&bytes).unwrap();
        path
    }

    #[test]
    fn finds_latest_and_reads_owned_partitions() {
        let dir = tempfile::tempdir().unwrap();
        write_ring(dir.path(), "node_a", vec![(0, "node_a"), (1, "node_b"), (2, "node_a")]);
        let latest = find_latest_ring(dir.path()).unwrap();
        assert_eq!(get_ring_size(&latest).unwrap(), 64);
        let owned = get_owned_partitions(&latest).unwrap();
        assert_eq!(owned, vec![num_bigint::BigInt::from(0), num_bigint::BigInt::from(2)]);
    }

    #[test]
    fn missing_ring_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        assert!(find_latest_ring(dir.path()).is_err());
    }
}
