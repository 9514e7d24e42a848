//! Partition router (C3): Riak's SHA-1 consistent-hash ring rule.

use std::sync::OnceLock;

use num_bigint::BigInt;
use num_traits::ToPrimitive;
use sha1::{Digest, Sha1};

use crate::etf::{self, Term};

/// `2^160 - 1`, the largest value a 20-byte SHA-1 digest can represent.
fn max_sha() -> &'static BigInt {
    static CELL: OnceLock<BigInt> = OnceLock::new();
    CELL.get_or_init(|| (BigInt::from(1u8) << 160) - BigInt::from(1u8))
}

/// The ring's sorted partition indexes: `[inc*n + n for n in 0..ring_size)`.
pub fn riak_ring_indexes(ring_size: u64) -> Vec<BigInt> {
    let inc = max_sha() / BigInt::from(ring_size);
    (0..ring_size)
        .map(|n| &inc * BigInt::from(n) + BigInt::from(n))
        .collect()
}

fn bucket_ref(bucket: &[u8], buckettype: Option<&[u8]>) -> Term {
    match buckettype {
        Some(t) => Term::tuple(vec![Term::binary(t.to_vec()), Term::binary(bucket.to_vec())]),
        None => Term::binary(bucket.to_vec()),
    }
}

/// SHA-1 the ETF encoding of `((buckettype?, bucket), key)`, as an unsigned
/// big-endian integer.
pub fn hash_bucket_key(bucket: &[u8], key: &[u8], buckettype: Option<&[u8]>) -> BigInt {
    let term = Term::tuple(vec![bucket_ref(bucket, buckettype), Term::binary(key.to_vec())]);
    let encoded = etf::encode(&term, None).expect("hashing term never fails to encode");
    let digest = Sha1::digest(&encoded);
    BigInt::from_bytes_be(num_bigint::Sign::Plus, &digest)
}

/// The well-known Riak primary-partition rule:
/// `ring[(hash // inc + 1) mod ring_size]`.
pub fn find_primary_partition(ring_size: u64, bucket: &[u8], key: &[u8], buckettype: Option<&[u8]>) -> BigInt {
    let inc = max_sha() / BigInt::from(ring_size);
    let hash = hash_bucket_key(bucket, key, buckettype);
    let ring = riak_ring_indexes(ring_size);
    let position = ((hash / &inc) + BigInt::from(1u8)) % BigInt::from(ring_size);
    let index = position.to_usize().expect("ring position fits in usize");
    ring[index].clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_sha_constant() {
        let expected: BigInt = "1461501637330902918203684832716283019655932542975".parse().unwrap();
        assert_eq!(max_sha(), &expected);
    }

    #[test]
    fn routing_result_is_a_ring_index() {
        let ring = riak_ring_indexes(64);
        let p = find_primary_partition(64, b"testBucket", b"testKey17", None);
        assert!(ring.contains(&p));
        assert_eq!(p, BigInt::from(0));
    }

    #[test]
    fn routing_is_deterministic() {
        let p1 = find_primary_partition(64, b"testBucket", b"testKey17", None);
        let p2 = find_primary_partition(64, b"testBucket", b"testKey17", None);
        assert_eq!(p1, p2);
    }

    #[test]
    fn typed_and_untyped_buckets_hash_differently() {
        let untyped = hash_bucket_key(b"b", b"k", None);
        let typed = hash_bucket_key(b"b", b"k", Some(b"t"));
        assert_ne!(untyped, typed);
    }
}
