//! Journal object codec (C6): CRC-checked, optionally compressed, length-
//! framed records, plus the Riak sibling-bearing object sub-decoder.

use byteorder::{ReadBytesExt, BE};
use std::io::{Cursor, Read};

use flate2::read::ZlibDecoder;

use crate::error::{Error, Result};
use crate::etf::{self, Term};

/// The value decoded out of a journal record: either a raw binary blob or
/// an ETF term, depending on the record's `is_binary` flag.
#[derive(Debug, Clone)]
pub enum JournalValue {
    Binary(Vec<u8>),
    Term(Term),
}

/// Decode a journal record per the wire layout in the data model: CRC,
/// compression, and value-type trailer. `journal_key` is the raw key bytes
/// the record was stored under — it participates in the CRC.
pub fn decode_journal_object(journal_key: &[u8], record: &[u8]) -> Result<JournalValue> {
    let n = record.len();
    if n < 9 {
        return Err(Error::parse("journal record too short"));
    }

    let key_change_len = Cursor::new(&record[n - 5..n - 1]).read_u32::<BE>().unwrap() as usize;
    let vt = record[n - 1];
    let is_compressed = vt & 1 != 0;
    let is_binary = vt & 2 != 0;
    let is_lz4 = vt & 4 != 0;

    let stored_crc = Cursor::new(&record[0..4]).read_u32::<BE>().unwrap();
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(journal_key);
    hasher.update(&record[4..]);
    if hasher.finalize() != stored_crc {
        return Err(Error::integrity("CRC error retrieving object"));
    }

    let value_end = n
        .checked_sub(5 + key_change_len)
        .filter(|&end| end >= 4)
        .ok_or_else(|| Error::parse("journal record key-change length overruns buffer"))?;
    let payload = &record[4..value_end];

    let decompressed;
    let bytes: &[u8] = if is_compressed {
        decompressed = if is_lz4 {
            lz4_flex::block::decompress_size_prepended(payload)
                .map_err(|e| Error::integrity(format!("lz4 decompress failed: {e}")))?
        } else {
            let mut out = Vec::new();
            ZlibDecoder::new(payload)
                .read_to_end(&mut out)
                .map_err(|e| Error::integrity(format!("zlib decompress failed: {e}")))?;
            out
        };
        &decompressed
    } else {
        payload
    };

    if is_binary {
        Ok(JournalValue::Binary(bytes.to_vec()))
    } else {
        Ok(JournalValue::Term(etf::decode(bytes)?))
    }
}

/// A single sibling's metadata, per the wire layout in the data model.
#[derive(Debug, Clone)]
pub struct SiblingMetadata {
    pub last_modified_mega: u32,
    pub last_modified_secs: u32,
    pub last_modified_micro: u32,
    pub vtag: Vec<u8>,
    pub deleted: bool,
    pub extra: Vec<(JournalValue, JournalValue)>,
}

impl SiblingMetadata {
    /// `"{mega}{secs:06}.{micro:06}"` seconds-since-epoch display string.
    pub fn last_modified_string(&self) -> String {
        format!(
            "{}{:06}.{:06}",
            self.last_modified_mega, self.last_modified_secs, self.last_modified_micro
        )
    }
}

#[derive(Debug, Clone)]
pub struct Sibling {
    pub value: JournalValue,
    pub metadata: SiblingMetadata,
}

/// The Riak siblings container: `magic(0x35) version(1) vclock siblings*`.
#[derive(Debug, Clone)]
pub struct RiakObject {
    pub vclock: Term,
    pub siblings: Vec<Sibling>,
}

const RIAK_OBJECT_MAGIC: u8 = 0x35;
const RIAK_OBJECT_VERSION: u8 = 1;

fn read_u32(bytes: &[u8], offset: usize) -> Result<(u32, usize)> {
    if bytes.len() < offset + 4 {
        return Err(Error::integrity("truncated riak object"));
    }
    Ok((Cursor::new(&bytes[offset..offset + 4]).read_u32::<BE>().unwrap(), offset + 4))
}

fn read_flagged_value(bytes: &[u8], offset: usize, len: usize) -> Result<JournalValue> {
    if len == 0 {
        return Err(Error::integrity("empty flagged value in riak object"));
    }
    let flag = bytes[offset];
    let payload = &bytes[offset + 1..offset + len];
    if flag != 0 {
        Ok(JournalValue::Binary(payload.to_vec()))
    } else {
        Ok(JournalValue::Term(etf::decode(payload)?))
    }
}

impl RiakObject {
    pub fn decode(bytes: &[u8]) -> Result<RiakObject> {
        if bytes.len() < 2 || bytes[0] != RIAK_OBJECT_MAGIC || bytes[1] != RIAK_OBJECT_VERSION {
            return Err(Error::integrity("bad riak object magic/version"));
        }
        let mut offset = 2;
        let (vclock_len, next) = read_u32(bytes, offset)?;
        offset = next;
        if bytes.len() < offset + vclock_len as usize {
            return Err(Error::integrity("truncated riak object vclock"));
        }
        let vclock = etf::decode(&bytes[offset..offset + vclock_len as usize])?;
        offset += vclock_len as usize;

        let (sibling_count, next) = read_u32(bytes, offset)?;
        offset = next;

        let mut siblings = Vec::with_capacity(sibling_count as usize);
        for _ in 0..sibling_count {
            let (value_len, next) = read_u32(bytes, offset)?;
            offset = next;
            let (meta_len, next) = read_u32(bytes, offset)?;
            offset = next;

            if bytes.len() < offset + value_len as usize {
                return Err(Error::integrity("truncated riak object sibling value"));
            }
            let value = read_flagged_value(bytes, offset, value_len as usize)?;
            offset += value_len as usize;

            if bytes.len() < offset + meta_len as usize {
                return Err(Error::integrity("truncated riak object sibling metadata"));
            }
            let metadata = decode_metadata(&bytes[offset..offset + meta_len as usize])?;
            offset += meta_len as usize;

            siblings.push(Sibling { value, metadata });
        }

        if offset != bytes.len() {
            return Err(Error::integrity("trailing bytes after riak object"));
        }

        Ok(RiakObject { vclock, siblings })
    }
}

fn decode_metadata(bytes: &[u8]) -> Result<SiblingMetadata> {
    let (mega, off) = read_u32(bytes, 0)?;
    let (secs, off) = read_u32(bytes, off)?;
    let (micro, off) = read_u32(bytes, off)?;

    if bytes.len() < off + 1 {
        return Err(Error::integrity("truncated sibling metadata vtag length"));
    }
    let vtag_len = bytes[off] as usize;
    let mut offset = off + 1;
    if bytes.len() < offset + vtag_len {
        return Err(Error::integrity("truncated sibling metadata vtag"));
    }
    let vtag = bytes[offset..offset + vtag_len].to_vec();
    offset += vtag_len;

    if bytes.len() < offset + 1 {
        return Err(Error::integrity("truncated sibling metadata deleted flag"));
    }
    let deleted = bytes[offset] != 0;
    offset += 1;

    let mut extra = Vec::new();
    while offset < bytes.len() {
        let (key_len, next) = read_u32(bytes, offset)?;
        offset = next;
        let key = read_flagged_value(bytes, offset, key_len as usize)?;
        offset += key_len as usize;

        let (val_len, next) = read_u32(bytes, offset)?;
        offset = next;
        let val = read_flagged_value(bytes, offset, val_len as usize)?;
        offset += val_len as usize;

        extra.push((key, val));
    }

    Ok(SiblingMetadata {
        last_modified_mega: mega,
        last_modified_secs: secs,
        last_modified_micro: micro,
        vtag,
        deleted,
        extra,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_journal_object_lz4_binary() {
        let record = b"\x8c\xe3\xff \x03\x00\x00\x000abc\x00\x00\x00\x00\x07";
        match decode_journal_object(b"", record).unwrap() {
            JournalValue::Binary(bytes) => assert_eq!(bytes, b"abc"),
            _ => panic!("expected binary value"),
        }
    }

    #[test]
    fn crc_mismatch_is_fatal() {
        let mut record = b"\x8c\xe3\xff \x03\x00\x00\x000abc\x00\x00\x00\x00\x07".to_vec();
        record[0] ^= 0xFF;
        let err = decode_journal_object(b"", &record).unwrap_err();
        assert_eq!(err.to_string(), "CRC error retrieving object");
    }

    fn frame(journal_key: &[u8], payload: &[u8], vt: u8, key_change: &[u8]) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(payload);
        body.extend_from_slice(key_change);
        body.extend_from_slice(&(key_change.len() as u32).to_be_bytes());
        body.push(vt);

        let mut hasher = crc32fast::Hasher::new();
        hasher.update(journal_key);
        hasher.update(&body);
        let crc = hasher.finalize();

        let mut out = Vec::new();
        out.extend_from_slice(&crc.to_be_bytes());
        out.extend_from_slice(&body);
        out
    }

    #[test]
    fn compression_invariance() {
        let journal_key = b"jk";
        let plain = frame(journal_key, b"hello world", 0x02, b"");
        let compressed_zlib = {
            use std::io::Write;
            let mut enc = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
            enc.write_all(b"hello world").unwrap();
            frame(journal_key, &enc.finish().unwrap(), 0x03, b"")
        };

        let a = decode_journal_object(journal_key, &plain).unwrap();
        let b = decode_journal_object(journal_key, &compressed_zlib).unwrap();
        match (a, b) {
            (JournalValue::Binary(x), JournalValue::Binary(y)) => assert_eq!(x, y),
            _ => panic!("expected binary values"),
        }
    }

    #[test]
    fn riak_object_single_sibling_roundtrip() {
        let vclock = etf::encode(&Term::atom("vc"), None).unwrap();
        let mut bytes = vec![0x35, 0x01];
        bytes.extend_from_slice(&(vclock.len() as u32).to_be_bytes());
        bytes.extend_from_slice(&vclock);
        bytes.extend_from_slice(&1u32.to_be_bytes()); // sibling_count

        let value_payload = b"{\"test\":\"data\"}";
        let mut value_bytes = vec![1u8];
        value_bytes.extend_from_slice(value_payload);
        bytes.extend_from_slice(&(value_bytes.len() as u32).to_be_bytes());

        let vtag = b"v1";
        let mut meta = Vec::new();
        meta.extend_from_slice(&1706009850u32.to_be_bytes());
        meta.extend_from_slice(&0u32.to_be_bytes());
        meta.extend_from_slice(&709926u32.to_be_bytes());
        meta.push(vtag.len() as u8);
        meta.extend_from_slice(vtag);
        meta.push(0); // not deleted
        bytes.extend_from_slice(&(meta.len() as u32).to_be_bytes());

        bytes.extend_from_slice(&value_bytes);
        bytes.extend_from_slice(&meta);

        let obj = RiakObject::decode(&bytes).unwrap();
        assert_eq!(obj.siblings.len(), 1);
        match &obj.siblings[0].value {
            JournalValue::Binary(v) => assert_eq!(v, value_payload),
            _ => panic!("expected binary sibling value"),
        }
        assert_eq!(obj.siblings[0].metadata.vtag, vtag);
        assert!(!obj.siblings[0].metadata.deleted);
    }

    proptest::proptest! {
        #[test]
        fn crc_round_trips_for_any_payload(
            journal_key in proptest::collection::vec(proptest::prelude::any::<u8>(), 0..32),
            payload in proptest::collection::vec(proptest::prelude::any::<u8>(), 0..256),
        ) {
            let record = frame(&journal_key, &payload, 0x02, b"");
            match decode_journal_object(&journal_key, &record).unwrap() {
                JournalValue::Binary(bytes) => proptest::prop_assert_eq!(bytes, payload),
                JournalValue::Term(_) => proptest::prop_assert!(false, "expected binary value"),
            }
        }

        #[test]
        fn flipping_any_byte_breaks_the_crc(
            journal_key in proptest::collection::vec(proptest::prelude::any::<u8>(), 0..16),
            payload in proptest::collection::vec(proptest::prelude::any::<u8>(), 1..64),
            flip_index in 0usize..64,
        ) {
            let mut record = frame(&journal_key, &payload, 0x02, b"");
            let idx = flip_index % record.len();
            record[idx] ^= 0xFF;
            proptest::prop_assert!(decode_journal_object(&journal_key, &record).is_err());
        }
    }
}
