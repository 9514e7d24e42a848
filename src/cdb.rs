//! CDB (constant database) support.
//!
//! This module treats the CDB file format as a small, self-contained
//! library with two operations: build a sorted key→int writer, and open a
//! reader over a byte-slice or file. Because this crate's random-access
//! reader must also work against an S3 object probed in place (no off-the-shelf crate reads
//! CDB over an arbitrary [`crate::storage::ByteSource`]), the reader here
//! is written directly against that interface, following D. J. Bernstein's
//! published cdb format (256-entry header table, djb hash, linear probing).

use byteorder::{ByteOrder, LittleEndian};

use crate::error::{Error, Result};
use crate::storage::ByteSource;

const HEADER_LEN: u64 = 2048;
const NUM_TABLES: usize = 256;

fn cdb_hash(key: &[u8]) -> u32 {
    let mut h: u32 = 5381;
    for &b in key {
        h = h.wrapping_shl(5).wrapping_add(h) ^ (b as u32);
    }
    h
}

/// Build a CDB file at `path` mapping each `(key, value)` pair to a little-
/// endian 32-bit integer value, per the `putint`/`getint` convention.
pub fn write_int_cdb(path: &std::path::Path, entries: &[(Vec<u8>, u32)]) -> Result<()> {
    let entries: Vec<(Vec<u8>, Vec<u8>)> = entries.iter().map(|(k, v)| (k.clone(), v.to_le_bytes().to_vec())).collect();
    write_cdb(path, &entries)
}

/// Build a CDB file at `path` mapping each `(key, value)` pair of raw bytes,
/// per D. J. Bernstein's `cdbmake`/`cdb` contract.
pub fn write_cdb(path: &std::path::Path, entries: &[(Vec<u8>, Vec<u8>)]) -> Result<()> {
    crate::storage::ensure_parent_dir(path)?;

    let mut records = Vec::with_capacity(entries.len());
    let mut body = Vec::new();
    for (key, value_bytes) in entries {
        let pos = HEADER_LEN + body.len() as u64;
        body.extend_from_slice(&(key.len() as u32).to_le_bytes());
        body.extend_from_slice(&(value_bytes.len() as u32).to_le_bytes());
        body.extend_from_slice(key);
        body.extend_from_slice(value_bytes);
        records.push((cdb_hash(key), pos));
    }

    let mut buckets: Vec<Vec<(u32, u64)>> = vec![Vec::new(); NUM_TABLES];
    for (hash, pos) in &records {
        buckets[(*hash as usize) % NUM_TABLES].push((*hash, *pos));
    }

    let mut table_section = Vec::new();
    let mut header = vec![0u8; HEADER_LEN as usize];
    let tables_start = HEADER_LEN + body.len() as u64;
    for (i, bucket) in buckets.iter().enumerate() {
        let nslots = (bucket.len() * 2).max(0) as u64;
        let table_pos = tables_start + table_section.len() as u64;
        LittleEndian::write_u32(&mut header[i * 8..i * 8 + 4], table_pos as u32);
        LittleEndian::write_u32(&mut header[i * 8 + 4..i * 8 + 8], nslots as u32);

        let mut slots = vec![(0u32, 0u64); nslots as usize];
        if nslots > 0 {
            for (hash, pos) in bucket {
                let start = ((*hash >> 8) as u64 % nslots) as usize;
                let mut slot = start;
                loop {
                    if slots[slot].1 == 0 {
                        slots[slot] = (*hash, *pos);
                        break;
                    }
                    slot = (slot + 1) % nslots as usize;
                }
            }
        }
        for (hash, pos) in slots {
            table_section.extend_from_slice(&hash.to_le_bytes());
            table_section.extend_from_slice(&(pos as u32).to_le_bytes());
        }
    }

    let mut out = header;
    out.extend_from_slice(&body);
    out.extend_from_slice(&table_section);
    std::fs::write(path, out)?;
    Ok(())
}

/// A CDB reader over any [`ByteSource`] — a local file or an S3 object
/// probed in place.
pub struct CdbReader<S: ByteSource> {
    source: S,
}

impl<S: ByteSource> CdbReader<S> {
    pub fn new(source: S) -> Self {
        CdbReader { source }
    }

    fn header_entry(&self, table: usize) -> Result<(u64, u64)> {
        let bytes = self.source.read_range((table * 8) as u64, 8)?;
        Ok((
            LittleEndian::read_u32(&bytes[0..4]) as u64,
            LittleEndian::read_u32(&bytes[4..8]) as u64,
        ))
    }

    /// Look up `key`, returning its little-endian `u32` integer value.
    pub fn get_int(&self, key: &[u8]) -> Result<Option<u32>> {
        match self.get_raw(key)? {
            Some(value_bytes) => {
                if value_bytes.len() != 4 {
                    return Err(Error::parse("cdb integer value is not 4 bytes"));
                }
                Ok(Some(LittleEndian::read_u32(&value_bytes)))
            }
            None => Ok(None),
        }
    }

    /// Look up `key`, returning its raw stored value bytes of any length.
    pub fn get_raw(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let hash = cdb_hash(key);
        let (table_pos, nslots) = self.header_entry(hash as usize % NUM_TABLES)?;
        if nslots == 0 {
            return Ok(None);
        }
        let start = (hash >> 8) as u64 % nslots;
        for i in 0..nslots {
            let slot = (start + i) % nslots;
            let slot_bytes = self.source.read_range(table_pos + slot * 8, 8)?;
            let stored_hash = LittleEndian::read_u32(&slot_bytes[0..4]);
            let record_pos = LittleEndian::read_u32(&slot_bytes[4..8]) as u64;
            if record_pos == 0 && stored_hash == 0 {
                return Ok(None);
            }
            if stored_hash == hash {
                let lens = self.source.read_range(record_pos, 8)?;
                let klen = LittleEndian::read_u32(&lens[0..4]) as u64;
                let vlen = LittleEndian::read_u32(&lens[4..8]) as u64;
                let stored_key = self.source.read_range(record_pos + 8, klen)?;
                if stored_key == key {
                    return Ok(Some(self.source.read_range(record_pos + 8 + klen, vlen)?));
                }
            }
        }
        Ok(None)
    }

    /// All keys stored in the database, in on-disk record order.
    pub fn keys(&self) -> Result<Vec<Vec<u8>>> {
        let records_end = self.records_end()?;
        let mut offset = HEADER_LEN;
        let mut keys = Vec::new();
        while offset < records_end {
            let lens = self.source.read_range(offset, 8)?;
            let klen = LittleEndian::read_u32(&lens[0..4]) as u64;
            let vlen = LittleEndian::read_u32(&lens[4..8]) as u64;
            let key = self.source.read_range(offset + 8, klen)?;
            keys.push(key);
            offset += 8 + klen + vlen;
        }
        Ok(keys)
    }

    fn records_end(&self) -> Result<u64> {
        let mut min_pos = None;
        for table in 0..NUM_TABLES {
            let (pos, nslots) = self.header_entry(table)?;
            if nslots > 0 {
                min_pos = Some(min_pos.map_or(pos, |m: u64| m.min(pos)));
            }
        }
        Ok(min_pos.unwrap_or(HEADER_LEN))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::LocalByteSource;

    #[test]
    fn write_then_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.cdb");
        let entries = vec![
            (b"key1".to_vec(), 123u32),
            (b"key2".to_vec(), 1230u32),
            (b"key3".to_vec(), 456u32),
        ];
        write_int_cdb(&path, &entries).unwrap();

        let reader = CdbReader::new(LocalByteSource::open(&path));
        assert_eq!(reader.get_int(b"key1").unwrap(), Some(123));
        assert_eq!(reader.get_int(b"key2").unwrap(), Some(1230));
        assert_eq!(reader.get_int(b"key3").unwrap(), Some(456));
        assert_eq!(reader.get_int(b"missing").unwrap(), None);

        let mut keys = reader.keys().unwrap();
        keys.sort();
        assert_eq!(keys, vec![b"key1".to_vec(), b"key2".to_vec(), b"key3".to_vec()]);
    }

    #[test]
    fn write_cdb_stores_arbitrary_length_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raw.cdb");
        let entries = vec![(b"short".to_vec(), b"x".to_vec()), (b"long".to_vec(), vec![7u8; 200])];
        write_cdb(&path, &entries).unwrap();

        let reader = CdbReader::new(LocalByteSource::open(&path));
        assert_eq!(reader.get_raw(b"short").unwrap(), Some(b"x".to_vec()));
        assert_eq!(reader.get_raw(b"long").unwrap(), Some(vec![7u8; 200]));
    }

    #[test]
    fn empty_cdb_has_no_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.cdb");
        write_int_cdb(&path, &[]).unwrap();
        let reader = CdbReader::new(LocalByteSource::open(&path));
        assert!(reader.keys().unwrap().is_empty());
        assert_eq!(reader.get_int(b"anything").unwrap(), None);
    }
}
