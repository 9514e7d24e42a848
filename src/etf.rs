//! Erlang External Term Format (tag 131) codec.
//!
//! Covers the term model used by the Leveled storage engine's on-disk
//! structures: atoms, integers (small/fixed/arbitrary precision), floats,
//! binaries, strings, lists (proper and improper), tuples, maps, the
//! pid/port/reference identifier families, and the zlib compressed
//! wrapper. Tag bytes and canonical encode choices below follow known-good
//! byte-for-byte fixtures rather than a from-scratch reading of the OTP
//! documentation.

use std::io::{Cursor, Read};

use byteorder::{ReadBytesExt, WriteBytesExt, BE};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use num_bigint::{BigInt, Sign};
use num_traits::{ToPrimitive, Zero};

use crate::error::{Error, Result};

const VERSION: u8 = 0x83;

const TAG_OLD_ATOM: u8 = 0x64;
const TAG_OLD_PORT: u8 = 0x66;
const TAG_SMALL_ATOM: u8 = 0x73;
const TAG_UTF8_ATOM: u8 = 0x76;
const TAG_SMALL_UTF8_ATOM: u8 = 0x77;
const TAG_SMALL_INT: u8 = 0x61;
const TAG_INT: u8 = 0x62;
const TAG_FLOAT: u8 = 0x46;
const TAG_NIL: u8 = 0x6A;
const TAG_STRING: u8 = 0x6B;
const TAG_LIST: u8 = 0x6C;
const TAG_SMALL_TUPLE: u8 = 0x68;
const TAG_LARGE_TUPLE: u8 = 0x69;
const TAG_BINARY: u8 = 0x6D;
const TAG_SMALL_BIG: u8 = 0x6E;
const TAG_LARGE_BIG: u8 = 0x6F;
const TAG_MAP: u8 = 0x74;
const TAG_OLD_PID: u8 = 0x67;
const TAG_NEW_PID: u8 = 0x58;
const TAG_NEW_REF: u8 = 0x72;
const TAG_NEWER_REF: u8 = 0x5A;
const TAG_NEW_PORT: u8 = 0x59;
const TAG_BIT_BINARY: u8 = 0x4D;
const TAG_COMPRESSED: u8 = 0x50;

/// Atom source encoding, part of an atom's identity for equality purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AtomEncoding {
    Latin1,
    Utf8,
}

#[derive(Debug, Clone)]
pub enum Term {
    Atom {
        name: Vec<u8>,
        encoding: AtomEncoding,
    },
    /// Predefined atom `true`/`false`, decoded to a host boolean.
    Bool(bool),
    /// Predefined atom `undefined`, decoded to a host null-sentinel.
    Undefined,
    SmallInt(u8),
    Int(i32),
    BigInt(BigInt),
    Float(f64),
    Binary {
        data: Vec<u8>,
        /// Number of significant bits in the last byte; 8 for a regular binary.
        bits: u8,
    },
    /// Short byte-string form (tag 0x6B).
    Str(Vec<u8>),
    List {
        elements: Vec<Term>,
        /// `Some(tail)` for an improper list; `None` for a nil-terminated one.
        tail: Option<Box<Term>>,
    },
    Tuple(Vec<Term>),
    /// Unordered association list; compared as a multiset of pairs.
    Map(Vec<(Term, Term)>),
    Pid {
        node: Box<Term>,
        id: Vec<u8>,
        serial: Vec<u8>,
        creation: Vec<u8>,
        new: bool,
    },
    Port {
        node: Box<Term>,
        id: Vec<u8>,
        creation: Vec<u8>,
        new: bool,
    },
    Reference {
        node: Box<Term>,
        creation: Vec<u8>,
        ids: Vec<u8>,
        /// Which reference tag (0x72 / 0x5A) this was decoded from.
        newer: bool,
    },
}

impl Term {
    pub fn atom(name: impl Into<Vec<u8>>) -> Term {
        let name = name.into();
        let encoding = if name.iter().any(|&b| b > 0x7F) {
            AtomEncoding::Utf8
        } else {
            AtomEncoding::Latin1
        };
        Term::Atom { name, encoding }
    }

    pub fn binary(data: impl Into<Vec<u8>>) -> Term {
        Term::Binary {
            data: data.into(),
            bits: 8,
        }
    }

    pub fn tuple(elements: Vec<Term>) -> Term {
        Term::Tuple(elements)
    }

    pub fn proper_list(elements: Vec<Term>) -> Term {
        Term::List {
            elements,
            tail: None,
        }
    }

    /// Build the smallest integer representation for `v`.
    pub fn integer(v: impl Into<BigInt>) -> Term {
        make_int(v.into())
    }

    pub fn as_binary(&self) -> Option<&[u8]> {
        match self {
            Term::Binary { data, .. } => Some(data),
            _ => None,
        }
    }

    pub fn as_atom_name(&self) -> Option<&[u8]> {
        match self {
            Term::Atom { name, .. } => Some(name),
            _ => None,
        }
    }

    pub fn as_tuple(&self) -> Option<&[Term]> {
        match self {
            Term::Tuple(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Term]> {
        match self {
            Term::List { elements, .. } => Some(elements),
            _ => None,
        }
    }

    pub fn as_bigint(&self) -> Option<BigInt> {
        match self {
            Term::SmallInt(v) => Some(BigInt::from(*v)),
            Term::Int(v) => Some(BigInt::from(*v)),
            Term::BigInt(v) => Some(v.clone()),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.as_bigint().and_then(|b| b.to_i64())
    }
}

fn make_int(v: BigInt) -> Term {
    if let Some(u) = v.to_u8() {
        return Term::SmallInt(u);
    }
    if let Some(i) = v.to_i32() {
        return Term::Int(i);
    }
    Term::BigInt(v)
}

impl PartialEq for Term {
    fn eq(&self, other: &Self) -> bool {
        use Term::*;
        match (self, other) {
            (Atom { name: n1, encoding: e1 }, Atom { name: n2, encoding: e2 }) => n1 == n2 && e1 == e2,
            (Bool(a), Bool(b)) => a == b,
            (Undefined, Undefined) => true,
            (Float(a), Float(b)) => a == b,
            (Binary { data: d1, bits: b1 }, Binary { data: d2, bits: b2 }) => d1 == d2 && b1 == b2,
            (Str(a), Str(b)) => a == b,
            (Tuple(a), Tuple(b)) => a == b,
            (List { elements: e1, tail: t1 }, List { elements: e2, tail: t2 }) => e1 == e2 && t1 == t2,
            (Map(a), Map(b)) => {
                a.len() == b.len()
                    && a.iter().all(|(k, v)| b.iter().any(|(k2, v2)| k == k2 && v == v2))
                    && b.iter().all(|(k, v)| a.iter().any(|(k2, v2)| k == k2 && v == v2))
            }
            (
                Pid { node: n1, id: i1, serial: s1, creation: c1, .. },
                Pid { node: n2, id: i2, serial: s2, creation: c2, .. },
            ) => n1 == n2 && i1 == i2 && s1 == s2 && c1 == c2,
            (Port { node: n1, id: i1, creation: c1, .. }, Port { node: n2, id: i2, creation: c2, .. }) => {
                n1 == n2 && i1 == i2 && c1 == c2
            }
            (
                Reference { node: n1, creation: c1, ids: i1, .. },
                Reference { node: n2, creation: c2, ids: i2, .. },
            ) => n1 == n2 && c1 == c2 && i1 == i2,
            _ => match (self.as_bigint(), other.as_bigint()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
        }
    }
}

/// Encode `term` without the top-level version marker or compression.
fn encode_term(term: &Term, out: &mut Vec<u8>) -> Result<()> {
    match term {
        Term::Bool(true) => encode_atom_bytes(out, TAG_OLD_ATOM, b"true"),
        Term::Bool(false) => encode_atom_bytes(out, TAG_OLD_ATOM, b"false"),
        Term::Undefined => encode_atom_bytes(out, TAG_OLD_ATOM, b"undefined"),
        Term::Atom { name, encoding } => encode_atom(out, name, *encoding)?,
        Term::SmallInt(v) => {
            out.push(TAG_SMALL_INT);
            out.push(*v);
        }
        Term::Int(v) => {
            out.push(TAG_INT);
            out.write_i32::<BE>(*v).unwrap();
        }
        Term::BigInt(v) => encode_bigint(out, v),
        Term::Float(v) => {
            out.push(TAG_FLOAT);
            out.write_f64::<BE>(*v).unwrap();
        }
        Term::Binary { data, bits } if *bits == 8 => {
            out.push(TAG_BINARY);
            out.write_u32::<BE>(data.len() as u32).unwrap();
            out.extend_from_slice(data);
        }
        Term::Binary { data, bits } => {
            out.push(TAG_BIT_BINARY);
            out.write_u32::<BE>(data.len() as u32).unwrap();
            out.push(*bits);
            out.extend_from_slice(data);
        }
        Term::Str(bytes) if bytes.len() <= 65535 => {
            out.push(TAG_STRING);
            out.write_u16::<BE>(bytes.len() as u16).unwrap();
            out.extend_from_slice(bytes);
        }
        Term::Str(bytes) => {
            // Longer than the string tag's u16 length can hold: fall back to
            // a proper list of small integers, one per byte.
            let elements: Vec<Term> = bytes.iter().map(|b| Term::SmallInt(*b)).collect();
            encode_list(out, &elements, &None)?;
        }
        Term::List { elements, tail } => encode_list(out, elements, tail)?,
        Term::Tuple(elements) => {
            if elements.len() <= 255 {
                out.push(TAG_SMALL_TUPLE);
                out.push(elements.len() as u8);
            } else {
                out.push(TAG_LARGE_TUPLE);
                out.write_u32::<BE>(elements.len() as u32).unwrap();
            }
            for e in elements {
                encode_term(e, out)?;
            }
        }
        Term::Map(pairs) => {
            out.push(TAG_MAP);
            out.write_u32::<BE>(pairs.len() as u32).unwrap();
            for (k, v) in pairs {
                encode_term(k, out)?;
                encode_term(v, out)?;
            }
        }
        Term::Pid { node, id, serial, creation, new } => {
            out.push(if *new { TAG_NEW_PID } else { TAG_OLD_PID });
            encode_term(node, out)?;
            out.extend_from_slice(id);
            out.extend_from_slice(serial);
            out.extend_from_slice(creation);
        }
        Term::Port { node, id, creation, new } => {
            out.push(if *new { TAG_NEW_PORT } else { TAG_OLD_PORT });
            encode_term(node, out)?;
            out.extend_from_slice(id);
            out.extend_from_slice(creation);
        }
        Term::Reference { node, creation, ids, newer } => {
            out.push(if *newer { TAG_NEWER_REF } else { TAG_NEW_REF });
            let len = (ids.len() / 4) as u16;
            out.write_u16::<BE>(len).unwrap();
            encode_term(node, out)?;
            out.extend_from_slice(creation);
            out.extend_from_slice(ids);
        }
    }
    Ok(())
}

fn encode_atom_bytes(out: &mut Vec<u8>, tag: u8, bytes: &[u8]) {
    out.push(tag);
    out.write_u16::<BE>(bytes.len() as u16).unwrap();
    out.extend_from_slice(bytes);
}

fn encode_atom(out: &mut Vec<u8>, name: &[u8], encoding: AtomEncoding) -> Result<()> {
    match encoding {
        AtomEncoding::Latin1 => {
            if name.len() > 255 {
                return Err(Error::output("atom longer than 255 characters (latin1)"));
            }
            out.push(TAG_SMALL_ATOM);
            out.push(name.len() as u8);
            out.extend_from_slice(name);
        }
        AtomEncoding::Utf8 => {
            if name.len() <= 255 {
                out.push(TAG_SMALL_UTF8_ATOM);
                out.push(name.len() as u8);
                out.extend_from_slice(name);
            } else if name.len() <= 65535 {
                out.push(TAG_UTF8_ATOM);
                out.write_u16::<BE>(name.len() as u16).unwrap();
                out.extend_from_slice(name);
            } else {
                return Err(Error::output("atom longer than 65535 bytes (utf8)"));
            }
        }
    }
    Ok(())
}

fn encode_bigint(out: &mut Vec<u8>, v: &BigInt) {
    let (sign, magnitude) = v.to_bytes_le();
    let sign_byte: u8 = if sign == Sign::Minus { 1 } else { 0 };
    if magnitude.len() <= 255 {
        out.push(TAG_SMALL_BIG);
        out.push(magnitude.len() as u8);
    } else {
        out.push(TAG_LARGE_BIG);
        out.write_u32::<BE>(magnitude.len() as u32).unwrap();
    }
    out.push(sign_byte);
    out.extend_from_slice(&magnitude);
}

fn encode_list(out: &mut Vec<u8>, elements: &[Term], tail: &Option<Box<Term>>) -> Result<()> {
    if elements.is_empty() && tail.is_none() {
        out.push(TAG_NIL);
        return Ok(());
    }
    out.push(TAG_LIST);
    out.write_u32::<BE>(elements.len() as u32).unwrap();
    for e in elements {
        encode_term(e, out)?;
    }
    match tail {
        Some(t) => encode_term(t, out)?,
        None => out.push(TAG_NIL),
    }
    Ok(())
}

/// Encode `term` with the mandatory version marker, optionally wrapping the
/// body in the zlib compressed-term representation (tag 0x50).
pub fn encode(term: &Term, compressed: Option<u32>) -> Result<Vec<u8>> {
    let mut body = Vec::new();
    encode_term(term, &mut body)?;

    let mut out = Vec::with_capacity(body.len() + 6);
    out.push(VERSION);
    match compressed {
        Some(level) => {
            let mut enc = ZlibEncoder::new(Vec::new(), Compression::new(level));
            use std::io::Write;
            enc.write_all(&body).map_err(Error::from)?;
            let compressed_body = enc.finish().map_err(Error::from)?;
            out.push(TAG_COMPRESSED);
            out.write_u32::<BE>(body.len() as u32).unwrap();
            out.extend_from_slice(&compressed_body);
        }
        None => out.extend_from_slice(&body),
    }
    Ok(out)
}

/// Decode a full buffer, requiring the `0x83` version marker and that the
/// entire buffer is consumed by exactly one term.
pub fn decode(bytes: &[u8]) -> Result<Term> {
    if bytes.is_empty() || bytes[0] != VERSION {
        return Err(Error::parse("missing or invalid ETF version marker"));
    }
    let (term, consumed) = decode_term(&bytes[1..])?;
    if consumed != bytes.len() - 1 {
        return Err(Error::parse("trailing bytes after top-level term"));
    }
    Ok(term)
}

fn need(bytes: &[u8], n: usize) -> Result<()> {
    if bytes.len() < n {
        Err(Error::parse("truncated buffer"))
    } else {
        Ok(())
    }
}

/// Decode one term starting at the beginning of `bytes`, returning the term
/// and the number of bytes consumed.
fn decode_term(bytes: &[u8]) -> Result<(Term, usize)> {
    need(bytes, 1)?;
    let tag = bytes[0];
    let rest = &bytes[1..];
    match tag {
        TAG_OLD_ATOM | TAG_SMALL_ATOM | TAG_UTF8_ATOM | TAG_SMALL_UTF8_ATOM => decode_atom(tag, rest),
        TAG_SMALL_INT => {
            need(rest, 1)?;
            Ok((Term::SmallInt(rest[0]), 2))
        }
        TAG_INT => {
            need(rest, 4)?;
            let v = Cursor::new(&rest[..4]).read_i32::<BE>().unwrap();
            Ok((Term::Int(v), 5))
        }
        TAG_FLOAT => {
            need(rest, 8)?;
            let v = Cursor::new(&rest[..8]).read_f64::<BE>().unwrap();
            Ok((Term::Float(v), 9))
        }
        TAG_SMALL_BIG | TAG_LARGE_BIG => decode_bigint(tag, rest),
        TAG_NIL => Ok((Term::List { elements: Vec::new(), tail: None }, 1)),
        TAG_STRING => {
            need(rest, 2)?;
            let len = Cursor::new(&rest[..2]).read_u16::<BE>().unwrap() as usize;
            need(&rest[2..], len)?;
            Ok((Term::Str(rest[2..2 + len].to_vec()), 3 + len))
        }
        TAG_LIST => decode_list(rest),
        TAG_SMALL_TUPLE => {
            need(rest, 1)?;
            let arity = rest[0] as usize;
            decode_tuple(&rest[1..], arity, 2)
        }
        TAG_LARGE_TUPLE => {
            need(rest, 4)?;
            let arity = Cursor::new(&rest[..4]).read_u32::<BE>().unwrap() as usize;
            decode_tuple(&rest[4..], arity, 5)
        }
        TAG_BINARY => {
            need(rest, 4)?;
            let len = Cursor::new(&rest[..4]).read_u32::<BE>().unwrap() as usize;
            need(&rest[4..], len)?;
            Ok((
                Term::Binary { data: rest[4..4 + len].to_vec(), bits: 8 },
                5 + len,
            ))
        }
        TAG_BIT_BINARY => {
            need(rest, 5)?;
            let len = Cursor::new(&rest[..4]).read_u32::<BE>().unwrap() as usize;
            let bits = rest[4];
            need(&rest[5..], len)?;
            Ok((
                Term::Binary { data: rest[5..5 + len].to_vec(), bits },
                6 + len,
            ))
        }
        TAG_MAP => decode_map(rest),
        TAG_OLD_PID | TAG_NEW_PID => decode_pid(tag == TAG_NEW_PID, rest),
        TAG_OLD_PORT | TAG_NEW_PORT => decode_port(tag == TAG_NEW_PORT, rest),
        TAG_NEW_REF | TAG_NEWER_REF => decode_reference(tag == TAG_NEWER_REF, rest),
        TAG_COMPRESSED => decode_compressed(rest),
        other => Err(Error::parse(format!("unknown ETF tag 0x{:02x}", other))),
    }
}

fn decode_atom(tag: u8, rest: &[u8]) -> Result<(Term, usize)> {
    let (len, header_len) = match tag {
        TAG_OLD_ATOM | TAG_UTF8_ATOM => {
            need(rest, 2)?;
            (Cursor::new(&rest[..2]).read_u16::<BE>().unwrap() as usize, 2)
        }
        _ => {
            need(rest, 1)?;
            (rest[0] as usize, 1)
        }
    };
    need(&rest[header_len..], len)?;
    let name = rest[header_len..header_len + len].to_vec();
    let consumed = 1 + header_len + len;

    let encoding = match tag {
        TAG_OLD_ATOM | TAG_SMALL_ATOM => AtomEncoding::Latin1,
        TAG_UTF8_ATOM | TAG_SMALL_UTF8_ATOM => AtomEncoding::Utf8,
        _ => unreachable!(),
    };

    let term = match name.as_slice() {
        b"true" => Term::Bool(true),
        b"false" => Term::Bool(false),
        b"undefined" => Term::Undefined,
        _ => Term::Atom { name, encoding },
    };
    Ok((term, consumed))
}

fn decode_bigint(tag: u8, rest: &[u8]) -> Result<(Term, usize)> {
    let (byte_count, header_len) = if tag == TAG_SMALL_BIG {
        need(rest, 1)?;
        (rest[0] as usize, 1)
    } else {
        need(rest, 4)?;
        (Cursor::new(&rest[..4]).read_u32::<BE>().unwrap() as usize, 4)
    };
    need(&rest[header_len..], 1 + byte_count)?;
    let sign_byte = rest[header_len];
    let magnitude = &rest[header_len + 1..header_len + 1 + byte_count];
    let mut v = BigInt::from_bytes_le(Sign::Plus, magnitude);
    if sign_byte == 1 && !v.is_zero() {
        v = -v;
    }
    Ok((Term::BigInt(v), 1 + header_len + 1 + byte_count))
}

fn decode_list(rest: &[u8]) -> Result<(Term, usize)> {
    need(rest, 4)?;
    let count = Cursor::new(&rest[..4]).read_u32::<BE>().unwrap() as usize;
    let mut offset = 4;
    let mut elements = Vec::with_capacity(count);
    for _ in 0..count {
        let (term, used) = decode_term(&rest[offset..])?;
        elements.push(term);
        offset += used;
    }
    let (tail_term, tail_used) = decode_term(&rest[offset..])?;
    offset += tail_used;
    let tail = match &tail_term {
        Term::List { elements, tail: None } if elements.is_empty() => None,
        _ => Some(Box::new(tail_term)),
    };
    Ok((Term::List { elements, tail }, 1 + offset))
}

fn decode_tuple(rest: &[u8], arity: usize, header_consumed: usize) -> Result<(Term, usize)> {
    let mut offset = 0;
    let mut elements = Vec::with_capacity(arity);
    for _ in 0..arity {
        let (term, used) = decode_term(&rest[offset..])?;
        elements.push(term);
        offset += used;
    }
    Ok((Term::Tuple(elements), header_consumed + offset))
}

fn decode_map(rest: &[u8]) -> Result<(Term, usize)> {
    need(rest, 4)?;
    let arity = Cursor::new(&rest[..4]).read_u32::<BE>().unwrap() as usize;
    let mut offset = 4;
    let mut pairs = Vec::with_capacity(arity);
    for _ in 0..arity {
        let (k, used_k) = decode_term(&rest[offset..])?;
        offset += used_k;
        let (v, used_v) = decode_term(&rest[offset..])?;
        offset += used_v;
        pairs.push((k, v));
    }
    Ok((Term::Map(pairs), 1 + offset))
}

fn decode_pid(new: bool, rest: &[u8]) -> Result<(Term, usize)> {
    let (node, node_len) = decode_term(rest)?;
    let creation_len = if new { 4 } else { 1 };
    need(&rest[node_len..], 4 + 4 + creation_len)?;
    let base = node_len;
    let id = rest[base..base + 4].to_vec();
    let serial = rest[base + 4..base + 8].to_vec();
    let creation = rest[base + 8..base + 8 + creation_len].to_vec();
    Ok((
        Term::Pid { node: Box::new(node), id, serial, creation, new },
        1 + base + 8 + creation_len,
    ))
}

fn decode_port(new: bool, rest: &[u8]) -> Result<(Term, usize)> {
    let (node, node_len) = decode_term(rest)?;
    let creation_len = if new { 4 } else { 1 };
    need(&rest[node_len..], 4 + creation_len)?;
    let base = node_len;
    let id = rest[base..base + 4].to_vec();
    let creation = rest[base + 4..base + 4 + creation_len].to_vec();
    Ok((
        Term::Port { node: Box::new(node), id, creation, new },
        1 + base + 4 + creation_len,
    ))
}

fn decode_reference(newer: bool, rest: &[u8]) -> Result<(Term, usize)> {
    need(rest, 2)?;
    let id_words = Cursor::new(&rest[..2]).read_u16::<BE>().unwrap() as usize;
    let (node, node_len) = decode_term(&rest[2..])?;
    let creation_len = if newer { 4 } else { 1 };
    let base = 2 + node_len;
    need(&rest[base..], creation_len + id_words * 4)?;
    let creation = rest[base..base + creation_len].to_vec();
    let ids = rest[base + creation_len..base + creation_len + id_words * 4].to_vec();
    Ok((
        Term::Reference { node: Box::new(node), creation, ids, newer },
        1 + base + creation_len + id_words * 4,
    ))
}

fn decode_compressed(rest: &[u8]) -> Result<(Term, usize)> {
    need(rest, 4)?;
    let uncompressed_len = Cursor::new(&rest[..4]).read_u32::<BE>().unwrap() as usize;
    let mut decoder = ZlibDecoder::new(Cursor::new(&rest[4..]));
    let mut body = Vec::with_capacity(uncompressed_len);
    decoder
        .read_to_end(&mut body)
        .map_err(|e| Error::parse(format!("bad compressed term: {e}")))?;
    if body.len() != uncompressed_len {
        return Err(Error::parse("compressed term length mismatch"));
    }
    let consumed_by_stream = decoder.total_in() as usize;
    let (term, _) = decode_term(&body)?;
    Ok((term, 1 + 4 + consumed_by_stream))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_small_int() {
        assert_eq!(decode(b"\x83a\xff").unwrap(), Term::SmallInt(255));
    }

    #[test]
    fn decode_negative_int() {
        assert_eq!(decode(b"\x83b\xff\xff\xff\xff").unwrap(), Term::Int(-1));
    }

    #[test]
    fn decode_float() {
        match decode(b"\x83F?\xf8\0\0\0\0\0\0").unwrap() {
            Term::Float(v) => assert_eq!(v, 1.5),
            other => panic!("expected float, got {other:?}"),
        }
    }

    #[test]
    fn decode_bool_and_undefined() {
        assert_eq!(decode(b"\x83d\x00\x04true").unwrap(), Term::Bool(true));
        assert_eq!(decode(b"\x83d\x00\x05false").unwrap(), Term::Bool(false));
        assert_eq!(decode(b"\x83d\x00\tundefined").unwrap(), Term::Undefined);
    }

    #[test]
    fn encode_bool_and_undefined_roundtrip() {
        assert_eq!(encode(&Term::Bool(true), None).unwrap(), b"\x83d\x00\x04true");
        assert_eq!(encode(&Term::Bool(false), None).unwrap(), b"\x83d\x00\x05false");
        assert_eq!(encode(&Term::Undefined, None).unwrap(), b"\x83d\x00\tundefined");
    }

    #[test]
    fn big_integer_promotion() {
        let two_pow_31 = BigInt::from(1u64 << 31);
        let encoded = encode(&make_int(two_pow_31.clone()), None).unwrap();
        assert_eq!(&encoded, b"\x83n\x04\x00\x00\x00\x00\x80");
        let decoded = decode(&encoded).unwrap();
        assert_eq!(decoded.as_bigint().unwrap(), two_pow_31);

        let neg = -(BigInt::from(1u64 << 31) + BigInt::from(1u8));
        let encoded_neg = encode(&make_int(neg.clone()), None).unwrap();
        assert_eq!(&encoded_neg, b"\x83n\x04\x01\x01\x00\x00\x80");
        assert_eq!(decode(&encoded_neg).unwrap().as_bigint().unwrap(), neg);
    }

    #[test]
    fn compressed_wrapper_round_trip() {
        let inner = Term::proper_list(vec![Term::proper_list(vec![]); 15]);
        let encoded = encode(&inner, Some(6)).unwrap();
        assert_eq!(&encoded[..6], b"\x83P\x00\x00\x00\x15");
        let decoded = decode(&encoded).unwrap();
        assert_eq!(decoded, inner);
    }

    #[test]
    fn atom_round_trip_ascii() {
        let a = Term::atom("stnd");
        let encoded = encode(&a, None).unwrap();
        assert_eq!(&encoded, b"\x83s\x04stnd");
        assert_eq!(decode(&encoded).unwrap(), a);
    }

    #[test]
    fn binary_round_trip() {
        let b = Term::binary(b"hello".to_vec());
        let encoded = encode(&b, None).unwrap();
        assert_eq!(decode(&encoded).unwrap(), b);
    }

    #[test]
    fn tuple_and_list_round_trip() {
        let t = Term::tuple(vec![Term::integer(BigInt::from(1)), Term::atom("stnd")]);
        assert_eq!(decode(&encode(&t, None).unwrap()).unwrap(), t);

        let improper = Term::List {
            elements: vec![Term::SmallInt(1)],
            tail: Some(Box::new(Term::SmallInt(2))),
        };
        assert_eq!(decode(&encode(&improper, None).unwrap()).unwrap(), improper);
    }

    #[test]
    fn map_round_trip_unordered() {
        let m = Term::Map(vec![
            (Term::atom("a"), Term::SmallInt(1)),
            (Term::atom("b"), Term::SmallInt(2)),
        ]);
        let encoded = encode(&m, None).unwrap();
        assert_eq!(decode(&encoded).unwrap(), m);
    }

    #[test]
    fn oversized_string_falls_back_to_int_list() {
        let bytes: Vec<u8> = (0..=255u16).cycle().take(70_000).map(|v| v as u8).collect();
        let s = Term::Str(bytes.clone());
        let encoded = encode(&s, None).unwrap();
        assert_eq!(encoded[1], TAG_LIST);
        let decoded = decode(&encoded).unwrap();
        let elements = decoded.as_list().unwrap();
        assert_eq!(elements.len(), bytes.len());
        for (term, b) in elements.iter().zip(&bytes) {
            assert_eq!(*term, Term::SmallInt(*b));
        }
    }

    #[test]
    fn trailing_bytes_rejected() {
        let mut bytes = encode(&Term::SmallInt(1), None).unwrap();
        bytes.push(0);
        assert!(decode(&bytes).is_err());
    }

    #[test]
    fn unknown_tag_rejected() {
        assert!(decode(b"\x83\xEE").is_err());
    }

    proptest::proptest! {
        #[test]
        fn small_int_round_trips(v in 0u8..=255) {
            let t = Term::SmallInt(v);
            proptest::prop_assert_eq!(decode(&encode(&t, None).unwrap()).unwrap(), t);
        }

        #[test]
        fn signed_int_round_trips(v in i32::MIN..=i32::MAX) {
            let t = Term::Int(v);
            proptest::prop_assert_eq!(decode(&encode(&t, None).unwrap()).unwrap(), t);
        }

        #[test]
        fn binary_round_trips(data in proptest::collection::vec(proptest::prelude::any::<u8>(), 0..128)) {
            let t = Term::binary(data);
            proptest::prop_assert_eq!(decode(&encode(&t, None).unwrap()).unwrap(), t);
        }

        #[test]
        fn atom_latin1_round_trips(name in "[a-z][a-z0-9_]{0,30}") {
            let t = Term::atom(name);
            proptest::prop_assert_eq!(decode(&encode(&t, None).unwrap()).unwrap(), t);
        }

        #[test]
        fn tuple_of_ints_round_trips(values in proptest::collection::vec(0u8..=255, 0..16)) {
            let t = Term::tuple(values.into_iter().map(Term::SmallInt).collect());
            proptest::prop_assert_eq!(decode(&encode(&t, None).unwrap()).unwrap(), t);
        }

        #[test]
        fn compressed_wrapper_round_trips(data in proptest::collection::vec(proptest::prelude::any::<u8>(), 0..256)) {
            let t = Term::binary(data);
            let encoded = encode(&t, Some(6)).unwrap();
            proptest::prop_assert_eq!(decode(&encoded).unwrap(), t);
        }
    }
}
