//! Canonical hash preimages.
//!
//! The preimage of an entry is the byte string its content hash is computed
//! over. It is separate from the wire encoding: fields are written in declared
//! order, integers as fixed-width little endian, hashes raw, and every
//! variable-length field with a varint length prefix. Each hashed type spells
//! its preimage out by implementing [`WriteForHash`].

use btmd_consensus::Hash256;
use sha2::{Digest, Sha256};

use crate::encoding::Encoder;
use crate::hash::sha256;

#[derive(Default)]
pub struct HashWriter {
    inner: Encoder,
}

impl HashWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn u8(&mut self, value: u8) -> &mut Self {
        self.inner.write_u8(value);
        self
    }

    pub fn u32(&mut self, value: u32) -> &mut Self {
        self.inner.write_u32_le(value);
        self
    }

    pub fn u64(&mut self, value: u64) -> &mut Self {
        self.inner.write_u64_le(value);
        self
    }

    pub fn hash(&mut self, value: &Hash256) -> &mut Self {
        self.inner.write_hash(value);
        self
    }

    pub fn bytes(&mut self, value: &[u8]) -> &mut Self {
        self.inner.write_var_bytes(value);
        self
    }

    pub fn list<T: WriteForHash>(&mut self, items: &[T]) -> &mut Self {
        self.inner.write_varint(items.len() as u64);
        for item in items {
            item.write_for_hash(self);
        }
        self
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.inner.into_inner()
    }
}

pub trait WriteForHash {
    fn write_for_hash(&self, w: &mut HashWriter);

    fn hash_preimage(&self) -> Vec<u8> {
        let mut w = HashWriter::new();
        self.write_for_hash(&mut w);
        w.into_bytes()
    }
}

impl WriteForHash for Hash256 {
    fn write_for_hash(&self, w: &mut HashWriter) {
        w.hash(self);
    }
}

/// Identifier of a typed entry:
/// `sha256d("entryid:" || type || ":" || sha256(preimage))`.
pub fn entry_id<T: WriteForHash + ?Sized>(entry_type: &str, entry: &T) -> Hash256 {
    entry_id_from_preimage(entry_type, &entry.hash_preimage())
}

pub fn entry_id_from_preimage(entry_type: &str, preimage: &[u8]) -> Hash256 {
    let body = sha256(preimage);
    let mut outer = Sha256::new();
    outer.update(b"entryid:");
    outer.update(entry_type.as_bytes());
    outer.update(b":");
    outer.update(body);
    sha256(&outer.finalize())
}
