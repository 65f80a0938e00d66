use btmd_consensus::Hash256;
use sha2::{Digest, Sha256};

fn to_hash(digest: &[u8]) -> Hash256 {
    let mut out = [0u8; 32];
    out.copy_from_slice(digest);
    out
}

pub fn sha256(data: &[u8]) -> Hash256 {
    to_hash(&Sha256::digest(data))
}

pub fn sha256d(data: &[u8]) -> Hash256 {
    to_hash(&Sha256::digest(Sha256::digest(data)))
}
