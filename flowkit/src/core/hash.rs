//! Digests over concatenated parts, as hex or url-safe base64.

use ::base64::Engine;
use ::base64::engine::general_purpose::URL_SAFE;
use md5::Md5;
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};

fn digest<D: Digest>(parts: &[&str]) -> Vec<u8> {
    let mut hasher = D::new();
    for part in parts {
        hasher.update(part.as_bytes());
    }
    hasher.finalize().to_vec()
}

pub fn md5(parts: &[&str]) -> String {
    hex::encode(digest::<Md5>(parts))
}

pub fn sha1(parts: &[&str]) -> String {
    hex::encode(digest::<Sha1>(parts))
}

pub fn sha256(parts: &[&str]) -> String {
    hex::encode(digest::<Sha256>(parts))
}

pub fn sha512(parts: &[&str]) -> String {
    hex::encode(digest::<Sha512>(parts))
}

/// Url-safe base64 variants (`-` and `_` instead of `+` and `/`, padded).
pub mod base64 {
    use super::{Engine, Md5, Sha1, Sha256, Sha512, URL_SAFE, digest};

    pub fn md5(parts: &[&str]) -> String {
        URL_SAFE.encode(digest::<Md5>(parts))
    }

    pub fn sha1(parts: &[&str]) -> String {
        URL_SAFE.encode(digest::<Sha1>(parts))
    }

    pub fn sha256(parts: &[&str]) -> String {
        URL_SAFE.encode(digest::<Sha256>(parts))
    }

    pub fn sha512(parts: &[&str]) -> String {
        URL_SAFE.encode(digest::<Sha512>(parts))
    }
}

/// First 8 hex characters of the SHA-256 of `value`. Safe in urls and file names.
pub fn short(value: &str) -> String {
    let mut full = sha256(&[value]);
    full.truncate(8);
    full
}
