//! Request signing primitives shared by the S3 and OSS stores.
//!
//! Both providers use the same HMAC-SHA256 key-derivation ladder and differ
//! only in the secret prefix, the service name and the scope terminator.

use std::collections::BTreeMap;

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

/// Derive the per-day signing key:
/// `HMAC(HMAC(HMAC(HMAC(prefix + secret, date), region), service), terminator)`.
pub fn derive_signing_key(
    secret_prefix: &str,
    secret: &str,
    date: &str,
    region: &str,
    service: &str,
    terminator: &str,
) -> Vec<u8> {
    let key = format!("{}{}", secret_prefix, secret);
    let k_date = hmac_sha256(key.as_bytes(), date.as_bytes());
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, service.as_bytes());
    hmac_sha256(&k_service, terminator.as_bytes())
}

pub fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC key length ok");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// URI-encode every segment of an object key, keeping the `/` separators.
pub fn encode_key(key: &str) -> String {
    key.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Canonical query string: parameters sorted by name, names and values
/// URI-encoded, value-less parameters rendered as the bare name.
pub fn canonical_query(params: &BTreeMap<String, Option<String>>) -> String {
    params
        .iter()
        .map(|(name, value)| match value {
            Some(v) => format!("{}={}", urlencoding::encode(name), urlencoding::encode(v)),
            None => urlencoding::encode(name).into_owned(),
        })
        .collect::<Vec<_>>()
        .join("&")
}

/// Canonical header block (`name:value\n` per header) and the matching
/// signed-headers list. Names are expected to be lowercase already.
pub fn canonical_headers(headers: &BTreeMap<String, String>) -> (String, String) {
    let block: String = headers
        .iter()
        .map(|(k, v)| format!("{}:{}\n", k, v.trim()))
        .collect();
    let names = headers.keys().cloned().collect::<Vec<_>>().join(";");
    (block, names)
}
