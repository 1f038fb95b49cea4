// master key and per-session subkey derivation

use hkdf::Hkdf;
use md5::{Digest, Md5};
use sha1::Sha1;

use crate::error::{Error, Result};

/// HKDF info shared by every suite and both directions.
pub(crate) const SUBKEY_INFO: &[u8] = b"ss-subkey";

const MD5_SIZE: usize = 16;

/// derive the master key from a password: D_i = MD5(D_{i-1} || password),
/// concatenated until `key_len` bytes are available.
///
/// This is fast on purpose. The password is a pre-shared secret, not a
/// human passphrase, and both peers must agree on the exact bytes.
pub fn derive_master_key(password: &str, key_len: usize) -> Vec<u8> {
    let mut key = Vec::with_capacity(key_len + MD5_SIZE);
    while key.len() < key_len {
        let prev = &key[key.len().saturating_sub(MD5_SIZE)..];
        let mut hasher = Md5::new();
        hasher.update(prev);
        hasher.update(password.as_bytes());
        let digest = hasher.finalize();
        key.extend_from_slice(&digest);
    }
    key.truncate(key_len);
    key
}

/// fill `out` with HKDF-SHA1(ikm = master, salt = salt, info = "ss-subkey")
pub fn derive_subkey(master: &[u8], salt: &[u8], out: &mut [u8]) -> Result<()> {
    Hkdf::<Sha1>::new(Some(salt), master)
        .expand(SUBKEY_INFO, out)
        .map_err(|_| Error::KeyDerivation)
}

/// same as [`derive_subkey`], allocating `out_len` bytes
pub fn expand_subkey(master: &[u8], salt: &[u8], out_len: usize) -> Result<Vec<u8>> {
    let mut out = vec![0u8; out_len];
    derive_subkey(master, salt, &mut out)?;
    Ok(out)
}
