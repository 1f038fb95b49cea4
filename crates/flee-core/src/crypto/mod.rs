mod kdf;

use std::fmt;

use log::trace;

use crate::{
    aead::{Aead, TAG_SIZE},
    config,
    error::{Error, Result},
};

pub use kdf::{derive_master_key, derive_subkey, expand_subkey};

/// The AEAD suites a [`Cipher`] can be built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CipherKind {
    ChaCha20Poly1305,
    Aes128Gcm,
    Aes192Gcm,
    Aes256Gcm,
    /// No encryption at all, for debugging.
    #[cfg(feature = "dummy")]
    Dummy,
}

impl CipherKind {
    pub fn key_size(self) -> usize {
        match self {
            CipherKind::ChaCha20Poly1305 => 32,
            CipherKind::Aes128Gcm => 16,
            CipherKind::Aes192Gcm => 24,
            CipherKind::Aes256Gcm => 32,
            #[cfg(feature = "dummy")]
            CipherKind::Dummy => 32,
        }
    }

    /// AES-GCM salts are as long as the key; ChaCha20-Poly1305 always uses 32.
    pub fn salt_size(self) -> usize {
        match self {
            CipherKind::ChaCha20Poly1305 => 32,
            CipherKind::Aes128Gcm | CipherKind::Aes192Gcm | CipherKind::Aes256Gcm => {
                self.key_size()
            }
            #[cfg(feature = "dummy")]
            CipherKind::Dummy => 32,
        }
    }

    pub fn nonce_size(self) -> usize {
        match self {
            #[cfg(feature = "dummy")]
            CipherKind::Dummy => 16,
            _ => 12,
        }
    }

    pub fn overhead(self) -> usize {
        match self {
            #[cfg(feature = "dummy")]
            CipherKind::Dummy => 0,
            _ => TAG_SIZE,
        }
    }
}

/// One entry of the cipher registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CipherDescriptor {
    pub name: &'static str,
    pub key_size: usize,
    pub kind: CipherKind,
}

/// Every suite this build understands. The first entry is the default.
pub static SUPPORTED_CIPHERS: &[CipherDescriptor] = &[
    CipherDescriptor {
        name: "AEAD_CHACHA20_POLY1305",
        key_size: 32,
        kind: CipherKind::ChaCha20Poly1305,
    },
    CipherDescriptor {
        name: "AEAD_AES_128_GCM",
        key_size: 16,
        kind: CipherKind::Aes128Gcm,
    },
    CipherDescriptor {
        name: "AEAD_AES_192_GCM",
        key_size: 24,
        kind: CipherKind::Aes192Gcm,
    },
    CipherDescriptor {
        name: "AEAD_AES_256_GCM",
        key_size: 32,
        kind: CipherKind::Aes256Gcm,
    },
    #[cfg(feature = "dummy")]
    CipherDescriptor {
        name: "AEAD_DUMMY",
        key_size: 32,
        kind: CipherKind::Dummy,
    },
];

pub fn supported_cipher_names() -> Vec<&'static str> {
    SUPPORTED_CIPHERS.iter().map(|d| d.name).collect()
}

pub fn default_cipher_name() -> &'static str {
    SUPPORTED_CIPHERS[0].name
}

/// look up a descriptor by its canonical name
pub fn find_cipher(name: &str) -> Option<&'static CipherDescriptor> {
    SUPPORTED_CIPHERS.iter().find(|d| d.name == name)
}

/// A suite plus the master key derived from the shared password.
///
/// `create_aead` is pure in (master key, salt): both peers build the same
/// AEAD from the salt that travels on the wire.
#[derive(Clone)]
pub struct Cipher {
    kind: CipherKind,
    key: Vec<u8>,
}

impl Cipher {
    pub fn new(kind: CipherKind, key: Vec<u8>) -> Result<Self> {
        if key.len() != kind.key_size() {
            return Err(Error::BadKeyLength(key.len()));
        }
        Ok(Self { kind, key })
    }

    pub fn kind(&self) -> CipherKind {
        self.kind
    }

    pub fn key_size(&self) -> usize {
        self.kind.key_size()
    }

    pub fn salt_size(&self) -> usize {
        self.kind.salt_size()
    }

    pub fn nonce_size(&self) -> usize {
        self.kind.nonce_size()
    }

    pub fn overhead(&self) -> usize {
        self.kind.overhead()
    }

    /// build the AEAD keyed with the subkey for `salt`
    pub fn create_aead(&self, salt: &[u8]) -> Result<Aead> {
        let mut subkey = vec![0u8; self.key_size()];
        derive_subkey(&self.key, salt, &mut subkey)?;
        Aead::new(self.kind, &subkey)
    }
}

impl fmt::Debug for Cipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cipher").field("kind", &self.kind).finish()
    }
}

/// create a Cipher from a suite name (aliases accepted) and a password
pub fn new_cipher(name: &str, password: &str) -> Result<Cipher> {
    let desc = config::resolve_cipher_name(name)
        .and_then(find_cipher)
        .ok_or_else(|| Error::UnsupportedCipher(name.to_string()))?;
    trace!("creating cipher {}", desc.name);
    let key = derive_master_key(password, desc.key_size);
    Cipher::new(desc.kind, key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_cipher() {
        let c = new_cipher("AEAD_CHACHA20_POLY1305", "hello").unwrap();
        assert_eq!(c.kind(), CipherKind::ChaCha20Poly1305);
        assert_eq!(c.key_size(), 32);
        assert_eq!(c.salt_size(), 32);
        assert_eq!(c.nonce_size(), 12);

        let c = new_cipher("AEAD_AES_128_GCM", "hello").unwrap();
        assert_eq!(c.kind(), CipherKind::Aes128Gcm);
        assert_eq!(c.key_size(), 16);
        assert_eq!(c.salt_size(), 16);
    }

    #[test]
    fn test_new_cipher_accepts_aliases() {
        let c = new_cipher("aes-192-gcm", "hello").unwrap();
        assert_eq!(c.kind(), CipherKind::Aes192Gcm);
        assert_eq!(c.salt_size(), 24);
    }

    #[test]
    fn test_new_cipher_rejects_unknown() {
        assert!(matches!(
            new_cipher("rc4-md5", "hello"),
            Err(Error::UnsupportedCipher(_))
        ));
    }

    #[test]
    fn test_cipher_rejects_bad_key_length() {
        assert!(matches!(
            Cipher::new(CipherKind::Aes256Gcm, vec![0u8; 16]),
            Err(Error::BadKeyLength(16))
        ));
    }

    #[test]
    fn test_registry_key_sizes_match_kinds() {
        for desc in SUPPORTED_CIPHERS {
            assert_eq!(desc.key_size, desc.kind.key_size(), "{}", desc.name);
        }
        assert_eq!(default_cipher_name(), "AEAD_CHACHA20_POLY1305");
    }

    #[test]
    fn test_all_ciphers_agree_on_same_salt() {
        for name in supported_cipher_names() {
            let c = new_cipher(name, "hello").unwrap();
            let salt = b"world";
            let nonce = vec![7u8; c.nonce_size()];

            let mut sealed = b"hello world!".to_vec();
            sealed.resize(sealed.len() + c.overhead(), 0);
            let aead1 = c.create_aead(salt).unwrap();
            aead1.seal_in_place(&nonce, &mut sealed).unwrap();

            let mut sealed_again = b"hello world!".to_vec();
            sealed_again.resize(sealed_again.len() + c.overhead(), 0);
            c.create_aead(salt)
                .unwrap()
                .seal_in_place(&nonce, &mut sealed_again)
                .unwrap();
            assert_eq!(sealed, sealed_again, "{}", name);

            let aead2 = c.create_aead(salt).unwrap();
            let n = aead2.open_in_place(&nonce, &mut sealed).unwrap();
            assert_eq!(&sealed[..n], b"hello world!", "{}", name);
        }
    }

    #[test]
    fn test_different_passwords_do_not_interoperate() {
        for name in supported_cipher_names() {
            let a = new_cipher(name, "hello").unwrap();
            let b = new_cipher(name, "world").unwrap();
            let nonce = vec![0u8; a.nonce_size()];
            let mut buf = b"secret".to_vec();
            buf.resize(buf.len() + a.overhead(), 0);
            a.create_aead(b"salt").unwrap().seal_in_place(&nonce, &mut buf).unwrap();
            if a.overhead() > 0 {
                assert!(b.create_aead(b"salt").unwrap().open_in_place(&nonce, &mut buf).is_err());
            }
        }
    }

    #[cfg(feature = "dummy")]
    #[test]
    fn test_dummy_cipher() {
        assert!(supported_cipher_names().contains(&"AEAD_DUMMY"));
        let c = new_cipher("AEAD_DUMMY", "hello").unwrap();
        assert_eq!(c.kind(), CipherKind::Dummy);
        assert_eq!(c.overhead(), 0);
        assert_eq!(c.nonce_size(), 16);

        let nonce = [3u8; 16];
        let mut buf = b"hello world!".to_vec();
        c.create_aead(b"world").unwrap().seal_in_place(&nonce, &mut buf).unwrap();
        assert_eq!(buf, b"hello world!");
        let n = c.create_aead(b"world").unwrap().open_in_place(&nonce, &mut buf).unwrap();
        assert_eq!(&buf[..n], b"hello world!");
    }
}
