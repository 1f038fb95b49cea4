use aes::Aes192;
use aes_gcm::{
    aead::{
        consts::U12,
        generic_array::{typenum::Unsigned, GenericArray},
        AeadCore, AeadInPlace, KeyInit,
    },
    Aes128Gcm, Aes256Gcm, AesGcm,
};
use chacha20poly1305::ChaCha20Poly1305;

use crate::{
    crypto::CipherKind,
    error::{Error, Result},
};

type Aes192Gcm = AesGcm<Aes192, U12>;

/// Tag length of every registered suite (GCM and Poly1305 alike).
pub(crate) const TAG_SIZE: usize = 16;

/// An AEAD keyed with one session (or packet) subkey.
pub enum Aead {
    ChaCha20Poly1305(Box<ChaCha20Poly1305>),
    Aes128Gcm(Box<Aes128Gcm>),
    Aes192Gcm(Box<Aes192Gcm>),
    Aes256Gcm(Box<Aes256Gcm>),
    #[cfg(feature = "dummy")]
    Dummy,
}

impl Aead {
    pub fn new(kind: CipherKind, key: &[u8]) -> Result<Self> {
        let aead = match kind {
            CipherKind::ChaCha20Poly1305 => {
                ChaCha20Poly1305::new_from_slice(key).map(|c| Aead::ChaCha20Poly1305(Box::new(c)))
            }
            CipherKind::Aes128Gcm => {
                Aes128Gcm::new_from_slice(key).map(|c| Aead::Aes128Gcm(Box::new(c)))
            }
            CipherKind::Aes192Gcm => {
                Aes192Gcm::new_from_slice(key).map(|c| Aead::Aes192Gcm(Box::new(c)))
            }
            CipherKind::Aes256Gcm => {
                Aes256Gcm::new_from_slice(key).map(|c| Aead::Aes256Gcm(Box::new(c)))
            }
            #[cfg(feature = "dummy")]
            CipherKind::Dummy => Ok(Aead::Dummy),
        };
        aead.map_err(|_| Error::BadKeyLength(key.len()))
    }

    pub fn nonce_size(&self) -> usize {
        match self {
            Aead::ChaCha20Poly1305(_) => nonce_size_of::<ChaCha20Poly1305>(),
            Aead::Aes128Gcm(_) => nonce_size_of::<Aes128Gcm>(),
            Aead::Aes192Gcm(_) => nonce_size_of::<Aes192Gcm>(),
            Aead::Aes256Gcm(_) => nonce_size_of::<Aes256Gcm>(),
            #[cfg(feature = "dummy")]
            Aead::Dummy => 16,
        }
    }

    /// Bytes added to every sealed record.
    pub fn overhead(&self) -> usize {
        match self {
            #[cfg(feature = "dummy")]
            Aead::Dummy => 0,
            _ => TAG_SIZE,
        }
    }

    /// Seal `buf[..buf.len() - overhead]` in place and write the tag into the
    /// trailing `overhead` bytes.
    pub fn seal_in_place(&self, nonce: &[u8], buf: &mut [u8]) -> Result<()> {
        match self {
            Aead::ChaCha20Poly1305(c) => seal_detached(c.as_ref(), nonce, buf),
            Aead::Aes128Gcm(c) => seal_detached(c.as_ref(), nonce, buf),
            Aead::Aes192Gcm(c) => seal_detached(c.as_ref(), nonce, buf),
            Aead::Aes256Gcm(c) => seal_detached(c.as_ref(), nonce, buf),
            #[cfg(feature = "dummy")]
            Aead::Dummy => Ok(()),
        }
    }

    /// Open `buf` (ciphertext followed by tag) in place. Returns the length of
    /// the plaintext, which starts at `buf[0]`.
    pub fn open_in_place(&self, nonce: &[u8], buf: &mut [u8]) -> Result<usize> {
        let overhead = self.overhead();
        if buf.len() < overhead {
            return Err(Error::PacketTooShort {
                expected: overhead,
                actual: buf.len(),
            });
        }
        let (msg, tag) = buf.split_at_mut(buf.len() - overhead);
        self.open_detached(nonce, msg, tag)?;
        Ok(msg.len())
    }

    /// Decrypt `msg` in place, checking it against a tag stored elsewhere.
    pub fn open_detached(&self, nonce: &[u8], msg: &mut [u8], tag: &[u8]) -> Result<()> {
        match self {
            Aead::ChaCha20Poly1305(c) => decrypt_detached(c.as_ref(), nonce, msg, tag),
            Aead::Aes128Gcm(c) => decrypt_detached(c.as_ref(), nonce, msg, tag),
            Aead::Aes192Gcm(c) => decrypt_detached(c.as_ref(), nonce, msg, tag),
            Aead::Aes256Gcm(c) => decrypt_detached(c.as_ref(), nonce, msg, tag),
            #[cfg(feature = "dummy")]
            Aead::Dummy => Ok(()),
        }
    }
}

fn nonce_size_of<A: AeadCore>() -> usize {
    A::NonceSize::USIZE
}

fn seal_detached<A: AeadInPlace>(cipher: &A, nonce: &[u8], buf: &mut [u8]) -> Result<()> {
    let tag_size = A::TagSize::USIZE;
    if nonce.len() != A::NonceSize::USIZE {
        return Err(Error::Encryption);
    }
    if buf.len() < tag_size {
        return Err(Error::ShortBuffer);
    }
    let (msg, tag) = buf.split_at_mut(buf.len() - tag_size);
    let computed = cipher
        .encrypt_in_place_detached(GenericArray::from_slice(nonce), b"", msg)
        .map_err(|_| Error::Encryption)?;
    tag.copy_from_slice(&computed);
    Ok(())
}

fn decrypt_detached<A: AeadInPlace>(
    cipher: &A,
    nonce: &[u8],
    msg: &mut [u8],
    tag: &[u8],
) -> Result<()> {
    if nonce.len() != A::NonceSize::USIZE || tag.len() != A::TagSize::USIZE {
        return Err(Error::Authentication);
    }
    cipher
        .decrypt_in_place_detached(
            GenericArray::from_slice(nonce),
            b"",
            msg,
            GenericArray::from_slice(tag),
        )
        .map_err(|_| Error::Authentication)
}
