use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("bad url")]
    BadUrl,

    #[error("url scheme is not '{}'", crate::config::SCHEME)]
    BadScheme,

    #[error(
        "cipher is not supported, only {} are supported",
        crate::crypto::supported_cipher_names().join(",")
    )]
    BadCipher,

    #[error("password is not specified in url")]
    MissingPassword,

    #[error("host:port is not specified in url")]
    MissingAddress,

    #[error("cipher {0} is not supported")]
    UnsupportedCipher(String),

    #[error("bad CIDR block: {0}")]
    BadCidr(String),

    #[error("bad key length: {0}")]
    BadKeyLength(usize),

    #[error("key derivation failed")]
    KeyDerivation,

    #[error("encryption failed")]
    Encryption,

    #[error("message authentication failed")]
    Authentication,

    #[error("short packet: expected at least {expected} bytes, got {actual}")]
    PacketTooShort { expected: usize, actual: usize },

    #[error("short buffer")]
    ShortBuffer,

    #[error("stream is unusable after a previous failure")]
    Poisoned,

    #[error("out of addresses")]
    OutOfAddresses,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl From<Error> for io::Error {
    fn from(e: Error) -> Self {
        match e {
            Error::Io(e) => e,
            Error::Authentication
            | Error::PacketTooShort { .. }
            | Error::Encryption
            | Error::BadKeyLength(_)
            | Error::KeyDerivation => io::Error::new(io::ErrorKind::InvalidData, e),
            Error::ShortBuffer => io::Error::new(io::ErrorKind::InvalidInput, e),
            Error::Poisoned => io::Error::new(io::ErrorKind::BrokenPipe, e),
            e => io::Error::new(io::ErrorKind::Other, e),
        }
    }
}
