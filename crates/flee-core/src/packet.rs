//! Self-contained AEAD datagrams: `salt || seal(zero_nonce, payload)`.
//!
//! Every packet carries its own salt, so the subkey differs per packet and a
//! fixed all-zero nonce is safe. Nothing is shared between packets; they can
//! be opened in any order, duplicated or lost.

use std::{
    io,
    net::{SocketAddr, ToSocketAddrs, UdpSocket},
    sync::Mutex,
};

use log::{trace, warn};
use rand::RngCore;

use crate::{
    crypto::Cipher,
    error::{Error, Result},
    protocol::{MAX_SALT_SIZE, PACKET_MAX_SIZE, ZERO_NONCE},
};

/// Encrypt `plain` into `dst` and return the sealed packet, a prefix of `dst`.
pub fn seal_packet<'a>(dst: &'a mut [u8], plain: &[u8], cipher: &Cipher) -> Result<&'a [u8]> {
    let salt_size = cipher.salt_size();
    let total = salt_size + plain.len() + cipher.overhead();
    if dst.len() < total {
        return Err(Error::ShortBuffer);
    }

    let (salt, body) = dst.split_at_mut(salt_size);
    rand::thread_rng().fill_bytes(salt);
    let aead = cipher.create_aead(salt)?;

    let body = &mut body[..plain.len() + aead.overhead()];
    body[..plain.len()].copy_from_slice(plain);
    aead.seal_in_place(&ZERO_NONCE[..aead.nonce_size()], body)?;
    Ok(&dst[..total])
}

/// Decrypt the packet `src` into `dst`, which needs room for the plaintext
/// only. Returns the plaintext, a prefix of `dst`.
pub fn open_packet<'a>(dst: &'a mut [u8], src: &[u8], cipher: &Cipher) -> Result<&'a [u8]> {
    check_len(src.len(), cipher)?;
    let (salt, sealed) = src.split_at(cipher.salt_size());
    let (ciphertext, tag) = sealed.split_at(sealed.len() - cipher.overhead());
    let n = ciphertext.len();
    if dst.len() < n {
        return Err(Error::ShortBuffer);
    }

    let aead = cipher.create_aead(salt)?;
    dst[..n].copy_from_slice(ciphertext);
    aead.open_detached(&ZERO_NONCE[..aead.nonce_size()], &mut dst[..n], tag)?;
    Ok(&dst[..n])
}

/// Open a packet in place, moving the plaintext to the front of `buf`.
fn open_in_place(buf: &mut [u8], cipher: &Cipher) -> Result<usize> {
    check_len(buf.len(), cipher)?;
    let salt_size = cipher.salt_size();
    let mut salt = [0u8; MAX_SALT_SIZE];
    salt[..salt_size].copy_from_slice(&buf[..salt_size]);
    let aead = cipher.create_aead(&salt[..salt_size])?;

    let n = aead.open_in_place(&ZERO_NONCE[..aead.nonce_size()], &mut buf[salt_size..])?;
    buf.copy_within(salt_size..salt_size + n, 0);
    Ok(n)
}

/// A packet must hold at least a salt and a tag.
fn check_len(len: usize, cipher: &Cipher) -> Result<()> {
    let min = cipher.salt_size() + cipher.overhead();
    if len < min {
        return Err(Error::PacketTooShort {
            expected: min,
            actual: len,
        });
    }
    Ok(())
}

/// A UDP socket that seals every datagram it sends and opens every datagram
/// it receives.
///
/// `send_to` may be called from several threads at once; the scratch buffer
/// is locked for the whole seal-then-send sequence.
pub struct PacketConn {
    socket: UdpSocket,
    cipher: Cipher,
    buf: Mutex<Vec<u8>>,
}

impl PacketConn {
    pub fn new(socket: UdpSocket, cipher: Cipher) -> Self {
        Self {
            socket,
            cipher,
            buf: Mutex::new(vec![0u8; PACKET_MAX_SIZE]),
        }
    }

    pub fn bind<A: ToSocketAddrs>(addr: A, cipher: Cipher) -> io::Result<Self> {
        Ok(Self::new(UdpSocket::bind(addr)?, cipher))
    }

    /// Returns the number of plaintext bytes sent.
    pub fn send_to<A: ToSocketAddrs>(&self, buf: &[u8], addr: A) -> io::Result<usize> {
        let mut scratch = self
            .buf
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "packet buffer lock poisoned"))?;
        let packet = seal_packet(&mut scratch, buf, &self.cipher)?;
        self.socket.send_to(packet, addr)?;
        trace!("sent packet of {} bytes", buf.len());
        Ok(buf.len())
    }

    /// Receive one datagram into `buf` and decrypt it in place. `buf` must be
    /// large enough for the sealed datagram, not just the plaintext.
    pub fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        let (n, addr) = self.socket.recv_from(buf)?;
        match open_in_place(&mut buf[..n], &self.cipher) {
            Ok(n) => Ok((n, addr)),
            Err(e) => {
                warn!("dropping packet from {}: {}", addr, e);
                Err(e.into())
            }
        }
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn socket(&self) -> &UdpSocket {
        &self.socket
    }
}
