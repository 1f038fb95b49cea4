/// Largest payload carried by one stream frame (16 KiB - 1).
pub const PAYLOAD_MAX_SIZE: usize = 0x3FFF;

/// Buffer size for one datagram, usually 64k.
pub const PACKET_MAX_SIZE: usize = 64 * 1024;

/// Size of the sealed length prefix of a stream frame, before the tag.
pub(crate) const LENGTH_SIZE: usize = 2;

/// Widest nonce among the registered suites.
pub(crate) const MAX_NONCE_SIZE: usize = 16;

/// Widest salt among the registered suites.
pub(crate) const MAX_SALT_SIZE: usize = 32;

/// The nonce every packet is sealed with; the per-packet salt keeps the
/// (subkey, nonce) pair unique.
pub(crate) const ZERO_NONCE: [u8; MAX_NONCE_SIZE] = [0u8; MAX_NONCE_SIZE];

/// Little-endian counter used as the AEAD nonce of one stream direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Nonce {
    bytes: [u8; MAX_NONCE_SIZE],
    len: usize,
}

impl Nonce {
    /// A zero nonce of `len` bytes. `len` is clamped to the widest supported nonce.
    pub fn new(len: usize) -> Self {
        Self {
            bytes: [0u8; MAX_NONCE_SIZE],
            len: len.min(MAX_NONCE_SIZE),
        }
    }

    /// Adds one, carrying towards the most significant (last) byte. Wraps to
    /// zero once every byte overflows.
    pub fn increment(&mut self) {
        for b in self.bytes[..self.len].iter_mut() {
            *b = b.wrapping_add(1);
            if *b != 0 {
                return;
            }
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len]
    }
}

/// The plaintext of the first sub-record of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub(crate) struct FrameHeader {
    pub(crate) len: u16,
}

impl FrameHeader {
    pub(crate) fn new(len: usize) -> Self {
        Self {
            len: (len & PAYLOAD_MAX_SIZE) as u16,
        }
    }

    pub(crate) fn encode(&self) -> [u8; LENGTH_SIZE] {
        self.len.to_be_bytes()
    }

    /// Top two bits are dropped; the tag check is what rejects corruption.
    pub(crate) fn decode(buf: [u8; LENGTH_SIZE]) -> Self {
        Self::new(u16::from_be_bytes(buf) as usize)
    }

    pub(crate) fn payload_len(&self) -> usize {
        self.len as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nonce_starts_at_zero() {
        let nonce = Nonce::new(12);
        assert_eq!(nonce.as_bytes(), &[0u8; 12]);
    }

    #[test]
    fn nonce_is_little_endian() {
        let mut nonce = Nonce::new(12);
        nonce.increment();
        assert_eq!(nonce.as_bytes()[0], 1);
        for _ in 0..255 {
            nonce.increment();
        }
        assert_eq!(&nonce.as_bytes()[..3], &[0, 1, 0]);
    }

    #[test]
    fn nonce_wraps_on_overflow() {
        let mut nonce = Nonce::new(2);
        for _ in 0..0xFFFF {
            nonce.increment();
        }
        assert_eq!(nonce.as_bytes(), &[0xFF, 0xFF]);
        nonce.increment();
        assert_eq!(nonce.as_bytes(), &[0, 0]);
    }

    #[test]
    fn header_masks_top_bits() {
        let header = FrameHeader::decode([0xFF, 0xFF]);
        assert_eq!(header.payload_len(), PAYLOAD_MAX_SIZE);

        let header = FrameHeader::decode([0x40, 0x05]);
        assert_eq!(header.payload_len(), 5);
    }

    #[test]
    fn header_is_big_endian() {
        assert_eq!(FrameHeader::new(0x1234).encode(), [0x12, 0x34]);
    }
}
