//! Length-delimited AEAD framing over a byte stream.
//!
//! Each direction starts with the sender's random salt, followed by frames:
//!
//! ```text
//! +--------------------------+----------------------------------+
//! | seal(len_be16) (2 + tag) | seal(payload[..len]) (len + tag) |
//! +--------------------------+----------------------------------+
//! ```
//!
//! Both sub-records of a frame advance the same little-endian nonce, which
//! starts at zero for every direction of every session.

use std::{
    io::{self, Read, Write},
    net::{Shutdown, SocketAddr, TcpStream},
};

use log::{debug, trace, warn};
use rand::RngCore;

use crate::{
    aead::Aead,
    crypto::Cipher,
    error::{Error, Result},
    protocol::{FrameHeader, Nonce, LENGTH_SIZE, PAYLOAD_MAX_SIZE},
};

/// Seals payloads into frames for one direction of a session.
pub struct FrameEncoder {
    aead: Aead,
    nonce: Nonce,
    buf: Vec<u8>,
}

impl FrameEncoder {
    pub fn new(aead: Aead) -> Self {
        let overhead = aead.overhead();
        Self {
            nonce: Nonce::new(aead.nonce_size()),
            buf: Vec::with_capacity(LENGTH_SIZE + overhead + PAYLOAD_MAX_SIZE + overhead),
            aead,
        }
    }

    /// Append one sealed frame carrying `payload` to `out`.
    pub fn encode(&mut self, payload: &[u8], out: &mut Vec<u8>) -> Result<()> {
        if payload.len() > PAYLOAD_MAX_SIZE {
            return Err(Error::ShortBuffer);
        }
        let overhead = self.aead.overhead();

        let header = out.len();
        out.extend_from_slice(&FrameHeader::new(payload.len()).encode());
        out.resize(header + LENGTH_SIZE + overhead, 0);
        self.aead
            .seal_in_place(self.nonce.as_bytes(), &mut out[header..])?;
        self.nonce.increment();

        let body = out.len();
        out.extend_from_slice(payload);
        out.resize(body + payload.len() + overhead, 0);
        self.aead.seal_in_place(self.nonce.as_bytes(), &mut out[body..])?;
        self.nonce.increment();
        Ok(())
    }

    /// Seal `payload` and hand the whole frame to `w` in one `write_all`.
    pub fn write_frame<W: Write>(&mut self, w: &mut W, payload: &[u8]) -> Result<()> {
        let mut buf = std::mem::take(&mut self.buf);
        buf.clear();
        let res = self
            .encode(payload, &mut buf)
            .and_then(|_| w.write_all(&buf).map_err(Error::from));
        self.buf = buf;
        res
    }
}

/// Opens frames for one direction of a session and keeps the part of the
/// last frame the caller has not taken yet.
pub struct FrameDecoder {
    aead: Aead,
    nonce: Nonce,
    buf: Vec<u8>,
    // debris is buf[pos..end]
    pos: usize,
    end: usize,
}

impl FrameDecoder {
    pub fn new(aead: Aead) -> Self {
        let overhead = aead.overhead();
        Self {
            nonce: Nonce::new(aead.nonce_size()),
            buf: vec![0u8; PAYLOAD_MAX_SIZE + overhead],
            aead,
            pos: 0,
            end: 0,
        }
    }

    /// Read and open the next frame, returning its payload. `None` means the
    /// stream ended cleanly on a frame boundary.
    pub fn decode<R: Read>(&mut self, r: &mut R) -> Result<Option<&[u8]>> {
        if !self.fetch(r)? {
            return Ok(None);
        }
        let (pos, end) = (self.pos, self.end);
        self.pos = end;
        Ok(Some(&self.buf[pos..end]))
    }

    /// Decoded bytes not delivered yet.
    pub fn pending(&self) -> &[u8] {
        &self.buf[self.pos..self.end]
    }

    fn fetch<R: Read>(&mut self, r: &mut R) -> Result<bool> {
        let overhead = self.aead.overhead();

        let header = &mut self.buf[..LENGTH_SIZE + overhead];
        if !read_full(r, header)? {
            return Ok(false);
        }
        let opened = self.aead.open_in_place(self.nonce.as_bytes(), header);
        self.nonce.increment();
        opened.map_err(authentication_failed)?;
        let len = FrameHeader::decode([header[0], header[1]]).payload_len();

        let body = &mut self.buf[..len + overhead];
        r.read_exact(body)?;
        let opened = self.aead.open_in_place(self.nonce.as_bytes(), body);
        self.nonce.increment();
        opened.map_err(authentication_failed)?;

        trace!("opened frame of {} bytes", len);
        self.pos = 0;
        self.end = len;
        Ok(true)
    }

    fn read<R: Read>(&mut self, r: &mut R, dst: &mut [u8]) -> Result<usize> {
        // empty frames are skipped so that 0 keeps meaning end of stream
        while self.pos == self.end {
            if !self.fetch(r)? {
                return Ok(0);
            }
        }
        let n = dst.len().min(self.end - self.pos);
        dst[..n].copy_from_slice(&self.buf[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }

    fn write_to<R: Read, W: Write>(&mut self, r: &mut R, w: &mut W) -> Result<u64> {
        let mut n = 0u64;
        loop {
            if self.pos < self.end {
                w.write_all(&self.buf[self.pos..self.end])?;
                n += (self.end - self.pos) as u64;
                self.pos = self.end;
            }
            if !self.fetch(r)? {
                return Ok(n);
            }
        }
    }
}

fn authentication_failed(e: Error) -> Error {
    warn!("stream frame failed to open: {}", e);
    e
}

/// Like `read_exact`, but `Ok(false)` if the stream ends before the first byte.
fn read_full<R: Read>(r: &mut R, buf: &mut [u8]) -> io::Result<bool> {
    let mut read = 0;
    while read < buf.len() {
        match r.read(&mut buf[read..]) {
            Ok(0) if read == 0 => return Ok(false),
            Ok(0) => return Err(io::ErrorKind::UnexpectedEof.into()),
            Ok(n) => read += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(true)
}

/// Sending direction: inactive until the first write puts the salt on the wire.
struct WriteState {
    cipher: Cipher,
    encoder: Option<FrameEncoder>,
    poisoned: bool,
}

impl WriteState {
    fn new(cipher: Cipher) -> Self {
        Self {
            cipher,
            encoder: None,
            poisoned: false,
        }
    }

    fn encoder<W: Write>(&mut self, w: &mut W) -> Result<&mut FrameEncoder> {
        let encoder = match self.encoder.take() {
            Some(encoder) => encoder,
            None => {
                let mut salt = vec![0u8; self.cipher.salt_size()];
                rand::thread_rng().fill_bytes(&mut salt);
                let aead = self.cipher.create_aead(&salt)?;
                w.write_all(&salt)?;
                debug!("stream writer active with {:?}", self.cipher.kind());
                FrameEncoder::new(aead)
            }
        };
        Ok(self.encoder.insert(encoder))
    }

    fn guard<T>(&mut self, res: Result<T>) -> Result<T> {
        if res.is_err() {
            self.poisoned = true;
        }
        res
    }

    fn write_frame<W: Write>(&mut self, w: &mut W, payload: &[u8]) -> Result<()> {
        if self.poisoned {
            return Err(Error::Poisoned);
        }
        let res = self.encoder(w).and_then(|e| e.write_frame(w, payload));
        self.guard(res)
    }

    fn write_all<W: Write>(&mut self, w: &mut W, data: &[u8]) -> Result<()> {
        for chunk in data.chunks(PAYLOAD_MAX_SIZE) {
            self.write_frame(w, chunk)?;
        }
        Ok(())
    }

    /// End of `r` is not an error; returns the number of bytes consumed.
    fn read_from<R: Read, W: Write>(&mut self, w: &mut W, r: &mut R) -> Result<u64> {
        let mut chunk = vec![0u8; PAYLOAD_MAX_SIZE];
        let mut n = 0u64;
        loop {
            let nr = match r.read(&mut chunk) {
                Ok(0) => return Ok(n),
                Ok(nr) => nr,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };
            self.write_frame(w, &chunk[..nr])?;
            n += nr as u64;
        }
    }
}

/// Receiving direction: inactive until the first read takes the peer's salt.
struct ReadState {
    cipher: Cipher,
    decoder: Option<FrameDecoder>,
    poisoned: bool,
}

impl ReadState {
    fn new(cipher: Cipher) -> Self {
        Self {
            cipher,
            decoder: None,
            poisoned: false,
        }
    }

    fn decoder<R: Read>(&mut self, r: &mut R) -> Result<Option<&mut FrameDecoder>> {
        let decoder = match self.decoder.take() {
            Some(decoder) => decoder,
            None => {
                let mut salt = vec![0u8; self.cipher.salt_size()];
                if !read_full(r, &mut salt)? {
                    return Ok(None);
                }
                let aead = self.cipher.create_aead(&salt)?;
                debug!("stream reader active with {:?}", self.cipher.kind());
                FrameDecoder::new(aead)
            }
        };
        Ok(Some(self.decoder.insert(decoder)))
    }

    fn guard<T>(&mut self, res: Result<T>) -> Result<T> {
        if res.is_err() {
            self.poisoned = true;
        }
        res
    }

    fn read<R: Read>(&mut self, r: &mut R, dst: &mut [u8]) -> Result<usize> {
        if self.poisoned {
            return Err(Error::Poisoned);
        }
        if dst.is_empty() {
            return Ok(0);
        }
        let res = match self.decoder(r) {
            Ok(Some(decoder)) => decoder.read(r, dst),
            Ok(None) => Ok(0),
            Err(e) => Err(e),
        };
        self.guard(res)
    }

    /// Debris first, then whole frames until the stream ends.
    fn write_to<R: Read, W: Write>(&mut self, r: &mut R, w: &mut W) -> Result<u64> {
        if self.poisoned {
            return Err(Error::Poisoned);
        }
        let res = match self.decoder(r) {
            Ok(Some(decoder)) => decoder.write_to(r, w),
            Ok(None) => Ok(0),
            Err(e) => Err(e),
        };
        self.guard(res)
    }
}

/// Decrypting reader over the receiving half of a stream.
pub struct StreamReader<R> {
    inner: R,
    state: ReadState,
}

impl<R: Read> StreamReader<R> {
    pub fn new(inner: R, cipher: Cipher) -> Self {
        Self {
            inner,
            state: ReadState::new(cipher),
        }
    }

    /// Copy everything left in the stream to `w`. The end of the underlying
    /// stream counts as success.
    pub fn write_to<W: Write>(&mut self, w: &mut W) -> io::Result<u64> {
        Ok(self.state.write_to(&mut self.inner, w)?)
    }

    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> Read for StreamReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(self.state.read(&mut self.inner, buf)?)
    }
}

/// Encrypting writer over the sending half of a stream.
pub struct StreamWriter<W> {
    inner: W,
    state: WriteState,
}

impl<W: Write> StreamWriter<W> {
    pub fn new(inner: W, cipher: Cipher) -> Self {
        Self {
            inner,
            state: WriteState::new(cipher),
        }
    }

    /// Emit exactly one frame. Unlike `write`, an empty payload still
    /// produces a frame.
    pub fn write_frame(&mut self, payload: &[u8]) -> io::Result<()> {
        Ok(self.state.write_frame(&mut self.inner, payload)?)
    }

    /// Encrypt everything `r` yields until it ends.
    pub fn read_from<R: Read>(&mut self, r: &mut R) -> io::Result<u64> {
        Ok(self.state.read_from(&mut self.inner, r)?)
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for StreamWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.state.write_all(&mut self.inner, buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Both directions of an encrypted session over one duplex stream.
pub struct StreamConn<S> {
    inner: S,
    read: ReadState,
    write: WriteState,
}

impl<S: Read + Write> StreamConn<S> {
    pub fn new(inner: S, cipher: Cipher) -> Self {
        Self {
            inner,
            read: ReadState::new(cipher.clone()),
            write: WriteState::new(cipher),
        }
    }

    /// see [`StreamReader::write_to`]
    pub fn write_to<W: Write>(&mut self, w: &mut W) -> io::Result<u64> {
        Ok(self.read.write_to(&mut self.inner, w)?)
    }

    /// see [`StreamWriter::read_from`]
    pub fn read_from<R: Read>(&mut self, r: &mut R) -> io::Result<u64> {
        Ok(self.write.read_from(&mut self.inner, r)?)
    }

    /// see [`StreamWriter::write_frame`]
    pub fn write_frame(&mut self, payload: &[u8]) -> io::Result<()> {
        Ok(self.write.write_frame(&mut self.inner, payload)?)
    }

    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: Read + Write> Read for StreamConn<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(self.read.read(&mut self.inner, buf)?)
    }
}

impl<S: Read + Write> Write for StreamConn<S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.write.write_all(&mut self.inner, buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl StreamConn<TcpStream> {
    pub fn connect(addr: &str, cipher: Cipher) -> io::Result<Self> {
        let stream = TcpStream::connect(addr)?;
        Ok(Self::new(stream, cipher))
    }

    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.inner.peer_addr()
    }

    pub fn shutdown(&self, how: Shutdown) -> io::Result<()> {
        self.inner.shutdown(how)
    }

    /// Separate the two directions so they can be driven from different
    /// threads. Directions that are already active stay active.
    pub fn split(self) -> io::Result<(StreamReader<TcpStream>, StreamWriter<TcpStream>)> {
        let reader = StreamReader {
            inner: self.inner.try_clone()?,
            state: self.read,
        };
        let writer = StreamWriter {
            inner: self.inner,
            state: self.write,
        };
        Ok((reader, writer))
    }
}
