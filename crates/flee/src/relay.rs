use std::{
    io,
    net::{Shutdown, SocketAddr, TcpStream},
    thread,
};

use flee_core::{Cipher, StreamConn, StreamReader, StreamWriter};
use log::{debug, error, info};
use tokio::net::TcpListener;

/// Which side of the tunnel the accepted connections are on.
#[derive(Debug, Clone)]
pub enum Mode {
    /// accepted connections are encrypted, forward them in plain
    Server { forward: String },
    /// accepted connections are plain, tunnel them to `remote`
    Client { remote: String },
}

pub struct TunnelServer {
    listener: TcpListener,
    mode: Mode,
    cipher: Cipher,
}

impl TunnelServer {
    pub async fn new(addr: &str, mode: Mode, cipher: Cipher) -> io::Result<Self> {
        info!("Starting tunnel {:?} on {}", mode, addr);
        Ok(Self {
            listener: TcpListener::bind(addr).await?,
            mode,
            cipher,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub async fn serve(&mut self) -> io::Result<()> {
        loop {
            let (stream, peer) = self.listener.accept().await?;
            info!("Accepted connection from {}", peer);

            let mode = self.mode.clone();
            let cipher = self.cipher.clone();
            tokio::spawn(async move {
                let res = match stream.into_std() {
                    Ok(stream) => {
                        tokio::task::spawn_blocking(move || handle(stream, &mode, cipher)).await
                    }
                    Err(e) => Ok(Err(e)),
                };
                match res {
                    Ok(Ok((up, down))) => {
                        info!("Closed {}: {} bytes up, {} bytes down", peer, up, down)
                    }
                    Ok(Err(e)) => error!("Error handling {}: {}", peer, e),
                    Err(e) => error!("Relay task for {} failed: {}", peer, e),
                }
            });
        }
    }
}

/// Returns the bytes relayed towards and back from the far side.
fn handle(stream: TcpStream, mode: &Mode, cipher: Cipher) -> io::Result<(u64, u64)> {
    stream.set_nonblocking(false)?;
    match mode {
        Mode::Server { forward } => {
            let target = TcpStream::connect(forward)?;
            debug!("Forwarding to {}", forward);
            let (reader, writer) = StreamConn::new(stream, cipher).split()?;
            let (down, up) = relay(reader, writer, target)?;
            Ok((up, down))
        }
        Mode::Client { remote } => {
            let (reader, writer) = StreamConn::connect(remote, cipher)?.split()?;
            debug!("Tunnelling to {}", remote);
            relay(reader, writer, stream)
        }
    }
}

/// Pump plain bytes into the tunnel on a second thread and tunnel bytes back
/// to the plain side on this one, until both directions are done. Returns
/// `(plain -> tunnel, tunnel -> plain)` byte counts.
fn relay(
    mut reader: StreamReader<TcpStream>,
    mut writer: StreamWriter<TcpStream>,
    plain: TcpStream,
) -> io::Result<(u64, u64)> {
    let mut plain_rx = plain.try_clone()?;
    let upstream = thread::spawn(move || {
        let res = writer.read_from(&mut plain_rx);
        match res {
            Ok(_) => {
                writer.get_ref().shutdown(Shutdown::Write).ok();
            }
            Err(_) => {
                // unblock the downstream direction
                writer.get_ref().shutdown(Shutdown::Both).ok();
                plain_rx.shutdown(Shutdown::Both).ok();
            }
        }
        res
    });

    let mut plain_tx = plain;
    let down = reader.write_to(&mut plain_tx);
    match down {
        Ok(_) => {
            plain_tx.shutdown(Shutdown::Write).ok();
        }
        Err(_) => {
            // unblock the upstream thread
            plain_tx.shutdown(Shutdown::Both).ok();
            reader.get_ref().shutdown(Shutdown::Both).ok();
        }
    }

    let up = upstream
        .join()
        .map_err(|_| io::Error::new(io::ErrorKind::Other, "upstream relay panicked"))?;
    Ok((up?, down?))
}
