pub mod aead;
pub mod config;
pub mod crypto;
pub mod error;
pub mod packet;
pub mod pool;
pub mod protocol;
pub mod stream;

pub use config::{resolve_cipher_name, Config};
pub use crypto::{new_cipher, supported_cipher_names, Cipher, CipherKind};
pub use error::{Error, Result};
pub use packet::{open_packet, seal_packet, PacketConn};
pub use pool::AddressPool;
pub use protocol::{PACKET_MAX_SIZE, PAYLOAD_MAX_SIZE};
pub use stream::{StreamConn, StreamReader, StreamWriter};
