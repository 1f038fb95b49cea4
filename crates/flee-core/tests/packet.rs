use std::{collections::HashSet, io, net::UdpSocket, sync::Arc, thread, time::Duration};

use flee_core::{new_cipher, PacketConn, PACKET_MAX_SIZE};

fn bind(cipher: &flee_core::Cipher) -> PacketConn {
    let conn = PacketConn::bind("127.0.0.1:0", cipher.clone()).unwrap();
    conn.socket()
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    conn
}

#[test]
fn test_packet_exchange() {
    let cipher = new_cipher("chacha20-poly1305", "test password").unwrap();
    let a = bind(&cipher);
    let b = bind(&cipher);
    let mut buf = vec![0u8; PACKET_MAX_SIZE];

    for msg in [&b"hello"[..], &b""[..], &[0xABu8; 1400][..]] {
        assert_eq!(a.send_to(msg, b.local_addr().unwrap()).unwrap(), msg.len());
        let (n, from) = b.recv_from(&mut buf).unwrap();
        assert_eq!(&buf[..n], msg);
        assert_eq!(from, a.local_addr().unwrap());

        b.send_to(&buf[..n], from).unwrap();
        let (n, _) = a.recv_from(&mut buf).unwrap();
        assert_eq!(&buf[..n], msg);
    }
}

#[test]
fn test_wrong_key_is_dropped() {
    let a = bind(&new_cipher("aes-192-gcm", "one").unwrap());
    let b = bind(&new_cipher("aes-192-gcm", "two").unwrap());
    let mut buf = vec![0u8; PACKET_MAX_SIZE];

    a.send_to(b"secret", b.local_addr().unwrap()).unwrap();
    let err = b.recv_from(&mut buf).unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::InvalidData);
}

#[test]
fn test_plain_datagram_is_rejected() {
    let conn = bind(&new_cipher("aes-128-gcm", "test password").unwrap());
    let raw = UdpSocket::bind("127.0.0.1:0").unwrap();
    let mut buf = vec![0u8; PACKET_MAX_SIZE];

    raw.send_to(b"short", conn.local_addr().unwrap()).unwrap();
    let err = conn.recv_from(&mut buf).unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::InvalidData);

    raw.send_to(&[0u8; 64], conn.local_addr().unwrap()).unwrap();
    let err = conn.recv_from(&mut buf).unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::InvalidData);
}

fn datagram(sender: u8, seq: u8) -> Vec<u8> {
    let fill = sender.wrapping_mul(31).wrapping_add(seq);
    let mut msg = vec![sender, seq];
    msg.resize(2 + 100 + seq as usize, fill);
    msg
}

#[test]
fn test_concurrent_senders_share_one_conn() {
    let cipher = new_cipher("aes-256-gcm", "test password").unwrap();
    let a = Arc::new(bind(&cipher));
    let b = bind(&cipher);
    let to = b.local_addr().unwrap();

    let senders: Vec<_> = (0..4u8)
        .map(|sender| {
            let a = a.clone();
            thread::spawn(move || {
                for seq in 0..25u8 {
                    a.send_to(&datagram(sender, seq), to).unwrap();
                }
            })
        })
        .collect();

    let mut buf = vec![0u8; PACKET_MAX_SIZE];
    let mut seen = HashSet::new();
    for _ in 0..100 {
        let (n, _) = b.recv_from(&mut buf).unwrap();
        let (sender, seq) = (buf[0], buf[1]);
        assert_eq!(&buf[..n], &datagram(sender, seq)[..]);
        assert!(seen.insert((sender, seq)));
    }
    for s in senders {
        s.join().unwrap();
    }
    assert_eq!(seen.len(), 100);
}
