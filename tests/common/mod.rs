//! Server-side fixtures shared by the integration tests.

#![allow(dead_code)]

use bytes::{Buf, BufMut};
use num_bigint::BigUint;
use termssh::{cipher::CipherKind, crypto, packet::Packet};

pub const SSH_MSG_DISCONNECT: u8 = 1;
pub const SSH_SMSG_PUBLIC_KEY: u8 = 2;
pub const SSH_CMSG_SESSION_KEY: u8 = 3;
pub const SSH_CMSG_USER: u8 = 4;
pub const SSH_CMSG_AUTH_PASSWORD: u8 = 9;
pub const SSH_CMSG_REQUEST_PTY: u8 = 10;
pub const SSH_CMSG_WINDOW_SIZE: u8 = 11;
pub const SSH_CMSG_EXEC_SHELL: u8 = 12;
pub const SSH_SMSG_SUCCESS: u8 = 14;
pub const SSH_SMSG_FAILURE: u8 = 15;
pub const SSH_CMSG_STDIN_DATA: u8 = 16;
pub const SSH_SMSG_STDOUT_DATA: u8 = 17;
pub const SSH_SMSG_STDERR_DATA: u8 = 18;
pub const SSH_SMSG_EXITSTATUS: u8 = 20;
pub const SSH_CMSG_EXIT_CONFIRMATION: u8 = 33;

pub const SSH2_MSG_DISCONNECT: u8 = 1;
pub const SSH2_MSG_SERVICE_REQUEST: u8 = 5;
pub const SSH2_MSG_SERVICE_ACCEPT: u8 = 6;
pub const SSH2_MSG_KEXINIT: u8 = 20;
pub const SSH2_MSG_NEWKEYS: u8 = 21;
pub const SSH2_MSG_KEXDH_INIT: u8 = 30;
pub const SSH2_MSG_KEXDH_REPLY: u8 = 31;

// 512-bit server key and 768-bit host key, both with e = 65537.
pub const SERVER_N: &str = "e7535e0e7298e207e5f67b7aae3ef3bca72d1ca34d180d09e226f450f786144d\
                            b2b2d32fe0eeeea5fd1ec10d967ebc87b703e75df249ef87ea324e4f1e49d99b";
pub const SERVER_D: &str = "b3160e9e1ec80f4d5012579c2da3dcecb37c304c9895c31a60b409b75939bb22\
                            c713950e9030caec0efc7967329c8291d49046b60a7a4cc56eba25d35bf7bf01";
pub const HOST_N: &str = "ec3671b1688305291b55d8813fa9b02c3719a6519719e228e3ccbda936643d8e\
                          6cd13b1fdfb90d6f00bda3d8e99233dee5ebc633aa00918fa43f4963faccdc34\
                          2cfe62d0d6cdee213c5a3727e27fc1ce9939bda3a72bf95821416100ec5ee5f5";
pub const HOST_D: &str = "11c3064990d249510dfd268a917ef10062244b9d56ff5b4237deed640bf2fdad\
                          f800c3b161e14861506cf2251d6b20fb3cd1d354f9a7fd2d12b824861ba204e1\
                          1c0f575919d6e5aaae5e6c8abfec5d410e132ef1c6fbffb07ae12944aa4d1701";
pub const HOST_FINGERPRINT: &str = "4cd0a9012da70259fedbba1db3abc7ed";
pub const COOKIE: [u8; 8] = [1, 2, 3, 4, 5, 6, 7, 8];
pub const EXPONENT: [u8; 3] = [0x01, 0x00, 0x01];

pub const MASK_DES3: u32 = 1 << 3;
pub const MASK_TSS: u32 = 1 << 4;
pub const MASK_BLOWFISH: u32 = 1 << 6;
pub const AUTH_PASSWORD: u32 = 1 << 3;

pub fn unhex(s: &str) -> Vec<u8> {
    hex::decode(s).unwrap()
}

pub fn get_string(buf: &mut &[u8]) -> Vec<u8> {
    let len = buf.get_u32() as usize;
    let s = buf[..len].to_vec();
    buf.advance(len);
    s
}

pub fn put_string(buf: &mut Vec<u8>, s: &[u8]) {
    buf.put_u32(s.len() as u32);
    buf.put_slice(s);
}

/// RSA decryption followed by removal of the PKCS#1 type 2 padding.
pub fn rsa_decrypt(n: &str, d: &str, data: &[u8]) -> Vec<u8> {
    let n = BigUint::from_bytes_be(&unhex(n));
    let d = BigUint::from_bytes_be(&unhex(d));
    let k = ((n.bits() + 7) / 8) as usize;
    let m = BigUint::from_bytes_be(data).modpow(&d, &n).to_bytes_be();
    let mut block = vec![0u8; k - m.len()];
    block.extend_from_slice(&m);

    assert_eq!(&block[..2], &[0, 2]);
    let sep = 2 + block[2..].iter().position(|&b| b == 0).unwrap();
    assert!(sep >= 10, "padding too short");
    block[sep + 1..].to_vec()
}

/// `SSH_SMSG_PUBLIC_KEY` with the fixture keys and password authentication.
pub fn public_key_packet(cipher_mask: u32) -> Packet {
    Packet::builder(SSH_SMSG_PUBLIC_KEY)
        .put_slice(&COOKIE)
        .put_u32(512)
        .put_mpint1(&EXPONENT)
        .put_mpint1(&unhex(SERVER_N))
        .put_u32(768)
        .put_mpint1(&EXPONENT)
        .put_mpint1(&unhex(HOST_N))
        .put_u32(0)
        .put_u32(cipher_mask)
        .put_u32(AUTH_PASSWORD)
        .build()
}

/// Check an `SSH_CMSG_SESSION_KEY` and recover the chosen cipher and key.
pub fn recover_session_key(packet: &Packet) -> (CipherKind, [u8; 32]) {
    assert_eq!(packet.msg_type(), SSH_CMSG_SESSION_KEY);
    let mut rd = &packet.payload()[..];

    let kind = CipherKind::from_id(rd.get_u8()).unwrap();
    assert_eq!(&rd[..8], &COOKIE);
    rd.advance(8);
    let bits = rd.get_u16() as usize;
    assert_eq!(bits, 768);
    let encrypted = rd[..bits / 8].to_vec();
    rd.advance(bits / 8);
    assert_eq!(rd.get_u32(), 0);
    assert!(rd.is_empty());

    let inner = rsa_decrypt(HOST_N, HOST_D, &encrypted);
    let xored = rsa_decrypt(SERVER_N, SERVER_D, &inner);
    let mut key = [0u8; 32];
    key.copy_from_slice(&xored);
    let session_id = crypto::session_id(&unhex(HOST_N), &unhex(SERVER_N), &COOKIE);
    crypto::xor_session_key(&mut key, &session_id);
    (kind, key)
}
