//! Session cryptography of the SSH-1 key exchange.
//!
//! This module holds the per-connection cipher pair and the pure functions
//! the handshake is built from: MD5, the SSH-1 CRC-32, the session id, and
//! the double RSA encryption of the session key.

use crate::{
    cipher::{BlockCipher, Cipher, CipherKind},
    consts::{COOKIE_LEN, SESSION_KEY_LEN},
};
use md5::{Digest, Md5};
use num_bigint::BigUint;
use ring::rand::{SecureRandom, SystemRandom};
use std::{
    fmt, io,
    sync::{Mutex, MutexGuard},
};
use zeroize::Zeroizing;

/// The cipher pair of one connection.
///
/// Both directions are keyed from the same session key but keep separate
/// feedback state. Each direction sits behind its own lock, so the reader
/// and the writer side never contend and calls for one direction are
/// always serialized.
pub struct SshCrypto {
    kind: CipherKind,
    send: Mutex<Cipher>,
    recv: Mutex<Cipher>,
}

impl fmt::Debug for SshCrypto {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SshCrypto")
            .field("kind", &self.kind)
            .finish()
    }
}

impl SshCrypto {
    pub fn new(kind: CipherKind, key: &[u8]) -> Result<Self, crate::Error> {
        Ok(Self {
            kind,
            send: Mutex::new(Cipher::new(kind, key)?),
            recv: Mutex::new(Cipher::new(kind, key)?),
        })
    }

    pub fn kind(&self) -> CipherKind {
        self.kind
    }

    /// Encrypt a block with the sending cipher.
    pub fn encrypt(&self, block: &[u8]) -> Vec<u8> {
        let mut out = block.to_vec();
        self.encrypt_in_place(&mut out);
        out
    }

    /// Decrypt a block with the receiving cipher.
    pub fn decrypt(&self, block: &[u8]) -> Vec<u8> {
        let mut out = block.to_vec();
        self.decrypt_in_place(&mut out);
        out
    }

    pub fn encrypt_in_place(&self, buf: &mut [u8]) {
        lock(&self.send).encrypt_in_place(buf);
    }

    pub fn decrypt_in_place(&self, buf: &mut [u8]) {
        lock(&self.recv).decrypt_in_place(buf);
    }
}

// a panic while holding the lock cannot leave a cipher half-updated in a way
// that matters more than the panic itself, so poisoning is ignored.
fn lock(m: &Mutex<Cipher>) -> MutexGuard<'_, Cipher> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub fn md5(data: &[u8]) -> [u8; 16] {
    Md5::digest(data).into()
}

/// The CRC-32 of SSH-1 packets.
///
/// This is the reflected 0xEDB88320 polynomial without the initial and final
/// inversion of the common variant.
pub fn crc32(data: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new_with_initial(0xFFFF_FFFF);
    hasher.update(data);
    !hasher.finalize()
}

/// Lowercase hex MD5 of a host key modulus, the form in which host keys are
/// pinned.
pub fn fingerprint(host_key_modulus: &[u8]) -> String {
    hex::encode(md5(host_key_modulus))
}

/// The SSH-1 session id: `MD5(host_key_n || server_key_n || cookie)`.
pub fn session_id(
    host_key_modulus: &[u8],
    server_key_modulus: &[u8],
    cookie: &[u8; COOKIE_LEN],
) -> [u8; 16] {
    let mut hasher = Md5::new();
    hasher.update(host_key_modulus);
    hasher.update(server_key_modulus);
    hasher.update(cookie);
    hasher.finalize().into()
}

/// XOR the session id into the first half of a session key.
pub fn xor_session_key(key: &mut [u8; SESSION_KEY_LEN], session_id: &[u8; 16]) {
    for (k, s) in key.iter_mut().zip(session_id) {
        *k ^= s;
    }
}

pub(crate) fn fill_random(rng: &SystemRandom, buf: &mut [u8]) -> Result<(), crate::Error> {
    rng.fill(buf).map_err(|_| random_failed())
}

/// Fill `buf` with random bytes none of which is zero.
pub(crate) fn fill_random_nonzero(rng: &SystemRandom, buf: &mut [u8]) -> Result<(), crate::Error> {
    fill_random(rng, buf)?;
    let mut spare = [0u8; 16];
    let mut avail = 0;
    for b in buf.iter_mut().filter(|b| **b == 0) {
        while *b == 0 {
            if avail == 0 {
                fill_random(rng, &mut spare)?;
                avail = spare.len();
            }
            avail -= 1;
            *b = spare[avail];
        }
    }
    Ok(())
}

pub(crate) fn generate_session_key(
    rng: &SystemRandom,
) -> Result<Zeroizing<[u8; SESSION_KEY_LEN]>, crate::Error> {
    let mut key = Zeroizing::new([0u8; SESSION_KEY_LEN]);
    fill_random(rng, &mut key[..])?;
    Ok(key)
}

fn random_failed() -> crate::Error {
    crate::Error::io(io::Error::new(
        io::ErrorKind::Other,
        "failed to generate random bytes",
    ))
}

/// An RSA public key as sent in `SSH_SMSG_PUBLIC_KEY`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RsaPublicKey {
    pub bits: u32,
    pub exponent: Vec<u8>,
    pub modulus: Vec<u8>,
}

impl RsaPublicKey {
    fn modulus_len(&self) -> usize {
        let n = BigUint::from_bytes_be(&self.modulus);
        ((n.bits() + 7) / 8) as usize
    }

    /// Encrypt `data` with PKCS#1 v1.5 type 2 padding.
    ///
    /// The result is exactly as long as the modulus.
    pub(crate) fn encrypt_pkcs1(
        &self,
        rng: &SystemRandom,
        data: &[u8],
    ) -> Result<Vec<u8>, crate::Error> {
        let n = BigUint::from_bytes_be(&self.modulus);
        let e = BigUint::from_bytes_be(&self.exponent);
        if n.bits() == 0 || e.bits() == 0 {
            return Err(crate::Error::protocol("RSA key with zero modulus or exponent"));
        }

        let k = self.modulus_len();
        if k < data.len() + 11 {
            return Err(crate::Error::protocol(format!(
                "RSA modulus of {} bytes is too short for {} bytes of data",
                k,
                data.len()
            )));
        }

        // 00 02 || non-zero padding || 00 || data
        let mut block = Zeroizing::new(vec![0u8; k]);
        block[1] = 2;
        let pad_end = k - data.len() - 1;
        fill_random_nonzero(rng, &mut block[2..pad_end])?;
        block[pad_end + 1..].copy_from_slice(data);

        let c = BigUint::from_bytes_be(&block).modpow(&e, &n).to_bytes_be();
        let mut out = vec![0u8; k];
        out[k - c.len()..].copy_from_slice(&c);
        Ok(out)
    }
}

/// Encrypt the session key for `SSH_CMSG_SESSION_KEY`.
///
/// The data is encrypted with the key of the shorter modulus first and the
/// result with the other key. The bit length of the result travels in a
/// `u16`, so the longer modulus may not exceed 65535 bits.
pub(crate) fn encrypt_session_key(
    rng: &SystemRandom,
    data: &[u8],
    server_key: &RsaPublicKey,
    host_key: &RsaPublicKey,
) -> Result<Vec<u8>, crate::Error> {
    let (first, second) = if server_key.modulus_len() < host_key.modulus_len() {
        (server_key, host_key)
    } else {
        (host_key, server_key)
    };
    if second.modulus_len() * 8 > usize::from(u16::MAX) {
        return Err(crate::Error::protocol(format!(
            "RSA modulus of {} bytes is too long for SSH_CMSG_SESSION_KEY",
            second.modulus_len()
        )));
    }
    let inner = first.encrypt_pkcs1(rng, data)?;
    second.encrypt_pkcs1(rng, &inner)
}
