//! DES and the SSH-1 flavour of triple DES.
//!
//! SSH-1 runs 3DES as three independent CBC chains (encrypt, decrypt,
//! encrypt), each with its own feedback register, rather than as a single
//! CBC chain over the EDE block function.

use super::{check_key_len, BlockCipher, CipherKind};
use ::des::cipher::{generic_array::GenericArray, BlockDecrypt, BlockEncrypt, KeyInit};
use zeroize::Zeroize;

pub(super) const KEY_LEN: usize = 8;
const BLOCK_LEN: usize = 8;

/// Single DES in CBC mode.
///
/// Only whole blocks are processed; SSH-1 frames are always a multiple of
/// the block size.
pub struct Des {
    cipher: ::des::Des,
    iv: [u8; BLOCK_LEN],
}

impl Des {
    /// Create a cipher keyed with the first 8 bytes of `key`.
    pub fn new(key: &[u8]) -> Result<Self, crate::Error> {
        check_key_len(CipherKind::Des, key)?;
        Ok(Self {
            cipher: ::des::Des::new(GenericArray::from_slice(&key[..KEY_LEN])),
            iv: [0; BLOCK_LEN],
        })
    }
}

// the key schedule inside `::des::Des` wipes itself on drop.
impl Drop for Des {
    fn drop(&mut self) {
        self.iv.zeroize();
    }
}

impl BlockCipher for Des {
    fn set_key(&mut self, key: &[u8]) -> Result<(), crate::Error> {
        *self = Self::new(key)?;
        Ok(())
    }

    fn encrypt_in_place(&mut self, buf: &mut [u8]) {
        for block in buf.chunks_exact_mut(BLOCK_LEN) {
            for (b, iv) in block.iter_mut().zip(&self.iv) {
                *b ^= iv;
            }
            self.cipher.encrypt_block(GenericArray::from_mut_slice(block));
            self.iv.copy_from_slice(block);
        }
    }

    fn decrypt_in_place(&mut self, buf: &mut [u8]) {
        for block in buf.chunks_exact_mut(BLOCK_LEN) {
            let mut next_iv = [0u8; BLOCK_LEN];
            next_iv.copy_from_slice(block);
            self.cipher.decrypt_block(GenericArray::from_mut_slice(block));
            for (b, iv) in block.iter_mut().zip(&self.iv) {
                *b ^= iv;
            }
            self.iv = next_iv;
        }
    }
}

/// Triple DES with inner CBC, keyed from 24 bytes.
pub struct Des3 {
    stages: [Des; 3],
}

impl Des3 {
    pub fn new(key: &[u8]) -> Result<Self, crate::Error> {
        check_key_len(CipherKind::Des3, key)?;
        Ok(Self {
            stages: [
                Des::new(&key[..KEY_LEN])?,
                Des::new(&key[KEY_LEN..2 * KEY_LEN])?,
                Des::new(&key[2 * KEY_LEN..3 * KEY_LEN])?,
            ],
        })
    }
}

impl BlockCipher for Des3 {
    fn set_key(&mut self, key: &[u8]) -> Result<(), crate::Error> {
        *self = Self::new(key)?;
        Ok(())
    }

    fn encrypt_in_place(&mut self, buf: &mut [u8]) {
        let [des1, des2, des3] = &mut self.stages;
        des1.encrypt_in_place(buf);
        des2.decrypt_in_place(buf);
        des3.encrypt_in_place(buf);
    }

    fn decrypt_in_place(&mut self, buf: &mut [u8]) {
        let [des1, des2, des3] = &mut self.stages;
        des3.decrypt_in_place(buf);
        des2.encrypt_in_place(buf);
        des1.decrypt_in_place(buf);
    }
}
