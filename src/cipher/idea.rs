//! IDEA in 64-bit cipher feedback mode, as SSH-1 uses it.

use super::{check_key_len, BlockCipher, CipherKind};
use byteorder::{BigEndian, ByteOrder};
use zeroize::Zeroize;

pub(super) const KEY_LEN: usize = 16;

const ROUNDS: usize = 8;
const KEY_SCHEDULE_LEN: usize = 6 * ROUNDS + 4;

#[derive(Clone)]
pub struct Idea {
    key_schedule: [u16; KEY_SCHEDULE_LEN],
    iv: [u32; 2],
}

impl Idea {
    /// Create a cipher keyed with the first 16 bytes of `key`.
    pub fn new(key: &[u8]) -> Result<Self, crate::Error> {
        let mut idea = Self {
            key_schedule: [0; KEY_SCHEDULE_LEN],
            iv: [0; 2],
        };
        idea.set_key(key)?;
        Ok(idea)
    }

    fn expand_key(&mut self, key: &[u8]) {
        let ks = &mut self.key_schedule;
        for (i, k) in ks.iter_mut().take(8).enumerate() {
            *k = BigEndian::read_u16(&key[2 * i..]);
        }

        // each batch of eight subkeys is the previous batch rotated left by 25 bits.
        let mut base = 0;
        let mut j = 0;
        for _ in 8..KEY_SCHEDULE_LEN {
            j += 1;
            ks[base + j + 7] = (ks[base + (j & 7)] << 9) | (ks[base + ((j + 1) & 7)] >> 7);
            base += j & 8;
            j &= 7;
        }
    }

    /// Run the IDEA forward permutation over one block, given as two
    /// big-endian halves.
    fn encrypt_block(&self, l: u32, r: u32) -> (u32, u32) {
        let ks = &self.key_schedule;

        let mut x1 = (l >> 16) as u16;
        let mut x2 = l as u16;
        let mut x3 = (r >> 16) as u16;
        let mut x4 = r as u16;

        for k in ks[..6 * ROUNDS].chunks_exact(6) {
            x1 = mul(x1, k[0]);
            x2 = x2.wrapping_add(k[1]);
            x3 = x3.wrapping_add(k[2]);
            x4 = mul(x4, k[3]);

            let t1 = mul(x1 ^ x3, k[4]);
            let t2 = mul(t1.wrapping_add(x2 ^ x4), k[5]);
            let t1 = t1.wrapping_add(t2);

            x1 ^= t2;
            x4 ^= t1;
            let t1 = t1 ^ x2;
            x2 = t2 ^ x3;
            x3 = t1;
        }

        // output transformation; undoes the swap of the last round.
        let k = &ks[6 * ROUNDS..];
        let y1 = mul(x1, k[0]);
        let y2 = x3.wrapping_add(k[1]);
        let y3 = x2.wrapping_add(k[2]);
        let y4 = mul(x4, k[3]);

        (
            u32::from(y1) << 16 | u32::from(y2),
            u32::from(y3) << 16 | u32::from(y4),
        )
    }
}

impl Drop for Idea {
    fn drop(&mut self) {
        self.key_schedule.zeroize();
        self.iv.zeroize();
    }
}

impl BlockCipher for Idea {
    fn set_key(&mut self, key: &[u8]) -> Result<(), crate::Error> {
        check_key_len(CipherKind::Idea, key)?;
        self.expand_key(&key[..KEY_LEN]);
        self.iv = [0; 2];
        Ok(())
    }

    fn encrypt_in_place(&mut self, buf: &mut [u8]) {
        let [mut iv0, mut iv1] = self.iv;
        for chunk in buf.chunks_mut(8) {
            let mut block = [0u8; 8];
            block[..chunk.len()].copy_from_slice(chunk);

            let (o0, o1) = self.encrypt_block(iv0, iv1);
            iv0 = o0 ^ BigEndian::read_u32(&block[..4]);
            iv1 = o1 ^ BigEndian::read_u32(&block[4..]);

            BigEndian::write_u32(&mut block[..4], iv0);
            BigEndian::write_u32(&mut block[4..], iv1);
            let n = chunk.len();
            chunk.copy_from_slice(&block[..n]);
        }
        self.iv = [iv0, iv1];
    }

    fn decrypt_in_place(&mut self, buf: &mut [u8]) {
        let [mut iv0, mut iv1] = self.iv;
        for chunk in buf.chunks_mut(8) {
            let mut block = [0u8; 8];
            block[..chunk.len()].copy_from_slice(chunk);

            let (o0, o1) = self.encrypt_block(iv0, iv1);
            iv0 = BigEndian::read_u32(&block[..4]);
            iv1 = BigEndian::read_u32(&block[4..]);

            BigEndian::write_u32(&mut block[..4], o0 ^ iv0);
            BigEndian::write_u32(&mut block[4..], o1 ^ iv1);
            let n = chunk.len();
            chunk.copy_from_slice(&block[..n]);
        }
        self.iv = [iv0, iv1];
    }
}

/// Multiplication modulo 2^16 + 1, where the zero word stands for 2^16.
#[inline]
fn mul(a: u16, b: u16) -> u16 {
    let ab = u32::from(a) * u32::from(b);
    if ab != 0 {
        let lo = ab & 0xffff;
        let hi = ab >> 16;
        lo.wrapping_sub(hi).wrapping_add((lo < hi) as u32) as u16
    } else if a == 0 {
        1u16.wrapping_sub(b)
    } else {
        1u16.wrapping_sub(a)
    }
}
