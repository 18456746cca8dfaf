//! Symmetric ciphers protecting SSH-1 packets.
//!
//! Every cipher here is stateful: the feedback registers are advanced on each
//! call, so one instance must serve exactly one direction of a connection.

mod des;
mod idea;

pub use self::{
    des::{Des, Des3},
    idea::Idea,
};

use std::fmt;

/// The cipher identifiers of the SSH-1 protocol, as they appear in the
/// supported-ciphers mask of `SSH_SMSG_PUBLIC_KEY`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CipherKind {
    None,
    Idea,
    Des,
    Des3,
    Tss,
    Rc4,
    Blowfish,
}

impl CipherKind {
    /// The order in which ciphers are picked when the server offers several.
    pub const PREFERENCE: [CipherKind; 4] = [
        CipherKind::Blowfish,
        CipherKind::Idea,
        CipherKind::Des3,
        CipherKind::Des,
    ];

    /// Return the protocol number of this cipher.
    pub fn id(self) -> u8 {
        match self {
            CipherKind::None => 0,
            CipherKind::Idea => 1,
            CipherKind::Des => 2,
            CipherKind::Des3 => 3,
            CipherKind::Tss => 4,
            CipherKind::Rc4 => 5,
            CipherKind::Blowfish => 6,
        }
    }

    pub fn from_id(id: u8) -> Option<Self> {
        Some(match id {
            0 => CipherKind::None,
            1 => CipherKind::Idea,
            2 => CipherKind::Des,
            3 => CipherKind::Des3,
            4 => CipherKind::Tss,
            5 => CipherKind::Rc4,
            6 => CipherKind::Blowfish,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            CipherKind::None => "none",
            CipherKind::Idea => "idea",
            CipherKind::Des => "des",
            CipherKind::Des3 => "3des",
            CipherKind::Tss => "tss",
            CipherKind::Rc4 => "rc4",
            CipherKind::Blowfish => "blowfish",
        }
    }

    /// Whether the server's supported-ciphers mask contains this cipher.
    pub fn is_offered(self, mask: u32) -> bool {
        mask & (1 << self.id()) != 0
    }

    /// Whether [`Cipher::new`] can build this cipher.
    pub fn is_implemented(self) -> bool {
        matches!(
            self,
            CipherKind::None | CipherKind::Idea | CipherKind::Des | CipherKind::Des3
        )
    }

    /// Pick the first cipher of `preference` that the server offers.
    pub fn select(preference: &[CipherKind], mask: u32) -> Option<CipherKind> {
        preference.iter().copied().find(|kind| kind.is_offered(mask))
    }

    /// Number of key bytes consumed from the session key.
    pub fn key_len(self) -> usize {
        match self {
            CipherKind::None => 0,
            CipherKind::Idea => idea::KEY_LEN,
            CipherKind::Des => des::KEY_LEN,
            CipherKind::Des3 => 3 * des::KEY_LEN,
            CipherKind::Tss | CipherKind::Rc4 | CipherKind::Blowfish => 0,
        }
    }
}

impl fmt::Display for CipherKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The operations shared by every cipher of the suite.
///
/// `encrypt` and `decrypt` write `src.len()` bytes to the front of `dst`.
/// The `_in_place` variants are what the packet framers use, since they
/// decrypt into the buffer they received.
pub trait BlockCipher {
    /// Install a new key and reset the feedback state.
    fn set_key(&mut self, key: &[u8]) -> Result<(), crate::Error>;

    fn encrypt_in_place(&mut self, buf: &mut [u8]);

    fn decrypt_in_place(&mut self, buf: &mut [u8]);

    fn encrypt(&mut self, src: &[u8], dst: &mut [u8]) {
        let dst = &mut dst[..src.len()];
        dst.copy_from_slice(src);
        self.encrypt_in_place(dst);
    }

    fn decrypt(&mut self, src: &[u8], dst: &mut [u8]) {
        let dst = &mut dst[..src.len()];
        dst.copy_from_slice(src);
        self.decrypt_in_place(dst);
    }
}

/// The pass-through cipher used before a session key is agreed.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoneCipher;

impl BlockCipher for NoneCipher {
    fn set_key(&mut self, _: &[u8]) -> Result<(), crate::Error> {
        Ok(())
    }

    fn encrypt_in_place(&mut self, _: &mut [u8]) {}

    fn decrypt_in_place(&mut self, _: &mut [u8]) {}
}

/// One keyed cipher instance, for one direction of a connection.
pub enum Cipher {
    None(NoneCipher),
    Idea(Idea),
    Des(Des),
    Des3(Des3),
}

impl Cipher {
    /// Build a keyed cipher of the given kind.
    ///
    /// Kinds that have a protocol number but no implementation are rejected
    /// with a configuration error.
    pub fn new(kind: CipherKind, key: &[u8]) -> Result<Self, crate::Error> {
        let cipher = match kind {
            CipherKind::None => Cipher::None(NoneCipher),
            CipherKind::Idea => Cipher::Idea(Idea::new(key)?),
            CipherKind::Des => Cipher::Des(Des::new(key)?),
            CipherKind::Des3 => Cipher::Des3(Des3::new(key)?),
            CipherKind::Tss | CipherKind::Rc4 | CipherKind::Blowfish => {
                return Err(crate::Error::config(format!(
                    "cipher {} is not implemented",
                    kind
                )))
            }
        };
        Ok(cipher)
    }

    pub fn kind(&self) -> CipherKind {
        match self {
            Cipher::None(..) => CipherKind::None,
            Cipher::Idea(..) => CipherKind::Idea,
            Cipher::Des(..) => CipherKind::Des,
            Cipher::Des3(..) => CipherKind::Des3,
        }
    }
}

impl fmt::Debug for Cipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Cipher").field(&self.kind()).finish()
    }
}

impl BlockCipher for Cipher {
    fn set_key(&mut self, key: &[u8]) -> Result<(), crate::Error> {
        match self {
            Cipher::None(c) => c.set_key(key),
            Cipher::Idea(c) => c.set_key(key),
            Cipher::Des(c) => c.set_key(key),
            Cipher::Des3(c) => c.set_key(key),
        }
    }

    #[inline]
    fn encrypt_in_place(&mut self, buf: &mut [u8]) {
        match self {
            Cipher::None(c) => c.encrypt_in_place(buf),
            Cipher::Idea(c) => c.encrypt_in_place(buf),
            Cipher::Des(c) => c.encrypt_in_place(buf),
            Cipher::Des3(c) => c.encrypt_in_place(buf),
        }
    }

    #[inline]
    fn decrypt_in_place(&mut self, buf: &mut [u8]) {
        match self {
            Cipher::None(c) => c.decrypt_in_place(buf),
            Cipher::Idea(c) => c.decrypt_in_place(buf),
            Cipher::Des(c) => c.decrypt_in_place(buf),
            Cipher::Des3(c) => c.decrypt_in_place(buf),
        }
    }
}

fn check_key_len(kind: CipherKind, key: &[u8]) -> Result<(), crate::Error> {
    if key.len() < kind.key_len() {
        return Err(crate::Error::config(format!(
            "{} needs a {} byte key, got {}",
            kind,
            kind.key_len(),
            key.len()
        )));
    }
    Ok(())
}
