//! SSH packets and their wire framing.
//!
//! A [`Packet`] is a message type plus its payload. The framers in [`v1`]
//! and [`v2`] turn packets into wire bytes and reassemble packets from
//! arbitrarily chunked transport reads.

pub mod v1;
pub mod v2;

use crate::util;
use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;
use zeroize::Zeroize;

/// A decoded (cleartext) packet.
#[derive(Clone, PartialEq, Eq)]
pub struct Packet {
    msg_type: u8,
    payload: Bytes,
}

impl fmt::Debug for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Packet")
            .field("msg_type", &self.msg_type)
            .field("payload_len", &self.payload.len())
            .finish()
    }
}

impl Packet {
    pub fn new(msg_type: u8, payload: impl Into<Bytes>) -> Self {
        Self {
            msg_type,
            payload: payload.into(),
        }
    }

    /// Start building a packet of the given message type.
    pub fn builder(msg_type: u8) -> PacketBuilder {
        PacketBuilder {
            msg_type,
            buf: BytesMut::new(),
        }
    }

    pub fn msg_type(&self) -> u8 {
        self.msg_type
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// A cursor over the payload, for the `util` readers.
    pub(crate) fn reader(&self) -> &[u8] {
        &self.payload[..]
    }

    /// Drop the packet, overwriting the payload when this is its only handle.
    pub(crate) fn wipe(self) {
        let mut payload = Vec::from(self.payload);
        payload.zeroize();
    }
}

/// Incremental writer of a packet payload.
#[derive(Debug)]
pub struct PacketBuilder {
    msg_type: u8,
    buf: BytesMut,
}

impl PacketBuilder {
    pub fn put_u8(mut self, v: u8) -> Self {
        self.buf.put_u8(v);
        self
    }

    pub fn put_u16(mut self, v: u16) -> Self {
        self.buf.put_u16(v);
        self
    }

    pub fn put_u32(mut self, v: u32) -> Self {
        self.buf.put_u32(v);
        self
    }

    pub fn put_slice(mut self, v: &[u8]) -> Self {
        self.buf.put_slice(v);
        self
    }

    /// Append an SSH string (`u32` length + bytes).
    pub fn put_string(mut self, v: impl AsRef<[u8]>) -> Self {
        util::put_ssh_string(&mut self.buf, v.as_ref());
        self
    }

    pub fn put_mpint1(mut self, magnitude: &[u8]) -> Self {
        util::put_mpint1(&mut self.buf, magnitude);
        self
    }

    pub fn put_mpint2(mut self, magnitude: &[u8]) -> Self {
        util::put_mpint2(&mut self.buf, magnitude);
        self
    }

    pub fn build(self) -> Packet {
        Packet {
            msg_type: self.msg_type,
            payload: self.buf.freeze(),
        }
    }
}
