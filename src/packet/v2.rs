//! Protocol 2 framing, as far as the key exchange needs it.
//!
//! ```text
//! u32 length | u8 padlen | u8 type | payload | padding[padlen] | mac[16]
//! ```
//!
//! The MAC trailer is present whenever an `SshCrypto` is installed. It is
//! `MD5(u32 sequence || cleartext frame)`, not an HMAC; peers of this
//! client do not verify it, so it is only checked in strict mode.

use super::Packet;
use crate::{
    consts::{MAX_PACKET_LENGTH, SSH2_MAC_LEN},
    crypto::{self, SshCrypto},
};
use byteorder::{BigEndian, ByteOrder};
use bytes::Bytes;
use md5::{Digest, Md5};
use ring::rand::SystemRandom;
use std::num::Wrapping;
use zeroize::Zeroize;

const BLOCK_LEN: usize = 8;
const MIN_PADDING: usize = 4;

/// u32 length + u8 padlen
const HEADER_LEN: usize = 5;

fn mac_len(crypto: Option<&SshCrypto>) -> usize {
    if crypto.is_some() {
        SSH2_MAC_LEN
    } else {
        0
    }
}

fn compute_mac(seqn: u32, frame: &[u8]) -> [u8; SSH2_MAC_LEN] {
    let mut hasher = Md5::new();
    hasher.update(&seqn.to_be_bytes());
    hasher.update(frame);
    hasher.finalize().into()
}

/// Reassembles protocol 2 frames from transport reads.
#[derive(Debug)]
pub struct Decoder {
    state: RecvState,
    header: [u8; HEADER_LEN],
    length: u32,
    block: Vec<u8>,
    seqn: Wrapping<u32>,
    strict: bool,
}

#[derive(Debug)]
enum RecvState {
    ReadingHeader(usize),
    ReadingBlock(usize),
}

impl Decoder {
    pub fn new(strict: bool) -> Self {
        Self {
            state: RecvState::ReadingHeader(0),
            header: [0; HEADER_LEN],
            length: 0,
            block: vec![],
            seqn: Wrapping(0),
            strict,
        }
    }

    /// Sequence number of the next incoming packet.
    pub fn sequence_number(&self) -> u32 {
        self.seqn.0
    }

    /// Drop any partially received frame and restart the sequence.
    pub fn reset(&mut self) {
        self.discard();
        self.seqn = Wrapping(0);
    }

    fn discard(&mut self) {
        self.block.zeroize();
        self.length = 0;
        self.state = RecvState::ReadingHeader(0);
    }

    /// Consume bytes until one frame is complete; see [`v1::Decoder::decode`].
    ///
    /// [`v1::Decoder::decode`]: super::v1::Decoder::decode
    pub fn decode<'a>(
        &mut self,
        mut input: &'a [u8],
        crypto: Option<&SshCrypto>,
    ) -> Result<(Option<Packet>, &'a [u8]), crate::Error> {
        let span = tracing::trace_span!("v2::Decoder::decode");
        let _enter = span.enter();

        loop {
            match self.state {
                RecvState::ReadingHeader(ref mut read) => {
                    tracing::trace!("--> ReadingHeader({})", read);

                    let amt = std::cmp::min(HEADER_LEN - *read, input.len());
                    self.header[*read..*read + amt].copy_from_slice(&input[..amt]);
                    input = &input[amt..];
                    *read += amt;
                    if *read < HEADER_LEN {
                        return Ok((None, input));
                    }

                    let length = BigEndian::read_u32(&self.header[..4]);
                    tracing::trace!("length = {}, padlen = {}", length, self.header[4]);
                    // padlen and type are the minimum content
                    if length < 2 || length > MAX_PACKET_LENGTH {
                        self.discard();
                        return Err(crate::Error::protocol(format!(
                            "invalid packet length {}",
                            length
                        )));
                    }

                    self.length = length;
                    self.block
                        .resize(length as usize - 1 + mac_len(crypto), 0);
                    self.state = RecvState::ReadingBlock(0);
                }

                RecvState::ReadingBlock(ref mut read) => {
                    tracing::trace!("--> ReadingBlock({})", read);

                    let amt = std::cmp::min(self.block.len() - *read, input.len());
                    self.block[*read..*read + amt].copy_from_slice(&input[..amt]);
                    input = &input[amt..];
                    *read += amt;
                    if *read < self.block.len() {
                        return Ok((None, input));
                    }

                    let packet = self.open(crypto);
                    self.seqn += Wrapping(1);
                    self.discard();
                    return packet.map(|packet| (Some(packet), input));
                }
            }
        }
    }

    fn open(&mut self, crypto: Option<&SshCrypto>) -> Result<Packet, crate::Error> {
        let data_len = self.length as usize - 1;
        let (data, mac) = self.block.split_at_mut(data_len);
        if let Some(crypto) = crypto {
            crypto.decrypt_in_place(data);

            if self.strict {
                let mut hasher = Md5::new();
                hasher.update(&self.seqn.0.to_be_bytes());
                hasher.update(&self.header);
                hasher.update(&*data);
                let expected: [u8; SSH2_MAC_LEN] = hasher.finalize().into();
                if expected[..] != mac[..] {
                    return Err(crate::Error::protocol("MAC mismatch"));
                }
            }
        }

        let padding_len = self.header[4] as usize;
        let msg_type = data[0];
        let payload_len = (self.length as usize)
            .saturating_sub(padding_len + 2)
            .min(data_len - 1);
        let payload = Bytes::copy_from_slice(&data[1..1 + payload_len]);
        tracing::trace!(
            "seqn = {}, msg_type = {}, payload_len = {}",
            self.seqn,
            msg_type,
            payload_len
        );

        Ok(Packet::new(msg_type, payload))
    }
}

impl Drop for Decoder {
    fn drop(&mut self) {
        self.block.zeroize();
    }
}

/// Frames protocol 2 packets and keeps the outgoing sequence number.
#[derive(Debug)]
pub struct Encoder {
    seqn: Wrapping<u32>,
}

impl Default for Encoder {
    fn default() -> Self {
        Self {
            seqn: Wrapping(0),
        }
    }
}

impl Encoder {
    /// Sequence number of the next outgoing packet.
    pub fn sequence_number(&self) -> u32 {
        self.seqn.0
    }

    pub fn reset(&mut self) {
        self.seqn = Wrapping(0);
    }

    pub fn encode(
        &mut self,
        packet: &Packet,
        crypto: Option<&SshCrypto>,
        rng: &SystemRandom,
    ) -> Result<Vec<u8>, crate::Error> {
        let span = tracing::trace_span!("v2::Encoder::encode");
        let _enter = span.enter();

        let payload = packet.payload();
        let unpadded_len = HEADER_LEN + 1 + payload.len();
        let mut padding_len = BLOCK_LEN - unpadded_len % BLOCK_LEN;
        if padding_len < MIN_PADDING {
            padding_len += BLOCK_LEN;
        }
        let length = unpadded_len + padding_len - 4;
        if length > MAX_PACKET_LENGTH as usize {
            return Err(crate::Error::protocol(format!(
                "packet of {} bytes exceeds the protocol limit",
                length
            )));
        }
        tracing::trace!("length = {}, padding_len = {}", length, padding_len);

        let frame_len = 4 + length;
        let mut buf = vec![0u8; frame_len + mac_len(crypto)];
        BigEndian::write_u32(&mut buf[..4], length as u32);
        buf[4] = padding_len as u8;
        buf[5] = packet.msg_type();
        buf[6..unpadded_len].copy_from_slice(payload);

        if let Some(crypto) = crypto {
            let (frame, mac) = buf.split_at_mut(frame_len);
            crypto::fill_random_nonzero(rng, &mut frame[unpadded_len..])?;
            mac.copy_from_slice(&compute_mac(self.seqn.0, frame));
            crypto.encrypt_in_place(&mut frame[HEADER_LEN..]);
        }

        self.seqn += Wrapping(1);
        Ok(buf)
    }
}
