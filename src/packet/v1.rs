//! Protocol 1 framing.
//!
//! ```text
//! u32 length | padding[8 - length % 8] | u8 type | payload[length - 5] | u32 crc
//! ```
//!
//! Everything after the length field is encrypted once a session key is
//! installed. The CRC covers padding, type and payload.

use super::Packet;
use crate::{
    consts::MAX_PACKET_LENGTH,
    crypto::{self, SshCrypto},
};
use byteorder::{BigEndian, ByteOrder};
use bytes::Bytes;
use ring::rand::SystemRandom;
use zeroize::Zeroize;

const BLOCK_LEN: usize = 8;

/// type + crc
const MIN_LENGTH: u32 = 5;

/// Reassembles protocol 1 frames from transport reads.
#[derive(Debug)]
pub struct Decoder {
    state: RecvState,
    length_buf: [u8; 4],
    length: u32,
    block: Vec<u8>,
    strict: bool,
}

#[derive(Debug)]
enum RecvState {
    ReadingLength(usize),
    ReadingBlock(usize),
}

impl Decoder {
    /// Create a decoder. In strict mode a CRC mismatch is an error instead
    /// of a warning.
    pub fn new(strict: bool) -> Self {
        Self {
            state: RecvState::ReadingLength(0),
            length_buf: [0; 4],
            length: 0,
            block: vec![],
            strict,
        }
    }

    /// Drop any partially received frame.
    pub fn reset(&mut self) {
        self.block.zeroize();
        self.length = 0;
        self.state = RecvState::ReadingLength(0);
    }

    /// Consume bytes until one frame is complete.
    ///
    /// Returns the decoded packet, if a frame was completed, together with
    /// the part of `input` that was not consumed. Callers feed the rest
    /// back in until it is empty, since one read may carry several frames.
    pub fn decode<'a>(
        &mut self,
        mut input: &'a [u8],
        crypto: Option<&SshCrypto>,
    ) -> Result<(Option<Packet>, &'a [u8]), crate::Error> {
        let span = tracing::trace_span!("v1::Decoder::decode");
        let _enter = span.enter();

        loop {
            match self.state {
                RecvState::ReadingLength(ref mut read) => {
                    tracing::trace!("--> ReadingLength({})", read);

                    let amt = std::cmp::min(4 - *read, input.len());
                    self.length_buf[*read..*read + amt].copy_from_slice(&input[..amt]);
                    input = &input[amt..];
                    *read += amt;
                    if *read < 4 {
                        return Ok((None, input));
                    }

                    let length = BigEndian::read_u32(&self.length_buf);
                    tracing::trace!("length = {}", length);
                    if length < MIN_LENGTH || length > MAX_PACKET_LENGTH {
                        self.reset();
                        return Err(crate::Error::protocol(format!(
                            "invalid packet length {}",
                            length
                        )));
                    }

                    self.length = length;
                    self.block.resize(block_len(length), 0);
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
                    self.reset();
                    return packet.map(|packet| (Some(packet), input));
                }
            }
        }
    }

    fn open(&mut self, crypto: Option<&SshCrypto>) -> Result<Packet, crate::Error> {
        if let Some(crypto) = crypto {
            crypto.decrypt_in_place(&mut self.block);
        }

        let padding_len = BLOCK_LEN - self.length as usize % BLOCK_LEN;
        let (body, crc) = self.block.split_at(self.block.len() - 4);

        let expected = BigEndian::read_u32(crc);
        let actual = crypto::crc32(body);
        if expected != actual {
            if self.strict {
                return Err(crate::Error::protocol("CRC mismatch"));
            }
            tracing::warn!(
                "CRC mismatch (expected {:08x}, computed {:08x})",
                expected,
                actual
            );
        }

        let msg_type = body[padding_len];
        let payload = Bytes::copy_from_slice(&body[padding_len + 1..]);
        tracing::trace!("msg_type = {}, payload_len = {}", msg_type, payload.len());

        Ok(Packet::new(msg_type, payload))
    }
}

impl Drop for Decoder {
    fn drop(&mut self) {
        self.block.zeroize();
    }
}

/// Number of bytes following the length field.
fn block_len(length: u32) -> usize {
    BLOCK_LEN * (length as usize / BLOCK_LEN + 1)
}

/// Frame a packet for the wire.
///
/// Padding is zero while no session key is installed and random non-zero
/// bytes afterwards.
pub fn encode(
    packet: &Packet,
    crypto: Option<&SshCrypto>,
    rng: &SystemRandom,
) -> Result<Vec<u8>, crate::Error> {
    let span = tracing::trace_span!("v1::encode");
    let _enter = span.enter();

    let payload = packet.payload();
    let length = payload.len() + MIN_LENGTH as usize;
    if length > MAX_PACKET_LENGTH as usize {
        return Err(crate::Error::protocol(format!(
            "packet of {} bytes exceeds the protocol limit",
            length
        )));
    }
    let padding_len = BLOCK_LEN - length % BLOCK_LEN;
    tracing::trace!("length = {}, padding_len = {}", length, padding_len);

    let mut buf = vec![0u8; 4 + padding_len + length];
    BigEndian::write_u32(&mut buf[..4], length as u32);
    if crypto.is_some() {
        crypto::fill_random_nonzero(rng, &mut buf[4..4 + padding_len])?;
    }
    buf[4 + padding_len] = packet.msg_type();

    let crc_pos = buf.len() - 4;
    buf[5 + padding_len..crc_pos].copy_from_slice(payload);
    let crc = crypto::crc32(&buf[4..crc_pos]);
    BigEndian::write_u32(&mut buf[crc_pos..], crc);

    if let Some(crypto) = crypto {
        crypto.encrypt_in_place(&mut buf[4..]);
    }

    Ok(buf)
}
