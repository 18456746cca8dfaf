//! The protocol engine.
//!
//! [`SshIo`] performs no I/O of its own: inbound transport bytes are fed to
//! [`SshIo::handle_inbound`], and everything the engine sends goes through
//! the [`Host`] it owns. Protocol 1 is driven all the way to an interactive
//! shell; protocol 2 stops after the key exchange.

// Refs:
// * draft-ylonen-ssh-protocol-00 (SSH 1.5)
// * https://tools.ietf.org/html/rfc4253

use crate::{
    cipher::CipherKind,
    config::SessionConfig,
    consts::{self, COOKIE_LEN},
    crypto::{self, RsaPublicKey, SshCrypto},
    ident::{self, Identification, ProtocolVersion},
    packet::{v1, v2, Packet},
    util,
};
use bytes::Bytes;
use num_bigint::BigUint;
use ring::rand::SystemRandom;
use std::{convert::TryFrom, fmt, io, mem};
use zeroize::{Zeroize, Zeroizing};

/// Largest amount of terminal input carried by one `SSH_CMSG_STDIN_DATA`.
const STDIN_CHUNK_LEN: usize = 0x8000;

/// SSH2_DISCONNECT_BY_APPLICATION
const SSH2_DISCONNECT_BY_APPLICATION: u32 = 11;

/// The placeholder Diffie-Hellman value sent in `SSH2_MSG_KEXDH_INIT`.
///
/// Protocol 2 support ends with the key exchange, so no real exponent is
/// ever generated.
const KEXDH_PLACEHOLDER: [u8; 4] = [0xde, 0xad, 0xbe, 0xef];

/// The terminal side of a session.
pub trait Host {
    /// Send raw bytes to the server.
    fn write(&mut self, data: &[u8]) -> io::Result<()>;

    /// The value of `TERM` sent with the pty request.
    fn terminal_type(&self) -> String;

    /// The terminal size as `(columns, rows)`.
    fn window_size(&self) -> (u32, u32);

    /// Called once the remote pty takes over echoing.
    fn set_local_echo(&mut self, echo: bool) {
        let _ = echo;
    }
}

/// Something to show on the terminal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Output {
    Stdout(Bytes),
    Stderr(Bytes),
    /// A message from the session itself rather than the remote program.
    Notice(String),
}

/// The state of a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum State {
    /// Waiting for the server's identification line.
    Init,
    AwaitingPublicKey,
    AwaitingKexInit,
    /// The session key (protocol 1) or the DH init (protocol 2) is sent.
    KeyExchangeSent,
    AwaitingAuthResult(AuthStep),
    AwaitingPtyResult,
    /// The shell is running and terminal input is forwarded.
    Interactive,
    /// Protocol 2 only: `ssh-userauth` was requested. Nothing follows.
    ServiceRequested,
    Disconnected,
}

/// The authentication message awaiting an answer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthStep {
    User,
    Password,
}

/// A parsed `SSH2_MSG_KEXINIT`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KexInit {
    pub cookie: [u8; 16],
    pub kex_algorithms: String,
    pub server_host_key_algorithms: String,
    pub encryption_algorithms_client_to_server: String,
    pub encryption_algorithms_server_to_client: String,
    pub mac_algorithms_client_to_server: String,
    pub mac_algorithms_server_to_client: String,
    pub compression_algorithms_client_to_server: String,
    pub compression_algorithms_server_to_client: String,
    pub languages_client_to_server: String,
    pub languages_server_to_client: String,
    pub first_kex_packet_follows: bool,
}

impl KexInit {
    fn parse(packet: &Packet) -> Result<Self, crate::Error> {
        let mut rd = packet.reader();
        let mut cookie = [0u8; 16];
        cookie.copy_from_slice(&util::get_bytes(&mut rd, 16)?);
        Ok(Self {
            cookie,
            kex_algorithms: get_text(&mut rd)?,
            server_host_key_algorithms: get_text(&mut rd)?,
            encryption_algorithms_client_to_server: get_text(&mut rd)?,
            encryption_algorithms_server_to_client: get_text(&mut rd)?,
            mac_algorithms_client_to_server: get_text(&mut rd)?,
            mac_algorithms_server_to_client: get_text(&mut rd)?,
            compression_algorithms_client_to_server: get_text(&mut rd)?,
            compression_algorithms_server_to_client: get_text(&mut rd)?,
            languages_client_to_server: get_text(&mut rd)?,
            languages_server_to_client: get_text(&mut rd)?,
            first_kex_packet_follows: util::get_u8(&mut rd)? != 0,
        })
    }
}

/// A parsed `SSH2_MSG_KEXDH_REPLY`. The signature is not verified.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KexDhReply {
    pub host_key_type: String,
    /// RSA public exponent; empty for other host key types.
    pub e: Vec<u8>,
    /// RSA modulus; empty for other host key types.
    pub n: Vec<u8>,
    /// The server's DH value.
    pub f: Vec<u8>,
    pub signature_type: String,
    pub signature: Vec<u8>,
}

impl KexDhReply {
    fn parse(packet: &Packet) -> Result<Self, crate::Error> {
        let mut rd = packet.reader();

        let blob = util::get_ssh_string(&mut rd)?;
        let mut key = &blob[..];
        let host_key_type = get_text(&mut key)?;
        let (e, n) = if host_key_type == "ssh-rsa" {
            (util::get_mpint2(&mut key)?, util::get_mpint2(&mut key)?)
        } else {
            (vec![], vec![])
        };

        let f = util::get_mpint2(&mut rd)?;

        let sig_blob = util::get_ssh_string(&mut rd)?;
        let mut sig = &sig_blob[..];
        let signature_type = get_text(&mut sig)?;
        let signature = util::get_ssh_string(&mut sig)?;

        Ok(Self {
            host_key_type,
            e,
            n,
            f,
            signature_type,
            signature,
        })
    }

    fn summary(&self) -> String {
        let decimal = |v: &[u8]| BigUint::from_bytes_be(v).to_string();
        let key = if self.host_key_type == "ssh-rsa" {
            format!("SSH-RSA ({},{})", decimal(&self.n), decimal(&self.e))
        } else {
            format!("Unsupported host key type {}!", self.host_key_type)
        };
        format!(
            "{}\nDH Server Pub: {}\nSignature: ktype is {}",
            key,
            decimal(&self.f),
            self.signature_type
        )
    }
}

/// The contents of `SSH_SMSG_PUBLIC_KEY`.
struct PublicKeyMsg {
    cookie: [u8; COOKIE_LEN],
    server_key: RsaPublicKey,
    host_key: RsaPublicKey,
    protocol_flags: u32,
    cipher_mask: u32,
    auth_mask: u32,
}

impl PublicKeyMsg {
    fn parse(packet: &Packet) -> Result<Self, crate::Error> {
        let mut rd = packet.reader();
        let mut cookie = [0u8; COOKIE_LEN];
        cookie.copy_from_slice(&util::get_bytes(&mut rd, COOKIE_LEN)?);

        let server_key = get_rsa_key(&mut rd)?;
        let host_key = get_rsa_key(&mut rd)?;

        Ok(Self {
            cookie,
            server_key,
            host_key,
            protocol_flags: util::get_u32(&mut rd)?,
            cipher_mask: util::get_u32(&mut rd)?,
            auth_mask: util::get_u32(&mut rd)?,
        })
    }
}

fn get_rsa_key(rd: &mut &[u8]) -> Result<RsaPublicKey, crate::Error> {
    Ok(RsaPublicKey {
        bits: util::get_u32(&mut *rd)?,
        exponent: util::get_mpint1(&mut *rd)?,
        modulus: util::get_mpint1(&mut *rd)?,
    })
}

fn get_text(rd: &mut &[u8]) -> Result<String, crate::Error> {
    let s = util::get_ssh_string(rd)?;
    Ok(String::from_utf8_lossy(&s).into_owned())
}

/// The protocol engine of one connection.
pub struct SshIo<H> {
    host: H,
    config: SessionConfig,
    state: State,
    rng: SystemRandom,
    scanner: ident::Scanner,
    remote: Option<Identification>,
    protocol: Option<ProtocolVersion>,
    v1_decoder: v1::Decoder,
    v2_decoder: v2::Decoder,
    v2_encoder: v2::Encoder,
    crypto: Option<SshCrypto>,
    session_id: Option<[u8; 16]>,
    pending: Vec<u8>,
    exit_status: Option<u32>,
    disconnect_reason: Option<String>,
    undelivered: Vec<Output>,
    server_kexinit: Option<KexInit>,
    kexdh_reply: Option<KexDhReply>,
}

impl<H> fmt::Debug for SshIo<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SshIo")
            .field("state", &self.state)
            .field("protocol", &self.protocol)
            .field("crypto", &self.crypto)
            .finish()
    }
}

impl<H: Host> SshIo<H> {
    pub fn new(host: H, config: SessionConfig) -> Self {
        let strict = config.strict;
        Self {
            host,
            config,
            state: State::Init,
            rng: SystemRandom::new(),
            scanner: ident::Scanner::default(),
            remote: None,
            protocol: None,
            v1_decoder: v1::Decoder::new(strict),
            v2_decoder: v2::Decoder::new(strict),
            v2_encoder: v2::Encoder::default(),
            crypto: None,
            session_id: None,
            pending: vec![],
            exit_status: None,
            disconnect_reason: None,
            undelivered: vec![],
            server_kexinit: None,
            kexdh_reply: None,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn is_interactive(&self) -> bool {
        self.state == State::Interactive
    }

    pub fn protocol(&self) -> Option<ProtocolVersion> {
        self.protocol
    }

    /// The server's identification line, once received.
    pub fn remote_identification(&self) -> Option<&Identification> {
        self.remote.as_ref()
    }

    /// The cipher protecting the session, once the key is exchanged.
    pub fn cipher(&self) -> Option<CipherKind> {
        self.crypto.as_ref().map(SshCrypto::kind)
    }

    /// The protocol 1 session id.
    pub fn session_id(&self) -> Option<&[u8; 16]> {
        self.session_id.as_ref()
    }

    /// The exit status reported by the remote shell.
    pub fn exit_status(&self) -> Option<u32> {
        self.exit_status
    }

    /// The reason the server gave when it closed the session.
    pub fn disconnect_reason(&self) -> Option<&str> {
        self.disconnect_reason.as_deref()
    }

    /// Outputs decoded from a chunk whose processing later failed.
    ///
    /// [`handle_inbound`](Self::handle_inbound) returns only the error in
    /// that case; whatever the server sent before the bad frame is kept
    /// here until taken.
    pub fn take_undelivered(&mut self) -> Vec<Output> {
        mem::take(&mut self.undelivered)
    }

    /// Put outputs back in front of the undelivered ones.
    pub(crate) fn keep_undelivered(&mut self, mut outputs: Vec<Output>) {
        outputs.append(&mut self.undelivered);
        self.undelivered = outputs;
    }

    pub fn server_kexinit(&self) -> Option<&KexInit> {
        self.server_kexinit.as_ref()
    }

    pub fn kexdh_reply(&self) -> Option<&KexDhReply> {
        self.kexdh_reply.as_ref()
    }

    /// Sequence numbers of the next incoming and outgoing protocol 2 packet.
    pub fn sequence_numbers(&self) -> (u32, u32) {
        (
            self.v2_decoder.sequence_number(),
            self.v2_encoder.sequence_number(),
        )
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn set_login(&mut self, login: impl Into<String>) {
        self.config.set_login(login);
    }

    pub fn set_password(&mut self, password: impl Into<String>) {
        self.config.set_password(password);
    }

    /// Process bytes received from the server.
    ///
    /// Returns what should be displayed. Any error leaves the session
    /// disconnected; outputs decoded before the error are then available
    /// from [`take_undelivered`](Self::take_undelivered).
    pub fn handle_inbound(&mut self, data: &[u8]) -> Result<Vec<Output>, crate::Error> {
        let span = tracing::trace_span!("SshIo::handle_inbound");
        let _enter = span.enter();

        let mut outputs = vec![];
        match self.process(data, &mut outputs) {
            Ok(()) => Ok(outputs),
            Err(err) => {
                tracing::debug!("session failed: {}", err);
                self.disconnect();
                self.undelivered.extend(outputs);
                Err(err)
            }
        }
    }

    fn process(&mut self, mut data: &[u8], outputs: &mut Vec<Output>) -> Result<(), crate::Error> {
        loop {
            match self.state {
                State::Disconnected => {
                    if !data.is_empty() {
                        tracing::trace!("--> Disconnected: dropping {} bytes", data.len());
                    }
                    return Ok(());
                }

                State::Init => {
                    tracing::trace!("--> Init");
                    let (ident, rest) = self.scanner.scan(data)?;
                    data = rest;
                    match ident {
                        Some(ident) => self.negotiate(ident)?,
                        None => return Ok(()),
                    }
                }

                _ => {
                    if data.is_empty() {
                        return Ok(());
                    }
                    let crypto = self.crypto.as_ref();
                    let (packet, rest) = match self.protocol {
                        Some(ProtocolVersion::V2) => self.v2_decoder.decode(data, crypto)?,
                        _ => self.v1_decoder.decode(data, crypto)?,
                    };
                    data = rest;
                    if let Some(packet) = packet {
                        match self.protocol {
                            Some(ProtocolVersion::V2) => self.handle_packet2(packet, outputs)?,
                            _ => self.handle_packet1(packet, outputs)?,
                        }
                    }
                }
            }
        }
    }

    fn negotiate(&mut self, remote: Identification) -> Result<(), crate::Error> {
        let protocol = remote.protocol();
        tracing::debug!("remote version: {}, using {:?}", remote, protocol);

        let line = ident::client_line(protocol, &self.config.client_software);
        self.protocol = Some(protocol);
        self.remote = Some(remote);
        self.write_raw(&line)?;

        self.state = match protocol {
            ProtocolVersion::V1 => State::AwaitingPublicKey,
            ProtocolVersion::V2 => State::AwaitingKexInit,
        };
        tracing::trace!("--> {:?}", self.state);
        Ok(())
    }

    // ==== protocol 1 ====

    fn handle_packet1(&mut self, packet: Packet, outputs: &mut Vec<Output>) -> Result<(), crate::Error> {
        let msg_type = packet.msg_type();
        tracing::trace!("--> msg_type = {}, state = {:?}", msg_type, self.state);

        match msg_type {
            consts::SSH_MSG_IGNORE => {}

            consts::SSH_MSG_DEBUG => {
                let msg = util::get_ssh_string(packet.reader())?;
                tracing::debug!("remote debug: {}", String::from_utf8_lossy(&msg));
            }

            consts::SSH_MSG_DISCONNECT => {
                let reason = util::get_ssh_string(packet.reader())?;
                let reason = String::from_utf8_lossy(&reason).into_owned();
                tracing::debug!("disconnected by server: {}", reason);
                self.disconnect();
                self.disconnect_reason = Some(reason.clone());
                outputs.push(Output::Notice(reason));
            }

            consts::SSH_SMSG_PUBLIC_KEY => {
                if self.state != State::AwaitingPublicKey {
                    return Err(crate::Error::protocol("unexpected SSH_SMSG_PUBLIC_KEY"));
                }
                let msg = PublicKeyMsg::parse(&packet)?;
                self.send_session_key(msg)?;
            }

            consts::SSH_SMSG_SUCCESS => self.handle_success(outputs)?,
            consts::SSH_SMSG_FAILURE => self.handle_failure()?,

            consts::SSH_SMSG_STDOUT_DATA => {
                let data = util::get_ssh_string(packet.reader())?;
                outputs.push(Output::Stdout(data.into()));
            }

            consts::SSH_SMSG_STDERR_DATA => {
                let data = util::get_ssh_string(packet.reader())?;
                outputs.push(Output::Stderr(data.into()));
            }

            consts::SSH_SMSG_EXITSTATUS => {
                let status = util::get_u32(packet.reader())?;
                tracing::debug!("exit status {}", status);
                self.exit_status = Some(status);
                self.send_packet(Packet::new(consts::SSH_CMSG_EXIT_CONFIRMATION, Bytes::new()))?;
                self.disconnect();
            }

            typ => tracing::warn!("ignoring unknown message type {}", typ),
        }

        Ok(())
    }

    fn send_session_key(&mut self, msg: PublicKeyMsg) -> Result<(), crate::Error> {
        tracing::debug!(
            "server key {} bits, host key {} bits, protocol flags {:#x}, ciphers {:#x}, auths {:#x}",
            msg.server_key.bits,
            msg.host_key.bits,
            msg.protocol_flags,
            msg.cipher_mask,
            msg.auth_mask
        );

        if let Some(expected) = self.config.host_key_fingerprint.as_deref() {
            let expected = expected.replace(':', "").to_ascii_lowercase();
            if !expected.is_empty() {
                let actual = crypto::fingerprint(&msg.host_key.modulus);
                if actual != expected {
                    self.config.clear_credentials();
                    self.send_disconnect("Host key fingerprint mismatch.")?;
                    self.disconnect();
                    return Err(crate::Error::config(format!(
                        "host key fingerprint {} does not match the pinned {}",
                        actual, expected
                    )));
                }
            }
        }

        let kind = match CipherKind::select(&self.config.ciphers, msg.cipher_mask) {
            Some(kind) => kind,
            None => {
                self.send_disconnect("No common cipher.")?;
                self.disconnect();
                return Err(crate::Error::protocol(format!(
                    "no usable cipher in the supported-ciphers mask {:#x}",
                    msg.cipher_mask
                )));
            }
        };
        if !kind.is_implemented() {
            self.send_disconnect("Cipher not implemented.")?;
            self.disconnect();
            return Err(crate::Error::config(format!(
                "cipher {} is not implemented",
                kind
            )));
        }
        tracing::debug!("using cipher {}", kind);

        let session_id = crypto::session_id(&msg.host_key.modulus, &msg.server_key.modulus, &msg.cookie);
        let session_key = crypto::generate_session_key(&self.rng)?;
        let mut xored = session_key.clone();
        crypto::xor_session_key(&mut xored, &session_id);
        let encrypted =
            crypto::encrypt_session_key(&self.rng, &xored[..], &msg.server_key, &msg.host_key)?;
        let bits = u16::try_from(encrypted.len() * 8).map_err(|_| {
            crate::Error::protocol(format!(
                "encrypted session key of {} bytes does not fit SSH_CMSG_SESSION_KEY",
                encrypted.len()
            ))
        })?;

        let packet = Packet::builder(consts::SSH_CMSG_SESSION_KEY)
            .put_u8(kind.id())
            .put_slice(&msg.cookie)
            .put_u16(bits)
            .put_slice(&encrypted)
            .put_u32(0)
            .build();
        self.send_packet(packet)?;

        // everything after the session key is encrypted.
        self.crypto = Some(SshCrypto::new(kind, &session_key[..])?);
        self.session_id = Some(session_id);
        self.state = State::KeyExchangeSent;
        tracing::trace!("--> KeyExchangeSent");
        Ok(())
    }

    fn handle_success(&mut self, outputs: &mut Vec<Output>) -> Result<(), crate::Error> {
        match self.state {
            State::KeyExchangeSent => {
                let packet = Packet::builder(consts::SSH_CMSG_USER)
                    .put_string(&self.config.login)
                    .build();
                self.send_packet(packet)?;
                self.state = State::AwaitingAuthResult(AuthStep::User);
            }

            State::AwaitingAuthResult(AuthStep::User) => {
                outputs.push(Output::Notice("Empty password login.".into()));
                self.request_pty()?;
            }

            State::AwaitingAuthResult(AuthStep::Password) => {
                outputs.push(Output::Notice("Login & password accepted".into()));
                self.request_pty()?;
            }

            State::AwaitingPtyResult => self.enter_interactive()?,

            // the answer to EXEC_SHELL, or to a WINDOW_SIZE
            State::Interactive => {}

            state => tracing::warn!("unexpected SSH_SMSG_SUCCESS in {:?}", state),
        }
        tracing::trace!("--> {:?}", self.state);
        Ok(())
    }

    fn handle_failure(&mut self) -> Result<(), crate::Error> {
        match self.state {
            State::AwaitingAuthResult(AuthStep::User) => {
                let packet = Packet::builder(consts::SSH_CMSG_AUTH_PASSWORD)
                    .put_string(&self.config.password)
                    .build();
                self.send_packet(packet)?;
                self.state = State::AwaitingAuthResult(AuthStep::Password);
            }

            State::AwaitingAuthResult(AuthStep::Password) => {
                self.send_disconnect("Failed to log in.")?;
                self.disconnect();
                return Err(crate::Error::auth("login and password not accepted"));
            }

            State::AwaitingPtyResult => tracing::warn!("the server refused to allocate a pty"),

            state => tracing::warn!("unexpected SSH_SMSG_FAILURE in {:?}", state),
        }
        tracing::trace!("--> {:?}", self.state);
        Ok(())
    }

    fn request_pty(&mut self) -> Result<(), crate::Error> {
        let (cols, rows) = self.host.window_size();
        let packet = Packet::builder(consts::SSH_CMSG_REQUEST_PTY)
            .put_string(self.host.terminal_type())
            .put_u32(rows)
            .put_u32(cols)
            .put_u32(0)
            .put_u32(0)
            .put_u8(0) // TTY_OP_END
            .build();
        self.send_packet(packet)?;
        self.state = State::AwaitingPtyResult;
        Ok(())
    }

    fn enter_interactive(&mut self) -> Result<(), crate::Error> {
        self.state = State::Interactive;
        self.flush_pending()?;
        self.send_packet(Packet::new(consts::SSH_CMSG_EXEC_SHELL, Bytes::new()))?;
        self.host.set_local_echo(false);
        Ok(())
    }

    fn flush_pending(&mut self) -> Result<(), crate::Error> {
        let pending = Zeroizing::new(mem::take(&mut self.pending));
        for chunk in pending.chunks(STDIN_CHUNK_LEN) {
            let packet = Packet::builder(consts::SSH_CMSG_STDIN_DATA)
                .put_string(chunk)
                .build();
            self.send_packet(packet)?;
        }
        Ok(())
    }

    // ==== protocol 2 ====

    fn handle_packet2(&mut self, packet: Packet, outputs: &mut Vec<Output>) -> Result<(), crate::Error> {
        let msg_type = packet.msg_type();
        tracing::trace!("--> msg_type = {}, state = {:?}", msg_type, self.state);

        match msg_type {
            consts::SSH2_MSG_IGNORE => {}

            consts::SSH2_MSG_DISCONNECT => {
                let mut rd = packet.reader();
                let code = util::get_u32(&mut rd)?;
                let description = util::get_ssh_string(&mut rd)?;
                let description = String::from_utf8_lossy(&description).into_owned();
                tracing::debug!("disconnected by server ({}): {}", code, description);
                self.disconnect();
                outputs.push(Output::Notice(format!("SSH2 disconnect: {}", description)));
                self.disconnect_reason = Some(description);
            }

            consts::SSH2_MSG_KEXINIT => {
                if self.state != State::AwaitingKexInit {
                    return Err(crate::Error::protocol("unexpected SSH2_MSG_KEXINIT"));
                }
                let kexinit = KexInit::parse(&packet)?;
                tracing::debug!("server KEXINIT: {:?}", kexinit);
                self.server_kexinit = Some(kexinit);
                self.send_kexinit()?;
            }

            consts::SSH2_MSG_KEXDH_REPLY => {
                let reply = KexDhReply::parse(&packet)?;
                tracing::debug!("host key type {}", reply.host_key_type);
                outputs.push(Output::Notice(reply.summary()));
                self.kexdh_reply = Some(reply);
            }

            consts::SSH2_MSG_NEWKEYS => {
                self.send_packet(Packet::new(consts::SSH2_MSG_NEWKEYS, Bytes::new()))?;
                self.crypto = Some(SshCrypto::new(CipherKind::None, &[0u8; 16])?);

                let packet = Packet::builder(consts::SSH2_MSG_SERVICE_REQUEST)
                    .put_string("ssh-userauth")
                    .build();
                self.send_packet(packet)?;
                self.state = State::ServiceRequested;
                tracing::trace!("--> ServiceRequested");
            }

            consts::SSH2_MSG_SERVICE_ACCEPT => {
                let service = util::get_ssh_string(packet.reader())?;
                tracing::debug!("service accepted: {}", String::from_utf8_lossy(&service));
            }

            typ => tracing::warn!("ignoring unknown message type {}", typ),
        }

        Ok(())
    }

    fn send_kexinit(&mut self) -> Result<(), crate::Error> {
        let mut cookie = [0u8; 16];
        crypto::fill_random(&self.rng, &mut cookie)?;

        let packet = Packet::builder(consts::SSH2_MSG_KEXINIT)
            .put_slice(&cookie)
            .put_string("diffie-hellman-group1-sha1")
            .put_string("ssh-rsa")
            .put_string("none")
            .put_string("none")
            .put_string("hmac-md5")
            .put_string("hmac-md5")
            .put_string("none")
            .put_string("none")
            .put_string("")
            .put_string("")
            .put_u8(0)
            .put_u32(0)
            .build();
        self.send_packet(packet)?;

        let packet = Packet::builder(consts::SSH2_MSG_KEXDH_INIT)
            .put_mpint2(&KEXDH_PLACEHOLDER)
            .build();
        self.send_packet(packet)?;

        self.state = State::KeyExchangeSent;
        tracing::trace!("--> KeyExchangeSent");
        Ok(())
    }

    // ==== outbound ====

    /// Queue terminal input for the remote shell.
    ///
    /// Newlines are sent as carriage returns. Input given before the shell
    /// runs is held back and sent once the pty is granted.
    pub fn send_data(&mut self, data: &str) -> Result<(), crate::Error> {
        let span = tracing::trace_span!("SshIo::send_data");
        let _enter = span.enter();

        if self.state == State::Disconnected {
            return Err(crate::Error::disconnected());
        }

        self.pending
            .extend(data.bytes().map(|c| if c == b'\n' { b'\r' } else { c }));
        if self.state == State::Interactive {
            self.flush_pending()?;
        } else {
            tracing::trace!("queued {} bytes in {:?}", self.pending.len(), self.state);
        }
        Ok(())
    }

    /// Tell the server about a new terminal size.
    ///
    /// Only an interactive session has a pty to resize; otherwise the call
    /// is ignored.
    pub fn set_window_size(&mut self, cols: u32, rows: u32) -> Result<(), crate::Error> {
        let span = tracing::trace_span!("SshIo::set_window_size");
        let _enter = span.enter();

        if self.state != State::Interactive {
            tracing::debug!("ignoring window size {}x{} in {:?}", cols, rows, self.state);
            return Ok(());
        }

        let packet = Packet::builder(consts::SSH_CMSG_WINDOW_SIZE)
            .put_u32(rows)
            .put_u32(cols)
            .put_u32(0)
            .put_u32(0)
            .build();
        self.send_packet(packet)
    }

    /// Send a disconnect message with `reason` and tear the session down.
    pub fn close(&mut self, reason: &str) -> Result<(), crate::Error> {
        let span = tracing::trace_span!("SshIo::close");
        let _enter = span.enter();

        let result = match self.state {
            State::Init | State::Disconnected => Ok(()),
            _ => self.send_disconnect(reason),
        };
        self.disconnect();
        result
    }

    fn send_disconnect(&mut self, reason: &str) -> Result<(), crate::Error> {
        let packet = match self.protocol {
            Some(ProtocolVersion::V2) => Packet::builder(consts::SSH2_MSG_DISCONNECT)
                .put_u32(SSH2_DISCONNECT_BY_APPLICATION)
                .put_string(reason)
                .put_string("")
                .build(),
            _ => Packet::builder(consts::SSH_MSG_DISCONNECT)
                .put_string(reason)
                .build(),
        };
        self.send_packet(packet)
    }

    fn send_packet(&mut self, packet: Packet) -> Result<(), crate::Error> {
        tracing::trace!("<-- msg_type = {}", packet.msg_type());
        let crypto = self.crypto.as_ref();
        let wire = match self.protocol {
            Some(ProtocolVersion::V2) => self.v2_encoder.encode(&packet, crypto, &self.rng),
            _ => v1::encode(&packet, crypto, &self.rng),
        };
        packet.wipe();
        self.write_raw(&wire?)
    }

    fn write_raw(&mut self, data: &[u8]) -> Result<(), crate::Error> {
        if let Err(err) = self.host.write(data) {
            self.disconnect();
            return Err(crate::Error::io(err));
        }
        Ok(())
    }

    // ==== teardown ====

    /// Tear the session down without telling the server.
    ///
    /// Key material, credentials, queued input and framing state are
    /// overwritten and dropped. Later inbound bytes are ignored until [`reset`](Self::reset).
    pub fn disconnect(&mut self) {
        let span = tracing::trace_span!("SshIo::disconnect");
        let _enter = span.enter();

        self.crypto = None;
        self.session_id.zeroize();
        self.config.clear_credentials();
        self.pending.zeroize();
        self.scanner.reset();
        self.v1_decoder.reset();
        self.v2_decoder.reset();
        self.v2_encoder.reset();

        self.state = State::Disconnected;
        tracing::trace!("--> Disconnected");
    }

    /// Make the engine ready for a new connection.
    ///
    /// Credentials have to be set again with [`set_login`](Self::set_login)
    /// and [`set_password`](Self::set_password).
    pub fn reset(&mut self) {
        self.disconnect();
        self.remote = None;
        self.protocol = None;
        self.exit_status = None;
        self.disconnect_reason = None;
        self.undelivered.clear();
        self.server_kexinit = None;
        self.kexdh_reply = None;
        self.state = State::Init;
        tracing::trace!("--> Init");
    }
}
