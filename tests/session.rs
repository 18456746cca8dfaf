mod common;

use bytes::{Buf, Bytes};
use common::*;
use ring::rand::SystemRandom;
use std::io;
use termssh::{
    cipher::CipherKind,
    crypto::SshCrypto,
    packet::{v1, v2, Packet},
    ErrorKind, Host, Output, SessionConfig, SshIo, State,
};

#[derive(Default)]
struct Terminal {
    sent: Vec<u8>,
    echo: Option<bool>,
}

impl Host for Terminal {
    fn write(&mut self, data: &[u8]) -> io::Result<()> {
        self.sent.extend_from_slice(data);
        Ok(())
    }

    fn terminal_type(&self) -> String {
        "vt100".into()
    }

    fn window_size(&self) -> (u32, u32) {
        (132, 43)
    }

    fn set_local_echo(&mut self, echo: bool) {
        self.echo = Some(echo);
    }
}

/// The server side of a protocol 1 session.
struct Server1 {
    rng: SystemRandom,
    decoder: v1::Decoder,
    crypto: Option<SshCrypto>,
}

impl Server1 {
    fn new() -> Self {
        Self {
            rng: SystemRandom::new(),
            decoder: v1::Decoder::new(true),
            crypto: None,
        }
    }

    fn frame(&self, packet: Packet) -> Vec<u8> {
        v1::encode(&packet, self.crypto.as_ref(), &self.rng).unwrap()
    }

    fn empty(&self, msg_type: u8) -> Vec<u8> {
        self.frame(Packet::new(msg_type, Bytes::new()))
    }

    fn public_key(&self, cipher_mask: u32) -> Vec<u8> {
        self.frame(public_key_packet(cipher_mask))
    }

    fn receive(&mut self, engine: &mut SshIo<Terminal>) -> Vec<Packet> {
        let sent = std::mem::take(&mut engine.host_mut().sent);
        let mut input = &sent[..];
        let mut packets = vec![];
        while !input.is_empty() {
            let (packet, rest) = self.decoder.decode(input, self.crypto.as_ref()).unwrap();
            packets.extend(packet);
            input = rest;
        }
        packets
    }

    /// Recover the session key and switch on encryption.
    fn accept_session_key(&mut self, packet: &Packet) -> CipherKind {
        let (kind, key) = recover_session_key(packet);
        self.crypto = Some(SshCrypto::new(kind, &key).unwrap());
        kind
    }
}

fn engine(config: &mut SessionConfig) -> SshIo<Terminal> {
    config.set_client_software("Test").set_login("alice").set_password("secret");
    let mut engine = SshIo::new(Terminal::default(), config.clone());
    engine.handle_inbound(b"SSH-1.5-Test\n").unwrap();
    assert_eq!(engine.host().sent, b"SSH-1.5-Test\n");
    engine.host_mut().sent.clear();
    engine
}

#[test]
fn protocol_1_login_to_interactive_shell() {
    let mut server = Server1::new();
    let mut engine = engine(&mut SessionConfig::default());

    // typed before the shell runs
    engine.send_data("ls\n").unwrap();
    assert!(engine.host().sent.is_empty());

    engine.handle_inbound(&server.public_key(MASK_DES3)).unwrap();
    assert_eq!(engine.state(), State::KeyExchangeSent);
    assert_eq!(engine.cipher(), Some(CipherKind::Des3));
    assert_eq!(
        engine.session_id().unwrap(),
        &unhex("0f1472a365fddc2e8bd1ff5a341b1bd0")[..]
    );

    let packets = server.receive(&mut engine);
    assert_eq!(packets.len(), 1);
    assert_eq!(server.accept_session_key(&packets[0]), CipherKind::Des3);

    engine.handle_inbound(&server.empty(SSH_SMSG_SUCCESS)).unwrap();
    let packets = server.receive(&mut engine);
    assert_eq!(packets.len(), 1);
    assert_eq!(packets[0].msg_type(), SSH_CMSG_USER);
    assert_eq!(get_string(&mut &packets[0].payload()[..]), b"alice");

    engine.handle_inbound(&server.empty(SSH_SMSG_FAILURE)).unwrap();
    let packets = server.receive(&mut engine);
    assert_eq!(packets[0].msg_type(), SSH_CMSG_AUTH_PASSWORD);
    assert_eq!(get_string(&mut &packets[0].payload()[..]), b"secret");

    let outputs = engine.handle_inbound(&server.empty(SSH_SMSG_SUCCESS)).unwrap();
    assert_eq!(
        outputs,
        vec![Output::Notice("Login & password accepted".into())]
    );
    let packets = server.receive(&mut engine);
    assert_eq!(packets.len(), 1);
    assert_eq!(packets[0].msg_type(), SSH_CMSG_REQUEST_PTY);
    let mut rd = &packets[0].payload()[..];
    assert_eq!(get_string(&mut rd), b"vt100");
    assert_eq!((rd.get_u32(), rd.get_u32()), (43, 132));
    assert_eq!((rd.get_u32(), rd.get_u32(), rd.get_u8()), (0, 0, 0));
    assert_eq!(engine.state(), State::AwaitingPtyResult);

    engine.handle_inbound(&server.empty(SSH_SMSG_SUCCESS)).unwrap();
    assert_eq!(engine.state(), State::Interactive);
    assert_eq!(engine.host().echo, Some(false));
    let packets = server.receive(&mut engine);
    let types: Vec<_> = packets.iter().map(Packet::msg_type).collect();
    assert_eq!(types, [SSH_CMSG_STDIN_DATA, SSH_CMSG_EXEC_SHELL]);
    assert_eq!(get_string(&mut &packets[0].payload()[..]), b"ls\r");

    engine.send_data("exit\n").unwrap();
    engine.set_window_size(100, 30).unwrap();
    let packets = server.receive(&mut engine);
    assert_eq!(packets[0].msg_type(), SSH_CMSG_STDIN_DATA);
    assert_eq!(get_string(&mut &packets[0].payload()[..]), b"exit\r");
    assert_eq!(packets[1].msg_type(), SSH_CMSG_WINDOW_SIZE);
    let mut rd = &packets[1].payload()[..];
    assert_eq!((rd.get_u32(), rd.get_u32()), (30, 100));

    let mut input = server.frame(
        Packet::builder(SSH_SMSG_STDOUT_DATA)
            .put_string("hello\r\n")
            .build(),
    );
    input.extend(server.frame(
        Packet::builder(SSH_SMSG_STDERR_DATA)
            .put_string("oops")
            .build(),
    ));
    input.extend(server.frame(Packet::builder(SSH_SMSG_EXITSTATUS).put_u32(3).build()));

    // delivered in small pieces
    let mut outputs = vec![];
    for chunk in input.chunks(5) {
        outputs.extend(engine.handle_inbound(chunk).unwrap());
    }
    assert_eq!(
        outputs,
        vec![
            Output::Stdout(Bytes::from_static(b"hello\r\n")),
            Output::Stderr(Bytes::from_static(b"oops")),
        ]
    );
    assert_eq!(engine.exit_status(), Some(3));
    assert_eq!(engine.state(), State::Disconnected);
    assert_eq!(engine.cipher(), None);

    let packets = server.receive(&mut engine);
    assert_eq!(packets.len(), 1);
    assert_eq!(packets[0].msg_type(), SSH_CMSG_EXIT_CONFIRMATION);
}

#[test]
fn empty_password_login() {
    let mut server = Server1::new();
    let mut config = SessionConfig::default();
    config.set_host_key_fingerprint("4C:D0:A9:01:2D:A7:02:59:FE:DB:BA:1D:B3:AB:C7:ED");
    let mut engine = engine(&mut config);

    engine.handle_inbound(&server.public_key(MASK_DES3)).unwrap();
    let packets = server.receive(&mut engine);
    server.accept_session_key(&packets[0]);

    engine.handle_inbound(&server.empty(SSH_SMSG_SUCCESS)).unwrap();
    server.receive(&mut engine);
    let outputs = engine.handle_inbound(&server.empty(SSH_SMSG_SUCCESS)).unwrap();
    assert_eq!(outputs, vec![Output::Notice("Empty password login.".into())]);
    assert_eq!(engine.state(), State::AwaitingPtyResult);

    // a refused pty leaves the session waiting
    engine.handle_inbound(&server.empty(SSH_SMSG_FAILURE)).unwrap();
    assert_eq!(engine.state(), State::AwaitingPtyResult);
}

#[test]
fn rejected_password_disconnects() {
    let mut server = Server1::new();
    let mut engine = engine(&mut SessionConfig::default());

    engine.handle_inbound(&server.public_key(MASK_DES3)).unwrap();
    let packets = server.receive(&mut engine);
    server.accept_session_key(&packets[0]);

    engine.handle_inbound(&server.empty(SSH_SMSG_SUCCESS)).unwrap();
    engine.handle_inbound(&server.empty(SSH_SMSG_FAILURE)).unwrap();
    server.receive(&mut engine);

    let err = engine
        .handle_inbound(&server.empty(SSH_SMSG_FAILURE))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Auth);
    assert_eq!(engine.state(), State::Disconnected);

    let packets = server.receive(&mut engine);
    assert_eq!(packets.len(), 1);
    assert_eq!(packets[0].msg_type(), SSH_MSG_DISCONNECT);
    assert_eq!(
        get_string(&mut &packets[0].payload()[..]),
        b"Failed to log in."
    );
}

#[test]
fn no_common_cipher_disconnects_without_a_session_key() {
    let mut server = Server1::new();
    let mut engine = engine(&mut SessionConfig::default());

    let err = engine.handle_inbound(&server.public_key(MASK_TSS)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Protocol);
    assert_eq!(engine.state(), State::Disconnected);

    let packets = server.receive(&mut engine);
    let types: Vec<_> = packets.iter().map(Packet::msg_type).collect();
    assert_eq!(types, [SSH_MSG_DISCONNECT]);
}

#[test]
fn unimplemented_cipher_fails_closed() {
    let mut server = Server1::new();
    let mut engine = engine(&mut SessionConfig::default());

    // blowfish is preferred but cannot be used
    let err = engine
        .handle_inbound(&server.public_key(MASK_BLOWFISH | MASK_DES3))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Config);
    assert_eq!(engine.state(), State::Disconnected);

    let packets = server.receive(&mut engine);
    let types: Vec<_> = packets.iter().map(Packet::msg_type).collect();
    assert_eq!(types, [SSH_MSG_DISCONNECT]);
}

#[test]
fn cipher_preference_is_configurable() {
    let mut server = Server1::new();
    let mut config = SessionConfig::default();
    config.set_ciphers(vec![CipherKind::Des3, CipherKind::Des]);
    let mut engine = engine(&mut config);

    engine
        .handle_inbound(&server.public_key(MASK_BLOWFISH | MASK_DES3))
        .unwrap();
    assert_eq!(engine.cipher(), Some(CipherKind::Des3));
    let packets = server.receive(&mut engine);
    assert_eq!(server.accept_session_key(&packets[0]), CipherKind::Des3);
}

#[test]
fn pinned_host_key_mismatch_disconnects() {
    let mut server = Server1::new();
    let mut config = SessionConfig::default();
    config.set_host_key_fingerprint("00112233445566778899aabbccddeeff");
    let mut engine = engine(&mut config);

    let err = engine.handle_inbound(&server.public_key(MASK_DES3)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Config);
    assert!(err.to_string().contains(HOST_FINGERPRINT));
    assert_eq!(engine.state(), State::Disconnected);
    assert_eq!(engine.session_id(), None);

    let packets = server.receive(&mut engine);
    let types: Vec<_> = packets.iter().map(Packet::msg_type).collect();
    assert_eq!(types, [SSH_MSG_DISCONNECT]);
}

#[test]
fn protocol_2_key_exchange() {
    let rng = SystemRandom::new();
    let mut config = SessionConfig::default();
    config.set_client_software("Test");
    let mut engine = SshIo::new(Terminal::default(), config);

    let mut encoder = v2::Encoder::default();
    let mut decoder = v2::Decoder::new(true);
    let none = SshCrypto::new(CipherKind::None, &[0u8; 16]).unwrap();

    let mut input = b"SSH-2.0-Test\r\n".to_vec();
    let mut kexinit = Packet::builder(SSH2_MSG_KEXINIT).put_slice(&[0x5a; 16]);
    for name in &[
        "diffie-hellman-group1-sha1",
        "ssh-rsa",
        "3des-cbc",
        "3des-cbc",
        "hmac-md5",
        "hmac-md5",
        "none",
        "none",
        "",
        "",
    ] {
        kexinit = kexinit.put_string(name);
    }
    let kexinit = kexinit.put_u8(0).put_u32(0).build();
    input.extend(encoder.encode(&kexinit, None, &rng).unwrap());

    engine.handle_inbound(&input).unwrap();
    assert_eq!(engine.state(), State::KeyExchangeSent);
    let server_kexinit = engine.server_kexinit().unwrap();
    assert_eq!(server_kexinit.cookie, [0x5a; 16]);
    assert_eq!(server_kexinit.encryption_algorithms_server_to_client, "3des-cbc");
    assert!(!server_kexinit.first_kex_packet_follows);

    let sent = std::mem::take(&mut engine.host_mut().sent);
    assert!(sent.starts_with(b"SSH-2.0-Test\n"));
    let mut rest = &sent[b"SSH-2.0-Test\n".len()..];

    let (packet, r) = decoder.decode(rest, None).unwrap();
    rest = r;
    let packet = packet.unwrap();
    assert_eq!(packet.msg_type(), SSH2_MSG_KEXINIT);
    let mut rd = &packet.payload()[16..];
    let names: Vec<_> = (0..10).map(|_| get_string(&mut rd)).collect();
    assert_eq!(names[0], b"diffie-hellman-group1-sha1");
    assert_eq!(names[1], b"ssh-rsa");
    assert_eq!(names[2], b"none");
    assert_eq!(names[4], b"hmac-md5");
    assert_eq!(names[9], b"");
    assert_eq!((rd.get_u8(), rd.get_u32()), (0, 0));

    let (packet, r) = decoder.decode(rest, None).unwrap();
    assert!(r.is_empty());
    let packet = packet.unwrap();
    assert_eq!(packet.msg_type(), SSH2_MSG_KEXDH_INIT);
    assert_eq!(&packet.payload()[..], &[0, 0, 0, 4, 0xde, 0xad, 0xbe, 0xef]);

    let mut blob = vec![];
    put_string(&mut blob, b"ssh-rsa");
    put_string(&mut blob, &EXPONENT);
    put_string(&mut blob, &unhex(SERVER_N));
    let mut sig = vec![];
    put_string(&mut sig, b"ssh-rsa");
    put_string(&mut sig, &[0xaa; 64]);
    let reply = Packet::builder(SSH2_MSG_KEXDH_REPLY)
        .put_string(&blob)
        .put_mpint2(&[0x12, 0x34])
        .put_string(&sig)
        .build();

    let outputs = engine
        .handle_inbound(&encoder.encode(&reply, None, &rng).unwrap())
        .unwrap();
    assert_eq!(outputs.len(), 1);
    match &outputs[0] {
        Output::Notice(notice) => {
            assert!(notice.starts_with("SSH-RSA ("), "{}", notice);
            assert!(notice.contains(",65537)"), "{}", notice);
            assert!(notice.contains("DH Server Pub: 4660"), "{}", notice);
            assert!(notice.ends_with("Signature: ktype is ssh-rsa"), "{}", notice);
        }
        output => panic!("unexpected output {:?}", output),
    }
    let reply = engine.kexdh_reply().unwrap();
    assert_eq!(reply.n, unhex(SERVER_N));
    assert_eq!(reply.e, EXPONENT);
    assert_eq!(reply.signature, vec![0xaa; 64]);

    let newkeys = Packet::new(SSH2_MSG_NEWKEYS, Bytes::new());
    engine
        .handle_inbound(&encoder.encode(&newkeys, None, &rng).unwrap())
        .unwrap();
    assert_eq!(engine.state(), State::ServiceRequested);
    assert_eq!(engine.cipher(), Some(CipherKind::None));

    let sent = std::mem::take(&mut engine.host_mut().sent);
    let (packet, rest) = decoder.decode(&sent, None).unwrap();
    assert_eq!(packet.unwrap().msg_type(), SSH2_MSG_NEWKEYS);
    let (packet, rest) = decoder.decode(rest, Some(&none)).unwrap();
    assert!(rest.is_empty());
    let packet = packet.unwrap();
    assert_eq!(packet.msg_type(), SSH2_MSG_SERVICE_REQUEST);
    assert_eq!(get_string(&mut &packet.payload()[..]), b"ssh-userauth");

    let accept = Packet::builder(SSH2_MSG_SERVICE_ACCEPT)
        .put_string("ssh-userauth")
        .build();
    let outputs = engine
        .handle_inbound(&encoder.encode(&accept, Some(&none), &rng).unwrap())
        .unwrap();
    assert!(outputs.is_empty());
    assert_eq!(engine.state(), State::ServiceRequested);
    assert_eq!(engine.sequence_numbers(), (4, 4));
}

#[test]
fn protocol_2_disconnect_is_surfaced() {
    let rng = SystemRandom::new();
    let mut engine = SshIo::new(Terminal::default(), SessionConfig::default());
    engine.handle_inbound(b"SSH-2.0-Test\n").unwrap();

    let disconnect = Packet::builder(SSH2_MSG_DISCONNECT)
        .put_u32(2)
        .put_string("protocol error")
        .put_string("")
        .build();
    let outputs = engine
        .handle_inbound(&v2::Encoder::default().encode(&disconnect, None, &rng).unwrap())
        .unwrap();
    assert_eq!(
        outputs,
        vec![Output::Notice("SSH2 disconnect: protocol error".into())]
    );
    assert_eq!(engine.state(), State::Disconnected);
    assert_eq!(engine.disconnect_reason(), Some("protocol error"));
}
