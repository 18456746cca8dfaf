// defined in the SSH 1.5 protocol draft (draft-ylonen-ssh-protocol-00), section "Message types"
pub(crate) const SSH_MSG_DISCONNECT: u8 = 1;
pub(crate) const SSH_SMSG_PUBLIC_KEY: u8 = 2;
pub(crate) const SSH_CMSG_SESSION_KEY: u8 = 3;
pub(crate) const SSH_CMSG_USER: u8 = 4;
pub(crate) const SSH_CMSG_AUTH_PASSWORD: u8 = 9;
pub(crate) const SSH_CMSG_REQUEST_PTY: u8 = 10;
pub(crate) const SSH_CMSG_WINDOW_SIZE: u8 = 11;
pub(crate) const SSH_CMSG_EXEC_SHELL: u8 = 12;
pub(crate) const SSH_SMSG_SUCCESS: u8 = 14;
pub(crate) const SSH_SMSG_FAILURE: u8 = 15;
pub(crate) const SSH_CMSG_STDIN_DATA: u8 = 16;
pub(crate) const SSH_SMSG_STDOUT_DATA: u8 = 17;
pub(crate) const SSH_SMSG_STDERR_DATA: u8 = 18;
pub(crate) const SSH_SMSG_EXITSTATUS: u8 = 20;
pub(crate) const SSH_MSG_IGNORE: u8 = 32;
pub(crate) const SSH_CMSG_EXIT_CONFIRMATION: u8 = 33;
pub(crate) const SSH_MSG_DEBUG: u8 = 36;

// defined in https://tools.ietf.org/html/rfc4253#section-12
pub(crate) const SSH2_MSG_DISCONNECT: u8 = 1;
pub(crate) const SSH2_MSG_IGNORE: u8 = 2;
pub(crate) const SSH2_MSG_SERVICE_REQUEST: u8 = 5;
pub(crate) const SSH2_MSG_SERVICE_ACCEPT: u8 = 6;
pub(crate) const SSH2_MSG_KEXINIT: u8 = 20;
pub(crate) const SSH2_MSG_NEWKEYS: u8 = 21;

// defined in https://tools.ietf.org/html/rfc4253#section-8
pub(crate) const SSH2_MSG_KEXDH_INIT: u8 = 30;
pub(crate) const SSH2_MSG_KEXDH_REPLY: u8 = 31;

// SSH-1 protocol limit on the length field of a packet.
pub(crate) const MAX_PACKET_LENGTH: u32 = 256 * 1024;

/// Length of the SSH-1 anti-spoofing cookie.
pub(crate) const COOKIE_LEN: usize = 8;

/// Length of the SSH-1 session key.
pub(crate) const SESSION_KEY_LEN: usize = 32;

/// Length of the (MD5) trailer appended to SSH-2 packets once encryption is on.
pub(crate) const SSH2_MAC_LEN: usize = 16;
