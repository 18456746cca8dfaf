//! Session and client settings.

use crate::cipher::CipherKind;
use std::{fmt, time::Duration};
use zeroize::Zeroize;

/// Settings of the protocol engine.
#[derive(Clone)]
pub struct SessionConfig {
    pub(crate) login: String,
    pub(crate) password: String,
    pub(crate) host_key_fingerprint: Option<String>,
    pub(crate) client_software: String,
    pub(crate) ciphers: Vec<CipherKind>,
    pub(crate) strict: bool,
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("login", &self.login)
            .field("password", &"<redacted>")
            .field("host_key_fingerprint", &self.host_key_fingerprint)
            .field("client_software", &self.client_software)
            .field("ciphers", &self.ciphers)
            .field("strict", &self.strict)
            .finish()
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            login: String::new(),
            password: String::new(),
            host_key_fingerprint: None,
            client_software: concat!("termssh_", env!("CARGO_PKG_VERSION")).into(),
            ciphers: CipherKind::PREFERENCE.to_vec(),
            strict: false,
        }
    }
}

impl SessionConfig {
    pub fn set_login(&mut self, login: impl Into<String>) -> &mut Self {
        self.login.zeroize();
        self.login = login.into();
        self
    }

    pub fn set_password(&mut self, password: impl Into<String>) -> &mut Self {
        self.password.zeroize();
        self.password = password.into();
        self
    }

    /// Pin the host key to the lowercase hex MD5 of its modulus.
    ///
    /// The comparison ignores case and `:` separators.
    pub fn set_host_key_fingerprint(&mut self, fingerprint: impl Into<String>) -> &mut Self {
        self.host_key_fingerprint = Some(fingerprint.into());
        self
    }

    /// The free text following the version in the identification line.
    pub fn set_client_software(&mut self, software: impl Into<String>) -> &mut Self {
        self.client_software = software.into();
        self
    }

    /// The ciphers to offer, most preferred first.
    pub fn set_ciphers(&mut self, ciphers: impl IntoIterator<Item = CipherKind>) -> &mut Self {
        self.ciphers = ciphers.into_iter().collect();
        self
    }

    /// Turn CRC and MAC mismatches into protocol errors.
    pub fn set_strict(&mut self, strict: bool) -> &mut Self {
        self.strict = strict;
        self
    }

    pub fn login(&self) -> &str {
        &self.login
    }

    pub fn host_key_fingerprint(&self) -> Option<&str> {
        self.host_key_fingerprint.as_deref()
    }

    pub fn client_software(&self) -> &str {
        &self.client_software
    }

    pub fn ciphers(&self) -> &[CipherKind] {
        &self.ciphers
    }

    pub fn strict(&self) -> bool {
        self.strict
    }

    /// Overwrite the login and password in place.
    pub(crate) fn clear_credentials(&mut self) {
        self.login.zeroize();
        self.password.zeroize();
    }
}

impl Drop for SessionConfig {
    fn drop(&mut self) {
        self.clear_credentials();
    }
}

/// Settings of the async [`Client`](crate::client::Client).
#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub(crate) session: SessionConfig,
    pub(crate) handshake_timeout: Duration,
    pub(crate) terminal_type: String,
    pub(crate) window_size: (u32, u32),
    pub(crate) recv_buffer_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            session: SessionConfig::default(),
            handshake_timeout: Duration::from_secs(30),
            terminal_type: "vt320".into(),
            window_size: (80, 24),
            recv_buffer_size: 0x10000,
        }
    }
}

impl ClientConfig {
    pub fn session(&mut self) -> &mut SessionConfig {
        &mut self.session
    }

    pub fn set_handshake_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.handshake_timeout = timeout;
        self
    }

    pub fn set_terminal_type(&mut self, term: impl Into<String>) -> &mut Self {
        self.terminal_type = term.into();
        self
    }

    /// Initial terminal size as `(columns, rows)`.
    pub fn set_window_size(&mut self, cols: u32, rows: u32) -> &mut Self {
        self.window_size = (cols, rows);
        self
    }

    pub fn set_recv_buffer_size(&mut self, size: usize) -> &mut Self {
        self.recv_buffer_size = size;
        self
    }

    pub fn handshake_timeout(&self) -> Duration {
        self.handshake_timeout
    }
}
