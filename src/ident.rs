//! Identification exchange.
//!
//! Before any packet is framed both sides send a line of the form
//! `SSH-<major>.<minor>-<software>`. The server may precede it with other
//! lines, which are skipped.

use std::fmt;

const MAX_LINE_LEN: usize = 1024;

/// The protocol generation used for a connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProtocolVersion {
    V1,
    V2,
}

impl ProtocolVersion {
    /// The `(major, minor)` pair this client announces for the version.
    pub fn announced(self) -> (u8, u8) {
        match self {
            ProtocolVersion::V1 => (1, 5),
            ProtocolVersion::V2 => (2, 0),
        }
    }
}

/// A parsed identification line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identification {
    pub major: u8,
    pub minor: u8,
    pub software: String,
}

impl fmt::Display for Identification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SSH-{}.{}-{}", self.major, self.minor, self.software)
    }
}

impl Identification {
    /// Parse an identification line, with or without its line terminator.
    pub fn parse(line: &[u8]) -> Result<Self, crate::Error> {
        let line = trim_line_end(line);
        let malformed = || {
            crate::Error::protocol(format!(
                "malformed identification line {:?}",
                String::from_utf8_lossy(line)
            ))
        };

        if !line.starts_with(b"SSH-") {
            return Err(malformed());
        }
        let rest = &line[4..];

        let major = match rest.first() {
            Some(c) if c.is_ascii_digit() => c - b'0',
            _ => return Err(malformed()),
        };
        if rest.get(1) != Some(&b'.') {
            return Err(malformed());
        }

        let digits = rest[2..]
            .iter()
            .take(2)
            .take_while(|c| c.is_ascii_digit())
            .count();
        if digits == 0 {
            return Err(malformed());
        }
        let minor = rest[2..2 + digits]
            .iter()
            .fold(0u8, |acc, c| acc * 10 + (c - b'0'));

        let software = match rest[2 + digits..].iter().position(|&c| c == b'-') {
            Some(pos) => String::from_utf8_lossy(&rest[2 + digits + pos + 1..]).into_owned(),
            None => String::new(),
        };

        Ok(Self {
            major,
            minor,
            software,
        })
    }

    /// The protocol this client speaks with a peer announcing this line.
    ///
    /// Servers announcing `1.99` are compatible with both generations and
    /// are spoken to with protocol 1.
    pub fn protocol(&self) -> ProtocolVersion {
        if self.major == 2 {
            ProtocolVersion::V2
        } else {
            ProtocolVersion::V1
        }
    }
}

/// The identification line this client sends, including the newline.
pub fn client_line(version: ProtocolVersion, software: &str) -> Vec<u8> {
    let (major, minor) = version.announced();
    format!("SSH-{}.{}-{}\n", major, minor, software).into_bytes()
}

fn trim_line_end(line: &[u8]) -> &[u8] {
    let mut end = line.len();
    while end > 0 && (line[end - 1] == b'\n' || line[end - 1] == b'\r') {
        end -= 1;
    }
    &line[..end]
}

/// Accumulates inbound bytes until the peer's identification line is
/// complete.
#[derive(Debug, Default)]
pub struct Scanner {
    line: Vec<u8>,
}

impl Scanner {
    pub fn reset(&mut self) {
        self.line.clear();
    }

    /// Consume bytes up to and including the identification line.
    ///
    /// Returns the parsed line once it is complete, together with the bytes
    /// following it, which already belong to the first packet.
    pub fn scan<'a>(
        &mut self,
        mut input: &'a [u8],
    ) -> Result<(Option<Identification>, &'a [u8]), crate::Error> {
        while let Some(pos) = input.iter().position(|&c| c == b'\n') {
            self.push(&input[..=pos])?;
            input = &input[pos + 1..];

            if self.line.starts_with(b"SSH-") {
                let ident = Identification::parse(&self.line);
                self.line.clear();
                return ident.map(|ident| (Some(ident), input));
            }

            tracing::debug!(
                "skipping line before identification: {:?}",
                String::from_utf8_lossy(trim_line_end(&self.line))
            );
            self.line.clear();
        }

        self.push(input)?;
        Ok((None, &input[input.len()..]))
    }

    fn push(&mut self, data: &[u8]) -> Result<(), crate::Error> {
        if self.line.len() + data.len() > MAX_LINE_LEN {
            self.line.clear();
            return Err(crate::Error::protocol(
                "identification line exceeds the length limit",
            ));
        }
        self.line.extend_from_slice(data);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_versions_and_software() {
        let id = Identification::parse(b"SSH-1.5-OpenSSH_1.2.3\r\n").unwrap();
        assert_eq!((id.major, id.minor), (1, 5));
        assert_eq!(id.software, "OpenSSH_1.2.3");
        assert_eq!(id.protocol(), ProtocolVersion::V1);

        let id = Identification::parse(b"SSH-1.99-dropbear\n").unwrap();
        assert_eq!((id.major, id.minor), (1, 99));
        assert_eq!(id.protocol(), ProtocolVersion::V1);

        let id = Identification::parse(b"SSH-2.0-Test").unwrap();
        assert_eq!(id.protocol(), ProtocolVersion::V2);
        assert_eq!(id.to_string(), "SSH-2.0-Test");
    }

    #[test]
    fn rejects_malformed_lines() {
        for line in &[
            &b"SSH-x.5-foo\n"[..],
            b"SSH-1-foo\n",
            b"SSH-1.-foo\n",
            b"SSH-\n",
            b"HELLO\n",
        ] {
            let err = Identification::parse(line).unwrap_err();
            assert_eq!(err.kind(), crate::ErrorKind::Protocol, "{:?}", line);
        }
    }

    #[test]
    fn client_line_announces_version() {
        assert_eq!(
            client_line(ProtocolVersion::V1, "termssh"),
            b"SSH-1.5-termssh\n"
        );
        assert_eq!(client_line(ProtocolVersion::V2, "x"), b"SSH-2.0-x\n");
    }

    #[test]
    fn scanner_skips_banner_lines_and_returns_the_rest() {
        let mut scanner = Scanner::default();

        let (id, rest) = scanner.scan(b"Welcome\r\nSSH-1.").unwrap();
        assert!(id.is_none());
        assert!(rest.is_empty());

        let (id, rest) = scanner.scan(b"5-Test\n\x00\x00\x00\x05").unwrap();
        assert_eq!(id.unwrap().software, "Test");
        assert_eq!(rest, b"\x00\x00\x00\x05");
    }

    #[test]
    fn scanner_bounds_line_length() {
        let mut scanner = Scanner::default();
        let junk = vec![b'a'; MAX_LINE_LEN + 1];
        let err = scanner.scan(&junk).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Protocol);
    }
}
