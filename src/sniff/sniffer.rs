//! Protocol detection as a pure state transition.
//!
//! The sniffer never touches a socket. The dispatch loop feeds it the bytes
//! buffered so far and acts on the returned [`Decision`].

use std::fmt;

/// Bytes needed before any decision is made.
pub const SNIFF_LEN: usize = 5;

/// Set of transport layers, used both for the layers still to detect and
/// for the layers already installed on a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Layers(u8);

impl Layers {
    pub const NONE: Layers = Layers(0);
    pub const TLS: Layers = Layers(0b01);
    pub const GZIP: Layers = Layers(0b10);

    pub const fn contains(self, other: Layers) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn with(self, other: Layers) -> Layers {
        Layers(self.0 | other.0)
    }

    pub const fn without(self, other: Layers) -> Layers {
        Layers(self.0 & !other.0)
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Layers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.contains(Layers::TLS), self.contains(Layers::GZIP)) {
            (false, false) => f.write_str("none"),
            (true, false) => f.write_str("tls"),
            (false, true) => f.write_str("gzip"),
            (true, true) => f.write_str("tls+gzip"),
        }
    }
}

/// Outermost handler currently installed on a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Nothing installed yet.
    Sniffing,
    TlsTerminated,
    GzipInflated,
    /// Terminal: the HTTP chain owns the stream.
    HttpFramed,
}

/// What the dispatch loop must do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Read more bytes and ask again.
    NeedMoreBytes,
    /// Terminate TLS and sniff the decrypted stream.
    InstallTls,
    /// Inflate the stream and sniff the decompressed bytes.
    InstallGzip,
    /// Hand the stream to the HTTP chain.
    InstallHttp,
    /// Already decided; nothing left to do.
    Done,
}

impl Decision {
    /// Metric label for decisions that install a handler.
    pub fn protocol(self) -> Option<&'static str> {
        match self {
            Decision::InstallTls => Some("tls"),
            Decision::InstallGzip => Some("gzip"),
            Decision::InstallHttp => Some("http"),
            Decision::NeedMoreBytes | Decision::Done => None,
        }
    }
}

/// Sniffing state of one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SniffState {
    stage: Stage,
    /// Layers still eligible for detection.
    detect: Layers,
    /// Layers installed so far, outermost first.
    installed: Layers,
}

impl SniffState {
    pub fn new(detect_tls: bool, detect_gzip: bool) -> Self {
        let mut detect = Layers::NONE;
        if detect_tls {
            detect = detect.with(Layers::TLS);
        }
        if detect_gzip {
            detect = detect.with(Layers::GZIP);
        }
        Self {
            stage: Stage::Sniffing,
            detect,
            installed: Layers::NONE,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn detect_tls(&self) -> bool {
        self.detect.contains(Layers::TLS)
    }

    pub fn detect_gzip(&self) -> bool {
        self.detect.contains(Layers::GZIP)
    }

    pub fn installed(&self) -> Layers {
        self.installed
    }

    pub fn is_decided(&self) -> bool {
        self.stage == Stage::HttpFramed
    }

    /// Compute the next state from the bytes buffered at the current layer.
    ///
    /// `buffered` holds every byte read since the last installed layer; after
    /// an install the caller replays them into the new layer and starts a
    /// fresh buffer.
    pub fn advance(self, buffered: &[u8]) -> (SniffState, Decision) {
        if self.is_decided() {
            return (self, Decision::Done);
        }
        if buffered.len() < SNIFF_LEN {
            return (self, Decision::NeedMoreBytes);
        }
        if self.detect_tls() && is_tls(buffered) {
            let next = SniffState {
                stage: Stage::TlsTerminated,
                detect: self.detect.without(Layers::TLS),
                installed: self.installed.with(Layers::TLS),
            };
            return (next, Decision::InstallTls);
        }
        if self.detect_gzip() && is_gzip(buffered) {
            let next = SniffState {
                stage: Stage::GzipInflated,
                detect: self.detect.without(Layers::GZIP),
                installed: self.installed.with(Layers::GZIP),
            };
            return (next, Decision::InstallGzip);
        }
        let next = SniffState {
            stage: Stage::HttpFramed,
            detect: Layers::NONE,
            installed: self.installed,
        };
        (next, Decision::InstallHttp)
    }
}

/// Whether `buf` starts with a TLS record or an SSLv2-compatible ClientHello.
pub fn is_tls(buf: &[u8]) -> bool {
    if buf.len() < SNIFF_LEN {
        return false;
    }
    // change_cipher_spec, alert, handshake, application_data, heartbeat
    let record = matches!(buf[0], 20..=24)
        && buf[1] == 3
        && u16::from_be_bytes([buf[3], buf[4]]) > 0;
    if record {
        return true;
    }
    // Two-byte SSLv2 header with the high bit set, then CLIENT-HELLO.
    buf[0] & 0x80 != 0 && buf[2] == 1 && matches!(buf[3], 2 | 3)
}

pub fn is_gzip(buf: &[u8]) -> bool {
    buf.len() >= 2 && buf[0] == 0x1f && buf[1] == 0x8b
}
