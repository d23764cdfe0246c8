//! Link modes and outbound bus content.
//!
//! The radio link modes of EN 13757-4 (plus `mbus` for the wired bus) show
//! up in meter configuration lines and in `send:` commands addressed to a
//! bus device.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LinkModeError {
    #[error("Unknown link mode: {0}")]
    UnknownLinkMode(String),

    #[error("Invalid send bus content: {0}")]
    InvalidSendBusContent(String),
}

/// Radio link modes plus the wired mbus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkMode {
    Mbus,
    S1,
    S2,
    T1,
    T2,
    C1,
    C2,
    N1a,
    N1b,
    N1c,
    N1d,
    N1e,
    N1f,
}

/// Canonical listing order used by [`LinkModeSet::hr`].
pub const ALL_LINK_MODES: [LinkMode; 13] = [
    LinkMode::Mbus,
    LinkMode::S1,
    LinkMode::S2,
    LinkMode::T1,
    LinkMode::T2,
    LinkMode::C1,
    LinkMode::C2,
    LinkMode::N1a,
    LinkMode::N1b,
    LinkMode::N1c,
    LinkMode::N1d,
    LinkMode::N1e,
    LinkMode::N1f,
];

impl LinkMode {
    pub fn name(&self) -> &'static str {
        match self {
            LinkMode::Mbus => "mbus",
            LinkMode::S1 => "s1",
            LinkMode::S2 => "s2",
            LinkMode::T1 => "t1",
            LinkMode::T2 => "t2",
            LinkMode::C1 => "c1",
            LinkMode::C2 => "c2",
            LinkMode::N1a => "n1a",
            LinkMode::N1b => "n1b",
            LinkMode::N1c => "n1c",
            LinkMode::N1d => "n1d",
            LinkMode::N1e => "n1e",
            LinkMode::N1f => "n1f",
        }
    }

    pub fn from_name(s: &str) -> Option<LinkMode> {
        ALL_LINK_MODES.iter().copied().find(|m| m.name() == s)
    }

    fn bit(&self) -> u16 {
        1 << ALL_LINK_MODES.iter().position(|m| m == self).unwrap()
    }
}

/// A set of link modes, e.g. everything a meter may transmit on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkModeSet(u16);

impl LinkModeSet {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parse a comma separated list like `t1,c1`. Fails on any unknown
    /// mode name.
    pub fn parse(s: &str) -> Result<Self, LinkModeError> {
        let mut set = Self::empty();
        for part in s.split(',') {
            let mode = LinkMode::from_name(part)
                .ok_or_else(|| LinkModeError::UnknownLinkMode(part.to_string()))?;
            set.add(mode);
        }
        Ok(set)
    }

    pub fn add(&mut self, mode: LinkMode) {
        self.0 |= mode.bit();
    }

    pub fn has(&self, mode: LinkMode) -> bool {
        self.0 & mode.bit() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Human readable listing in canonical order, `none` when empty.
    pub fn hr(&self) -> String {
        if self.is_empty() {
            return "none".to_string();
        }
        ALL_LINK_MODES
            .iter()
            .filter(|m| self.has(**m))
            .map(|m| m.name())
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Wire formats accepted by `send:` commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TelegramFormat {
    WMBusCField,
    WMBusCiField,
    MBusShortFrame,
    MBusLongFrame,
}

impl TelegramFormat {
    pub fn name(&self) -> &'static str {
        match self {
            TelegramFormat::WMBusCField => "wmbus_c_field",
            TelegramFormat::WMBusCiField => "wmbus_ci_field",
            TelegramFormat::MBusShortFrame => "mbus_short_frame",
            TelegramFormat::MBusLongFrame => "mbus_long_frame",
        }
    }

    pub fn from_name(s: &str) -> Option<TelegramFormat> {
        [
            TelegramFormat::WMBusCField,
            TelegramFormat::WMBusCiField,
            TelegramFormat::MBusShortFrame,
            TelegramFormat::MBusLongFrame,
        ]
        .into_iter()
        .find(|f| f.name() == s)
    }
}

/// Parsed `send:<linkmode>:<format>:<bus>:<hexdata>` command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendBusContent {
    pub link_mode: LinkMode,
    pub format: TelegramFormat,
    pub bus: String,
    pub content: String,
}

impl SendBusContent {
    pub fn parse(s: &str) -> Result<Self, LinkModeError> {
        let bad = || LinkModeError::InvalidSendBusContent(s.to_string());

        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() != 5 || parts[0] != "send" {
            return Err(bad());
        }
        let link_mode = LinkMode::from_name(parts[1]).ok_or_else(bad)?;
        let format = TelegramFormat::from_name(parts[2]).ok_or_else(bad)?;
        let bus = parts[3];
        let content = parts[4];
        if bus.is_empty() {
            return Err(bad());
        }
        let (ok, odd) = crate::util::hex::is_hex_string_strict(content);
        if content.is_empty() || !ok || odd {
            return Err(bad());
        }

        Ok(SendBusContent {
            link_mode,
            format,
            bus: bus.to_string(),
            content: content.to_string(),
        })
    }
}
