//! # Addresses and address expressions
//!
//! A meter telegram carries one address per protocol layer; the transport
//! layer address, when present, is the canonical identity. Users select
//! meters with comma separated address expressions like `12345678`,
//! `12*.M=PII.V=01`, `!22222222` or `p0` for mbus primary stations.
//!
//! Matching runs over all addresses of a telegram and all expressions of a
//! meter: any positive hit accepts, any filter-out hit vetoes the whole
//! telegram.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

use crate::util::hex::hex2bin;

/// Wildcard markers for unspecified manufacturer/version/type.
pub const ANY_MFCT: u16 = 0xffff;
pub const ANY_BYTE: u8 = 0xff;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid address expression: {0}")]
pub struct AddressParseError(pub String);

/// A concrete identity extracted from a telegram. Immutable once parsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    /// 8 lowercase hex digits in canonical (non-reversed) order, or
    /// `p0`..`p250` for an mbus primary station.
    pub id: String,
    pub mfct: u16,
    pub version: u8,
    pub device_type: u8,
}

impl Address {
    pub fn new(id: &str, mfct: u16, version: u8, device_type: u8) -> Self {
        Self { id: id.to_string(), mfct, version, device_type }
    }

    /// Decode the wM-Bus DLL layout: mfct first, then the id little endian.
    pub fn decode_mfct_first(b: &[u8]) -> Option<Self> {
        if b.len() < 8 {
            return None;
        }
        Some(Self {
            mfct: u16::from_le_bytes([b[0], b[1]]),
            id: format!("{:02x}{:02x}{:02x}{:02x}", b[5], b[4], b[3], b[2]),
            version: b[6],
            device_type: b[7],
        })
    }

    /// Decode the TPL long header layout: id little endian first, then mfct.
    pub fn decode_id_first(b: &[u8]) -> Option<Self> {
        if b.len() < 8 {
            return None;
        }
        Some(Self {
            id: format!("{:02x}{:02x}{:02x}{:02x}", b[3], b[2], b[1], b[0]),
            mfct: u16::from_le_bytes([b[4], b[5]]),
            version: b[6],
            device_type: b[7],
        })
    }

    pub fn str(&self) -> String {
        let mut s = self.id.clone();
        if self.mfct != ANY_MFCT {
            s.push_str(&format!(".M={}", manufacturer_flag(self.mfct)));
        }
        if self.version != ANY_BYTE {
            s.push_str(&format!(".V={:02x}", self.version));
        }
        if self.device_type != ANY_BYTE {
            s.push_str(&format!(".T={:02x}", self.device_type));
        }
        s
    }

    pub fn concat(addresses: &[Address]) -> String {
        addresses.iter().map(|a| a.str()).collect::<Vec<_>>().join(",")
    }
}

/// How much of a telegram's address is pinned when a template instantiates
/// a concrete meter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IdentityMode {
    Id,
    IdMfct,
    Full,
    None,
    Invalid,
}

impl IdentityMode {
    pub fn name(&self) -> &'static str {
        match self {
            IdentityMode::Id => "id",
            IdentityMode::IdMfct => "id-mfct",
            IdentityMode::Full => "full",
            IdentityMode::None => "none",
            IdentityMode::Invalid => "invalid",
        }
    }

    pub fn from_name(s: &str) -> IdentityMode {
        match s {
            "id" => IdentityMode::Id,
            "id-mfct" => IdentityMode::IdMfct,
            "full" => IdentityMode::Full,
            "none" => IdentityMode::None,
            _ => IdentityMode::Invalid,
        }
    }
}

/// A pattern matching zero or more addresses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressExpression {
    pub id: String,
    pub has_wildcard: bool,
    pub mbus_primary: bool,
    pub mfct: u16,
    pub version: u8,
    pub device_type: u8,
    /// Leading `!`: a match vetoes the telegram instead of accepting it.
    pub filter_out: bool,
    /// Identity expressions appended on template instantiation: a match is
    /// necessary but does not by itself accept the telegram.
    pub required: bool,
}

impl Default for AddressExpression {
    fn default() -> Self {
        Self {
            id: String::new(),
            has_wildcard: false,
            mbus_primary: false,
            mfct: ANY_MFCT,
            version: ANY_BYTE,
            device_type: ANY_BYTE,
            filter_out: false,
            required: false,
        }
    }
}

impl FromStr for AddressExpression {
    type Err = AddressParseError;

    /// Grammar: `[!]BODY[.M=FLAG][.V=HH][.T=HH]` where BODY is an 8 digit
    /// hex id, a prefix with a trailing `*`, a 16 digit secondary address,
    /// or `p0`..`p250`. The suffixes may come in any order.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || AddressParseError(s.to_string());

        let mut e = AddressExpression::default();
        let mut rest = s;

        if rest.is_empty() {
            return Err(bad());
        }
        if let Some(stripped) = rest.strip_prefix('!') {
            e.filter_out = true;
            rest = stripped;
            // Double negation is not allowed.
            if rest.starts_with('!') {
                return Err(bad());
            }
        }
        if rest.is_empty() {
            return Err(bad());
        }

        let mut parts = rest.split('.');
        let body = parts.next().ok_or_else(bad)?;
        e.id = body.to_string();

        match valid_match_expression(body) {
            Some(wildcard) => e.has_wildcard = wildcard,
            None => {
                // Not a long id: accept p0..p250 for mbus primaries.
                let digits = body.strip_prefix('p').ok_or_else(bad)?;
                if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(bad());
                }
                let v: u32 = digits.parse().map_err(|_| bad())?;
                if v > 250 {
                    return Err(bad());
                }
                e.mbus_primary = true;
            }
        }

        let suffixes: Vec<&str> = parts.collect();

        if suffixes.is_empty() && e.id.len() == 16 {
            // Secondary libmbus style address: IIIIIIIIMMMMVVTT.
            let mfct_hex = &e.id[8..12];
            let version_hex = &e.id[12..14];
            let type_hex = &e.id[14..16];

            let m = hex2bin(mfct_hex).map_err(|_| bad())?;
            e.mfct = u16::from_le_bytes([m[0], m[1]]);
            e.version = hex2bin(version_hex).map_err(|_| bad())?[0];
            e.device_type = hex2bin(type_hex).map_err(|_| bad())?[0];
            e.id.truncate(8);
            return Ok(e);
        }

        for part in suffixes {
            match part.len() {
                4 => {
                    // V=xy or T=xy
                    if part.as_bytes()[1] != b'=' {
                        return Err(bad());
                    }
                    let data = hex2bin(&part[2..]).map_err(|_| bad())?;
                    match part.as_bytes()[0] {
                        b'V' => e.version = data[0],
                        b'T' => e.device_type = data[0],
                        _ => return Err(bad()),
                    }
                }
                5 => {
                    // M=ABC three letter manufacturer flag
                    if !part.starts_with("M=") {
                        return Err(bad());
                    }
                    e.mfct = flag_to_manufacturer(&part[2..]).ok_or_else(bad)?;
                }
                6 => {
                    // M=xyzw explicit little endian hex manufacturer
                    if !part.starts_with("M=") {
                        return Err(bad());
                    }
                    let data = hex2bin(&part[2..]).map_err(|_| bad())?;
                    e.mfct = u16::from_le_bytes([data[0], data[1]]);
                }
                _ => return Err(bad()),
            }
        }

        Ok(e)
    }
}

impl AddressExpression {
    /// An expression matching exactly one concrete address.
    pub fn from_address(a: &Address) -> Self {
        Self {
            id: a.id.clone(),
            mfct: a.mfct,
            version: a.version,
            device_type: a.device_type,
            ..Default::default()
        }
    }

    /// Does this expression match the given identity quadruple? The
    /// filter-out flag does not change the test itself, only how a hit is
    /// interpreted by the sequence evaluation.
    pub fn matches(&self, id: &str, mfct: u16, version: u8, device_type: u8) -> bool {
        if self.mfct != ANY_MFCT && self.mfct != mfct {
            return false;
        }
        if self.version != ANY_BYTE && self.version != version {
            return false;
        }
        if self.device_type != ANY_BYTE && self.device_type != device_type {
            return false;
        }
        does_id_match_expression(id, &self.id)
    }

    /// Narrow this expression to the identity of `a` per the mode.
    pub fn trim_to_identity(&mut self, mode: IdentityMode, a: &Address) {
        match mode {
            IdentityMode::Full => {
                self.id = a.id.clone();
                self.mfct = a.mfct;
                self.version = a.version;
                self.device_type = a.device_type;
                self.required = true;
            }
            IdentityMode::IdMfct => {
                self.id = a.id.clone();
                self.mfct = a.mfct;
                self.version = ANY_BYTE;
                self.device_type = ANY_BYTE;
                self.required = true;
            }
            IdentityMode::Id => {
                self.id = a.id.clone();
                self.mfct = ANY_MFCT;
                self.version = ANY_BYTE;
                self.device_type = ANY_BYTE;
                self.required = true;
            }
            IdentityMode::None | IdentityMode::Invalid => {}
        }
    }

    /// Compute the identity expression for the canonical (last) address and
    /// append it to `expressions` unless it is already present. Returns the
    /// identity expression, or None for IdentityMode::None.
    pub fn append_identity(
        mode: IdentityMode,
        addresses: &[Address],
        expressions: &mut Vec<AddressExpression>,
    ) -> Option<AddressExpression> {
        if mode == IdentityMode::None || mode == IdentityMode::Invalid {
            return None;
        }
        let last = addresses.last()?;

        let mut identity = AddressExpression::default();
        identity.trim_to_identity(mode, last);

        if !expressions.contains(&identity) {
            expressions.push(identity.clone());
        }
        Some(identity)
    }

    pub fn str(&self) -> String {
        let mut s = String::new();
        if self.filter_out {
            s.push('!');
        }
        if self.required {
            s.push('R');
        }
        s.push_str(&self.id);
        if self.mfct != ANY_MFCT {
            s.push_str(&format!(".M={}", manufacturer_flag(self.mfct)));
        }
        if self.version != ANY_BYTE {
            s.push_str(&format!(".V={:02x}", self.version));
        }
        if self.device_type != ANY_BYTE {
            s.push_str(&format!(".T={:02x}", self.device_type));
        }
        s
    }

    pub fn concat(expressions: &[AddressExpression]) -> String {
        expressions.iter().map(|e| e.str()).collect::<Vec<_>>().join(",")
    }
}

/// Check a match expression body (no `!`, no suffixes). Returns
/// `Some(has_wildcard)` when valid, i.e. 8 hex digits, up to 7 digits plus
/// a trailing `*`, or a 16 digit secondary address.
fn valid_match_expression(body: &str) -> Option<bool> {
    if body.is_empty() {
        return None;
    }
    let digits = body.bytes().take_while(|b| b.is_ascii_hexdigit()).count();
    let rest = &body[digits..];

    if rest.is_empty() && digits == 16 {
        // Secondary libmbus address, no wildcard possible.
        return Some(false);
    }
    if rest == "*" {
        // Wildcard replaces one or more trailing digits; a full 8 digit id
        // with a star makes no sense.
        if digits <= 7 {
            return Some(true);
        }
        return None;
    }
    if rest.is_empty() && digits == 8 {
        return Some(false);
    }
    None
}

/// Match an id against an expression body, honoring one trailing `*`.
fn does_id_match_expression(id: &str, expr: &str) -> bool {
    if id.is_empty() {
        return false;
    }
    let (prefix, wildcard) = match expr.strip_suffix('*') {
        Some(p) => (p, true),
        None => (expr, false),
    };
    if wildcard {
        id.starts_with(prefix)
    } else {
        id == prefix
    }
}

/// Split a comma separated sequence, mapping the `ANYID` alias to `*`.
fn split_sequence(s: &str) -> Vec<String> {
    s.split(',')
        .map(|p| {
            let t = p.trim();
            if t == "ANYID" {
                "*".to_string()
            } else {
                t.to_string()
            }
        })
        .collect()
}

/// True when every comma separated expression in `s` parses.
pub fn is_valid_sequence_of_address_expressions(s: &str) -> bool {
    split_sequence(s).iter().all(|p| p.parse::<AddressExpression>().is_ok())
}

/// Parse a comma separated sequence, dropping invalid entries.
pub fn split_address_expressions(s: &str) -> Vec<AddressExpression> {
    split_sequence(s)
        .iter()
        .filter_map(|p| p.parse::<AddressExpression>().ok())
        .collect()
}

/// Outcome of matching a telegram's addresses against an expression list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TelegramMatch {
    pub matched: bool,
    /// True when the accepting hit relied on a wildcard expression.
    pub used_wildcard: bool,
}

/// Evaluate a full expression sequence against every address of a telegram.
///
/// Every address is walked even after an accept, so a later filter-out hit
/// on any address still vetoes the telegram as a whole. A required
/// expression must be satisfied by some address or the telegram is
/// rejected.
pub fn does_telegram_match_expressions(
    addresses: &[Address],
    expressions: &[AddressExpression],
) -> TelegramMatch {
    let mut result = TelegramMatch::default();
    let mut filtered_out = false;
    let mut required_found = false;
    let mut required_failed = true;

    for a in addresses {
        let mut found_match = false;
        let mut found_negative_match = false;
        let mut exact_match = false;

        for e in expressions {
            if e.required {
                required_found = true;
            }
            let m = e.matches(&a.id, a.mfct, a.version, a.device_type);
            if !m {
                continue;
            }
            if e.filter_out {
                found_negative_match = true;
            } else if e.required {
                required_failed = false;
            } else {
                found_match = true;
                if !e.has_wildcard {
                    exact_match = true;
                }
            }
        }

        if found_negative_match {
            filtered_out = true;
        } else if found_match {
            result.matched = true;
            result.used_wildcard = !exact_match;
        }
    }

    if filtered_out {
        result.matched = false;
    }
    if required_found && required_failed {
        result.matched = false;
    }
    result
}

/// Pack three uppercase letters into the 15 bit manufacturer triplet:
/// bits 14..10, 9..5, 4..0 hold `c-64` for each letter.
pub fn flag_to_manufacturer(flag: &str) -> Option<u16> {
    let b = flag.as_bytes();
    if b.len() != 3 {
        return None;
    }
    if !b.iter().all(|c| (b'A'..=b'Z').contains(c)) {
        return None;
    }
    Some(
        (((b[0] - 64) as u16) << 10) | (((b[1] - 64) as u16) << 5) | ((b[2] - 64) as u16),
    )
}

/// Unpack the manufacturer triplet into its three letter flag. Values with
/// out-of-range letter codes render as whatever falls out of the packing
/// (`0xffff` gives `___`), which is intentional for display.
pub fn manufacturer_flag(mfct: u16) -> String {
    let a = ((mfct / 1024) % 32) as u8 + 64;
    let b = ((mfct / 32) % 32) as u8 + 64;
    let c = (mfct % 32) as u8 + 64;
    String::from_utf8_lossy(&[a, b, c]).to_string()
}
