//! # DIF/VIF record parser
//!
//! Walks the decrypted telegram body and splits it into data records. Each
//! record is keyed by the uppercase hex concatenation of its DIF byte, DIFE
//! chain, VIF byte and VIFE chain, and carries the raw value bytes plus the
//! storage/tariff/subunit context from the DIFE chain.
//!
//! The parser is tolerant by design: it keeps everything parsed so far and
//! reports failure for the remainder, because a single exotic record must
//! not cost the whole telegram.

use std::collections::HashMap;

use chrono::{NaiveDate, NaiveDateTime};
use log::debug;

use crate::units::si::SiUnit;
use crate::units::{si_unit_of, Unit};
use crate::util::hex::bin2hex_upper;
use crate::vif::{
    lookup_primary_vif, lookup_vife_fb, lookup_vife_fd, vif_combinable, vif_combinable_extended,
    VifCombinable, VifInfo, VifRange,
};

/// Idle filler byte, skipped wherever it appears between records.
pub const DV_IDLE_FILLER: u8 = 0x2F;

/// The hex key of one record header: DIF + DIFEs + VIF + VIFEs, uppercase.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DifVifKey(String);

impl DifVifKey {
    pub fn new(s: &str) -> Self {
        Self(s.to_uppercase())
    }

    pub fn from_bytes(b: &[u8]) -> Self {
        Self(bin2hex_upper(b))
    }

    pub fn str(&self) -> &str {
        &self.0
    }

    fn byte(&self, i: usize) -> u8 {
        self.0
            .get(i * 2..i * 2 + 2)
            .and_then(|s| u8::from_str_radix(s, 16).ok())
            .unwrap_or(0)
    }

    pub fn dif(&self) -> u8 {
        self.byte(0)
    }

    pub fn has_difes(&self) -> bool {
        self.dif() & 0x80 != 0
    }

    /// The VIF byte, after the DIFE chain.
    pub fn vif(&self) -> u8 {
        let mut i = 0;
        while self.byte(i) & 0x80 != 0 && (i + 1) * 2 < self.0.len() {
            i += 1;
        }
        self.byte(i + 1)
    }

    pub fn has_vifes(&self) -> bool {
        let mut i = 0;
        while self.byte(i) & 0x80 != 0 && (i + 1) * 2 < self.0.len() {
            i += 1;
        }
        // The byte after the vif exists iff the vif chains on.
        (i + 2) * 2 < self.0.len()
    }
}

impl std::fmt::Display for DifVifKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The DIF function field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MeasurementType {
    Instantaneous,
    Maximum,
    Minimum,
    AtError,
}

impl MeasurementType {
    fn from_dif(dif: u8) -> Self {
        match (dif >> 4) & 0x3 {
            0 => MeasurementType::Instantaneous,
            1 => MeasurementType::Maximum,
            2 => MeasurementType::Minimum,
            _ => MeasurementType::AtError,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            MeasurementType::Instantaneous => "Instantaneous",
            MeasurementType::Maximum => "Maximum",
            MeasurementType::Minimum => "Minimum",
            MeasurementType::AtError => "AtError",
        }
    }

    pub fn from_name(s: &str) -> Option<Self> {
        [
            MeasurementType::Instantaneous,
            MeasurementType::Maximum,
            MeasurementType::Minimum,
            MeasurementType::AtError,
        ]
        .into_iter()
        .find(|m| m.name() == s)
    }
}

/// How the value bytes encode a number, derived from the DIF data field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DataCoding {
    None,
    IntLE(usize),
    Real32,
    Bcd(usize),
    Variable,
    Special,
}

fn data_coding(dif: u8) -> DataCoding {
    match dif & 0x0F {
        0x0 | 0x8 => DataCoding::None,
        0x1 => DataCoding::IntLE(1),
        0x2 => DataCoding::IntLE(2),
        0x3 => DataCoding::IntLE(3),
        0x4 => DataCoding::IntLE(4),
        0x5 => DataCoding::Real32,
        0x6 => DataCoding::IntLE(6),
        0x7 => DataCoding::IntLE(8),
        0x9 => DataCoding::Bcd(1),
        0xA => DataCoding::Bcd(2),
        0xB => DataCoding::Bcd(3),
        0xC => DataCoding::Bcd(4),
        0xD => DataCoding::Variable,
        0xE => DataCoding::Bcd(6),
        _ => DataCoding::Special,
    }
}

/// One parsed data record.
#[derive(Debug, Clone)]
pub struct DVEntry {
    /// Offset of the DIF byte within the original frame.
    pub offset: usize,
    pub key: DifVifKey,
    pub measurement_type: MeasurementType,
    pub vif_range: VifRange,
    pub vif_info: VifInfo,
    pub combinables: Vec<VifCombinable>,
    pub storage_nr: u32,
    pub tariff_nr: u16,
    pub subunit_nr: u16,
    /// Raw value bytes, lowercase hex, ready for the typed extractors.
    pub value: String,
    /// Unit text announced by a 0x7C custom VIF, empty otherwise.
    pub custom_vif: String,
}

impl Default for DVEntry {
    fn default() -> Self {
        Self {
            offset: 0,
            key: DifVifKey::new(""),
            measurement_type: MeasurementType::Instantaneous,
            vif_range: VifRange::None,
            vif_info: VifInfo {
                range: VifRange::None,
                quantity: crate::units::Quantity::Dimensionless,
                unit: Unit::Number,
                scale: 1.0,
            },
            combinables: Vec::new(),
            storage_nr: 0,
            tariff_nr: 0,
            subunit_nr: 0,
            value: String::new(),
            custom_vif: String::new(),
        }
    }
}

impl DVEntry {
    pub fn has_combinable(&self, c: VifCombinable) -> bool {
        self.combinables.contains(&c)
    }

    fn value_bytes(&self) -> Vec<u8> {
        crate::util::hex::hex2bin(&self.value).unwrap_or_default()
    }

    /// Decode the raw integer/BCD/real payload without VIF scaling.
    pub fn raw_value(&self) -> Option<f64> {
        let b = self.value_bytes();
        match data_coding(self.key.dif()) {
            DataCoding::IntLE(n) => {
                if b.len() < n {
                    return None;
                }
                let mut v: i64 = 0;
                for (i, &byte) in b[..n].iter().enumerate() {
                    v |= (byte as i64) << (8 * i);
                }
                // Sign extend two's complement.
                let bits = 8 * n as u32;
                if bits < 64 && v & (1 << (bits - 1)) != 0 {
                    v -= 1 << bits;
                }
                Some(v as f64)
            }
            DataCoding::Real32 => {
                if b.len() < 4 {
                    return None;
                }
                Some(f32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f64)
            }
            DataCoding::Bcd(n) => {
                if b.len() < n {
                    return None;
                }
                decode_bcd_le(&b[..n])
            }
            DataCoding::Variable => {
                // Numeric LVAR forms carry BCD digits.
                decode_bcd_le(&b)
            }
            DataCoding::None | DataCoding::Special => None,
        }
    }

    /// The value scaled into the VIF's display unit.
    pub fn double_value(&self) -> Option<f64> {
        Some(self.raw_value()? * self.vif_info.scale)
    }

    /// The SI unit of [`double_value`](Self::double_value).
    pub fn si_unit(&self) -> SiUnit {
        si_unit_of(self.vif_info.unit)
    }

    /// Decode a type G date (2 bytes) or type F date-time (4 bytes).
    pub fn date_value(&self) -> Option<NaiveDateTime> {
        let b = self.value_bytes();
        match b.len() {
            2 => decode_date_g(b[0], b[1]),
            4 => decode_datetime_f(b[0], b[1], b[2], b[3]),
            _ => None,
        }
    }

    /// The value bytes as text: ASCII when they look like it, hex
    /// otherwise.
    pub fn text_value(&self) -> String {
        if crate::util::status::is_likely_ascii(&self.value) {
            let b = self.value_bytes();
            b.iter()
                .filter(|&&c| c != 0)
                .map(|&c| c as char)
                .collect()
        } else {
            self.value.clone()
        }
    }
}

/// BCD little endian nibble pairs. A 0xF in the most significant nibble
/// flags a negative number over the remaining digits.
fn decode_bcd_le(b: &[u8]) -> Option<f64> {
    if b.is_empty() {
        return None;
    }
    let mut negative = false;
    let mut value: i64 = 0;
    let mut scale: i64 = 1;
    for (i, &byte) in b.iter().enumerate() {
        let lo = byte & 0xF;
        let hi = byte >> 4;
        for (j, nibble) in [lo, hi].into_iter().enumerate() {
            let last = i == b.len() - 1 && j == 1;
            if nibble > 9 {
                if last && nibble == 0xF {
                    negative = true;
                    continue;
                }
                return None;
            }
            value += (nibble as i64) * scale;
            scale *= 10;
        }
    }
    Some(if negative { -(value as f64) } else { value as f64 })
}

/// Type G date: bits 0-4 day, 8-11 month, year split over both bytes.
/// The encoded year 0..127 maps to 2000..2127.
fn decode_date_g(b0: u8, b1: u8) -> Option<NaiveDateTime> {
    let day = (b0 & 0x1F) as u32;
    let month = (b1 & 0x0F) as u32;
    let year = 2000 + (((b0 >> 5) & 0x7) as i32 | ((((b1 >> 4) & 0xF) as i32) << 3));
    NaiveDate::from_ymd_opt(year, month, day).map(|d| d.and_hms_opt(0, 0, 0).unwrap())
}

/// Type F date-time: minute, hour, then a type G date in the upper bytes.
fn decode_datetime_f(b0: u8, b1: u8, b2: u8, b3: u8) -> Option<NaiveDateTime> {
    let minute = (b0 & 0x3F) as u32;
    let hour = (b1 & 0x1F) as u32;
    let date = decode_date_g(b2, b3)?.date();
    date.and_hms_opt(hour, minute, 0)
}

/// Ordered mapping from DV key to entry. Parse order is preserved and
/// duplicate keys are disambiguated with `_2`, `_3`, … suffixes.
#[derive(Debug, Default, Clone)]
pub struct Entries {
    order: Vec<String>,
    map: HashMap<String, DVEntry>,
}

impl Entries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entry, returning the map key actually used.
    pub fn insert(&mut self, entry: DVEntry) -> String {
        let base = entry.key.str().to_string();
        let mut key = base.clone();
        let mut n = 2;
        while self.map.contains_key(&key) {
            key = format!("{}_{}", base, n);
            n += 1;
        }
        self.order.push(key.clone());
        self.map.insert(key.clone(), entry);
        key
    }

    pub fn get(&self, key: &str) -> Option<&DVEntry> {
        self.map.get(&key.to_uppercase())
    }

    /// Entries in parse order.
    pub fn iter(&self) -> impl Iterator<Item = &DVEntry> {
        self.order.iter().filter_map(|k| self.map.get(k))
    }

    /// Map keys in parse order, duplicate suffixes included.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(|k| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

struct Cursor<'a> {
    body: &'a [u8],
    pos: usize,
    offset_base: usize,
}

impl<'a> Cursor<'a> {
    fn peek(&self) -> Option<u8> {
        self.body.get(self.pos).copied()
    }

    fn take(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        Some(b)
    }

    fn take_n(&mut self, n: usize) -> Option<&'a [u8]> {
        if self.pos + n > self.body.len() {
            return None;
        }
        let s = &self.body[self.pos..self.pos + n];
        self.pos += n;
        Some(s)
    }

    fn frame_offset(&self) -> usize {
        self.offset_base + self.pos
    }
}

/// Parse the decrypted telegram body from `body[0]` to its end, filling
/// `entries`. `offset_base` is the offset of `body[0]` in the whole frame,
/// recorded into each entry for diagnostics.
///
/// Returns false when the walk had to stop early (truncated chain, unknown
/// VIF, oversized LVAR); everything parsed up to that point is kept.
pub fn parse_dv(entries: &mut Entries, body: &[u8], offset_base: usize) -> bool {
    let mut c = Cursor { body, pos: 0, offset_base };

    loop {
        // Idle fillers may pad between any two records.
        while c.peek() == Some(DV_IDLE_FILLER) {
            c.take();
        }
        let Some(&_) = c.body.get(c.pos) else {
            return true; // Clean end of body.
        };

        let record_offset = c.frame_offset();
        let mut header = Vec::new();

        let dif = c.take().expect("peeked");
        header.push(dif);

        // Manufacturer specific data (0x0F) and more-records-follow (0x1F)
        // own the rest of the body.
        if dif & 0x0F == 0x0F {
            let rest = c.take_n(c.body.len() - c.pos).unwrap_or_default();
            let mut entry = DVEntry {
                offset: record_offset,
                key: DifVifKey::from_bytes(&header),
                measurement_type: MeasurementType::Instantaneous,
                vif_range: VifRange::ManufacturerSpecific,
                value: crate::util::bin2hex(rest),
                ..Default::default()
            };
            entry.vif_info.range = VifRange::ManufacturerSpecific;
            entries.insert(entry);
            return true;
        }

        let measurement_type = MeasurementType::from_dif(dif);
        let mut storage_nr: u32 = ((dif >> 6) & 1) as u32;
        let mut tariff_nr: u16 = 0;
        let mut subunit_nr: u16 = 0;

        // DIFE chain: four storage bits, two tariff bits and one subunit
        // bit per extension byte, accumulated low to high.
        let mut ext = dif & 0x80 != 0;
        let mut k = 0u32;
        while ext {
            let Some(dife) = c.take() else {
                debug!("(dvparser) truncated dife chain at offset {}", record_offset);
                return false;
            };
            header.push(dife);
            storage_nr |= ((dife & 0x0F) as u32) << (1 + 4 * k);
            tariff_nr |= (((dife >> 4) & 0x3) as u16) << (2 * k);
            subunit_nr |= (((dife >> 6) & 1) as u16) << k;
            ext = dife & 0x80 != 0;
            k += 1;
            if k > 10 {
                debug!("(dvparser) dife chain too long at offset {}", record_offset);
                return false;
            }
        }

        let Some(vif) = c.take() else {
            debug!("(dvparser) missing vif at offset {}", record_offset);
            return false;
        };
        header.push(vif);

        let mut combinables = Vec::new();
        let mut custom_vif_text: Option<String> = None;

        let info: VifInfo = match vif {
            0xFD | 0xFB => {
                let Some(vife) = c.take() else {
                    debug!("(dvparser) truncated vif extension at offset {}", record_offset);
                    return false;
                };
                header.push(vife);
                let looked = if vif == 0xFD {
                    lookup_vife_fd(vife)
                } else {
                    lookup_vife_fb(vife)
                };
                // Unknown extension sub codes keep the record with an
                // unclassified range so the rest of the telegram survives.
                let info = looked.unwrap_or(VifInfo {
                    range: VifRange::None,
                    quantity: crate::units::Quantity::Dimensionless,
                    unit: Unit::Number,
                    scale: 1.0,
                });
                let mut ext = vife & 0x80 != 0;
                if !read_combinables(&mut c, &mut header, &mut combinables, &mut ext) {
                    return false;
                }
                info
            }
            0x7C | 0xFC => {
                // Custom ASCII unit: length prefixed text follows directly.
                let Some(n) = c.take() else {
                    return false;
                };
                header.push(n);
                let Some(text) = c.take_n(n as usize) else {
                    debug!("(dvparser) truncated custom vif at offset {}", record_offset);
                    return false;
                };
                header.extend_from_slice(text);
                custom_vif_text = Some(String::from_utf8_lossy(text).to_string());
                let mut ext = vif & 0x80 != 0;
                if !read_combinables(&mut c, &mut header, &mut combinables, &mut ext) {
                    return false;
                }
                lookup_primary_vif(0x7C).expect("custom vif row exists")
            }
            _ if vif & 0x7F == 0x7F => {
                // Manufacturer specific VIF, trailing VIFEs belong to the
                // manufacturer and are recorded in the key only.
                let mut ext = vif & 0x80 != 0;
                while ext {
                    let Some(vife) = c.take() else {
                        return false;
                    };
                    header.push(vife);
                    ext = vife & 0x80 != 0;
                }
                lookup_primary_vif(0x7F).expect("mfct vif row exists")
            }
            _ => {
                let Some(info) = lookup_primary_vif(vif & 0x7F) else {
                    debug!(
                        "(dvparser) unknown vif {:02x} at offset {}",
                        vif, record_offset
                    );
                    return false;
                };
                let mut ext = vif & 0x80 != 0;
                if !read_combinables(&mut c, &mut header, &mut combinables, &mut ext) {
                    return false;
                }
                info
            }
        };

        // Now the value bytes.
        let value = match data_coding(dif) {
            DataCoding::None => Vec::new(),
            DataCoding::IntLE(n) | DataCoding::Bcd(n) => {
                let Some(v) = c.take_n(n) else {
                    debug!("(dvparser) truncated value at offset {}", record_offset);
                    return false;
                };
                v.to_vec()
            }
            DataCoding::Real32 => {
                let Some(v) = c.take_n(4) else {
                    return false;
                };
                v.to_vec()
            }
            DataCoding::Variable => {
                let Some(lvar) = c.take() else {
                    return false;
                };
                let n = match lvar {
                    0x00..=0xBF => lvar as usize,
                    0xC0..=0xCF => (lvar - 0xC0) as usize,
                    0xD0..=0xDF => (lvar - 0xD0) as usize,
                    0xE0..=0xEF => (lvar - 0xE0) as usize,
                    _ => {
                        debug!("(dvparser) bad lvar {:02x} at offset {}", lvar, record_offset);
                        return false;
                    }
                };
                let Some(v) = c.take_n(n) else {
                    debug!("(dvparser) lvar overflow at offset {}", record_offset);
                    return false;
                };
                v.to_vec()
            }
            DataCoding::Special => Vec::new(),
        };

        let entry = DVEntry {
            offset: record_offset,
            key: DifVifKey::from_bytes(&header),
            measurement_type,
            vif_range: info.range,
            vif_info: info,
            combinables,
            storage_nr,
            tariff_nr,
            subunit_nr,
            value: crate::util::bin2hex(&value),
            custom_vif: custom_vif_text.unwrap_or_default(),
        };
        entries.insert(entry);
    }
}

/// Read combinable VIFEs while the extension bit chains on. A 0x7C code
/// escapes into the extended combinable table for the following byte.
fn read_combinables(
    c: &mut Cursor,
    header: &mut Vec<u8>,
    combinables: &mut Vec<VifCombinable>,
    ext: &mut bool,
) -> bool {
    while *ext {
        let Some(vife) = c.take() else {
            return false;
        };
        header.push(vife);
        *ext = vife & 0x80 != 0;
        if vife & 0x7F == 0x7C {
            let Some(next) = c.take() else {
                return false;
            };
            header.push(next);
            combinables.push(vif_combinable_extended(next));
            *ext = next & 0x80 != 0;
        } else {
            combinables.push(vif_combinable(vife));
        }
    }
    true
}

/// Extract a scaled numeric value for `key`. Returns the frame offset and
/// the value in the VIF's display unit.
pub fn extract_dv_double(entries: &Entries, key: &str) -> Option<(usize, f64)> {
    let e = entries.get(key)?;
    Some((e.offset, e.double_value()?))
}

/// Extract the raw value bytes as lowercase hex.
pub fn extract_dv_hex_string(entries: &Entries, key: &str) -> Option<(usize, String)> {
    let e = entries.get(key)?;
    Some((e.offset, e.value.clone()))
}

/// Extract a type G/F date.
pub fn extract_dv_date(entries: &Entries, key: &str) -> Option<(usize, NaiveDateTime)> {
    let e = entries.get(key)?;
    Some((e.offset, e.date_value()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::hex::hex_to_bytes;

    fn parse(hex: &str) -> (bool, Entries) {
        let mut entries = Entries::new();
        let ok = parse_dv(&mut entries, &hex_to_bytes(hex), 0);
        (ok, entries)
    }

    #[test]
    fn test_basic_records() {
        let (ok, entries) = parse(
            "2F 2F 0B 13 56 34 12 8B 82 00 93 3E 67 45 23 0D FD 10 0A 30 31 32 33 34 35 36 37 38 39 0F 88 2F",
        );
        assert!(ok);

        let (_, v) = extract_dv_double(&entries, "0B13").unwrap();
        assert_eq!(v, 123.456);

        let (_, v) = extract_dv_double(&entries, "8B8200933E").unwrap();
        assert_eq!(v, 234.567);

        let (_, s) = extract_dv_hex_string(&entries, "0DFD10").unwrap();
        assert_eq!(s, "30313233343536373839");
    }

    #[test]
    fn test_dife_context_bits() {
        let (_, entries) = parse("8B 82 00 93 3E 67 45 23");
        let e = entries.get("8B8200933E").unwrap();
        // DIF bit6 clear, first DIFE 0x82 contributes storage bits 2<<1.
        assert_eq!(e.storage_nr, 4);
        assert_eq!(e.tariff_nr, 0);
        assert_eq!(e.subunit_nr, 0);
    }

    #[test]
    fn test_date_type_g() {
        let (ok, entries) = parse("82 04 6C 5F 1C");
        assert!(ok);
        let (_, d) = extract_dv_date(&entries, "82046C").unwrap();
        assert_eq!(d.to_string(), "2010-12-31 00:00:00");

        let (_, entries) = parse("42 6C FE 04");
        let (_, d) = extract_dv_date(&entries, "426C").unwrap();
        assert_eq!(d.to_string(), "2007-04-30 00:00:00");
    }

    #[test]
    fn test_long_telegram() {
        let (ok, entries) = parse(
            "0C1348550000426CE1F14C130000000082046C21298C0413330000008D04931E3A3CFE3300000033000000330000003300000033000000330000003300000033000000330000003300000033000000330000004300000034180000046D0D0B5C2B03FD6C5E150082206C5C290BFD0F0200018C4079678885238310FD3100000082106C01018110FD610002FD66020002FD170000",
        );
        assert!(ok);

        let (_, v) = extract_dv_double(&entries, "0C13").unwrap();
        assert_eq!(v, 5.548);

        let (_, d) = extract_dv_date(&entries, "426C").unwrap();
        assert_eq!(d.to_string(), "2127-01-01 00:00:00");

        let (_, d) = extract_dv_date(&entries, "82106C").unwrap();
        assert_eq!(d.to_string(), "2000-01-01 00:00:00");
    }

    #[test]
    fn test_duplicate_keys_get_suffixes() {
        let (ok, entries) = parse("0B 13 11 00 00 0B 13 22 00 00 0B 13 33 00 00");
        assert!(ok);
        assert_eq!(entries.len(), 3);
        assert_eq!(extract_dv_double(&entries, "0B13").unwrap().1, 0.011);
        assert_eq!(extract_dv_double(&entries, "0B13_2").unwrap().1, 0.022);
        assert_eq!(extract_dv_double(&entries, "0B13_3").unwrap().1, 0.033);
    }

    #[test]
    fn test_negative_bcd() {
        // Top nibble F marks a negative BCD number.
        let (_, entries) = parse("0B 13 45 23 F1");
        let (_, v) = extract_dv_double(&entries, "0B13").unwrap();
        assert_eq!(v, -12.345);
    }

    #[test]
    fn test_negative_int() {
        // 02 = 16 bit two's complement integer, -5 at centi-degree scale.
        let (_, entries) = parse("02 65 FB FF");
        let (_, v) = extract_dv_double(&entries, "0265").unwrap();
        assert_eq!(v, -0.05);
    }

    #[test]
    fn test_truncated_body_keeps_prefix() {
        let (ok, entries) = parse("0B 13 56 34 12 0C");
        assert!(!ok);
        assert_eq!(entries.len(), 1);
        assert!(entries.get("0B13").is_some());
    }

    #[test]
    fn test_unknown_vif_fails() {
        let (ok, entries) = parse("0B 13 56 34 12 02 6F 00 00");
        assert!(!ok);
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_measurement_types() {
        let (_, entries) = parse("1B 13 56 34 12");
        assert_eq!(
            entries.get("1B13").unwrap().measurement_type,
            MeasurementType::Maximum
        );
        let (_, entries) = parse("2B 13 56 34 12");
        assert_eq!(
            entries.get("2B13").unwrap().measurement_type,
            MeasurementType::Minimum
        );
        let (_, entries) = parse("3B 13 56 34 12");
        assert_eq!(
            entries.get("3B13").unwrap().measurement_type,
            MeasurementType::AtError
        );
    }

    #[test]
    fn test_combinable_parsing() {
        // 81 01 90 FC 0C 03: storage 2, volume, extended combinable 0x0C.
        let (ok, entries) = parse("81 01 90 FC 0C 03");
        assert!(ok);
        let e = entries.get("810190FC0C").unwrap();
        assert_eq!(e.storage_nr, 2);
        assert_eq!(e.vif_range, VifRange::Volume);
        assert!(e.has_combinable(VifCombinable::DeltaBetweenImportAndExport));
    }

    #[test]
    fn test_key_accessors() {
        let k = DifVifKey::new("0B2B");
        assert_eq!(k.dif(), 0x0b);
        assert_eq!(k.vif(), 0x2b);
        assert!(!k.has_difes());
        assert!(!k.has_vifes());

        let k = DifVifKey::new("8B8200933E");
        assert_eq!(k.dif(), 0x8b);
        assert_eq!(k.vif(), 0x93);
        assert!(k.has_difes());
        assert!(k.has_vifes());
    }

    #[test]
    fn test_text_extraction() {
        let (_, entries) = parse("0D FD 11 06 31 32 33 34 35 36");
        let e = entries.get("0DFD11").unwrap();
        assert_eq!(e.vif_range, VifRange::Customer);
        assert_eq!(e.text_value(), "123456");
    }

    #[test]
    fn test_mfct_specific_tail() {
        let (ok, entries) = parse("0B 13 56 34 12 0F DE AD BE EF");
        assert!(ok);
        let e = entries.get("0F").unwrap();
        assert_eq!(e.vif_range, VifRange::ManufacturerSpecific);
        assert_eq!(e.value, "deadbeef");
    }
}
