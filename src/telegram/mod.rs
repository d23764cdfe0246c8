//! # Telegram parsing
//!
//! Takes a whole frame as delivered by a transport and walks the protocol
//! layers: data link (wM-Bus or wired M-Bus long frame), extended link
//! (ELL, optionally AES-CTR encrypted), authentication/fragmentation (AFL)
//! and transport (TPL short/long header, security modes 0/5/7). The
//! addresses found along the way are collected in parse order; the TPL
//! address, when present, is the last and canonical one.

pub mod decrypt;

use log::{debug, warn};
use thiserror::Error;

use crate::address::{Address, ANY_BYTE, ANY_MFCT};
use crate::crypto::AesKey;
use crate::dvparser::{parse_dv, Entries};
use crate::util::crc::crc16_en13757;
use decrypt::{decrypt_tpl, ell_ctr_process, TplSecurity};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TelegramError {
    #[error("Telegram parse error: {0}")]
    ParseError(String),

    #[error("Telegram checksum error: {0}")]
    CrcError(String),

    #[error("Telegram decryption error: {0}")]
    DecryptError(String),
}

/// A parsed telegram: header fields, addresses and (after a full parse)
/// the decrypted, record-split payload.
#[derive(Debug, Clone, Default)]
pub struct Telegram {
    pub frame: Vec<u8>,
    /// Addresses in parse order; the TPL address, if present, is last.
    pub addresses: Vec<Address>,
    /// The CI field that introduced the TPL payload.
    pub tpl_ci: u8,
    pub tpl_acc: u8,
    pub tpl_sts: u8,
    pub security: TplSecurity,
    /// Message counter from an AFL layer, feeds the mode 7 key derivation.
    pub afl_counter: Option<[u8; 4]>,
    /// Truncated AES-CMAC carried by the AFL layer.
    pub afl_mac: Option<Vec<u8>>,
    /// Offset of the TPL CI byte, the start of the authenticated region.
    tpl_start: usize,
    /// True when an encrypted layer was seen. A header-only parse leaves
    /// the payload untouched in that case.
    pub encrypted: bool,
    /// Offset of the first record byte within the frame.
    pub header_size: usize,
    /// One past the last payload byte; excludes the mbus checksum tail.
    payload_end: usize,
    pub entries: Entries,
    /// True when the record walk consumed the whole payload.
    pub complete: bool,
}

impl Telegram {
    /// Parse only the layers needed for routing: addresses and security
    /// info. Never needs a key and never fails on encrypted content.
    pub fn parse_header(frame: &[u8]) -> Result<Telegram, TelegramError> {
        Self::parse_internal(frame, None, true)
    }

    /// Full parse: layers, decryption with `key` when needed, and the
    /// DIF/VIF record walk.
    pub fn parse(frame: &[u8], key: Option<&AesKey>) -> Result<Telegram, TelegramError> {
        Self::parse_internal(frame, key, false)
    }

    /// The identity a meter is matched on.
    pub fn canonical_address(&self) -> Option<&Address> {
        self.addresses.last()
    }

    fn parse_internal(
        frame: &[u8],
        key: Option<&AesKey>,
        header_only: bool,
    ) -> Result<Telegram, TelegramError> {
        let mut t = Telegram { frame: frame.to_vec(), ..Default::default() };

        let (mut pos, mut addr8) = if frame.first() == Some(&0x68) {
            t.parse_mbus_dll(frame)?
        } else {
            t.parse_wmbus_dll(frame)?
        };

        // Walk CI fields until we reach the TPL payload.
        loop {
            let Some(&ci) = frame.get(pos) else {
                return Err(TelegramError::ParseError(
                    "frame ends before any TPL layer".to_string(),
                ));
            };
            pos += 1;

            match ci {
                // ELL short and long.
                0x8C => {
                    if frame.len() < pos + 2 {
                        return Err(TelegramError::ParseError("truncated ELL".to_string()));
                    }
                    pos += 2; // cc, acc
                }
                0x8D => {
                    if frame.len() < pos + 6 {
                        return Err(TelegramError::ParseError("truncated ELL".to_string()));
                    }
                    let cc = frame[pos];
                    let sn = u32::from_le_bytes([
                        frame[pos + 2],
                        frame[pos + 3],
                        frame[pos + 4],
                        frame[pos + 5],
                    ]);
                    pos += 6;
                    let enc = (sn >> 29) & 0x7;

                    let mut rest = frame[pos..].to_vec();
                    if enc != 0 {
                        t.encrypted = true;
                        if header_only {
                            return Ok(t);
                        }
                        let Some(key) = key else {
                            return Err(TelegramError::DecryptError(
                                "ELL encrypted but no key configured".to_string(),
                            ));
                        };
                        let mfct = u16::from_le_bytes([frame[2], frame[3]]);
                        let mut addr6 = [0u8; 6];
                        addr6.copy_from_slice(&frame[4..10]);
                        rest = ell_ctr_process(key, mfct, &addr6, cc, sn, &rest);
                    }
                    if rest.len() < 2 {
                        return Err(TelegramError::ParseError("truncated ELL payload".to_string()));
                    }
                    let crc_read = u16::from_le_bytes([rest[0], rest[1]]);
                    let crc_calc = crc16_en13757(&rest[2..]);
                    if crc_read != crc_calc {
                        return Err(TelegramError::DecryptError(format!(
                            "ELL payload crc mismatch {:04x} != {:04x}, wrong key?",
                            crc_read, crc_calc
                        )));
                    }
                    // Re-parse the decrypted remainder in place of the
                    // frame tail.
                    let mut inner = t;
                    inner.frame.truncate(pos);
                    inner.frame.extend_from_slice(&rest[2..]);
                    inner.payload_end = inner.frame.len();
                    return inner.continue_at(pos, addr8, key, header_only);
                }
                // AFL: length prefixed authentication header.
                0x90 => {
                    let Some(&afl_len) = frame.get(pos) else {
                        return Err(TelegramError::ParseError("truncated AFL".to_string()));
                    };
                    let afl = frame
                        .get(pos + 1..pos + 1 + afl_len as usize)
                        .ok_or_else(|| TelegramError::ParseError("truncated AFL".to_string()))?;
                    t.parse_afl(afl);
                    pos += 1 + afl_len as usize;
                }
                // TPL long header: full address plus acc/sts/cfg.
                0x72 => {
                    t.tpl_start = pos - 1;
                    let h = frame.get(pos..pos + 12).ok_or_else(|| {
                        TelegramError::ParseError("truncated TPL long header".to_string())
                    })?;
                    let a = Address::decode_id_first(&h[..8])
                        .ok_or_else(|| TelegramError::ParseError("bad TPL address".to_string()))?;
                    // The IV wants wire order: manufacturer first.
                    addr8 = [h[4], h[5], h[0], h[1], h[2], h[3], h[6], h[7]];
                    t.addresses.push(a);
                    t.tpl_ci = ci;
                    t.tpl_acc = h[8];
                    t.tpl_sts = h[9];
                    t.security.cfg = u16::from_le_bytes([h[10], h[11]]);
                    pos += 12;
                    pos += t.read_cfg_ext(frame, pos)?;
                    return t.parse_payload(frame, pos, addr8, key, header_only);
                }
                // TPL short header: the DLL address stays canonical.
                0x7A => {
                    t.tpl_start = pos - 1;
                    let h = frame.get(pos..pos + 4).ok_or_else(|| {
                        TelegramError::ParseError("truncated TPL short header".to_string())
                    })?;
                    t.tpl_ci = ci;
                    t.tpl_acc = h[0];
                    t.tpl_sts = h[1];
                    t.security.cfg = u16::from_le_bytes([h[2], h[3]]);
                    pos += 4;
                    pos += t.read_cfg_ext(frame, pos)?;
                    return t.parse_payload(frame, pos, addr8, key, header_only);
                }
                // No TPL header, records follow directly.
                0x78 => {
                    t.tpl_start = pos - 1;
                    t.tpl_ci = ci;
                    return t.parse_payload(frame, pos, addr8, key, header_only);
                }
                _ => {
                    return Err(TelegramError::ParseError(format!(
                        "unsupported CI field {:02x}",
                        ci
                    )));
                }
            }
        }
    }

    /// Restart the CI walk at `pos` after an ELL layer replaced the frame
    /// tail with plaintext.
    fn continue_at(
        mut self,
        pos: usize,
        addr8: [u8; 8],
        key: Option<&AesKey>,
        header_only: bool,
    ) -> Result<Telegram, TelegramError> {
        let frame = std::mem::take(&mut self.frame);
        let mut inner = Self::continue_ci(self, &frame, pos, addr8, key, header_only)?;
        inner.frame = frame;
        Ok(inner)
    }

    fn continue_ci(
        mut t: Telegram,
        frame: &[u8],
        mut pos: usize,
        addr8: [u8; 8],
        key: Option<&AesKey>,
        header_only: bool,
    ) -> Result<Telegram, TelegramError> {
        let Some(&ci) = frame.get(pos) else {
            return Err(TelegramError::ParseError("empty ELL payload".to_string()));
        };
        pos += 1;
        match ci {
            0x72 => {
                let h = frame.get(pos..pos + 12).ok_or_else(|| {
                    TelegramError::ParseError("truncated TPL long header".to_string())
                })?;
                let a = Address::decode_id_first(&h[..8])
                    .ok_or_else(|| TelegramError::ParseError("bad TPL address".to_string()))?;
                let addr8 = [h[4], h[5], h[0], h[1], h[2], h[3], h[6], h[7]];
                t.addresses.push(a);
                t.tpl_ci = ci;
                t.tpl_acc = h[8];
                t.tpl_sts = h[9];
                t.security.cfg = u16::from_le_bytes([h[10], h[11]]);
                pos += 12;
                pos += t.read_cfg_ext(frame, pos)?;
                t.parse_payload(frame, pos, addr8, key, header_only)
            }
            0x7A => {
                let h = frame.get(pos..pos + 4).ok_or_else(|| {
                    TelegramError::ParseError("truncated TPL short header".to_string())
                })?;
                t.tpl_ci = ci;
                t.tpl_acc = h[0];
                t.tpl_sts = h[1];
                t.security.cfg = u16::from_le_bytes([h[2], h[3]]);
                pos += 4;
                pos += t.read_cfg_ext(frame, pos)?;
                t.parse_payload(frame, pos, addr8, key, header_only)
            }
            0x78 => {
                t.tpl_ci = ci;
                t.parse_payload(frame, pos, addr8, key, header_only)
            }
            other => Err(TelegramError::ParseError(format!(
                "unsupported CI field {:02x} after ELL",
                other
            ))),
        }
    }

    /// wM-Bus data link layer: L C M(2) A(6), CI follows at offset 10.
    fn parse_wmbus_dll(&mut self, frame: &[u8]) -> Result<(usize, [u8; 8]), TelegramError> {
        if frame.len() < 11 {
            return Err(TelegramError::ParseError(format!(
                "wmbus frame too short: {} bytes",
                frame.len()
            )));
        }
        let l = frame[0] as usize;
        if l + 1 != frame.len() {
            return Err(TelegramError::ParseError(format!(
                "length field {} does not match frame size {}",
                l,
                frame.len()
            )));
        }
        let a = Address::decode_mfct_first(&frame[2..10])
            .ok_or_else(|| TelegramError::ParseError("bad DLL address".to_string()))?;
        debug!("(telegram) dll address {}", a.str());
        self.addresses.push(a);
        self.payload_end = frame.len();

        let mut addr8 = [0u8; 8];
        addr8.copy_from_slice(&frame[2..10]);
        Ok((10, addr8))
    }

    /// Wired M-Bus long frame: 68 L L 68 C A CI ... CS 16.
    fn parse_mbus_dll(&mut self, frame: &[u8]) -> Result<(usize, [u8; 8]), TelegramError> {
        if frame.len() < 9 {
            return Err(TelegramError::ParseError("mbus frame too short".to_string()));
        }
        let l = frame[1] as usize;
        if frame[2] as usize != l || frame[3] != 0x68 {
            return Err(TelegramError::ParseError("bad mbus frame header".to_string()));
        }
        if frame.len() != l + 6 || *frame.last().unwrap() != 0x16 {
            return Err(TelegramError::ParseError("bad mbus frame length".to_string()));
        }
        let cs = frame[frame.len() - 2];
        let sum = frame[4..4 + l].iter().fold(0u8, |a, &b| a.wrapping_add(b));
        if sum != cs {
            return Err(TelegramError::CrcError(format!(
                "mbus checksum {:02x} != {:02x}",
                cs, sum
            )));
        }

        let primary = frame[5];
        self.addresses.push(Address {
            id: format!("p{}", primary),
            mfct: ANY_MFCT,
            version: ANY_BYTE,
            device_type: ANY_BYTE,
        });
        // The checksum and stop byte never belong to the record walk.
        self.payload_end = frame.len() - 2;
        Ok((6, [0u8; 8]))
    }

    /// Best effort AFL header parse: fragmentation control, message
    /// control, optional message counter and MAC.
    fn parse_afl(&mut self, afl: &[u8]) {
        if afl.len() < 3 {
            return;
        }
        let rest = &afl[3..];
        if rest.len() >= 12 {
            // Counter plus an 8 byte truncated MAC.
            self.afl_counter = Some([rest[0], rest[1], rest[2], rest[3]]);
            self.afl_mac = Some(rest[4..12].to_vec());
        }
        debug!("(telegram) afl layer, {} bytes", afl.len());
    }

    /// Verify the AFL MAC over the authenticated TPL region when the key
    /// material for mode 7 is at hand. Mismatches are reported, not fatal:
    /// plenty of real meters truncate or omit parts of the coverage.
    fn verify_afl_mac(&self, key: &AesKey, addr8: &[u8; 8], plain_payload: &[u8]) {
        let (Some(counter), Some(mac)) = (self.afl_counter, &self.afl_mac) else {
            return;
        };
        let kmac = decrypt::kdf_kmac(key, &counter, addr8);

        let mut message = Vec::new();
        message.extend_from_slice(&counter);
        message.extend_from_slice(
            self.frame.get(self.tpl_start..self.header_size).unwrap_or_default(),
        );
        message.extend_from_slice(plain_payload);

        let tag = crate::crypto::aes_cmac(&kmac, &message);
        if !tag.starts_with(mac) {
            warn!("(telegram) afl mac mismatch, message may be tampered or key coverage differs");
        }
    }

    fn read_cfg_ext(&mut self, frame: &[u8], pos: usize) -> Result<usize, TelegramError> {
        // Security mode 7 carries one configuration extension byte.
        if self.security.mode() == 7 {
            let Some(&ext) = frame.get(pos) else {
                return Err(TelegramError::ParseError("missing cfg extension".to_string()));
            };
            self.security.cfg_ext = ext;
            return Ok(1);
        }
        Ok(0)
    }

    fn parse_payload(
        mut self,
        frame: &[u8],
        pos: usize,
        addr8: [u8; 8],
        key: Option<&AesKey>,
        header_only: bool,
    ) -> Result<Telegram, TelegramError> {
        self.header_size = pos;
        let end = self.payload_end.clamp(pos, frame.len());
        let payload = frame.get(pos..end).unwrap_or_default();

        if self.security.mode() != 0 {
            self.encrypted = true;
        }
        if header_only {
            return Ok(self);
        }

        let plain = decrypt_tpl(
            payload,
            self.security,
            key,
            &addr8,
            self.tpl_acc,
            self.afl_counter,
        )?;

        if self.security.mode() == 7 {
            if let Some(key) = key {
                self.verify_afl_mac(key, &addr8, &plain);
            }
        }

        self.complete = parse_dv(&mut self.entries, &plain, pos);
        if !self.complete {
            debug!("(telegram) record walk stopped early");
        }
        Ok(self)
    }
}
