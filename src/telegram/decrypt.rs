//! TPL and ELL payload decryption.
//!
//! Mode 5 is AES-CBC with the IV built from the TPL address and the access
//! number; mode 7 is AES-CBC with a zero IV over a key derived per OMS
//! 7.2.4 with AES-CMAC; ELL frames use AES-CTR with the session number in
//! the IV. A correctly decrypted TPL body always starts with the 2F 2F
//! verification bytes.

use log::{debug, warn};

use crate::crypto::{aes_cbc_decrypt, aes_cbc_encrypt, aes_cmac, aes_ctr_process, AesKey};
use crate::telegram::TelegramError;

/// TPL security word, decoded from the configuration field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TplSecurity {
    pub cfg: u16,
    pub cfg_ext: u8,
}

impl TplSecurity {
    /// Security mode, bits 8..12 of the configuration word.
    pub fn mode(&self) -> u8 {
        ((self.cfg >> 8) & 0x1F) as u8
    }

    /// Number of encrypted 16 byte blocks (mode 5 and 7).
    pub fn num_encrypted_blocks(&self) -> usize {
        ((self.cfg >> 4) & 0xF) as usize
    }
}

/// Mode 5 IV: link/TPL address in wire order followed by the access number
/// repeated over the remaining 8 bytes.
pub fn mode5_iv(addr: &[u8; 8], acc: u8) -> [u8; 16] {
    let mut iv = [acc; 16];
    iv[..8].copy_from_slice(addr);
    iv
}

/// OMS 7.2.4 key derivation: CMAC over a direction constant, the message
/// counter, the meter address and 0x07 padding. `dc` is 0x00 for Kenc and
/// 0x01 for Kmac.
fn kdf(key: &AesKey, dc: u8, counter: &[u8; 4], addr: &[u8; 8]) -> AesKey {
    let mut input = [0u8; 16];
    input[0] = dc;
    input[1..5].copy_from_slice(counter);
    input[5..13].copy_from_slice(addr);
    input[13] = 0x07;
    input[14] = 0x07;
    input[15] = 0x07;
    let derived = aes_cmac(key, &input);
    AesKey::from_bytes(&derived).expect("cmac output is 16 bytes")
}

pub fn kdf_kenc(key: &AesKey, counter: &[u8; 4], addr: &[u8; 8]) -> AesKey {
    kdf(key, 0x00, counter, addr)
}

pub fn kdf_kmac(key: &AesKey, counter: &[u8; 4], addr: &[u8; 8]) -> AesKey {
    kdf(key, 0x01, counter, addr)
}

/// Decrypt the leading encrypted blocks of a TPL payload in place of the
/// ciphertext, leaving any unencrypted tail untouched. Verifies the 2F 2F
/// marker so a wrong key is reported instead of producing garbage records.
pub fn decrypt_tpl(
    payload: &[u8],
    sec: TplSecurity,
    key: Option<&AesKey>,
    addr: &[u8; 8],
    acc: u8,
    afl_counter: Option<[u8; 4]>,
) -> Result<Vec<u8>, TelegramError> {
    match sec.mode() {
        0 => Ok(payload.to_vec()),
        5 | 7 => {
            let Some(key) = key else {
                return Err(TelegramError::DecryptError(
                    "telegram is encrypted but no key is configured".to_string(),
                ));
            };
            let n = sec.num_encrypted_blocks() * 16;
            if n == 0 || n > payload.len() {
                return Err(TelegramError::DecryptError(format!(
                    "bad encrypted block count {} for payload of {} bytes",
                    sec.num_encrypted_blocks(),
                    payload.len()
                )));
            }

            let decrypted = if sec.mode() == 5 {
                let iv = mode5_iv(addr, acc);
                aes_cbc_decrypt(key, &iv, &payload[..n])
            } else {
                // Mode 7: ephemeral key from the AFL message counter (or
                // the access number when no AFL layer is present).
                let counter = afl_counter.unwrap_or([acc, 0, 0, 0]);
                let kenc = kdf_kenc(key, &counter, addr);
                aes_cbc_decrypt(&kenc, &[0u8; 16], &payload[..n])
            }
            .map_err(|e| TelegramError::DecryptError(e.to_string()))?;

            if decrypted.len() < 2 || decrypted[0] != 0x2F || decrypted[1] != 0x2F {
                warn!("(telegram) decryption failed, wrong key?");
                return Err(TelegramError::DecryptError(
                    "decrypted content lacks the 2F 2F verification bytes, wrong key?".to_string(),
                ));
            }

            let mut out = decrypted;
            out.extend_from_slice(&payload[n..]);
            Ok(out)
        }
        m => Err(TelegramError::DecryptError(format!(
            "unsupported TPL security mode {}",
            m
        ))),
    }
}

/// Encrypt a TPL payload for mode 5, used when building frames for tests
/// and for the send path.
pub fn encrypt_tpl_mode5(
    payload: &[u8],
    key: &AesKey,
    addr: &[u8; 8],
    acc: u8,
) -> Result<Vec<u8>, TelegramError> {
    let iv = mode5_iv(addr, acc);
    aes_cbc_encrypt(key, &iv, payload).map_err(|e| TelegramError::DecryptError(e.to_string()))
}

/// ELL AES-CTR IV: manufacturer, address, CC, SN, frame number and block
/// counter. Encrypt and decrypt are the same keystream operation.
pub fn ell_ctr_process(
    key: &AesKey,
    mfct: u16,
    addr6: &[u8; 6],
    cc: u8,
    sn: u32,
    data: &[u8],
) -> Vec<u8> {
    let mut iv = [0u8; 16];
    iv[0..2].copy_from_slice(&mfct.to_le_bytes());
    iv[2..8].copy_from_slice(addr6);
    iv[8] = cc;
    iv[9..13].copy_from_slice(&sn.to_le_bytes());
    // Frame number and block counter start at zero for single frames.
    debug!("(telegram) ell ctr sn={:08x}", sn);
    aes_ctr_process(key, &iv, data)
}
