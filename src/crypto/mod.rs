//! # AES primitives for wM-Bus payload protection
//!
//! EN 13757 / OMS use AES-128 in three shapes: CBC for TPL security modes
//! 5 and 7, CTR for ELL encrypted frames, and CMAC (NIST SP 800-38B) for
//! AFL authentication and the mode 7 key derivation. ECB is kept for the
//! few vendor dialects that encrypt block-by-block without chaining.
//!
//! All operations take and return plain byte vectors; key material lives in
//! [`AesKey`] which wipes itself on drop.

use aes::cipher::{
    block_padding::NoPadding, BlockDecryptMut, BlockEncryptMut, KeyInit, KeyIvInit, StreamCipher,
};
use aes::Aes128;
use cmac::{Cmac, Mac};
use thiserror::Error;
use zeroize::Zeroize;

use crate::util::hex;

type Aes128CbcEnc = cbc::Encryptor<Aes128>;
type Aes128CbcDec = cbc::Decryptor<Aes128>;
type Aes128EcbEnc = ecb::Encryptor<Aes128>;
type Aes128EcbDec = ecb::Decryptor<Aes128>;
type Aes128Ctr = ctr::Ctr128BE<Aes128>;

pub const AES_BLOCK_SIZE: usize = 16;

/// Errors from the AES layer
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("Invalid key length: expected 16, got {0}")]
    InvalidKeyLength(usize),

    #[error("Invalid data length: must be multiple of 16, got {0}")]
    InvalidDataLength(usize),

    #[error("Invalid key hex: {0}")]
    InvalidKeyHex(String),
}

/// AES-128 key. Zeroed when dropped so meter keys do not linger in freed
/// memory for the lifetime of the process.
#[derive(Clone, PartialEq, Eq)]
pub struct AesKey {
    key: [u8; 16],
}

impl AesKey {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != 16 {
            return Err(CryptoError::InvalidKeyLength(bytes.len()));
        }
        let mut key = [0u8; 16];
        key.copy_from_slice(bytes);
        Ok(Self { key })
    }

    pub fn from_hex(s: &str) -> Result<Self, CryptoError> {
        let bytes = hex::hex2bin(s).map_err(|e| CryptoError::InvalidKeyHex(e.to_string()))?;
        Self::from_bytes(&bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.key
    }
}

impl Drop for AesKey {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

impl std::fmt::Debug for AesKey {
    // Never print key material.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AesKey(****)")
    }
}

fn check_block_multiple(data: &[u8]) -> Result<(), CryptoError> {
    if data.len() % AES_BLOCK_SIZE != 0 {
        return Err(CryptoError::InvalidDataLength(data.len()));
    }
    Ok(())
}

/// AES-128-CBC encrypt, data length must be a block multiple.
pub fn aes_cbc_encrypt(key: &AesKey, iv: &[u8; 16], data: &[u8]) -> Result<Vec<u8>, CryptoError> {
    check_block_multiple(data)?;
    let enc = Aes128CbcEnc::new(key.as_bytes().into(), iv.into());
    Ok(enc.encrypt_padded_vec_mut::<NoPadding>(data))
}

/// AES-128-CBC decrypt, data length must be a block multiple.
pub fn aes_cbc_decrypt(key: &AesKey, iv: &[u8; 16], data: &[u8]) -> Result<Vec<u8>, CryptoError> {
    check_block_multiple(data)?;
    let dec = Aes128CbcDec::new(key.as_bytes().into(), iv.into());
    dec.decrypt_padded_vec_mut::<NoPadding>(data)
        .map_err(|_| CryptoError::InvalidDataLength(data.len()))
}

/// AES-128-ECB encrypt, data length must be a block multiple.
pub fn aes_ecb_encrypt(key: &AesKey, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
    check_block_multiple(data)?;
    let enc = Aes128EcbEnc::new(key.as_bytes().into());
    Ok(enc.encrypt_padded_vec_mut::<NoPadding>(data))
}

/// AES-128-ECB decrypt, data length must be a block multiple.
pub fn aes_ecb_decrypt(key: &AesKey, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
    check_block_multiple(data)?;
    let dec = Aes128EcbDec::new(key.as_bytes().into());
    dec.decrypt_padded_vec_mut::<NoPadding>(data)
        .map_err(|_| CryptoError::InvalidDataLength(data.len()))
}

/// AES-128-CTR keystream application. Symmetric: encrypts and decrypts.
/// Any data length is fine, the final keystream block is truncated.
pub fn aes_ctr_process(key: &AesKey, iv: &[u8; 16], data: &[u8]) -> Vec<u8> {
    let mut cipher = Aes128Ctr::new(key.as_bytes().into(), iv.into());
    let mut out = data.to_vec();
    cipher.apply_keystream(&mut out);
    out
}

/// AES-CMAC per NIST SP 800-38B. Used for AFL MACs and the OMS mode 7
/// ephemeral key derivation.
pub fn aes_cmac(key: &AesKey, message: &[u8]) -> [u8; 16] {
    let mut mac = <Cmac<Aes128> as Mac>::new_from_slice(key.as_bytes())
        .expect("AES-128 CMAC accepts 16 byte keys");
    mac.update(message);
    let out = mac.finalize().into_bytes();
    let mut tag = [0u8; 16];
    tag.copy_from_slice(&out);
    tag
}
