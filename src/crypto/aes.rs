//! AES-256 payload cipher
//!
//! Ciphertext layout is `base64(iv ‖ ct)` with a 16-byte IV that doubles as
//! the PBKDF2 salt. Writes always use CBC with ISO10126 padding; the other
//! modes and paddings exist only so that legacy payloads can be read.

use aes::Aes256;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use cbc::cipher::block_padding::{
    Iso10126, Iso7816, NoPadding, PadType, Padding as BlockPadding, ZeroPadding,
};
use cbc::cipher::consts::U16;
use cbc::cipher::generic_array::GenericArray;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit, StreamCipher};
use rand::RngCore;
use sha1::Sha1;

use crate::error::PayloadError;

pub const AES_BLOCK_SIZE: usize = 16;
const KEY_SIZE: usize = 32;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;
type Aes256Ofb = ofb::Ofb<Aes256>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CipherMode {
    Cbc,
    Ofb,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Padding {
    Iso10126,
    Iso7816,
    ZeroByte,
    NoPadding,
}

/// PBKDF2-HMAC-SHA1 key stretching
pub fn derive_key(password: &str, salt: &[u8], iterations: u32) -> [u8; KEY_SIZE] {
    let mut key = [0u8; KEY_SIZE];
    pbkdf2::pbkdf2_hmac::<Sha1>(password.as_bytes(), salt, iterations.max(1), &mut key);
    key
}

/// Encrypt with the payload defaults (CBC, ISO10126)
pub fn encrypt(cleartext: &str, password: &str, iterations: u32) -> Result<String, PayloadError> {
    encrypt_with(
        cleartext.as_bytes(),
        password,
        iterations,
        CipherMode::Cbc,
        Padding::Iso10126,
    )
}

/// Decrypt with the payload defaults (CBC, ISO10126)
pub fn decrypt(ciphertext: &str, password: &str, iterations: u32) -> Result<String, PayloadError> {
    decrypt_with(ciphertext, password, iterations, CipherMode::Cbc, Padding::Iso10126)
}

pub fn encrypt_with(
    cleartext: &[u8],
    password: &str,
    iterations: u32,
    mode: CipherMode,
    padding: Padding,
) -> Result<String, PayloadError> {
    let mut iv = [0u8; AES_BLOCK_SIZE];
    rand::thread_rng().fill_bytes(&mut iv);
    let key = derive_key(password, &iv, iterations);

    let ciphertext = match padding {
        Padding::Iso10126 => encrypt_padded::<Iso10126>(mode, &key, &iv, cleartext)?,
        Padding::Iso7816 => encrypt_padded::<Iso7816>(mode, &key, &iv, cleartext)?,
        Padding::ZeroByte => encrypt_padded::<ZeroPadding>(mode, &key, &iv, cleartext)?,
        Padding::NoPadding => encrypt_padded::<NoPadding>(mode, &key, &iv, cleartext)?,
    };

    let mut out = Vec::with_capacity(AES_BLOCK_SIZE + ciphertext.len());
    out.extend_from_slice(&iv);
    out.extend_from_slice(&ciphertext);
    Ok(BASE64.encode(out))
}

pub fn decrypt_with(
    ciphertext: &str,
    password: &str,
    iterations: u32,
    mode: CipherMode,
    padding: Padding,
) -> Result<String, PayloadError> {
    let raw = BASE64
        .decode(ciphertext.trim())
        .map_err(|e| PayloadError::Decryption(format!("invalid base64: {}", e)))?;
    if raw.len() <= AES_BLOCK_SIZE {
        return Err(PayloadError::Decryption("ciphertext too short".into()));
    }
    let (iv, body) = raw.split_at(AES_BLOCK_SIZE);
    let key = derive_key(password, iv, iterations);

    let plain = match padding {
        Padding::Iso10126 => decrypt_padded::<Iso10126>(mode, &key, iv, body)?,
        Padding::Iso7816 => decrypt_padded::<Iso7816>(mode, &key, iv, body)?,
        Padding::ZeroByte => decrypt_padded::<ZeroPadding>(mode, &key, iv, body)?,
        Padding::NoPadding => decrypt_padded::<NoPadding>(mode, &key, iv, body)?,
    };
    String::from_utf8(plain)
        .map_err(|_| PayloadError::Decryption("plaintext is not valid UTF-8".into()))
}

fn encrypt_padded<P: BlockPadding<U16>>(
    mode: CipherMode,
    key: &[u8],
    iv: &[u8],
    cleartext: &[u8],
) -> Result<Vec<u8>, PayloadError> {
    if P::TYPE == PadType::NoPadding && cleartext.len() % AES_BLOCK_SIZE != 0 {
        return Err(PayloadError::InvalidInput(
            "unpadded input is not block aligned".into(),
        ));
    }
    match mode {
        CipherMode::Cbc => Ok(Aes256CbcEnc::new_from_slices(key, iv)
            .map_err(|e| PayloadError::InvalidInput(e.to_string()))?
            .encrypt_padded_vec_mut::<P>(cleartext)),
        CipherMode::Ofb => {
            let mut buf = pad_blocks::<P>(cleartext);
            Aes256Ofb::new_from_slices(key, iv)
                .map_err(|e| PayloadError::InvalidInput(e.to_string()))?
                .apply_keystream(&mut buf);
            Ok(buf)
        }
    }
}

fn decrypt_padded<P: BlockPadding<U16>>(
    mode: CipherMode,
    key: &[u8],
    iv: &[u8],
    body: &[u8],
) -> Result<Vec<u8>, PayloadError> {
    match mode {
        CipherMode::Cbc => {
            if body.len() % AES_BLOCK_SIZE != 0 {
                return Err(PayloadError::Decryption(
                    "ciphertext is not block aligned".into(),
                ));
            }
            Aes256CbcDec::new_from_slices(key, iv)
                .map_err(|e| PayloadError::Decryption(e.to_string()))?
                .decrypt_padded_vec_mut::<P>(body)
                .map_err(|e| PayloadError::Decryption(e.to_string()))
        }
        CipherMode::Ofb => {
            let mut buf = body.to_vec();
            Aes256Ofb::new_from_slices(key, iv)
                .map_err(|e| PayloadError::Decryption(e.to_string()))?
                .apply_keystream(&mut buf);
            unpad_blocks::<P>(buf)
        }
    }
}

/// Block padding for the stream mode, laid out the way CBC pads
fn pad_blocks<P: BlockPadding<U16>>(data: &[u8]) -> Vec<u8> {
    let tail = data.len() % AES_BLOCK_SIZE;
    let mut out = data.to_vec();
    if tail == 0 && P::TYPE != PadType::Reversible {
        return out;
    }
    let split = data.len() - tail;
    let mut block = GenericArray::<u8, U16>::default();
    block[..tail].copy_from_slice(&data[split..]);
    P::pad(&mut block, tail);
    out.truncate(split);
    out.extend_from_slice(&block);
    out
}

fn unpad_blocks<P: BlockPadding<U16>>(data: Vec<u8>) -> Result<Vec<u8>, PayloadError> {
    if P::TYPE == PadType::NoPadding {
        return Ok(data);
    }
    if data.len() % AES_BLOCK_SIZE != 0 {
        return Err(PayloadError::Decryption(
            "ciphertext is not block aligned".into(),
        ));
    }
    let blocks: Vec<GenericArray<u8, U16>> = data
        .chunks_exact(AES_BLOCK_SIZE)
        .map(GenericArray::clone_from_slice)
        .collect();
    P::unpad_blocks(&blocks)
        .map(<[u8]>::to_vec)
        .map_err(|e| PayloadError::Decryption(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_round_trip() {
        let ct = encrypt("{\"guid\":\"abc\"}", "correct horse", 10).unwrap();
        assert_eq!(decrypt(&ct, "correct horse", 10).unwrap(), "{\"guid\":\"abc\"}");
    }

    #[test]
    fn test_iv_is_random() {
        let a = encrypt("same", "pw", 10).unwrap();
        let b = encrypt("same", "pw", 10).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_wrong_password_does_not_yield_cleartext() {
        let ct = encrypt("{\"guid\":\"abc\"}", "right", 10).unwrap();
        match decrypt(&ct, "wrong", 10) {
            Ok(plain) => assert_ne!(plain, "{\"guid\":\"abc\"}"),
            Err(e) => assert!(matches!(e, PayloadError::Decryption(_))),
        }
    }

    #[test]
    fn test_legacy_modes_round_trip() {
        for mode in [CipherMode::Cbc, CipherMode::Ofb] {
            for padding in [Padding::Iso10126, Padding::Iso7816, Padding::ZeroByte] {
                let ct = encrypt_with(b"legacy payload", "pw", 1, mode, padding).unwrap();
                let plain = decrypt_with(&ct, "pw", 1, mode, padding).unwrap();
                assert_eq!(plain, "legacy payload", "{:?}/{:?}", mode, padding);
            }
        }
    }

    #[test]
    fn test_stream_padding_matches_block_layout() {
        let iso = pad_blocks::<Iso7816>(b"abc");
        assert_eq!(iso.len(), AES_BLOCK_SIZE);
        assert_eq!(&iso[..4], b"abc\x80");
        assert!(iso[4..].iter().all(|b| *b == 0));

        // Reversible paddings always add bytes, ambiguous ones never on a boundary
        assert_eq!(pad_blocks::<Iso10126>(&[7u8; 16]).len(), 2 * AES_BLOCK_SIZE);
        assert_eq!(pad_blocks::<ZeroPadding>(&[7u8; 16]).len(), AES_BLOCK_SIZE);
        assert_eq!(unpad_blocks::<Iso7816>(iso).unwrap(), b"abc");
    }

    #[test]
    fn test_unaligned_input_without_padding_rejected() {
        let err = encrypt_with(b"not sixteen", "pw", 1, CipherMode::Cbc, Padding::NoPadding).unwrap_err();
        assert!(matches!(err, PayloadError::InvalidInput(_)));

        let ct = encrypt_with(&[b'a'; 32], "pw", 1, CipherMode::Ofb, Padding::NoPadding).unwrap();
        assert_eq!(decrypt_with(&ct, "pw", 1, CipherMode::Ofb, Padding::NoPadding).unwrap(), "a".repeat(32));
    }

    #[test]
    fn test_truncated_ciphertext_rejected() {
        let err = decrypt(&BASE64.encode([0u8; 8]), "pw", 10).unwrap_err();
        assert!(matches!(err, PayloadError::Decryption(_)));
    }
}
