//! Thin wrappers over `aes`/`cbc`/`cmac` for the primitives NTAG 424 secure
//! messaging needs: AES-ECB-as-single-block (used only to derive IVs),
//! AES-CBC over already-padded buffers, and truncated AES-CMAC. Grounded on
//! `other_examples/f54271e8_elsirion-satshunt__src-ntag424.rs.rs`, which
//! already uses this exact crate trio for an NTAG 424-family CMAC/IV scheme.

use crate::types::KeyBytes;
use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use aes::cipher::{block_padding::NoPadding, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use cmac::{Cmac, Mac};

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;

/// A single AES-128 block encryption, keyed by `key`. Used to derive IVs
/// (`AES_ECB(ses_enc_key, ...)` in spec terms is a single-block ECB
/// operation, not a general ECB mode).
pub fn aes_ecb_encrypt_block(key: &KeyBytes, block: [u8; 16]) -> [u8; 16] {
    let cipher = aes::Aes128::new(GenericArray::from_slice(key.as_bytes()));
    let mut block = *GenericArray::from_slice(&block);
    cipher.encrypt_block(&mut block);
    block.into()
}

pub fn aes_ecb_decrypt_block(key: &KeyBytes, block: [u8; 16]) -> [u8; 16] {
    let cipher = aes::Aes128::new(GenericArray::from_slice(key.as_bytes()));
    let mut block = *GenericArray::from_slice(&block);
    cipher.decrypt_block(&mut block);
    block.into()
}

/// AES-CBC decrypt in place. `buf` must already be a multiple of 16 bytes;
/// no padding is stripped here (callers apply ISO 7816-4 padding rules
/// separately so malformed padding can be reported as `DataLoss`-shaped
/// errors instead of opaque crate errors).
pub fn aes_cbc_decrypt(key: &KeyBytes, iv: [u8; 16], buf: &mut [u8]) {
    let decryptor = Aes128CbcDec::new(
        GenericArray::from_slice(key.as_bytes()),
        GenericArray::from_slice(&iv),
    );
    decryptor
        .decrypt_padded_mut::<NoPadding>(buf)
        .expect("buf is block-aligned by construction");
}

/// AES-CBC encrypt in place. `buf` must already be padded to a multiple of
/// 16 bytes.
pub fn aes_cbc_encrypt(key: &KeyBytes, iv: [u8; 16], buf: &mut [u8]) {
    let encryptor = Aes128CbcEnc::new(
        GenericArray::from_slice(key.as_bytes()),
        GenericArray::from_slice(&iv),
    );
    encryptor
        .encrypt_padded_mut::<NoPadding>(buf, buf.len())
        .expect("buf is block-aligned by construction");
}

/// Full 16-byte AES-CMAC over `data`, keyed by `key`.
pub fn aes_cmac(key: &KeyBytes, data: &[u8]) -> [u8; 16] {
    let mut mac = <Cmac<aes::Aes128> as Mac>::new_from_slice(key.as_bytes())
        .expect("key is always 16 bytes");
    mac.update(data);
    mac.finalize().into_bytes().into()
}

/// `CMACt`: the 8-byte truncation of a 16-byte AES-CMAC, taking the bytes
/// at odd indices `[1,3,5,7,9,11,13,15]` (spec §4.2, §8 property 3).
pub fn cmact(key: &KeyBytes, data: &[u8]) -> [u8; 8] {
    truncate_cmac(&aes_cmac(key, data))
}

pub fn truncate_cmac(full_cmac: &[u8; 16]) -> [u8; 8] {
    [
        full_cmac[1],
        full_cmac[3],
        full_cmac[5],
        full_cmac[7],
        full_cmac[9],
        full_cmac[11],
        full_cmac[13],
        full_cmac[15],
    ]
}

/// Constant-time comparison, in the style of the original's
/// `ConstantTimeCompare` (a volatile XOR-accumulator rather than a crate
/// dependency, since the comparison shape is tiny and fixed-size).
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cmac_truncation_picks_odd_indices() {
        let full: [u8; 16] = core::array::from_fn(|i| i as u8);
        assert_eq!(truncate_cmac(&full), [1, 3, 5, 7, 9, 11, 13, 15]);
    }

    #[test]
    fn constant_time_eq_matches_slice_eq() {
        assert!(constant_time_eq(&[1, 2, 3], &[1, 2, 3]));
        assert!(!constant_time_eq(&[1, 2, 3], &[1, 2, 4]));
        assert!(!constant_time_eq(&[1, 2, 3], &[1, 2]));
    }

    #[test]
    fn ecb_single_block_round_trips() {
        let key = KeyBytes::from_bytes([0x42u8; 16]);
        let block = [0xAAu8; 16];
        let encrypted = aes_ecb_encrypt_block(&key, block);
        let decrypted = aes_ecb_decrypt_block(&key, encrypted);
        assert_eq!(decrypted, block);
    }

    #[test]
    fn cbc_round_trips() {
        let key = KeyBytes::from_bytes([0x11u8; 16]);
        let iv = [0x22u8; 16];
        let mut buf = [0x33u8; 32];
        let plaintext = buf;
        aes_cbc_encrypt(&key, iv, &mut buf);
        aes_cbc_decrypt(&key, iv, &mut buf);
        assert_eq!(buf, plaintext);
    }
}
