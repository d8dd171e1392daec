//! CMACt, IV derivation, ISO 7816-4 padding, and full-mode encrypt/decrypt
//! for NTAG 424 secure messaging (spec §4.2). Grounded on
//! `examples/original_source/maco_firmware/modules/nfc_tag/ntag424/
//! ntag424_secure_messaging.{h,cc}` for the exact byte layouts.

use super::crypto::{aes_cbc_decrypt, aes_cbc_encrypt, aes_ecb_encrypt_block, cmact, constant_time_eq};
use crate::error::MacoError;
use crate::types::SecureSession;

/// Max CMAC input size: `Cmd(1) + CmdCtr(2) + TI(4) + CmdHeader + Data`,
/// 128 bytes suffices for every command this core issues (spec §9 "Buffer
/// sizing").
pub const CMAC_INPUT_CAPACITY: usize = 128;

const IV_CMD_PREFIX: [u8; 2] = [0xA5, 0x5A];
const IV_RESP_PREFIX: [u8; 2] = [0x5A, 0xA5];

fn derive_iv(session: &SecureSession, prefix: [u8; 2]) -> [u8; 16] {
    let mut input = [0u8; 16];
    input[0..2].copy_from_slice(&prefix);
    input[2..6].copy_from_slice(&session.transaction_id);
    input[6..8].copy_from_slice(&session.command_counter.to_le_bytes());
    // remaining 8 bytes are zero
    aes_ecb_encrypt_block(&session.ses_enc_key, input)
}

/// `IV_cmd = AES_ECB(ses_enc_key, [A5 5A || TI(4) || CmdCtr(2, LE) || zero(8)])`.
pub fn iv_cmd(session: &SecureSession) -> [u8; 16] {
    derive_iv(session, IV_CMD_PREFIX)
}

/// `IV_resp = AES_ECB(ses_enc_key, [5A A5 || TI(4) || CmdCtr(2, LE) || zero(8)])`.
pub fn iv_resp(session: &SecureSession) -> [u8; 16] {
    derive_iv(session, IV_RESP_PREFIX)
}

/// Builds `Cmd || CmdCtr_LE || TI || CmdHeader [|| Data]` into a fixed
/// buffer, returning the used length. `Cmd` is the command or response byte
/// covered by this MAC (e.g. `0x51` for `GetCardUID`, or the response status
/// byte when verifying a response MAC).
pub fn build_cmac_input(
    cmd: u8,
    command_counter: u16,
    transaction_id: [u8; 4],
    cmd_header: &[u8],
    data: &[u8],
    buf: &mut [u8; CMAC_INPUT_CAPACITY],
) -> usize {
    let mut pos = 0;
    buf[pos] = cmd;
    pos += 1;
    buf[pos..pos + 2].copy_from_slice(&command_counter.to_le_bytes());
    pos += 2;
    buf[pos..pos + 4].copy_from_slice(&transaction_id);
    pos += 4;
    buf[pos..pos + cmd_header.len()].copy_from_slice(cmd_header);
    pos += cmd_header.len();
    buf[pos..pos + data.len()].copy_from_slice(data);
    pos += data.len();
    pos
}

/// Command `CMACt`, computed over `Cmd || CmdCtr_LE || TI || CmdHeader [||
/// Data]` using the session MAC key.
pub fn command_cmact(session: &SecureSession, cmd: u8, cmd_header: &[u8], data: &[u8]) -> [u8; 8] {
    let mut buf = [0u8; CMAC_INPUT_CAPACITY];
    let len = build_cmac_input(
        cmd,
        session.command_counter,
        session.transaction_id,
        cmd_header,
        data,
        &mut buf,
    );
    cmact(&session.ses_mac_key, &buf[..len])
}

/// Verifies a response `CMACt` over `Resp(1) || CmdCtr_LE || TI ||
/// ciphertext`, in constant time.
pub fn verify_response_cmact(
    session: &SecureSession,
    resp_code: u8,
    ciphertext: &[u8],
    received_cmact: &[u8; 8],
) -> bool {
    let mut buf = [0u8; CMAC_INPUT_CAPACITY];
    let len = build_cmac_input(
        resp_code,
        session.command_counter,
        session.transaction_id,
        &[],
        ciphertext,
        &mut buf,
    );
    let expected = cmact(&session.ses_mac_key, &buf[..len]);
    constant_time_eq(&expected, received_cmact)
}

/// ISO 7816-4 padding: always at least one byte of padding (`0x80` then
/// zeros up to the next 16-byte multiple). Writes into `out`, returns the
/// padded length.
pub fn apply_padding(plaintext: &[u8], out: &mut [u8]) -> usize {
    let padded_len = (plaintext.len() / 16 + 1) * 16;
    out[..plaintext.len()].copy_from_slice(plaintext);
    out[plaintext.len()] = 0x80;
    for b in &mut out[plaintext.len() + 1..padded_len] {
        *b = 0;
    }
    padded_len
}

/// Strips `0x80` then zeros padding. Malformed padding (no `0x80` marker
/// found, or non-zero bytes after it) is reported as `MalformedResponse`.
pub fn strip_padding(padded: &[u8]) -> Result<&[u8], MacoError> {
    let marker_pos = padded
        .iter()
        .rposition(|&b| b != 0)
        .ok_or(MacoError::MalformedResponse)?;
    if padded[marker_pos] != 0x80 {
        return Err(MacoError::MalformedResponse);
    }
    Ok(&padded[..marker_pos])
}

/// Encrypts `plaintext` with `IV_cmd` after applying 7816-4 padding.
/// `buf` must be at least `plaintext.len() + 16` bytes; returns the
/// ciphertext length.
pub fn encrypt_command_data(session: &SecureSession, plaintext: &[u8], buf: &mut [u8]) -> usize {
    let padded_len = apply_padding(plaintext, buf);
    aes_cbc_encrypt(&session.ses_enc_key, iv_cmd(session), &mut buf[..padded_len]);
    padded_len
}

/// Decrypts a response ciphertext with `IV_resp` and strips padding.
pub fn decrypt_response_data<'a>(
    session: &SecureSession,
    ciphertext: &'a mut [u8],
) -> Result<&'a [u8], MacoError> {
    aes_cbc_decrypt(&session.ses_enc_key, iv_resp(session), ciphertext);
    strip_padding(ciphertext)
}
