//! Everything above the transceive boundary specific to NTAG 424 DNA
//! (spec §4.2): `SelectApplication`, `AuthenticateEV2First`, `GetCardUID`.

use super::key_provider::{CloudKeyProvider, KeyProvider, RandomSource};
use super::secure_messaging::{command_cmact, decrypt_response_data, verify_response_cmact};
use crate::error::MacoError;
use crate::firebase::{FirebaseClient, Forward};
use crate::nfc::port::Pn532Port;
use crate::nfc::reader::NfcReader;
use crate::types::{FirebaseId, KeyBytes, SecureSession, TagUid};
use embassy_time::Duration;

const SELECT_AID: [u8; 12] = [
    0x00, 0xA4, 0x04, 0x0C, 0x07, 0xD2, 0x76, 0x00, 0x00, 0x85, 0x01, 0x01,
];
const STATUS_OK: [u8; 2] = [0x91, 0x00];
const STATUS_MORE_DATA: [u8; 2] = [0x91, 0xAF];
const APDU_TIMEOUT: Duration = Duration::from_millis(500);
const GET_CARD_UID: u8 = 0x51;

fn status_word(response: &[u8]) -> Option<[u8; 2]> {
    if response.len() < 2 {
        return None;
    }
    let len = response.len();
    Some([response[len - 2], response[len - 1]])
}

/// Sends the ISO-7816 `SelectFile` APDU for AID `D2 76 00 00 85 01 01`.
/// Fails `Unsupported` on any status other than `9000` (the NFC-layer
/// status; the PN532 framing adds the `91 xx` wrapper the reader already
/// strips when it classifies the exchange - here we read the literal
/// bytes the tag returned, which for `SelectFile` is plain ISO `90 00`).
pub async fn select_application<P: Pn532Port>(reader: &mut NfcReader<P>) -> Result<(), MacoError> {
    let mut response = [0u8; 16];
    let len = reader
        .request_transceive(&SELECT_AID, &mut response, APDU_TIMEOUT)
        .await?;
    match status_word(&response[..len]) {
        Some([0x90, 0x00]) => Ok(()),
        _ => Err(MacoError::Unsupported),
    }
}

/// `AuthenticateEV2First`: a two-leg APDU exchange driven through
/// `key_provider`. The key provider may suspend arbitrarily long between
/// legs (e.g. a cloud round trip); secure-messaging state only exists once
/// this returns `Ok`.
pub async fn authenticate<P: Pn532Port, K: KeyProvider>(
    reader: &mut NfcReader<P>,
    key_number: u8,
    key_provider: &mut K,
) -> Result<SecureSession, MacoError> {
    match authenticate_inner(reader, key_number, key_provider).await {
        Ok(session) => Ok(session),
        Err(e) => {
            key_provider.cancel_authentication().await;
            Err(e)
        }
    }
}

async fn authenticate_inner<P: Pn532Port, K: KeyProvider>(
    reader: &mut NfcReader<P>,
    key_number: u8,
    key_provider: &mut K,
) -> Result<SecureSession, MacoError> {
    let part1 = [0x90, 0x71, 0x00, 0x00, 0x02, key_number, 0x00, 0x00];
    let mut response = [0u8; 32];
    let len = reader
        .request_transceive(&part1, &mut response, APDU_TIMEOUT)
        .await?;
    if len < 18 || status_word(&response[..len]) != Some(STATUS_MORE_DATA) {
        return Err(MacoError::Unauthenticated);
    }
    let encrypted_rnd_b: [u8; 16] = response[..16].try_into().unwrap();

    let part2_payload = key_provider.create_ntag_challenge(encrypted_rnd_b).await?;

    let mut part2 = [0u8; 38];
    part2[..5].copy_from_slice(&[0x90, 0xAF, 0x00, 0x00, 0x20]);
    part2[5..37].copy_from_slice(&part2_payload);
    part2[37] = 0x00;

    let mut response = [0u8; 40];
    let len = reader
        .request_transceive(&part2, &mut response, APDU_TIMEOUT)
        .await?;
    if len < 34 || status_word(&response[..len]) != Some(STATUS_OK) {
        return Err(MacoError::Unauthenticated);
    }
    let encrypted_part3: [u8; 32] = response[..32].try_into().unwrap();

    key_provider
        .verify_and_compute_session_keys(encrypted_part3)
        .await
}

/// Secure-messaging command `51`: reads the real UID. Verifies the response
/// `CMACt`, decrypts with `IV_resp`, strips padding, and increments
/// `CmdCtr`. Overflow at `0xFFFF` kills the session.
pub async fn get_card_uid<P: Pn532Port>(
    reader: &mut NfcReader<P>,
    session: &mut SecureSession,
) -> Result<TagUid, MacoError> {
    let cmact = command_cmact(session, GET_CARD_UID, &[], &[]);
    let mut command = [0u8; 14];
    command[0..5].copy_from_slice(&[0x90, GET_CARD_UID, 0x00, 0x00, 0x08]);
    command[5..13].copy_from_slice(&cmact);
    command[13] = 0x00;

    let mut response = [0u8; 32];
    let len = reader
        .request_transceive(&command, &mut response, APDU_TIMEOUT)
        .await?;
    // ciphertext(16) || CMACt_response(8) || status(2)
    if len != 26 || status_word(&response[..len]) != Some(STATUS_OK) {
        return Err(MacoError::Unauthenticated);
    }
    let mut ciphertext: [u8; 16] = response[0..16].try_into().unwrap();
    let received_cmact: [u8; 8] = response[16..24].try_into().unwrap();

    if !verify_response_cmact(session, 0x00, &ciphertext, &received_cmact) {
        return Err(MacoError::Unauthenticated);
    }

    let plaintext = decrypt_response_data(session, &mut ciphertext)?;
    let real_uid = TagUid::from_slice(plaintext)?;

    if !session.increment_counter() {
        return Err(MacoError::Unspecified {
            message: "command counter overflow".into(),
        });
    }

    Ok(real_uid)
}

/// Drives the reader's terminal-key handshake: `SelectApplication` ->
/// `Authenticate` (local key provider, slot 1) -> `GetCardUID`, then marks
/// the reader authenticated and returns the real UID the caller needs to
/// raise `NfcEvent::TagArrived` with. This is what the reader's
/// `TagPresent` table entry (spec §4.1) describes as happening inline on
/// the NFC worker.
pub async fn authenticate_terminal_key<P: Pn532Port, R: RandomSource>(
    reader: &mut NfcReader<P>,
    terminal_key: KeyBytes,
    rng: R,
) -> Result<TagUid, MacoError> {
    select_application(reader).await?;
    let mut provider = super::key_provider::LocalKeyProvider::new(terminal_key, rng);
    let mut session = authenticate(reader, 1, &mut provider).await?;
    let real_uid = get_card_uid(reader, &mut session).await?;
    reader.mark_authenticated(real_uid)?;
    Ok(real_uid)
}

/// Re-authenticates with a tag's cloud-issued key (`key_slot`) and returns
/// the `FirebaseId` to cache as the tag's current authorization. Shared by
/// `app_state::TagVerifier`'s cloud re-auth leg and
/// `session::start_session::StartSessionAction`.
pub async fn authenticate_cloud_key<P: Pn532Port, F: Forward>(
    reader: &mut NfcReader<P>,
    client: &FirebaseClient<F>,
    tag_uid: TagUid,
    key_slot: u8,
) -> Result<FirebaseId, MacoError> {
    select_application(reader).await?;
    let mut provider = CloudKeyProvider::new(client, tag_uid, key_slot)?;
    authenticate(reader, key_slot, &mut provider).await?;
    provider.auth_id().cloned().ok_or(MacoError::Unauthenticated)
}
