//! `AuthenticateEV2First` key-provider strategies (spec §4.2): `Local`
//! decrypts and derives session keys on-device; `Cloud` delegates both legs
//! to Firebase and retains `auth_id` for later session identification.
//! Grounded on `examples/original_source/maco_firmware/modules/nfc_tag/
//! ntag424/cloud_key_provider.{h,cc}`.

use super::crypto::{aes_cbc_decrypt, aes_cbc_encrypt, aes_cmac};
use crate::error::MacoError;
use crate::firebase::{AuthenticateTagOutcome, CompleteTagAuthOutcome, FirebaseClient, Forward};
use crate::types::{FirebaseId, KeyBytes, SecureSession, TagUid};

/// A source of uniformly random 16-byte values for `RndA` (spec §9 "Random
/// number generator contract").
pub trait RandomSource {
    fn fill(&mut self, buf: &mut [u8]);

    fn random_16(&mut self) -> [u8; 16] {
        let mut buf = [0u8; 16];
        self.fill(&mut buf);
        buf
    }
}

fn rotate_left_one_byte(bytes: [u8; 16]) -> [u8; 16] {
    let mut out = [0u8; 16];
    out[..15].copy_from_slice(&bytes[1..]);
    out[15] = bytes[0];
    out
}

/// `SV1`/`SV2` session-key diversification vectors (NXP AN12196):
/// `prefix(6) || RndA[0:2] || (RndA[2:8] XOR RndB[0:6]) || RndB[6:16] || RndA[8:16]`.
fn session_vector(prefix: [u8; 6], rnd_a: [u8; 16], rnd_b: [u8; 16]) -> [u8; 32] {
    let mut sv = [0u8; 32];
    sv[0..6].copy_from_slice(&prefix);
    sv[6..8].copy_from_slice(&rnd_a[0..2]);
    for i in 0..6 {
        sv[8 + i] = rnd_a[2 + i] ^ rnd_b[i];
    }
    sv[14..24].copy_from_slice(&rnd_b[6..16]);
    sv[24..32].copy_from_slice(&rnd_a[8..16]);
    sv
}

fn derive_session_keys(key: &KeyBytes, rnd_a: [u8; 16], rnd_b: [u8; 16]) -> (KeyBytes, KeyBytes) {
    let sv1 = session_vector([0xA5, 0x5A, 0x00, 0x01, 0x00, 0x80], rnd_a, rnd_b);
    let sv2 = session_vector([0x5A, 0xA5, 0x00, 0x01, 0x00, 0x80], rnd_a, rnd_b);
    let ses_enc_key = KeyBytes::from_bytes(aes_cmac(key, &sv1));
    let ses_mac_key = KeyBytes::from_bytes(aes_cmac(key, &sv2));
    (ses_enc_key, ses_mac_key)
}

/// The key-provider interface the protocol layer drives through the
/// two-leg `AuthenticateEV2First` exchange. Neither leg is assumed to
/// complete synchronously (spec §4.2: "MUST NOT assume the two callbacks
/// complete synchronously").
pub trait KeyProvider {
    /// Part 1->2: given the tag's encrypted 16-byte `RndB` challenge,
    /// returns the 32-byte `E(K, RndA || rot_left(RndB,8))`-shaped payload
    /// to send back as part 2.
    async fn create_ntag_challenge(
        &mut self,
        encrypted_rnd_b: [u8; 16],
    ) -> Result<[u8; 32], MacoError>;

    /// Part 3: given the tag's 32-byte encrypted final response, verifies
    /// it and returns the negotiated session material.
    async fn verify_and_compute_session_keys(
        &mut self,
        encrypted_part3_response: [u8; 32],
    ) -> Result<SecureSession, MacoError>;

    /// Called when authentication aborts for any reason so cloud-side
    /// state (if any) doesn't linger.
    async fn cancel_authentication(&mut self);
}

pub struct LocalKeyProvider<R: RandomSource> {
    key: KeyBytes,
    rng: R,
    pending: Option<(/* rnd_a */ [u8; 16], /* rnd_b */ [u8; 16])>,
}

impl<R: RandomSource> LocalKeyProvider<R> {
    pub fn new(key: KeyBytes, rng: R) -> Self {
        Self {
            key,
            rng,
            pending: None,
        }
    }
}

impl<R: RandomSource> KeyProvider for LocalKeyProvider<R> {
    async fn create_ntag_challenge(
        &mut self,
        encrypted_rnd_b: [u8; 16],
    ) -> Result<[u8; 32], MacoError> {
        let mut rnd_b = encrypted_rnd_b;
        aes_cbc_decrypt(&self.key, [0u8; 16], &mut rnd_b);

        let rnd_a = self.rng.random_16();
        self.pending = Some((rnd_a, rnd_b));

        let mut plaintext = [0u8; 32];
        plaintext[..16].copy_from_slice(&rnd_a);
        plaintext[16..].copy_from_slice(&rotate_left_one_byte(rnd_b));
        aes_cbc_encrypt(&self.key, [0u8; 16], &mut plaintext);
        Ok(plaintext)
    }

    async fn verify_and_compute_session_keys(
        &mut self,
        encrypted_part3_response: [u8; 32],
    ) -> Result<SecureSession, MacoError> {
        let (rnd_a, rnd_b) = self.pending.take().ok_or(MacoError::WrongState)?;

        let mut plaintext = encrypted_part3_response;
        aes_cbc_decrypt(&self.key, [0u8; 16], &mut plaintext);

        // Layout per AN12196: TI(4) || RndA'(16) || PDcap2(6) || PCDcap2(6).
        let transaction_id: [u8; 4] = plaintext[0..4].try_into().unwrap();
        let rnd_a_rotated: [u8; 16] = plaintext[4..20].try_into().unwrap();
        let picc_capabilities: [u8; 6] = plaintext[20..26].try_into().unwrap();

        if rnd_a_rotated != rotate_left_one_byte(rnd_a) {
            return Err(MacoError::Unauthenticated);
        }

        let (ses_enc_key, ses_mac_key) = derive_session_keys(&self.key, rnd_a, rnd_b);
        Ok(SecureSession::new(
            ses_enc_key,
            ses_mac_key,
            transaction_id,
            picc_capabilities,
        ))
    }

    async fn cancel_authentication(&mut self) {
        self.pending = None;
    }
}

/// Delegates both legs of `AuthenticateEV2First` to the cloud. Retains
/// `auth_id` across the two calls and, on success, does *not* clear it -
/// `TagVerifier` reads it back afterward to cache the authorization (mirrors
/// the original's explicit "Don't clear it on success - that's the whole
/// point!").
pub struct CloudKeyProvider<'a, F: Forward> {
    client: &'a FirebaseClient<F>,
    tag_uid: TagUid,
    key_slot: u8,
    auth_id: Option<FirebaseId>,
}

impl<'a, F: Forward> CloudKeyProvider<'a, F> {
    pub fn new(client: &'a FirebaseClient<F>, tag_uid: TagUid, key_slot: u8) -> Result<Self, MacoError> {
        if key_slot > 4 {
            return Err(MacoError::Unspecified {
                message: "key slot out of range".into(),
            });
        }
        Ok(Self {
            client,
            tag_uid,
            key_slot,
            auth_id: None,
        })
    }

    pub fn auth_id(&self) -> Option<&FirebaseId> {
        self.auth_id.as_ref()
    }
}

impl<F: Forward> KeyProvider for CloudKeyProvider<'_, F> {
    async fn create_ntag_challenge(
        &mut self,
        encrypted_rnd_b: [u8; 16],
    ) -> Result<[u8; 32], MacoError> {
        self.client.cancel_authentication(&self.tag_uid).await;
        match self
            .client
            .authenticate_tag(self.tag_uid, self.key_slot, encrypted_rnd_b)
            .await?
        {
            AuthenticateTagOutcome::Challenge { auth_id, cloud_challenge } => {
                self.auth_id = Some(auth_id);
                Ok(cloud_challenge)
            }
        }
    }

    async fn verify_and_compute_session_keys(
        &mut self,
        encrypted_part3_response: [u8; 32],
    ) -> Result<SecureSession, MacoError> {
        let auth_id = self.auth_id.clone().ok_or(MacoError::WrongState)?;
        match self
            .client
            .complete_tag_auth(auth_id, encrypted_part3_response)
            .await?
        {
            CompleteTagAuthOutcome::Rejected { .. } => Err(MacoError::Unauthenticated),
            CompleteTagAuthOutcome::SessionKeys {
                ses_enc_key,
                ses_mac_key,
                transaction_id,
                picc_capabilities,
            } => Ok(SecureSession::new(
                ses_enc_key,
                ses_mac_key,
                transaction_id,
                picc_capabilities,
            )),
        }
    }

    async fn cancel_authentication(&mut self) {
        self.client.cancel_authentication(&self.tag_uid).await;
        self.auth_id = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_futures::block_on;

    struct FixedRng(u8);
    impl RandomSource for FixedRng {
        fn fill(&mut self, buf: &mut [u8]) {
            buf.fill(self.0);
        }
    }

    #[test]
    fn local_round_trip_authenticates_against_matching_key() {
        let key = KeyBytes::from_bytes([0x5Au8; 16]);

        // Simulate the tag side: it generated RndB and encrypted it under
        // the same key.
        let rnd_b = [0x11u8; 16];
        let mut encrypted_rnd_b = rnd_b;
        aes_cbc_encrypt(&key, [0u8; 16], &mut encrypted_rnd_b);

        let mut provider = LocalKeyProvider::new(key.clone(), FixedRng(0x22));
        let part2 = block_on(provider.create_ntag_challenge(encrypted_rnd_b)).unwrap();

        // Simulate the tag verifying part 2 and producing part 3: decrypt
        // what we sent, rotate RndA back, and re-encrypt TI || RndA' || caps.
        let mut decrypted_part2 = part2;
        aes_cbc_decrypt(&key, [0u8; 16], &mut decrypted_part2);
        let rnd_a: [u8; 16] = decrypted_part2[..16].try_into().unwrap();
        let rnd_a_rotated = rotate_left_one_byte(rnd_a);

        let mut part3_plain = [0u8; 32];
        part3_plain[0..4].copy_from_slice(&[0x01, 0x02, 0x03, 0x04]);
        part3_plain[4..20].copy_from_slice(&rnd_a_rotated);
        let mut part3 = part3_plain;
        aes_cbc_encrypt(&key, [0u8; 16], &mut part3);

        let session = block_on(provider.verify_and_compute_session_keys(part3)).unwrap();
        assert_eq!(session.transaction_id, [0x01, 0x02, 0x03, 0x04]);
    }

    #[test]
    fn local_rejects_rotation_mismatch() {
        let key = KeyBytes::from_bytes([0x5Au8; 16]);
        let mut encrypted_rnd_b = [0x11u8; 16];
        aes_cbc_encrypt(&key, [0u8; 16], &mut encrypted_rnd_b);

        let mut provider = LocalKeyProvider::new(key.clone(), FixedRng(0x22));
        let _ = block_on(provider.create_ntag_challenge(encrypted_rnd_b)).unwrap();

        let mut garbage = [0xFFu8; 32];
        aes_cbc_encrypt(&key, [0u8; 16], &mut garbage);
        let result = block_on(provider.verify_and_compute_session_keys(garbage));
        assert!(matches!(result, Err(MacoError::Unauthenticated)));
    }
}
