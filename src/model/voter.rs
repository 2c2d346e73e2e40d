use chrono::{DateTime, Utc};
use data_encoding::{BASE64, HEXLOWER};
use hmac::{Hmac, Mac};
use mongodb::bson::DateTime as BsonDateTime;
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::error::{Error, Result};

pub type HmacSha256 = Hmac<Sha256>;

/// Number of random bytes in a voter id; the id is their lowercase hex.
pub const VOTER_ID_BYTES: usize = 10;

/// Largest accepted face image, after base64 decoding.
pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

/// A registered voter's profile as stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Voter {
    pub voter_id: String,
    pub full_name: String,
    /// HMAC-SHA256 of the national identity number, hex encoded.
    pub national_id_hmac: String,
    pub password_hash: String,
    /// Object storage key of the enrollment image.
    pub enrollment_key: String,
    #[serde(default)]
    pub face_verified: bool,
    #[serde(default)]
    pub last_verified_at: Option<BsonDateTime>,
    /// Id of the admin who registered this voter.
    pub registered_by: String,
    pub registered_at: BsonDateTime,
}

impl Voter {
    pub fn profile(&self, has_voted: bool) -> VoterProfile {
        VoterProfile {
            voter_id: self.voter_id.clone(),
            full_name: self.full_name.clone(),
            face_verified: self.face_verified,
            last_verified_at: self.last_verified_at.map(BsonDateTime::to_chrono),
            has_voted,
        }
    }
}

/// Generate a fresh random voter id.
pub fn generate_voter_id() -> String {
    let mut bytes = [0_u8; VOTER_ID_BYTES];
    rand::thread_rng().fill(&mut bytes);
    HEXLOWER.encode(&bytes)
}

/// Keyed hash of a national identity number, so the number itself is never stored.
pub fn national_id_hmac(national_id: &str, secret: &[u8]) -> Result<String> {
    let mut hmac = HmacSha256::new_from_slice(secret)
        .map_err(|e| Error::Internal(format!("Invalid HMAC key: {e}")))?;
    hmac.update(national_id.trim().as_bytes());
    Ok(HEXLOWER.encode(&hmac.finalize().into_bytes()))
}

/// Decode a base64 face image from a request body.
pub fn decode_image(field: &str, image: &str) -> Result<Vec<u8>> {
    let image = image.trim();
    // Accept data URLs as sent by browser cameras.
    let image = match image.split_once(";base64,") {
        Some((prefix, data)) if prefix.starts_with("data:") => data,
        _ => image,
    };
    let bytes = BASE64
        .decode(image.as_bytes())
        .map_err(|e| Error::Validation(format!("{field} is not valid base64: {e}")))?;
    if bytes.is_empty() {
        return Err(Error::Validation(format!("{field} is required")));
    }
    if bytes.len() > MAX_IMAGE_BYTES {
        return Err(Error::Validation(format!(
            "{field} exceeds {MAX_IMAGE_BYTES} bytes"
        )));
    }
    Ok(bytes)
}

/// An admin's request to register a voter.
#[derive(Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoterRegistration {
    pub full_name: String,
    pub national_id: String,
    pub password: String,
    /// Base64-encoded enrollment image.
    pub image: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

/// Returned once a voter has been registered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisteredVoter {
    pub voter_id: String,
    pub full_name: String,
    pub enrollment_key: String,
}

/// Voter login request. The identifier is the voter id or the national id.
#[derive(Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoterLogin {
    pub identifier: String,
    pub password: String,
}

/// What a voter may see about themselves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoterProfile {
    pub voter_id: String,
    pub full_name: String,
    pub face_verified: bool,
    pub last_verified_at: Option<DateTime<Utc>>,
    pub has_voted: bool,
}

/// A voter's ballot submission.
#[derive(Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BallotRequest {
    pub candidate_id: String,
    /// Base64-encoded live face image.
    pub image: String,
}


#[cfg(test)]
pub use examples::EXAMPLE_FACE;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn voter_ids_are_twenty_hex_chars() {
        let id = generate_voter_id();
        assert_eq!(id.len(), 2 * VOTER_ID_BYTES);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_ne!(id, generate_voter_id());
    }

    #[test]
    fn national_id_hmac_is_keyed_and_stable() {
        let a = national_id_hmac("1234-5678-9012", b"secret").unwrap();
        assert_eq!(a, national_id_hmac(" 1234-5678-9012 ", b"secret").unwrap());
        assert_ne!(a, national_id_hmac("1234-5678-9012", b"other").unwrap());
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn images_decode_from_plain_base64_and_data_urls() {
        let encoded = BASE64.encode(EXAMPLE_FACE);
        assert_eq!(decode_image("image", &encoded).unwrap(), EXAMPLE_FACE);
        let url = format!("data:image/jpeg;base64,{encoded}");
        assert_eq!(decode_image("image", &url).unwrap(), EXAMPLE_FACE);
        assert!(matches!(decode_image("image", "!!"), Err(Error::Validation(_))));
        assert!(matches!(decode_image("image", ""), Err(Error::Validation(_))));
    }
}
