//! Webhook checksums: HMAC-SHA256 over `random || body`, hex-encoded.

use ring::hmac;

fn message(random: &[u8], body: &[u8]) -> Vec<u8> {
    let mut message = Vec::with_capacity(random.len() + body.len());
    message.extend_from_slice(random);
    message.extend_from_slice(body);
    message
}

/// Calculate the checksum a backend sends for a request.
///
/// # Returns
///
/// Lowercase hex HMAC-SHA256 keyed with `secret`.
#[must_use]
pub fn calculate_checksum(secret: &str, random: &[u8], body: &[u8]) -> String {
    let key = hmac::Key::new(hmac::HMAC_SHA256, secret.as_bytes());
    let tag = hmac::sign(&key, &message(random, body));
    hex::encode(tag.as_ref())
}

/// Verify the checksum sent with a request.
///
/// The supplied checksum is hex-decoded and the raw tags are compared in
/// constant time, so hex digits are accepted in either case. A checksum that
/// is not valid hex never matches.
#[must_use]
pub fn verify_checksum(secret: &str, random: &[u8], body: &[u8], checksum: &[u8]) -> bool {
    let provided = match hex::decode(checksum) {
        Ok(bytes) => bytes,
        Err(_) => return false,
    };

    let key = hmac::Key::new(hmac::HMAC_SHA256, secret.as_bytes());
    hmac::verify(&key, &message(random, body), &provided).is_ok()
}
