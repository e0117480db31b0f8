//! Webhook signature verification for both inbound surfaces.

use anyhow::{anyhow, bail, Context, Result};
use ed25519_dalek::{Signature, Verifier, VerifyingKey, PUBLIC_KEY_LENGTH};
use hmac::{Hmac, Mac};
use sha2::Sha256;

/// GitHub `X-Hub-Signature-256` verification: HMAC-SHA256 over the raw
/// request body, presented as `sha256=<hex>`.
pub(crate) fn verify_github_signature(payload: &[u8], signature: &str, secret: &str) -> Result<()> {
    let Some(digest_hex) = signature.strip_prefix("sha256=") else {
        bail!("github webhook signature must use sha256=<hex> format");
    };
    let signature_bytes = decode_hex(digest_hex)?;
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .context("failed to initialize webhook HMAC verifier")?;
    mac.update(payload);
    mac.verify_slice(&signature_bytes)
        .map_err(|_| anyhow!("webhook signature verification failed"))
}

/// Parses the hex-encoded Ed25519 public key Discord publishes per
/// application.
pub fn parse_discord_public_key(hex_key: &str) -> Result<VerifyingKey> {
    let bytes = decode_hex(hex_key)?;
    let key_bytes: [u8; PUBLIC_KEY_LENGTH] = bytes
        .as_slice()
        .try_into()
        .map_err(|_| anyhow!("discord public key must be {PUBLIC_KEY_LENGTH} bytes"))?;
    VerifyingKey::from_bytes(&key_bytes).context("invalid discord interaction public key")
}

/// Discord interaction verification: Ed25519 over timestamp + raw body.
pub(crate) fn verify_discord_signature(
    public_key: &VerifyingKey,
    timestamp: &str,
    payload: &[u8],
    signature_hex: &str,
) -> Result<()> {
    let signature_bytes = decode_hex(signature_hex)?;
    let signature =
        Signature::from_slice(&signature_bytes).context("malformed interaction signature")?;
    let mut signed = Vec::with_capacity(timestamp.len() + payload.len());
    signed.extend_from_slice(timestamp.as_bytes());
    signed.extend_from_slice(payload);
    public_key
        .verify(&signed, &signature)
        .map_err(|_| anyhow!("interaction signature verification failed"))
}

fn decode_hex(value: &str) -> Result<Vec<u8>> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        bail!("signature digest cannot be empty");
    }
    if trimmed.len() % 2 != 0 {
        bail!("signature digest must have an even number of hex characters");
    }
    let raw = trimmed.as_bytes();
    let mut bytes = Vec::with_capacity(raw.len() / 2);
    for pair in raw.chunks_exact(2) {
        let hex = std::str::from_utf8(pair).context("invalid utf-8 in signature digest")?;
        let byte = u8::from_str_radix(hex, 16)
            .with_context(|| format!("invalid hex byte '{hex}' in signature digest"))?;
        bytes.push(byte);
    }
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Signer, SigningKey};

    fn github_signature(payload: &[u8], secret: &str) -> String {
        let mut mac =
            Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("hmac init");
        mac.update(payload);
        let digest = mac.finalize().into_bytes();
        let hex = digest
            .iter()
            .map(|byte| format!("{byte:02x}"))
            .collect::<String>();
        format!("sha256={hex}")
    }

    #[test]
    fn github_signature_round_trip() {
        let payload = br#"{"action":"opened"}"#;
        let signature = github_signature(payload, "webhook-secret");
        verify_github_signature(payload, &signature, "webhook-secret").expect("valid signature");
        assert!(verify_github_signature(payload, &signature, "other-secret").is_err());
        assert!(verify_github_signature(b"tampered", &signature, "webhook-secret").is_err());
    }

    #[test]
    fn github_signature_requires_the_sha256_prefix() {
        let error = verify_github_signature(b"payload", "md5=abcd", "secret")
            .expect_err("prefix should be rejected");
        assert!(error.to_string().contains("sha256=<hex>"));
    }

    #[test]
    fn decode_hex_rejects_odd_and_invalid_input() {
        assert!(decode_hex("abc").is_err());
        assert!(decode_hex("zz").is_err());
        assert!(decode_hex("").is_err());
        assert_eq!(decode_hex("00ff").expect("valid hex"), vec![0x00, 0xff]);
    }

    #[test]
    fn discord_signature_round_trip() {
        let signing_key = SigningKey::from_bytes(&[7u8; 32]);
        let public_key = signing_key.verifying_key();
        let timestamp = "1700000000";
        let payload = br#"{"type":1}"#;
        let mut signed = timestamp.as_bytes().to_vec();
        signed.extend_from_slice(payload);
        let signature = signing_key.sign(&signed);
        let signature_hex = signature
            .to_bytes()
            .iter()
            .map(|byte| format!("{byte:02x}"))
            .collect::<String>();

        verify_discord_signature(&public_key, timestamp, payload, &signature_hex)
            .expect("valid signature");
        assert!(
            verify_discord_signature(&public_key, "1700000001", payload, &signature_hex).is_err()
        );
        assert!(verify_discord_signature(&public_key, timestamp, b"other", &signature_hex).is_err());
    }

    #[test]
    fn discord_public_key_parsing_checks_length() {
        let signing_key = SigningKey::from_bytes(&[9u8; 32]);
        let hex_key = signing_key
            .verifying_key()
            .to_bytes()
            .iter()
            .map(|byte| format!("{byte:02x}"))
            .collect::<String>();
        let parsed = parse_discord_public_key(&hex_key).expect("valid public key");
        assert_eq!(parsed, signing_key.verifying_key());
        assert!(parse_discord_public_key("aabb").is_err());
    }
}
