use hmac::Hmac;
use hmac::Mac;
use sha2::Sha256;

use crate::utils::time::unix_now_secs;
use crate::BillingConfig;
use crate::BillingError;
use crate::Result;

type HmacSha256 = Hmac<Sha256>;

/// Validates webhook delivery signatures.
///
/// The signature header has the form `t=<unix seconds>,v1=<hex hmac>`, with
/// the MAC computed over `<t>.<raw body>`. Several `v1` entries may appear
/// while the provider rotates secrets; any one matching admits the delivery.
/// Verification fails closed: with no secret configured, nothing passes.
#[derive(Debug, Clone)]
pub struct WebhookVerifier {
    secret: String,
    tolerance_secs: u64,
}

impl WebhookVerifier {
    pub fn new(
        secret: impl Into<String>,
        tolerance_secs: u64,
    ) -> Self {
        WebhookVerifier {
            secret: secret.into(),
            tolerance_secs,
        }
    }

    pub fn from_config(config: &BillingConfig) -> Self {
        Self::new(&config.webhook_secret, config.signature_tolerance_secs)
    }

    /// Verifies one delivery against the current clock.
    pub fn verify(
        &self,
        payload: &[u8],
        header: &str,
    ) -> Result<()> {
        self.verify_at(payload, header, unix_now_secs())
    }

    pub(crate) fn verify_at(
        &self,
        payload: &[u8],
        header: &str,
        now_secs: u64,
    ) -> Result<()> {
        if self.secret.is_empty() {
            return Err(BillingError::SignatureInvalid("no webhook secret configured").into());
        }

        let mut timestamp_raw: Option<&str> = None;
        let mut candidates: Vec<&str> = Vec::new();
        for part in header.split(',') {
            match part.trim().split_once('=') {
                Some(("t", value)) => timestamp_raw = Some(value),
                Some(("v1", value)) => candidates.push(value),
                _ => {}
            }
        }
        let timestamp_raw =
            timestamp_raw.ok_or(BillingError::SignatureInvalid("missing timestamp"))?;
        if candidates.is_empty() {
            return Err(BillingError::SignatureInvalid("missing v1 signature").into());
        }

        let timestamp: u64 = timestamp_raw
            .parse()
            .map_err(|_| BillingError::SignatureInvalid("unparseable timestamp"))?;
        // tolerance 0 disables the freshness check
        if self.tolerance_secs > 0 && now_secs.abs_diff(timestamp) > self.tolerance_secs {
            return Err(BillingError::SignatureInvalid("timestamp outside tolerance").into());
        }

        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|_| BillingError::SignatureInvalid("secret unusable as hmac key"))?;
        mac.update(timestamp_raw.as_bytes());
        mac.update(b".");
        mac.update(payload);

        for candidate in candidates {
            if let Ok(expected) = hex::decode(candidate) {
                // verify_slice compares in constant time
                if mac.clone().verify_slice(&expected).is_ok() {
                    return Ok(());
                }
            }
        }
        Err(BillingError::SignatureInvalid("no signature matched").into())
    }
}

/// Computes the signature header a provider would attach to `payload`.
/// Used by local tooling and integration tests to forge valid deliveries.
pub fn sign_payload(
    secret: &str,
    payload: &[u8],
    timestamp: u64,
) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    format!(
        "t={},v1={}",
        timestamp,
        hex::encode(mac.finalize().into_bytes())
    )
}
