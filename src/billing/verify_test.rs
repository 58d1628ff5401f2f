use super::*;
use crate::BillingError;
use crate::Error;

const SECRET: &str = "whsec_test";
const SIGNED_AT: u64 = 1_700_000_000;

fn verifier(tolerance_secs: u64) -> WebhookVerifier {
    WebhookVerifier::new(SECRET, tolerance_secs)
}

fn assert_invalid(
    result: crate::Result<()>,
    reason: &str,
) {
    match result.unwrap_err() {
        Error::Billing(BillingError::SignatureInvalid(actual)) => {
            assert_eq!(actual, reason);
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[test]
fn valid_signature_should_pass() {
    let payload = br#"{"id":"evt_1"}"#;
    let header = sign_payload(SECRET, payload, SIGNED_AT);
    assert!(verifier(300).verify_at(payload, &header, SIGNED_AT).is_ok());
}

#[test]
fn wrong_secret_should_fail() {
    let payload = br#"{"id":"evt_1"}"#;
    let header = sign_payload("whsec_other", payload, SIGNED_AT);
    assert_invalid(
        verifier(300).verify_at(payload, &header, SIGNED_AT),
        "no signature matched",
    );
}

#[test]
fn tampered_payload_should_fail() {
    let header = sign_payload(SECRET, br#"{"amount":100}"#, SIGNED_AT);
    assert_invalid(
        verifier(300).verify_at(br#"{"amount":999}"#, &header, SIGNED_AT),
        "no signature matched",
    );
}

#[test]
fn malformed_headers_should_fail_with_specific_reasons() {
    let payload = b"{}";
    let v = verifier(300);
    assert_invalid(
        v.verify_at(payload, "v1=deadbeef", SIGNED_AT),
        "missing timestamp",
    );
    assert_invalid(
        v.verify_at(payload, "t=1700000000", SIGNED_AT),
        "missing v1 signature",
    );
    assert_invalid(
        v.verify_at(payload, "t=soon,v1=deadbeef", SIGNED_AT),
        "unparseable timestamp",
    );
    assert_invalid(v.verify_at(payload, "", SIGNED_AT), "missing timestamp");
}

#[test]
fn stale_timestamp_should_fail_within_tolerance() {
    let payload = b"{}";
    let header = sign_payload(SECRET, payload, SIGNED_AT);
    let v = verifier(300);

    assert!(v.verify_at(payload, &header, SIGNED_AT + 299).is_ok());
    assert_invalid(
        v.verify_at(payload, &header, SIGNED_AT + 301),
        "timestamp outside tolerance",
    );
    // Clock skew runs both ways
    assert!(v.verify_at(payload, &header, SIGNED_AT - 100).is_ok());
    assert_invalid(
        v.verify_at(payload, &header, SIGNED_AT - 301),
        "timestamp outside tolerance",
    );
}

#[test]
fn zero_tolerance_should_disable_the_freshness_check() {
    let payload = b"{}";
    let header = sign_payload(SECRET, payload, SIGNED_AT);
    assert!(verifier(0)
        .verify_at(payload, &header, SIGNED_AT + 10_000_000)
        .is_ok());
}

#[test]
fn any_matching_v1_entry_should_admit_during_rotation() {
    let payload = br#"{"id":"evt_1"}"#;
    let good = sign_payload(SECRET, payload, SIGNED_AT);
    let good_sig = good.split("v1=").nth(1).unwrap();

    let rotated = format!("t={},v1={},v1={}", SIGNED_AT, "00ff00ff", good_sig);
    assert!(verifier(300).verify_at(payload, &rotated, SIGNED_AT).is_ok());
}

#[test]
fn undecodable_v1_entries_are_skipped_not_fatal() {
    let payload = b"{}";
    let header = format!("t={},v1=not-hex!", SIGNED_AT);
    assert_invalid(
        verifier(300).verify_at(payload, &header, SIGNED_AT),
        "no signature matched",
    );
}

#[test]
fn empty_secret_should_reject_everything() {
    let payload = b"{}";
    let v = WebhookVerifier::new("", 300);
    // Even a header signed with the same empty secret fails closed
    let header = sign_payload("", payload, SIGNED_AT);
    assert_invalid(
        v.verify_at(payload, &header, SIGNED_AT),
        "no webhook secret configured",
    );
}
