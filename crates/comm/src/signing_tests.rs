use super::*;

const KEY: &str = "signkey-prod-abc123";

#[test]
fn round_trip_succeeds() {
    let body = br#"{"hello":"world"}"#;
    let header = sign(KEY, body, 1_000);
    assert!(verify_with_key(&header, body, KEY, 1_000, false).is_ok());
}

#[test]
fn altering_the_body_fails() {
    let header = sign(KEY, b"original", 1_000);
    assert!(verify_with_key(&header, b"tampered", KEY, 1_000, false).is_err());
}

#[test]
fn altering_the_key_fails() {
    let body = b"payload";
    let header = sign(KEY, body, 1_000);
    assert!(verify_with_key(&header, body, "signkey-prod-different", 1_000, false).is_err());
}

#[test]
fn altering_the_timestamp_fails() {
    let body = b"payload";
    let header = sign(KEY, body, 1_000);
    let tampered = header.replace("t=1000", "t=2000");
    assert!(verify_with_key(&tampered, body, KEY, 1_000, false).is_err());
}

#[test]
fn expired_signature_is_rejected_unless_skipped() {
    let body = b"payload";
    let header = sign(KEY, body, 1_000);
    let now = 1_000 + MAX_SIGNATURE_AGE_SECS + 1;
    assert!(matches!(
        verify_with_key(&header, body, KEY, now, false),
        Err(CommError::SignatureExpired)
    ));
    assert!(verify_with_key(&header, body, KEY, now, true).is_ok());
}

#[test]
fn falls_back_to_secondary_key() {
    let secondary = "signkey-prod-secondaryvalue";
    let body = b"payload";
    let header = sign(secondary, body, 1_000);
    let used = verify(&header, body, KEY, Some(secondary), 1_000, false).expect("verifies");
    assert_eq!(used, secondary);
}

#[test]
fn fails_when_neither_key_matches() {
    let body = b"payload";
    let header = sign("signkey-prod-unrelated", body, 1_000);
    assert!(verify(&header, body, KEY, Some("signkey-prod-othersecondary"), 1_000, false).is_err());
}
