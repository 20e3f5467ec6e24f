//! Property-based tests for JWKS publishing.
//!
//! Property 9: Published Keys Verify Issued Tokens
//! Property 10: JWKS Key Rotation

use auth_common::{verify_token, PublishedKeySet, ValidationPolicy, VerificationKey};
use proptest::prelude::*;
use std::sync::Arc;
use std::time::Duration;
use test_utils::{
    fixed_now, key_id_strategy, subject_strategy, RSA_PRIMARY_PEM, RSA_ROTATED_PEM, TEST_AUDIENCE,
    TEST_ISSUER,
};
use token_service::{JwksPublisher, KeyRing, SigningIdentity, TokenSigner};

fn signer(ring: &Arc<KeyRing>) -> TokenSigner {
    TokenSigner::new(
        Arc::clone(ring),
        TEST_ISSUER,
        TEST_AUDIENCE,
        Duration::from_secs(900),
        Duration::from_secs(86_400),
    )
}

/// Parse the served document the way a resource server does.
fn served_keys(publisher: &JwksPublisher) -> Vec<VerificationKey> {
    let response = publisher.response().unwrap();
    PublishedKeySet::from_json(response.body.as_bytes())
        .unwrap()
        .keys
        .iter()
        .map(|jwk| VerificationKey::try_from(jwk).unwrap())
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Property 9: Published Keys Verify Issued Tokens
    ///
    /// Any token issued by the active key verifies with the key the
    /// publisher serves under the token's key ID.
    #[test]
    fn prop_published_key_verifies(kid in key_id_strategy(), subject in subject_strategy()) {
        let ring = Arc::new(KeyRing::new(SigningIdentity::rsa_from_pem(kid.clone(), RSA_PRIMARY_PEM).unwrap()));
        let publisher = JwksPublisher::new(Arc::clone(&ring));
        let token = signer(&ring).issue_access_token_at(&subject, fixed_now()).unwrap();

        let keys = served_keys(&publisher);
        prop_assert_eq!(keys.len(), 1);
        prop_assert_eq!(keys[0].key_id(), kid.as_str());

        let policy = ValidationPolicy::default().with_issuer(TEST_ISSUER).with_audience(TEST_AUDIENCE);
        let claims = verify_token(&token, &keys[0], &policy, fixed_now()).unwrap();
        prop_assert_eq!(claims.subject(), subject);
    }

    /// Property 10: JWKS Key Rotation
    ///
    /// During the grace period both keys are served, active first; after it
    /// only the active key remains.
    #[test]
    fn prop_jwks_key_rotation(
        key1_id in key_id_strategy(),
        key2_id in key_id_strategy(),
        grace_secs in 1i64..86_400,
    ) {
        prop_assume!(key1_id != key2_id);
        let ring = Arc::new(KeyRing::new(SigningIdentity::rsa_from_pem(key1_id.clone(), RSA_PRIMARY_PEM).unwrap()));
        let publisher = JwksPublisher::new(Arc::clone(&ring));
        let now = fixed_now();

        let next = SigningIdentity::rsa_from_pem(key2_id.clone(), RSA_ROTATED_PEM).unwrap();
        ring.rotate_at(next, Duration::from_secs(grace_secs as u64), now).unwrap();

        let during = publisher.document_at(now);
        prop_assert_eq!(during.key_ids(), vec![key2_id.as_str(), key1_id.as_str()]);

        let after = publisher.document_at(now + chrono::Duration::seconds(grace_secs));
        prop_assert_eq!(after.key_ids(), vec![key2_id.as_str()]);
    }
}

#[test]
fn test_document_contains_no_private_material() {
    let ring = Arc::new(KeyRing::new(
        SigningIdentity::rsa_from_pem("rs-1", RSA_PRIMARY_PEM).unwrap(),
    ));
    let body = JwksPublisher::new(ring).to_json().unwrap();
    let value: serde_json::Value = serde_json::from_str(&body).unwrap();

    let key = value["keys"][0].as_object().unwrap();
    let mut fields: Vec<&str> = key.keys().map(String::as_str).collect();
    fields.sort_unstable();
    assert_eq!(fields, vec!["alg", "e", "kid", "kty", "n", "use"]);
}
