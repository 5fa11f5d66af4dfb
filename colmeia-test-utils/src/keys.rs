//! A fixed RSA key pair for signing test tokens.
//!
//! The private key is a throwaway generated for the test suite. It signs
//! service-account assertions, custom tokens and fake Firebase ID tokens; the
//! matching public key is exposed as a JWKS.

use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{encode, Algorithm, DecodingKey, EncodingKey, Header};
use serde::Serialize;

/// PKCS#8 PEM private key.
pub const TEST_PRIVATE_KEY_PEM: &str = include_str!("../fixtures/test_service_account_key.pem");

/// Key id advertised in the JWKS and set on signed tokens.
pub const TEST_KEY_ID: &str = "colmeia-test-key";

/// Service account email of the test key.
pub const TEST_CLIENT_EMAIL: &str = "firebase-adminsdk@demo-colmeia.iam.gserviceaccount.com";

/// RSA modulus, base64url.
pub const TEST_JWK_N: &str = "roJR4zPT40Hep1yJYpLbNztj2hoEVcKO2skZ0JhBz04TCxndTeQTX8oqV9rLkiULbxJjxHRW6ZJXv-lDa8jp2tPco8AO_SFN9FB3YWbKTF1BLLyViKLUME-nTDxnaNbVXXA9du1WLRIhPXaFqrWWDohcDxkNiSC3LS5e7ZydQlEeg0EoGsh4JTrPUvoG4c-nNx93pHj_5qx5AFZSc0Kou3BD_hwL8N1Ax4q68PrR6V6TIHnPHdBEUXD6o5wsJoY5VcsyycLuz6jX6GhAh3N2LwAlgy64bpXqTk8_AyzdFBPNTj_Ii1OJRSqSWB2Fz14zNft9A7aeY4Yx1-XYUQr9Xw";

/// RSA public exponent, base64url.
pub const TEST_JWK_E: &str = "AQAB";

/// Service-account JSON for `project_id` using the test key.
pub fn test_service_account_json(project_id: &str) -> String {
    test_service_account_json_with_token_uri(project_id, "https://oauth2.googleapis.com/token")
}

/// Service-account JSON pointing its token exchange at `token_uri`.
pub fn test_service_account_json_with_token_uri(project_id: &str, token_uri: &str) -> String {
    serde_json::json!({
        "type": "service_account",
        "project_id": project_id,
        "private_key_id": TEST_KEY_ID,
        "private_key": TEST_PRIVATE_KEY_PEM,
        "client_email": TEST_CLIENT_EMAIL,
        "token_uri": token_uri,
    })
    .to_string()
}

/// The public half of the test key as a JWKS.
pub fn test_jwk_set() -> JwkSet {
    let raw = serde_json::json!({
        "keys": [{
            "kty": "RSA",
            "alg": "RS256",
            "use": "sig",
            "kid": TEST_KEY_ID,
            "n": TEST_JWK_N,
            "e": TEST_JWK_E,
        }]
    });
    serde_json::from_value(raw).expect("test JWKS is valid")
}

pub fn test_decoding_key() -> DecodingKey {
    DecodingKey::from_rsa_components(TEST_JWK_N, TEST_JWK_E).expect("test key components are valid")
}

/// Sign arbitrary claims with the test key (RS256, `kid` set).
pub fn sign_test_token<T: Serialize>(claims: &T) -> String {
    let key = EncodingKey::from_rsa_pem(TEST_PRIVATE_KEY_PEM.as_bytes()).expect("test key parses");
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(TEST_KEY_ID.to_string());
    encode(&header, claims, &key).expect("signing with test key")
}

/// Claims of a Firebase ID token for `uid` in `project_id`, valid at `now`.
pub fn id_token_claims(project_id: &str, uid: &str, email: &str, now: i64) -> serde_json::Value {
    serde_json::json!({
        "iss": format!("https://securetoken.google.com/{}", project_id),
        "aud": project_id,
        "sub": uid,
        "user_id": uid,
        "iat": now,
        "exp": now + 3600,
        "auth_time": now,
        "email": email,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{decode, Validation};

    #[test]
    fn test_signed_token_verifies_with_jwk() {
        let token = sign_test_token(&id_token_claims("p", "u", "u@x.io", 1_704_067_200));
        let jwks = test_jwk_set();
        let jwk = jwks.find(TEST_KEY_ID).unwrap();
        let key = DecodingKey::from_jwk(jwk).unwrap();
        let mut validation = Validation::new(Algorithm::RS256);
        validation.validate_exp = false;
        validation.set_audience(&["p"]);
        let data = decode::<serde_json::Value>(&token, &key, &validation).unwrap();
        assert_eq!(data.claims["sub"], "u");
    }
}
