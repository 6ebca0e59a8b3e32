//! PKCE S256 challenge generation and random protocol values
//!
//! Implements the `S256` method of RFC 7636: the verifier is 32 random bytes
//! encoded as base64url without padding, and the challenge is
//! `BASE64URL(SHA256(ASCII(verifier)))`.
//!
//! The same random source produces the `state` and `nonce` values and the
//! session keys.

use base64::Engine as _;
use sha2::{Digest, Sha256};

use crate::error::{Result, TokenviewError};
use crate::oidc::discovery::ProviderMetadata;

/// The only challenge method this client sends
pub const S256: &str = "S256";

// ---------------------------------------------------------------------------
// PkceChallenge
// ---------------------------------------------------------------------------

/// A verifier and the challenge derived from it.
///
/// # Examples
///
/// ```
/// use tokenview::oidc::pkce::generate;
///
/// let pkce = generate();
/// assert_eq!(pkce.verifier.len(), 43);
/// assert_eq!(pkce.challenge, tokenview::oidc::pkce::challenge_for(&pkce.verifier));
/// ```
#[derive(Debug, Clone)]
pub struct PkceChallenge {
    /// Sent to the token endpoint as `code_verifier`.
    pub verifier: String,
    /// Sent to the authorization endpoint as `code_challenge`.
    pub challenge: String,
}

/// Generates a fresh S256 challenge pair.
pub fn generate() -> PkceChallenge {
    let verifier = random_token(32);
    let challenge = challenge_for(&verifier);
    PkceChallenge {
        verifier,
        challenge,
    }
}

/// Computes the S256 challenge for a verifier.
pub fn challenge_for(verifier: &str) -> String {
    let digest = Sha256::digest(verifier.as_bytes());
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(digest.as_slice())
}

/// Returns `len` random bytes encoded as base64url without padding.
pub fn random_token(len: usize) -> String {
    use rand::RngCore as _;

    let mut bytes = vec![0u8; len];
    rand::rng().fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// Checks that the provider accepts `S256`.
///
/// Providers that omit `code_challenge_methods_supported` are accepted:
/// the field is optional in OpenID Connect Discovery and many providers
/// that enforce PKCE do not publish it.
///
/// # Errors
///
/// Returns [`TokenviewError::Login`] when the provider lists challenge
/// methods and `S256` is not among them.
pub fn verify_s256_support(metadata: &ProviderMetadata) -> Result<()> {
    match metadata.code_challenge_methods_supported.as_deref() {
        None => Ok(()),
        Some(methods) if methods.iter().any(|m| m == S256) => Ok(()),
        Some(methods) => Err(TokenviewError::Login(format!(
            "provider does not support PKCE S256 (advertises: {})",
            methods.join(", ")
        ))
        .into()),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn metadata_with_methods(methods: Option<Vec<&str>>) -> ProviderMetadata {
        ProviderMetadata {
            issuer: "https://idp.example.com".to_string(),
            authorization_endpoint: "https://idp.example.com/authorize".to_string(),
            token_endpoint: "https://idp.example.com/token".to_string(),
            userinfo_endpoint: None,
            end_session_endpoint: None,
            jwks_uri: None,
            scopes_supported: None,
            code_challenge_methods_supported: methods
                .map(|m| m.into_iter().map(str::to_string).collect()),
            extra: HashMap::new(),
        }
    }

    #[test]
    fn test_generate_verifier_length() {
        assert_eq!(generate().verifier.len(), 43);
    }

    #[test]
    fn test_challenge_matches_rfc7636_appendix_b() {
        // RFC 7636 Appendix B test vector.
        assert_eq!(
            challenge_for("dBjftJeZ4CVP-1qdzcgqu4b4nSmYRMp8R96E3r2U7fSs"),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }

    #[test]
    fn test_generate_produces_unique_verifiers() {
        let a = generate();
        let b = generate();
        assert_ne!(a.verifier, b.verifier);
        assert_ne!(a.challenge, b.challenge);
    }

    #[test]
    fn test_random_token_is_url_safe() {
        let token = random_token(32);
        assert!(token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        assert_eq!(random_token(16).len(), 22);
    }

    #[test]
    fn test_verify_s256_absent_field_is_accepted() {
        assert!(verify_s256_support(&metadata_with_methods(None)).is_ok());
    }

    #[test]
    fn test_verify_s256_listed() {
        let meta = metadata_with_methods(Some(vec!["plain", "S256"]));
        assert!(verify_s256_support(&meta).is_ok());
    }

    #[test]
    fn test_verify_s256_plain_only_is_rejected() {
        let meta = metadata_with_methods(Some(vec!["plain"]));
        let err = verify_s256_support(&meta).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TokenviewError>(),
            Some(TokenviewError::Login(_))
        ));
    }
}
