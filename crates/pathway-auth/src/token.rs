//! Bearer token verification.
//!
//! [`TokenVerifier`] wraps `jsonwebtoken` decoding with the validation the
//! gateway requires: signature, expiry, issuer, and audience. It never
//! issues tokens.

use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use time::OffsetDateTime;

use crate::claims::AccessClaims;
use crate::error::AuthError;

/// Verifies bearer tokens and extracts their claims.
pub struct TokenVerifier {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl TokenVerifier {
    /// Creates a verifier for the given key and algorithm.
    ///
    /// `issuer` and `audience` are enforced on every token.
    #[must_use]
    pub fn new(
        decoding_key: DecodingKey,
        algorithm: Algorithm,
        issuer: impl Into<String>,
        audience: impl Into<String>,
    ) -> Self {
        let mut validation = Validation::new(algorithm);
        validation.set_issuer(&[issuer.into()]);
        validation.set_audience(&[audience.into()]);
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);

        Self {
            decoding_key,
            validation,
        }
    }

    /// Creates a verifier for HMAC-signed tokens (HS256).
    ///
    /// Used in development and tests; production deployments verify the
    /// identity service's RSA signatures via [`TokenVerifier::from_rsa_pem`].
    #[must_use]
    pub fn from_hmac_secret(
        secret: &[u8],
        issuer: impl Into<String>,
        audience: impl Into<String>,
    ) -> Self {
        Self::new(
            DecodingKey::from_secret(secret),
            Algorithm::HS256,
            issuer,
            audience,
        )
    }

    /// Creates a verifier for RS256-signed tokens from a PEM public key.
    ///
    /// # Errors
    ///
    /// Returns an error if the PEM data is not a valid RSA public key.
    pub fn from_rsa_pem(
        pem: &[u8],
        issuer: impl Into<String>,
        audience: impl Into<String>,
    ) -> Result<Self, AuthError> {
        let key = DecodingKey::from_rsa_pem(pem)
            .map_err(|e| AuthError::invalid_token(format!("Invalid RSA public key: {e}")))?;
        Ok(Self::new(key, Algorithm::RS256, issuer, audience))
    }

    /// Verifies a compact JWT and returns its claims.
    ///
    /// # Errors
    ///
    /// Returns an authentication error if the signature, expiry, issuer,
    /// or audience check fails.
    pub fn verify(&self, token: &str) -> Result<AccessClaims, AuthError> {
        if token.is_empty() {
            return Err(AuthError::MissingToken);
        }

        let data = decode::<AccessClaims>(token, &self.decoding_key, &self.validation)?;
        let claims = data.claims;

        // Expiry is already validated by the library; re-checked here so a
        // disabled-leeway misconfiguration can never let a stale token pass.
        let now = OffsetDateTime::now_utc().unix_timestamp();
        if claims.exp < now {
            tracing::debug!(sub = %claims.sub, "Token expired");
            return Err(AuthError::TokenExpired);
        }

        Ok(claims)
    }

    /// Verifies an `Authorization` header value of the form `Bearer <jwt>`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::MissingToken`] when the header is absent or not
    /// a bearer scheme, and the same errors as [`TokenVerifier::verify`]
    /// otherwise.
    pub fn verify_bearer(&self, header: Option<&str>) -> Result<AccessClaims, AuthError> {
        let token = header
            .and_then(|h| h.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::MissingToken)?;

        self.verify(token)
    }
}
