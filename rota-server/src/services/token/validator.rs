use std::sync::Arc;

use jsonwebtoken as jwt;
use tracing::warn;

use rota_slo::{
    errors::{self, Code},
    Result,
};

use super::{Claims, TokenType};
use crate::services::key::SigningKeyStore;

/// Verifies tokens minted by `TokenIssuer`. Holds only public material
/// and the refresh secret, never mutates anything.
pub struct TokenValidator {
    keys: Arc<SigningKeyStore>,
    refresh_key: jwt::DecodingKey,
    issuer: String,
}

impl TokenValidator {
    pub fn new(
        keys: Arc<SigningKeyStore>,
        refresh_secret: &[u8],
        issuer: &str,
    ) -> Self {
        Self {
            keys,
            refresh_key: jwt::DecodingKey::from_secret(refresh_secret),
            issuer: issuer.to_owned(),
        }
    }

    /// Verifies an access token. This is what a resource server calls on
    /// every request.
    pub fn verify_access(&self, token: &str) -> Result<Claims> {
        self.verify(token, TokenType::Access)
    }

    pub fn verify(&self, token: &str, expected: TokenType) -> Result<Claims> {
        let result = self.decode(token, expected);
        if let Err(err) = &result {
            warn!("rejected {} token: {}", expected, err);
        }
        result
    }

    fn decode(&self, token: &str, expected: TokenType) -> Result<Claims> {
        let header = jwt::decode_header(token)
            .map_err(|err| errors::malformed_token(&err))?;

        let (decoding_key, channel) = match header.alg {
            jwt::Algorithm::RS256 => {
                let kid = header.kid.as_deref().ok_or_else(|| {
                    errors::malformed_token("missing key id")
                })?;
                let key =
                    self.keys.verification_material(kid).map_err(|err| {
                        if matches!(err.code(), Code::UnknownKey(_)) {
                            errors::unknown_signing_key(kid)
                        } else {
                            err
                        }
                    })?;
                (key, TokenType::Access)
            }
            jwt::Algorithm::HS256 => {
                (self.refresh_key.clone(), TokenType::Refresh)
            }
            alg => {
                return Err(errors::malformed_token(&format!(
                    "unsupported algorithm {:?}",
                    alg
                )))
            }
        };

        let mut validation = jwt::Validation::new(header.alg);
        // expiry is checked below against the injected clock
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.validate_aud = false;
        validation.set_required_spec_claims(&["exp", "sub"]);
        if !self.issuer.is_empty() {
            validation.set_issuer(&[&self.issuer]);
        }

        let claims = jwt::decode::<Claims>(token, &decoding_key, &validation)
            .map_err(|err| errors::malformed_token(&err))?
            .claims;

        if claims.token_type != channel {
            return Err(errors::malformed_token(&format!(
                "{} token signed with {:?}",
                claims.token_type, header.alg
            )));
        }
        if claims.exp <= self.keys.now() {
            return Err(errors::expired_token());
        }
        if claims.token_type != expected {
            return Err(errors::type_mismatch(
                expected.as_str(),
                claims.token_type.as_str(),
            ));
        }
        Ok(claims)
    }
}

impl std::fmt::Debug for TokenValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenValidator")
            .field("issuer", &self.issuer)
            .finish_non_exhaustive()
    }
}

/// Extracts the token from an `Authorization` header value.
pub fn bearer(header: Option<&str>) -> Result<&str> {
    let value = header
        .ok_or_else(|| errors::malformed_token("missing authorization"))?;
    match value.trim().split_once(' ') {
        Some((scheme, token))
            if scheme.eq_ignore_ascii_case("bearer")
                && !token.trim().is_empty() =>
        {
            Ok(token.trim())
        }
        _ => Err(errors::malformed_token("expected a bearer credential")),
    }
}
