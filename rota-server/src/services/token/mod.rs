pub mod password;
pub mod refresh;
mod validator;

use std::{collections::BTreeSet, fmt, sync::Arc};

use jsonwebtoken as jwt;
use serde::{Deserialize, Serialize};
use tracing::debug;

use rota_pim::{Principal, RoleCatalog};
use rota_slo::{errors, Result};
use rota_storage::RefreshStore;

use crate::services::{key::SigningKeyStore, registry::RefreshRegistry};

pub use validator::{bearer, TokenValidator};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

impl TokenType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Access => "access",
            Self::Refresh => "refresh",
        }
    }
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub permissions: BTreeSet<String>,
    pub iat: i64,
    pub exp: i64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub iss: String,
    #[serde(rename = "type")]
    pub token_type: TokenType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
}

impl Principal for Claims {
    fn subject(&self) -> &str {
        &self.sub
    }

    fn roles(&self) -> &[String] {
        &self.roles
    }

    fn permissions(&self) -> &BTreeSet<String> {
        &self.permissions
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TokenConfig {
    pub issuer: String,
    /// Seconds an access token stays valid.
    pub access_ttl: i64,
    /// Seconds a refresh token stays valid.
    pub refresh_ttl: i64,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            issuer: String::new(),
            access_ttl: 15 * 60,
            refresh_ttl: 7 * 24 * 60 * 60,
        }
    }
}

/// Mints RS256 access tokens with the current signing key and HS256
/// refresh tokens with the shared refresh secret.
pub struct TokenIssuer<S> {
    keys: Arc<SigningKeyStore>,
    catalog: Arc<RoleCatalog>,
    registry: Arc<RefreshRegistry<S>>,
    refresh_key: jwt::EncodingKey,
    config: TokenConfig,
}

impl<S> TokenIssuer<S> {
    pub fn new(
        keys: Arc<SigningKeyStore>,
        catalog: Arc<RoleCatalog>,
        registry: Arc<RefreshRegistry<S>>,
        refresh_secret: &[u8],
        config: TokenConfig,
    ) -> Self {
        Self {
            keys,
            catalog,
            registry,
            refresh_key: jwt::EncodingKey::from_secret(refresh_secret),
            config,
        }
    }

    pub fn config(&self) -> &TokenConfig {
        &self.config
    }
}

impl<S> TokenIssuer<S>
where
    S: RefreshStore,
{
    pub fn issue_access_token(
        &self,
        subject: &str,
        roles: &[String],
    ) -> Result<String> {
        let mut unique: Vec<String> = Vec::with_capacity(roles.len());
        for role in roles {
            if !unique.contains(role) {
                unique.push(role.clone());
            }
        }
        let permissions = self.catalog.resolve(unique.as_slice());

        let (encoding_key, kid) = self.keys.current_signing_material()?;
        let now = self.keys.now();
        let claims = Claims {
            sub: subject.to_owned(),
            roles: unique,
            permissions,
            iat: now,
            exp: now + self.config.access_ttl,
            iss: self.config.issuer.clone(),
            token_type: TokenType::Access,
            jti: None,
        };

        let mut header = jwt::Header::new(jwt::Algorithm::RS256);
        header.kid = Some(kid);
        let token = jwt::encode(&header, &claims, &encoding_key)
            .map_err(errors::any)?;
        debug!(
            "issued access token for {} with roles {:?}",
            subject, claims.roles
        );
        Ok(token)
    }

    /// Mints a refresh token and registers it. Only registered tokens can
    /// be redeemed.
    pub fn issue_refresh_token(&self, subject: &str) -> Result<String> {
        let now = self.keys.now();
        let claims = Claims {
            sub: subject.to_owned(),
            roles: Vec::new(),
            permissions: BTreeSet::new(),
            iat: now,
            exp: now + self.config.refresh_ttl,
            iss: self.config.issuer.clone(),
            token_type: TokenType::Refresh,
            jti: Some(uuid::Uuid::new_v4().to_string()),
        };
        let token = jwt::encode(
            &jwt::Header::new(jwt::Algorithm::HS256),
            &claims,
            &self.refresh_key,
        )
        .map_err(errors::any)?;

        self.registry.register(&token, subject, claims.exp)?;
        debug!("issued refresh token for {}", subject);
        Ok(token)
    }
}

impl<S> fmt::Debug for TokenIssuer<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
