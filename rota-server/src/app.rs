use std::{fs, sync::Arc};

use anyhow::{Context, Result};
use rand::RngCore;
use tracing::{info, warn};

use rota_pim::{Requirement, RoleCatalog};
use rota_slo::{errors, Clock, SystemClock};
use rota_storage::MemoryRefreshStore;

use crate::{
    services::{
        connect::{UserPassword, UserTable},
        key::{
            JsonWebKeySet, JwksPublisher, RotationStrategy, SigningKeyStore,
        },
        registry::RefreshRegistry,
        token::{
            self,
            password::{PasswordGrant, PasswordGrantOpts},
            refresh::{RefreshGrant, RefreshGrantOpts},
            Claims, TokenConfig, TokenIssuer, TokenValidator,
        },
    },
    AppConfig,
};

const DEMO_ROLES: &str = include_str!("../demo/roles.json");
const DEMO_USERS: &str = include_str!("../demo/users.json");

pub struct App {
    pub config: AppConfig,
    pub keys: Arc<SigningKeyStore>,
    pub jwks: JwksPublisher,
    pub registry: Arc<RefreshRegistry<MemoryRefreshStore>>,
    pub issuer: TokenIssuer<MemoryRefreshStore>,
    pub validator: TokenValidator,
    pub connector: UserPassword,
}

impl App {
    pub fn new(config: AppConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: AppConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;
        info!("initializing token services...");

        let catalog = match &config.roles_path {
            Some(path) => RoleCatalog::from_json(
                &fs::read_to_string(path)
                    .with_context(|| format!("could not read {}", path))?,
            )
            .with_context(|| format!("could not parse {}", path))?,
            None => {
                warn!("no roles file configured, using the demo roles");
                RoleCatalog::from_json(DEMO_ROLES)?
            }
        };
        let users = match &config.users_path {
            Some(path) => UserTable::from_json(
                &fs::read_to_string(path)
                    .with_context(|| format!("could not read {}", path))?,
            )
            .with_context(|| format!("could not parse {}", path))?,
            None => {
                warn!("no users file configured, using the demo users");
                UserTable::from_json(DEMO_USERS)?
            }
        };
        info!(
            "loaded {} roles and {} users",
            catalog.len(),
            users.users.len()
        );

        let refresh_secret = match &config.refresh_secret {
            Some(secret) => secret.as_bytes().to_vec(),
            None => {
                warn!(
                    "no refresh secret configured, refresh tokens will not \
                     survive a restart"
                );
                let mut secret = vec![0u8; 32];
                rand::thread_rng().fill_bytes(&mut secret);
                secret
            }
        };

        let keys = Arc::new(
            SigningKeyStore::new(
                RotationStrategy {
                    overlap: config.key_overlap,
                    key_bits: config.key_bits,
                },
                Arc::clone(&clock),
            )
            .context("could not create the initial signing key")?,
        );
        let registry = Arc::new(RefreshRegistry::new(
            MemoryRefreshStore::new(),
            clock,
        ));
        let issuer = TokenIssuer::new(
            Arc::clone(&keys),
            Arc::new(catalog),
            Arc::clone(&registry),
            &refresh_secret,
            TokenConfig {
                issuer: config.issuer.clone(),
                access_ttl: config.access_token_ttl,
                refresh_ttl: config.refresh_token_ttl,
            },
        );
        let validator = TokenValidator::new(
            Arc::clone(&keys),
            &refresh_secret,
            &config.issuer,
        );

        info!("token services successfully initialized!");
        Ok(Self {
            jwks: JwksPublisher::new(Arc::clone(&keys)),
            connector: UserPassword::new(users),
            config,
            keys,
            registry,
            issuer,
            validator,
        })
    }

    pub fn login(
        &self,
        username: &str,
        password: &str,
    ) -> rota_slo::Result<token::TokenResponse> {
        PasswordGrant {
            connector: &self.connector,
            issuer: &self.issuer,
        }
        .grant(&PasswordGrantOpts {
            username: username.to_owned(),
            password: password.to_owned(),
        })
    }

    pub fn refresh(
        &self,
        refresh_token: &str,
    ) -> rota_slo::Result<token::TokenResponse> {
        RefreshGrant {
            connector: &self.connector,
            issuer: &self.issuer,
            validator: &self.validator,
            registry: &self.registry,
        }
        .grant(&RefreshGrantOpts {
            refresh_token: refresh_token.to_owned(),
        })
    }

    /// Revokes a refresh token. Access tokens already issued stay valid
    /// until they expire.
    pub fn logout(&self, refresh_token: &str) -> rota_slo::Result<()> {
        let claims = self
            .validator
            .verify(refresh_token, token::TokenType::Refresh)?;
        if !self.registry.revoke(refresh_token)? {
            return Err(errors::revoked_refresh_token());
        }
        info!("{} logged out", claims.sub);
        Ok(())
    }

    /// Verifies the bearer credential of a request and checks it against
    /// the requirement of the resource.
    pub fn authorize(
        &self,
        authorization: Option<&str>,
        requirement: &Requirement,
    ) -> rota_slo::Result<Claims> {
        let raw = token::bearer(authorization)?;
        let claims = self.validator.verify_access(raw)?;
        requirement.check(&claims)?;
        Ok(claims)
    }

    pub fn jwks(&self) -> rota_slo::Result<JsonWebKeySet> {
        self.jwks.publish()
    }

    pub fn rotate(&self) -> rota_slo::Result<String> {
        self.keys.rotate()
    }
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("issuer", &self.issuer)
            .field("keys", &self.keys)
            .finish_non_exhaustive()
    }
}
