use serde::Deserialize;

use rota_slo::Result;
use rota_storage::RefreshStore;

use crate::services::{connect::Connector, token};

#[derive(Debug, Deserialize)]
pub struct PasswordGrantOpts {
    pub username: String,
    pub password: String,
}

/// Exchanges user credentials for an access and refresh token pair.
#[derive(Debug)]
pub struct PasswordGrant<'a, C, S> {
    pub connector: &'a C,
    pub issuer: &'a token::TokenIssuer<S>,
}

impl<C, S> PasswordGrant<'_, C, S>
where
    C: Connector,
    S: RefreshStore,
{
    pub fn grant(
        &self,
        opts: &PasswordGrantOpts,
    ) -> Result<token::TokenResponse> {
        let identity = self.connector.login(&opts.username, &opts.password)?;

        let access_token = self
            .issuer
            .issue_access_token(&identity.subject, &identity.roles)?;
        let refresh_token =
            self.issuer.issue_refresh_token(&identity.subject)?;

        Ok(token::TokenResponse {
            access_token,
            token_type: "bearer".to_owned(),
            expires_in: self.issuer.config().access_ttl,
            refresh_token: Some(refresh_token),
        })
    }
}
