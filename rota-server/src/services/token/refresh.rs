use serde::Deserialize;
use tracing::warn;

use rota_slo::{errors, Result};
use rota_storage::RefreshStore;

use crate::services::{
    connect::Connector,
    registry::RefreshRegistry,
    token::{self, TokenType},
};

#[derive(Debug, Deserialize)]
pub struct RefreshGrantOpts {
    pub refresh_token: String,
}

/// Redeems a registered refresh token for a new access token. The roles
/// are looked up again, so changes since login show up in the new token.
/// The refresh token itself is not rotated.
#[derive(Debug)]
pub struct RefreshGrant<'a, C, S> {
    pub connector: &'a C,
    pub issuer: &'a token::TokenIssuer<S>,
    pub validator: &'a token::TokenValidator,
    pub registry: &'a RefreshRegistry<S>,
}

impl<C, S> RefreshGrant<'_, C, S>
where
    C: Connector,
    S: RefreshStore,
{
    pub fn grant(
        &self,
        opts: &RefreshGrantOpts,
    ) -> Result<token::TokenResponse> {
        let claims = self
            .validator
            .verify(&opts.refresh_token, TokenType::Refresh)?;
        if !self.registry.is_valid(&opts.refresh_token, &claims.sub)? {
            warn!("refresh token of {} is not registered", claims.sub);
            return Err(errors::revoked_refresh_token());
        }

        let identity = self.connector.refresh(&claims.sub)?;
        let access_token = self
            .issuer
            .issue_access_token(&identity.subject, &identity.roles)?;

        Ok(token::TokenResponse {
            access_token,
            token_type: "bearer".to_owned(),
            expires_in: self.issuer.config().access_ttl,
            refresh_token: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use mockall::predicate::eq;

    use rota_slo::errors::Code;

    use super::*;
    use crate::services::{
        connect::{Identity, MockConnector},
        token::tests::{fixture, Fixture},
    };

    fn redeem(
        f: &Fixture,
        connector: &MockConnector,
        refresh_token: &str,
    ) -> Result<token::TokenResponse> {
        RefreshGrant {
            connector,
            issuer: &f.issuer,
            validator: &f.validator,
            registry: &f.registry,
        }
        .grant(&RefreshGrantOpts {
            refresh_token: refresh_token.to_owned(),
        })
    }

    #[test]
    fn roles_are_resolved_again() {
        let f = fixture();
        let refresh_token = f.issuer.issue_refresh_token("user1").unwrap();

        // user1 is promoted between the two redemptions
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let mut connector = MockConnector::new();
        connector
            .expect_refresh()
            .with(eq("user1"))
            .times(2)
            .returning(move |subject| {
                let roles = match counter.fetch_add(1, Ordering::SeqCst) {
                    0 => vec!["user".to_owned()],
                    _ => vec!["user".to_owned(), "admin".to_owned()],
                };
                Ok(Identity {
                    subject: subject.to_owned(),
                    roles,
                })
            });

        let first = redeem(&f, &connector, &refresh_token).unwrap();
        let claims = f.validator.verify_access(&first.access_token).unwrap();
        assert_eq!(claims.roles, vec!["user"]);
        assert!(!claims.permissions.contains("delete:users"));
        assert!(first.refresh_token.is_none());

        let second = redeem(&f, &connector, &refresh_token).unwrap();
        let claims = f.validator.verify_access(&second.access_token).unwrap();
        assert_eq!(claims.roles, vec!["user", "admin"]);
        assert!(claims.permissions.contains("delete:users"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn revoked_token_is_rejected() {
        let f = fixture();
        let refresh_token = f.issuer.issue_refresh_token("user1").unwrap();
        assert!(f.registry.revoke(&refresh_token).unwrap());

        let mut connector = MockConnector::new();
        connector.expect_refresh().never();
        let err = redeem(&f, &connector, &refresh_token).unwrap_err();
        assert!(matches!(err.code(), Code::RevokedOrUnknownRefreshToken));
    }

    #[test]
    fn access_token_cannot_be_redeemed() {
        let f = fixture();
        let access_token =
            f.issuer.issue_access_token("user1", &[]).unwrap();

        let mut connector = MockConnector::new();
        connector.expect_refresh().never();
        let err = redeem(&f, &connector, &access_token).unwrap_err();
        assert!(matches!(err.code(), Code::TypeMismatch { .. }));
    }

    #[test]
    fn expired_refresh_token() {
        let f = fixture();
        let refresh_token = f.issuer.issue_refresh_token("user1").unwrap();
        f.clock.advance(600);

        let mut connector = MockConnector::new();
        connector.expect_refresh().never();
        let err = redeem(&f, &connector, &refresh_token).unwrap_err();
        assert!(matches!(err.code(), Code::ExpiredToken));
    }

    #[test]
    fn removed_subject_cannot_refresh() {
        let f = fixture();
        let refresh_token = f.issuer.issue_refresh_token("user1").unwrap();

        let mut connector = MockConnector::new();
        connector
            .expect_refresh()
            .returning(|_| Err(errors::unauthorized()));
        let err = redeem(&f, &connector, &refresh_token).unwrap_err();
        assert!(matches!(err.code(), Code::Unauthorized));
    }
}
