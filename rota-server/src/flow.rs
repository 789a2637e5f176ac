use std::fmt;

use jsonwebtoken as jwt;
use tracing::info;

use rota_pim::Requirement;
use rota_slo::{errors, Result};

use crate::{services::token::Claims, App};

/// A resource and the gate in front of it.
#[derive(Debug, Clone)]
pub struct Route {
    pub path: &'static str,
    pub requirement: Requirement,
}

pub fn routes() -> Vec<Route> {
    vec![
        Route {
            path: "/whoami",
            requirement: Requirement::Authenticated,
        },
        Route {
            path: "/protected",
            requirement: Requirement::Permission("read:data".to_owned()),
        },
        Route {
            path: "/admin",
            requirement: Requirement::Role("admin".to_owned()),
        },
        Route {
            path: "/users/delete",
            requirement: Requirement::Permission("delete:users".to_owned()),
        },
    ]
}

/// Authorizes a request for `path` the way a resource server would.
pub fn access(
    app: &App,
    path: &str,
    authorization: Option<&str>,
) -> Result<Claims> {
    let route = routes()
        .into_iter()
        .find(|route| route.path == path)
        .ok_or_else(|| errors::bad_request(&format!("no route {}", path)))?;
    app.authorize(authorization, &route.requirement)
}

#[derive(Debug, Clone)]
pub struct Step {
    pub name: &'static str,
    pub expected: u16,
    pub status: u16,
    pub detail: String,
}

impl Step {
    pub fn passed(&self) -> bool {
        self.expected == self.status
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} (expected {}, got {}) {}",
            if self.passed() { "PASS" } else { "FAIL" },
            self.name,
            self.expected,
            self.status,
            self.detail
        )
    }
}

#[derive(Debug, Default)]
pub struct Report {
    pub steps: Vec<Step>,
}

impl Report {
    pub fn passed(&self) -> bool {
        !self.steps.is_empty() && self.steps.iter().all(Step::passed)
    }

    fn record<T>(
        &mut self,
        name: &'static str,
        expected: u16,
        result: Result<T>,
    ) -> Option<T> {
        let (status, detail, value) = match result {
            Ok(value) => (200, String::new(), Some(value)),
            Err(err) => (err.status().as_u16(), err.to_string(), None),
        };
        let step = Step {
            name,
            expected,
            status,
            detail,
        };
        info!("{}", step);
        self.steps.push(step);
        value
    }
}

fn bearer(token: &str) -> String {
    format!("Bearer {}", token)
}

/// Verifies an access token the way an external consumer would, with
/// nothing but the published key set.
pub fn verify_published(app: &App, token: &str) -> Result<Claims> {
    let kid = jwt::decode_header(token)
        .map_err(|err| errors::malformed_token(&err))?
        .kid
        .ok_or_else(|| errors::malformed_token("missing key id"))?;
    let key = app.jwks()?.decoding_key(&kid)?;

    let mut validation = jwt::Validation::new(jwt::Algorithm::RS256);
    validation.validate_exp = false;
    validation.validate_aud = false;
    if !app.config.issuer.is_empty() {
        validation.set_issuer(&[&app.config.issuer]);
    }
    let claims = jwt::decode::<Claims>(token, &key, &validation)
        .map_err(|err| errors::malformed_token(&err))?
        .claims;
    if claims.exp <= app.keys.now() {
        return Err(errors::expired_token());
    }
    Ok(claims)
}

/// Login, access, refresh, rotation and revocation against one `App`.
/// Stops early when a step that later steps depend on fails.
pub fn run(app: &App) -> Report {
    let mut report = Report::default();

    let Some(user) = report.record(
        "user1 logs in",
        200,
        app.login("user1", "password123"),
    ) else {
        return report;
    };
    let Some(refresh_token) = user.refresh_token.clone() else {
        return report;
    };
    let user_header = bearer(&user.access_token);

    report.record(
        "user1 reads /protected",
        200,
        access(app, "/protected", Some(user_header.as_str())),
    );
    report.record(
        "user1 is denied /admin",
        403,
        access(app, "/admin", Some(user_header.as_str())),
    );
    report.record(
        "request without a token is rejected",
        401,
        access(app, "/protected", None),
    );

    let Some(refreshed) =
        report.record("user1 refreshes", 200, app.refresh(&refresh_token))
    else {
        return report;
    };
    let refreshed_header = bearer(&refreshed.access_token);
    report.record(
        "user1 reads /protected with the new token",
        200,
        access(app, "/protected", Some(refreshed_header.as_str())),
    );
    report.record(
        "refresh token is not accepted as an access token",
        401,
        access(app, "/protected", Some(bearer(&refresh_token).as_str())),
    );

    report.record("signing key rotates", 200, app.rotate());
    report.record(
        "token signed before rotation still verifies",
        200,
        access(app, "/protected", Some(user_header.as_str())),
    );
    report.record("rotated key set is published", 200, app.jwks());
    report.record(
        "published key set verifies the token signed before rotation",
        200,
        verify_published(app, &user.access_token),
    );

    let Some(admin) = report.record(
        "admin logs in",
        200,
        app.login("admin", "adminpassword"),
    ) else {
        return report;
    };
    report.record(
        "admin reads /admin",
        200,
        access(app, "/admin", Some(bearer(&admin.access_token).as_str())),
    );

    report.record("user1 logs out", 200, app.logout(&refresh_token));
    report.record(
        "revoked refresh token is rejected",
        401,
        app.refresh(&refresh_token),
    );
    report
}
