mod userpassword;

use mockall::automock;

use rota_slo::Result;

pub use userpassword::{UserEntry, UserPassword, UserTable};

/// Checks credentials and reports the roles a subject currently holds.
#[automock]
pub trait Connector: Send + Sync {
    fn login(&self, username: &str, password: &str) -> Result<Identity>;

    /// Looks the subject up again so a refreshed access token carries the
    /// roles held now, not the ones held at login.
    fn refresh(&self, subject: &str) -> Result<Identity>;
}

/// Identity represents the subject a connector vouches for.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identity {
    pub subject: String,
    pub roles: Vec<String>,
}
