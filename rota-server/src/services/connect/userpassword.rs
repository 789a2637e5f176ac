use std::{collections::HashMap, sync::RwLock};

use constant_time_eq::constant_time_eq;
use serde::{Deserialize, Serialize};
use tracing::warn;

use rota_slo::{errors, Result};

use super::{Connector, Identity};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct UserTable {
    #[serde(default)]
    pub users: HashMap<String, UserEntry>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UserEntry {
    pub password: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

impl UserTable {
    pub fn from_json(content: &str) -> Result<Self> {
        serde_json::from_str(content).map_err(errors::any)
    }

    pub fn with_user<I, R>(
        mut self,
        name: &str,
        password: &str,
        roles: I,
    ) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<String>,
    {
        self.users.insert(
            name.to_owned(),
            UserEntry {
                password: password.to_owned(),
                roles: roles.into_iter().map(Into::into).collect(),
            },
        );
        self
    }
}

/// Password connector over a static user table.
#[derive(Debug)]
pub struct UserPassword {
    users: RwLock<HashMap<String, UserEntry>>,
}

impl UserPassword {
    pub fn new(table: UserTable) -> Self {
        Self {
            users: RwLock::new(table.users),
        }
    }

    /// Replaces the roles of `username`. Returns false for unknown users.
    pub fn set_roles(
        &self,
        username: &str,
        roles: Vec<String>,
    ) -> Result<bool> {
        let mut users = self.users.write().map_err(errors::any)?;
        Ok(match users.get_mut(username) {
            Some(user) => {
                user.roles = roles;
                true
            }
            None => false,
        })
    }
}

impl Connector for UserPassword {
    fn login(&self, username: &str, password: &str) -> Result<Identity> {
        let users = self.users.read().map_err(errors::any)?;
        match users.get(username) {
            Some(user)
                if constant_time_eq(
                    user.password.as_bytes(),
                    password.as_bytes(),
                ) =>
            {
                Ok(Identity {
                    subject: username.to_owned(),
                    roles: user.roles.clone(),
                })
            }
            _ => {
                warn!("failed login attempt for {}", username);
                Err(errors::unauthorized())
            }
        }
    }

    fn refresh(&self, subject: &str) -> Result<Identity> {
        let users = self.users.read().map_err(errors::any)?;
        let user = users.get(subject).ok_or_else(errors::unauthorized)?;
        Ok(Identity {
            subject: subject.to_owned(),
            roles: user.roles.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use rota_slo::errors::Code;

    use super::*;

    fn connector() -> UserPassword {
        UserPassword::new(
            UserTable::default()
                .with_user("user1", "password1", ["user"])
                .with_user("admin", "adminpass", ["admin", "user"]),
        )
    }

    #[test]
    fn login() {
        let identity = connector().login("admin", "adminpass").unwrap();
        assert_eq!(identity.subject, "admin");
        assert_eq!(identity.roles, vec!["admin", "user"]);
    }

    #[test]
    fn bad_credentials_are_unauthorized() {
        let conn = connector();
        for (username, password) in
            [("user1", "wrong"), ("nobody", "password1"), ("user1", "")]
        {
            let err = conn.login(username, password).unwrap_err();
            assert!(matches!(err.code(), Code::Unauthorized));
        }
    }

    #[test]
    fn refresh_sees_role_changes() {
        let conn = connector();
        assert!(conn.set_roles("user1", vec!["admin".into()]).unwrap());
        assert!(!conn.set_roles("nobody", vec![]).unwrap());
        assert_eq!(conn.refresh("user1").unwrap().roles, vec!["admin"]);
        assert!(conn.refresh("nobody").is_err());
    }

    #[test]
    fn parse_table() {
        let table = UserTable::from_json(
            r#"{"users": {"user1": {"password": "p1", "roles": ["user"]}}}"#,
        )
        .unwrap();
        assert_eq!(table.users["user1"].roles, vec!["user"]);
        assert!(UserTable::from_json(r#"{"users": []}"#).is_err());
        assert!(UserTable::from_json(
            r#"{"users": {"user1": {"roles": ["user"]}}}"#
        )
        .is_err());
    }
}
