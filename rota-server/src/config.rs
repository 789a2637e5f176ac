use std::fs;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Deserialize;

#[derive(Parser, Debug, Clone, Deserialize)]
#[command(name = "rota")]
#[command(author, version, about, long_about = None)]
pub struct AppConfig {
    #[clap(long)]
    #[arg(short = 'c')]
    #[serde(default)]
    pub config: Option<String>,
    #[clap(long, env)]
    #[arg(default_value_t = String::from("rota_server=info,rota_pim=info"))]
    #[serde(default = "default_rust_log")]
    pub rust_log: String,
    #[clap(long, env)]
    #[arg(default_value_t = String::from("rota"))]
    #[serde(default = "default_issuer")]
    pub issuer: String,
    #[clap(long, env)]
    #[arg(default_value_t = 900)]
    #[serde(default = "default_access_token_ttl")]
    pub access_token_ttl: i64,
    #[clap(long, env)]
    #[arg(default_value_t = 7 * 24 * 60 * 60)]
    #[serde(default = "default_refresh_token_ttl")]
    pub refresh_token_ttl: i64,
    #[clap(long, env)]
    #[arg(default_value_t = 1200)]
    #[serde(default = "default_key_overlap")]
    pub key_overlap: i64,
    #[clap(long, env)]
    #[arg(default_value_t = 3600)]
    #[serde(default = "default_rotation_interval")]
    pub rotation_interval: u64,
    #[clap(long, env)]
    #[arg(default_value_t = 2048)]
    #[serde(default = "default_key_bits")]
    pub key_bits: usize,
    #[clap(long, env)]
    #[serde(default)]
    pub refresh_secret: Option<String>,
    #[clap(long, env)]
    #[serde(default)]
    pub roles_path: Option<String>,
    #[clap(long, env)]
    #[serde(default)]
    pub users_path: Option<String>,
    #[command(subcommand)]
    #[serde(skip)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run the login, access, refresh and rotation flow in-process
    Flow,
    /// Print the published key set
    Jwks,
    /// Log in and print the issued tokens
    Login {
        #[arg(long, short = 'u')]
        username: String,
        #[arg(long, short = 'p')]
        password: String,
    },
    /// Verify an access token and print its claims
    Inspect { token: String },
    /// Rotate signing keys on a timer until interrupted
    Run,
}

fn default_rust_log() -> String {
    String::from("rota_server=info,rota_pim=info")
}

fn default_issuer() -> String {
    String::from("rota")
}

fn default_access_token_ttl() -> i64 {
    900
}

fn default_refresh_token_ttl() -> i64 {
    7 * 24 * 60 * 60
}

fn default_key_overlap() -> i64 {
    1200
}

fn default_rotation_interval() -> u64 {
    3600
}

fn default_key_bits() -> usize {
    2048
}

impl AppConfig {
    /// Rejects settings under which issued tokens could outlive the key
    /// that verifies them.
    pub fn validate(&self) -> Result<()> {
        if self.access_token_ttl <= 0 {
            bail!("access_token_ttl must be positive");
        }
        if self.refresh_token_ttl <= 0 {
            bail!("refresh_token_ttl must be positive");
        }
        if self.rotation_interval == 0 {
            bail!("rotation_interval must be positive");
        }
        if self.key_overlap < self.access_token_ttl {
            bail!(
                "key_overlap ({}s) must not be shorter than access_token_ttl \
                 ({}s)",
                self.key_overlap,
                self.access_token_ttl
            );
        }
        if self.key_bits < 2048 {
            bail!("key_bits must be at least 2048, got {}", self.key_bits);
        }
        Ok(())
    }
}

pub fn load(cfg: &str) -> Result<AppConfig> {
    let content =
        fs::read_to_string(cfg).context("could not read config file")?;
    parse(&content)
}

fn parse(content: &str) -> Result<AppConfig> {
    let config: AppConfig =
        toml::from_str(content).context("could not parse config file")?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = AppConfig::parse_from(["rota"]);
        assert_eq!(config.access_token_ttl, 900);
        assert_eq!(config.refresh_token_ttl, 604_800);
        assert_eq!(config.key_overlap, 1200);
        assert!(config.refresh_secret.is_none());
        assert!(config.command.is_none());
        config.validate().unwrap();
    }

    #[test]
    fn toml_defaults_match_flags() {
        let config = parse("").unwrap();
        let flags = AppConfig::parse_from(["rota"]);
        assert_eq!(config.issuer, flags.issuer);
        assert_eq!(config.rotation_interval, flags.rotation_interval);
        assert_eq!(config.key_bits, flags.key_bits);
    }

    #[test]
    fn subcommand() {
        let config = AppConfig::parse_from([
            "rota", "login", "-u", "user1", "-p", "password123",
        ]);
        assert!(matches!(
            config.command,
            Some(Command::Login { ref username, .. }) if username == "user1"
        ));
    }

    #[test]
    fn overlap_shorter_than_access_ttl() {
        let err = parse("access_token_ttl = 900\nkey_overlap = 600\n")
            .unwrap_err();
        assert!(err.to_string().contains("key_overlap"));
    }

    #[test]
    fn rejects_invalid_values() {
        for content in [
            "access_token_ttl = 0",
            "refresh_token_ttl = -1",
            "rotation_interval = 0",
            "key_bits = 1024",
        ] {
            assert!(parse(content).is_err(), "{}", content);
        }
    }
}
