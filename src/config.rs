//! Runtime configuration: the five environment variables that describe the
//! backing graph store. Parsed with `std::env` and typed defaults — the
//! surface is five flat scalars, so no config crate is pulled in for it.

use crate::{Error, Result};

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 7687;
const DEFAULT_USERNAME: &str = "neo4j";
const DEFAULT_DATABASE: &str = "neo4j";

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: Option<String>,
    pub database: String,
}

impl Config {
    /// Reads `DB_HOST`, `DB_PORT`, `DB_USERNAME`, `DB_PASSWORD`, `DB_DATABASE`
    /// from the environment, falling back to typed defaults for everything
    /// but `DB_PASSWORD`, which is left unset if absent.
    pub fn from_env() -> Result<Self> {
        let host = std::env::var("DB_HOST").unwrap_or_else(|_| DEFAULT_HOST.to_string());

        let port = match std::env::var("DB_PORT") {
            Ok(raw) => raw.parse().map_err(|_| Error::InvalidInput(format!("DB_PORT is not a valid port: {raw}")))?,
            Err(_) => DEFAULT_PORT,
        };

        let username = std::env::var("DB_USERNAME").unwrap_or_else(|_| DEFAULT_USERNAME.to_string());
        let password = std::env::var("DB_PASSWORD").ok();
        let database = std::env::var("DB_DATABASE").unwrap_or_else(|_| DEFAULT_DATABASE.to_string());

        Ok(Self { host, port, username, password, database })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_unset() {
        for var in ["DB_HOST", "DB_PORT", "DB_USERNAME", "DB_PASSWORD", "DB_DATABASE"] {
            std::env::remove_var(var);
        }
        let config = Config::from_env().unwrap();
        assert_eq!(config.host, DEFAULT_HOST);
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.username, DEFAULT_USERNAME);
        assert_eq!(config.password, None);
        assert_eq!(config.database, DEFAULT_DATABASE);
    }

    #[test]
    fn rejects_non_numeric_port() {
        std::env::set_var("DB_PORT", "not-a-port");
        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        std::env::remove_var("DB_PORT");
    }
}
