use anyhow::{Context, Result};
use config::{Config, Environment};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub base_url: String,
    pub db_path: String,
    pub concurrency: usize,
    pub email: Option<String>,
    pub password: Option<String>,
}

impl Settings {
    /// Defaults overlaid with `MARCELLUS_*` environment variables.
    pub fn load() -> Result<Self> {
        Self::from_env(Environment::with_prefix("MARCELLUS"))
    }

    fn from_env(env: Environment) -> Result<Self> {
        Config::builder()
            .set_default("base_url", "http://www.marcellusgas.org")?
            .set_default("db_path", "data/marcellus.sqlite")?
            .set_default("concurrency", 8)?
            .add_source(env)
            .build()
            .context("Failed to build settings")?
            .try_deserialize()
            .context("Invalid MARCELLUS_* settings")
    }

    /// Login credentials; only network commands need them.
    pub fn credentials(&self) -> Result<(&str, &str)> {
        match (self.email.as_deref(), self.password.as_deref()) {
            (Some(e), Some(p)) if !e.is_empty() && !p.is_empty() => Ok((e, p)),
            _ => anyhow::bail!("MARCELLUS_EMAIL and MARCELLUS_PASSWORD must be set"),
        }
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(vars: &[(&str, &str)]) -> Environment {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Environment::with_prefix("MARCELLUS").source(Some(map))
    }

    #[test]
    fn defaults() {
        let s = Settings::from_env(env(&[])).unwrap();
        assert_eq!(s.base_url, "http://www.marcellusgas.org");
        assert_eq!(s.db_path, "data/marcellus.sqlite");
        assert_eq!(s.concurrency, 8);
        assert!(s.credentials().is_err());
    }

    #[test]
    fn env_overrides() {
        let s = Settings::from_env(env(&[
            ("MARCELLUS_DB_PATH", "/tmp/m.sqlite"),
            ("MARCELLUS_EMAIL", "a@b.c"),
            ("MARCELLUS_PASSWORD", "pw"),
        ]))
        .unwrap();
        assert_eq!(s.db_path, "/tmp/m.sqlite");
        assert_eq!(s.credentials().unwrap(), ("a@b.c", "pw"));
    }
}
