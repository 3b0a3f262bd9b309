use std::str::FromStr;

use campus_core::scheduling::SolverConfig;

use crate::auth::jwt::JwtConfig;

/// A required variable is missing or a value does not parse.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} is invalid: {message}")]
    Invalid { name: &'static str, message: String },
}

/// Read an optional variable, falling back to `default` when unset.
pub(crate) fn env_or<T>(name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            message: e.to_string(),
        }),
        _ => Ok(default),
    }
}

pub(crate) fn env_required(name: &'static str) -> Result<String, ConfigError> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or(ConfigError::Missing(name))
}

/// Token bucket applied per `(tenant, user)` to mutating requests.
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitConfig {
    pub capacity: f64,
    pub refill_per_sec: f64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            capacity: 30.0,
            refill_per_sec: 1.0,
        }
    }
}

/// Size of the email worker pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifyConfig {
    pub workers: usize,
    pub queue: usize,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self { workers: 2, queue: 256 }
    }
}

/// Server configuration loaded from environment variables.
///
/// All fields except `DATABASE_URL` and `JWT_SECRET` have defaults suitable
/// for local development.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Upper bound on draining background services after shutdown starts.
    pub shutdown_timeout_secs: u64,
    /// Postgres URL, or `memory://` for the in-process store.
    pub database_url: String,
    pub jwt: JwtConfig,
    pub rate_limit: RateLimitConfig,
    /// Defaults for auto-scheduler runs that do not carry their own config.
    pub solver: SolverConfig,
    pub notify: NotifyConfig,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                     | Default                 |
    /// |-----------------------------|-------------------------|
    /// | `HOST`                      | `0.0.0.0`               |
    /// | `PORT`                      | `3000`                  |
    /// | `CORS_ORIGINS`              | `http://localhost:5173` |
    /// | `REQUEST_TIMEOUT_SECS`      | `30`                    |
    /// | `SHUTDOWN_TIMEOUT_SECS`     | `30`                    |
    /// | `DATABASE_URL`              | required                |
    /// | `RATE_LIMIT_CAPACITY`       | `30`                    |
    /// | `RATE_LIMIT_REFILL_PER_SEC` | `1.0`                   |
    /// | `SOLVER_TIME_BUDGET_MS`     | `5000`                  |
    /// | `SOLVER_MAX_BACKTRACK`      | `10000`                 |
    /// | `SOLVER_SLOT_MINUTES`       | `90`                    |
    /// | `NOTIFY_WORKERS`            | `2`                     |
    /// | `NOTIFY_QUEUE`              | `256`                   |
    ///
    /// JWT variables are documented on [`JwtConfig::from_env`].
    pub fn from_env() -> Result<Self, ConfigError> {
        let host = env_or("HOST", "0.0.0.0".to_string())?;
        let port = env_or("PORT", 3000u16)?;

        let cors_origins: Vec<String> = env_or("CORS_ORIGINS", "http://localhost:5173".to_string())?
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let rate_limit = RateLimitConfig {
            capacity: env_or("RATE_LIMIT_CAPACITY", 30.0)?,
            refill_per_sec: env_or("RATE_LIMIT_REFILL_PER_SEC", 1.0)?,
        };
        if rate_limit.capacity < 1.0 || rate_limit.refill_per_sec <= 0.0 {
            return Err(ConfigError::Invalid {
                name: "RATE_LIMIT_CAPACITY",
                message: "capacity must be at least 1 and refill positive".into(),
            });
        }

        let defaults = SolverConfig::default();
        let solver = SolverConfig {
            time_budget_ms: env_or("SOLVER_TIME_BUDGET_MS", defaults.time_budget_ms)?,
            max_backtrack: env_or("SOLVER_MAX_BACKTRACK", defaults.max_backtrack)?,
            slot_duration_minutes: env_or("SOLVER_SLOT_MINUTES", defaults.slot_duration_minutes)?,
            ..defaults
        };
        solver.validate().map_err(|e| ConfigError::Invalid {
            name: "SOLVER_SLOT_MINUTES",
            message: e.to_string(),
        })?;

        Ok(Self {
            host,
            port,
            cors_origins,
            request_timeout_secs: env_or("REQUEST_TIMEOUT_SECS", 30)?,
            shutdown_timeout_secs: env_or("SHUTDOWN_TIMEOUT_SECS", 30)?,
            database_url: env_required("DATABASE_URL")?,
            jwt: JwtConfig::from_env()?,
            rate_limit,
            solver,
            notify: NotifyConfig {
                workers: env_or("NOTIFY_WORKERS", 2)?,
                queue: env_or("NOTIFY_QUEUE", 256)?,
            },
        })
    }

    /// True when `DATABASE_URL` selects the in-process store.
    pub fn uses_memory_store(&self) -> bool {
        self.database_url.starts_with("memory://")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Variable names below are unique to these tests so parallel tests in
    // the same process do not observe each other.

    #[test]
    fn unset_variable_uses_default() {
        let port: u16 = env_or("CAMPUS_TEST_UNSET_PORT", 3000).unwrap();
        assert_eq!(port, 3000);
    }

    #[test]
    fn unparsable_variable_is_invalid() {
        std::env::set_var("CAMPUS_TEST_BAD_PORT", "eighty");
        let err = env_or::<u16>("CAMPUS_TEST_BAD_PORT", 3000).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "CAMPUS_TEST_BAD_PORT", .. }));
    }

    #[test]
    fn blank_required_variable_is_missing() {
        std::env::set_var("CAMPUS_TEST_BLANK", "  ");
        let err = env_required("CAMPUS_TEST_BLANK").unwrap_err();
        assert_eq!(err.to_string(), "CAMPUS_TEST_BLANK must be set");
    }

    #[test]
    fn memory_url_selects_memory_store() {
        let config = ServerConfig {
            host: "127.0.0.1".into(),
            port: 0,
            cors_origins: vec![],
            request_timeout_secs: 30,
            shutdown_timeout_secs: 30,
            database_url: "memory://".into(),
            jwt: JwtConfig {
                secret: "s".into(),
                access_token_expiry_mins: 15,
            },
            rate_limit: RateLimitConfig::default(),
            solver: SolverConfig::default(),
            notify: NotifyConfig::default(),
        };
        assert!(config.uses_memory_store());
    }
}
