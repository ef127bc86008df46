use std::env;

use cyberops_application::DispatchPolicy;
use cyberops_core::{AppError, AppResult};
use cyberops_domain::{EmailAddress, RoleName, SelfServiceRolePolicy, UserId};
use cyberops_infrastructure::SmtpEmailConfig;

#[derive(Debug, Clone)]
pub enum EmailProviderConfig {
    Console,
    Smtp(SmtpEmailConfig),
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub migrate_only: bool,
    pub database_url: String,
    pub database_max_connections: u32,
    pub administrators: Vec<EmailAddress>,
    pub self_service_policy: SelfServiceRolePolicy,
    pub email_provider: EmailProviderConfig,
    pub dispatch_policy: DispatchPolicy,
    pub poll_interval_ms: u64,
    pub bootstrap_superadmin: Option<UserId>,
}

impl WorkerConfig {
    pub fn load() -> AppResult<Self> {
        let migrate_only = env::args().nth(1).as_deref() == Some("migrate");
        Self::from_lookup(migrate_only, |name| env::var(name).ok())
    }

    fn from_lookup(
        migrate_only: bool,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> AppResult<Self> {
        let env = EnvReader { lookup };

        let database_url = env.required("DATABASE_URL")?;
        let database_max_connections = env.parse_or("DATABASE_MAX_CONNECTIONS", 5_u32)?;

        let administrators = env
            .required("ADMIN_NOTIFICATION_EMAILS")?
            .split(',')
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(EmailAddress::new)
            .collect::<AppResult<Vec<_>>>()?;
        if administrators.is_empty() {
            return Err(AppError::Validation(
                "ADMIN_NOTIFICATION_EMAILS must list at least one address".to_owned(),
            ));
        }

        let self_service_policy = match env.optional("SELF_REQUESTABLE_ROLES") {
            Some(value) => SelfServiceRolePolicy::new(
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|value| !value.is_empty())
                    .map(RoleName::new)
                    .collect::<AppResult<Vec<_>>>()?,
            )
            .map_err(|error| {
                AppError::Validation(format!("invalid SELF_REQUESTABLE_ROLES: {error}"))
            })?,
            None => SelfServiceRolePolicy::default(),
        };

        let email_provider = match env
            .optional("EMAIL_PROVIDER")
            .unwrap_or_else(|| "console".to_owned())
            .as_str()
        {
            "console" => EmailProviderConfig::Console,
            "smtp" => {
                let port = env
                    .required("SMTP_PORT")?
                    .parse::<u16>()
                    .map_err(|error| AppError::Validation(format!("invalid SMTP_PORT: {error}")))?;
                EmailProviderConfig::Smtp(SmtpEmailConfig {
                    host: env.required("SMTP_HOST")?,
                    port,
                    username: env.required("SMTP_USERNAME")?,
                    password: env.required("SMTP_PASSWORD")?,
                    from_address: env.required("SMTP_FROM_ADDRESS")?,
                })
            }
            other => {
                return Err(AppError::Validation(format!(
                    "EMAIL_PROVIDER must be either 'console' or 'smtp', got '{other}'"
                )));
            }
        };

        let defaults = DispatchPolicy::default();
        let dispatch_policy = DispatchPolicy {
            batch_size: env.parse_or("OUTBOX_BATCH_SIZE", defaults.batch_size)?,
            lease_seconds: env.parse_or("OUTBOX_LEASE_SECONDS", defaults.lease_seconds)?,
            max_attempts: env.parse_or("OUTBOX_MAX_ATTEMPTS", defaults.max_attempts)?,
            retry_backoff_seconds: env.parse_or(
                "OUTBOX_RETRY_BACKOFF_SECONDS",
                defaults.retry_backoff_seconds,
            )?,
        };
        let poll_interval_ms = env.parse_or("OUTBOX_POLL_INTERVAL_MS", 2000_u64)?;

        if database_max_connections == 0 {
            return Err(AppError::Validation(
                "DATABASE_MAX_CONNECTIONS must be greater than zero".to_owned(),
            ));
        }

        if poll_interval_ms == 0 {
            return Err(AppError::Validation(
                "OUTBOX_POLL_INTERVAL_MS must be greater than zero".to_owned(),
            ));
        }

        let bootstrap_superadmin = env
            .optional("BOOTSTRAP_SUPERADMIN_USER_ID")
            .map(|value| {
                value.parse::<UserId>().map_err(|error| {
                    AppError::Validation(format!("invalid BOOTSTRAP_SUPERADMIN_USER_ID: {error}"))
                })
            })
            .transpose()?;

        Ok(Self {
            migrate_only,
            database_url,
            database_max_connections,
            administrators,
            self_service_policy,
            email_provider,
            dispatch_policy,
            poll_interval_ms,
            bootstrap_superadmin,
        })
    }
}

struct EnvReader<F> {
    lookup: F,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn optional(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|value| !value.trim().is_empty())
    }

    fn required(&self, name: &str) -> AppResult<String> {
        self.optional(name)
            .ok_or_else(|| AppError::Validation(format!("{name} is required")))
    }

    fn parse_or<T>(&self, name: &str, default: T) -> AppResult<T>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        match self.optional(name) {
            Some(value) => value.trim().parse::<T>().map_err(|error| {
                AppError::Validation(format!("invalid {name} value '{value}': {error}"))
            }),
            None => Ok(default),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use cyberops_core::AppError;

    use super::{EmailProviderConfig, WorkerConfig};

    fn load(pairs: &[(&str, &str)]) -> Result<WorkerConfig, AppError> {
        let values: HashMap<String, String> = pairs
            .iter()
            .map(|(name, value)| ((*name).to_owned(), (*value).to_owned()))
            .collect();
        WorkerConfig::from_lookup(false, |name| values.get(name).cloned())
    }

    const BASE: &[(&str, &str)] = &[
        ("DATABASE_URL", "postgres://localhost/cyberops"),
        ("ADMIN_NOTIFICATION_EMAILS", "ops@cyberops.example, lead@cyberops.example"),
    ];

    #[test]
    fn defaults_apply_when_optional_values_are_missing() {
        let config = load(BASE).unwrap_or_else(|error| panic!("config should load: {error}"));

        assert_eq!(config.administrators.len(), 2);
        assert_eq!(config.database_max_connections, 5);
        assert_eq!(config.poll_interval_ms, 2000);
        assert_eq!(config.dispatch_policy.batch_size, 20);
        assert!(matches!(config.email_provider, EmailProviderConfig::Console));
        assert!(config.bootstrap_superadmin.is_none());
        assert_eq!(config.self_service_policy.requestable_roles().len(), 2);
    }

    #[test]
    fn superadmin_cannot_be_made_self_requestable() {
        let mut pairs = BASE.to_vec();
        pairs.push(("SELF_REQUESTABLE_ROLES", "admin,superadmin"));

        assert!(matches!(load(&pairs), Err(AppError::Validation(_))));
    }

    #[test]
    fn smtp_provider_requires_relay_settings() {
        let mut pairs = BASE.to_vec();
        pairs.push(("EMAIL_PROVIDER", "smtp"));
        pairs.push(("SMTP_PORT", "587"));

        let result = load(&pairs);
        assert!(matches!(result, Err(AppError::Validation(message)) if message.contains("SMTP_HOST")));
    }

    #[test]
    fn rejects_invalid_administrator_address() {
        let result = load(&[
            ("DATABASE_URL", "postgres://localhost/cyberops"),
            ("ADMIN_NOTIFICATION_EMAILS", "not-an-address"),
        ]);

        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[test]
    fn parses_bootstrap_superadmin_identifier() {
        let mut pairs = BASE.to_vec();
        pairs.push((
            "BOOTSTRAP_SUPERADMIN_USER_ID",
            "6f0c2f0e-8d7a-4a51-9f3e-2a9cf6a1b001",
        ));

        let config = load(&pairs).unwrap_or_else(|error| panic!("config should load: {error}"));
        assert!(config.bootstrap_superadmin.is_some());
    }
}
