//! CyberOps governance worker: applies migrations, bootstraps the first
//! superadmin, and delivers queued governance notices.

#![forbid(unsafe_code)]

mod config;

use std::sync::Arc;
use std::time::Duration;

use cyberops_application::{
    EmailService, NotificationDispatchService, RoleAssignmentService, RoleRequestService,
};
use cyberops_core::{AppError, AppResult, MutationOutcome};
use cyberops_domain::{Actor, UserId};
use cyberops_infrastructure::{ConsoleEmailService, PostgresGovernanceRepository, SmtpEmailService};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::{EmailProviderConfig, WorkerConfig};

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = WorkerConfig::load()?;
    let pool = connect_and_migrate(&config).await?;

    if config.migrate_only {
        info!("database migrations applied successfully");
        return Ok(());
    }

    let repository = Arc::new(PostgresGovernanceRepository::new(pool));
    let assignments = RoleAssignmentService::new(repository.clone(), repository.clone());
    let requests = RoleRequestService::new(
        repository.clone(),
        repository.clone(),
        repository.clone(),
        config.self_service_policy.clone(),
    );

    if let Some(user_id) = config.bootstrap_superadmin {
        bootstrap_superadmin(&assignments, user_id).await;
    }

    match requests.governance_summary(&Actor::System).await {
        Ok(summary) => info!(
            total_users = summary.total_users,
            total_roles = summary.total_roles,
            total_permissions = summary.total_permissions,
            pending_requests = summary.pending_requests,
            requestable_roles = ?requests
                .requestable_roles()
                .iter()
                .map(|role| role.as_str().to_owned())
                .collect::<Vec<_>>(),
            "governance state loaded"
        ),
        Err(error) => warn!(error = %error, "failed to load governance summary"),
    }

    let dispatcher = NotificationDispatchService::new(
        repository,
        build_email_service(&config.email_provider)?,
        config.administrators.clone(),
        config.dispatch_policy,
    )?;

    info!(
        administrators = config.administrators.len(),
        batch_size = config.dispatch_policy.batch_size,
        lease_seconds = config.dispatch_policy.lease_seconds,
        max_attempts = config.dispatch_policy.max_attempts,
        poll_interval_ms = config.poll_interval_ms,
        "cyberops-worker started"
    );

    run_dispatch_loop(&dispatcher, config.poll_interval_ms).await
}

async fn connect_and_migrate(config: &WorkerConfig) -> AppResult<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(config.database_url.as_str())
        .await
        .map_err(|error| {
            AppError::StorageUnavailable(format!("failed to connect to database: {error}"))
        })?;

    sqlx::migrate!("../../crates/infrastructure/migrations")
        .run(&pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to run migrations: {error}")))?;

    Ok(pool)
}

fn build_email_service(provider: &EmailProviderConfig) -> AppResult<Arc<dyn EmailService>> {
    let service: Arc<dyn EmailService> = match provider {
        EmailProviderConfig::Console => Arc::new(ConsoleEmailService::new()),
        EmailProviderConfig::Smtp(smtp_config) => {
            Arc::new(SmtpEmailService::new(smtp_config.clone())?)
        }
    };

    Ok(service)
}

async fn bootstrap_superadmin(assignments: &RoleAssignmentService, user_id: UserId) {
    let result = assignments.bootstrap_superadmin(user_id).await;
    let outcome = MutationOutcome::from_result(&result, format!("user '{user_id}' is superadmin"));

    match result {
        Ok(change) => info!(
            user_id = %user_id,
            changed = !change.is_noop(),
            message = outcome.message(),
            "superadmin bootstrap applied"
        ),
        Err(AppError::Conflict(_)) => info!(
            user_id = %user_id,
            message = outcome.message(),
            "superadmin bootstrap skipped"
        ),
        Err(_) => warn!(
            user_id = %user_id,
            message = outcome.message(),
            "superadmin bootstrap failed"
        ),
    }
}

async fn run_dispatch_loop(
    dispatcher: &NotificationDispatchService,
    poll_interval_ms: u64,
) -> AppResult<()> {
    loop {
        match dispatcher.dispatch_batch().await {
            Ok(report) if report.claimed == 0 => {}
            Ok(report) => {
                for failure in &report.failures {
                    warn!(
                        notification_id = %failure.notification_id,
                        event_type = failure.event_type,
                        attempts = failure.attempts,
                        outcome = failure.outcome.as_str(),
                        error = %failure.error,
                        "notification delivery failed"
                    );
                }
                info!(
                    claimed = report.claimed,
                    delivered = report.delivered,
                    rescheduled = report.rescheduled,
                    failed = report.failed,
                    unsettled = report.unsettled,
                    "notification batch dispatched"
                );
                if report.claimed >= dispatcher.policy().batch_size {
                    continue;
                }
            }
            Err(error) if error.is_retryable() => {
                warn!(error = %error, "notification outbox unavailable; retrying");
            }
            Err(error) => {
                warn!(error = %error, "notification dispatch failed");
            }
        }

        tokio::time::sleep(Duration::from_millis(poll_interval_ms)).await;
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}
