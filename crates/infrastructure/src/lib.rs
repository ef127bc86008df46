//! Infrastructure adapters for the governance ports.

#![forbid(unsafe_code)]

mod console_email_service;
mod in_memory_governance_repository;
mod postgres_governance_repository;
mod smtp_email_service;

pub use console_email_service::ConsoleEmailService;
pub use in_memory_governance_repository::InMemoryGovernanceRepository;
pub use postgres_governance_repository::PostgresGovernanceRepository;
pub use smtp_email_service::{SmtpEmailConfig, SmtpEmailService};
