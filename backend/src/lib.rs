//! eKameti Backend Library
//!
//! This module exposes the backend components for use by tests and other consumers.

pub mod api;
pub mod auth;
pub mod config;
pub mod database;
pub mod error;
pub mod gateway;
pub mod models;
pub mod repositories;
pub mod risk;
pub mod rotation;
pub mod services;
pub mod uploads;
pub mod websocket;

// Re-export commonly used types
pub use config::AppConfig;
pub use error::{AppError, AppResult};

use database::Database;
use repositories::*;
use services::payment_service::GatewaySettings;
use services::{
    AuditTrailService, AuthService, DisputeService, KametiService, LoanService,
    NotificationService, PaymentService, PayoutService, ReminderTask, RiskService,
};
use std::sync::Arc;
use std::time::Duration;
use uploads::UploadStore;
use websocket::WebSocketServer;

/// Application state containing all repositories and services
pub struct AppState {
    pub config: AppConfig,
    pub database: Database,
    pub user_repo: Arc<UserRepository>,
    pub session_repo: Arc<SessionRepository>,
    pub kameti_repo: Arc<KametiRepository>,
    pub member_repo: Arc<KametiMemberRepository>,
    pub payment_repo: Arc<PaymentRepository>,
    pub payout_repo: Arc<PayoutRepository>,
    pub dispute_repo: Arc<DisputeRepository>,
    pub loan_repo: Arc<LoanRepository>,
    pub notification_repo: Arc<NotificationRepository>,
    pub auth: Arc<AuthService>,
    pub kametis: Arc<KametiService>,
    pub payments: Arc<PaymentService>,
    pub payouts: Arc<PayoutService>,
    pub disputes: Arc<DisputeService>,
    pub loans: Arc<LoanService>,
    pub risk: Arc<RiskService>,
    pub notifications: Arc<NotificationService>,
    pub ws_server: Arc<WebSocketServer>,
}

impl AppState {
    /// Wire repositories and services over one pool
    pub fn new(pool: sqlx::PgPool, config: AppConfig) -> AppResult<Self> {
        let database = Database::new(pool.clone());

        let user_repo = Arc::new(UserRepository::new(pool.clone()));
        let session_repo = Arc::new(SessionRepository::new(pool.clone()));
        let kameti_repo = Arc::new(KametiRepository::new(pool.clone()));
        let member_repo = Arc::new(KametiMemberRepository::new(pool.clone()));
        let payment_repo = Arc::new(PaymentRepository::new(pool.clone()));
        let payout_repo = Arc::new(PayoutRepository::new(pool.clone()));
        let dispute_repo = Arc::new(DisputeRepository::new(pool.clone()));
        let loan_repo = Arc::new(LoanRepository::new(pool.clone()));
        let notification_repo = Arc::new(NotificationRepository::new(pool));

        let auth = Arc::new(AuthService::new(
            user_repo.clone(),
            session_repo.clone(),
            member_repo.clone(),
            config.admin_emails.clone(),
            config.session_ttl(),
        ));

        // Subscriptions are checked against the same sessions as the REST API
        let ws_server = Arc::new(WebSocketServer::new().with_authorizer(auth.clone()));

        let notifications = Arc::new(NotificationService::new(
            notification_repo.clone(),
            ws_server.clone(),
        ));
        let audit = Arc::new(AuditTrailService::new(config.audit_log_dir.clone())?);
        let uploads = UploadStore::new(config.upload_dir.clone(), config.max_upload_bytes);

        let kametis = Arc::new(KametiService::new(
            kameti_repo.clone(),
            member_repo.clone(),
            payout_repo.clone(),
            notifications.clone(),
            ws_server.clone(),
        ));

        let payouts = Arc::new(PayoutService::new(
            kameti_repo.clone(),
            member_repo.clone(),
            payout_repo.clone(),
            notifications.clone(),
            ws_server.clone(),
            audit.clone(),
        ));

        let gateway = GatewaySettings {
            gateway: gateway::build_gateway(&config.gateway),
            secret: config.gateway.secret.clone(),
            return_url: config.gateway.return_url.clone(),
        };

        let payments = Arc::new(PaymentService::new(
            kameti_repo.clone(),
            member_repo.clone(),
            payment_repo.clone(),
            gateway,
            uploads.clone(),
            notifications.clone(),
            audit.clone(),
            payouts.clone(),
            config.auto_release_payouts,
        ));

        let disputes = Arc::new(DisputeService::new(
            dispute_repo.clone(),
            kameti_repo.clone(),
            member_repo.clone(),
            uploads,
            notifications.clone(),
            audit.clone(),
        ));

        let risk = Arc::new(RiskService::new(
            user_repo.clone(),
            kameti_repo.clone(),
            member_repo.clone(),
            payment_repo.clone(),
            loan_repo.clone(),
            dispute_repo.clone(),
        ));

        let loans = Arc::new(LoanService::new(
            loan_repo.clone(),
            risk.clone(),
            notifications.clone(),
            audit,
        ));

        Ok(Self {
            config,
            database,
            user_repo,
            session_repo,
            kameti_repo,
            member_repo,
            payment_repo,
            payout_repo,
            dispute_repo,
            loan_repo,
            notification_repo,
            auth,
            kametis,
            payments,
            payouts,
            disputes,
            loans,
            risk,
            notifications,
            ws_server,
        })
    }

    /// Background sweep sharing this state's repositories
    pub fn reminder_task(&self) -> ReminderTask {
        ReminderTask::new(
            self.kameti_repo.clone(),
            self.payment_repo.clone(),
            self.loan_repo.clone(),
            self.session_repo.clone(),
            self.notifications.clone(),
        )
        .with_interval(Duration::from_secs(self.config.reminder_interval_secs))
        .with_lead_days(self.config.reminder_lead_days)
    }
}
