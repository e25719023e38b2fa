pub mod access;
pub mod audit;
pub mod auth_service;
pub mod dispute_service;
pub mod kameti_service;
pub mod loan_service;
pub mod notification_service;
pub mod payment_service;
pub mod payout_service;
pub mod reminders;
pub mod risk_service;

pub use audit::AuditTrailService;
pub use auth_service::AuthService;
pub use dispute_service::DisputeService;
pub use kameti_service::KametiService;
pub use loan_service::LoanService;
pub use notification_service::NotificationService;
pub use payment_service::PaymentService;
pub use payout_service::PayoutService;
pub use reminders::ReminderTask;
pub use risk_service::RiskService;
