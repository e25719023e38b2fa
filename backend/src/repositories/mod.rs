pub mod dispute_repository;
pub mod kameti_member_repository;
pub mod kameti_repository;
pub mod loan_repository;
pub mod notification_repository;
pub mod payment_repository;
pub mod payout_repository;
pub mod session_repository;
pub mod user_repository;

// Re-export all repositories for convenient access
pub use dispute_repository::DisputeRepository;
pub use kameti_member_repository::KametiMemberRepository;
pub use kameti_repository::{KametiChanges, KametiRepository};
pub use loan_repository::LoanRepository;
pub use notification_repository::{NewNotification, NotificationRepository};
pub use payment_repository::{CompletedContribution, PaymentRepository};
pub use payout_repository::{PayoutRepository, ReleaseOutcome};
pub use session_repository::SessionRepository;
pub use user_repository::UserRepository;
