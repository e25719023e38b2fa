//! Domain models for the eKameti backend.
//!
//! This module contains all database-backed models representing
//! the core entities of the committee platform.

pub mod dispute;
pub mod kameti;
pub mod kameti_member;
pub mod loan;
pub mod notification;
pub mod payment;
pub mod payout;
pub mod session;
pub mod user;

// Re-export all models for convenient access
pub use dispute::{Dispute, DisputeStatus};
pub use kameti::{Frequency, Kameti, KametiStatus};
pub use kameti_member::{KametiMember, MemberRole, MemberWithUser};
pub use loan::{Loan, LoanStatus, Pledge, PledgeStatus};
pub use notification::{Notification, NotificationKind};
pub use payment::{Payment, PaymentMethod, PaymentStatus};
pub use payout::Payout;
pub use session::Session;
pub use user::{PublicUser, User, UserRole};
