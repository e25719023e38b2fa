//! Repository tests against PostgreSQL.
//!
//! Run with `DATABASE_URL` set and `cargo test -- --ignored`.

mod helpers;

use chrono::{Duration, NaiveDate};
use ekameti_backend::error::RepositoryError;
use ekameti_backend::models::*;
use ekameti_backend::repositories::*;
use ekameti_backend::rotation::{PayoutReadiness, RoundAdvance};
use helpers::*;
use rust_decimal::Decimal;
use sqlx::{PgPool, Row};

// ============================================================================
// Migration Tests
// ============================================================================

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn test_migrations_ran(pool: PgPool) {
    let tables = vec![
        "users",
        "sessions",
        "kametis",
        "kameti_members",
        "payments",
        "payouts",
        "disputes",
        "loans",
        "pledges",
        "notifications",
    ];

    for table in tables {
        let row = sqlx::query(
            "SELECT EXISTS (SELECT FROM information_schema.tables WHERE table_name = $1)",
        )
        .bind(table)
        .fetch_one(&pool)
        .await
        .unwrap();

        let exists: bool = row.get(0);
        assert!(exists, "Table {} should exist", table);
    }
}

// ============================================================================
// User & Session Tests
// ============================================================================

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn test_duplicate_email_is_rejected(pool: PgPool) {
    let db = TestDatabase::from_pool(pool);

    db.user_repo
        .create("Ayesha", "ayesha@ekameti.test", None, "hash", UserRole::Member)
        .await
        .unwrap();
    let result = db
        .user_repo
        .create("Other", "ayesha@ekameti.test", None, "hash", UserRole::Member)
        .await;

    assert!(matches!(result, Err(RepositoryError::Duplicate(_))));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn test_expired_sessions_do_not_resolve(pool: PgPool) {
    let db = TestDatabase::from_pool(pool);
    let user = create_test_user(&db, "Bilal").await;
    let now = chrono::Utc::now().naive_utc();

    db.session_repo
        .create("live-hash", user.id, now + Duration::hours(1))
        .await
        .unwrap();
    db.session_repo
        .create("stale-hash", user.id, now - Duration::hours(1))
        .await
        .unwrap();

    let found = db.session_repo.find_user("live-hash", now).await.unwrap();
    assert_eq!(found.map(|u| u.id), Some(user.id));
    assert!(db.session_repo.find_user("stale-hash", now).await.unwrap().is_none());

    let purged = db.session_repo.delete_expired(now).await.unwrap();
    assert_eq!(purged, 1);
}

// ============================================================================
// Kameti Membership Tests
// ============================================================================

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn test_creator_is_enrolled_as_admin(pool: PgPool) {
    let db = TestDatabase::from_pool(pool);
    let admin = create_test_user(&db, "Admin").await;
    let kameti = create_test_kameti(&db, &admin, &[], Decimal::new(5000, 2)).await;

    assert_eq!(kameti.status_enum(), KametiStatus::Pending);
    let members = db.member_repo.find_by_kameti(kameti.id).await.unwrap();
    let member = members
        .iter()
        .find(|m| m.user_id == admin.id)
        .expect("admin should be a member");
    assert!(member.is_admin());
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn test_join_twice_is_a_duplicate(pool: PgPool) {
    let db = TestDatabase::from_pool(pool);
    let admin = create_test_user(&db, "Admin").await;
    let member = create_test_user(&db, "Member").await;
    let kameti = create_test_kameti(&db, &admin, &[&member], Decimal::new(5000, 2)).await;

    let result = db.kameti_repo.join(kameti.id, member.id).await;
    assert!(matches!(result, Err(RepositoryError::Duplicate(_))));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn test_join_respects_capacity(pool: PgPool) {
    let db = TestDatabase::from_pool(pool);
    let admin = create_test_user(&db, "Admin").await;
    let first = create_test_user(&db, "First").await;
    let late = create_test_user(&db, "Late").await;

    let kameti = db
        .kameti_repo
        .create_with_admin("Pair", None, Decimal::new(100, 0), Frequency::Weekly, 2, admin.id)
        .await
        .unwrap();
    db.kameti_repo.join(kameti.id, first.id).await.unwrap();

    let result = db.kameti_repo.join(kameti.id, late.id).await;
    assert!(matches!(result, Err(RepositoryError::BusinessRule(_))));

    // A member re-joining a full kameti is told they are already in it
    let result = db.kameti_repo.join(kameti.id, first.id).await;
    assert!(matches!(result, Err(RepositoryError::Duplicate(_))));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn test_start_assigns_positions_in_join_order(pool: PgPool) {
    let db = TestDatabase::from_pool(pool);
    let admin = create_test_user(&db, "Admin").await;
    let second = create_test_user(&db, "Second").await;
    let third = create_test_user(&db, "Third").await;
    let kameti = create_test_kameti(&db, &admin, &[&second, &third], Decimal::new(100, 0)).await;

    let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    let started = db.kameti_repo.start(kameti.id, start).await.unwrap();

    assert_eq!(started.status_enum(), KametiStatus::Active);
    assert_eq!(started.total_rounds, 3);
    assert_eq!(started.current_round, 1);
    assert_eq!(started.start_date, Some(start));

    let members = db.member_repo.find_by_kameti(kameti.id).await.unwrap();
    let position_of = |id| {
        members
            .iter()
            .find(|m| m.user_id == id)
            .and_then(|m| m.payout_position)
    };
    assert_eq!(position_of(admin.id), Some(1));
    assert_eq!(position_of(second.id), Some(2));
    assert_eq!(position_of(third.id), Some(3));

    // No joining once the rotation runs
    let outsider = create_test_user(&db, "Outsider").await;
    assert!(matches!(
        db.kameti_repo.join(kameti.id, outsider.id).await,
        Err(RepositoryError::BusinessRule(_))
    ));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn test_start_needs_two_members(pool: PgPool) {
    let db = TestDatabase::from_pool(pool);
    let admin = create_test_user(&db, "Admin").await;
    let kameti = create_test_kameti(&db, &admin, &[], Decimal::new(100, 0)).await;

    let today = chrono::Utc::now().date_naive();
    let result = db.kameti_repo.start(kameti.id, today).await;
    assert!(matches!(result, Err(RepositoryError::BusinessRule(_))));
}

// ============================================================================
// Payment & Payout Tests
// ============================================================================

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn test_payment_completes_once(pool: PgPool) {
    let db = TestDatabase::from_pool(pool);
    let admin = create_test_user(&db, "Admin").await;
    let member = create_test_user(&db, "Member").await;
    let kameti = create_test_kameti(&db, &admin, &[&member], Decimal::new(2500, 2)).await;

    let payment = db
        .payment_repo
        .create(kameti.id, member.id, 1, kameti.contribution_amount, PaymentMethod::Gateway)
        .await
        .unwrap();
    assert_eq!(payment.status_enum(), PaymentStatus::Pending);

    let now = chrono::Utc::now().naive_utc();
    let completed = db.payment_repo.complete(payment.id, now).await.unwrap();
    assert!(completed.is_some());
    assert!(db.payment_repo.complete(payment.id, now).await.unwrap().is_none());
    assert!(db.payment_repo.fail(payment.id).await.unwrap().is_none());

    assert!(db.payment_repo.has_completed(kameti.id, member.id, 1).await.unwrap());
    assert!(!db.payment_repo.has_completed(kameti.id, member.id, 2).await.unwrap());
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn test_release_waits_for_every_member(pool: PgPool) {
    let db = TestDatabase::from_pool(pool);
    let admin = create_test_user(&db, "Admin").await;
    let member = create_test_user(&db, "Member").await;
    let kameti = create_test_kameti(&db, &admin, &[&member], Decimal::new(100, 0)).await;
    let today = chrono::Utc::now().date_naive();
    db.kameti_repo.start(kameti.id, today).await.unwrap();

    pay_round(&db, &kameti, 1, &[&admin]).await;

    match db.payout_repo.release_round(kameti.id, Some(admin.id)).await.unwrap() {
        ReleaseOutcome::NotReady(PayoutReadiness { outstanding, ready, .. }) => {
            assert!(!ready);
            assert_eq!(outstanding, vec![member.id]);
        }
        ReleaseOutcome::Released { .. } => panic!("round should not be releasable yet"),
    }

    let payouts = db.payout_repo.find_by_kameti(kameti.id).await.unwrap();
    assert!(payouts.is_empty());
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn test_full_rotation_completes_kameti(pool: PgPool) {
    let db = TestDatabase::from_pool(pool);
    let admin = create_test_user(&db, "Admin").await;
    let member = create_test_user(&db, "Member").await;
    let kameti = create_test_kameti(&db, &admin, &[&member], Decimal::new(100, 0)).await;
    let today = chrono::Utc::now().date_naive();
    db.kameti_repo.start(kameti.id, today).await.unwrap();

    // Round 1 pays the admin
    pay_round(&db, &kameti, 1, &[&admin, &member]).await;
    let (payout, advance) = match db.payout_repo.release_round(kameti.id, Some(admin.id)).await.unwrap() {
        ReleaseOutcome::Released { payout, advance, .. } => (payout, advance),
        ReleaseOutcome::NotReady(r) => panic!("round 1 should be ready: {:?}", r),
    };
    assert_eq!(payout.recipient_id, admin.id);
    assert_eq!(payout.amount, Decimal::new(200, 0));
    assert_eq!(advance, RoundAdvance::Next(2));

    // Releasing again before round 2 is paid is refused
    assert!(matches!(
        db.payout_repo.release_round(kameti.id, None).await.unwrap(),
        ReleaseOutcome::NotReady(_)
    ));

    // Round 2 pays the member and closes the kameti
    pay_round(&db, &kameti, 2, &[&admin, &member]).await;
    let (payout, kameti_after, advance) =
        match db.payout_repo.release_round(kameti.id, None).await.unwrap() {
            ReleaseOutcome::Released { payout, kameti, advance } => (payout, kameti, advance),
            ReleaseOutcome::NotReady(r) => panic!("round 2 should be ready: {:?}", r),
        };
    assert_eq!(payout.recipient_id, member.id);
    assert!(payout.released_by.is_none());
    assert_eq!(advance, RoundAdvance::Completed);
    assert_eq!(kameti_after.status_enum(), KametiStatus::Completed);

    // Completed kametis cannot release again
    assert!(matches!(
        db.payout_repo.release_round(kameti.id, None).await,
        Err(RepositoryError::BusinessRule(_))
    ));

    let members = db.member_repo.find_by_kameti(kameti.id).await.unwrap();
    assert!(members.iter().all(|m| m.has_received_payout));
    assert_eq!(db.payout_repo.find_by_kameti(kameti.id).await.unwrap().len(), 2);
}

// ============================================================================
// Dispute Tests
// ============================================================================

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn test_dispute_status_is_guarded(pool: PgPool) {
    let db = TestDatabase::from_pool(pool);
    let admin = create_test_user(&db, "Admin").await;
    let member = create_test_user(&db, "Member").await;
    let kameti = create_test_kameti(&db, &admin, &[&member], Decimal::new(100, 0)).await;

    let dispute = db
        .dispute_repo
        .create(kameti.id, member.id, Some(admin.id), "Late payout", "Round 1 was late")
        .await
        .unwrap();
    assert!(dispute.is_open());

    let resolved = db
        .dispute_repo
        .update_status(dispute.id, DisputeStatus::Open, DisputeStatus::Resolved, Some("Paid"))
        .await
        .unwrap();
    assert_eq!(resolved.status_enum(), DisputeStatus::Resolved);
    assert!(resolved.resolved_at.is_some());

    // A stale expected status loses
    let stale = db
        .dispute_repo
        .update_status(dispute.id, DisputeStatus::Open, DisputeStatus::Rejected, Some("No"))
        .await;
    assert!(matches!(stale, Err(RepositoryError::BusinessRule(_))));

    assert_eq!(db.dispute_repo.count_lost_by_user(admin.id).await.unwrap(), 1);
    assert!(!db.dispute_repo.delete_open(dispute.id).await.unwrap());
}

// ============================================================================
// Loan Tests
// ============================================================================

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn test_pledges_fund_a_loan(pool: PgPool) {
    let db = TestDatabase::from_pool(pool);
    let borrower = create_test_user(&db, "Borrower").await;
    let lender_a = create_test_user(&db, "LenderA").await;
    let lender_b = create_test_user(&db, "LenderB").await;

    let loan = db
        .loan_repo
        .create(borrower.id, Decimal::new(1000, 0), Decimal::new(10, 0), 30, "School fees")
        .await
        .unwrap();
    let now = chrono::Utc::now().naive_utc();

    let (loan_after, _) = db
        .loan_repo
        .add_pledge(loan.id, lender_a.id, Decimal::new(600, 0), now)
        .await
        .unwrap();
    assert_eq!(loan_after.status_enum(), LoanStatus::Open);
    assert_eq!(loan_after.remaining_to_fund(), Decimal::new(400, 0));

    // More than what is left is refused
    let over = db
        .loan_repo
        .add_pledge(loan.id, lender_b.id, Decimal::new(500, 0), now)
        .await;
    assert!(matches!(over, Err(RepositoryError::InvalidInput(_))));

    let (funded, _) = db
        .loan_repo
        .add_pledge(loan.id, lender_b.id, Decimal::new(400, 0), now)
        .await
        .unwrap();
    assert_eq!(funded.status_enum(), LoanStatus::Funded);
    assert_eq!(funded.due_at, funded.funded_at.map(|at| at + Duration::days(30)));

    let repaid = db
        .loan_repo
        .record_repayment(loan.id, Decimal::new(1100, 0))
        .await
        .unwrap();
    assert_eq!(repaid.status_enum(), LoanStatus::Repaid);
    assert_eq!(
        db.loan_repo.count_by_status(borrower.id, LoanStatus::Repaid).await.unwrap(),
        1
    );
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn test_one_live_loan_per_borrower(pool: PgPool) {
    let db = TestDatabase::from_pool(pool);
    let borrower = create_test_user(&db, "Borrower").await;

    let first = db
        .loan_repo
        .create(borrower.id, Decimal::new(200, 0), Decimal::new(5, 0), 30, "Stock")
        .await
        .unwrap();

    // The schema refuses a second live loan even without the service check
    let second = db
        .loan_repo
        .create(borrower.id, Decimal::new(300, 0), Decimal::new(5, 0), 30, "More stock")
        .await;
    assert!(matches!(second, Err(RepositoryError::Duplicate(_))));

    db.loan_repo.cancel(first.id).await.unwrap();
    db.loan_repo
        .create(borrower.id, Decimal::new(300, 0), Decimal::new(5, 0), 30, "More stock")
        .await
        .unwrap();
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn test_overdue_loans_default(pool: PgPool) {
    let db = TestDatabase::from_pool(pool);
    let borrower = create_test_user(&db, "Borrower").await;
    let lender = create_test_user(&db, "Lender").await;

    let loan = db
        .loan_repo
        .create(borrower.id, Decimal::new(100, 0), Decimal::ZERO, 7, "Rent")
        .await
        .unwrap();
    let funded_at = chrono::Utc::now().naive_utc() - Duration::days(10);
    db.loan_repo
        .add_pledge(loan.id, lender.id, Decimal::new(100, 0), funded_at)
        .await
        .unwrap();

    let defaulted = db
        .loan_repo
        .mark_overdue_defaulted(chrono::Utc::now().naive_utc())
        .await
        .unwrap();
    assert_eq!(defaulted.len(), 1);
    assert_eq!(defaulted[0].status_enum(), LoanStatus::Defaulted);
}

// ============================================================================
// Notification Tests
// ============================================================================

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn test_notification_dedupe_and_read_state(pool: PgPool) {
    let db = TestDatabase::from_pool(pool);
    let user = create_test_user(&db, "Reader").await;
    let note = NewNotification {
        kind: NotificationKind::Reminder,
        title: "Contribution due",
        message: "Round 1 is due soon",
        reference_id: None,
    };

    let first = db.notification_repo.create(user.id, &note, Some("due:k:1:u")).await.unwrap();
    let second = db.notification_repo.create(user.id, &note, Some("due:k:1:u")).await.unwrap();
    assert!(first.is_some());
    assert!(second.is_none());

    assert_eq!(db.notification_repo.unread_count(user.id).await.unwrap(), 1);

    let first = first.unwrap();
    let read = db.notification_repo.mark_read(first.id, user.id).await.unwrap();
    assert!(read.map(|n| n.is_read).unwrap_or(false));
    assert_eq!(db.notification_repo.unread_count(user.id).await.unwrap(), 0);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn test_kameti_fan_out_skips_the_actor(pool: PgPool) {
    let db = TestDatabase::from_pool(pool);
    let admin = create_test_user(&db, "Admin").await;
    let a = create_test_user(&db, "A").await;
    let b = create_test_user(&db, "B").await;
    let kameti = create_test_kameti(&db, &admin, &[&a, &b], Decimal::new(100, 0)).await;

    let note = NewNotification {
        kind: NotificationKind::Kameti,
        title: "Kameti started",
        message: "Round 1 is open",
        reference_id: Some(kameti.id),
    };
    let sent = db
        .notification_repo
        .create_for_kameti_members(kameti.id, &note, Some(admin.id))
        .await
        .unwrap();

    assert_eq!(sent.len(), 2);
    assert!(sent.iter().all(|n| n.user_id != admin.id));
}
