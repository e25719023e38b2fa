//! End-to-end flows through the service layer against PostgreSQL.

mod helpers;

use ekameti_backend::error::AppError;
use ekameti_backend::gateway;
use ekameti_backend::models::*;
use ekameti_backend::repositories::KametiChanges;
use ekameti_backend::risk::RiskTier;
use ekameti_backend::services::auth_service::Registration;
use ekameti_backend::services::dispute_service::NewDispute;
use ekameti_backend::services::kameti_service::NewKameti;
use ekameti_backend::services::loan_service::NewLoan;
use ekameti_backend::AppState;
use helpers::*;
use rust_decimal::Decimal;
use sqlx::PgPool;
use std::sync::Arc;

async fn register(state: &AppState, name: &str, email: &str) -> User {
    state
        .auth
        .register(Registration {
            full_name: name,
            email,
            password: TEST_PASSWORD,
            phone: None,
        })
        .await
        .expect("registration should succeed")
}

/// Pay the current round through the sandbox gateway and a signed callback
async fn pay_via_gateway(state: &Arc<AppState>, kameti_id: uuid::Uuid, payer: &User) -> Payment {
    let initiated = state
        .payments
        .initiate(kameti_id, payer, PaymentMethod::Gateway)
        .await
        .expect("initiate should succeed");
    assert!(initiated.redirect_url.is_some());

    let reference = initiated
        .payment
        .gateway_reference
        .clone()
        .expect("gateway payments carry a reference");
    let body = serde_json::json!({
        "reference": reference,
        "status": "succeeded",
        "amount": initiated.payment.amount.to_string(),
    })
    .to_string();
    let signature = gateway::sign(&state.config.gateway.secret, body.as_bytes());

    state
        .payments
        .handle_callback(body.as_bytes(), Some(&signature))
        .await
        .expect("signed callback should be accepted")
}

/// Complete flow: register -> create -> join -> start -> pay -> release, to completion
#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn test_complete_rotation(pool: PgPool) {
    let scratch = tempfile::tempdir().unwrap();
    let state = test_state(pool, scratch.path());

    // Step 1: Accounts and login
    let admin = register(&state, "Ayesha Khan", "ayesha@ekameti.test").await;
    let bilal = register(&state, "Bilal Ahmed", "bilal@ekameti.test").await;
    let sana = register(&state, "Sana Malik", "sana@ekameti.test").await;

    let grant = state.auth.login("AYESHA@ekameti.test", TEST_PASSWORD).await.unwrap();
    let resolved = state.auth.resolve(&grant.token).await.unwrap();
    assert_eq!(resolved.id, admin.id);

    // Step 2: Create and fill the kameti
    let kameti = state
        .kametis
        .create(
            &admin,
            NewKameti {
                name: "Family Kameti",
                description: Some("Monthly family savings"),
                contribution_amount: Decimal::new(10000, 2),
                frequency: Frequency::Monthly,
                max_members: 3,
            },
        )
        .await
        .unwrap();

    state.kametis.join(kameti.id, &bilal).await.unwrap();
    state.kametis.join(kameti.id, &sana).await.unwrap();
    assert!(matches!(
        state.kametis.join(kameti.id, &sana).await,
        Err(AppError::Conflict(_))
    ));

    // Only the admin may start it
    assert!(matches!(
        state.kametis.start(kameti.id, &bilal).await,
        Err(AppError::Forbidden(_))
    ));
    let started = state.kametis.start(kameti.id, &admin).await.unwrap();
    assert_eq!(started.status_enum(), KametiStatus::Active);
    assert_eq!(started.total_rounds, 3);

    // Step 3: Three rounds of contributions and payouts
    let everyone = [&admin, &bilal, &sana];
    for round in 1..=3 {
        for payer in everyone {
            let payment = pay_via_gateway(&state, kameti.id, payer).await;
            assert_eq!(payment.status_enum(), PaymentStatus::Completed);
            assert_eq!(payment.round, round);
        }

        let status = state.kametis.round_status(kameti.id, &bilal).await;
        if round < 3 {
            let status = status.unwrap();
            assert!(status.readiness.ready);
            assert_eq!(status.payout_amount, Decimal::new(30000, 2));
        }

        let payout = state.payouts.release(kameti.id, &admin).await.unwrap();
        assert_eq!(payout.round, round);
        assert_eq!(payout.amount, Decimal::new(30000, 2));
        assert_eq!(payout.recipient_id, everyone[(round - 1) as usize].id);
    }

    // Step 4: The kameti is closed
    let detail = state.kametis.get(kameti.id, &sana).await.unwrap();
    assert_eq!(detail.kameti.status_enum(), KametiStatus::Completed);
    assert!(detail.members.iter().all(|m| m.has_received_payout));

    let payouts = state.payouts.list(kameti.id, &bilal).await.unwrap();
    assert_eq!(payouts.len(), 3);

    // Members heard about every payout
    let unread = state.notifications.unread_count(sana.id).await.unwrap();
    assert!(unread >= 3);

    // Every on-time contribution counts toward the score
    let score = state.risk.score_for(&sana).await.unwrap();
    assert_eq!(score.inputs.payments_on_time, 3);
    assert_eq!(score.tier, RiskTier::Medium);

    // The audit trail recorded contributions and payouts
    let trail = std::fs::read_to_string(
        std::fs::read_dir(scratch.path().join("audit"))
            .unwrap()
            .next()
            .unwrap()
            .unwrap()
            .path(),
    )
    .unwrap();
    assert_eq!(trail.matches("\"payment_completed\"").count(), 9);
    assert_eq!(trail.matches("\"payout_released\"").count(), 3);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn test_callback_rules(pool: PgPool) {
    let scratch = tempfile::tempdir().unwrap();
    let state = test_state(pool, scratch.path());

    let admin = register(&state, "Admin", "admin1@ekameti.test").await;
    let member = register(&state, "Member", "member1@ekameti.test").await;
    let kameti = state
        .kametis
        .create(
            &admin,
            NewKameti {
                name: "Callbacks",
                description: None,
                contribution_amount: Decimal::new(5000, 2),
                frequency: Frequency::Weekly,
                max_members: 5,
            },
        )
        .await
        .unwrap();
    state.kametis.join(kameti.id, &member).await.unwrap();

    // Nothing to pay before the kameti starts
    assert!(matches!(
        state.payments.initiate(kameti.id, &member, PaymentMethod::Gateway).await,
        Err(AppError::BusinessLogic(_))
    ));
    state.kametis.start(kameti.id, &admin).await.unwrap();

    let initiated = state
        .payments
        .initiate(kameti.id, &member, PaymentMethod::Gateway)
        .await
        .unwrap();
    let reference = initiated.payment.gateway_reference.clone().unwrap();

    // Bad signature is refused
    let body = serde_json::json!({
        "reference": reference,
        "status": "succeeded",
        "amount": "50.00",
    })
    .to_string();
    assert!(matches!(
        state.payments.handle_callback(body.as_bytes(), Some("deadbeef")).await,
        Err(AppError::Unauthorized(_))
    ));
    assert!(matches!(
        state.payments.handle_callback(body.as_bytes(), None).await,
        Err(AppError::Unauthorized(_))
    ));

    // Wrong amount fails the payment
    let short = serde_json::json!({
        "reference": reference,
        "status": "succeeded",
        "amount": "10.00",
    })
    .to_string();
    let signature = gateway::sign(&state.config.gateway.secret, short.as_bytes());
    let failed = state
        .payments
        .handle_callback(short.as_bytes(), Some(&signature))
        .await
        .unwrap();
    assert_eq!(failed.status_enum(), PaymentStatus::Failed);

    // A fresh attempt succeeds, and a replayed callback changes nothing
    let paid = pay_via_gateway(&state, kameti.id, &member).await;
    let body = serde_json::json!({
        "reference": paid.gateway_reference.clone().unwrap(),
        "status": "succeeded",
        "amount": paid.amount.to_string(),
    })
    .to_string();
    let signature = gateway::sign(&state.config.gateway.secret, body.as_bytes());
    let replay = state
        .payments
        .handle_callback(body.as_bytes(), Some(&signature))
        .await
        .unwrap();
    assert_eq!(replay.id, paid.id);
    assert_eq!(replay.status_enum(), PaymentStatus::Completed);

    // Already paid for this round
    assert!(matches!(
        state.payments.initiate(kameti.id, &member, PaymentMethod::Gateway).await,
        Err(AppError::Conflict(_))
    ));

    // Admin has not paid, so the round is not ready
    assert!(matches!(
        state.payouts.release(kameti.id, &admin).await,
        Err(AppError::BusinessLogic(_))
    ));
}

/// A second checkout for an already paid round is failed, not left pending
#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn test_late_callback_for_paid_round(pool: PgPool) {
    let scratch = tempfile::tempdir().unwrap();
    let state = test_state(pool, scratch.path());

    let admin = register(&state, "Admin", "admin5@ekameti.test").await;
    let member = register(&state, "Member", "member5@ekameti.test").await;
    let kameti = state
        .kametis
        .create(
            &admin,
            NewKameti {
                name: "Double checkout",
                description: None,
                contribution_amount: Decimal::new(4000, 2),
                frequency: Frequency::Monthly,
                max_members: 3,
            },
        )
        .await
        .unwrap();
    state.kametis.join(kameti.id, &member).await.unwrap();
    state.kametis.start(kameti.id, &admin).await.unwrap();

    // Two checkouts opened before either settles
    let first = state
        .payments
        .initiate(kameti.id, &member, PaymentMethod::Gateway)
        .await
        .unwrap();
    let second = state
        .payments
        .initiate(kameti.id, &member, PaymentMethod::Gateway)
        .await
        .unwrap();

    let succeed = |payment: &Payment| {
        let body = serde_json::json!({
            "reference": payment.gateway_reference.clone().unwrap(),
            "status": "succeeded",
            "amount": payment.amount.to_string(),
        })
        .to_string();
        let signature = gateway::sign(&state.config.gateway.secret, body.as_bytes());
        (body, signature)
    };

    let (body, signature) = succeed(&second.payment);
    let completed = state
        .payments
        .handle_callback(body.as_bytes(), Some(&signature))
        .await
        .unwrap();
    assert_eq!(completed.status_enum(), PaymentStatus::Completed);

    let (body, signature) = succeed(&first.payment);
    let late = state
        .payments
        .handle_callback(body.as_bytes(), Some(&signature))
        .await
        .unwrap();
    assert_eq!(late.id, first.payment.id);
    assert_eq!(late.status_enum(), PaymentStatus::Failed);

    let round_one = state.payments.list(kameti.id, &admin, Some(1)).await.unwrap();
    let completed_count = round_one
        .iter()
        .filter(|p| p.user_id == member.id && p.status_enum() == PaymentStatus::Completed)
        .count();
    assert_eq!(completed_count, 1);

    // Receipts belong to manual payments only
    let third = state
        .payments
        .initiate(kameti.id, &admin, PaymentMethod::Gateway)
        .await
        .unwrap();
    assert!(matches!(
        state
            .payments
            .submit_receipt(third.payment.id, &admin, "receipt.png", b"png")
            .await,
        Err(AppError::BusinessLogic(_))
    ));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn test_manual_receipt_flow(pool: PgPool) {
    let scratch = tempfile::tempdir().unwrap();
    let state = test_state(pool, scratch.path());

    let admin = register(&state, "Admin", "admin2@ekameti.test").await;
    let member = register(&state, "Member", "member2@ekameti.test").await;
    let kameti = state
        .kametis
        .create(
            &admin,
            NewKameti {
                name: "Receipts",
                description: None,
                contribution_amount: Decimal::new(2000, 2),
                frequency: Frequency::Biweekly,
                max_members: 4,
            },
        )
        .await
        .unwrap();
    state.kametis.join(kameti.id, &member).await.unwrap();
    state.kametis.start(kameti.id, &admin).await.unwrap();

    let initiated = state
        .payments
        .initiate(kameti.id, &member, PaymentMethod::Manual)
        .await
        .unwrap();
    assert!(initiated.redirect_url.is_none());
    let payment_id = initiated.payment.id;

    // Disallowed file types never reach disk
    assert!(matches!(
        state
            .payments
            .submit_receipt(payment_id, &member, "receipt.exe", b"MZ")
            .await,
        Err(AppError::Validation(_))
    ));

    let awaiting = state
        .payments
        .submit_receipt(payment_id, &member, "receipt.png", b"\x89PNG fake")
        .await
        .unwrap();
    assert_eq!(awaiting.status_enum(), PaymentStatus::AwaitingConfirmation);
    assert!(awaiting.receipt_path.is_some());

    // Only the kameti admin reviews receipts
    assert!(matches!(
        state.payments.confirm(payment_id, &member).await,
        Err(AppError::Forbidden(_))
    ));
    let confirmed = state.payments.confirm(payment_id, &admin).await.unwrap();
    assert_eq!(confirmed.status_enum(), PaymentStatus::Completed);

    // Cannot review twice
    assert!(matches!(
        state.payments.reject(payment_id, &admin).await,
        Err(AppError::BusinessLogic(_))
    ));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn test_pending_kameti_management(pool: PgPool) {
    let scratch = tempfile::tempdir().unwrap();
    let state = test_state(pool, scratch.path());

    let admin = register(&state, "Admin", "admin3@ekameti.test").await;
    let member = register(&state, "Member", "member3@ekameti.test").await;
    let kameti = state
        .kametis
        .create(
            &admin,
            NewKameti {
                name: "Editable",
                description: None,
                contribution_amount: Decimal::new(100, 0),
                frequency: Frequency::Monthly,
                max_members: 5,
            },
        )
        .await
        .unwrap();
    state.kametis.join(kameti.id, &member).await.unwrap();

    let updated = state
        .kametis
        .update(
            kameti.id,
            &admin,
            KametiChanges {
                name: Some("Renamed"),
                ..KametiChanges::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.name, "Renamed");

    // Cannot shrink below the current roster
    assert!(state
        .kametis
        .update(
            kameti.id,
            &admin,
            KametiChanges {
                max_members: Some(1),
                ..KametiChanges::default()
            },
        )
        .await
        .is_err());

    // The admin cannot leave; members can
    assert!(matches!(
        state.kametis.leave(kameti.id, &admin).await,
        Err(AppError::BusinessLogic(_))
    ));
    state.kametis.leave(kameti.id, &member).await.unwrap();

    let cancelled = state.kametis.cancel(kameti.id, &admin).await.unwrap();
    assert_eq!(cancelled.status_enum(), KametiStatus::Cancelled);
    assert!(state.kametis.cancel(kameti.id, &admin).await.is_err());
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn test_dispute_lifecycle(pool: PgPool) {
    let scratch = tempfile::tempdir().unwrap();
    let state = test_state(pool, scratch.path());

    let admin = register(&state, "Admin", "admin4@ekameti.test").await;
    let raiser = register(&state, "Raiser", "raiser@ekameti.test").await;
    let outsider = register(&state, "Outsider", "outsider@ekameti.test").await;
    let kameti = state
        .kametis
        .create(
            &admin,
            NewKameti {
                name: "Disputes",
                description: None,
                contribution_amount: Decimal::new(100, 0),
                frequency: Frequency::Monthly,
                max_members: 5,
            },
        )
        .await
        .unwrap();
    state.kametis.join(kameti.id, &raiser).await.unwrap();

    let form = NewDispute {
        respondent_id: Some(admin.id),
        subject: "Payout order",
        description: "The order was changed without notice",
    };
    assert!(matches!(
        state.disputes.raise(kameti.id, &outsider, form.clone()).await,
        Err(AppError::Forbidden(_))
    ));
    let dispute = state.disputes.raise(kameti.id, &raiser, form).await.unwrap();

    let edited = state
        .disputes
        .edit(dispute.id, &raiser, Some("Payout order changed"), None)
        .await
        .unwrap();
    assert_eq!(edited.subject, "Payout order changed");

    let with_evidence = state
        .disputes
        .attach_evidence(dispute.id, &raiser, "chat.pdf", b"%PDF-1.4")
        .await
        .unwrap();
    assert!(with_evidence.evidence_path.is_some());

    // Raisers cannot moderate their own dispute
    assert!(matches!(
        state
            .disputes
            .update_status(dispute.id, &raiser, DisputeStatus::Resolved, Some("done"))
            .await,
        Err(AppError::Forbidden(_))
    ));

    // Terminal statuses need a resolution
    assert!(state
        .disputes
        .update_status(dispute.id, &admin, DisputeStatus::Resolved, None)
        .await
        .is_err());

    let reviewing = state
        .disputes
        .update_status(dispute.id, &admin, DisputeStatus::UnderReview, None)
        .await
        .unwrap();
    assert_eq!(reviewing.status_enum(), DisputeStatus::UnderReview);

    let rejected = state
        .disputes
        .update_status(dispute.id, &admin, DisputeStatus::Rejected, Some("No change was made"))
        .await
        .unwrap();
    assert_eq!(rejected.status_enum(), DisputeStatus::Rejected);

    // Closed disputes are frozen
    assert!(state.disputes.delete(dispute.id, &raiser).await.is_err());
    assert!(state
        .disputes
        .attach_evidence(dispute.id, &raiser, "more.png", b"png")
        .await
        .is_err());
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn test_loan_lifecycle(pool: PgPool) {
    let scratch = tempfile::tempdir().unwrap();
    let state = test_state(pool, scratch.path());

    let borrower = register(&state, "Borrower", "borrower@ekameti.test").await;
    let lender = register(&state, "Lender", "lender@ekameti.test").await;

    let loan = state
        .loans
        .request(
            &borrower,
            NewLoan {
                amount: Decimal::new(500, 0),
                interest_rate: Decimal::new(5, 0),
                term_days: 60,
                purpose: "Shop inventory",
            },
        )
        .await
        .unwrap();

    // One live loan at a time
    assert!(matches!(
        state
            .loans
            .request(
                &borrower,
                NewLoan {
                    amount: Decimal::new(100, 0),
                    interest_rate: Decimal::ZERO,
                    term_days: 30,
                    purpose: "Second loan",
                },
            )
            .await,
        Err(AppError::Conflict(_))
    ));

    // Borrowers cannot fund themselves
    assert!(state.loans.pledge(loan.id, &borrower, Decimal::new(100, 0)).await.is_err());

    // Sub-cent amounts would be rounded by the NUMERIC(14,2) columns
    assert!(matches!(
        state.loans.pledge(loan.id, &lender, Decimal::new(499995, 3)).await,
        Err(AppError::Validation(_))
    ));

    let funded = state
        .loans
        .pledge(loan.id, &lender, Decimal::new(500, 0))
        .await
        .unwrap();
    assert_eq!(funded.status_enum(), LoanStatus::Funded);

    let detail = state.loans.get(loan.id).await.unwrap();
    assert_eq!(detail.total_due, Decimal::new(525, 0));
    assert!(!detail.overdue);
    assert_eq!(detail.pledges.len(), 1);

    // Cannot overpay
    assert!(state
        .loans
        .repay(loan.id, &borrower, Decimal::new(600, 0))
        .await
        .is_err());

    assert!(matches!(
        state.loans.repay(loan.id, &borrower, Decimal::new(524995, 3)).await,
        Err(AppError::Validation(_))
    ));

    let partly = state
        .loans
        .repay(loan.id, &borrower, Decimal::new(25, 0))
        .await
        .unwrap();
    assert_eq!(partly.status_enum(), LoanStatus::Funded);

    let repaid = state
        .loans
        .repay(loan.id, &borrower, Decimal::new(500, 0))
        .await
        .unwrap();
    assert_eq!(repaid.status_enum(), LoanStatus::Repaid);

    let mine = state.loans.list_mine(&lender).await.unwrap();
    assert_eq!(mine.pledged.len(), 1);
    assert!(mine.borrowed.is_empty());
}
