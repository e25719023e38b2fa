use crate::error::{AppError, AppResult};
use crate::models::{Frequency, LoanStatus, User};
use crate::repositories::{
    CompletedContribution, DisputeRepository, KametiMemberRepository, KametiRepository,
    LoanRepository, PaymentRepository, UserRepository,
};
use crate::risk::{self, RiskInputs, RiskScore};
use crate::rotation::schedule;
use chrono::{NaiveDate, NaiveDateTime};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Gathers a user's history and scores it
pub struct RiskService {
    user_repo: Arc<UserRepository>,
    kameti_repo: Arc<KametiRepository>,
    member_repo: Arc<KametiMemberRepository>,
    payment_repo: Arc<PaymentRepository>,
    loan_repo: Arc<LoanRepository>,
    dispute_repo: Arc<DisputeRepository>,
}

impl RiskService {
    pub fn new(
        user_repo: Arc<UserRepository>,
        kameti_repo: Arc<KametiRepository>,
        member_repo: Arc<KametiMemberRepository>,
        payment_repo: Arc<PaymentRepository>,
        loan_repo: Arc<LoanRepository>,
        dispute_repo: Arc<DisputeRepository>,
    ) -> Self {
        Self {
            user_repo,
            kameti_repo,
            member_repo,
            payment_repo,
            loan_repo,
            dispute_repo,
        }
    }

    /// Score for `user`, computed now
    pub async fn score_for(&self, user: &User) -> AppResult<RiskScore> {
        let now = chrono::Utc::now().naive_utc();
        let inputs = self.inputs_for(user, now).await?;
        let result = risk::score(inputs);
        debug!("Risk score for {}: {} ({})", user.id, result.score, result.tier.as_str());
        Ok(result)
    }

    /// Score another user, if the viewer is allowed to see it
    pub async fn score_visible_to(&self, target_id: Uuid, viewer: &User) -> AppResult<RiskScore> {
        let allowed = target_id == viewer.id
            || viewer.is_admin()
            || self.member_repo.share_kameti(viewer.id, target_id).await?;
        if !allowed {
            return Err(AppError::Forbidden(
                "You can only see risk scores of people you share a kameti with".to_string(),
            ));
        }

        let target = self
            .user_repo
            .find_by_id(target_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", target_id)))?;

        self.score_for(&target).await
    }

    async fn inputs_for(&self, user: &User, now: NaiveDateTime) -> AppResult<RiskInputs> {
        let contributions = self.payment_repo.completed_by_user(user.id).await?;
        let (payments_on_time, payments_late) = tally_contributions(&contributions);

        let rounds_missed = self.rounds_missed(user.id, now.date()).await?;

        let loans_repaid = self.loan_repo.count_by_status(user.id, LoanStatus::Repaid).await?;
        let loans_defaulted = self
            .loan_repo
            .count_by_status(user.id, LoanStatus::Defaulted)
            .await?;
        let disputes_lost = self.dispute_repo.count_lost_by_user(user.id).await?;

        Ok(RiskInputs {
            payments_on_time,
            payments_late,
            rounds_missed,
            loans_repaid,
            loans_defaulted,
            disputes_lost,
            account_age_days: user.account_age_days(now),
        })
    }

    /// Active kametis whose current round is past due without the user's contribution
    async fn rounds_missed(&self, user_id: Uuid, today: NaiveDate) -> AppResult<i64> {
        let mut missed = 0;
        for kameti in self.kameti_repo.find_by_member(user_id).await? {
            if !kameti.is_active() {
                continue;
            }
            let Some(start) = kameti.start_date else {
                continue;
            };
            let overdue = schedule::round_due_date(start, kameti.frequency_enum(), kameti.current_round)
                .is_some_and(|due| schedule::is_past_due(today, due));
            if overdue
                && !self
                    .payment_repo
                    .has_completed(kameti.id, user_id, kameti.current_round)
                    .await?
            {
                missed += 1;
            }
        }
        Ok(missed)
    }
}

/// Split completed contributions into (on time, late)
pub fn tally_contributions(contributions: &[CompletedContribution]) -> (i64, i64) {
    contributions.iter().fold((0, 0), |(on_time, late), c| {
        let frequency = Frequency::from_str(&c.frequency).unwrap_or(Frequency::Monthly);
        let due = c
            .start_date
            .and_then(|start| schedule::round_due_date(start, frequency, c.round));

        match due {
            Some(due_on) if schedule::is_late(c.paid_at, due_on) => (on_time, late + 1),
            _ => (on_time + 1, late),
        }
    })
}
