use crate::error::AppResult;
use crate::models::{Kameti, KametiStatus, NotificationKind};
use crate::repositories::{
    KametiRepository, LoanRepository, NewNotification, PaymentRepository, SessionRepository,
};
use crate::rotation::schedule;
use crate::services::NotificationService;
use chrono::{NaiveDate, NaiveDateTime};
use std::sync::Arc;
use std::time::Duration;
use tokio::time;
use tracing::{error, info, warn};

const PAGE_SIZE: i64 = 200;

/// What one sweep did
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub reminders_sent: usize,
    pub loans_defaulted: usize,
    pub sessions_purged: u64,
    /// Steps that errored; the others still ran
    pub failed_steps: usize,
}

/// Background sweep: contribution reminders, loan defaults and session cleanup
pub struct ReminderTask {
    kameti_repo: Arc<KametiRepository>,
    payment_repo: Arc<PaymentRepository>,
    loan_repo: Arc<LoanRepository>,
    session_repo: Arc<SessionRepository>,
    notifications: Arc<NotificationService>,
    interval: Duration,
    lead_days: i64,
}

impl ReminderTask {
    pub fn new(
        kameti_repo: Arc<KametiRepository>,
        payment_repo: Arc<PaymentRepository>,
        loan_repo: Arc<LoanRepository>,
        session_repo: Arc<SessionRepository>,
        notifications: Arc<NotificationService>,
    ) -> Self {
        Self {
            kameti_repo,
            payment_repo,
            loan_repo,
            session_repo,
            notifications,
            interval: Duration::from_secs(3600),
            lead_days: 2,
        }
    }

    /// Set the time between sweeps
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Remind members this many days before a round is due
    pub fn with_lead_days(mut self, lead_days: i64) -> Self {
        self.lead_days = lead_days;
        self
    }

    /// Run sweeps forever
    pub async fn start(self) {
        let mut interval = time::interval(self.interval);
        info!("Reminder task started, sweeping every {:?}", self.interval);

        loop {
            interval.tick().await;

            let now = chrono::Utc::now().naive_utc();
            let report = self.sweep(now).await;
            if report != SweepReport::default() {
                info!(
                    "Sweep: {} reminders, {} loans defaulted, {} sessions purged, {} steps failed",
                    report.reminders_sent,
                    report.loans_defaulted,
                    report.sessions_purged,
                    report.failed_steps
                );
            }
        }
    }

    /// One pass over every job. A failing step is logged and the rest still run.
    pub async fn sweep(&self, now: NaiveDateTime) -> SweepReport {
        let mut report = SweepReport::default();

        match self.send_due_reminders(now.date()).await {
            Ok(sent) => report.reminders_sent = sent,
            Err(e) => {
                error!("Reminder step failed: {}", e);
                report.failed_steps += 1;
            }
        }

        match self.default_overdue_loans(now).await {
            Ok(defaulted) => report.loans_defaulted = defaulted,
            Err(e) => {
                error!("Loan default step failed: {}", e);
                report.failed_steps += 1;
            }
        }

        match self.session_repo.delete_expired(now).await {
            Ok(purged) => report.sessions_purged = purged,
            Err(e) => {
                error!("Session purge failed: {}", e);
                report.failed_steps += 1;
            }
        }

        report
    }

    async fn send_due_reminders(&self, today: NaiveDate) -> AppResult<usize> {
        let mut sent = 0;
        let mut offset = 0;

        loop {
            let page = self
                .kameti_repo
                .find_by_status(KametiStatus::Active, PAGE_SIZE, offset)
                .await?;
            let page_len = page.len() as i64;

            for kameti in &page {
                match self.remind_kameti(kameti, today).await {
                    Ok(n) => sent += n,
                    Err(e) => warn!("Skipping reminders for kameti {}: {}", kameti.id, e),
                }
            }

            if page_len < PAGE_SIZE {
                break;
            }
            offset += PAGE_SIZE;
        }

        Ok(sent)
    }

    async fn remind_kameti(&self, kameti: &Kameti, today: NaiveDate) -> AppResult<usize> {
        let Some(start) = kameti.start_date else {
            return Ok(0);
        };
        let Some(due_on) =
            schedule::round_due_date(start, kameti.frequency_enum(), kameti.current_round)
        else {
            return Ok(0);
        };
        if !reminder_due(due_on, today, self.lead_days) {
            return Ok(0);
        }

        let message = reminder_message(kameti, due_on, today);
        let mut sent = 0;
        for user_id in self
            .payment_repo
            .unpaid_members(kameti.id, kameti.current_round)
            .await?
        {
            let key = format!("due:{}:{}:{}", kameti.id, kameti.current_round, user_id);
            let note = NewNotification {
                kind: NotificationKind::Reminder,
                title: "Contribution due",
                message: &message,
                reference_id: Some(kameti.id),
            };
            if self.notifications.notify_user_once(user_id, note, &key).await? {
                sent += 1;
            }
        }

        Ok(sent)
    }

    async fn default_overdue_loans(&self, now: NaiveDateTime) -> AppResult<usize> {
        let defaulted = self.loan_repo.mark_overdue_defaulted(now).await?;

        for loan in &defaulted {
            let message = format!(
                "Your loan of {} passed its due date and has been marked as defaulted",
                loan.amount
            );
            self.notifications
                .notify_user(
                    loan.borrower_id,
                    NewNotification {
                        kind: NotificationKind::Loan,
                        title: "Loan defaulted",
                        message: &message,
                        reference_id: Some(loan.id),
                    },
                )
                .await;
        }

        Ok(defaulted.len())
    }
}

/// Remind once the due date is `lead_days` away or already passed
pub fn reminder_due(due_on: NaiveDate, today: NaiveDate, lead_days: i64) -> bool {
    (due_on - today).num_days() <= lead_days
}

fn reminder_message(kameti: &Kameti, due_on: NaiveDate, today: NaiveDate) -> String {
    if due_on < today {
        format!(
            "Your round {} contribution of {} to {} was due on {} and is overdue",
            kameti.current_round, kameti.contribution_amount, kameti.name, due_on
        )
    } else {
        format!(
            "Your round {} contribution of {} to {} is due on {}",
            kameti.current_round, kameti.contribution_amount, kameti.name, due_on
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_reminder_due() {
        let due = date(2024, 3, 10);
        assert!(!reminder_due(due, date(2024, 3, 1), 2));
        assert!(!reminder_due(due, date(2024, 3, 7), 2));
        assert!(reminder_due(due, date(2024, 3, 8), 2));
        assert!(reminder_due(due, date(2024, 3, 10), 2));
        assert!(reminder_due(due, date(2024, 3, 15), 2));
        assert!(reminder_due(due, date(2024, 3, 10), 0));
    }
}
