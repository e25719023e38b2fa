use crate::error::{AppError, AppResult};
use crate::models::{Dispute, Loan, Payment, Payout};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

/// Audit log entry, one JSON object per line
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub timestamp: i64,
    pub event_type: String, // "payment_completed", "payout_released", ...
    pub kameti_id: Option<Uuid>,
    pub actor_id: Option<Uuid>,
    pub details: serde_json::Value,
}

/// Append-only trail of money-relevant actions
pub struct AuditTrailService {
    log_file: PathBuf,
    file_handle: Arc<Mutex<std::fs::File>>,
}

impl AuditTrailService {
    /// Open (or create) today's audit file under `log_directory`
    pub fn new(log_directory: PathBuf) -> AppResult<Self> {
        std::fs::create_dir_all(&log_directory)
            .map_err(|e| AppError::Message(format!("Failed to create log directory: {}", e)))?;

        let date = chrono::Utc::now().format("%Y-%m-%d");
        let log_file = log_directory.join(format!("audit_{}.log", date));

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .map_err(|e| AppError::Message(format!("Failed to open audit log file: {}", e)))?;

        info!("Audit trail initialized: {:?}", log_file);

        Ok(Self {
            log_file,
            file_handle: Arc::new(Mutex::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.log_file
    }

    /// Log an audit entry
    pub async fn log(&self, entry: AuditLogEntry) -> AppResult<()> {
        let json = serde_json::to_string(&entry)?;

        let mut file = self.file_handle.lock().await;
        writeln!(file, "{}", json)
            .map_err(|e| AppError::Message(format!("Failed to write audit log: {}", e)))?;

        file.flush()
            .map_err(|e| AppError::Message(format!("Failed to flush audit log: {}", e)))?;

        Ok(())
    }

    /// Contribution marked completed, by the gateway or a kameti admin
    pub async fn log_payment_completed(
        &self,
        payment: &Payment,
        confirmed_by: Option<Uuid>,
    ) -> AppResult<()> {
        let entry = AuditLogEntry {
            timestamp: chrono::Utc::now().timestamp(),
            event_type: "payment_completed".to_string(),
            kameti_id: Some(payment.kameti_id),
            actor_id: confirmed_by,
            details: serde_json::json!({
                "payment_id": payment.id.to_string(),
                "payer_id": payment.user_id.to_string(),
                "round": payment.round,
                "amount": payment.amount.to_string(),
                "method": payment.method,
                "gateway_reference": payment.gateway_reference,
            }),
        };

        self.log(entry).await
    }

    pub async fn log_payout_released(&self, payout: &Payout) -> AppResult<()> {
        let entry = AuditLogEntry {
            timestamp: chrono::Utc::now().timestamp(),
            event_type: "payout_released".to_string(),
            kameti_id: Some(payout.kameti_id),
            actor_id: payout.released_by,
            details: serde_json::json!({
                "payout_id": payout.id.to_string(),
                "round": payout.round,
                "recipient_id": payout.recipient_id.to_string(),
                "amount": payout.amount.to_string(),
                "automatic": payout.released_by.is_none(),
            }),
        };

        self.log(entry).await
    }

    /// Dispute moved to a terminal status
    pub async fn log_dispute_closed(&self, dispute: &Dispute, moderator_id: Uuid) -> AppResult<()> {
        let entry = AuditLogEntry {
            timestamp: chrono::Utc::now().timestamp(),
            event_type: "dispute_closed".to_string(),
            kameti_id: Some(dispute.kameti_id),
            actor_id: Some(moderator_id),
            details: serde_json::json!({
                "dispute_id": dispute.id.to_string(),
                "status": dispute.status,
                "respondent_id": dispute.respondent_id.map(|id| id.to_string()),
                "resolution": dispute.resolution,
            }),
        };

        self.log(entry).await
    }

    pub async fn log_loan_funded(&self, loan: &Loan) -> AppResult<()> {
        let entry = AuditLogEntry {
            timestamp: chrono::Utc::now().timestamp(),
            event_type: "loan_funded".to_string(),
            kameti_id: None,
            actor_id: Some(loan.borrower_id),
            details: serde_json::json!({
                "loan_id": loan.id.to_string(),
                "amount": loan.amount.to_string(),
                "interest_rate": loan.interest_rate.to_string(),
                "due_at": loan.due_at.map(|d| d.to_string()),
            }),
        };

        self.log(entry).await
    }

    pub async fn log_loan_repayment(&self, loan: &Loan, amount: rust_decimal::Decimal) -> AppResult<()> {
        let entry = AuditLogEntry {
            timestamp: chrono::Utc::now().timestamp(),
            event_type: "loan_repayment".to_string(),
            kameti_id: None,
            actor_id: Some(loan.borrower_id),
            details: serde_json::json!({
                "loan_id": loan.id.to_string(),
                "amount": amount.to_string(),
                "repaid_total": loan.repaid_amount.to_string(),
                "status": loan.status,
            }),
        };

        self.log(entry).await
    }
}
