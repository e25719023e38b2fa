//! Shared lookups, permission checks and money validation used across services

use crate::error::{AppError, AppResult};
use crate::models::{Kameti, User};
use crate::repositories::{KametiMemberRepository, KametiRepository};
use rust_decimal::Decimal;
use uuid::Uuid;

pub async fn load_kameti(repo: &KametiRepository, kameti_id: Uuid) -> AppResult<Kameti> {
    repo.find_by_id(kameti_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Kameti {} not found", kameti_id)))
}

/// Members may look inside a kameti; so may platform admins
pub async fn require_member(
    member_repo: &KametiMemberRepository,
    kameti_id: Uuid,
    user: &User,
) -> AppResult<()> {
    if user.is_admin() || member_repo.is_member(kameti_id, user.id).await? {
        Ok(())
    } else {
        Err(AppError::Forbidden("You are not a member of this kameti".to_string()))
    }
}

/// Only the kameti's own admin may run it
pub fn require_kameti_admin(kameti: &Kameti, user: &User) -> AppResult<()> {
    if kameti.is_admin(user.id) {
        Ok(())
    } else {
        Err(AppError::Forbidden("Only the kameti admin can do this".to_string()))
    }
}

/// Amounts are stored as NUMERIC(14,2); anything finer than a cent would be
/// rounded by Postgres after the checks here have already passed.
pub fn validate_amount(field: &str, amount: Decimal) -> AppResult<()> {
    if amount <= Decimal::ZERO {
        return Err(AppError::Validation(format!("{} must be greater than 0", field)));
    }
    if amount.normalize().scale() > 2 {
        return Err(AppError::Validation(format!(
            "{} cannot have more than 2 decimal places",
            field
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_amount() {
        assert!(validate_amount("amount", Decimal::new(5000, 2)).is_ok());
        assert!(validate_amount("amount", Decimal::new(50000, 3)).is_ok()); // 50.000
        assert!(validate_amount("amount", Decimal::new(1, 2)).is_ok());

        assert!(validate_amount("amount", Decimal::ZERO).is_err());
        assert!(validate_amount("amount", Decimal::new(-1, 0)).is_err());
        assert!(validate_amount("amount", Decimal::new(1099995, 3)).is_err());
        assert!(validate_amount("amount", Decimal::new(99995, 3)).is_err());
    }
}
