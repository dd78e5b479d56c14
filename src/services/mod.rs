// Order administration
pub mod orders;

// Discount and referral ledgers
pub mod discounts;
pub mod referrals;

// Customer-facing payment flows
pub mod billing;
pub mod checkout;
pub mod coupons;

// CSV downloads
pub mod exports;

// Shipping emails
pub mod notifications;

use std::collections::HashSet;
use uuid::Uuid;

use crate::errors::ServiceError;

/// Upper bound on ids accepted by any bulk operation.
pub const MAX_BULK_IDS: usize = 100;

/// Checks a bulk id list before anything is written: non-empty, at most
/// [`MAX_BULK_IDS`] entries. Duplicates are dropped, first occurrence wins.
pub fn validate_bulk_ids(ids: &[Uuid]) -> Result<Vec<Uuid>, ServiceError> {
    if ids.is_empty() {
        return Err(ServiceError::ValidationError(
            "At least one id is required".to_string(),
        ));
    }
    if ids.len() > MAX_BULK_IDS {
        return Err(ServiceError::ValidationError(format!(
            "Cannot process more than {} items at once",
            MAX_BULK_IDS
        )));
    }

    let mut seen = HashSet::with_capacity(ids.len());
    Ok(ids.iter().copied().filter(|id| seen.insert(*id)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_and_oversized_batches() {
        assert!(validate_bulk_ids(&[]).is_err());

        let too_many: Vec<Uuid> = (0..=MAX_BULK_IDS).map(|_| Uuid::new_v4()).collect();
        let err = validate_bulk_ids(&too_many).unwrap_err();
        assert!(err.to_string().contains("100"));

        let exactly: Vec<Uuid> = (0..MAX_BULK_IDS).map(|_| Uuid::new_v4()).collect();
        assert_eq!(validate_bulk_ids(&exactly).unwrap().len(), MAX_BULK_IDS);
    }

    #[test]
    fn drops_duplicates_in_order() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        assert_eq!(validate_bulk_ids(&[a, b, a]).unwrap(), vec![a, b]);
    }
}
