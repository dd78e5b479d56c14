use std::sync::Arc;

use tracing::{info, instrument};

use crate::{
    errors::ServiceError,
    gateway::{PaymentGateway, PromotionCode, SubscriptionCancellation},
};

/// Admin-side subscription and promotion-code operations, passed straight
/// to the gateway.
#[derive(Clone)]
pub struct BillingService {
    gateway: Arc<dyn PaymentGateway>,
}

impl BillingService {
    pub fn new(gateway: Arc<dyn PaymentGateway>) -> Self {
        Self { gateway }
    }

    /// Schedules cancellation at the end of the current period.
    #[instrument(skip(self))]
    pub async fn cancel_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<SubscriptionCancellation, ServiceError> {
        let cancellation = self
            .gateway
            .cancel_subscription_at_period_end(subscription_id)
            .await?;
        info!(
            status = %cancellation.status,
            period_end = ?cancellation.current_period_end,
            "subscription set to cancel at period end"
        );
        Ok(cancellation)
    }

    #[instrument(skip(self))]
    pub async fn set_promotion_code_active(
        &self,
        promotion_code_id: &str,
        active: bool,
    ) -> Result<PromotionCode, ServiceError> {
        let code = self
            .gateway
            .set_promotion_code_active(promotion_code_id, active)
            .await?;
        info!(code = %code.code, active = code.active, "promotion code updated");
        Ok(code)
    }
}
