use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use utoipa::ToSchema;

use crate::errors::ServiceError;

/// Fulfilment state of an order.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "paid")]
    #[serde(alias = "completed")]
    Paid,
    #[sea_orm(string_value = "processing")]
    Processing,
    #[sea_orm(string_value = "shipped")]
    Shipped,
    #[sea_orm(string_value = "delivered")]
    Delivered,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
    #[sea_orm(string_value = "failed")]
    Failed,
    #[sea_orm(string_value = "refunded")]
    Refunded,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 8] = [
        OrderStatus::Pending,
        OrderStatus::Paid,
        OrderStatus::Processing,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
        OrderStatus::Failed,
        OrderStatus::Refunded,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Paid => "paid",
            OrderStatus::Processing => "processing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Failed => "failed",
            OrderStatus::Refunded => "refunded",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(OrderStatus::Pending),
            "paid" | "completed" => Ok(OrderStatus::Paid),
            "processing" => Ok(OrderStatus::Processing),
            "shipped" => Ok(OrderStatus::Shipped),
            "delivered" => Ok(OrderStatus::Delivered),
            "cancelled" | "canceled" => Ok(OrderStatus::Cancelled),
            "failed" => Ok(OrderStatus::Failed),
            "refunded" => Ok(OrderStatus::Refunded),
            other => Err(ServiceError::ValidationError(format!(
                "Invalid status '{}'. Valid statuses are: pending, paid, processing, shipped, delivered, cancelled, failed, refunded",
                other
            ))),
        }
    }
}

/// State of the money attached to an order.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "unpaid")]
    Unpaid,
    #[sea_orm(string_value = "paid")]
    #[serde(alias = "succeeded")]
    Paid,
    #[sea_orm(string_value = "failed")]
    Failed,
    #[sea_orm(string_value = "refunded")]
    Refunded,
    #[sea_orm(string_value = "partial_refund")]
    PartialRefund,
}

impl PaymentStatus {
    pub const ALL: [PaymentStatus; 6] = [
        PaymentStatus::Pending,
        PaymentStatus::Unpaid,
        PaymentStatus::Paid,
        PaymentStatus::Failed,
        PaymentStatus::Refunded,
        PaymentStatus::PartialRefund,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Unpaid => "unpaid",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
            PaymentStatus::PartialRefund => "partial_refund",
        }
    }

    /// Money has been captured and not fully returned.
    pub fn has_captured_funds(&self) -> bool {
        matches!(self, PaymentStatus::Paid | PaymentStatus::PartialRefund)
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(PaymentStatus::Pending),
            "unpaid" => Ok(PaymentStatus::Unpaid),
            "paid" | "succeeded" => Ok(PaymentStatus::Paid),
            "failed" => Ok(PaymentStatus::Failed),
            "refunded" => Ok(PaymentStatus::Refunded),
            "partial_refund" => Ok(PaymentStatus::PartialRefund),
            other => Err(ServiceError::ValidationError(format!(
                "Invalid payment status '{}'",
                other
            ))),
        }
    }
}

/// Whether a (status, payment status) pair is one the storefront expects to
/// see. The pair is not enforced on write: admin overrides may leave the
/// table, and callers log those at warn level.
pub fn is_consistent(status: OrderStatus, payment: PaymentStatus) -> bool {
    use OrderStatus as O;
    use PaymentStatus as P;

    match status {
        O::Pending => matches!(payment, P::Pending | P::Unpaid),
        O::Paid | O::Processing | O::Shipped | O::Delivered => {
            matches!(payment, P::Paid | P::PartialRefund)
        }
        O::Cancelled => true,
        O::Failed => matches!(payment, P::Failed | P::Unpaid | P::Pending),
        O::Refunded => matches!(payment, P::Refunded | P::PartialRefund),
    }
}

/// State written back to an order after the gateway accepted a refund.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefundPlan {
    /// Amount passed to the gateway; `None` asks it to refund the remainder.
    pub gateway_amount: Option<i64>,
    /// Minor units refunded by this request.
    pub amount: i64,
    /// Cumulative refunded amount after this request.
    pub refunded_total: i64,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub full: bool,
}

/// Computes the outcome of refunding `requested` minor units (or the whole
/// remainder when `None`) from an order.
pub fn plan_refund(
    total: i64,
    already_refunded: i64,
    status: OrderStatus,
    payment: PaymentStatus,
    requested: Option<i64>,
) -> Result<RefundPlan, ServiceError> {
    if !payment.has_captured_funds() {
        return Err(ServiceError::ValidationError(format!(
            "Order payment is '{}'; only captured payments can be refunded",
            payment
        )));
    }

    let remaining = total - already_refunded;
    if remaining <= 0 {
        return Err(ServiceError::ValidationError(
            "Order has already been fully refunded".to_string(),
        ));
    }

    let amount = match requested {
        Some(amount) if amount <= 0 => {
            return Err(ServiceError::ValidationError(
                "Refund amount must be greater than zero".to_string(),
            ))
        }
        Some(amount) if amount > remaining => {
            return Err(ServiceError::ValidationError(format!(
                "Refund amount {} exceeds refundable amount {}",
                amount, remaining
            )))
        }
        Some(amount) => amount,
        None => remaining,
    };

    let full = amount == remaining;
    Ok(RefundPlan {
        gateway_amount: requested,
        amount,
        refunded_total: already_refunded + amount,
        status: if full { OrderStatus::Refunded } else { status },
        payment_status: if full {
            PaymentStatus::Refunded
        } else {
            PaymentStatus::PartialRefund
        },
        full,
    })
}
