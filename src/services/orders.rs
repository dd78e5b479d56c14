use std::sync::Arc;

use chrono::Utc;
use sea_orm::{
    sea_query::{Expr, Func},
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, Condition, DatabaseConnection, EntityTrait,
    QueryFilter, QueryOrder, QuerySelect, TransactionTrait,
};
use serde::Serialize;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    entities::order::{self, Entity as OrderEntity, Model as OrderModel},
    errors::ServiceError,
    gateway::{PaymentGateway, RefundReceipt},
    models::order::{is_consistent, plan_refund, OrderStatus, PaymentStatus},
    services::notifications::{DeliveryHandle, ShippingEmail, ShippingNotifier},
    services::validate_bulk_ids,
};

pub const DEFAULT_ORDER_LIMIT: u64 = 50;
/// Also the row cap for CSV exports.
pub const MAX_ORDER_LIMIT: u64 = 10_000;

#[derive(Debug, Clone, Default)]
pub struct OrderFilters {
    pub status: Option<OrderStatus>,
    pub payment_status: Option<PaymentStatus>,
    /// Case-insensitive substring of the customer email or session id
    pub search: Option<String>,
    pub limit: Option<u64>,
}

impl OrderFilters {
    pub fn effective_limit(&self) -> u64 {
        self.limit
            .unwrap_or(DEFAULT_ORDER_LIMIT)
            .clamp(1, MAX_ORDER_LIMIT)
    }
}

/// Result of a bulk status change.
#[derive(Debug)]
pub struct BulkStatusOutcome {
    pub updated: u64,
    /// One handle per shipping email accepted by the queue
    pub notifications: Vec<DeliveryHandle>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RefundOutcome {
    pub order: OrderModel,
    pub refund: RefundReceipt,
    pub amount: i64,
    pub full: bool,
}

#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    gateway: Arc<dyn PaymentGateway>,
    notifier: ShippingNotifier,
}

impl OrderService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        gateway: Arc<dyn PaymentGateway>,
        notifier: ShippingNotifier,
    ) -> Self {
        Self {
            db,
            gateway,
            notifier,
        }
    }

    /// Newest first.
    #[instrument(skip(self))]
    pub async fn list_orders(&self, filters: &OrderFilters) -> Result<Vec<OrderModel>, ServiceError> {
        let mut query = OrderEntity::find();

        if let Some(status) = filters.status {
            query = query.filter(order::Column::Status.eq(status));
        }
        if let Some(payment_status) = filters.payment_status {
            query = query.filter(order::Column::PaymentStatus.eq(payment_status));
        }
        if let Some(search) = filters
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            let pattern = format!("%{}%", search.to_lowercase());
            query = query.filter(
                Condition::any()
                    .add(
                        Expr::expr(Func::lower(Expr::col(order::Column::CustomerEmail)))
                            .like(pattern.clone()),
                    )
                    .add(
                        Expr::expr(Func::lower(Expr::col(order::Column::StripeSessionId)))
                            .like(pattern),
                    ),
            );
        }

        let orders = query
            .order_by_desc(order::Column::CreatedAt)
            .limit(filters.effective_limit())
            .all(&*self.db)
            .await?;

        Ok(orders)
    }

    pub async fn get_order(&self, order_id: Uuid) -> Result<OrderModel, ServiceError> {
        OrderEntity::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))
    }

    /// Sets the fulfilment status of one order. The status text is checked
    /// against the closed set before the order is read.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn update_status(&self, order_id: Uuid, status: &str) -> Result<OrderModel, ServiceError> {
        let new_status: OrderStatus = status.parse()?;

        let order = self.get_order(order_id).await?;
        let old_status = order.status;
        if !is_consistent(new_status, order.payment_status) {
            warn!(
                status = %new_status,
                payment_status = %order.payment_status,
                "order status does not match payment status"
            );
        }

        let mut active: order::ActiveModel = order.into();
        active.status = Set(new_status);
        active.updated_at = Set(Utc::now());
        let updated = active.update(&*self.db).await?;

        info!(from = %old_status, to = %new_status, "order status updated");
        Ok(updated)
    }

    /// Sets one status on up to 100 orders. Moving orders to `shipped` queues
    /// a shipping email for each order that was not already shipped and has a
    /// customer email; queueing problems never fail the update.
    #[instrument(skip(self, ids), fields(count = ids.len(), status = %status))]
    pub async fn bulk_update_status(
        &self,
        ids: &[Uuid],
        status: &str,
    ) -> Result<BulkStatusOutcome, ServiceError> {
        let ids = validate_bulk_ids(ids)?;
        let new_status: OrderStatus = status.parse()?;

        let txn = self.db.begin().await?;

        let existing = OrderEntity::find()
            .filter(order::Column::Id.is_in(ids.clone()))
            .all(&txn)
            .await?;

        for order in &existing {
            if !is_consistent(new_status, order.payment_status) {
                warn!(
                    order_id = %order.id,
                    payment_status = %order.payment_status,
                    "bulk status does not match payment status"
                );
            }
        }

        let result = OrderEntity::update_many()
            .col_expr(order::Column::Status, Expr::value(new_status))
            .col_expr(order::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(order::Column::Id.is_in(ids))
            .exec(&txn)
            .await?;

        txn.commit().await?;

        let notifications = if new_status == OrderStatus::Shipped {
            self.queue_shipping_emails(&existing)
        } else {
            Vec::new()
        };

        info!(
            updated = result.rows_affected,
            emails = notifications.len(),
            "bulk order status update"
        );

        Ok(BulkStatusOutcome {
            updated: result.rows_affected,
            notifications,
        })
    }

    fn queue_shipping_emails(&self, previous: &[OrderModel]) -> Vec<DeliveryHandle> {
        previous
            .iter()
            .filter(|order| order.status != OrderStatus::Shipped)
            .filter_map(|order| {
                let to = order.customer_email.as_deref()?.trim();
                if to.is_empty() {
                    return None;
                }
                let email = ShippingEmail {
                    order_id: order.id,
                    to: to.to_string(),
                    customer_name: order.customer_name.clone(),
                };
                // enqueue logs its own failures
                self.notifier.enqueue(email).ok()
            })
            .collect()
    }

    /// Refunds `amount` minor units, or whatever is left when `None`. The
    /// gateway refund happens first; the order is only updated once it
    /// succeeded.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn refund(&self, order_id: Uuid, amount: Option<i64>) -> Result<RefundOutcome, ServiceError> {
        let order = self.get_order(order_id).await?;

        let session_id = order
            .stripe_session_id
            .clone()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                ServiceError::ValidationError(
                    "Order has no payment session to refund".to_string(),
                )
            })?;

        let plan = plan_refund(
            order.total_amount,
            order.refunded_amount,
            order.status,
            order.payment_status,
            amount,
        )?;

        let receipt = self
            .gateway
            .refund_session(&session_id, plan.gateway_amount)
            .await?;

        // only record the refund against the total it was planned from
        let result = OrderEntity::update_many()
            .col_expr(order::Column::RefundedAmount, Expr::value(plan.refunded_total))
            .col_expr(order::Column::Status, Expr::value(plan.status))
            .col_expr(order::Column::PaymentStatus, Expr::value(plan.payment_status))
            .col_expr(order::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(order::Column::Id.eq(order_id))
            .filter(order::Column::RefundedAmount.eq(order.refunded_amount))
            .exec(&*self.db)
            .await?;

        if result.rows_affected == 0 {
            warn!(
                refund_id = %receipt.id,
                amount = plan.amount,
                planned_from = order.refunded_amount,
                "order changed while refunding; gateway refund not recorded"
            );
            return Err(ServiceError::Conflict(format!(
                "Order {} was refunded concurrently; refund {} needs reconciliation",
                order_id, receipt.id
            )));
        }

        let updated = self.get_order(order_id).await?;

        info!(
            refund_id = %receipt.id,
            amount = plan.amount,
            full = plan.full,
            "order refunded"
        );

        Ok(RefundOutcome {
            order: updated,
            refund: receipt,
            amount: plan.amount,
            full: plan.full,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_defaults_and_clamps() {
        assert_eq!(OrderFilters::default().effective_limit(), DEFAULT_ORDER_LIMIT);

        let huge = OrderFilters {
            limit: Some(1_000_000),
            ..Default::default()
        };
        assert_eq!(huge.effective_limit(), MAX_ORDER_LIMIT);

        let zero = OrderFilters {
            limit: Some(0),
            ..Default::default()
        };
        assert_eq!(zero.effective_limit(), 1);
    }
}
