pub mod billing;
pub mod checkout;
pub mod common;
pub mod coupons;
pub mod discounts;
pub mod exports;
pub mod health;
pub mod orders;
pub mod referrals;

use std::sync::Arc;

use crate::{
    auth::{rate_limit::CouponRateLimitConfig, CouponRateLimiter},
    config::AppConfig,
    db::DbPool,
    gateway::PaymentGateway,
    services::{
        billing::BillingService,
        checkout::{CheckoutService, CheckoutUrls},
        coupons::CouponService,
        discounts::DiscountService,
        exports::ExportService,
        notifications::{Mailer, NotifierConfig, ShippingNotifier},
        orders::OrderService,
        referrals::ReferralService,
    },
};

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub orders: OrderService,
    pub discounts: DiscountService,
    pub referrals: ReferralService,
    pub coupons: CouponService,
    pub checkout: CheckoutService,
    pub billing: BillingService,
    pub exports: ExportService,
}

impl AppServices {
    /// Wires every service and starts the shipping notification worker.
    /// Must be called inside a tokio runtime.
    pub fn new(
        config: &AppConfig,
        db: Arc<DbPool>,
        gateway: Arc<dyn PaymentGateway>,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        let (notifier, _worker) = ShippingNotifier::spawn(mailer, NotifierConfig::from(config));
        let limiter = CouponRateLimiter::new(CouponRateLimitConfig::from(config));

        let discounts = DiscountService::new(db.clone(), config.referral_coupon_id.clone());
        let orders = OrderService::new(db.clone(), gateway.clone(), notifier);
        let referrals = ReferralService::new(db.clone(), discounts.clone());
        let coupons = CouponService::new(gateway.clone(), discounts.clone(), limiter);
        let checkout = CheckoutService::new(
            gateway.clone(),
            coupons.clone(),
            CheckoutUrls {
                success_url: config.checkout_success_url.clone(),
                cancel_url: config.checkout_cancel_url.clone(),
            },
        );
        let billing = BillingService::new(gateway);
        let exports = ExportService::new(db, orders.clone());

        Self {
            orders,
            discounts,
            referrals,
            coupons,
            checkout,
            billing,
            exports,
        }
    }
}
