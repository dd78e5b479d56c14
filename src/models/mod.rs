//! Domain enums shared by entities, services and request bodies.

pub mod discount;
pub mod order;
pub mod referral;

pub use discount::DiscountSource;
pub use order::{is_consistent, OrderStatus, PaymentStatus};
pub use referral::RewardType;
