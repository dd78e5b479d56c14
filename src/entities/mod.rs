pub mod discount;
pub mod ingredient;
pub mod order;
pub mod product;
pub mod profile;
pub mod referral;
pub mod subscriber;
