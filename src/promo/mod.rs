//! Promo code validation and redemption.

mod audit;
mod catalog;
mod code;
mod store;
mod validation;

pub use audit::{PromoRedemption, RedemptionLog};
pub use catalog::PromoCatalog;
pub use code::{normalize_code, ContentType, NewPromoCode, PromoCode, PromoCodeUpdate};
pub use store::{PromoStore, DEFAULT_HISTORY_LIMIT};
pub use validation::{PromoRejection, PromoValidation};
