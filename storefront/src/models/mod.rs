// storefront/src/models/mod.rs

pub mod cart_item;
pub mod money;
pub mod order;
pub mod order_item;
pub mod payment_transaction;
pub mod promo_code;
pub mod status_history;

pub use cart_item::CartItem;
pub use money::Currency;
pub use order::{Effect, EffectState, Order, OrderStatus, PaymentStatus, SettlementEffects};
pub use order_item::OrderItem;
pub use payment_transaction::{PaymentTransaction, TransactionStatus};
pub use promo_code::{PromoCode, PromoCodeUsage};
pub use status_history::StatusHistoryEntry;
