mod allocation;
mod coupon;
mod payment_signal;
mod points;

pub use allocation::allocate;
pub use coupon::{coupon_eligible_subtotal, is_coupon_applicable_to_line};
pub use payment_signal::{
    delivery_fingerprint,
    resolve_payment_state,
    CryptoPaymentEvent,
    FiatPaymentEvent,
    PaymentNotification,
    PaymentState,
};
pub use points::{settle_basket, LineBreakdown, SettlementBreakdown, SettlementError};
