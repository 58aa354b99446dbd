pub mod payment;
pub mod pricing;

pub use payment::{capture_payment, PaymentError, PaymentRequest};
pub use pricing::{
    price_order, round_money, OrderIssue, OrderLineRequest, OrderValidationError, PricedOrder,
    MAX_LINE_QUANTITY,
};
