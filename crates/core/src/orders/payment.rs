//! Local payment capture. No external gateway is contacted; the capture is a
//! record that the order total was settled by the given method.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::order::{Order, OrderStatus, Payment, PaymentId, PaymentStatus};

pub const PAYMENT_METHODS: &[&str] = &["card", "cash", "voucher"];

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub amount: Decimal,
    pub method: String,
    #[serde(default)]
    pub reference: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum PaymentError {
    #[error("order {order_id} is {status} and cannot take payment")]
    OrderClosed { order_id: String, status: &'static str },
    #[error("order {order_id} payment is already {status}")]
    NotUnpaid { order_id: String, status: &'static str },
    #[error("payment amount {received} does not match order total {expected}")]
    AmountMismatch { expected: Decimal, received: Decimal },
    #[error("unsupported payment method `{0}`")]
    UnsupportedMethod(String),
}

/// Captures the full order total. On success the order's payment status is
/// `Captured` and the returned record should be persisted alongside it.
pub fn capture_payment(
    order: &mut Order,
    request: &PaymentRequest,
    now: DateTime<Utc>,
) -> Result<Payment, PaymentError> {
    if matches!(order.status, OrderStatus::Cancelled | OrderStatus::Delivered) {
        return Err(PaymentError::OrderClosed {
            order_id: order.id.0.clone(),
            status: order.status.as_str(),
        });
    }
    if order.payment_status != PaymentStatus::Unpaid {
        return Err(PaymentError::NotUnpaid {
            order_id: order.id.0.clone(),
            status: order.payment_status.as_str(),
        });
    }
    let method = request.method.trim().to_ascii_lowercase();
    if !PAYMENT_METHODS.contains(&method.as_str()) {
        return Err(PaymentError::UnsupportedMethod(request.method.clone()));
    }
    if request.amount != order.total {
        return Err(PaymentError::AmountMismatch {
            expected: order.total,
            received: request.amount,
        });
    }

    order.payment_status = PaymentStatus::Captured;
    order.updated_at = now;

    Ok(Payment {
        id: PaymentId(format!("PAY-{}", Uuid::new_v4())),
        order_id: order.id.clone(),
        amount: request.amount,
        method,
        reference: request
            .reference
            .as_deref()
            .map(str::trim)
            .filter(|reference| !reference.is_empty())
            .map(str::to_string),
        status: PaymentStatus::Captured,
        captured_at: now,
    })
}
