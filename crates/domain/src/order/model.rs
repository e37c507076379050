//! Order and order item entities.

use chrono::{DateTime, Utc};
use common::{OrderId, ProductId, UserId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Money, OrderError, OrderStatus, PricedLine};

/// A line of an order. Exclusively owned by its order and deleted with it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub quantity: u32,
    /// Price per unit, captured when the order was created.
    pub unit_price: Money,
    /// `unit_price × quantity`.
    pub subtotal: Money,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Free-text details supplied by the customer when placing an order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderDetails {
    pub currency: String,
    pub shipping_address: String,
    pub billing_address: String,
    pub notes: Option<String>,
}

/// An order record.
///
/// The persisted row is the single source of truth; every cached copy is
/// derived from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub status: OrderStatus,
    pub total_amount: Money,
    pub currency: String,
    pub shipping_address: String,
    pub billing_address: String,
    pub notes: Option<String>,
    pub payment_id: Option<String>,
    pub items: Vec<OrderItem>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Builds a new order in `Pending` status from priced lines.
    ///
    /// Lines keep the caller's order. The total is the sum of the line
    /// subtotals and is not recomputed afterwards.
    pub fn new_pending(
        user_id: UserId,
        details: OrderDetails,
        lines: Vec<PricedLine>,
    ) -> Result<Self, OrderError> {
        if lines.is_empty() {
            return Err(OrderError::NoItems);
        }

        let id = OrderId::new();
        let now = Utc::now();
        let mut items = Vec::with_capacity(lines.len());
        for line in lines {
            if line.quantity == 0 {
                return Err(OrderError::InvalidQuantity {
                    product_id: line.product_id.to_string(),
                    quantity: line.quantity,
                });
            }
            if line.unit_price.is_negative() {
                return Err(OrderError::InvalidPrice {
                    product_id: line.product_id.to_string(),
                    price: line.unit_price,
                });
            }
            items.push(OrderItem {
                id: Uuid::new_v4(),
                order_id: id,
                subtotal: line.subtotal(),
                product_id: line.product_id,
                quantity: line.quantity,
                unit_price: line.unit_price,
                created_at: now,
                updated_at: now,
            });
        }
        let total_amount = items.iter().map(|item| item.subtotal).sum();

        Ok(Self {
            id,
            user_id,
            status: OrderStatus::Pending,
            total_amount,
            currency: details.currency,
            shipping_address: details.shipping_address,
            billing_address: details.billing_address,
            notes: details.notes,
            payment_id: None,
            items,
            created_at: now,
            updated_at: now,
        })
    }

    /// Returns true if the order is owned by `user_id`.
    pub fn is_owned_by(&self, user_id: &UserId) -> bool {
        &self.user_id == user_id
    }

    /// Sum of the item subtotals.
    pub fn items_total(&self) -> Money {
        self.items.iter().map(|item| item.subtotal).sum()
    }

    /// Records the payment that settled this order.
    pub fn attach_payment(&mut self, payment_id: impl Into<String>) {
        self.payment_id = Some(payment_id.into());
        self.touch();
    }

    /// Sets the status without checking the transition.
    pub fn set_status(&mut self, status: OrderStatus) {
        self.status = status;
        self.touch();
    }

    /// Cancels the order. Legal only from `Pending` or `Processing`.
    pub fn cancel(&mut self) -> Result<(), OrderError> {
        if !self.status.can_cancel() {
            return Err(OrderError::InvalidStateTransition {
                from: self.status,
                to: OrderStatus::Cancelled,
            });
        }
        self.set_status(OrderStatus::Cancelled);
        Ok(())
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
