use async_trait::async_trait;
use common::{OrderId, Page, PageRequest, UserId};
use domain::{Order, OrderStatus};

use crate::Result;

/// Core trait for order store implementations.
///
/// The store is the single source of truth for orders. Every method is a
/// single round trip from the caller's point of view, and all
/// implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Inserts an order together with all of its items.
    ///
    /// The order row and the item rows are written atomically.
    async fn create(&self, order: &Order) -> Result<()>;

    /// Loads an order and its items.
    async fn get(&self, order_id: OrderId) -> Result<Option<Order>>;

    /// Lists a user's orders, newest first, with the user's total order count.
    async fn list_by_user(&self, user_id: &UserId, page: PageRequest) -> Result<Page<Order>>;

    /// Saves the mutable fields of an order row.
    ///
    /// Items are immutable after creation and are not rewritten.
    async fn update(&self, order: &Order) -> Result<()>;

    /// Updates only the status (and `updated_at`) of an order.
    async fn update_status(&self, order_id: OrderId, status: OrderStatus) -> Result<()>;

    /// Deletes an order; its items are deleted with it.
    async fn delete(&self, order_id: OrderId) -> Result<()>;

    /// Checks that the store is reachable.
    async fn ping(&self) -> Result<()>;
}
