//! Cache key layout for order reads.

use std::time::Duration;

use cache::pattern::escape_glob;
use common::{OrderId, PageRequest, UserId};

/// How long a single cached order stays valid.
pub const ORDER_TTL: Duration = Duration::from_secs(5 * 60);

/// How long a cached page of a user's orders stays valid.
pub const USER_ORDERS_TTL: Duration = Duration::from_secs(2 * 60);

/// `order:{id}`
pub fn order(order_id: OrderId) -> String {
    format!("order:{order_id}")
}

/// `orders:user:{user}:page:{page}:size:{page_size}`
pub fn user_orders_page(user_id: &UserId, page: PageRequest) -> String {
    format!(
        "orders:user:{}:page:{}:size:{}",
        user_id, page.page, page.page_size
    )
}

/// Pattern matching every cached page of a user's orders. Glob
/// metacharacters in the user id are escaped.
pub fn user_orders_pattern(user_id: &UserId) -> String {
    format!("orders:user:{}:*", escape_glob(user_id.as_str()))
}
