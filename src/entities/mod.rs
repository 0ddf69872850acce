pub mod order_items;
pub mod orders;
pub mod products;
pub mod users;

pub use order_items as order_item_entity;
pub use orders as order_entity;
pub use products as product_entity;
pub use users as user_entity;

pub use orders::{OrderStatus, PaymentStatus};
pub use users::UserRole;
