//! sea-orm entities backing the catalog, cart, order and payment tables.

pub mod address;
pub mod cart_item;
pub mod order;
pub mod order_line;
pub mod payment_session;
pub mod product;
pub mod product_color;
pub mod product_item;
pub mod product_size;
