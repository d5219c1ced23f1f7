// Catalog and stock
pub mod inventory;

// Shopping flow
pub mod cart;
pub mod orders;

// Payments
pub mod payment_gateway;
pub mod payments;
