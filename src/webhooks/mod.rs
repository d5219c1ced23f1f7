//! Inbound webhook support.

pub mod signature;

pub use signature::{sign, stripe_signature_header, verify_signature};
