//! Route handlers, grouped by resource.

pub mod admin;
pub mod checkout;
pub mod orders;
pub mod system;
pub mod users;
pub mod webhooks;
