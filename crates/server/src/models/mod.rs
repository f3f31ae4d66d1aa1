//! Domain models for the Pawdia API.
//!
//! These types are what handlers work with and what the API serializes.
//! Database row types live next to their repositories and convert into these.

pub mod order;
pub mod product;
pub mod user;

pub use order::{Order, OrderItem};
pub use product::Product;
pub use user::User;
