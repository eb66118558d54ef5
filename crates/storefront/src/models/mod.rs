//! Domain models for the storefront.
//!
//! These are the shapes the services work with and the HTTP layer
//! serializes. Field names serialize as camelCase; password hashes never
//! leave the database layer.

pub mod cart;
pub mod catalog;
pub mod order;
pub mod user;

pub use cart::{Cart, CartDetails, CartItem, CartLine};
pub use catalog::{
    Category, CategoryPatch, CategoryWithCount, NewCategory, NewProduct, Product, ProductFilter,
    ProductPage, ProductPatch, ProductWithCategory, Removal,
};
pub use order::{
    NewOrder, Order, OrderDetails, OrderItem, OrderLine, OrderStats, StatusTally, StatusTotal,
};
pub use user::{NewUser, User, UserChanges, UserSummary};
