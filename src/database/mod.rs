pub mod connection;
pub mod sea_orm_store;
pub mod store;

pub use connection::{DbPool, create_pool, run_migrations};
pub use sea_orm_store::SeaOrmStore;
pub use store::*;
