//! Data-store abstraction. Concrete stores (SQL, Parquet, synthetic) live
//! outside this crate.

pub mod store;

pub use store::{DataStore, StoreError};
