pub mod memory;
pub mod pool;
pub mod postgres;
pub mod queries;
pub mod store;

pub use memory::{MemoryFinancingStore, MemoryFinancingTx};
pub use pool::create_pool;
pub use postgres::{PgFinancingStore, PgFinancingTx};
pub use store::{FinancingStore, FinancingTx};
