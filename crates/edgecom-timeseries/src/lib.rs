pub mod error;
pub mod memory;
pub mod model;
pub mod query;
pub mod store;

pub use error::StoreError;
pub use memory::MemoryRepository;
pub use model::{AggregatedPoint, Aggregation, TimeSeriesPoint, Window};
pub use query::{bucket_start, Query};
pub use store::{ConnectionSettings, TimeSeriesRepository, TimescaleRepository};
