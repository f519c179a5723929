// # mangasync-core
//
// Core library for the mangasync release tracker.
//
// ## Architecture Overview
//
// This library reconciles a remote tracking list against the places where
// new chapters and episodes actually appear:
// - **Catalog**: Trait for the paginated tracking list (read and write)
// - **ContentSource**: Trait for the content API that owns subscriptions
// - **PageFetcher** / **Extractor**: Page retrieval and per-site parsing for
//   everything the content API does not cover
// - **Reconciler**: Core engine that turns observed releases into writes
// - **ExtractorRegistry**: Table-driven mapping of sites to source rules
//
// ## Design Principles
//
// 1. **Separation of Concerns**: Core logic is separate from implementations
// 2. **Stateless Runs**: The catalog is the only store; nothing is cached
//    between runs
// 3. **Table-Driven Sites**: Sites are registered rules, no hard-coded if-else
// 4. **Monotonic Writes**: A latest release only ever increases
// 5. **Idempotency**: A second run with no upstream change writes nothing

pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod matcher;
pub mod model;
pub mod recovery;
pub mod registry;
pub mod traits;

// Re-export core types for convenience
pub use config::{CatalogConfig, ContentApiConfig, EngineConfig, SyncConfig};
pub use engine::{Reconciler, RunReport};
pub use error::{Error, Result};
pub use model::{Item, ItemDelta, Partition, Status};
pub use recovery::RecoveryPolicy;
pub use registry::{ExtractorRegistry, SourceRule};
pub use traits::{Catalog, Clock, ContentSource, Extractor, PageFetcher, SystemClock};
