pub mod fake_store;
pub mod neo4j_store;
pub mod resolver;
pub mod store;
pub mod writer;

pub use neo4j_store::Neo4jStore;
pub use resolver::{PlaceholderResolver, ResolutionMode, ResolutionStrategy, ResolutionSummary};
pub use store::{
    CallSiteRow, ClassRow, FileRow, FunctionRow, GraphStats, GraphStore, ImportSiteRow,
};
pub use writer::GraphWriter;
