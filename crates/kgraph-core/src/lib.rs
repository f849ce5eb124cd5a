pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{
    derive_id, repo_key, CallSite, ClassEntity, FileEntity, FunctionEntity, ImportSite, Language,
    Position, Resolution,
};
