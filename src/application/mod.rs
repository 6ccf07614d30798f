//! Application layer: repository seams, batched lookups, retry policy, and
//! the content detail service that the outer surface calls.

pub mod batch;
pub mod detail;
pub mod error;
pub mod repos;
pub mod retry;

pub use batch::BatchLoader;
pub use detail::ContentDetailService;
pub use error::EngineError;
pub use repos::{CommentsRepo, DocumentStore, ReactionsRepo, RepoError, UserLookup};
pub use retry::RetryPolicy;
