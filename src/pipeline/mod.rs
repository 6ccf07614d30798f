//! Aggregation pipeline: a typed, declarative query plan joining a content
//! document with its author projection and derived statistics, plus the
//! executor that runs the plan against the repository seams.
//!
//! The plan is built by a pure function and carries no connection state, so
//! stage construction is unit-testable without a live store.

mod executor;
mod plan;

pub use executor::PipelineExecutor;
pub use plan::{
    AggregationPlan, DetailOptions, GroupStage, LookupStage, MatchStage, ProjectStage, Stage,
    build_detail_plan,
};
