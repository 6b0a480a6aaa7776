// Query planning
//
// graph: candidate search over the replication topology
// strategy: cache / direct / materialized / trino selection

pub mod graph;
pub mod strategy;

pub use graph::{
    evaluate_candidate, find_any_candidate_ignoring_freshness, is_fresh_enough, lag_level,
    CandidateDatabase,
};
pub use strategy::plan_query;
