pub mod access;
pub mod ir;
pub mod metadata;
pub mod plan;
pub mod query;

pub use access::*;
pub use ir::*;
pub use metadata::*;
pub use plan::*;
pub use query::*;
