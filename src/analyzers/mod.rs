//! Week-signature stability analysis.
//!
//! Expands every trip's validity interval into ISO weeks, folds each
//! route-week into a signature, clusters a route's weeks by signature and
//! labels the route by how its clusters are shaped.

pub mod aggregate;
pub mod analyzer;
pub mod cluster;
pub mod detail;
pub mod distribution;
pub mod grade;
pub mod signature;
pub mod types;
pub mod utility;
pub mod weeks;
