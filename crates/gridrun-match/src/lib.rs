//! gridrun-match — runner-to-instance matching.
//!
//! Decides which instance hosts which runner. It does NOT drive the
//! deployment (that's `gridrun-deploy`); it answers one question: given
//! the topologies the runners require and the topologies the instances
//! provide, is there an assignment satisfying every requirement?
//!
//! - **`graph`** — Hopcroft–Karp maximum bipartite matching
//! - **`assign`** — building the compatibility graph from topologies
//!   and extracting a complete assignment

pub mod assign;
pub mod graph;

pub use assign::assign;
pub use graph::{MatchGraph, Matching};
