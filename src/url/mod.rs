//! URL handling module for Sumi-Linkgraph
//!
//! This module provides URL normalization (graph node identity), domain and
//! origin extraction, and robots.txt location helpers.

mod domain;
mod normalize;

// Re-export main functions
pub use domain::{extract_domain, origin_of, robots_url};
pub use normalize::{fetch_target, normalize_url};
