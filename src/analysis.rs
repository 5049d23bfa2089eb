//! Per-position metrics built from oracle answers.

pub mod depth;
pub mod forced;
pub mod perplexity;

pub use depth::{depth_schedule, evaluate_depths, DepthAnalysis};
pub use forced::{forced_distances, is_forced, walk_to_forced, ForcedDistance};
pub use perplexity::perplexity_segments;
