//! # vidmix Diagnostics
//!
//! Debugging and diagnostic tools for vidmix.
//! Provides logging setup, render profiling and serialisable mixer reports.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod debug_logger;
pub mod mixer_analyzer;
pub mod render_profiler;

// Re-export main types
pub use debug_logger::DebugLogger;
pub use mixer_analyzer::{MixerAnalyzer, MixerHealth, MixerReport, TrackReport};
pub use render_profiler::{RenderProfile, RenderProfiler};
