//! Core pipeline and domain logic for newsdigest.
//!
//! One daily cycle turns the previous UTC day of channel history into a
//! summarized digest and fans it out to subscribers:
//!
//! registry → [`window`] filter → [`summarizer`] → [`chunker`] → [`delivery`]
//!
//! [`pipeline::DigestPipeline`] drives one cycle; [`scheduler::Scheduler`]
//! repeats it every day. External systems sit behind the [`traits`] seams.

pub mod adapters;
pub mod chunker;
pub mod delivery;
pub mod pipeline;
pub mod registry;
pub mod scheduler;
pub mod summarizer;
pub mod traits;
pub mod window;

#[cfg(test)]
mod testing;

pub use pipeline::{CycleReport, DigestPipeline, PipelineDeps, ProgressReporter, SilentProgress};
pub use scheduler::{Scheduler, next_trigger};
