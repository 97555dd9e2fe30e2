//! Monte Carlo workflow optimization and stochastic costing of hiPSC
//! expansion in vertical-wheel bioreactors.
//!
//! A scenario is resolved into [`CultureConditions`], sampled, optimized into
//! a cycle plan, allocated onto vessels, costed stage by stage, and finally
//! adjusted for batch failures. [`BioprocessBuilder`] wires the steps together.
//!
//! [`CultureConditions`]: stemforge_schemas::culture::CultureConditions

pub mod allocation;
pub mod analysis;
pub mod conditions;
pub mod error;
pub mod optimizer;
pub mod planar;
pub mod rates;
pub mod sampling;
pub mod simulation;
pub mod stages;
pub mod study;

pub use analysis::BioprocessResult;
pub use error::StemforgeError;
pub use simulation::{builder::BioprocessBuilder, engine::BioprocessEngine, state::PipelineState};
pub use study::{ComparisonStudy, ScenarioOutcome};
