//! Core processing modules

pub mod atmospheric;
pub mod dispatch;
pub mod dual_resolution;
pub mod expression;
pub mod formula;
pub mod high_pass;
pub mod indices;
pub mod pansharpen;
pub mod pipeline;
pub mod preprocess;
pub mod radiometric;
pub mod registry;
pub mod tool;

// Re-export main types
pub use atmospheric::{
    AerosolProfile, AtmosphereSource, AtmosphereSourceConfig, AtmosphericConstituents, AtmosphericResolver,
    RadiativeTransferModel, SceneConditions, SixsConfig, SixsExecutable, SixsOutputs,
};
pub use dispatch::{CalcOptions, ExpressionDispatcher, GdalCalcDispatcher};
pub use dual_resolution::{DualResolutionExpander, DualResolutionPolicy};
pub use formula::{compile, CompiledExpression, FormulaCompiler, SymbolTable};
pub use high_pass::{focal, high_pass_filter};
pub use indices::{BatchReport, IndexBatch, IndexOutcome};
pub use pipeline::{CorrectionPipeline, ProductOutputs, SceneOutputs};
pub use radiometric::{radiometric_correction, RadiometricCoefficients, RadiometricResolver};
pub use registry::BandRegistry;
pub use tool::ExternalTool;
