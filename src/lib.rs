pub mod app;
pub mod capability;
pub mod config;
pub mod error;
pub mod features;
pub mod gpu;
pub mod quality;
pub mod render;
pub mod surface;
pub mod terminal;
pub mod timeline;
pub mod tuning;
pub mod visual;

pub use error::{GpuError, TimelineError, TuningError};
pub use features::{AnalysisSnapshot, AnimationFeatures, FeaturePipeline, SectionType};
pub use quality::{QualityLevel, QualityManager, QualityProfile};
pub use surface::Surface;
pub use visual::{VisualMode, VisualizerEngine};
