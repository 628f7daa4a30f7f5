pub mod combinations;
pub mod output;
pub mod runner;
pub mod scenario;
pub mod scoring;
pub mod template;
pub mod util;
pub mod words;

pub use combinations::{generate_parameter_combinations, ParameterRecord};
pub use runner::{run_sweep, Progress, ResultRecord, SweepReport, NA};
pub use scenario::Scenario;
pub use scoring::{ScoreFailure, ScoreResult, Scorer};
pub use template::{Binding, Bindings, Template, TemplateError};
pub use words::WordGroup;
