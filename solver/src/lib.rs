pub mod backends;
pub mod channel;
pub mod error;
pub mod model;
pub mod sampler;
pub mod script;
pub mod session;

pub use common::expr::{Assignment, Expr, Sort, Value};

pub use crate::backends::SolverCommand;
pub use crate::channel::{Channel, ProcessChannel};
pub use crate::error::BackendError;
pub use crate::sampler::{MinimizingOracle, MutationSampler, Sample, SampleOracle, SamplerParams};
pub use crate::script::{Objective, Request};
pub use crate::session::{Model, QueryResult, SmtSession};
