pub mod engine;
pub mod events;
pub mod loader;
pub mod pipeline;
pub mod response;

pub use crate::domain::model::{Dataset, FlattenedResult, InputRow};
pub use crate::domain::ports::{InferenceClient, InferenceConnector, Pipeline, Storage};
pub use crate::utils::error::Result;
