//! Public types for the Huginn API.

mod model;
mod request;
mod result;

pub use model::{ModelDescriptor, SelectionCriteria};
pub use request::{
    DEFAULT_MAX_INPUT_CHARS, Priority, RequestDescriptor, RequestOptions, TaskKind,
};
pub use result::{Completion, Degradation, Evaluation, GenerateResult, TranslationInfo, Usage};
