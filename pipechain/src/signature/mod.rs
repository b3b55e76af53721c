//! Task signatures: immutable descriptions of a single task invocation.

mod factory;
mod model;

pub use factory::{SignatureRequest, TaskSignatureFactory, TIME_LIMIT_BUFFER_SECONDS};
pub use model::{
    SignatureKwargs, SignatureOptions, TaskEvent, TaskSignature, ACCESS_KEY, EXECUTION_ID,
    PIPELINE_ID,
};
