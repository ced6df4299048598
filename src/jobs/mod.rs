//! Asynchronous job handles and the registry that tracks them.

mod job_id;
mod registry;

pub use job_id::{JOB_ID_LEN, JobId, JobIdGenerator, JobIdParseError, RandomJobIds};
pub use registry::{DEFAULT_JOB_EXPIRY, JobRegistry};
