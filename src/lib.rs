pub mod config;
pub mod kodo;
pub mod publisher;

pub use config::Config;
pub use kodo::{Credentials, KodoClient, ObjectStore, PublishError, UploadResult};
pub use publisher::{Publisher, Report, UploadJob, derive_remote_key, enumerate};
