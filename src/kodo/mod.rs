pub mod auth;
pub mod error;
pub mod upload;

pub use auth::{Credentials, PutPolicy};
pub use error::{PublishError, Result};
pub use upload::{KodoClient, ObjectStore, UploadResult};
