pub mod deadline;
pub mod error;
pub mod system;
pub mod text;

pub use deadline::{race_with_timeout, DeadlineError};
pub use error::{AnswerError, ApiError};
pub use system::SystemMonitor;
