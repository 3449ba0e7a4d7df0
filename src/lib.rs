pub mod command;
pub mod core;
pub mod host;
pub mod repository;
pub mod security;

pub use command::{CancelToken, Canceller, Command, Options, Verbosity, cancel_channel};
pub use crate::core::*;
pub use host::LocalHost;
pub use repository::{Git, ScmContext, Subversion};
pub use security::{Agent, ErrorMap, ErrorPattern, Mask, MaskRule};
