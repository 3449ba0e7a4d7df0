pub mod cancel;
pub mod reporter;
pub mod runner;
pub mod writer;

pub use cancel::{CancelToken, Canceller, cancel_channel};
pub use reporter::{Reporter, Verbosity};
pub use runner::{Command, Options};
pub use writer::Writer;
