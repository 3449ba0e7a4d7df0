pub mod error_map;
pub mod mask;
pub mod ssh_agent;

pub use error_map::{ErrorMap, ErrorPattern};
pub use mask::{Mask, MaskRule};
pub use ssh_agent::Agent;
