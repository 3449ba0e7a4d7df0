pub mod local;

pub use local::{Activity, LocalHost};
