pub mod error;
pub mod platform;

pub use error::PlatformError;
pub use platform::{Platform, PushOutcome};
