mod constants;
mod detector;

pub use constants::*;
pub use detector::{ToolSet, is_privileged};
