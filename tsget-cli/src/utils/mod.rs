mod files;
mod headers;
pub mod logging;
pub mod progress;
mod size;
mod time;

// Export utility functions
pub use self::files::{create_dirs, validate_output_name};
pub use self::headers::parse_headers;
pub use self::size::format_bytes;
pub use self::time::format_duration;
