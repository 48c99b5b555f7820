mod headers;
mod params;
pub mod progress;
mod size;

// Export utility functions
pub use self::headers::parse_headers;
pub use self::params::{parse_dynamic, parse_params};
pub use self::size::format_bytes;
