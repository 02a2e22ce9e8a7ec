//! Device-tree overlay directives from the boot configuration
//!
//! Overlays such as `dtoverlay=i2c3,pins_2_3` move bus functions to
//! non-default pins. The board consults the parsed result before falling back
//! to its own default pin tables.

pub mod config;
pub mod directive;

pub use config::{ConfigEntry, ConfigIssue, ConfigSeverity, OverlayConfig};
pub use directive::{OverlayDirective, OverlayFunction};
