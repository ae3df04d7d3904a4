pub mod contours;
pub mod package;
pub mod preprocessing;
pub mod reference;

pub use contours::{TracedRegion, trace_regions};
pub use package::{PackageCandidate, locate_package, select_package};
pub use reference::locate_reference;
