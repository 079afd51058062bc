//! Zone Registry
//!
//! Holds the set of geofences that positions are tested against. Zones come
//! in two shapes:
//!
//! - **Circle**: geographic centre and radius in metres
//! - **Square**: axis-aligned square on the camera's local plane (the legacy
//!   "restricted area" boundary)
//!
//! The registry is replaced wholesale by configuration updates. Each incoming
//! definition is validated on its own; a bad entry is logged and skipped
//! without affecting the others.

mod definition;
mod model;
mod registry;

pub use definition::{CenterDefinition, ConfigError, Numeric, ZoneDefinition};
pub use model::{ResolvedPosition, Zone, ZoneId, ZoneShape};
pub use registry::{BoundaryConfig, ReplaceReport, ZoneRegistry, BOUNDARY_ZONE_ID};
