// ABOUTME: Type-safe identifiers and validated domain types.
// ABOUTME: Host names, PHP versions, image references and runtime IDs.

mod domain;
mod id;
mod image_ref;
mod php_version;

pub use domain::{Domain, DomainError, SiteUrl};
pub use id::{ContainerId, NetworkId, VolumeId};
pub use image_ref::{ImageRef, ParseImageRefError};
pub use php_version::{PhpVersion, PhpVersionError, ResolvedPhp};
