// ABOUTME: Runtime resources a site needs before compose can start it.
// ABOUTME: Currently the site's named volumes and their host-side links.

mod volumes;

pub use volumes::{VolumeProvisionError, ensure_volumes};
