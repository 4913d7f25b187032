// ABOUTME: Validated domain types shared across the crate.
// ABOUTME: Site identifiers and phantom-typed timestamp ids for releases and backups.

mod site_name;
mod stamp;

pub use site_name::{SiteName, SiteNameError};
pub use stamp::{BackupId, BackupMarker, ParseStampError, ReleaseId, ReleaseMarker, Stamp};
