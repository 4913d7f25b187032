// ABOUTME: Path layout of a site's deploy_path on the target.
// ABOUTME: Lock marker, releases/, shared/, and the current link all derive from here.

use crate::types::ReleaseId;

pub const LOCK_FILE: &str = ".deploy.lock";
pub const RELEASES_DIR: &str = "releases";
pub const SHARED_DIR: &str = "shared";
pub const CURRENT_LINK: &str = "current";
pub const CURRENT_TMP: &str = ".current.tmp";
/// Written into a release once it is fully built.
pub const RELEASE_MARKER: &str = ".stagehand-release";

/// Paths under one site's deploy_path. Paths are target-side POSIX strings,
/// not controller paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteLayout {
    root: String,
}

impl SiteLayout {
    pub fn new(deploy_path: &str) -> Self {
        let trimmed = deploy_path.trim_end_matches('/');
        let root = if trimmed.is_empty() { "/" } else { trimmed };
        Self {
            root: root.to_string(),
        }
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    fn join(&self, rel: &str) -> String {
        format!("{}/{}", self.root, rel)
    }

    pub fn lock_file(&self) -> String {
        self.join(LOCK_FILE)
    }

    pub fn releases_dir(&self) -> String {
        self.join(RELEASES_DIR)
    }

    pub fn release_dir(&self, id: &ReleaseId) -> String {
        format!("{}/{}/{}", self.root, RELEASES_DIR, id)
    }

    pub fn release_path(&self, id: &ReleaseId, rel: &str) -> String {
        format!("{}/{}", self.release_dir(id), rel.trim_end_matches('/'))
    }

    pub fn release_marker(&self, id: &ReleaseId) -> String {
        self.release_path(id, RELEASE_MARKER)
    }

    pub fn current_link(&self) -> String {
        self.join(CURRENT_LINK)
    }

    pub fn current_tmp(&self) -> String {
        self.join(CURRENT_TMP)
    }

    pub fn shared_dir(&self) -> String {
        self.join(SHARED_DIR)
    }

    pub fn shared_path(&self, rel: &str) -> String {
        format!("{}/{}", self.shared_dir(), rel.trim_end_matches('/'))
    }

    /// Target of the current link for a release, relative to the root.
    pub fn link_target(id: &ReleaseId) -> String {
        format!("{}/{}", RELEASES_DIR, id)
    }
}

/// Everything before the last `/`, or None for a bare name.
pub(crate) fn parent(path: &str) -> Option<&str> {
    path.trim_end_matches('/')
        .rsplit_once('/')
        .map(|(dir, _)| if dir.is_empty() { "/" } else { dir })
}
