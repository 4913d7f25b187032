// ABOUTME: Named states of the per-site deploy state machine.
// ABOUTME: Decides which failures trigger a rollback.

use serde::Serialize;

/// States a deploy passes through, in order.
///
/// `RollingBack` is entered on failure from `Cloning` through `Activating`.
/// `Failed` is terminal when rollback itself fails or has no target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum DeployState {
    Idle,
    Locking,
    BackingUp,
    Cloning,
    Linking,
    Installing,
    Validating,
    Migrating,
    CollectingStatic,
    Activating,
    Restarting,
    Pruning,
    Unlocking,
    Done,
    RollingBack,
    Failed,
}

impl DeployState {
    /// Whether a failure in this state rolls the site back.
    ///
    /// Before `Cloning` nothing has been touched. After `Activating` the new
    /// release is live and complete, so later problems are warnings.
    pub fn triggers_rollback(self) -> bool {
        (DeployState::Cloning..=DeployState::Activating).contains(&self)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DeployState::Idle => "Idle",
            DeployState::Locking => "Locking",
            DeployState::BackingUp => "BackingUp",
            DeployState::Cloning => "Cloning",
            DeployState::Linking => "Linking",
            DeployState::Installing => "Installing",
            DeployState::Validating => "Validating",
            DeployState::Migrating => "Migrating",
            DeployState::CollectingStatic => "CollectingStatic",
            DeployState::Activating => "Activating",
            DeployState::Restarting => "Restarting",
            DeployState::Pruning => "Pruning",
            DeployState::Unlocking => "Unlocking",
            DeployState::Done => "Done",
            DeployState::RollingBack => "RollingBack",
            DeployState::Failed => "Failed",
        }
    }
}

impl std::fmt::Display for DeployState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
