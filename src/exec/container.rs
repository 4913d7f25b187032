// ABOUTME: Wraps every command in `docker exec` against a running container.
// ABOUTME: The docker CLI itself runs through an inner runner (local or SSH).

use async_trait::async_trait;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use super::{CommandOutput, ExecError, RunOptions, Runner, quote};

static UPLOAD_SEQ: AtomicU64 = AtomicU64::new(0);

/// Runs commands inside `container` as `user`.
///
/// Elevated execution means `-u root` on the exec rather than `sudo` inside
/// the container. The working directory is passed with `-w`.
pub struct ContainerRunner {
    inner: Box<dyn Runner>,
    container: String,
    user: String,
}

impl ContainerRunner {
    pub fn new(inner: Box<dyn Runner>, container: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            inner,
            container: container.into(),
            user: user.into(),
        }
    }

    /// The host-side command that runs `command` in the container.
    pub fn wrap(&self, command: &str, options: &RunOptions) -> String {
        let user = if options.sudo { "root" } else { &self.user };
        let mut wrapped = String::from("docker exec");
        if let Some(cwd) = &options.cwd {
            wrapped.push_str(" -w ");
            wrapped.push_str(&quote(cwd));
        }
        wrapped.push_str(" -u ");
        wrapped.push_str(&quote(user));
        wrapped.push(' ');
        wrapped.push_str(&quote(&self.container));
        wrapped.push_str(" sh -c ");
        wrapped.push_str(&quote(command));
        wrapped
    }
}

impl std::fmt::Debug for ContainerRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContainerRunner")
            .field("inner", &self.inner.describe())
            .field("container", &self.container)
            .field("user", &self.user)
            .finish()
    }
}

#[async_trait]
impl Runner for ContainerRunner {
    fn describe(&self) -> String {
        format!(
            "docker {}@{} via {}",
            self.user,
            self.container,
            self.inner.describe()
        )
    }

    async fn run(&self, command: &str, options: &RunOptions) -> Result<CommandOutput, ExecError> {
        let wrapped = self.wrap(command, options);
        let host_options = RunOptions {
            stream: options.stream,
            ..RunOptions::default()
        };
        self.inner.run(&wrapped, &host_options).await
    }

    /// Stage the file on the container host, `docker cp` it in, then hand it
    /// to the container user.
    async fn put(&self, local: &Path, remote: &str) -> Result<(), ExecError> {
        let staging = format!(
            "/tmp/stagehand-upload-{}-{}",
            std::process::id(),
            UPLOAD_SEQ.fetch_add(1, Ordering::Relaxed)
        );
        self.inner.put(local, &staging).await?;

        let copy = format!(
            "docker cp {} {}",
            quote(&staging),
            quote(&format!("{}:{}", self.container, remote))
        );
        let copied = self.inner.check(&copy, &RunOptions::default()).await;

        if let Err(e) = self.inner.remove(&staging).await {
            tracing::warn!("Failed to remove staged upload {}: {}", staging, e);
        }
        copied?;

        if self.user != "root" {
            let chown = format!("chown {} {}", quote(&self.user), quote(remote));
            self.check(&chown, &RunOptions::new().sudo(true)).await?;
        }
        Ok(())
    }
}
