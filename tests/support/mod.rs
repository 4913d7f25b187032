// ABOUTME: Test support utilities.
// ABOUTME: Throwaway git repositories, site builders, and a command-recording runner.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Once;

use stagehand::config::{SiteConfig, SitesConfig};
use stagehand::exec::{CommandOutput, ExecError, LocalRunner, RunOptions, Runner};
use stagehand::output::{Output, OutputMode};

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for tests. Safe to call multiple times.
#[allow(dead_code)]
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::EnvFilter;
        let filter = EnvFilter::from_default_env().add_directive("stagehand=debug".parse().unwrap());
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// Output that prints nothing per step, so test logs stay readable.
#[allow(dead_code)]
pub fn quiet() -> Output {
    Output::new(OutputMode::Quiet)
}

#[allow(dead_code)]
pub fn local_runner() -> LocalRunner {
    LocalRunner::default()
}

/// A manage.py that records its arguments and always succeeds.
#[allow(dead_code)]
pub const MANAGE_OK: &str = "echo \"$@\" >> manage.log\nexit 0\n";

/// A manage.py whose migration plan check fails with exit code 3.
#[allow(dead_code)]
pub const MANAGE_BAD_PLAN: &str = "echo \"$@\" >> manage.log\n\
if [ \"$2\" = \"--plan\" ]; then echo 'conflicting migrations' >&2; exit 3; fi\n\
exit 0\n";

/// A local git repository with a `master` branch, cloned over `file://`.
#[allow(dead_code)]
pub struct GitRepo {
    dir: tempfile::TempDir,
}

#[allow(dead_code)]
impl GitRepo {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let repo = Self { dir };
        repo.git(&["init", "-q"]);
        repo.git(&["symbolic-ref", "HEAD", "refs/heads/master"]);
        repo
    }

    /// A repository with one commit containing `files`.
    pub fn with_files(files: &[(&str, &str)]) -> Self {
        let repo = Self::new();
        repo.commit(files, "initial");
        repo
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn url(&self) -> String {
        format!("file://{}", self.dir.path().display())
    }

    /// Write `files` and commit them.
    pub fn commit(&self, files: &[(&str, &str)], message: &str) {
        for (name, content) in files {
            let path = self.dir.path().join(name);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).unwrap();
            }
            std::fs::write(&path, content).unwrap();
        }
        self.git(&["add", "-A"]);
        self.git(&[
            "-c",
            "user.name=Test",
            "-c",
            "user.email=test@example.com",
            "commit",
            "-q",
            "--allow-empty",
            "-m",
            message,
        ]);
    }

    fn git(&self, args: &[&str]) {
        let status = Command::new("git")
            .args(args)
            .current_dir(self.dir.path())
            .status()
            .unwrap();
        assert!(status.success(), "git {:?} failed", args);
    }
}

/// Parse one site from a YAML body indented under `name:`.
///
/// `extra` lines are appended to the generated keys, e.g. `"python: sh"`.
#[allow(dead_code)]
pub fn site(name: &str, repository: &str, deploy_path: &Path, extra: &[&str]) -> SiteConfig {
    let mut yaml = format!(
        "{name}:\n  repository: {repository}\n  deploy_path: {}\n  restart_scripts: []\n",
        deploy_path.display()
    );
    for line in extra {
        yaml.push_str("  ");
        yaml.push_str(line);
        yaml.push('\n');
    }
    let config = SitesConfig::from_yaml(&yaml).unwrap();
    config.sites()[0].clone()
}

/// Paths inside a deploy_path on the local filesystem.
#[allow(dead_code)]
pub struct Tree {
    pub root: PathBuf,
}

#[allow(dead_code)]
impl Tree {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn releases(&self) -> Vec<String> {
        let dir = self.root.join("releases");
        let Ok(entries) = std::fs::read_dir(&dir) else {
            return Vec::new();
        };
        let mut names: Vec<String> = entries
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    /// Name of the release `current` points at.
    pub fn current(&self) -> Option<String> {
        let target = std::fs::read_link(self.root.join("current")).ok()?;
        Some(target.file_name()?.to_string_lossy().into_owned())
    }

    pub fn release(&self, id: &str) -> PathBuf {
        self.root.join("releases").join(id)
    }

    pub fn lock_file(&self) -> PathBuf {
        self.root.join(".deploy.lock")
    }
}

/// A runner that records every command and answers from a script of
/// canned results instead of executing anything.
///
/// Commands not matched by a rule succeed with empty output.
#[allow(dead_code)]
#[derive(Default)]
pub struct RecordingRunner {
    commands: Mutex<Vec<String>>,
    rules: Vec<(String, CommandOutput)>,
}

#[allow(dead_code)]
impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer commands containing `needle` with `exit_code` and `stdout`.
    pub fn respond(mut self, needle: &str, exit_code: i32, stdout: &str) -> Self {
        self.rules.push((
            needle.to_string(),
            CommandOutput {
                exit_code,
                stdout: stdout.to_string(),
                stderr: String::new(),
            },
        ));
        self
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().clone()
    }
}

#[async_trait]
impl Runner for RecordingRunner {
    fn describe(&self) -> String {
        "recording".to_string()
    }

    async fn run(&self, command: &str, _options: &RunOptions) -> Result<CommandOutput, ExecError> {
        self.commands.lock().push(command.to_string());
        let output = self
            .rules
            .iter()
            .find(|(needle, _)| command.contains(needle.as_str()))
            .map(|(_, output)| output.clone())
            .unwrap_or(CommandOutput {
                exit_code: 0,
                stdout: String::new(),
                stderr: String::new(),
            });
        Ok(output)
    }

    async fn put(&self, local: &Path, remote: &str) -> Result<(), ExecError> {
        self.commands
            .lock()
            .push(format!("put {} {}", local.display(), remote));
        Ok(())
    }
}

/// Shared runner handle for wrapping in a `ContainerRunner` while keeping
/// access to the recorded commands.
#[allow(dead_code)]
pub struct SharedRecorder(pub std::sync::Arc<RecordingRunner>);

#[async_trait]
impl Runner for SharedRecorder {
    fn describe(&self) -> String {
        self.0.describe()
    }

    async fn run(&self, command: &str, options: &RunOptions) -> Result<CommandOutput, ExecError> {
        self.0.run(command, options).await
    }

    async fn put(&self, local: &Path, remote: &str) -> Result<(), ExecError> {
        self.0.put(local, remote).await
    }
}

/// A local runner whose `rm -rf` of a release directory fails once armed,
/// as it would when a release holds files the deploy user cannot delete.
#[allow(dead_code)]
#[derive(Default)]
pub struct StuckReleases {
    inner: LocalRunner,
    armed: std::sync::atomic::AtomicBool,
    panics: std::sync::atomic::AtomicBool,
}

#[allow(dead_code)]
impl StuckReleases {
    pub fn arm(&self) {
        self.armed.store(true, std::sync::atomic::Ordering::SeqCst);
    }

    /// Once armed, panic instead of failing.
    pub fn arm_panic(&self) {
        self.panics.store(true, std::sync::atomic::Ordering::SeqCst);
        self.arm();
    }
}

#[async_trait]
impl Runner for StuckReleases {
    fn describe(&self) -> String {
        self.inner.describe()
    }

    async fn run(&self, command: &str, options: &RunOptions) -> Result<CommandOutput, ExecError> {
        if self.armed.load(std::sync::atomic::Ordering::SeqCst)
            && command.starts_with("rm -rf ")
            && command.contains("/releases/")
        {
            if self.panics.load(std::sync::atomic::Ordering::SeqCst) {
                panic!("release removal blew up");
            }
            return Ok(CommandOutput {
                exit_code: 1,
                stdout: String::new(),
                stderr: "rm: Operation not permitted".to_string(),
            });
        }
        self.inner.run(command, options).await
    }

    async fn put(&self, local: &Path, remote: &str) -> Result<(), ExecError> {
        self.inner.put(local, remote).await
    }
}

/// Every regular file under `dir` with its contents, keyed by relative path.
/// Symlinks are followed, so shared files appear with their live contents.
#[allow(dead_code)]
pub fn snapshot(dir: &Path) -> std::collections::BTreeMap<PathBuf, Vec<u8>> {
    fn walk(base: &Path, dir: &Path, out: &mut std::collections::BTreeMap<PathBuf, Vec<u8>>) {
        for entry in std::fs::read_dir(dir).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                walk(base, &path, out);
            } else {
                let rel = path.strip_prefix(base).unwrap().to_path_buf();
                out.insert(rel, std::fs::read(&path).unwrap());
            }
        }
    }
    let mut files = std::collections::BTreeMap::new();
    walk(dir, dir, &mut files);
    files
}
