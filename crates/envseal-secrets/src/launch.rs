//! Scoped child-process launch with the secrets bundle in its environment.
//!
//! The bundle is passed explicitly to [`ScopedLaunch::run`]; nothing is
//! exported into this process's own environment. When a dependent tool needs
//! a file (`docker run --env-file`), [`VolatileEnvFile`] writes one to a
//! memory-backed directory and removes it when dropped, which covers normal
//! exit, error returns and unwinding. Termination signals are trapped by
//! [`ShutdownSignals`], installed before the file exists, so they unwind
//! through the same drop instead of killing the process with it in place.

use envseal_core::env::vars;
use rand::RngCore;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::artifacts::PRIVATE_MODE;
use crate::bundle::SecretsBundle;
use crate::error::{Result, SecretError};

/// Placeholder in launch arguments replaced by the volatile file path.
pub const ENV_FILE_PLACEHOLDER: &str = "{env_file}";

/// Exit codes reported when the launch is interrupted (`128 + signal`).
const SIGINT_EXIT: i32 = 130;
#[cfg(unix)]
const SIGHUP_EXIT: i32 = 129;
#[cfg(unix)]
const SIGQUIT_EXIT: i32 = 131;
#[cfg(unix)]
const SIGTERM_EXIT: i32 = 143;

/// Trapped SIGINT, SIGTERM, SIGHUP and SIGQUIT.
///
/// While this value lives, those signals no longer take their default action;
/// they are queued until [`ShutdownSignals::recv`] observes them. Install it
/// before writing a [`VolatileEnvFile`] so no signal can end the process
/// between writing the file and dropping its guard.
#[derive(Debug)]
pub struct ShutdownSignals {
    #[cfg(unix)]
    interrupt: tokio::signal::unix::Signal,
    #[cfg(unix)]
    terminate: tokio::signal::unix::Signal,
    #[cfg(unix)]
    hangup: tokio::signal::unix::Signal,
    #[cfg(unix)]
    quit: tokio::signal::unix::Signal,
}

impl ShutdownSignals {
    /// Register the handlers. Must be called inside a tokio runtime.
    #[cfg(unix)]
    pub fn install() -> Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};
        let signals = Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
            hangup: signal(SignalKind::hangup())?,
            quit: signal(SignalKind::quit())?,
        };
        debug!("termination signals trapped");
        Ok(signals)
    }

    #[cfg(not(unix))]
    pub fn install() -> Result<Self> {
        Ok(Self {})
    }

    /// Resolves with the conventional exit code of the first signal received.
    #[cfg(unix)]
    pub async fn recv(&mut self) -> i32 {
        tokio::select! {
            Some(()) = self.interrupt.recv() => SIGINT_EXIT,
            Some(()) = self.terminate.recv() => SIGTERM_EXIT,
            Some(()) = self.hangup.recv() => SIGHUP_EXIT,
            Some(()) = self.quit.recv() => SIGQUIT_EXIT,
            else => std::future::pending::<i32>().await,
        }
    }

    #[cfg(not(unix))]
    pub async fn recv(&mut self) -> i32 {
        match tokio::signal::ctrl_c().await {
            Ok(()) => SIGINT_EXIT,
            Err(_) => std::future::pending().await,
        }
    }
}

/// Owner-only env file on a memory-backed filesystem, removed on drop.
#[derive(Debug)]
pub struct VolatileEnvFile {
    path: PathBuf,
}

impl VolatileEnvFile {
    /// Write `bundle` as `KEY=value` lines into a new file under `dir`.
    ///
    /// With `require_memory_backed`, refuses any directory that is not on
    /// tmpfs/ramfs.
    pub fn create(dir: &Path, bundle: &SecretsBundle, require_memory_backed: bool) -> Result<Self> {
        if !dir.is_dir() {
            return Err(SecretError::InsecureLocation(format!(
                "{} is not a directory",
                dir.display()
            )));
        }
        if require_memory_backed && !is_memory_backed(dir) {
            return Err(SecretError::InsecureLocation(format!(
                "{} is not on a memory-backed filesystem",
                dir.display()
            )));
        }

        let mut suffix = [0u8; 8];
        rand::thread_rng().fill_bytes(&mut suffix);
        let path = dir.join(format!(
            "envseal-{}-{}.env",
            std::process::id(),
            hex::encode(suffix)
        ));

        let mut options = fs::OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(PRIVATE_MODE);
        }
        #[cfg(not(unix))]
        let _ = PRIVATE_MODE;

        let mut file = options.open(&path)?;
        // From here on the guard owns the path, so a failed write still cleans up.
        let guard = Self { path };
        file.write_all(bundle.to_lines().as_bytes())?;
        file.sync_all()?;

        debug!(path = %guard.path.display(), keys = bundle.len(), "volatile env file written");
        Ok(guard)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for VolatileEnvFile {
    fn drop(&mut self) {
        match fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "volatile env file removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "failed to remove volatile env file"),
        }
    }
}

/// Whether `dir` lives on tmpfs or ramfs.
#[cfg(target_os = "linux")]
pub fn is_memory_backed(dir: &Path) -> bool {
    let Ok(canonical) = dir.canonicalize() else {
        return false;
    };
    match fs::read_to_string("/proc/mounts") {
        Ok(mounts) => memory_backed_in(&mounts, &canonical),
        Err(_) => false,
    }
}

/// Memory-backed mounts cannot be verified on this platform.
#[cfg(not(target_os = "linux"))]
pub fn is_memory_backed(_dir: &Path) -> bool {
    false
}

/// Longest-prefix match of `path` against a `/proc/mounts` table.
pub fn memory_backed_in(mounts: &str, path: &Path) -> bool {
    mounts
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let _device = fields.next()?;
            let mount_point = unescape_mount_point(fields.next()?);
            let fs_type = fields.next()?;
            Some((PathBuf::from(mount_point), fs_type))
        })
        .filter(|(mount_point, _)| path.starts_with(mount_point))
        .max_by_key(|(mount_point, _)| mount_point.components().count())
        .map(|(_, fs_type)| matches!(fs_type, "tmpfs" | "ramfs"))
        .unwrap_or(false)
}

/// `/proc/mounts` encodes space, tab, newline and backslash as octal escapes.
fn unescape_mount_point(raw: &str) -> String {
    raw.replace("\\040", " ")
        .replace("\\011", "\t")
        .replace("\\012", "\n")
        .replace("\\134", "\\")
}

/// Result of a scoped launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchOutcome {
    /// Child exit code; `128 + signal` when it was killed by a signal.
    pub exit_code: i32,

    /// We stopped the child because this process received a termination signal.
    pub interrupted: bool,

    pub duration_ms: u64,
}

impl LaunchOutcome {
    pub fn success(&self) -> bool {
        self.exit_code == 0 && !self.interrupted
    }
}

/// A child process launched with a secrets bundle in its environment.
#[derive(Debug)]
pub struct ScopedLaunch {
    program: String,
    args: Vec<String>,
    cwd: Option<PathBuf>,
    env_file: Option<VolatileEnvFile>,
    env_file_grace: Option<Duration>,
    signals: Option<ShutdownSignals>,
}

impl ScopedLaunch {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            cwd: None,
            env_file: None,
            env_file_grace: None,
            signals: None,
        }
    }

    /// Build from an argv (`command...` after `--`).
    pub fn from_argv(argv: &[String]) -> Result<Self> {
        let (program, args) = argv.split_first().ok_or_else(|| SecretError::Launch {
            command: String::new(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "no command given"),
        })?;
        Ok(Self::new(program.clone(), args.to_vec()))
    }

    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Hand a volatile env file to the child. Its path replaces
    /// `{env_file}` in the arguments and is exported as `ENVSEAL_ENV_FILE`.
    pub fn with_env_file(mut self, env_file: VolatileEnvFile) -> Self {
        self.env_file = Some(env_file);
        self
    }

    /// Remove the env file this long after the child started, instead of
    /// when it exits.
    pub fn with_env_file_grace(mut self, grace: Duration) -> Self {
        self.env_file_grace = Some(grace);
        self
    }

    /// Use handlers installed earlier; signals queued since then stop the
    /// child as soon as it starts.
    pub fn with_signals(mut self, signals: ShutdownSignals) -> Self {
        self.signals = Some(signals);
        self
    }

    /// Run the child to completion.
    ///
    /// On a termination signal the child is killed and the env file removed
    /// before returning an interrupted outcome.
    pub async fn run(self, bundle: &SecretsBundle) -> Result<LaunchOutcome> {
        let Self {
            program,
            args,
            cwd,
            mut env_file,
            env_file_grace,
            signals,
        } = self;
        let mut signals = match signals {
            Some(signals) => signals,
            None => ShutdownSignals::install()?,
        };

        let args: Vec<String> = match &env_file {
            Some(file) => {
                let path = file.path().to_string_lossy();
                args.iter()
                    .map(|a| a.replace(ENV_FILE_PLACEHOLDER, &path))
                    .collect()
            }
            None => args,
        };

        let mut cmd = Command::new(&program);
        cmd.args(&args)
            .envs(bundle.iter().map(|(k, v)| (k, v.expose_secret())))
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        if let Some(dir) = &cwd {
            cmd.current_dir(dir);
        }
        if let Some(file) = &env_file {
            cmd.env(vars::ENVSEAL_ENV_FILE, file.path());
        }

        let start = Instant::now();
        let mut child = cmd.spawn().map_err(|source| SecretError::Launch {
            command: program.clone(),
            source,
        })?;
        info!(command = %program, keys = bundle.len(), pid = ?child.id(), "launched with materialized secrets");

        let grace = async {
            match env_file_grace {
                Some(delay) => tokio::time::sleep(delay).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(grace);
        let shutdown = signals.recv();
        tokio::pin!(shutdown);

        let outcome = loop {
            tokio::select! {
                status = child.wait() => {
                    let status = status.map_err(|source| SecretError::Launch {
                        command: program.clone(),
                        source,
                    })?;
                    break LaunchOutcome {
                        exit_code: exit_code(&status),
                        interrupted: false,
                        duration_ms: start.elapsed().as_millis() as u64,
                    };
                }
                _ = &mut grace, if env_file.is_some() => {
                    drop(env_file.take());
                    debug!("env file grace period elapsed");
                }
                code = &mut shutdown => {
                    warn!(command = %program, "interrupted; stopping child");
                    if let Err(e) = child.kill().await {
                        warn!(error = %e, "failed to kill child");
                    }
                    break LaunchOutcome {
                        exit_code: code,
                        interrupted: true,
                        duration_ms: start.elapsed().as_millis() as u64,
                    };
                }
            }
        };

        drop(env_file);
        debug!(exit_code = outcome.exit_code, duration_ms = outcome.duration_ms, "child finished");
        Ok(outcome)
    }
}

fn exit_code(status: &std::process::ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    1
}
