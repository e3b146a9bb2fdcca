use std::{fmt, future::Future, io, path::Path, process::Stdio};

use tokio::{
    io::{AsyncBufReadExt, AsyncReadExt, BufReader},
    process::Command,
};
use tracing::{debug, warn};

use crate::UpgradeError;

/// A program and its arguments, kept as plain strings so it can be logged
/// and matched on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    program: String,
    args: Vec<String>,
}

impl Invocation {
    pub fn new<S: Into<String>>(program: S) -> Self {
        Self {
            program: program.into(),
            args: vec![],
        }
    }

    #[must_use]
    pub fn docker() -> Self {
        Self::new("docker")
    }

    #[must_use]
    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    #[must_use]
    pub fn arguments(&self) -> &[String] {
        &self.args
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Output {
    /// `None` when the process was killed by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl Output {
    #[must_use]
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Turns a non-zero exit into [`UpgradeError::CommandFailed`].
    pub fn checked(self, invocation: &Invocation) -> Result<Self, UpgradeError> {
        if self.success() {
            return Ok(self);
        }

        tracing::error!("Command failed: {invocation}");
        if !self.stderr.trim().is_empty() {
            tracing::error!("Error output: {}", self.stderr.trim());
        }

        Err(UpgradeError::CommandFailed {
            command: invocation.to_string(),
            code: self.code,
            stderr: self.stderr,
        })
    }
}

/// Everything the upgrade does to the outside world goes through here.
pub trait Runner: Send + Sync {
    /// Runs to completion, capturing both streams.
    fn run(&self, invocation: &Invocation)
    -> impl Future<Output = Result<Output, UpgradeError>> + Send;

    /// Runs to completion, handing each stdout line to `on_line` as soon as
    /// it is printed. Stderr is collected into the returned [`Output`].
    fn stream<F>(
        &self,
        invocation: &Invocation,
        on_line: F,
    ) -> impl Future<Output = Result<Output, UpgradeError>> + Send
    where
        F: FnMut(&str) + Send;

    /// Runs to completion with stdout redirected into `dest`.
    fn run_to_file(
        &self,
        invocation: &Invocation,
        dest: &Path,
    ) -> impl Future<Output = Result<Output, UpgradeError>> + Send;
}

/// Spawns real processes through `tokio::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl SystemRunner {
    fn command(invocation: &Invocation) -> Command {
        debug!("Executing: {invocation}");
        let mut cmd = Command::new(invocation.program());
        cmd.args(invocation.arguments()).stdin(Stdio::null());
        cmd
    }

    fn spawn_error(invocation: &Invocation) -> impl FnOnce(io::Error) -> UpgradeError + '_ {
        move |source| UpgradeError::Spawn {
            command: invocation.to_string(),
            source,
        }
    }
}

impl Runner for SystemRunner {
    async fn run(&self, invocation: &Invocation) -> Result<Output, UpgradeError> {
        let output = Self::command(invocation)
            .output()
            .await
            .map_err(Self::spawn_error(invocation))?;

        let output = Output {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        if !output.stdout.trim().is_empty() {
            debug!("Command Output: {}", output.stdout.trim());
        }

        Ok(output)
    }

    async fn stream<F>(&self, invocation: &Invocation, mut on_line: F) -> Result<Output, UpgradeError>
    where
        F: FnMut(&str) + Send,
    {
        // Dropping the future (error path, Ctrl-C) must not leave the
        // child running.
        let mut child = Self::command(invocation)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(Self::spawn_error(invocation))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::other("child stdout was not captured"))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| io::Error::other("child stderr was not captured"))?;

        // Drained concurrently so a chatty stderr cannot block the child.
        let stderr_task = tokio::spawn(async move {
            let mut buf = vec![];
            stderr.read_to_end(&mut buf).await.map(|_| buf)
        });

        // Container logs are not guaranteed to be UTF-8.
        let mut reader = BufReader::new(stdout);
        let mut line = vec![];
        while reader.read_until(b'\n', &mut line).await? > 0 {
            on_line(String::from_utf8_lossy(&line).trim_end());
            line.clear();
        }

        let status = child.wait().await?;
        let stderr = match stderr_task.await {
            Ok(read) => String::from_utf8_lossy(&read?).into_owned(),
            Err(err) => {
                warn!("Lost stderr of `{invocation}`: {err}");
                String::new()
            }
        };

        Ok(Output {
            code: status.code(),
            stdout: String::new(),
            stderr,
        })
    }

    async fn run_to_file(&self, invocation: &Invocation, dest: &Path) -> Result<Output, UpgradeError> {
        let file = fs_err::File::create(dest)?;

        let output = Self::command(invocation)
            .stdout(Stdio::from(file.into_parts().0))
            .stderr(Stdio::piped())
            .spawn()
            .map_err(Self::spawn_error(invocation))?
            .wait_with_output()
            .await?;

        Ok(Output {
            code: output.status.code(),
            stdout: String::new(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// The Compose entry point found on this machine: the `docker compose`
/// plugin or the standalone `docker-compose` binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Compose {
    base: Vec<String>,
}

impl Compose {
    #[must_use]
    pub fn plugin() -> Self {
        Self {
            base: vec!["docker".to_owned(), "compose".to_owned()],
        }
    }

    #[must_use]
    pub fn standalone() -> Self {
        Self {
            base: vec!["docker-compose".to_owned()],
        }
    }

    /// `<compose> -f <file> <args...>`
    pub fn file<I, S>(&self, file: &Path, args: I) -> Invocation
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let (program, rest) = self
            .base
            .split_first()
            .map_or(("docker", &[][..]), |(program, rest)| (program.as_str(), rest));

        Invocation::new(program)
            .args(rest.iter().cloned())
            .arg("-f")
            .arg(file.to_string_lossy())
            .args(args)
    }
}

impl fmt::Display for Compose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.base.join(" "))
    }
}

/// Prefers the Compose plugin, then the standalone binary. When neither
/// answers the plugin is assumed so the eventual error names `docker`.
pub async fn detect_compose<R: Runner>(runner: &R) -> Compose {
    let plugin = Invocation::docker().args(["compose", "version"]);
    if runner.run(&plugin).await.is_ok_and(|out| out.success()) {
        return Compose::plugin();
    }

    let standalone = Invocation::new("docker-compose").arg("--version");
    if runner.run(&standalone).await.is_ok_and(|out| out.success()) {
        return Compose::standalone();
    }

    Compose::plugin()
}

/// Fails unless the Docker daemon answers.
pub async fn ensure_docker<R: Runner>(runner: &R) -> Result<(), UpgradeError> {
    let info = Invocation::docker().args(["info", "--format", "{{.ServerVersion}}"]);

    match runner.run(&info).await {
        Ok(out) if out.success() => {
            debug!("Docker server version {}", out.stdout.trim());
            Ok(())
        }
        Ok(out) => Err(UpgradeError::DockerUnavailable(out.stderr.trim().to_owned())),
        Err(err) => Err(UpgradeError::DockerUnavailable(err.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::testing::ScriptedRunner;
    use pretty_assertions::assert_eq;

    #[test]
    fn invocation_display() {
        let inv = Invocation::docker().args(["exec", "db", "pg_isready"]);
        assert_eq!(inv.to_string(), "docker exec db pg_isready");
    }

    #[test]
    fn compose_file_prefix() {
        let file = PathBuf::from("db-composer.yml");

        assert_eq!(
            Compose::plugin().file(&file, ["up", "-d"]).to_string(),
            "docker compose -f db-composer.yml up -d"
        );
        assert_eq!(
            Compose::standalone().file(&file, ["down", "-v"]).to_string(),
            "docker-compose -f db-composer.yml down -v"
        );
    }

    #[test]
    fn checked_keeps_stderr() {
        let out = Output {
            code: Some(2),
            stdout: String::new(),
            stderr: "boom".to_owned(),
        };

        let err = out.checked(&Invocation::new("false")).unwrap_err();
        assert!(matches!(
            err,
            UpgradeError::CommandFailed { code: Some(2), ref stderr, .. } if stderr == "boom"
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn stream_survives_invalid_utf8() {
        let inv = Invocation::new("sh").args(["-c", r"printf 'first\n\377bad\nlast\n'"]);
        let mut seen = vec![];

        let out = SystemRunner
            .stream(&inv, |line| seen.push(line.to_owned()))
            .await
            .unwrap();

        assert!(out.success());
        assert_eq!(seen, vec!["first", "\u{FFFD}bad", "last"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn stream_collects_stderr_and_status() {
        let inv = Invocation::new("sh").args(["-c", "echo out; echo err >&2; exit 3"]);
        let mut seen = vec![];

        let out = SystemRunner
            .stream(&inv, |line| seen.push(line.to_owned()))
            .await
            .unwrap();

        assert_eq!(out.code, Some(3));
        assert_eq!(out.stderr.trim(), "err");
        assert_eq!(seen, vec!["out"]);
    }

    #[tokio::test]
    async fn prefers_compose_plugin() {
        let runner = ScriptedRunner::new(|_| Output::ok(""));
        assert_eq!(detect_compose(&runner).await, Compose::plugin());
    }

    #[tokio::test]
    async fn falls_back_to_standalone_compose() {
        let runner = ScriptedRunner::new(|cmd| {
            if cmd.starts_with("docker compose") {
                Output::failed("unknown command")
            } else {
                Output::ok("docker-compose version 1.29.2")
            }
        });

        assert_eq!(detect_compose(&runner).await, Compose::standalone());
    }

    #[tokio::test]
    async fn assumes_plugin_when_nothing_answers() {
        let runner = ScriptedRunner::new(|_| Output::failed("not found"));
        assert_eq!(detect_compose(&runner).await, Compose::plugin());
    }

    #[tokio::test]
    async fn docker_must_answer() {
        let runner = ScriptedRunner::new(|_| Output::failed("Cannot connect to the Docker daemon"));

        let err = ensure_docker(&runner).await.unwrap_err();
        assert!(matches!(err, UpgradeError::DockerUnavailable(msg) if msg.contains("daemon")));
    }
}
