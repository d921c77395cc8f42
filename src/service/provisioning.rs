//! Local account provisioning.
//!
//! A by-name lookup may create the matching local account with the host's
//! account tools. Those tools look the account up before creating it, which
//! re-enters this resolver from a separate process. The guard here detects
//! that by scanning the process table for the exact command line about to be
//! run.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::config::ProvisioningConfig;
use crate::domain::{ResolvedGroup, ResolvedUser};
use crate::error::{ProvisioningError, ResolveError, Result};
use crate::service::telemetry;

/// Exit status `getent` uses for "no such entry".
const GETENT_NOT_FOUND: i32 = 2;

/// Source of the command lines of all running processes.
#[async_trait]
pub trait ProcessTable: Send + Sync {
    /// Command lines of running processes, arguments joined by single spaces.
    async fn command_lines(&self) -> std::result::Result<Vec<String>, ProvisioningError>;
}

/// Process table read from a mounted proc filesystem.
#[derive(Debug, Clone)]
pub struct ProcFs {
    root: PathBuf,
}

impl ProcFs {
    /// Read processes below `root` (normally `/proc`).
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

/// Render a raw NUL-separated `cmdline` as a space-separated string.
#[must_use]
pub fn render_cmdline(raw: &[u8]) -> String {
    raw.split(|b| *b == 0)
        .filter(|arg| !arg.is_empty())
        .map(String::from_utf8_lossy)
        .collect::<Vec<_>>()
        .join(" ")
}

#[async_trait]
impl ProcessTable for ProcFs {
    async fn command_lines(&self) -> std::result::Result<Vec<String>, ProvisioningError> {
        let mut entries = tokio::fs::read_dir(&self.root).await.map_err(|e| {
            ProvisioningError::ProcessTable(format!("{}: {e}", self.root.display()))
        })?;

        let mut lines = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| ProvisioningError::ProcessTable(e.to_string()))?
        {
            let is_pid = entry
                .file_name()
                .to_str()
                .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()));
            if !is_pid {
                continue;
            }

            // Processes exit between listing and reading
            if let Ok(raw) = tokio::fs::read(entry.path().join("cmdline")).await {
                let line = render_cmdline(&raw);
                if !line.is_empty() {
                    lines.push(line);
                }
            }
        }

        Ok(lines)
    }
}

/// Captured result of an external command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` when killed by a signal.
    pub code: Option<i32>,
    /// Standard output.
    pub stdout: String,
    /// Standard error.
    pub stderr: String,
}

impl CommandOutput {
    /// Whether the command exited with status 0.
    #[must_use]
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Runs external commands.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `program` with `args` and capture its output.
    ///
    /// Only a failure to start the command is an error.
    async fn run(
        &self,
        program: &Path,
        args: &[String],
    ) -> std::result::Result<CommandOutput, ProvisioningError>;
}

/// Runs commands as child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemCommandRunner;

#[async_trait]
impl CommandRunner for SystemCommandRunner {
    async fn run(
        &self,
        program: &Path,
        args: &[String],
    ) -> std::result::Result<CommandOutput, ProvisioningError> {
        let output = tokio::process::Command::new(program)
            .args(args)
            .output()
            .await
            .map_err(|e| ProvisioningError::CommandFailed {
                command: command_line(program, args),
                detail: e.to_string(),
            })?;

        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// The host's local account databases.
#[async_trait]
pub trait LocalIdentity: Send + Sync {
    /// Local user by login name.
    async fn user_by_name(
        &self,
        name: &str,
    ) -> std::result::Result<Option<ResolvedUser>, ProvisioningError>;

    /// Local user by uid.
    async fn user_by_uid(
        &self,
        uid: u32,
    ) -> std::result::Result<Option<ResolvedUser>, ProvisioningError>;

    /// Local group by name.
    async fn group_by_name(
        &self,
        name: &str,
    ) -> std::result::Result<Option<ResolvedGroup>, ProvisioningError>;

    /// Local group by gid.
    async fn group_by_gid(
        &self,
        gid: u32,
    ) -> std::result::Result<Option<ResolvedGroup>, ProvisioningError>;
}

/// Local identity lookups through `getent`, restricted to the files service.
pub struct GetentLocalIdentity {
    getent_path: PathBuf,
    runner: Arc<dyn CommandRunner>,
}

impl GetentLocalIdentity {
    /// Use `getent` at the given path.
    #[must_use]
    pub fn new(getent_path: impl Into<PathBuf>, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            getent_path: getent_path.into(),
            runner,
        }
    }

    async fn query(
        &self,
        database: &str,
        key: &str,
    ) -> std::result::Result<Option<String>, ProvisioningError> {
        let args: Vec<String> = ["-s", "files", database, key]
            .into_iter()
            .map(String::from)
            .collect();
        let output = self.runner.run(&self.getent_path, &args).await?;

        match output.code {
            Some(0) => Ok(output.stdout.lines().next().map(String::from)),
            Some(GETENT_NOT_FOUND) => Ok(None),
            _ => Err(ProvisioningError::LocalLookup(format!(
                "getent {database} {key}: {}",
                output.stderr.trim()
            ))),
        }
    }
}

impl std::fmt::Debug for GetentLocalIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GetentLocalIdentity")
            .field("getent_path", &self.getent_path)
            .finish_non_exhaustive()
    }
}

/// Parse a `passwd(5)` line.
#[must_use]
pub fn parse_passwd_line(line: &str) -> Option<ResolvedUser> {
    let fields: Vec<&str> = line.trim_end().split(':').collect();
    if fields.len() != 7 {
        return None;
    }
    Some(ResolvedUser {
        username: fields[0].to_string(),
        uid: fields[2].parse().ok()?,
        gid: fields[3].parse().ok()?,
        display_name: fields[4].to_string(),
        home_directory: fields[5].to_string(),
        shell: fields[6].to_string(),
    })
}

/// Parse a `group(5)` line.
#[must_use]
pub fn parse_group_line(line: &str) -> Option<ResolvedGroup> {
    let fields: Vec<&str> = line.trim_end().split(':').collect();
    if fields.len() != 4 {
        return None;
    }
    Some(ResolvedGroup {
        groupname: fields[0].to_string(),
        gid: fields[2].parse().ok()?,
        members: fields[3]
            .split(',')
            .filter(|m| !m.is_empty())
            .map(String::from)
            .collect(),
    })
}

fn unparseable(line: &str) -> ProvisioningError {
    ProvisioningError::LocalLookup(format!("unparseable entry: {line}"))
}

#[async_trait]
impl LocalIdentity for GetentLocalIdentity {
    async fn user_by_name(
        &self,
        name: &str,
    ) -> std::result::Result<Option<ResolvedUser>, ProvisioningError> {
        match self.query("passwd", name).await? {
            Some(line) => parse_passwd_line(&line).map(Some).ok_or_else(|| unparseable(&line)),
            None => Ok(None),
        }
    }

    async fn user_by_uid(
        &self,
        uid: u32,
    ) -> std::result::Result<Option<ResolvedUser>, ProvisioningError> {
        match self.query("passwd", &uid.to_string()).await? {
            Some(line) => parse_passwd_line(&line).map(Some).ok_or_else(|| unparseable(&line)),
            None => Ok(None),
        }
    }

    async fn group_by_name(
        &self,
        name: &str,
    ) -> std::result::Result<Option<ResolvedGroup>, ProvisioningError> {
        match self.query("group", name).await? {
            Some(line) => parse_group_line(&line).map(Some).ok_or_else(|| unparseable(&line)),
            None => Ok(None),
        }
    }

    async fn group_by_gid(
        &self,
        gid: u32,
    ) -> std::result::Result<Option<ResolvedGroup>, ProvisioningError> {
        match self.query("group", &gid.to_string()).await? {
            Some(line) => parse_group_line(&line).map(Some).ok_or_else(|| unparseable(&line)),
            None => Ok(None),
        }
    }
}

/// Join a program and its arguments the way the process table reports them.
#[must_use]
pub fn command_line(program: &Path, args: &[String]) -> String {
    let mut line = program.display().to_string();
    for arg in args {
        line.push(' ');
        line.push_str(arg);
    }
    line
}

/// An account-creation command about to be run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionCommand {
    /// Executable.
    pub program: PathBuf,
    /// Arguments, ending with the account name.
    pub args: Vec<String>,
}

impl ProvisionCommand {
    /// Full command line.
    #[must_use]
    pub fn command_line(&self) -> String {
        command_line(&self.program, &self.args)
    }
}

/// Creates local accounts on demand, guarded against re-entry.
pub struct Provisioner {
    config: ProvisioningConfig,
    processes: Arc<dyn ProcessTable>,
    runner: Arc<dyn CommandRunner>,
    local: Arc<dyn LocalIdentity>,
}

impl Provisioner {
    /// Create a provisioner from its collaborators.
    pub fn new(
        config: ProvisioningConfig,
        processes: Arc<dyn ProcessTable>,
        runner: Arc<dyn CommandRunner>,
        local: Arc<dyn LocalIdentity>,
    ) -> Self {
        Self {
            config,
            processes,
            runner,
            local,
        }
    }

    /// Create a provisioner backed by the host's proc filesystem, process
    /// spawning and `getent`.
    #[must_use]
    pub fn system(config: ProvisioningConfig) -> Self {
        let runner: Arc<dyn CommandRunner> = Arc::new(SystemCommandRunner);
        let processes = Arc::new(ProcFs::new(config.proc_root.clone()));
        let local = Arc::new(GetentLocalIdentity::new("/usr/bin/getent", runner.clone()));
        Self::new(config, processes, runner, local)
    }

    /// Command creating the user `name`.
    #[must_use]
    pub fn user_command(&self, name: &str) -> ProvisionCommand {
        let mut args = self.config.useradd_args.clone();
        args.push(name.to_string());
        ProvisionCommand {
            program: self.config.useradd_path.clone(),
            args,
        }
    }

    /// Command creating the group `name`.
    #[must_use]
    pub fn group_command(&self, name: &str) -> ProvisionCommand {
        let mut args = self.config.groupadd_args.clone();
        args.push(name.to_string());
        ProvisionCommand {
            program: self.config.groupadd_path.clone(),
            args,
        }
    }

    /// Fail with `ProvisioningConflict` if `command` is already running.
    ///
    /// # Errors
    ///
    /// Returns an error on a guard hit or if the process table is unreadable.
    pub async fn check_guard(&self, command: &ProvisionCommand) -> Result<()> {
        let pending = command.command_line();
        let running = self.processes.command_lines().await?;

        if running.iter().any(|line| *line == pending) {
            telemetry::record_guard_hit();
            warn!(command = %pending, "Account creation already running, not recursing");
            return Err(ResolveError::ProvisioningConflict { command: pending });
        }
        Ok(())
    }

    async fn execute(&self, command: &ProvisionCommand) -> Result<()> {
        let output = self.runner.run(&command.program, &command.args).await?;
        if !output.success() {
            return Err(ProvisioningError::CommandFailed {
                command: command.command_line(),
                detail: format!(
                    "exit status {}: {}",
                    output.code.map_or_else(|| "signal".to_string(), |c| c.to_string()),
                    output.stderr.trim()
                ),
            }
            .into());
        }
        info!(command = %command.command_line(), "Created local account");
        Ok(())
    }

    /// Return the local user `name`, creating it if missing.
    ///
    /// `confirm` runs after the guard and before the tool; it normally checks
    /// that the account exists in the directory.
    ///
    /// # Errors
    ///
    /// Returns an error on a guard hit, a failed confirmation, a failed tool
    /// run, or if the account is still missing afterwards.
    pub async fn ensure_user<F>(&self, name: &str, confirm: F) -> Result<ResolvedUser>
    where
        F: Future<Output = Result<()>> + Send,
    {
        if let Some(user) = self.local.user_by_name(name).await? {
            debug!(name, "Local user already present");
            return Ok(user);
        }

        let command = self.user_command(name);
        self.check_guard(&command).await?;
        confirm.await?;
        self.execute(&command).await?;

        self.local
            .user_by_name(name)
            .await?
            .ok_or_else(|| ProvisioningError::StillMissing(name.to_string()).into())
    }

    /// Return the local group `name`, creating it if missing.
    ///
    /// # Errors
    ///
    /// Same as [`Provisioner::ensure_user`].
    pub async fn ensure_group<F>(&self, name: &str, confirm: F) -> Result<ResolvedGroup>
    where
        F: Future<Output = Result<()>> + Send,
    {
        if let Some(group) = self.local.group_by_name(name).await? {
            debug!(name, "Local group already present");
            return Ok(group);
        }

        let command = self.group_command(name);
        self.check_guard(&command).await?;
        confirm.await?;
        self.execute(&command).await?;

        self.local
            .group_by_name(name)
            .await?
            .ok_or_else(|| ProvisioningError::StillMissing(name.to_string()).into())
    }
}


#[cfg(test)]
mod tests {
    use super::fakes::{FakeLocalIdentity, FakeProcessTable, FakeRunner};
    use super::*;
    use crate::domain::LookupStatus;
    use tempfile::TempDir;

    async fn confirmed() -> Result<()> {
        Ok(())
    }

    async fn rejected() -> Result<()> {
        Err(crate::error::DirectoryError::http(404, "missing").into())
    }

    fn config() -> ProvisioningConfig {
        ProvisioningConfig {
            create_user: true,
            create_group: true,
            ..Default::default()
        }
    }

    fn provisioner(
        running: Vec<String>,
        exit_code: i32,
    ) -> (Provisioner, Arc<FakeRunner>, Arc<FakeLocalIdentity>) {
        let local = Arc::new(FakeLocalIdentity::default());
        let runner = Arc::new(FakeRunner {
            exit_code,
            local: Some(local.clone()),
            ..Default::default()
        });
        let provisioner = Provisioner::new(
            config(),
            Arc::new(FakeProcessTable { lines: running }),
            runner.clone(),
            local.clone(),
        );
        (provisioner, runner, local)
    }

    #[test]
    fn test_render_cmdline() {
        assert_eq!(
            render_cmdline(b"/usr/sbin/useradd\0-m\0alice\0"),
            "/usr/sbin/useradd -m alice"
        );
        assert_eq!(render_cmdline(b""), "");
    }

    #[test]
    fn test_user_command_line() {
        let (provisioner, _, _) = provisioner(vec![], 0);
        assert_eq!(
            provisioner.user_command("alice").command_line(),
            "/usr/sbin/useradd -m -s /bin/bash -c cloudid-nss alice"
        );
        assert_eq!(
            provisioner.group_command("staff").command_line(),
            "/usr/sbin/groupadd staff"
        );
    }

    #[tokio::test]
    async fn test_guard_hit_skips_tool() {
        let running = vec![
            "/sbin/init".to_string(),
            "/usr/sbin/useradd -m -s /bin/bash -c cloudid-nss alice".to_string(),
        ];
        let (provisioner, runner, _) = provisioner(running, 0);

        let err = provisioner
            .ensure_user("alice", confirmed())
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::ProvisioningConflict { .. }));
        assert_eq!(err.status(), LookupStatus::NotFound);
        assert!(runner.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_guard_miss_runs_tool() {
        let running = vec!["/usr/sbin/useradd -m -s /bin/bash -c cloudid-nss bob".to_string()];
        let (provisioner, runner, _) = provisioner(running, 0);

        let user = provisioner
            .ensure_user("alice", confirmed())
            .await
            .unwrap();
        assert_eq!(user.username, "alice");
        assert_eq!(
            *runner.calls.lock(),
            vec!["/usr/sbin/useradd -m -s /bin/bash -c cloudid-nss alice"]
        );
    }

    #[tokio::test]
    async fn test_existing_local_account_short_circuits() {
        let (provisioner, runner, local) = provisioner(vec![], 0);
        local.add_group("staff", 50);

        let group = provisioner
            .ensure_group("staff", confirmed())
            .await
            .unwrap();
        assert_eq!(group.gid, 50);
        assert!(runner.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_failed_confirmation_skips_tool() {
        let (provisioner, runner, _) = provisioner(vec![], 0);

        let err = provisioner
            .ensure_user("ghost", rejected())
            .await
            .unwrap_err();
        assert_eq!(err.status(), LookupStatus::NotFound);
        assert!(runner.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_failed_tool_reports_command() {
        let (provisioner, _, _) = provisioner(vec![], 1);

        let err = provisioner
            .ensure_group("staff", confirmed())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ResolveError::Provisioning(ProvisioningError::CommandFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_proc_fs_reads_numeric_entries() {
        let root = TempDir::new().unwrap();
        for (pid, cmdline) in [("1", &b"/sbin/init\0"[..]), ("42", &b"sleep\0100\0"[..])] {
            let dir = root.path().join(pid);
            std::fs::create_dir(&dir).unwrap();
            std::fs::write(dir.join("cmdline"), cmdline).unwrap();
        }
        // Kernel threads have an empty cmdline; non-pid entries are ignored
        std::fs::create_dir(root.path().join("7")).unwrap();
        std::fs::write(root.path().join("7").join("cmdline"), b"").unwrap();
        std::fs::create_dir(root.path().join("self")).unwrap();
        std::fs::write(root.path().join("self").join("cmdline"), b"x\0").unwrap();

        let mut lines = ProcFs::new(root.path()).command_lines().await.unwrap();
        lines.sort();
        assert_eq!(lines, vec!["/sbin/init", "sleep 100"]);
    }

    #[tokio::test]
    async fn test_proc_fs_missing_root() {
        let table = ProcFs::new("/nonexistent/proc/root");
        assert!(matches!(
            table.command_lines().await,
            Err(ProvisioningError::ProcessTable(_))
        ));
    }

    #[test]
    fn test_parse_lines() {
        let user = parse_passwd_line("alice:x:1001:100:Alice:/home/alice:/bin/bash\n").unwrap();
        assert_eq!(user.uid, 1001);
        assert_eq!(user.shell, "/bin/bash");
        assert!(parse_passwd_line("alice:x:notanumber:100:::").is_none());

        let group = parse_group_line("staff:x:50:alice,bob").unwrap();
        assert_eq!(group.members, vec!["alice", "bob"]);
        assert!(parse_group_line("staff:x:50:").unwrap().members.is_empty());
        assert!(parse_group_line("staff:x").is_none());
    }

    struct ScriptedRunner(CommandOutput);

    #[async_trait]
    impl CommandRunner for ScriptedRunner {
        async fn run(
            &self,
            program: &Path,
            args: &[String],
        ) -> std::result::Result<CommandOutput, ProvisioningError> {
            assert_eq!(program, Path::new("/usr/bin/getent"));
            assert_eq!(&args[..2], ["-s", "files"]);
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn test_getent_exit_codes() {
        let found = GetentLocalIdentity::new(
            "/usr/bin/getent",
            Arc::new(ScriptedRunner(CommandOutput {
                code: Some(0),
                stdout: "staff:x:50:alice\n".to_string(),
                stderr: String::new(),
            })),
        );
        assert_eq!(found.group_by_gid(50).await.unwrap().unwrap().groupname, "staff");

        let missing = GetentLocalIdentity::new(
            "/usr/bin/getent",
            Arc::new(ScriptedRunner(CommandOutput {
                code: Some(2),
                ..Default::default()
            })),
        );
        assert!(missing.user_by_name("ghost").await.unwrap().is_none());

        let broken = GetentLocalIdentity::new(
            "/usr/bin/getent",
            Arc::new(ScriptedRunner(CommandOutput {
                code: Some(1),
                stderr: "bad database".to_string(),
                ..Default::default()
            })),
        );
        assert!(broken.user_by_uid(0).await.is_err());
    }
}
