//! Docker CLI runtime gateway
//!
//! Every verb shells out to the `docker` binary. Success is the process exit
//! status; output is stdout on success and stderr on failure.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, instrument};

use crate::error::{Result, RuntimeError};
use crate::gateway::{CommandOutput, ContainerRuntime, ContainerSpec, ContainerSummary};

/// Image used for throwaway volume backup/restore containers
const ARCHIVE_IMAGE: &str = "alpine";

/// Runtime gateway backed by the docker CLI
#[derive(Debug, Clone)]
pub struct DockerCli {
    binary: PathBuf,
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new()
    }
}

impl DockerCli {
    pub fn new() -> Self {
        Self {
            binary: PathBuf::from("docker"),
        }
    }

    /// Use a specific docker-compatible binary
    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Run one docker invocation and capture its output
    #[instrument(skip(self, args), fields(verb = args.first().map(String::as_str).unwrap_or("")))]
    pub async fn command(&self, args: &[String]) -> CommandOutput {
        let result = Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await;

        match result {
            Ok(output) if output.status.success() => {
                CommandOutput::ok(String::from_utf8_lossy(&output.stdout).into_owned())
            }
            Ok(output) => {
                let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
                debug!(status = ?output.status.code(), stderr = %stderr.trim(), "docker command failed");
                CommandOutput::failed(stderr)
            }
            Err(e) => CommandOutput::failed(format!(
                "failed to execute {}: {}",
                self.binary.display(),
                e
            )),
        }
    }

    async fn exact_name_listed(&self, kind: &str, name: &str) -> Result<bool> {
        let output = self
            .command(&args([
                kind,
                "ls",
                "--format",
                "{{.Name}}",
                "--filter",
                &format!("name=^{}$", name),
            ]))
            .await
            .into_result(&format!("{} ls", kind))?;
        Ok(output.lines().any(|line| line.trim() == name))
    }

    async fn ensure_named(&self, kind: &str, name: &str) -> CommandOutput {
        match self.exact_name_listed(kind, name).await {
            Ok(true) => CommandOutput::ok(format!("{} {} already exists", capitalize(kind), name)),
            Ok(false) => self.command(&args([kind, "create", name])).await,
            Err(e) => CommandOutput::failed(e.to_string()),
        }
    }
}

fn args<const N: usize>(items: [&str; N]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn archive_parts(archive: &Path) -> std::result::Result<(String, String), String> {
    let dir = archive
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let file = archive
        .file_name()
        .ok_or_else(|| format!("invalid archive path {}", archive.display()))?;
    Ok((
        dir.display().to_string(),
        file.to_string_lossy().into_owned(),
    ))
}

/// Group id of the host's docker group, for socket access inside workers
pub fn docker_group_id() -> String {
    if cfg!(target_os = "macos") {
        return "20".to_string();
    }
    std::fs::read_to_string("/etc/group")
        .ok()
        .and_then(|groups| parse_group_id(&groups, "docker"))
        .unwrap_or_else(|| "999".to_string())
}

fn parse_group_id(groups: &str, group: &str) -> Option<String> {
    groups.lines().find_map(|line| {
        let mut fields = line.split(':');
        if fields.next()? != group {
            return None;
        }
        let gid = fields.nth(1)?;
        (!gid.is_empty()).then(|| gid.to_string())
    })
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    async fn info(&self) -> CommandOutput {
        self.command(&args(["info"])).await
    }

    async fn status(&self, name: &str) -> Result<Option<String>> {
        let output = self
            .command(&args([
                "ps",
                "-a",
                "--filter",
                &format!("name=^{}$", name),
                "--format",
                "{{.Status}}",
            ]))
            .await
            .into_result("ps")?;
        Ok(output
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(str::to_string))
    }

    async fn run(&self, spec: &ContainerSpec) -> CommandOutput {
        self.command(&spec.to_run_args()).await
    }

    async fn start(&self, name: &str) -> CommandOutput {
        self.command(&args(["start", name])).await
    }

    async fn stop(&self, name: &str) -> CommandOutput {
        self.command(&args(["stop", name])).await
    }

    async fn remove(&self, name_or_id: &str, force: bool) -> CommandOutput {
        if force {
            self.command(&args(["rm", "-f", name_or_id])).await
        } else {
            self.command(&args(["rm", name_or_id])).await
        }
    }

    async fn logs(&self, name: &str) -> CommandOutput {
        self.command(&args(["logs", name])).await
    }

    async fn exec(&self, name: &str, command: &[&str]) -> CommandOutput {
        let mut full = args(["exec", name]);
        full.extend(command.iter().map(|s| s.to_string()));
        self.command(&full).await
    }

    async fn copy_into(&self, source: &Path, name: &str, destination: &str) -> CommandOutput {
        self.command(&[
            "cp".to_string(),
            source.display().to_string(),
            format!("{}:{}", name, destination),
        ])
        .await
    }

    async fn list(&self, prefix: &str) -> Result<Vec<ContainerSummary>> {
        let output = self
            .command(&args([
                "ps",
                "-a",
                "--filter",
                &format!("name={}", prefix),
                "--format",
                "{{.Names}}\t{{.Status}}\t{{.ID}}",
            ]))
            .await
            .into_result("ps")?;

        output
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(ContainerSummary::parse_line)
            .collect()
    }

    async fn build_image(&self, dockerfile: &Path, tag: &str) -> CommandOutput {
        if !dockerfile.is_file() {
            return CommandOutput::failed(format!("Dockerfile {} not found", dockerfile.display()));
        }
        let context = dockerfile
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        self.command(&[
            "build".to_string(),
            "-f".to_string(),
            dockerfile.display().to_string(),
            "-t".to_string(),
            tag.to_string(),
            context.display().to_string(),
        ])
        .await
    }

    async fn ensure_network(&self, name: &str) -> CommandOutput {
        self.ensure_named("network", name).await
    }

    async fn ensure_volume(&self, name: &str) -> CommandOutput {
        self.ensure_named("volume", name).await
    }

    async fn backup_volume(&self, volume: &str, archive: &Path) -> CommandOutput {
        let (dir, file) = match archive_parts(archive) {
            Ok(parts) => parts,
            Err(e) => return CommandOutput::failed(e),
        };
        if let Err(e) = tokio::fs::create_dir_all(&dir).await {
            return CommandOutput::failed(RuntimeError::Io(e).to_string());
        }
        self.command(&[
            "run".to_string(),
            "--rm".to_string(),
            "-v".to_string(),
            format!("{}:/source:ro", volume),
            "-v".to_string(),
            format!("{}:/backup", dir),
            ARCHIVE_IMAGE.to_string(),
            "tar".to_string(),
            "czf".to_string(),
            format!("/backup/{}", file),
            "-C".to_string(),
            "/source".to_string(),
            ".".to_string(),
        ])
        .await
    }

    async fn restore_volume(&self, volume: &str, archive: &Path) -> CommandOutput {
        if !archive.is_file() {
            return CommandOutput::failed(format!(
                "Backup file {} does not exist",
                archive.display()
            ));
        }
        let (dir, file) = match archive_parts(archive) {
            Ok(parts) => parts,
            Err(e) => return CommandOutput::failed(e),
        };
        self.command(&[
            "run".to_string(),
            "--rm".to_string(),
            "-v".to_string(),
            format!("{}:/target", volume),
            "-v".to_string(),
            format!("{}:/backup", dir),
            ARCHIVE_IMAGE.to_string(),
            "sh".to_string(),
            "-c".to_string(),
            format!("cd /target && tar xzf /backup/{}", file),
        ])
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_group_id() {
        let groups = "root:x:0:\nwheel:x:10:me\ndocker:x:998:me,ci\n";
        assert_eq!(parse_group_id(groups, "docker"), Some("998".to_string()));
        assert_eq!(parse_group_id(groups, "podman"), None);
    }

    #[test]
    fn test_archive_parts() {
        let (dir, file) = archive_parts(Path::new("/data/volumes/jenkins-backup.tar.gz")).unwrap();
        assert_eq!(dir, "/data/volumes");
        assert_eq!(file, "jenkins-backup.tar.gz");

        let (dir, _) = archive_parts(Path::new("backup.tar.gz")).unwrap();
        assert_eq!(dir, ".");
    }

    #[tokio::test]
    async fn test_missing_binary_reports_failure() {
        let docker = DockerCli::with_binary("/nonexistent/docker-binary");
        let output = docker.info().await;
        assert!(!output.success);
        assert!(output.output.contains("failed to execute"));
        assert!(matches!(
            docker.status("anything").await,
            Err(RuntimeError::CommandFailed { verb, .. }) if verb == "ps"
        ));
        assert!(docker.is_running("anything").await.is_err());
        assert!(docker.list("jenkins-local-agent").await.is_err());
    }

    #[tokio::test]
    async fn test_restore_requires_archive() {
        let docker = DockerCli::with_binary("/nonexistent/docker-binary");
        let output = docker
            .restore_volume("jenkins-local-data", Path::new("/nonexistent/backup.tar.gz"))
            .await;
        assert!(!output.success);
        assert!(output.output.contains("does not exist"));
    }

    #[test]
    fn test_capitalize() {
        assert_eq!(capitalize("network"), "Network");
        assert_eq!(capitalize(""), "");
    }
}
