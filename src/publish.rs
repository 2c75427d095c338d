//! Publishing written files to the hosting git repository

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, info};

use crate::config::PublishConfig;
use crate::error::AirsoundsError;

/// Environment variables signalling a CI runner
const CI_VARIABLES: [&str; 2] = ["CI", "GITHUB_ACTIONS"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Nothing differs from the last commit
    NoChanges,
    Committed { files: usize, pushed: bool },
}

/// Publishes the files a run modified
pub trait ChangePublisher {
    fn publish(&self, paths: &[PathBuf]) -> Result<PublishOutcome, AirsoundsError>;
}

/// Whether the process runs on a CI runner
#[must_use]
pub fn in_ci() -> bool {
    CI_VARIABLES.iter().any(|name| {
        std::env::var(name).is_ok_and(|value| !value.is_empty() && value != "false" && value != "0")
    })
}

/// Hand `paths` to `publisher` unless there is nothing to publish
pub fn publish_if_changed(
    publisher: &dyn ChangePublisher,
    paths: &[PathBuf],
) -> Result<PublishOutcome, AirsoundsError> {
    if paths.is_empty() {
        info!("No modified files, nothing to publish");
        return Ok(PublishOutcome::NoChanges);
    }
    publisher.publish(paths)
}

/// Commits (and optionally pushes) through the `git` command line.
/// Paths are interpreted relative to the process working directory, so
/// `repo_dir` should contain them.
#[derive(Debug, Clone)]
pub struct GitPublisher {
    repo_dir: PathBuf,
    author_name: String,
    author_email: String,
    message: String,
    push: bool,
}

impl GitPublisher {
    #[must_use]
    pub fn new(config: &PublishConfig) -> Self {
        Self {
            repo_dir: PathBuf::from(&config.repo_dir),
            author_name: config.author_name.clone(),
            author_email: config.author_email.clone(),
            message: config.message.clone(),
            push: config.push,
        }
    }

    fn git<I, S>(&self, args: I) -> Result<String, AirsoundsError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let args: Vec<_> = args.into_iter().map(|a| a.as_ref().to_os_string()).collect();
        debug!("git {:?}", args);
        let output = Command::new("git")
            .current_dir(&self.repo_dir)
            .args(&args)
            .output()
            .map_err(|e| AirsoundsError::publish(format!("Failed to run git: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AirsoundsError::publish(format!(
                "git {} failed: {}",
                args.first().map(|a| a.to_string_lossy()).unwrap_or_default(),
                stderr.trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn with_paths<'a>(command: &[&'a str], paths: &'a [PathBuf]) -> Vec<&'a OsStr> {
        command
            .iter()
            .map(|c| OsStr::new(*c))
            .chain(std::iter::once(OsStr::new("--")))
            .chain(paths.iter().map(|p| p.as_os_str()))
            .collect()
    }
}

impl ChangePublisher for GitPublisher {
    fn publish(&self, paths: &[PathBuf]) -> Result<PublishOutcome, AirsoundsError> {
        let status = self.git(Self::with_paths(&["status", "--porcelain"], paths))?;
        let files = status.lines().filter(|l| !l.trim().is_empty()).count();
        if files == 0 {
            info!("No changes to publish");
            return Ok(PublishOutcome::NoChanges);
        }

        self.git(["config", "user.name", self.author_name.as_str()])?;
        self.git(["config", "user.email", self.author_email.as_str()])?;
        self.git(Self::with_paths(&["add"], paths))?;
        self.git(Self::with_paths(&["commit", "-m", self.message.as_str()], paths))?;
        if self.push {
            self.git(["push"])?;
        }

        info!("Published {} changed files (pushed: {})", files, self.push);
        Ok(PublishOutcome::Committed {
            files,
            pushed: self.push,
        })
    }
}

/// Whether `dir` is inside a git work tree
#[must_use]
pub fn is_git_repo(dir: &Path) -> bool {
    Command::new("git")
        .current_dir(dir)
        .args(["rev-parse", "--is-inside-work-tree"])
        .output()
        .is_ok_and(|o| o.status.success())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::fs;
    use tempfile::TempDir;

    #[derive(Default)]
    struct RecordingPublisher {
        calls: RefCell<Vec<Vec<PathBuf>>>,
    }

    impl ChangePublisher for RecordingPublisher {
        fn publish(&self, paths: &[PathBuf]) -> Result<PublishOutcome, AirsoundsError> {
            self.calls.borrow_mut().push(paths.to_vec());
            Ok(PublishOutcome::Committed {
                files: paths.len(),
                pushed: false,
            })
        }
    }

    #[test]
    fn test_empty_set_never_reaches_publisher() {
        let publisher = RecordingPublisher::default();
        let outcome = publish_if_changed(&publisher, &[]).unwrap();
        assert_eq!(outcome, PublishOutcome::NoChanges);
        assert!(publisher.calls.borrow().is_empty());
    }

    #[test]
    fn test_modified_paths_are_forwarded() {
        let publisher = RecordingPublisher::default();
        let paths = vec![PathBuf::from("data/2024/03/01/06/noaa-megido.json"), PathBuf::from("data/index.json")];
        publish_if_changed(&publisher, &paths).unwrap();
        assert_eq!(publisher.calls.borrow().as_slice(), &[paths]);
    }

    fn git_available() -> bool {
        Command::new("git").arg("--version").output().is_ok_and(|o| o.status.success())
    }

    #[test]
    fn test_git_publisher_commits_once() {
        if !git_available() {
            return;
        }
        let dir = TempDir::new().unwrap();
        let init = Command::new("git").current_dir(dir.path()).arg("init").output().unwrap();
        assert!(init.status.success());
        assert!(is_git_repo(dir.path()));

        let config = PublishConfig {
            repo_dir: dir.path().display().to_string(),
            push: false,
            ..PublishConfig::default()
        };
        let publisher = GitPublisher::new(&config);

        fs::write(dir.path().join("index.json"), "{}\n").unwrap();
        let paths = vec![PathBuf::from("index.json")];
        assert_eq!(
            publisher.publish(&paths).unwrap(),
            PublishOutcome::Committed {
                files: 1,
                pushed: false
            }
        );
        assert_eq!(publisher.publish(&paths).unwrap(), PublishOutcome::NoChanges);

        let log = publisher.git(["log", "--format=%an <%ae> %s"]).unwrap();
        assert_eq!(log.trim(), "Forecast Bot <bot@airsounds.github.io> Update forecast data");
    }

    #[test]
    fn test_unrelated_staged_file_is_not_committed() {
        if !git_available() {
            return;
        }
        let dir = TempDir::new().unwrap();
        let init = Command::new("git").current_dir(dir.path()).arg("init").output().unwrap();
        assert!(init.status.success());

        let config = PublishConfig {
            repo_dir: dir.path().display().to_string(),
            push: false,
            ..PublishConfig::default()
        };
        let publisher = GitPublisher::new(&config);

        fs::write(dir.path().join("notes.txt"), "draft\n").unwrap();
        publisher.git(["add", "notes.txt"]).unwrap();
        fs::write(dir.path().join("index.json"), "{}\n").unwrap();

        let outcome = publisher.publish(&[PathBuf::from("index.json")]).unwrap();
        assert_eq!(
            outcome,
            PublishOutcome::Committed {
                files: 1,
                pushed: false
            }
        );

        let committed = publisher.git(["show", "--name-only", "--format=", "HEAD"]).unwrap();
        assert_eq!(committed.trim(), "index.json");
        let status = publisher.git(["status", "--porcelain"]).unwrap();
        assert_eq!(status.trim(), "A  notes.txt");
    }

    #[test]
    fn test_git_failure_is_fatal() {
        if !git_available() {
            return;
        }
        let dir = TempDir::new().unwrap();
        let config = PublishConfig {
            repo_dir: dir.path().display().to_string(),
            ..PublishConfig::default()
        };
        let err = GitPublisher::new(&config)
            .publish(&[PathBuf::from("index.json")])
            .unwrap_err();
        assert!(matches!(err, AirsoundsError::Publish { .. }));
    }
}
