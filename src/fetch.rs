use crate::{config::SyncConfig, notice::Notice};
use std::{
    ffi::OsStr,
    io,
    path::{Path, PathBuf},
    process::{Command, Output},
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("{} is not a git working copy: {detail}", dir.display())]
    NotAWorkingCopy { dir: PathBuf, detail: String },
    #[error("remote '{remote}' is not configured in {}: {detail}", dir.display())]
    MissingRemote {
        remote: String,
        dir: PathBuf,
        detail: String,
    },
    #[error("remote-tracking ref {reference} not found after fetch")]
    MissingRemoteRef { reference: String },
    #[error("failed to run `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },
    #[error("`{command}` failed ({status}): {stderr}")]
    Command {
        command: String,
        status: String,
        stderr: String,
    },
}

/// The git operations a selective fetch needs.
pub trait Vcs {
    fn check_working_copy(&self, dir: &Path, remote: &str) -> Result<(), FetchError>;
    fn fetch(&self, dir: &Path, remote: &str) -> Result<(), FetchError>;
    fn verify_ref(&self, dir: &Path, reference: &str) -> Result<(), FetchError>;
    fn checkout_file(&self, dir: &Path, reference: &str, path: &str) -> Result<(), FetchError>;
}

#[derive(Debug, Clone)]
pub struct GitCli {
    program: PathBuf,
}

impl Default for GitCli {
    fn default() -> Self {
        Self {
            program: PathBuf::from("git"),
        }
    }
}

impl GitCli {
    fn run<I, S>(&self, dir: &Path, args: I) -> Result<Output, FetchError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let args: Vec<S> = args.into_iter().collect();
        let command = command_line(&self.program, &args);
        let output = Command::new(&self.program)
            .args(&args)
            .current_dir(dir)
            .output()
            .map_err(|source| FetchError::Spawn {
                command: command.clone(),
                source,
            })?;
        if !output.status.success() {
            return Err(FetchError::Command {
                command,
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(output)
    }
}

impl Vcs for GitCli {
    fn check_working_copy(&self, dir: &Path, remote: &str) -> Result<(), FetchError> {
        let inside = self
            .run(dir, ["rev-parse", "--is-inside-work-tree"])
            .map_err(|err| FetchError::NotAWorkingCopy {
                dir: dir.to_path_buf(),
                detail: err.to_string(),
            })?;
        if String::from_utf8_lossy(&inside.stdout).trim() != "true" {
            return Err(FetchError::NotAWorkingCopy {
                dir: dir.to_path_buf(),
                detail: "not inside a work tree".to_string(),
            });
        }

        self.run(dir, ["remote", "get-url", remote])
            .map_err(|err| FetchError::MissingRemote {
                remote: remote.to_string(),
                dir: dir.to_path_buf(),
                detail: err.to_string(),
            })?;
        Ok(())
    }

    fn fetch(&self, dir: &Path, remote: &str) -> Result<(), FetchError> {
        self.run(dir, ["fetch", remote]).map(|_| ())
    }

    fn verify_ref(&self, dir: &Path, reference: &str) -> Result<(), FetchError> {
        let rev = format!("{reference}^{{commit}}");
        match self.run(dir, ["rev-parse", "--verify", "--quiet", rev.as_str()]) {
            Ok(_) => Ok(()),
            Err(FetchError::Command { .. }) => Err(FetchError::MissingRemoteRef {
                reference: reference.to_string(),
            }),
            Err(err) => Err(err),
        }
    }

    fn checkout_file(&self, dir: &Path, reference: &str, path: &str) -> Result<(), FetchError> {
        self.run(dir, ["checkout", reference, "--", path]).map(|_| ())
    }
}

fn command_line<S: AsRef<OsStr>>(program: &Path, args: &[S]) -> String {
    let mut line = program.display().to_string();
    for arg in args {
        line.push(' ');
        line.push_str(&arg.as_ref().to_string_lossy());
    }
    line
}

/// Where selected files come from and where they land.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTarget {
    pub dir: PathBuf,
    pub remote: String,
    pub reference: String,
}

impl FetchTarget {
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            dir: config.mods_dir(),
            remote: config.remote.clone(),
            reference: config.remote_ref(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchProgress {
    Fetching,
    CheckingOut {
        index: usize,
        total: usize,
        name: String,
    },
    Installed {
        name: String,
    },
}

#[derive(Debug)]
pub enum FetchOutcome {
    /// Nothing was selected; git was never invoked.
    Skipped,
    Installed { files: Vec<String> },
    Failed {
        installed: Vec<String>,
        error: FetchError,
    },
}

impl FetchOutcome {
    pub fn notice(&self) -> Option<Notice> {
        match self {
            FetchOutcome::Skipped => None,
            FetchOutcome::Installed { files } => Some(Notice::info(
                "Success",
                format!(
                    "Mods downloaded successfully!\n{} file(s) installed.",
                    files.len()
                ),
            )),
            FetchOutcome::Failed { error, .. } => Some(Notice::error(
                "Git Error",
                format!("Error installing mods:\n{error}"),
            )),
        }
    }
}

/// Updates the remote-tracking ref, then checks out each file from it in
/// order. Stops at the first failure; files already written stay.
pub fn selective_fetch(
    vcs: &dyn Vcs,
    target: &FetchTarget,
    files: &[String],
    mut on_progress: impl FnMut(FetchProgress),
) -> FetchOutcome {
    if files.is_empty() {
        return FetchOutcome::Skipped;
    }

    let mut installed = Vec::new();
    match run_fetch(vcs, target, files, &mut installed, &mut on_progress) {
        Ok(()) => FetchOutcome::Installed { files: installed },
        Err(error) => FetchOutcome::Failed { installed, error },
    }
}

fn run_fetch(
    vcs: &dyn Vcs,
    target: &FetchTarget,
    files: &[String],
    installed: &mut Vec<String>,
    on_progress: &mut impl FnMut(FetchProgress),
) -> Result<(), FetchError> {
    vcs.check_working_copy(&target.dir, &target.remote)?;
    on_progress(FetchProgress::Fetching);
    vcs.fetch(&target.dir, &target.remote)?;
    vcs.verify_ref(&target.dir, &target.reference)?;
    for (index, name) in files.iter().enumerate() {
        on_progress(FetchProgress::CheckingOut {
            index,
            total: files.len(),
            name: name.clone(),
        });
        vcs.checkout_file(&target.dir, &target.reference, name)?;
        installed.push(name.clone());
        on_progress(FetchProgress::Installed { name: name.clone() });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::{cell::RefCell, collections::HashMap, fs};
    use tempfile::TempDir;

    /// In-memory remote: checkout writes the stored bytes into the directory.
    #[derive(Default)]
    struct FakeGit {
        remote_files: HashMap<String, Vec<u8>>,
        fail_checkout: Option<String>,
        no_work_tree: bool,
        calls: RefCell<Vec<String>>,
    }

    impl FakeGit {
        fn with_files(files: &[(&str, &str)]) -> Self {
            Self {
                remote_files: files
                    .iter()
                    .map(|(name, body)| (name.to_string(), body.as_bytes().to_vec()))
                    .collect(),
                ..Self::default()
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.borrow().clone()
        }

        fn count(&self, prefix: &str) -> usize {
            self.calls
                .borrow()
                .iter()
                .filter(|call| call.starts_with(prefix))
                .count()
        }
    }

    impl Vcs for FakeGit {
        fn check_working_copy(&self, dir: &Path, remote: &str) -> Result<(), FetchError> {
            self.calls.borrow_mut().push(format!("probe {remote}"));
            if self.no_work_tree {
                return Err(FetchError::NotAWorkingCopy {
                    dir: dir.to_path_buf(),
                    detail: "fatal: not a git repository".to_string(),
                });
            }
            Ok(())
        }

        fn fetch(&self, _dir: &Path, remote: &str) -> Result<(), FetchError> {
            self.calls.borrow_mut().push(format!("fetch {remote}"));
            Ok(())
        }

        fn verify_ref(&self, _dir: &Path, reference: &str) -> Result<(), FetchError> {
            self.calls.borrow_mut().push(format!("verify {reference}"));
            Ok(())
        }

        fn checkout_file(&self, dir: &Path, reference: &str, path: &str) -> Result<(), FetchError> {
            self.calls
                .borrow_mut()
                .push(format!("checkout {reference} -- {path}"));
            if self.fail_checkout.as_deref() == Some(path) {
                return Err(FetchError::Command {
                    command: format!("git checkout {reference} -- {path}"),
                    status: "exit status: 1".to_string(),
                    stderr: format!("error: pathspec '{path}' did not match any file(s) known to git"),
                });
            }
            let body = self.remote_files.get(path).cloned().unwrap_or_default();
            fs::write(dir.join(path), body).unwrap();
            Ok(())
        }
    }

    fn target(dir: &Path) -> FetchTarget {
        FetchTarget {
            dir: dir.to_path_buf(),
            remote: "origin".to_string(),
            reference: "origin/main".to_string(),
        }
    }

    fn names(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[test]
    fn empty_selection_never_touches_git() {
        let tmp = TempDir::new().unwrap();
        let git = FakeGit::default();
        let mut progress = Vec::new();
        let outcome = selective_fetch(&git, &target(tmp.path()), &[], |step| progress.push(step));

        assert!(matches!(outcome, FetchOutcome::Skipped));
        assert!(outcome.notice().is_none());
        assert!(git.calls().is_empty());
        assert!(progress.is_empty());
    }

    #[test]
    fn failed_checkout_stops_and_keeps_earlier_files() {
        let tmp = TempDir::new().unwrap();
        let mut git = FakeGit::with_files(&[("x.jar", "x-bytes"), ("y.jar", "y-bytes")]);
        git.fail_checkout = Some("y.jar".to_string());

        let outcome = selective_fetch(
            &git,
            &target(tmp.path()),
            &names(&["x.jar", "y.jar", "z.jar"]),
            |_| {},
        );

        assert_eq!(fs::read_to_string(tmp.path().join("x.jar")).unwrap(), "x-bytes");
        assert!(!tmp.path().join("y.jar").exists());
        assert!(!tmp.path().join("z.jar").exists());
        assert_eq!(git.count("checkout"), 2);

        let notice = outcome.notice().unwrap();
        assert!(notice.is_error());
        assert_eq!(notice.title, "Git Error");
        assert!(notice.message.contains("y.jar"));
        match outcome {
            FetchOutcome::Failed { installed, .. } => assert_eq!(installed, names(&["x.jar"])),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn fetches_once_then_checks_out_in_order() {
        let tmp = TempDir::new().unwrap();
        let git = FakeGit::with_files(&[("b.jar", "b"), ("a.jar", "a")]);
        let mut progress = Vec::new();

        let outcome = selective_fetch(
            &git,
            &target(tmp.path()),
            &names(&["b.jar", "a.jar"]),
            |step| progress.push(step),
        );

        assert_eq!(
            git.calls(),
            vec![
                "probe origin",
                "fetch origin",
                "verify origin/main",
                "checkout origin/main -- b.jar",
                "checkout origin/main -- a.jar",
            ]
        );
        assert_eq!(progress.first(), Some(&FetchProgress::Fetching));
        assert_eq!(
            progress.last(),
            Some(&FetchProgress::Installed {
                name: "a.jar".to_string()
            })
        );
        let notice = outcome.notice().unwrap();
        assert!(!notice.is_error());
        assert!(notice.message.starts_with("Mods downloaded successfully!"));
    }

    #[test]
    fn missing_work_tree_fails_before_fetching() {
        let tmp = TempDir::new().unwrap();
        let git = FakeGit {
            no_work_tree: true,
            ..FakeGit::default()
        };
        let outcome = selective_fetch(&git, &target(tmp.path()), &names(&["a.jar"]), |_| {});

        assert!(matches!(outcome, FetchOutcome::Failed { .. }));
        assert_eq!(git.count("fetch"), 0);
        assert!(outcome.notice().unwrap().message.contains("not a git working copy"));
    }

    #[test]
    fn repeated_fetch_overwrites_with_same_content() {
        let tmp = TempDir::new().unwrap();
        let git = FakeGit::with_files(&[("x.jar", "x1"), ("y.jar", "y1")]);
        let selection = names(&["x.jar", "y.jar"]);

        selective_fetch(&git, &target(tmp.path()), &selection, |_| {});
        let first = (
            fs::read(tmp.path().join("x.jar")).unwrap(),
            fs::read(tmp.path().join("y.jar")).unwrap(),
        );
        selective_fetch(&git, &target(tmp.path()), &selection, |_| {});
        let second = (
            fs::read(tmp.path().join("x.jar")).unwrap(),
            fs::read(tmp.path().join("y.jar")).unwrap(),
        );

        assert_eq!(first, second);
        assert_eq!(fs::read_dir(tmp.path()).unwrap().count(), 2);
    }

    fn git_available() -> bool {
        Command::new("git")
            .arg("--version")
            .output()
            .map(|output| output.status.success())
            .unwrap_or(false)
    }

    fn git(dir: &Path, args: &[&str]) {
        let status = Command::new("git")
            .args([
                "-c",
                "user.name=ModSync Test",
                "-c",
                "user.email=test@example.com",
                "-c",
                "commit.gpgsign=false",
            ])
            .args(args)
            .current_dir(dir)
            .output()
            .unwrap();
        assert!(
            status.status.success(),
            "git {args:?}: {}",
            String::from_utf8_lossy(&status.stderr)
        );
    }

    #[test]
    fn real_git_checks_out_only_selected_files() {
        if !git_available() {
            return;
        }
        let tmp = TempDir::new().unwrap();
        let upstream = tmp.path().join("upstream");
        let mods = tmp.path().join("mods");
        fs::create_dir_all(&upstream).unwrap();

        git(&upstream, &["init", "-q"]);
        git(&upstream, &["checkout", "-q", "-b", "main"]);
        fs::write(upstream.join("alpha.jar"), "alpha").unwrap();
        git(&upstream, &["add", "alpha.jar"]);
        git(&upstream, &["commit", "-q", "-m", "alpha"]);
        git(tmp.path(), &["clone", "-q", "upstream", "mods"]);

        fs::write(upstream.join("beta.jar"), "beta").unwrap();
        fs::write(upstream.join("gamma.jar"), "gamma").unwrap();
        git(&upstream, &["add", "beta.jar", "gamma.jar"]);
        git(&upstream, &["commit", "-q", "-m", "beta gamma"]);

        fs::write(mods.join("alpha.jar"), "locally edited").unwrap();

        let target = target(&mods);
        let selection = names(&["beta.jar"]);
        for _ in 0..2 {
            let outcome = selective_fetch(&GitCli::default(), &target, &selection, |_| {});
            assert!(matches!(outcome, FetchOutcome::Installed { .. }), "{outcome:?}");
            assert_eq!(fs::read_to_string(mods.join("beta.jar")).unwrap(), "beta");
        }
        assert_eq!(
            fs::read_to_string(mods.join("alpha.jar")).unwrap(),
            "locally edited"
        );
        assert!(!mods.join("gamma.jar").exists());

        let outcome = selective_fetch(
            &GitCli::default(),
            &target,
            &names(&["missing.jar"]),
            |_| {},
        );
        assert!(matches!(outcome, FetchOutcome::Failed { .. }));
    }

    #[test]
    fn real_git_fetches_the_configured_remote() {
        if !git_available() {
            return;
        }
        let tmp = TempDir::new().unwrap();
        let upstream = tmp.path().join("up");
        let mods = tmp.path().join("mods");
        fs::create_dir_all(&upstream).unwrap();

        git(&upstream, &["init", "-q"]);
        git(&upstream, &["checkout", "-q", "-b", "main"]);
        fs::write(upstream.join("alpha.jar"), "alpha").unwrap();
        git(&upstream, &["add", "alpha.jar"]);
        git(&upstream, &["commit", "-q", "-m", "alpha"]);
        git(tmp.path(), &["clone", "-q", "up", "mods"]);
        git(&mods, &["remote", "add", "mirror", "../up"]);
        git(&mods, &["fetch", "-q", "mirror"]);

        fs::write(upstream.join("beta.jar"), "beta").unwrap();
        git(&upstream, &["add", "beta.jar"]);
        git(&upstream, &["commit", "-q", "-m", "beta"]);

        let mirror = FetchTarget {
            dir: mods.clone(),
            remote: "mirror".to_string(),
            reference: "mirror/main".to_string(),
        };
        let outcome = selective_fetch(&GitCli::default(), &mirror, &names(&["beta.jar"]), |_| {});
        assert!(matches!(outcome, FetchOutcome::Installed { .. }), "{outcome:?}");
        assert_eq!(fs::read_to_string(mods.join("beta.jar")).unwrap(), "beta");
    }

    #[test]
    fn real_git_reports_unknown_branch_as_missing_ref() {
        if !git_available() {
            return;
        }
        let tmp = TempDir::new().unwrap();
        let upstream = tmp.path().join("up");
        fs::create_dir_all(&upstream).unwrap();
        git(&upstream, &["init", "-q"]);
        git(&upstream, &["checkout", "-q", "-b", "main"]);
        fs::write(upstream.join("alpha.jar"), "alpha").unwrap();
        git(&upstream, &["add", "alpha.jar"]);
        git(&upstream, &["commit", "-q", "-m", "alpha"]);
        git(tmp.path(), &["clone", "-q", "up", "mods"]);

        let err = GitCli::default()
            .verify_ref(&tmp.path().join("mods"), "origin/nope")
            .unwrap_err();
        assert!(matches!(err, FetchError::MissingRemoteRef { .. }), "{err:?}");
    }

    #[test]
    fn verify_ref_keeps_spawn_errors() {
        let tmp = TempDir::new().unwrap();
        let git = GitCli {
            program: tmp.path().join("no-such-git"),
        };
        let err = git.verify_ref(tmp.path(), "origin/main").unwrap_err();
        assert!(matches!(err, FetchError::Spawn { .. }), "{err:?}");
    }

    #[test]
    fn real_git_rejects_plain_directory() {
        if !git_available() {
            return;
        }
        let tmp = TempDir::new().unwrap();
        let outcome = selective_fetch(
            &GitCli::default(),
            &target(tmp.path()),
            &names(&["a.jar"]),
            |_| {},
        );
        match outcome {
            FetchOutcome::Failed {
                error: FetchError::NotAWorkingCopy { .. },
                ..
            } => {}
            other => panic!("unexpected outcome: {other:?}"),
        }
    }
}
