//! Version-control seam.
//!
//! Git runs as synchronous subprocesses. Callers treat every method as a
//! critical section over the working tree and never run two at once.

use std::collections::{BTreeMap, VecDeque};
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::sync::Mutex;
use tracing::{debug, trace};

use prd_core::{ChangeOp, Error, Result};

/// Working-tree operations the reconcilers need.
pub trait Vcs: Send + Sync {
    /// Changed files under `path`, as absolute paths. With `indexed_only`
    /// only staged changes are reported.
    fn status(&self, path: &Path, indexed_only: bool) -> Result<Vec<(ChangeOp, PathBuf)>>;

    /// Stash local edits of `paths`. Returns whether anything was stashed.
    fn stash_push(&self, paths: &[PathBuf]) -> Result<bool>;

    /// Stage and commit `paths`.
    fn commit(&self, paths: &[PathBuf], message: &str) -> Result<()>;

    /// Restore the latest stash. Conflicts are left in the tree.
    fn stash_pop(&self) -> Result<()>;

    /// Paths with unresolved merge conflicts.
    fn unresolved(&self) -> Result<Vec<PathBuf>>;

    /// Content of `path` at `HEAD`, `None` when it is not committed.
    fn show_head(&self, path: &Path) -> Result<Option<String>>;
}

/// Parse `git status --porcelain=v1 -z` output into change records.
///
/// Renames become a deletion of the old path and a staged creation of the new one.
pub fn parse_porcelain(output: &str, indexed_only: bool) -> Vec<(ChangeOp, String)> {
    let mut records = Vec::new();
    let mut tokens = output.split('\0').filter(|t| !t.is_empty());
    while let Some(entry) = tokens.next() {
        if entry.len() < 4 {
            continue;
        }
        let mut codes = entry.chars();
        let x = codes.next().unwrap_or(' ');
        let y = codes.next().unwrap_or(' ');
        let path = entry[3..].to_string();

        if x == 'R' || x == 'C' {
            let original = tokens.next().map(str::to_string);
            if x == 'R' {
                if let Some(original) = original {
                    records.push((ChangeOp::Deleted, original));
                }
            }
            records.push((ChangeOp::CreatedStaged, path));
            continue;
        }

        let op = if indexed_only {
            match x {
                'A' => Some(ChangeOp::CreatedStaged),
                'M' if y == 'M' => Some(ChangeOp::PartiallyUpdated),
                'M' => Some(ChangeOp::Updated),
                'D' => Some(ChangeOp::Deleted),
                _ => None,
            }
        } else {
            match (x, y) {
                ('?', '?') => Some(ChangeOp::Created),
                ('A', 'D') => None,
                ('A', _) => Some(ChangeOp::CreatedStaged),
                ('M', 'M') => Some(ChangeOp::PartiallyUpdated),
                ('M', _) | (_, 'M') => Some(ChangeOp::Updated),
                ('D', _) | (_, 'D') => Some(ChangeOp::Deleted),
                _ => None,
            }
        };
        if let Some(op) = op {
            records.push((op, path));
        }
    }
    records
}

// =============================================================================
// GIT SUBPROCESS
// =============================================================================

/// `git` binary driven through `std::process`.
#[derive(Debug, Clone)]
pub struct GitCli {
    toplevel: PathBuf,
}

impl GitCli {
    /// Open the repository containing `dir`.
    pub fn open(dir: &Path) -> Result<Self> {
        let output = run_git(dir, &["rev-parse", "--show-toplevel"])?;
        let toplevel = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Ok(Self {
            toplevel: PathBuf::from(toplevel),
        })
    }

    pub fn toplevel(&self) -> &Path {
        &self.toplevel
    }

    fn git(&self, args: &[&str]) -> Result<Output> {
        run_git(&self.toplevel, args)
    }

    fn relative(&self, path: &Path) -> String {
        path.strip_prefix(&self.toplevel)
            .unwrap_or(path)
            .to_string_lossy()
            .into_owned()
    }
}

fn git_command(dir: &Path, args: &[&str]) -> Result<Output> {
    trace!(args = ?args, "git");
    Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .map_err(|e| Error::Vcs(format!("cannot run git: {}", e)))
}

fn run_git(dir: &Path, args: &[&str]) -> Result<Output> {
    let output = git_command(dir, args)?;
    if !output.status.success() {
        return Err(Error::Vcs(format!(
            "git {} failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(output)
}

impl Vcs for GitCli {
    fn status(&self, path: &Path, indexed_only: bool) -> Result<Vec<(ChangeOp, PathBuf)>> {
        let scope = self.relative(path);
        let output = self.git(&["status", "--porcelain=v1", "-z", "-uall", "--", &scope])?;
        let text = String::from_utf8_lossy(&output.stdout);
        Ok(parse_porcelain(&text, indexed_only)
            .into_iter()
            .map(|(op, p)| (op, self.toplevel.join(p)))
            .collect())
    }

    fn stash_push(&self, paths: &[PathBuf]) -> Result<bool> {
        let relative: Vec<String> = paths.iter().map(|p| self.relative(p)).collect();
        let mut args = vec!["stash", "push", "--include-untracked", "-m", "prd pull merge", "--"];
        args.extend(relative.iter().map(String::as_str));
        let output = self.git(&args)?;
        let stashed = !String::from_utf8_lossy(&output.stdout).contains("No local changes to save");
        debug!(stashed, "git stash push");
        Ok(stashed)
    }

    fn commit(&self, paths: &[PathBuf], message: &str) -> Result<()> {
        let relative: Vec<String> = paths.iter().map(|p| self.relative(p)).collect();
        let mut add = vec!["add", "-A", "--"];
        add.extend(relative.iter().map(String::as_str));
        self.git(&add)?;
        let mut commit = vec!["commit", "--allow-empty", "-m", message, "--"];
        commit.extend(relative.iter().map(String::as_str));
        self.git(&commit)?;
        Ok(())
    }

    fn stash_pop(&self) -> Result<()> {
        // a conflicting pop exits non-zero but leaves markers to resolve
        let output = git_command(&self.toplevel, &["stash", "pop"])?;
        if !output.status.success() && self.unresolved()?.is_empty() {
            return Err(Error::Vcs(format!(
                "git stash pop failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }

    fn unresolved(&self) -> Result<Vec<PathBuf>> {
        let output = self.git(&["diff", "--name-only", "--diff-filter=U", "-z"])?;
        Ok(String::from_utf8_lossy(&output.stdout)
            .split('\0')
            .filter(|p| !p.is_empty())
            .map(|p| self.toplevel.join(p))
            .collect())
    }

    fn show_head(&self, path: &Path) -> Result<Option<String>> {
        let spec = format!("HEAD:{}", self.relative(path));
        let output = git_command(&self.toplevel, &["show", &spec])?;
        if !output.status.success() {
            return Ok(None);
        }
        Ok(Some(String::from_utf8_lossy(&output.stdout).into_owned()))
    }
}

// =============================================================================
// FAKE
// =============================================================================

/// A recorded call against [`FakeVcs`].
#[derive(Debug, Clone, PartialEq)]
pub enum VcsCall {
    StashPush(Vec<PathBuf>),
    Commit(Vec<PathBuf>, String),
    StashPop,
}

#[derive(Default)]
struct FakeState {
    status: Vec<(ChangeOp, PathBuf)>,
    head: BTreeMap<PathBuf, String>,
    unresolved: VecDeque<Vec<PathBuf>>,
    calls: Vec<VcsCall>,
}

/// Scripted in-memory VCS for reconciler tests.
#[derive(Default)]
pub struct FakeVcs {
    state: Mutex<FakeState>,
}

impl FakeVcs {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Report a change from `status`.
    pub fn with_change(self, op: ChangeOp, path: impl Into<PathBuf>) -> Self {
        self.lock().status.push((op, path.into()));
        self
    }

    pub fn set_changes(&self, changes: Vec<(ChangeOp, PathBuf)>) {
        self.lock().status = changes;
    }

    /// Committed content of a file.
    pub fn with_head(self, path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        self.lock().head.insert(path.into(), content.into());
        self
    }

    /// Successive answers of `unresolved()`; empty once exhausted.
    pub fn with_unresolved(self, rounds: Vec<Vec<PathBuf>>) -> Self {
        self.lock().unresolved = rounds.into();
        self
    }

    pub fn calls(&self) -> Vec<VcsCall> {
        self.lock().calls.clone()
    }
}

impl Vcs for FakeVcs {
    fn status(&self, path: &Path, indexed_only: bool) -> Result<Vec<(ChangeOp, PathBuf)>> {
        Ok(self
            .lock()
            .status
            .iter()
            .filter(|(op, p)| p.starts_with(path) && (!indexed_only || *op != ChangeOp::Created))
            .cloned()
            .collect())
    }

    fn stash_push(&self, paths: &[PathBuf]) -> Result<bool> {
        self.lock().calls.push(VcsCall::StashPush(paths.to_vec()));
        Ok(true)
    }

    fn commit(&self, paths: &[PathBuf], message: &str) -> Result<()> {
        self.lock()
            .calls
            .push(VcsCall::Commit(paths.to_vec(), message.to_string()));
        Ok(())
    }

    fn stash_pop(&self) -> Result<()> {
        self.lock().calls.push(VcsCall::StashPop);
        Ok(())
    }

    fn unresolved(&self) -> Result<Vec<PathBuf>> {
        Ok(self.lock().unresolved.pop_front().unwrap_or_default())
    }

    fn show_head(&self, path: &Path) -> Result<Option<String>> {
        Ok(self.lock().head.get(path).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_porcelain_codes() {
        let output = "?? a/new.json\0A  a/staged.json\0AM a/staged_edit.json\0 M a/edit.json\0MM a/partial.json\0 D a/gone.json\0";
        let records = parse_porcelain(output, false);
        assert_eq!(
            records,
            vec![
                (ChangeOp::Created, "a/new.json".to_string()),
                (ChangeOp::CreatedStaged, "a/staged.json".to_string()),
                (ChangeOp::CreatedStaged, "a/staged_edit.json".to_string()),
                (ChangeOp::Updated, "a/edit.json".to_string()),
                (ChangeOp::PartiallyUpdated, "a/partial.json".to_string()),
                (ChangeOp::Deleted, "a/gone.json".to_string()),
            ]
        );
    }

    #[test]
    fn test_parse_porcelain_rename() {
        let output = "R  hooks/New_[1].json\0hooks/Old_[1].json\0";
        let records = parse_porcelain(output, false);
        assert_eq!(
            records,
            vec![
                (ChangeOp::Deleted, "hooks/Old_[1].json".to_string()),
                (ChangeOp::CreatedStaged, "hooks/New_[1].json".to_string()),
            ]
        );
    }

    #[test]
    fn test_parse_porcelain_indexed_only() {
        let output = "?? a/new.json\0 M a/edit.json\0M  a/staged.json\0D  a/gone.json\0";
        let records = parse_porcelain(output, true);
        assert_eq!(
            records,
            vec![
                (ChangeOp::Updated, "a/staged.json".to_string()),
                (ChangeOp::Deleted, "a/gone.json".to_string()),
            ]
        );
    }

    #[test]
    fn test_fake_vcs_unresolved_rounds() {
        let vcs = FakeVcs::new().with_unresolved(vec![vec![PathBuf::from("x.json")]]);
        assert_eq!(vcs.unresolved().unwrap().len(), 1);
        assert!(vcs.unresolved().unwrap().is_empty());
    }
}
