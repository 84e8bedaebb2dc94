// src/history.rs

use crate::error::{Result, ServiceError};
use crate::model::Patch;
use crate::sources::{HistoryQuery, PatchHistory};
use chrono::{Duration, TimeZone, Utc};
use git2::{Commit, DiffOptions, Oid, Repository};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Patch history read from a local git checkout
#[derive(Debug, Clone)]
pub struct GitHistory {
    repo_path: PathBuf,
}

impl GitHistory {
    pub fn open(repo_path: &Path) -> Result<GitHistory> {
        let repo = Repository::open(repo_path)?;
        debug!(path = %repo_path.display(), bare = repo.is_bare(), "history repository opened");
        Ok(GitHistory { repo_path: repo_path.to_path_buf() })
    }

    /// Walk from the crash's revision when the repository knows it, else from HEAD.
    fn start(repo: &Repository, node: &str) -> std::result::Result<Oid, git2::Error> {
        match repo.revparse_single(node).and_then(|object| object.peel_to_commit()) {
            Ok(commit) => Ok(commit.id()),
            Err(_) => Ok(repo.head()?.peel_to_commit()?.id()),
        }
    }
}

/// True when `commit` changes `path` compared to its first parent.
fn touches(repo: &Repository, commit: &Commit, path: &str) -> std::result::Result<bool, git2::Error> {
    let current_tree = commit.tree()?;
    let parent_tree = if commit.parent_count() > 0 {
        Some(commit.parent(0)?.tree()?)
    } else {
        None
    };

    let mut diff_opts = DiffOptions::new();
    diff_opts.pathspec(path);
    diff_opts.disable_pathspec_match(true);
    diff_opts.ignore_filemode(true);

    let diff = repo.diff_tree_to_tree(parent_tree.as_ref(), Some(&current_tree), Some(&mut diff_opts))?;
    Ok(diff.deltas().len() > 0)
}

impl PatchHistory for GitHistory {
    fn last_patches(&self, query: &HistoryQuery) -> std::result::Result<Vec<Patch>, ServiceError> {
        let repo = Repository::open(&self.repo_path)
            .map_err(|e| ServiceError::Unavailable(format!("{}: {}", self.repo_path.display(), e.message())))?;
        let until = query.until.timestamp();
        let since = (query.until - Duration::days(i64::from(query.lookback_days))).timestamp();

        let mut revwalk = repo.revwalk()?;
        revwalk.push(GitHistory::start(&repo, &query.node)?)?;
        revwalk.set_sorting(git2::Sort::TIME)?;

        let mut patches = Vec::new();
        for oid in revwalk {
            let commit = repo.find_commit(oid?)?;
            let commit_time = commit.time().seconds();
            if commit_time > until {
                continue;
            }
            if commit_time < since {
                break;
            }
            if !touches(&repo, &commit, &query.path)? {
                continue;
            }
            if let Some(pushdate) = Utc.timestamp_opt(commit_time, 0).single() {
                patches.push(Patch { node: commit.id().to_string(), pushdate });
            }
        }
        debug!(channel = %query.channel, path = %query.path, found = patches.len(), "git history walked");
        Ok(patches)
    }
}
