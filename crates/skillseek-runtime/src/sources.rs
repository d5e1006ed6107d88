//! Source adapters: turn a configured origin into a local, read-only
//! directory of candidate skill roots.
//!
//! Git sources clone into a content-addressed cache keyed by `(url, ref)`;
//! a cache hit skips the network entirely. Local sources yield their path
//! directly. All operations here are blocking and are run by the
//! coordinator under `spawn_blocking` with a per-source timeout.

use crate::config::SourceConfig;
use crate::errors::{Result, ServiceError};
use git2::{FetchOptions, RemoteCallbacks, Repository};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Name of the per-skill manifest file.
pub const MANIFEST_FILE: &str = "SKILL.md";

/// Git reference classification, used to decide whether a refresh can ever
/// observe new commits.
#[derive(Debug, Clone, PartialEq)]
enum GitRef {
    DefaultBranch,
    Branch(String),
    Tag(String),
    Commit(String),
}

impl GitRef {
    fn parse(git_ref: Option<&str>) -> Self {
        let Some(r) = git_ref else { return GitRef::DefaultBranch };
        if r.starts_with('v') && r.chars().nth(1).is_some_and(|c| c.is_ascii_digit()) {
            GitRef::Tag(r.to_string())
        } else if r.len() == 40 && r.chars().all(|c| c.is_ascii_hexdigit()) {
            GitRef::Commit(r.to_string())
        } else {
            GitRef::Branch(r.to_string())
        }
    }

    fn as_refspec(&self) -> Option<&str> {
        match self {
            GitRef::DefaultBranch => None,
            GitRef::Branch(r) | GitRef::Tag(r) | GitRef::Commit(r) => Some(r),
        }
    }

    /// Tags and commits never move; only branches can advance.
    fn is_pinned(&self) -> bool {
        matches!(self, GitRef::Tag(_) | GitRef::Commit(_))
    }
}

/// A configured ingestion origin bound to the service cache directory.
#[derive(Debug, Clone)]
pub struct SkillSource {
    pub config: SourceConfig,
    cache_dir: PathBuf,
}

impl SkillSource {
    pub fn new(config: SourceConfig, cache_dir: PathBuf) -> Self {
        Self { config, cache_dir }
    }

    /// Opaque identifier stamped onto skills loaded from this source.
    pub fn identifier(&self) -> String {
        self.config.identifier()
    }

    /// Cache directory for a git source, keyed by `(url, ref)`.
    fn checkout_dir(&self, url: &str, git_ref: Option<&str>) -> PathBuf {
        let key = blake3::hash(format!("{}#{}", url, git_ref.unwrap_or("HEAD")).as_bytes());
        let repo_name = url.trim_end_matches('/').trim_end_matches(".git");
        let repo_name = repo_name.rsplit('/').next().unwrap_or("repo");
        self.cache_dir.join(format!("{}-{}", repo_name, &key.to_hex().as_str()[..12]))
    }

    /// Yield a local read-only directory with the source contents.
    ///
    /// Blocking: clones over the network on a cache miss.
    pub fn acquire(&self) -> Result<PathBuf> {
        match &self.config {
            SourceConfig::Local { path, .. } => {
                if !path.is_dir() {
                    return Err(ServiceError::SourceUnavailable {
                        source_id: self.identifier(),
                        message: format!("no such directory: {}", path.display()),
                    });
                }
                Ok(path.clone())
            }
            SourceConfig::Git { url, git_ref, subdir, .. } => {
                let dest = self.checkout_dir(url, git_ref.as_deref());
                if dest.join(".git").exists() {
                    debug!(source = %self.identifier(), path = %dest.display(), "source cache hit");
                } else {
                    info!(url = %url, path = %dest.display(), "cloning skill source");
                    self.clone_repo(url, git_ref.as_deref(), &dest)?;
                }
                match subdir {
                    Some(sub) => {
                        let inner = dest.join(sub.trim_matches('/'));
                        if !inner.is_dir() {
                            return Err(ServiceError::SourceUnavailable {
                                source_id: self.identifier(),
                                message: format!("subdirectory '{}' not found", sub),
                            });
                        }
                        Ok(inner)
                    }
                    None => Ok(dest),
                }
            }
        }
    }

    /// Whether the remote ref moved past the cached checkout. Fetches for
    /// branch refs, checks out the new tip when it did, and never touches
    /// the network for pinned tags/commits or local sources.
    pub fn has_advanced(&self) -> Result<bool> {
        let SourceConfig::Git { url, git_ref, .. } = &self.config else {
            return Ok(false);
        };
        let parsed = GitRef::parse(git_ref.as_deref());
        if parsed.is_pinned() {
            return Ok(false);
        }
        let dest = self.checkout_dir(url, git_ref.as_deref());
        if !dest.join(".git").exists() {
            // Never cloned; the next acquire will fetch fresh content.
            return Ok(true);
        }

        let repo = Repository::open(&dest).map_err(|e| self.source_err(e))?;
        let current = repo
            .head()
            .and_then(|h| h.peel_to_commit())
            .map(|c| c.id())
            .map_err(|e| self.source_err(e))?;

        let mut remote = repo.find_remote("origin").map_err(|e| self.source_err(e))?;
        remote
            .fetch(&["refs/heads/*:refs/remotes/origin/*"], None, None)
            .map_err(|e| self.source_err(e))?;
        drop(remote);

        let candidates: Vec<String> = match &parsed {
            GitRef::Branch(b) => vec![format!("refs/remotes/origin/{}", b)],
            _ => vec![
                "refs/remotes/origin/HEAD".to_string(),
                "refs/remotes/origin/main".to_string(),
                "refs/remotes/origin/master".to_string(),
            ],
        };
        let tip = candidates
            .iter()
            .find_map(|name| repo.revparse_single(name).ok())
            .and_then(|obj| obj.peel(git2::ObjectType::Commit).ok())
            .ok_or_else(|| ServiceError::SourceUnavailable {
                source_id: self.identifier(),
                message: "could not resolve remote tip after fetch".to_string(),
            })?;

        if tip.id() == current {
            return Ok(false);
        }
        info!(source = %self.identifier(), from = %current, to = %tip.id(), "source advanced");
        repo.checkout_tree(&tip, None).map_err(|e| self.source_err(e))?;
        repo.set_head_detached(tip.id()).map_err(|e| self.source_err(e))?;
        Ok(true)
    }

    fn clone_repo(&self, url: &str, git_ref: Option<&str>, dest: &Path) -> Result<()> {
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut callbacks = RemoteCallbacks::new();
        callbacks.transfer_progress(|progress| {
            debug!(
                received = progress.received_objects(),
                total = progress.total_objects(),
                "receiving objects"
            );
            true
        });
        let mut fetch_options = FetchOptions::new();
        fetch_options.remote_callbacks(callbacks);

        let mut builder = git2::build::RepoBuilder::new();
        builder.fetch_options(fetch_options);
        let repo = builder.clone(url, dest).map_err(|e| self.source_err(e))?;

        if let Some(refspec) = GitRef::parse(git_ref).as_refspec() {
            self.checkout_ref(&repo, refspec)?;
        }
        Ok(())
    }

    fn checkout_ref(&self, repo: &Repository, refspec: &str) -> Result<()> {
        debug!(refspec = %refspec, "checking out ref");
        let object = repo
            .revparse_single(refspec)
            .or_else(|_| repo.revparse_single(&format!("refs/tags/{}", refspec)))
            .or_else(|_| repo.revparse_single(&format!("refs/remotes/origin/{}", refspec)))
            .map_err(|_| ServiceError::SourceUnavailable {
                source_id: self.identifier(),
                message: format!("ref '{}' not found", refspec),
            })?;
        let commit = object.peel(git2::ObjectType::Commit).map_err(|e| self.source_err(e))?;
        repo.checkout_tree(&commit, None).map_err(|e| self.source_err(e))?;
        repo.set_head_detached(commit.id()).map_err(|e| self.source_err(e))?;
        Ok(())
    }

    fn source_err(&self, e: git2::Error) -> ServiceError {
        ServiceError::SourceUnavailable {
            source_id: self.identifier(),
            message: e.message().to_string(),
        }
    }
}

/// Candidate skill roots under an acquired directory: the directory itself
/// when it carries a manifest (single-skill source), otherwise its direct
/// subdirectories that do. Anything without a manifest is skipped.
pub fn candidate_skill_roots(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    if dir.join(MANIFEST_FILE).is_file() {
        return Ok(vec![dir.to_path_buf()]);
    }
    let mut roots = Vec::new();
    let mut entries: Vec<_> = std::fs::read_dir(dir)?.filter_map(|e| e.ok()).collect();
    entries.sort_by_key(|e| e.file_name());
    for entry in entries {
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        if path.join(MANIFEST_FILE).is_file() {
            roots.push(path);
        } else {
            debug!(path = %path.display(), "skipping directory without manifest");
        }
    }
    Ok(roots)
}
