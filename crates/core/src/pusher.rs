//! Mirror-mode transfer of a source repository to the destination via `git2`.
//!
//! Each transfer bare-clones the source into a scratch directory, fetching
//! branch and tag refs only (pull-request refs are never transferred), then
//! force-pushes both ref namespaces to the destination. The default mode is
//! additive/overwriting: refs deleted at the source are left alone at the
//! destination unless pruning is enabled.

use std::path::Path;

use git2::{Cred, Direction, FetchOptions, PushOptions, RemoteCallbacks, Repository};
use tracing::{debug, info, instrument, warn};

use crate::errors::GitError;
use crate::models::RepositoryDescriptor;
use crate::retry::{retry_with_backoff, RetryPolicy};

const FETCH_REFSPECS: [&str; 2] = ["+refs/heads/*:refs/heads/*", "+refs/tags/*:refs/tags/*"];
const PUSH_REFSPECS: [&str; 2] = ["+refs/heads/*:refs/heads/*", "+refs/tags/*:refs/tags/*"];

/// Pushes full mirrors of source repositories to the destination.
pub struct MirrorPusher {
    source_token: String,
    dest_username: String,
    dest_token: String,
    prune: bool,
    retry: RetryPolicy,
}

impl MirrorPusher {
    pub fn new(
        source_token: impl Into<String>,
        dest_username: impl Into<String>,
        dest_token: impl Into<String>,
        prune: bool,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            source_token: source_token.into(),
            dest_username: dest_username.into(),
            dest_token: dest_token.into(),
            prune,
            retry,
        }
    }

    /// Transfer every branch and tag of `repo` to `dest_url`.
    ///
    /// The transfer is not resumable: a mid-flight failure retries the
    /// whole clone-and-push with bounded backoff, and after exhausting the
    /// budget surfaces as [`GitError::PushFailed`] carrying the repository
    /// name. A credential rejection short-circuits as
    /// [`GitError::DestinationAuth`].
    #[instrument(skip(self, repo, dest_url), fields(repo = %repo.name))]
    pub async fn mirror(
        &self,
        repo: &RepositoryDescriptor,
        dest_url: &str,
    ) -> Result<(), GitError> {
        let result = retry_with_backoff(&self.retry, "mirror transfer", || async {
            self.mirror_once(repo, dest_url)
        })
        .await;

        match result {
            Ok(()) => Ok(()),
            Err(e @ GitError::DestinationAuth { .. }) => Err(e),
            Err(e) => Err(GitError::PushFailed {
                repo: repo.name.clone(),
                detail: e.to_string(),
            }),
        }
    }

    fn mirror_once(&self, repo: &RepositoryDescriptor, dest_url: &str) -> Result<(), GitError> {
        let scratch = tempfile::tempdir()?;
        info!(source = %repo.clone_url, "fetching source refs");
        let local = self.fetch_source(repo, scratch.path())?;

        info!(dest = %dest_url, "pushing mirror to destination");
        self.push_mirror(&local, repo, dest_url)?;

        if self.prune {
            self.prune_stale_refs(&local, repo, dest_url)?;
        }

        Ok(())
    }

    /// Bare-clone the source: init a bare scratch repo and fetch branch and
    /// tag refs directly into their own namespaces.
    fn fetch_source(
        &self,
        repo: &RepositoryDescriptor,
        path: &Path,
    ) -> Result<Repository, GitError> {
        let local = Repository::init_bare(path)?;
        {
            let mut remote = local.remote("origin", &repo.clone_url)?;
            let mut callbacks = RemoteCallbacks::new();
            let token = self.source_token.clone();
            callbacks.credentials(move |_url, _username, _allowed| {
                Cred::userpass_plaintext("x-access-token", &token)
            });
            let mut fetch_opts = FetchOptions::new();
            fetch_opts.remote_callbacks(callbacks);
            fetch_opts.download_tags(git2::AutotagOption::None);
            remote
                .fetch(&FETCH_REFSPECS, Some(&mut fetch_opts), None)
                .map_err(|e| GitError::CloneFailed {
                    repo: repo.name.clone(),
                    detail: e.message().to_string(),
                })?;
        }
        debug!("source fetch completed");
        Ok(local)
    }

    /// Force-push all branches and tags to the destination.
    fn push_mirror(
        &self,
        local: &Repository,
        repo: &RepositoryDescriptor,
        dest_url: &str,
    ) -> Result<(), GitError> {
        let mut remote = local.remote_anonymous(dest_url)?;
        let mut callbacks = self.dest_callbacks();

        let push_error = std::sync::Arc::new(std::sync::Mutex::new(None::<String>));
        let push_error_clone = push_error.clone();
        callbacks.push_update_reference(move |refname, status| {
            if let Some(msg) = status {
                warn!(refname, msg, "push rejected");
                *push_error_clone.lock().unwrap() = Some(format!("{refname}: {msg}"));
            }
            Ok(())
        });

        let mut push_opts = PushOptions::new();
        push_opts.remote_callbacks(callbacks);
        remote
            .push(&PUSH_REFSPECS, Some(&mut push_opts))
            .map_err(|e| classify_transport_error(&repo.name, e))?;

        if let Some(detail) = push_error.lock().unwrap().take() {
            return Err(GitError::PushFailed {
                repo: repo.name.clone(),
                detail,
            });
        }
        debug!("mirror push completed");
        Ok(())
    }

    /// Delete destination branches/tags that no longer exist at the source.
    /// Only runs when pruning is configured; mirroring stays non-destructive
    /// by default.
    fn prune_stale_refs(
        &self,
        local: &Repository,
        repo: &RepositoryDescriptor,
        dest_url: &str,
    ) -> Result<(), GitError> {
        let local_refs: std::collections::BTreeSet<String> = local
            .references()?
            .filter_map(|r| r.ok())
            .filter_map(|r| r.name().map(str::to_string))
            .collect();

        let stale: Vec<String> = {
            let mut remote = local.remote_anonymous(dest_url)?;
            let connection =
                remote.connect_auth(Direction::Push, Some(self.dest_callbacks()), None)?;
            connection
                .list()?
                .iter()
                .map(|head| head.name().to_string())
                .filter(|name| {
                    (name.starts_with("refs/heads/") || name.starts_with("refs/tags/"))
                        && !local_refs.contains(name)
                })
                .collect()
        };

        if stale.is_empty() {
            return Ok(());
        }

        info!(count = stale.len(), "pruning stale destination refs");
        let delete_specs: Vec<String> = stale.iter().map(|name| format!(":{name}")).collect();
        let delete_refs: Vec<&str> = delete_specs.iter().map(String::as_str).collect();

        let mut remote = local.remote_anonymous(dest_url)?;
        let mut push_opts = PushOptions::new();
        push_opts.remote_callbacks(self.dest_callbacks());
        remote
            .push(&delete_refs, Some(&mut push_opts))
            .map_err(|e| classify_transport_error(&repo.name, e))?;
        Ok(())
    }

    fn dest_callbacks(&self) -> RemoteCallbacks<'static> {
        let mut callbacks = RemoteCallbacks::new();
        let username = self.dest_username.clone();
        let token = self.dest_token.clone();
        callbacks.credentials(move |_url, _username, _allowed| {
            Cred::userpass_plaintext(&username, &token)
        });
        callbacks
    }
}

/// Distinguish credential rejections from everything else: auth failures
/// are hopeless and must not burn the retry budget.
fn classify_transport_error(repo: &str, e: git2::Error) -> GitError {
    let detail = e.message().to_string();
    let lower = detail.to_lowercase();
    if lower.contains("401") || lower.contains("403") || lower.contains("authentication") {
        GitError::DestinationAuth {
            repo: repo.to_string(),
            detail,
        }
    } else {
        GitError::Git2Error(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Visibility;
    use git2::Signature;
    use std::path::PathBuf;

    fn descriptor(name: &str, clone_url: &str) -> RepositoryDescriptor {
        RepositoryDescriptor {
            name: name.into(),
            full_name: format!("alice/{name}"),
            owner: "alice".into(),
            description: None,
            visibility: Visibility::Public,
            default_branch: "main".into(),
            clone_url: clone_url.into(),
        }
    }

    fn pusher(prune: bool) -> MirrorPusher {
        // Local path remotes never ask for credentials.
        MirrorPusher::new("", "alice", "", prune, RetryPolicy::new(1))
    }

    /// Init a source repo with an initial commit on `main`, a `dev` branch,
    /// and a `v1` tag. Returns its path.
    fn create_source_repo(dir: &Path) -> PathBuf {
        let path = dir.join("source");
        let mut opts = git2::RepositoryInitOptions::new();
        opts.initial_head("main");
        let repo = Repository::init_opts(&path, &opts).unwrap();

        let sig = Signature::now("Test", "test@test.com").unwrap();
        std::fs::write(path.join("hello.txt"), "hello").unwrap();
        let mut index = repo.index().unwrap();
        index
            .add_all(["*"].iter(), git2::IndexAddOption::DEFAULT, None)
            .unwrap();
        index.write().unwrap();
        let tree_oid = index.write_tree().unwrap();
        let tree = repo.find_tree(tree_oid).unwrap();
        let oid = repo
            .commit(Some("HEAD"), &sig, &sig, "initial commit", &tree, &[])
            .unwrap();

        let commit = repo.find_commit(oid).unwrap();
        repo.branch("dev", &commit, false).unwrap();
        repo.tag("v1", commit.as_object(), &sig, "release", false)
            .unwrap();

        path
    }

    fn commit_on_branch(repo_path: &Path, branch: &str, filename: &str) {
        let repo = Repository::open(repo_path).unwrap();
        let sig = Signature::now("Test", "test@test.com").unwrap();
        let parent = repo
            .find_branch(branch, git2::BranchType::Local)
            .unwrap()
            .get()
            .peel_to_commit()
            .unwrap();
        std::fs::write(repo_path.join(filename), "content").unwrap();
        let mut index = repo.index().unwrap();
        index
            .add_all(["*"].iter(), git2::IndexAddOption::DEFAULT, None)
            .unwrap();
        index.write().unwrap();
        let tree_oid = index.write_tree().unwrap();
        let tree = repo.find_tree(tree_oid).unwrap();
        repo.commit(
            Some(&format!("refs/heads/{branch}")),
            &sig,
            &sig,
            "more work",
            &tree,
            &[&parent],
        )
        .unwrap();
    }

    fn ref_names(repo_path: &Path) -> Vec<String> {
        let repo = Repository::open_bare(repo_path).unwrap();
        repo.references()
            .unwrap()
            .filter_map(|r| r.ok())
            .filter_map(|r| r.name().map(str::to_string))
            .collect()
    }

    #[tokio::test]
    async fn test_mirror_transfers_all_branches_and_tags() {
        let dir = tempfile::tempdir().unwrap();
        let source = create_source_repo(dir.path());
        let dest = dir.path().join("dest.git");
        Repository::init_bare(&dest).unwrap();

        let repo = descriptor("repo-a", source.to_str().unwrap());
        pusher(false)
            .mirror(&repo, dest.to_str().unwrap())
            .await
            .unwrap();

        let refs = ref_names(&dest);
        assert!(refs.contains(&"refs/heads/main".to_string()));
        assert!(refs.contains(&"refs/heads/dev".to_string()));
        assert!(refs.contains(&"refs/tags/v1".to_string()));
    }

    #[tokio::test]
    async fn test_mirror_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let source = create_source_repo(dir.path());
        let dest = dir.path().join("dest.git");
        Repository::init_bare(&dest).unwrap();

        let repo = descriptor("repo-a", source.to_str().unwrap());
        let pusher = pusher(false);
        pusher.mirror(&repo, dest.to_str().unwrap()).await.unwrap();
        pusher.mirror(&repo, dest.to_str().unwrap()).await.unwrap();

        let refs = ref_names(&dest);
        assert!(refs.contains(&"refs/heads/main".to_string()));
    }

    #[tokio::test]
    async fn test_mirror_picks_up_new_commits() {
        let dir = tempfile::tempdir().unwrap();
        let source = create_source_repo(dir.path());
        let dest = dir.path().join("dest.git");
        Repository::init_bare(&dest).unwrap();

        let repo = descriptor("repo-a", source.to_str().unwrap());
        let pusher = pusher(false);
        pusher.mirror(&repo, dest.to_str().unwrap()).await.unwrap();

        commit_on_branch(&source, "main", "more.txt");
        pusher.mirror(&repo, dest.to_str().unwrap()).await.unwrap();

        let source_tip = Repository::open(&source)
            .unwrap()
            .find_branch("main", git2::BranchType::Local)
            .unwrap()
            .get()
            .peel_to_commit()
            .unwrap()
            .id();
        let dest_tip = Repository::open_bare(&dest)
            .unwrap()
            .find_reference("refs/heads/main")
            .unwrap()
            .peel_to_commit()
            .unwrap()
            .id();
        assert_eq!(source_tip, dest_tip);
    }

    #[tokio::test]
    async fn test_deleted_branch_survives_without_prune() {
        let dir = tempfile::tempdir().unwrap();
        let source = create_source_repo(dir.path());
        let dest = dir.path().join("dest.git");
        Repository::init_bare(&dest).unwrap();

        let repo = descriptor("repo-a", source.to_str().unwrap());
        let pusher_no_prune = pusher(false);
        pusher_no_prune
            .mirror(&repo, dest.to_str().unwrap())
            .await
            .unwrap();

        Repository::open(&source)
            .unwrap()
            .find_branch("dev", git2::BranchType::Local)
            .unwrap()
            .delete()
            .unwrap();

        pusher_no_prune
            .mirror(&repo, dest.to_str().unwrap())
            .await
            .unwrap();
        assert!(ref_names(&dest).contains(&"refs/heads/dev".to_string()));
    }

    #[tokio::test]
    async fn test_prune_removes_stale_branch() {
        let dir = tempfile::tempdir().unwrap();
        let source = create_source_repo(dir.path());
        let dest = dir.path().join("dest.git");
        Repository::init_bare(&dest).unwrap();

        let repo = descriptor("repo-a", source.to_str().unwrap());
        pusher(false)
            .mirror(&repo, dest.to_str().unwrap())
            .await
            .unwrap();

        Repository::open(&source)
            .unwrap()
            .find_branch("dev", git2::BranchType::Local)
            .unwrap()
            .delete()
            .unwrap();

        pusher(true)
            .mirror(&repo, dest.to_str().unwrap())
            .await
            .unwrap();

        let refs = ref_names(&dest);
        assert!(!refs.contains(&"refs/heads/dev".to_string()));
        assert!(refs.contains(&"refs/heads/main".to_string()));
    }

    #[tokio::test]
    async fn test_unreachable_source_surfaces_push_failed() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("dest.git");
        Repository::init_bare(&dest).unwrap();

        let repo = descriptor("repo-x", "/nonexistent/source/repo");
        let err = pusher(false)
            .mirror(&repo, dest.to_str().unwrap())
            .await
            .unwrap_err();
        match err {
            GitError::PushFailed { repo, .. } => assert_eq!(repo, "repo-x"),
            other => panic!("expected PushFailed, got {other}"),
        }
    }
}
