pub mod error;
pub mod git;
pub mod jj;
pub mod noop;
pub mod provider;

use std::path::Path;
use std::sync::Arc;

pub use error::{Result, VcsError};
pub use git::GitVcs;
pub use jj::JujutsuVcs;
pub use noop::NoopChanges;
pub use provider::{ChangeSetProvider, VcsBackend};

/// Pick a provider for `repo_path`. `Auto` prefers jj over git, and falls
/// back to [`NoopChanges`] when neither is initialized.
pub fn detect(repo_path: &Path, backend: VcsBackend) -> Arc<dyn ChangeSetProvider> {
    let backend = match backend {
        VcsBackend::Auto if repo_path.join(".jj").exists() => VcsBackend::Jj,
        VcsBackend::Auto if repo_path.join(".git").exists() => VcsBackend::Git,
        VcsBackend::Auto => VcsBackend::None,
        explicit => explicit,
    };

    tracing::debug!(backend = backend.as_str(), path = %repo_path.display(), "selected change-set provider");
    match backend {
        VcsBackend::Jj => Arc::new(JujutsuVcs::new(repo_path.to_path_buf())),
        VcsBackend::Git => Arc::new(GitVcs::new(repo_path.to_path_buf())),
        _ => Arc::new(NoopChanges),
    }
}
