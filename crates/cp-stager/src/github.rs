//! Parsing and shallow-cloning of GitHub repository URLs.

use cp_error::{CpError, ErrorCode};
use std::path::Path;
use std::process::Command;

const GITHUB_HOSTS: &[&str] = &["github.com", "www.github.com"];

/// A parsed GitHub repository reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GithubRepo {
    /// Normalized clone URL (`https://github.com/{owner}/{repo}.git`).
    pub clone_url: String,
    /// Branch to check out, if the URL named one (`/tree/{branch}`).
    pub branch: Option<String>,
    /// Repository name (used as the default relative target path).
    pub repo: String,
}

/// Parse `/{owner}/{repo}(.git)?(/tree/{branch})?` from a `github.com` URL.
pub fn parse_github_repo(url: &str) -> Result<GithubRepo, CpError> {
    let (scheme, rest) = url
        .split_once("://")
        .ok_or_else(|| bad_url("only http(s) GitHub URLs are supported"))?;
    if scheme != "http" && scheme != "https" {
        return Err(bad_url("only http(s) GitHub URLs are supported"));
    }

    let (host, path) = rest.split_once('/').unwrap_or((rest, ""));
    if !GITHUB_HOSTS.contains(&host) {
        return Err(bad_url("only github.com URLs are supported"));
    }

    let parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();
    if parts.len() < 2 {
        return Err(bad_url("invalid GitHub repository URL"));
    }

    let owner = parts[0];
    let repo = parts[1].strip_suffix(".git").unwrap_or(parts[1]);
    if owner.is_empty() || repo.is_empty() {
        return Err(bad_url("invalid GitHub repository URL"));
    }

    let branch = if parts.len() >= 4 && parts[2] == "tree" {
        Some(parts[3].to_string())
    } else {
        None
    };

    Ok(GithubRepo {
        clone_url: format!("https://github.com/{owner}/{repo}.git"),
        branch,
        repo: repo.to_string(),
    })
}

fn bad_url(message: &str) -> CpError {
    CpError::new(ErrorCode::BadRequest, message)
}

/// Shallow-clone `repo` into `destination`, removing any existing directory first.
///
/// Blocking: spawns `git` via [`std::process::Command`] (never a shell) and
/// waits for it to exit. Callers from async contexts should run this inside
/// `tokio::task::spawn_blocking`.
pub fn clone_repo(repo: &GithubRepo, destination: &Path) -> Result<(), CpError> {
    if destination.exists() {
        std::fs::remove_dir_all(destination).map_err(|e| {
            CpError::new(ErrorCode::GitCloneFailed, "failed to clear existing destination")
                .with_context("destination", destination.display().to_string())
                .with_source(e)
        })?;
    }
    if let Some(parent) = destination.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            CpError::new(ErrorCode::GitCloneFailed, "failed to create destination parent")
                .with_source(e)
        })?;
    }

    let mut args = vec!["clone", "--depth", "1", "--single-branch"];
    if let Some(branch) = repo.branch.as_deref() {
        args.push("--branch");
        args.push(branch);
    }
    let dest_str = destination.to_string_lossy().into_owned();
    args.push(&repo.clone_url);
    args.push(&dest_str);

    let output = Command::new("git")
        .args(&args)
        .env("GIT_TERMINAL_PROMPT", "0")
        .output()
        .map_err(|e| {
            CpError::new(ErrorCode::GitCloneFailed, "failed to spawn git")
                .with_context("repo_url", repo.clone_url.clone())
                .with_source(e)
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        tracing::error!(repo_url = %repo.clone_url, stderr = %stderr, "git clone failed");
        return Err(CpError::new(ErrorCode::GitCloneFailed, "failed to clone GitHub repository")
            .with_context("repo_url", repo.clone_url.clone())
            .with_context("stderr", stderr));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_repo_url() {
        let repo = parse_github_repo("https://github.com/owner/repo").unwrap();
        assert_eq!(repo.clone_url, "https://github.com/owner/repo.git");
        assert_eq!(repo.repo, "repo");
        assert_eq!(repo.branch, None);
    }

    #[test]
    fn strips_dot_git_suffix() {
        let repo = parse_github_repo("https://github.com/owner/repo.git").unwrap();
        assert_eq!(repo.repo, "repo");
    }

    #[test]
    fn parses_tree_branch() {
        let repo = parse_github_repo("https://github.com/owner/repo/tree/dev").unwrap();
        assert_eq!(repo.branch.as_deref(), Some("dev"));
        assert_eq!(repo.clone_url, "https://github.com/owner/repo.git");
    }

    #[test]
    fn www_host_is_accepted() {
        let repo = parse_github_repo("https://www.github.com/owner/repo").unwrap();
        assert_eq!(repo.repo, "repo");
    }

    #[test]
    fn rejects_non_github_host() {
        let err = parse_github_repo("https://gitlab.com/owner/repo").unwrap_err();
        assert_eq!(err.code, ErrorCode::BadRequest);
    }

    #[test]
    fn rejects_non_http_scheme() {
        let err = parse_github_repo("git@github.com:owner/repo.git").unwrap_err();
        assert_eq!(err.code, ErrorCode::BadRequest);
    }

    #[test]
    fn rejects_missing_repo_segment() {
        let err = parse_github_repo("https://github.com/owner").unwrap_err();
        assert_eq!(err.code, ErrorCode::BadRequest);
    }
}
