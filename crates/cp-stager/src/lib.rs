// SPDX-License-Identifier: MIT OR Apache-2.0
//! Attachment and repository staging for run workspaces.
//!
//! [`stage_inputs`] materializes a session's `input_files` under
//! `…/workspace/inputs/` — downloading `file` entries through a [`BlobStore`]
//! and shallow-cloning `url` entries (restricted to GitHub) via `git` — and
//! returns rewritten descriptors pointing at the staged locations.
#![deny(unsafe_code)]
#![warn(missing_docs)]

mod blob_store;
mod github;
mod path;

pub use blob_store::{key_basename, BlobStore, LocalDiskBlobStore};
pub use github::{clone_repo, parse_github_repo, GithubRepo};
pub use path::normalize_relative_path;

use cp_core::{InputFile, InputFileKind};
use cp_error::CpError;
use std::path::{Path, PathBuf};

/// Stage every entry in `inputs` under `<session_dir>/workspace/inputs/`.
///
/// Entries with no usable target path (traversal attempts, empty names,
/// missing source) are dropped silently with a `warn` log, matching the
/// defensive behavior of the service this staging logic was adapted from.
pub async fn stage_inputs(
    blob_store: &dyn BlobStore,
    session_dir: &Path,
    inputs: &[InputFile],
) -> Result<Vec<InputFile>, CpError> {
    if inputs.is_empty() {
        return Ok(Vec::new());
    }

    let inputs_root = session_dir.join("workspace").join("inputs");
    tokio::fs::create_dir_all(&inputs_root).await.map_err(|e| {
        cp_error::CpError::new(cp_error::ErrorCode::AttachmentStagingFailed, "failed to create inputs root")
            .with_source(e)
    })?;

    let mut staged = Vec::new();
    for item in inputs {
        match stage_one(blob_store, &inputs_root, item).await? {
            Some(entry) => staged.push(entry),
            None => tracing::warn!(id = %item.id, "dropping input with no usable destination"),
        }
    }
    Ok(staged)
}

async fn stage_one(
    blob_store: &dyn BlobStore,
    inputs_root: &Path,
    item: &InputFile,
) -> Result<Option<InputFile>, CpError> {
    let requested = item.target_path.as_deref();
    let rel_from_target = normalize_relative_path(requested);

    match item.kind {
        InputFileKind::File => {
            if item.source.trim().is_empty() {
                return Ok(None);
            }
            let rel_path = rel_from_target
                .or_else(|| normalize_relative_path(item.name.as_deref()))
                .unwrap_or_else(|| key_basename(&item.source).to_string());
            let Some(rel_path) = (if rel_path.is_empty() { None } else { Some(rel_path) }) else {
                return Ok(None);
            };

            let destination = inputs_root.join(&rel_path);
            if let Some(parent) = destination.parent() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    CpError::new(cp_error::ErrorCode::AttachmentStagingFailed, "failed to create destination dir")
                        .with_source(e)
                })?;
            }
            let bytes = blob_store.get(&item.source).await?;
            tokio::fs::write(&destination, &bytes).await.map_err(|e| {
                CpError::new(cp_error::ErrorCode::AttachmentStagingFailed, "failed to write staged file")
                    .with_context("destination", destination.display().to_string())
                    .with_source(e)
            })?;

            let name = item
                .name
                .clone()
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| key_basename(&rel_path).to_string());
            Ok(Some(build_staged(item, &rel_path, &name)))
        }
        InputFileKind::Url => {
            let repo = parse_github_repo(&item.source)?;
            let rel_path = rel_from_target.unwrap_or_else(|| repo.repo.clone());
            let destination = inputs_root.join(&rel_path);
            let destination_clone = destination.clone();
            let repo_clone = repo.clone();
            tokio::task::spawn_blocking(move || clone_repo(&repo_clone, &destination_clone))
                .await
                .map_err(|e| {
                    CpError::new(cp_error::ErrorCode::GitCloneFailed, "clone task panicked")
                        .with_source(e)
                })??;

            let name = item
                .name
                .clone()
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| repo.repo.clone());
            Ok(Some(build_staged(item, &rel_path, &name)))
        }
    }
}

fn build_staged(item: &InputFile, rel_path: &str, name: &str) -> InputFile {
    InputFile {
        id: item.id.clone(),
        kind: item.kind,
        name: Some(name.to_string()),
        source: item.source.clone(),
        size: item.size,
        content_type: item.content_type.clone(),
        target_path: item.target_path.clone(),
        path: Some(format!("/inputs/{rel_path}")),
        extra: item.extra.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeBlobStore {
        objects: BTreeMap<String, Vec<u8>>,
        gets: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl BlobStore for FakeBlobStore {
        async fn get(&self, key: &str) -> Result<Vec<u8>, CpError> {
            self.gets.lock().unwrap().push(key.to_string());
            self.objects
                .get(key)
                .cloned()
                .ok_or_else(|| CpError::new(cp_error::ErrorCode::BlobStoreError, "missing key"))
        }

        async fn put(&self, _key: &str, _bytes: &[u8]) -> Result<(), CpError> {
            unimplemented!("not exercised in these tests")
        }
    }

    fn file_input(id: &str, source: &str, name: Option<&str>, target: Option<&str>) -> InputFile {
        InputFile {
            id: id.to_string(),
            kind: InputFileKind::File,
            name: name.map(str::to_string),
            source: source.to_string(),
            size: None,
            content_type: None,
            target_path: target.map(str::to_string),
            path: None,
            extra: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn stages_file_using_basename_when_no_name_or_target() {
        let mut store = FakeBlobStore::default();
        store.objects.insert("uploads/42/report.pdf".into(), b"pdf-bytes".to_vec());
        let dir = tempfile::tempdir().unwrap();

        let inputs = vec![file_input("a1", "uploads/42/report.pdf", None, None)];
        let staged = stage_inputs(&store, dir.path(), &inputs).await.unwrap();

        assert_eq!(staged.len(), 1);
        assert_eq!(staged[0].path.as_deref(), Some("/inputs/report.pdf"));
        assert_eq!(staged[0].name.as_deref(), Some("report.pdf"));
        let written = tokio::fs::read(dir.path().join("workspace/inputs/report.pdf"))
            .await
            .unwrap();
        assert_eq!(written, b"pdf-bytes");
    }

    #[tokio::test]
    async fn target_path_wins_over_name_and_basename() {
        let mut store = FakeBlobStore::default();
        store.objects.insert("k".into(), b"x".to_vec());
        let dir = tempfile::tempdir().unwrap();

        let inputs = vec![file_input("a1", "k", Some("ignored-name.txt"), Some("nested/dest.txt"))];
        let staged = stage_inputs(&store, dir.path(), &inputs).await.unwrap();

        assert_eq!(staged[0].path.as_deref(), Some("/inputs/nested/dest.txt"));
        assert!(tokio::fs::metadata(dir.path().join("workspace/inputs/nested/dest.txt"))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn traversal_target_path_is_dropped_not_errored() {
        let mut store = FakeBlobStore::default();
        store.objects.insert("k".into(), b"x".to_vec());
        let dir = tempfile::tempdir().unwrap();

        let inputs = vec![file_input("a1", "k", None, Some("../escape.txt"))];
        let staged = stage_inputs(&store, dir.path(), &inputs).await.unwrap();

        // Falls back to the key's basename rather than the rejected target path.
        assert_eq!(staged[0].path.as_deref(), Some("/inputs/k"));
    }

    #[tokio::test]
    async fn empty_inputs_is_a_no_op() {
        let store = FakeBlobStore::default();
        let dir = tempfile::tempdir().unwrap();
        let staged = stage_inputs(&store, dir.path(), &[]).await.unwrap();
        assert!(staged.is_empty());
    }
}
