//! `POST /attachments/upload` — multipart file upload into the blob store.

use crate::envelope::Envelope;
use crate::{AppState, UserId};
use axum::extract::{Multipart, State};
use cp_core::{InputFile, InputFileKind};
use cp_error::{CpError, ErrorCode};
use std::sync::Arc;
use uuid::Uuid;

/// Replace runs of anything but `[a-zA-Z0-9._-]` with `_`; an empty result
/// (e.g. a name that was entirely punctuation, or absent) falls back to
/// `upload.bin`.
fn sanitize_filename(raw: &str) -> String {
    let basename = raw.rsplit(['/', '\\']).next().unwrap_or(raw);

    let mut out = String::with_capacity(basename.len());
    let mut in_run = false;
    for c in basename.chars() {
        if c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-' {
            out.push(c);
            in_run = false;
        } else if !in_run {
            out.push('_');
            in_run = true;
        }
    }

    if out.is_empty() || out.chars().all(|c| c == '_') {
        "upload.bin".to_string()
    } else {
        out
    }
}

/// Accepts a single `file` part; any filename field the multipart part
/// carries is sanitized, never trusted verbatim in a storage key.
pub async fn upload(
    State(state): State<Arc<AppState>>,
    user: UserId,
    mut multipart: Multipart,
) -> Result<Envelope<InputFile>, CpError> {
    let mut file_name = None;
    let mut content_type = None;
    let mut bytes = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| CpError::new(ErrorCode::BadRequest, format!("invalid multipart body: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }
        file_name = field.file_name().map(str::to_string);
        content_type = field.content_type().map(str::to_string);
        bytes = Some(
            field
                .bytes()
                .await
                .map_err(|e| CpError::new(ErrorCode::BadRequest, format!("failed reading upload: {e}")))?,
        );
        break;
    }

    let bytes = bytes.ok_or_else(|| CpError::new(ErrorCode::BadRequest, "missing \"file\" field"))?;
    let sanitized = sanitize_filename(file_name.as_deref().unwrap_or(""));
    let attachment_id = Uuid::new_v4();
    let key = format!("attachments/{}/{}/{}", user.0, attachment_id, sanitized);

    state.blob_store.put(&key, &bytes).await?;

    Ok(Envelope::ok(InputFile {
        id: attachment_id.to_string(),
        kind: InputFileKind::File,
        name: Some(sanitized),
        source: key,
        size: Some(bytes.len() as i64),
        content_type,
        target_path: None,
        path: None,
        extra: Default::default(),
    }))
}

#[cfg(test)]
mod tests {
    use super::sanitize_filename;

    #[test]
    fn basename_is_kept_and_traversal_is_stripped() {
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
    }

    #[test]
    fn ordinary_name_is_untouched() {
        assert_eq!(sanitize_filename("report.pdf"), "report.pdf");
    }

    #[test]
    fn special_characters_collapse_to_single_underscore_runs() {
        assert_eq!(sanitize_filename("my file (final)!!.txt"), "my_file_final_.txt");
    }

    #[test]
    fn empty_or_all_punctuation_falls_back() {
        assert_eq!(sanitize_filename(""), "upload.bin");
        assert_eq!(sanitize_filename("***"), "upload.bin");
    }
}
