// src/extractor.rs

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::error::{HarvestError, Result};
use crate::message::{FetchedMessage, flatten_parts, is_attachment};
use crate::naming::resolve_download_path;
use crate::source::MessageSource;

/// Write every attachment of `message` into `directory`.
///
/// Parts whose content can't be fetched are logged and skipped, so the
/// returned list may be shorter than the number of attachment leaves. Only a
/// failed write aborts. `directory` must already exist.
pub async fn extract_and_save<S>(
    message: &FetchedMessage,
    directory: &Path,
    source: &S,
) -> Result<Vec<PathBuf>>
where
    S: MessageSource + ?Sized,
{
    let mut written = Vec::new();

    for part in flatten_parts(&message.root).filter(|p| is_attachment(p)) {
        let (Some(filename), Some(reference)) = (part.filename(), part.attachment()) else {
            continue;
        };

        let span = info_span!(
            "attachment",
            message = %message.id,
            filename = %filename,
            mime = part.mime_type().unwrap_or("unknown"),
        );

        let fetched = source.fetch_content(reference).instrument(span.clone()).await;
        let _guard = span.enter();
        let data = match fetched {
            Ok(data) => data,
            Err(e) if e.is_recoverable() => {
                warn!(error = %e, "Skipping attachment");
                continue;
            }
            Err(e) => return Err(e),
        };

        let path = write_new_file(directory, filename, message.received, &data)?;

        info!(
            path = %path.display(),
            bytes = data.len(),
            declared = ?part.size(),
            "Downloaded"
        );
        written.push(path);
    }

    Ok(written)
}

/// Attempts before giving up on a directory that keeps gaining entries.
const MAX_CREATE_ATTEMPTS: usize = 16;

/// Any directory entry counts as taken, dangling symlinks included.
fn entry_exists(path: &Path) -> bool {
    path.symlink_metadata().is_ok()
}

/// Create a fresh file for `filename` in `directory` and fill it with `data`.
///
/// `create_new` refuses existing entries, so a symlink is never followed and
/// a file appearing between the name check and the open is never clobbered.
fn write_new_file(
    directory: &Path,
    filename: &str,
    received: OffsetDateTime,
    data: &[u8],
) -> Result<PathBuf> {
    let mut last = None;
    for _ in 0..MAX_CREATE_ATTEMPTS {
        let path = resolve_download_path(directory, filename, entry_exists, received);
        match fs::OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                file.write_all(data).map_err(|e| HarvestError::fs(&path, e))?;
                return Ok(path);
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                debug!(path = %path.display(), "Name taken while opening, resolving again");
                last = Some(path);
            }
            Err(e) => return Err(HarvestError::fs(&path, e)),
        }
    }

    let path = last.unwrap_or_else(|| directory.join(filename));
    Err(HarvestError::fs(
        path,
        io::Error::new(io::ErrorKind::AlreadyExists, "no free name after repeated attempts"),
    ))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::message::{AttachmentRef, MessagePart};
    use crate::source::SearchWindow;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use time::OffsetDateTime;
    use time::macros::datetime;

    /// In-memory source: attachment id -> bytes; ids listed in `failing` error out.
    #[derive(Default)]
    pub(crate) struct FakeSource {
        pub messages: Vec<FetchedMessage>,
        pub content: HashMap<String, Vec<u8>>,
        pub failing: Vec<String>,
        pub list_error: bool,
    }

    #[async_trait]
    impl MessageSource for FakeSource {
        async fn list_recent(&self, window: &SearchWindow) -> Result<Vec<String>> {
            if self.list_error {
                return Err(HarvestError::SourceUnavailable("connection refused".into()));
            }
            Ok(self
                .messages
                .iter()
                .take(window.max_results as usize)
                .map(|m| m.id.clone())
                .collect())
        }

        async fn fetch_message(&self, id: &str) -> Result<FetchedMessage> {
            self.messages
                .iter()
                .find(|m| m.id == id)
                .cloned()
                .ok_or_else(|| HarvestError::SourceUnavailable(format!("no message {id}")))
        }

        async fn fetch_content(&self, reference: &AttachmentRef) -> Result<Vec<u8>> {
            if self.failing.contains(&reference.attachment_id) {
                return Err(HarvestError::SourceUnavailable("transient".into()));
            }
            self.content
                .get(&reference.attachment_id)
                .cloned()
                .ok_or_else(|| HarvestError::MalformedPart {
                    part: reference.attachment_id.clone(),
                    reason: "unknown attachment".into(),
                })
        }
    }

    pub(crate) fn attachment(message_id: &str, name: &str, id: &str) -> MessagePart {
        MessagePart::leaf(
            Some(name),
            Some(AttachmentRef {
                message_id: message_id.to_string(),
                attachment_id: id.to_string(),
            }),
        )
    }

    pub(crate) fn message(id: &str, root: MessagePart) -> FetchedMessage {
        FetchedMessage {
            id: id.to_string(),
            received: datetime!(2024-03-01 10:15:00 UTC),
            root,
        }
    }

    #[tokio::test]
    async fn test_nested_attachment_written() {
        let dir = tempfile::tempdir().unwrap();
        let root = MessagePart::container(vec![
            MessagePart::container(vec![attachment("m1", "a.pdf", "R1")]),
            MessagePart::leaf(None, None),
        ]);
        let msg = message("m1", root);
        let source = FakeSource {
            content: HashMap::from([("R1".to_string(), b"%PDF-1.4".to_vec())]),
            ..Default::default()
        };

        let paths = extract_and_save(&msg, dir.path(), &source).await.unwrap();

        assert_eq!(paths, vec![dir.path().join("a.pdf")]);
        assert_eq!(fs::read(&paths[0]).unwrap(), b"%PDF-1.4");
    }

    #[tokio::test]
    async fn test_one_failed_fetch_keeps_the_rest() {
        let dir = tempfile::tempdir().unwrap();
        let root = MessagePart::container(vec![
            attachment("m1", "one.pdf", "A"),
            attachment("m1", "two.pdf", "B"),
            attachment("m1", "three.pdf", "C"),
        ]);
        let source = FakeSource {
            content: HashMap::from([
                ("A".to_string(), b"1".to_vec()),
                ("B".to_string(), b"2".to_vec()),
                ("C".to_string(), b"3".to_vec()),
            ]),
            failing: vec!["B".to_string()],
            ..Default::default()
        };

        let paths = extract_and_save(&message("m1", root), dir.path(), &source)
            .await
            .unwrap();

        assert_eq!(
            paths,
            vec![dir.path().join("one.pdf"), dir.path().join("three.pdf")]
        );
        assert!(!dir.path().join("two.pdf").exists());
    }

    #[tokio::test]
    async fn test_no_attachments_touches_nothing() {
        // the directory doesn't exist: any write attempt would fail
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("never-created");
        let root = MessagePart::container(vec![
            MessagePart::leaf(None, None),
            MessagePart::leaf(Some("inline.png"), None),
        ]);

        let paths = extract_and_save(&message("m1", root), &missing, &FakeSource::default())
            .await
            .unwrap();

        assert!(paths.is_empty());
        assert!(!missing.exists());
    }

    #[tokio::test]
    async fn test_duplicate_names_within_one_message() {
        let dir = tempfile::tempdir().unwrap();
        let root = MessagePart::container(vec![
            attachment("m1", "invoice.pdf", "A"),
            attachment("m1", "invoice.pdf", "B"),
            attachment("m1", "invoice.pdf", "C"),
        ]);
        let source = FakeSource {
            content: HashMap::from([
                ("A".to_string(), b"a".to_vec()),
                ("B".to_string(), b"b".to_vec()),
                ("C".to_string(), b"c".to_vec()),
            ]),
            ..Default::default()
        };

        let paths = extract_and_save(&message("m1", root), dir.path(), &source)
            .await
            .unwrap();

        assert_eq!(
            paths,
            vec![
                dir.path().join("invoice.pdf"),
                dir.path().join("invoice_20240301_101500.pdf"),
                dir.path().join("invoice_20240301_101500_1.pdf"),
            ]
        );
        assert_eq!(fs::read(&paths[2]).unwrap(), b"c");
    }

    #[tokio::test]
    async fn test_existing_file_is_not_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("report.pdf"), b"old").unwrap();
        let source = FakeSource {
            content: HashMap::from([("A".to_string(), b"new".to_vec())]),
            ..Default::default()
        };
        let msg = FetchedMessage {
            received: OffsetDateTime::UNIX_EPOCH,
            ..message("m1", attachment("m1", "report.pdf", "A"))
        };

        let paths = extract_and_save(&msg, dir.path(), &source).await.unwrap();

        assert_eq!(paths, vec![dir.path().join("report_19700101_000000.pdf")]);
        assert_eq!(fs::read(dir.path().join("report.pdf")).unwrap(), b"old");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_dangling_symlink_is_never_followed() {
        let dir = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        let target = outside.path().join("escaped.pdf");
        std::os::unix::fs::symlink(&target, dir.path().join("a.pdf")).unwrap();
        let source = FakeSource {
            content: HashMap::from([("A".to_string(), b"x".to_vec())]),
            ..Default::default()
        };

        let paths = extract_and_save(&message("m1", attachment("m1", "a.pdf", "A")), dir.path(), &source)
            .await
            .unwrap();

        assert_eq!(paths, vec![dir.path().join("a_20240301_101500.pdf")]);
        assert_eq!(fs::read(&paths[0]).unwrap(), b"x");
        assert!(!target.exists());
        assert!(dir.path().join("a.pdf").symlink_metadata().unwrap().file_type().is_symlink());
    }

    #[test]
    fn test_write_new_file_refuses_existing_entry() {
        let dir = tempfile::tempdir().unwrap();
        let ts = datetime!(2024-03-01 10:15:00 UTC);
        fs::write(dir.path().join("a.pdf"), b"old").unwrap();

        let first = write_new_file(dir.path(), "a.pdf", ts, b"one").unwrap();
        let second = write_new_file(dir.path(), "a.pdf", ts, b"two").unwrap();

        assert_eq!(first, dir.path().join("a_20240301_101500.pdf"));
        assert_eq!(second, dir.path().join("a_20240301_101500_1.pdf"));
        assert_eq!(fs::read(dir.path().join("a.pdf")).unwrap(), b"old");
        assert_eq!(fs::read(&second).unwrap(), b"two");
    }

    #[tokio::test]
    async fn test_write_failure_is_filesystem_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("gone");
        let source = FakeSource {
            content: HashMap::from([("A".to_string(), b"x".to_vec())]),
            ..Default::default()
        };

        let err = extract_and_save(&message("m1", attachment("m1", "a.pdf", "A")), &missing, &source)
            .await
            .unwrap_err();

        assert!(matches!(err, HarvestError::Filesystem { .. }));
    }
}
