// src/naming.rs
//
// Collision-safe names for attachments written into a flat directory.

use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use time::macros::format_description;

const FALLBACK_NAME: &str = "attachment";

/// Reduce an untrusted attachment name to a single safe path component.
///
/// Only the final component survives, so `../../etc/passwd` becomes `passwd`
/// and `C:\Users\x\report.pdf` becomes `report.pdf`.
pub fn sanitize_filename(raw: &str) -> String {
    let last = raw.rsplit(['/', '\\']).next().unwrap_or("");
    let cleaned: String = last.chars().filter(|c| !c.is_control()).collect();
    let cleaned = cleaned.trim();

    match cleaned {
        "" | "." | ".." => FALLBACK_NAME.to_string(),
        name => name.to_string(),
    }
}

/// Split into `(base, extension)`; the extension keeps its leading dot.
///
/// Leading dots never start an extension: `.env` has none.
pub fn split_extension(filename: &str) -> (&str, &str) {
    match filename.rfind('.') {
        Some(dot) if filename[..dot].chars().any(|c| c != '.') => filename.split_at(dot),
        _ => (filename, ""),
    }
}

/// `YYYYMMDD_HHMMSS` as used in collision suffixes.
pub fn collision_stamp(ts: OffsetDateTime) -> String {
    let fmt = format_description!("[year][month][day]_[hour][minute][second]");
    // every component is a plain number, formatting can't fail
    ts.format(fmt).unwrap_or_else(|_| ts.unix_timestamp().to_string())
}

/// Pick a path in `directory` that `exists` does not report as taken.
///
/// Tries the name as-is, then `{base}_{stamp}{ext}`, then
/// `{base}_{stamp}_{n}{ext}` for n = 1, 2, ...
pub fn resolve_download_path(
    directory: &Path,
    desired_filename: &str,
    exists: impl Fn(&Path) -> bool,
    collision_timestamp: OffsetDateTime,
) -> PathBuf {
    let filename = sanitize_filename(desired_filename);
    let candidate = directory.join(&filename);
    if !exists(&candidate) {
        return candidate;
    }

    let (base, ext) = split_extension(&filename);
    let stamp = collision_stamp(collision_timestamp);

    let candidate = directory.join(format!("{base}_{stamp}{ext}"));
    if !exists(&candidate) {
        return candidate;
    }

    let mut counter: u64 = 1;
    loop {
        let candidate = directory.join(format!("{base}_{stamp}_{counter}{ext}"));
        if !exists(&candidate) {
            return candidate;
        }
        counter += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use time::macros::datetime;

    const TS: OffsetDateTime = datetime!(2024-03-01 10:15:00 UTC);

    fn taken(paths: &[&str]) -> HashSet<PathBuf> {
        paths.iter().map(PathBuf::from).collect()
    }

    #[test]
    fn test_free_name_is_used_verbatim() {
        let existing = taken(&[]);
        let path = resolve_download_path(Path::new("/d"), "invoice.pdf", |p| existing.contains(p), TS);
        assert_eq!(path, PathBuf::from("/d/invoice.pdf"));
    }

    #[test]
    fn test_first_collision_gets_timestamp() {
        let existing = taken(&["/d/invoice.pdf"]);
        let path = resolve_download_path(Path::new("/d"), "invoice.pdf", |p| existing.contains(p), TS);
        assert_eq!(path, PathBuf::from("/d/invoice_20240301_101500.pdf"));
    }

    #[test]
    fn test_second_collision_gets_counter() {
        let existing = taken(&["/d/invoice.pdf", "/d/invoice_20240301_101500.pdf"]);
        let path = resolve_download_path(Path::new("/d"), "invoice.pdf", |p| existing.contains(p), TS);
        assert_eq!(path, PathBuf::from("/d/invoice_20240301_101500_1.pdf"));
    }

    #[test]
    fn test_many_collisions_probe_linearly() {
        let mut existing: HashSet<PathBuf> = taken(&["/d/scan.pdf", "/d/scan_20240301_101500.pdf"]);
        for n in 1..=5000 {
            existing.insert(PathBuf::from(format!("/d/scan_20240301_101500_{n}.pdf")));
        }
        let path = resolve_download_path(Path::new("/d"), "scan.pdf", |p| existing.contains(p), TS);
        assert_eq!(path, PathBuf::from("/d/scan_20240301_101500_5001.pdf"));
        assert!(!existing.contains(&path));
    }

    #[test]
    fn test_never_returns_existing_path() {
        let names = ["a.pdf", "a", ".env", "x.tar.gz", "../a.pdf", ""];
        let existing = taken(&[
            "/d/a.pdf",
            "/d/a",
            "/d/a_20240301_101500",
            "/d/.env",
            "/d/x.tar.gz",
            "/d/x.tar_20240301_101500.gz",
            "/d/x.tar_20240301_101500_1.gz",
            "/d/attachment",
        ]);
        for name in names {
            let path = resolve_download_path(Path::new("/d"), name, |p| existing.contains(p), TS);
            assert!(!existing.contains(&path), "{name} resolved to taken {path:?}");
            assert_eq!(path.parent(), Some(Path::new("/d")));
        }
    }

    #[test]
    fn test_no_extension_and_dotfile() {
        let existing = taken(&["/d/README", "/d/.env"]);
        let exists = |p: &Path| existing.contains(p);
        assert_eq!(
            resolve_download_path(Path::new("/d"), "README", exists, TS),
            PathBuf::from("/d/README_20240301_101500")
        );
        assert_eq!(
            resolve_download_path(Path::new("/d"), ".env", exists, TS),
            PathBuf::from("/d/.env_20240301_101500")
        );
    }

    #[test]
    fn test_split_extension() {
        assert_eq!(split_extension("invoice.pdf"), ("invoice", ".pdf"));
        assert_eq!(split_extension("archive.tar.gz"), ("archive.tar", ".gz"));
        assert_eq!(split_extension("README"), ("README", ""));
        assert_eq!(split_extension(".env"), (".env", ""));
        assert_eq!(split_extension("..hidden"), ("..hidden", ""));
        assert_eq!(split_extension("..a.b"), ("..a", ".b"));
        assert_eq!(split_extension("trailing."), ("trailing", "."));
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("invoice.pdf"), "invoice.pdf");
        assert_eq!(sanitize_filename("my report (final).pdf"), "my report (final).pdf");
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("/abs/path/x.pdf"), "x.pdf");
        assert_eq!(sanitize_filename("C:\\Users\\x\\report.pdf"), "report.pdf");
        assert_eq!(sanitize_filename("evil\0name\n.pdf"), "evilname.pdf");
        assert_eq!(sanitize_filename(".."), "attachment");
        assert_eq!(sanitize_filename("dir/"), "attachment");
        assert_eq!(sanitize_filename("   "), "attachment");
    }

    #[test]
    fn test_traversal_stays_in_directory() {
        let path = resolve_download_path(Path::new("/d"), "../../outside.pdf", |_| false, TS);
        assert_eq!(path, PathBuf::from("/d/outside.pdf"));
    }

    #[test]
    fn test_collision_stamp_format() {
        assert_eq!(collision_stamp(TS), "20240301_101500");
        assert_eq!(
            collision_stamp(datetime!(1999-12-31 23:59:09 UTC)),
            "19991231_235909"
        );
    }
}
