// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 fnship contributors

//! Deterministic zip archive construction.
//!
//! Every entry is stamped with the same fixed modification time so the
//! produced bytes depend only on entry paths, contents, modes and insertion
//! order. Code diffing hashes these bytes; a stray mtime must never force a
//! redeploy.

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

use crate::error::ArchiveError;

/// Mode given to synthetic entries.
const SYNTHETIC_MODE: u32 = 0o644;

/// Zip archive writer producing reproducible bytes.
pub struct ArchiveBuilder {
    writer: Option<ZipWriter<Cursor<Vec<u8>>>>,
    names: HashSet<String>,
}

impl ArchiveBuilder {
    pub fn new() -> Self {
        Self {
            writer: Some(ZipWriter::new(Cursor::new(Vec::new()))),
            names: HashSet::new(),
        }
    }

    /// Number of entries written so far.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Whether an entry named `path` was already written.
    pub fn contains(&self, path: &str) -> bool {
        self.names.contains(&normalize_entry_path(path))
    }

    pub fn is_closed(&self) -> bool {
        self.writer.is_none()
    }

    /// Insert a synthetic entry.
    pub fn add_bytes(&mut self, path: &str, content: &[u8]) -> Result<(), ArchiveError> {
        self.add_file(path, content, SYNTHETIC_MODE)
    }

    /// Insert an entry streamed from `reader` with the given unix mode.
    pub fn add_file<R: Read>(
        &mut self,
        path: &str,
        mut reader: R,
        mode: u32,
    ) -> Result<(), ArchiveError> {
        let name = normalize_entry_path(path);
        let writer = self.writer.as_mut().ok_or(ArchiveError::Closed)?;
        if self.names.contains(&name) {
            return Err(ArchiveError::DuplicateEntry { path: name });
        }

        writer.start_file(name.as_str(), entry_options(mode))?;
        std::io::copy(&mut reader, writer).map_err(|source| ArchiveError::Io {
            path: PathBuf::from(&name),
            source,
        })?;

        tracing::trace!(entry = %name, "Added archive entry");
        self.names.insert(name);
        Ok(())
    }

    /// Insert the on-disk file at `source` under `path`.
    ///
    /// Symlinks are resolved to their target's content. Anything that is not
    /// a regular file once resolved is rejected.
    pub fn add_path(&mut self, path: &str, source: &Path) -> Result<(), ArchiveError> {
        let metadata = fs::metadata(source).map_err(|e| ArchiveError::Io {
            path: source.to_path_buf(),
            source: e,
        })?;

        if !metadata.is_file() {
            return Err(ArchiveError::NotRegularFile {
                path: source.to_path_buf(),
            });
        }

        let file = File::open(source).map_err(|e| ArchiveError::Io {
            path: source.to_path_buf(),
            source: e,
        })?;

        self.add_file(path, file, file_mode(&metadata))
    }

    /// Insert every file below `root`, prefixed with `prefix`.
    ///
    /// Entries are added in file-name order so the result does not depend on
    /// directory iteration order.
    pub fn add_directory(&mut self, root: &Path, prefix: &str) -> Result<(), ArchiveError> {
        let walker = WalkDir::new(root).follow_links(false).sort_by_file_name();

        for entry in walker {
            let entry = entry.map_err(|e| ArchiveError::Io {
                path: e.path().unwrap_or(root).to_path_buf(),
                source: e.into(),
            })?;

            if entry.file_type().is_dir() {
                continue;
            }

            let rel = entry
                .path()
                .strip_prefix(root)
                .unwrap_or_else(|_| entry.path());
            let name = join_entry_path(prefix, rel);
            self.add_path(&name, entry.path())?;
        }

        Ok(())
    }

    /// Finalize the archive and return its bytes. Further writes fail.
    pub fn close(&mut self) -> Result<Vec<u8>, ArchiveError> {
        let writer = self.writer.take().ok_or(ArchiveError::Closed)?;
        let cursor = writer.finish()?;
        Ok(cursor.into_inner())
    }
}

impl Default for ArchiveBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ArchiveBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveBuilder")
            .field("entries", &self.names.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Hex-encoded SHA-256 of archive bytes, the content hash compared against
/// the remote's recorded code hash.
pub fn content_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

fn entry_options(mode: u32) -> SimpleFileOptions {
    SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(DateTime::default())
        .unix_permissions(mode)
}

#[cfg(unix)]
fn file_mode(metadata: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o777
}

#[cfg(not(unix))]
fn file_mode(_metadata: &fs::Metadata) -> u32 {
    SYNTHETIC_MODE
}

/// Archive entry names always use forward slashes.
pub(crate) fn normalize_entry_path(path: &str) -> String {
    path.replace('\\', "/").trim_start_matches('/').to_string()
}

pub(crate) fn join_entry_path(prefix: &str, rel: &Path) -> String {
    let rel = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");

    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        rel
    } else {
        format!("{}/{}", prefix, rel)
    }
}

/// Read a finished archive back into `(name, content)` pairs.
pub fn read_entries(bytes: &[u8]) -> Result<Vec<(String, Vec<u8>)>, ArchiveError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))?;
    let mut entries = Vec::with_capacity(archive.len());

    for i in 0..archive.len() {
        let mut file = archive.by_index(i)?;
        if file.is_dir() {
            continue;
        }
        let name = file.name().to_string();
        let mut content = Vec::new();
        file.read_to_end(&mut content)
            .map_err(|source| ArchiveError::Io {
                path: PathBuf::from(&name),
                source,
            })?;
        entries.push((name, content));
    }

    Ok(entries)
}

/// Copy every entry of `bytes` into `builder`, skipping names rejected by `keep`.
pub fn copy_entries<F>(
    builder: &mut ArchiveBuilder,
    bytes: &[u8],
    mut keep: F,
) -> Result<usize, ArchiveError>
where
    F: FnMut(&str) -> bool,
{
    let mut copied = 0;
    for (name, content) in read_entries(bytes)? {
        if !keep(&name) {
            continue;
        }
        builder.add_bytes(&name, &content)?;
        copied += 1;
    }
    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &Path, rel: &str, content: &str) {
        let path = dir.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_bytes_round_trip() {
        let mut zip = ArchiveBuilder::new();
        zip.add_bytes(".env.json", br#"{"A":"1"}"#).unwrap();
        zip.add_bytes("lib\\index.js", b"exports.x = 1").unwrap();
        assert_eq!(zip.len(), 2);

        let bytes = zip.close().unwrap();
        let entries = read_entries(&bytes).unwrap();
        assert_eq!(entries[0].0, ".env.json");
        assert_eq!(entries[1].0, "lib/index.js");
        assert_eq!(entries[1].1, b"exports.x = 1");
    }

    #[test]
    fn test_write_after_close_fails() {
        let mut zip = ArchiveBuilder::new();
        zip.close().unwrap();
        assert!(zip.is_closed());
        assert!(matches!(
            zip.add_bytes("a", b"a"),
            Err(ArchiveError::Closed)
        ));
        assert!(matches!(zip.close(), Err(ArchiveError::Closed)));
    }

    #[test]
    fn test_duplicate_entry_rejected() {
        let mut zip = ArchiveBuilder::new();
        zip.add_bytes("index.js", b"a").unwrap();
        assert!(zip.contains("/index.js"));
        assert!(matches!(
            zip.add_bytes("index.js", b"b"),
            Err(ArchiveError::DuplicateEntry { .. })
        ));
        assert_eq!(zip.len(), 1);
    }

    #[test]
    fn test_directory_is_deterministic_across_mtimes() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "index.js", "exports.handle = () => 1");
        write(dir.path(), "lib/util.js", "module.exports = {}");

        let build = || {
            let mut zip = ArchiveBuilder::new();
            zip.add_directory(dir.path(), "").unwrap();
            zip.add_bytes(".env.json", b"{}").unwrap();
            zip.close().unwrap()
        };

        let first = build();

        // Touch a file with identical content; only its mtime changes.
        std::thread::sleep(std::time::Duration::from_millis(1100));
        write(dir.path(), "lib/util.js", "module.exports = {}");

        let second = build();
        assert_eq!(content_hash(&first), content_hash(&second));
    }

    #[test]
    fn test_directory_prefix() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a/b.txt", "b");

        let mut zip = ArchiveBuilder::new();
        zip.add_directory(dir.path(), "vendor/").unwrap();
        let entries = read_entries(&zip.close().unwrap()).unwrap();
        assert_eq!(entries[0].0, "vendor/a/b.txt");
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_resolves_to_target_content() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "real.txt", "real content");
        std::os::unix::fs::symlink(dir.path().join("real.txt"), dir.path().join("link.txt"))
            .unwrap();

        let mut zip = ArchiveBuilder::new();
        zip.add_path("link.txt", &dir.path().join("link.txt")).unwrap();
        let entries = read_entries(&zip.close().unwrap()).unwrap();
        assert_eq!(entries[0].1, b"real content");
    }

    #[cfg(unix)]
    #[test]
    fn test_socket_rejected() {
        let dir = TempDir::new().unwrap();
        let sock = dir.path().join("app.sock");
        let _listener = std::os::unix::net::UnixListener::bind(&sock).unwrap();

        let mut zip = ArchiveBuilder::new();
        let result = zip.add_path("app.sock", &sock);
        assert!(matches!(result, Err(ArchiveError::NotRegularFile { .. })));
    }

    #[test]
    fn test_content_hash_is_hex_sha256() {
        assert_eq!(
            content_hash(b"Hello World"),
            "a591a6d40bf420404a011733cfb7b190d62c65bf0bcda32b57b277d9ad9f146e"
        );
    }
}
