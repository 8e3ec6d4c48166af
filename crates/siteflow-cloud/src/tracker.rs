//! File change tracking
//!
//! Scans the site directory, hashes every file and classifies it against the
//! digest map stored with the previous deployment.

use crate::error::{CloudError, Result};
use glob::Pattern;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// A local file considered for upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDescriptor {
    pub path: PathBuf,
    /// Forward-slash path relative to the scan root
    pub key: String,
    pub size: u64,
    /// Hex-encoded SHA-256 of the content
    pub digest: String,
    pub content_type: String,
    /// Text-like content worth compressing
    pub compressible: bool,
}

/// Result of comparing a scan against a previous digest map
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    pub added: Vec<FileDescriptor>,
    pub modified: Vec<FileDescriptor>,
    pub deleted: Vec<String>,
    pub unchanged: Vec<FileDescriptor>,
}

impl ChangeSet {
    /// Files that must be uploaded (added + modified)
    pub fn to_upload(&self) -> Vec<FileDescriptor> {
        self.added
            .iter()
            .chain(self.modified.iter())
            .cloned()
            .collect()
    }

    pub fn has_changes(&self) -> bool {
        !self.added.is_empty() || !self.modified.is_empty() || !self.deleted.is_empty()
    }

    /// Digest map describing the current local tree
    pub fn current_digests(&self) -> BTreeMap<String, String> {
        self.added
            .iter()
            .chain(self.modified.iter())
            .chain(self.unchanged.iter())
            .map(|f| (f.key.clone(), f.digest.clone()))
            .collect()
    }

    pub fn summary(&self) -> ChangeSummary {
        ChangeSummary {
            added: self.added.len(),
            modified: self.modified.len(),
            deleted: self.deleted.len(),
            unchanged: self.unchanged.len(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChangeSummary {
    pub added: usize,
    pub modified: usize,
    pub deleted: usize,
    pub unchanged: usize,
}

impl std::fmt::Display for ChangeSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} added, {} modified, {} deleted, {} unchanged",
            self.added, self.modified, self.deleted, self.unchanged
        )
    }
}

/// Compiled exclude patterns.
///
/// Patterns containing `/` match the whole relative key; others match any
/// single path component, so `node_modules` or `*.map` apply at every depth.
#[derive(Debug, Clone, Default)]
pub struct ExcludeSet {
    patterns: Vec<Pattern>,
}

impl ExcludeSet {
    pub fn new(patterns: &[String]) -> Result<Self> {
        let patterns = patterns
            .iter()
            .map(|p| {
                Pattern::new(p.trim_start_matches("./")).map_err(|e| {
                    CloudError::InvalidConfig(format!("invalid exclude pattern `{}`: {}", p, e))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    pub fn is_excluded(&self, key: &str) -> bool {
        self.patterns.iter().any(|pattern| {
            if pattern.as_str().contains('/') {
                pattern.matches(key)
            } else {
                key.split('/').any(|component| pattern.matches(component))
            }
        })
    }
}

/// Hex SHA-256 of a byte slice
pub fn hash_bytes(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Hex SHA-256 of a file's content, streamed
pub fn hash_file(path: &Path) -> Result<String> {
    let mut file = File::open(path).map_err(|e| scan_error(path, e))?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 64 * 1024];
    loop {
        let read = file.read(&mut buffer).map_err(|e| scan_error(path, e))?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}

fn scan_error(path: &Path, err: impl std::fmt::Display) -> CloudError {
    CloudError::Scan {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}

/// Forward-slash relative key for `path` under `root`.
///
/// `None` for the root itself and for names that are not valid UTF-8.
pub fn normalize_key(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts = relative
        .components()
        .map(|c| c.as_os_str().to_str().map(str::to_string))
        .collect::<Option<Vec<String>>>()?;
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

/// MIME type for a key; unknown extensions fall back to octet-stream
pub fn content_type_for(key: &str) -> String {
    mime_guess::from_path(key)
        .first()
        .map(|mime| {
            let essence = mime.essence_str().to_string();
            if mime.type_() == mime_guess::mime::TEXT
                || essence == "application/javascript"
                || essence == "application/json"
            {
                format!("{}; charset=utf-8", essence)
            } else {
                essence
            }
        })
        .unwrap_or_else(|| "application/octet-stream".to_string())
}

/// Text-like families: markup, stylesheets, scripts, structured data, SVG and
/// uncompressed font formats
pub fn is_compressible(content_type: &str) -> bool {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim();
    if essence.starts_with("text/") {
        return true;
    }
    matches!(
        essence,
        "application/javascript"
            | "application/x-javascript"
            | "application/ecmascript"
            | "application/json"
            | "application/ld+json"
            | "application/manifest+json"
            | "application/xml"
            | "application/xhtml+xml"
            | "application/rss+xml"
            | "application/atom+xml"
            | "application/wasm"
            | "image/svg+xml"
            | "image/x-icon"
            | "image/vnd.microsoft.icon"
            | "font/ttf"
            | "font/otf"
            | "application/vnd.ms-fontobject"
            | "application/x-font-ttf"
            | "application/font-sfnt"
    ) || essence.ends_with("+json")
        || essence.ends_with("+xml")
}

/// Scan `root` and describe every non-excluded regular file, ordered by key
pub fn scan(root: &Path, excludes: &ExcludeSet) -> Result<Vec<FileDescriptor>> {
    let metadata = std::fs::metadata(root).map_err(|e| scan_error(root, e))?;
    if !metadata.is_dir() {
        return Err(scan_error(root, "not a directory"));
    }

    let mut files = Vec::new();
    let walker = WalkDir::new(root)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            normalize_key(root, entry.path())
                .map(|key| !excludes.is_excluded(&key))
                .unwrap_or(true)
        });

    for entry in walker {
        let entry = entry.map_err(|e| {
            let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf());
            scan_error(&path, e)
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(key) = normalize_key(root, entry.path()) else {
            tracing::warn!(
                "Skipping {}: file names must be valid UTF-8",
                entry.path().display()
            );
            continue;
        };

        let size = entry
            .metadata()
            .map_err(|e| scan_error(entry.path(), e))?
            .len();
        let digest = hash_file(entry.path())?;
        let content_type = content_type_for(&key);
        let compressible = is_compressible(&content_type);

        files.push(FileDescriptor {
            path: entry.path().to_path_buf(),
            key,
            size,
            digest,
            content_type,
            compressible,
        });
    }

    files.sort_by(|a, b| a.key.cmp(&b.key));
    tracing::debug!("Scanned {} files under {}", files.len(), root.display());
    Ok(files)
}

/// Partition `current` against `previous` into added/modified/deleted/unchanged
pub fn classify(current: &[FileDescriptor], previous: &BTreeMap<String, String>) -> ChangeSet {
    let mut changes = ChangeSet::default();
    let mut seen = BTreeSet::new();

    for file in current {
        if !seen.insert(file.key.as_str()) {
            continue;
        }
        match previous.get(&file.key) {
            None => changes.added.push(file.clone()),
            Some(digest) if *digest != file.digest => changes.modified.push(file.clone()),
            Some(_) => changes.unchanged.push(file.clone()),
        }
    }

    changes.deleted = previous
        .keys()
        .filter(|key| !seen.contains(key.as_str()))
        .cloned()
        .collect();

    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn write(root: &Path, key: &str, content: &str) {
        let path = root.join(key);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn digests(files: &[FileDescriptor]) -> BTreeMap<String, String> {
        files
            .iter()
            .map(|f| (f.key.clone(), f.digest.clone()))
            .collect()
    }

    #[test]
    fn test_hash_is_deterministic() {
        assert_eq!(hash_bytes(b"hello"), hash_bytes(b"hello"));
        assert_ne!(hash_bytes(b"hello"), hash_bytes(b"hello!"));
        assert_eq!(
            hash_bytes(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_hash_file_matches_hash_bytes() {
        let dir = tempdir().unwrap();
        write(dir.path(), "index.html", "<h1>hi</h1>");
        assert_eq!(
            hash_file(&dir.path().join("index.html")).unwrap(),
            hash_bytes(b"<h1>hi</h1>")
        );
    }

    #[test]
    fn test_scan_orders_and_normalizes_keys() {
        let dir = tempdir().unwrap();
        write(dir.path(), "index.html", "<h1>home</h1>");
        write(dir.path(), "assets/js/app.js", "console.log(1)");
        write(dir.path(), "assets/img/logo.png", "png");

        let files = scan(dir.path(), &ExcludeSet::default()).unwrap();
        let keys: Vec<&str> = files.iter().map(|f| f.key.as_str()).collect();
        assert_eq!(
            keys,
            vec!["assets/img/logo.png", "assets/js/app.js", "index.html"]
        );
        assert!(files[1].compressible);
        assert!(!files[0].compressible);
        assert_eq!(files[2].content_type, "text/html; charset=utf-8");
        assert_eq!(files[2].size, 13);
    }

    #[test]
    fn test_scan_empty_directory() {
        let dir = tempdir().unwrap();
        assert!(scan(dir.path(), &ExcludeSet::default()).unwrap().is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_scan_skips_names_that_are_not_utf8() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let dir = tempdir().unwrap();
        write(dir.path(), "index.html", "home");
        // both would collapse to the same lossy key
        fs::write(dir.path().join(OsStr::from_bytes(b"caf\xe9.html")), "latin-1").unwrap();
        fs::write(dir.path().join(OsStr::from_bytes(b"caf\xe8.html")), "other").unwrap();

        let files = scan(dir.path(), &ExcludeSet::default()).unwrap();
        let keys: Vec<&str> = files.iter().map(|f| f.key.as_str()).collect();
        assert_eq!(keys, vec!["index.html"]);
    }

    #[test]
    fn test_normalize_key_is_relative_to_root() {
        let root = Path::new("/site");
        assert_eq!(
            normalize_key(root, Path::new("/site/assets/app.js")).as_deref(),
            Some("assets/app.js")
        );
        assert_eq!(normalize_key(root, root), None);
    }

    #[test]
    fn test_scan_missing_root_is_an_error() {
        let dir = tempdir().unwrap();
        let err = scan(&dir.path().join("missing"), &ExcludeSet::default()).unwrap_err();
        assert!(matches!(err, CloudError::Scan { .. }));
    }

    #[test]
    fn test_excludes() {
        let dir = tempdir().unwrap();
        write(dir.path(), "index.html", "home");
        write(dir.path(), "app.js.map", "map");
        write(dir.path(), ".DS_Store", "junk");
        write(dir.path(), "drafts/post.html", "draft");
        write(dir.path(), "blog/drafts/keep.html", "nested");

        let excludes = ExcludeSet::new(&[
            "*.map".to_string(),
            ".DS_Store".to_string(),
            "drafts/**".to_string(),
        ])
        .unwrap();
        let files = scan(dir.path(), &excludes).unwrap();
        let keys: Vec<&str> = files.iter().map(|f| f.key.as_str()).collect();
        assert_eq!(keys, vec!["blog/drafts/keep.html", "index.html"]);
    }

    #[test]
    fn test_invalid_exclude_pattern() {
        assert!(ExcludeSet::new(&["[".to_string()]).is_err());
    }

    #[test]
    fn test_classify_partitions_keys() {
        let dir = tempdir().unwrap();
        write(dir.path(), "same.html", "same");
        write(dir.path(), "changed.html", "new content");
        write(dir.path(), "new.html", "brand new");
        let current = scan(dir.path(), &ExcludeSet::default()).unwrap();

        let mut previous = BTreeMap::new();
        previous.insert("same.html".to_string(), hash_bytes(b"same"));
        previous.insert("changed.html".to_string(), hash_bytes(b"old content"));
        previous.insert("gone.html".to_string(), hash_bytes(b"gone"));

        let changes = classify(&current, &previous);
        assert_eq!(changes.added.len(), 1);
        assert_eq!(changes.added[0].key, "new.html");
        assert_eq!(changes.modified[0].key, "changed.html");
        assert_eq!(changes.deleted, vec!["gone.html".to_string()]);
        assert_eq!(changes.unchanged[0].key, "same.html");

        // the four sets partition the union of keys
        let mut union: BTreeSet<String> = previous.keys().cloned().collect();
        union.extend(current.iter().map(|f| f.key.clone()));
        let mut all: Vec<String> = changes
            .added
            .iter()
            .chain(&changes.modified)
            .chain(&changes.unchanged)
            .map(|f| f.key.clone())
            .chain(changes.deleted.iter().cloned())
            .collect();
        let total = all.len();
        all.sort();
        all.dedup();
        assert_eq!(total, all.len(), "sets must be disjoint");
        assert_eq!(all.into_iter().collect::<BTreeSet<_>>(), union);
    }

    #[test]
    fn test_classify_is_idempotent() {
        let dir = tempdir().unwrap();
        for i in 0..10 {
            write(dir.path(), &format!("page-{}.html", i), &format!("page {}", i));
        }
        let current = scan(dir.path(), &ExcludeSet::default()).unwrap();

        let first = classify(&current, &BTreeMap::new());
        assert_eq!(first.added.len(), 10);

        let previous = first.current_digests();
        let rescanned = scan(dir.path(), &ExcludeSet::default()).unwrap();
        let second = classify(&rescanned, &previous);
        assert!(!second.has_changes());
        assert_eq!(second.unchanged.len(), 10);
        assert_eq!(digests(&rescanned), previous);
    }

    #[test]
    fn test_compressible_families() {
        assert!(is_compressible("text/css; charset=utf-8"));
        assert!(is_compressible("application/json"));
        assert!(is_compressible("image/svg+xml"));
        assert!(is_compressible("application/manifest+json"));
        assert!(!is_compressible("image/png"));
        assert!(!is_compressible("font/woff2"));
        assert!(!is_compressible("application/octet-stream"));
        assert_eq!(content_type_for("LICENSE"), "application/octet-stream");
    }
}
