//! On-disk artifact cache.
//!
//! Every cacheable entry owns a directory under the cache root, derived from
//! its provider tag and coordinate (`<root>/curse/<addon>/<file>`,
//! `<root>/mvn/<group>/<artifact>/<version>`, ...). A directory holding at
//! least one file is a hit; the first file (in name order) is the artifact.
//! Small metadata documents such as registry snapshots are stored under
//! plain keys next to the artifact directories.

use regex::Regex;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

fn sanitize_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new("[^A-Za-z0-9._-]").expect("static regex"))
}

/// Make one path component safe for the filesystem
pub fn sanitize_component(component: &str) -> String {
    let cleaned = sanitize_regex().replace_all(component, "-").into_owned();
    match cleaned.as_str() {
        "" | "." | ".." => "_".to_string(),
        _ => cleaned,
    }
}

/// Filesystem cache shared by every provider of a run
#[derive(Debug, Clone)]
pub struct Cache {
    root: PathBuf,
}

impl Cache {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Root directory of the cache
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory for one provider tag, the `cache_base` of its entries
    pub fn base_dir(&self, tag: &str) -> PathBuf {
        self.root.join(sanitize_component(tag))
    }

    /// Directory for an artifact, derived from its coordinate parts
    pub fn artifact_dir(&self, tag: &str, parts: &[&str]) -> PathBuf {
        parts
            .iter()
            .fold(self.base_dir(tag), |dir, part| dir.join(sanitize_component(part)))
    }

    /// First file in `dir`, if the directory exists and holds one
    pub fn lookup(&self, dir: &Path) -> io::Result<Option<PathBuf>> {
        let read_dir = match fs::read_dir(dir) {
            Ok(rd) => rd,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };

        let mut files = Vec::new();
        for item in read_dir {
            let item = item?;
            if item.file_type()?.is_file() {
                files.push(item.path());
            }
        }
        files.sort();
        Ok(files.into_iter().next())
    }

    /// Copy the cached artifact in `dir` to `dest`
    ///
    /// # Returns
    /// * `Ok(true)` - A cached file was copied
    /// * `Ok(false)` - Nothing cached in `dir`
    pub fn restore(&self, dir: &Path, dest: &Path) -> io::Result<bool> {
        let Some(cached) = self.lookup(dir)? else {
            return Ok(false);
        };

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(&cached, dest)?;
        log::debug!("Cache hit: {} -> {}", cached.display(), dest.display());
        Ok(true)
    }

    /// Store a freshly downloaded artifact in `dir`, keeping its file name
    pub fn store(&self, dir: &Path, source: &Path) -> io::Result<()> {
        let file_name = source.file_name().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} has no file name", source.display()),
            )
        })?;

        fs::create_dir_all(dir)?;
        fs::copy(source, dir.join(file_name))?;
        Ok(())
    }

    fn key_path(&self, key: &str) -> PathBuf {
        key.split('/')
            .filter(|part| !part.is_empty())
            .fold(self.root.clone(), |path, part| path.join(sanitize_component(part)))
    }

    /// Read a metadata document stored under `key` (`/`-separated)
    pub fn read(&self, key: &str) -> io::Result<Option<Vec<u8>>> {
        match fs::read(self.key_path(key)) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Write a metadata document under `key`
    pub fn write(&self, key: &str, data: &[u8]) -> io::Result<()> {
        let path = self.key_path(key);

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(&path, data)
    }
}
