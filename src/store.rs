//! Filename-addressed PDF storage.
//!
//! Two flat directories, one per [`DocKind`]. Entries are addressed only by
//! their canonical name; saving an existing name replaces it. Writes land in
//! a temp file inside the target directory and are renamed into place, so a
//! concurrent reader sees either the old file or the new one.

use anyhow::{bail, Context, Result};
use globset::{Glob, GlobMatcher};
use std::io::Write;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::ArchiveConfig;
use crate::extract::looks_like_pdf;
use crate::models::DocKind;
use crate::naming::EntryKey;

#[derive(Debug, Clone)]
pub struct ArchiveStore {
    question_papers: PathBuf,
    marking_schemes: PathBuf,
}

impl ArchiveStore {
    pub fn new(question_papers: impl Into<PathBuf>, marking_schemes: impl Into<PathBuf>) -> Self {
        Self {
            question_papers: question_papers.into(),
            marking_schemes: marking_schemes.into(),
        }
    }

    pub fn from_config(config: &ArchiveConfig) -> Self {
        Self::new(&config.question_paper_dir, &config.marking_scheme_dir)
    }

    /// Creates both category directories if absent.
    pub fn ensure_dirs(&self) -> Result<()> {
        for kind in DocKind::ALL {
            let dir = self.dir(kind);
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
        }
        Ok(())
    }

    pub fn dir(&self, kind: DocKind) -> &Path {
        match kind {
            DocKind::QuestionPaper => &self.question_papers,
            DocKind::MarkingScheme => &self.marking_schemes,
        }
    }

    pub fn path_for(&self, kind: DocKind, name: &str) -> PathBuf {
        self.dir(kind).join(name)
    }

    pub fn exists(&self, kind: DocKind, name: &str) -> bool {
        check_name(name).is_ok() && self.path_for(kind, name).is_file()
    }

    pub fn read(&self, kind: DocKind, name: &str) -> Result<Vec<u8>> {
        check_name(name)?;
        let path = self.path_for(kind, name);
        std::fs::read(&path).with_context(|| format!("Failed to read {}", path.display()))
    }

    /// Writes `bytes` as `name` in the directory for `kind`, replacing any existing file.
    pub fn save(&self, bytes: &[u8], name: &str, kind: DocKind) -> Result<PathBuf> {
        check_name(name)?;
        let dir = self.dir(kind);
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create directory: {}", dir.display()))?;

        let target = dir.join(name);
        let mut tmp = tempfile::NamedTempFile::new_in(dir)
            .with_context(|| format!("Failed to create temp file in {}", dir.display()))?;
        tmp.write_all(bytes)?;
        tmp.flush()?;
        tmp.persist(&target)
            .with_context(|| format!("Failed to write {}", target.display()))?;

        tracing::info!(file = name, kind = kind.code(), bytes = bytes.len(), "saved archive entry");
        Ok(target)
    }

    /// Stores an uploaded PDF under its canonical name and returns that name.
    pub fn upload(&self, subject_code: &str, key: &EntryKey, bytes: &[u8]) -> Result<String> {
        if !looks_like_pdf(bytes) {
            bail!("upload rejected: payload is not a PDF file");
        }
        let name = key.file_name(subject_code);
        self.save(bytes, &name, key.kind)?;
        Ok(name)
    }

    /// Stored `.pdf` names for `kind`, sorted. A missing directory lists as empty.
    pub fn list(&self, kind: DocKind) -> Result<Vec<String>> {
        self.list_matching(kind, "*.pdf")
    }

    /// Stored names for `kind` matching a glob such as `9626_*_qp_11.pdf`.
    pub fn list_matching(&self, kind: DocKind, pattern: &str) -> Result<Vec<String>> {
        let dir = self.dir(kind);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let matcher: GlobMatcher = Glob::new(pattern)?.compile_matcher();

        let mut names = Vec::new();
        for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if matcher.is_match(&name) {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }
}

/// Rejects anything that is not a bare file name.
fn check_name(name: &str) -> Result<()> {
    if name.is_empty()
        || name == "."
        || name.contains("..")
        || name.contains('/')
        || name.contains('\\')
    {
        bail!("invalid archive file name: '{}'", name);
    }
    Ok(())
}
