//! Canonical archive file names.
//!
//! Every stored PDF is addressed solely by a name of the form
//! `{subject}_{session_letter}{yy}_{qp|ms}_{variant}.pdf`, e.g.
//! `9626_s23_qp_21.pdf`. This module derives those names, decodes them, and
//! maps a question-paper name onto its marking scheme.

use serde::{Deserialize, Serialize};

use crate::models::{DocKind, ExamYear, Session, Variant};

/// The fields that identify one archive entry (apart from the subject).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntryKey {
    pub session: Session,
    pub year: ExamYear,
    pub variant: Variant,
    pub kind: DocKind,
}

impl EntryKey {
    pub fn file_name(&self, subject_code: &str) -> String {
        canonical_name(subject_code, self.session, self.year, self.kind, self.variant)
    }
}

/// Derives the canonical file name. Only the last two digits of `year` are kept.
pub fn canonical_name(
    subject_code: &str,
    session: Session,
    year: ExamYear,
    kind: DocKind,
    variant: Variant,
) -> String {
    format!(
        "{}_{}{:02}_{}_{}.pdf",
        subject_code,
        session.letter(),
        year.short(),
        kind.code(),
        variant.code()
    )
}

fn kind_marker(kind: DocKind) -> String {
    format!("_{}_", kind.code())
}

/// Maps a file name of one kind onto the same sitting's file of another kind
/// by substituting the type-code segment.
///
/// Returns `None` when `file_name` carries no `_{from}_` marker.
pub fn counterpart_name(file_name: &str, from: DocKind, to: DocKind) -> Option<String> {
    let marker = kind_marker(from);
    if !file_name.contains(&marker) {
        return None;
    }
    Some(file_name.replacen(&marker, &kind_marker(to), 1))
}

/// The marking-scheme name for a question-paper name.
pub fn marking_scheme_name(question_paper: &str) -> Option<String> {
    counterpart_name(
        question_paper,
        DocKind::QuestionPaper,
        DocKind::MarkingScheme,
    )
}

/// A decoded canonical file name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchiveName {
    pub subject_code: String,
    pub session: Session,
    /// Two-digit year as it appears in the name.
    pub year_short: u16,
    pub kind: DocKind,
    pub variant: Variant,
}

impl ArchiveName {
    /// Parses `9626_s23_qp_21.pdf`-style names; anything else yields `None`.
    pub fn parse(file_name: &str) -> Option<Self> {
        let stem = file_name.strip_suffix(".pdf")?;
        let mut parts = stem.split('_');
        let subject_code = parts.next()?;
        let sitting = parts.next()?;
        let kind = parts.next()?;
        let variant = parts.next()?;
        if parts.next().is_some() || subject_code.is_empty() {
            return None;
        }

        let mut sitting_chars = sitting.chars();
        let session = Session::from_letter(sitting_chars.next()?)?;
        let digits = sitting_chars.as_str();
        if digits.len() != 2 || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let year_short = digits.parse().ok()?;

        let kind = DocKind::ALL.into_iter().find(|k| k.code() == kind)?;
        let variant = Variant::lookup(variant)?;

        Some(Self {
            subject_code: subject_code.to_string(),
            session,
            year_short,
            kind,
            variant,
        })
    }
}
