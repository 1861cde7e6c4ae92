//! Single-year and 4-year batch searches over the question-paper archive.
//!
//! Candidates are enumerated from the naming convention rather than by
//! listing directories: for each year, sessions are visited in the fixed
//! order m, s, w; absent files are skipped silently. Results keep that
//! order, which is also the section order of any exported document.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use crate::extract::{extract, normalize_keyword, Extraction, ExtractionResult, PageExtractor};
use crate::models::{DocKind, ExamYear, Session, Variant, BATCH_WINDOW_YEARS};
use crate::naming::EntryKey;
use crate::store::ArchiveStore;

/// Width of the `=` rules framing each batch section header.
const SECTION_RULE_WIDTH: usize = 40;

/// Characters shown per single-year result before truncating.
pub const SEARCH_PREVIEW_CHARS: usize = 500;
/// Characters of the aggregate shown after a batch run.
pub const BATCH_PREVIEW_CHARS: usize = 1000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub topic: Option<String>,
    pub year: ExamYear,
    pub variant: Variant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchQuery {
    pub topic: Option<String>,
    pub start_year: ExamYear,
    pub variant: Variant,
}

impl BatchQuery {
    /// Fails if the window `[start, start + 3]` runs past the last valid year.
    pub fn new(topic: Option<String>, start_year: ExamYear, variant: Variant) -> Result<Self> {
        let end = start_year.get() + BATCH_WINDOW_YEARS - 1;
        if ExamYear::new(end).is_none() {
            bail!(
                "batch window {}-{} ends after the last supported year",
                start_year,
                end
            );
        }
        Ok(Self {
            topic,
            start_year,
            variant,
        })
    }

    pub fn end_year(&self) -> ExamYear {
        self.years().last().unwrap_or(self.start_year)
    }

    /// Window years, ascending.
    pub fn years(&self) -> impl Iterator<Item = ExamYear> {
        let start = self.start_year.get();
        (start..start + BATCH_WINDOW_YEARS).filter_map(ExamYear::new)
    }
}

/// A file that existed but could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadFailure {
    pub source_file: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchReport {
    /// Hits in session order.
    pub results: Vec<ExtractionResult>,
    pub failures: Vec<ReadFailure>,
}

impl SearchReport {
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSection {
    pub year: ExamYear,
    pub session: Session,
    pub result: ExtractionResult,
}

impl BatchSection {
    pub fn header(&self) -> String {
        section_header(self.year, self.session)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    pub query: BatchQuery,
    /// Ascending by year, then m, s, w.
    pub sections: Vec<BatchSection>,
    pub failures: Vec<ReadFailure>,
}

impl BatchReport {
    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// All sections concatenated, each behind its labeled header.
    pub fn aggregate_text(&self) -> String {
        let mut out = String::new();
        for section in &self.sections {
            out.push_str(&section.header());
            out.push_str(&section.result.render());
        }
        out
    }
}

/// `YEAR: 2020 | SESSION: W` framed by rules of `=`.
pub fn section_header(year: ExamYear, session: Session) -> String {
    let rule = "=".repeat(SECTION_RULE_WIDTH);
    format!(
        "\n\n{}\nYEAR: {} | SESSION: {}\n{}\n",
        rule,
        year,
        session.letter().to_ascii_uppercase(),
        rule
    )
}

/// Char-boundary-safe truncation with a trailing `...`.
pub fn preview(text: &str, limit: usize) -> String {
    let mut out: String = text.chars().take(limit).collect();
    out.push_str("...");
    out
}

/// Drives candidate enumeration and extraction for one archive.
pub struct Searcher<'a> {
    subject_code: &'a str,
    store: &'a ArchiveStore,
    extractor: &'a dyn PageExtractor,
}

impl<'a> Searcher<'a> {
    pub fn new(
        subject_code: &'a str,
        store: &'a ArchiveStore,
        extractor: &'a dyn PageExtractor,
    ) -> Self {
        Self {
            subject_code,
            store,
            extractor,
        }
    }

    pub fn search_year(&self, query: &SearchQuery) -> SearchReport {
        let keyword = normalize_keyword(query.topic.as_deref());
        let mut report = SearchReport::default();
        for session in Session::ALL {
            match self.extract_candidate(session, query.year, query.variant, keyword.as_deref()) {
                Candidate::Hit(result) => report.results.push(result),
                Candidate::Failed(failure) => report.failures.push(failure),
                Candidate::Skip => {}
            }
        }
        tracing::info!(
            year = query.year.get(),
            variant = query.variant.code(),
            hits = report.results.len(),
            failures = report.failures.len(),
            "single-year search complete"
        );
        report
    }

    pub fn search_batch(&self, query: &BatchQuery) -> BatchReport {
        let keyword = normalize_keyword(query.topic.as_deref());
        let mut sections = Vec::new();
        let mut failures = Vec::new();
        for year in query.years() {
            for session in Session::ALL {
                match self.extract_candidate(session, year, query.variant, keyword.as_deref()) {
                    Candidate::Hit(result) => sections.push(BatchSection {
                        year,
                        session,
                        result,
                    }),
                    Candidate::Failed(failure) => failures.push(failure),
                    Candidate::Skip => {}
                }
            }
        }
        tracing::info!(
            start = query.start_year.get(),
            end = query.end_year().get(),
            variant = query.variant.code(),
            sections = sections.len(),
            failures = failures.len(),
            "batch search complete"
        );
        BatchReport {
            query: query.clone(),
            sections,
            failures,
        }
    }

    fn extract_candidate(
        &self,
        session: Session,
        year: ExamYear,
        variant: Variant,
        keyword: Option<&str>,
    ) -> Candidate {
        let key = EntryKey {
            session,
            year,
            variant,
            kind: DocKind::QuestionPaper,
        };
        let name = key.file_name(self.subject_code);
        if !self.store.exists(DocKind::QuestionPaper, &name) {
            tracing::debug!(file = %name, "candidate not in archive");
            return Candidate::Skip;
        }

        let path = self.store.path_for(DocKind::QuestionPaper, &name);
        match extract(&path, keyword, self.extractor) {
            Extraction::Found(result) => {
                tracing::debug!(file = %name, pages = result.pages.len(), "candidate matched");
                Candidate::Hit(result)
            }
            Extraction::Missing | Extraction::NoMatch => {
                tracing::debug!(file = %name, "candidate had no matching pages");
                Candidate::Skip
            }
            Extraction::Unreadable {
                source_file,
                reason,
            } => {
                tracing::warn!(file = %source_file, error = %reason, "could not read question paper");
                Candidate::Failed(ReadFailure {
                    source_file,
                    reason,
                })
            }
        }
    }
}

enum Candidate {
    Hit(ExtractionResult),
    Failed(ReadFailure),
    Skip,
}
