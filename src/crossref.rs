//! Marking-scheme lookup for the results a session is holding.
//!
//! Read-only: the session is never modified.

use base64::Engine;
use serde::Serialize;
use std::path::PathBuf;

use crate::extract::MIME_PDF;
use crate::models::DocKind;
use crate::naming::marking_scheme_name;
use crate::session::SessionState;
use crate::store::ArchiveStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemeHit {
    pub question_paper: String,
    pub marking_scheme: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CrossReference {
    /// The session holds no results.
    NothingToShow,
    /// None of the held results names a question paper.
    Unresolvable,
    Resolved {
        found: Vec<SchemeHit>,
        /// Expected marking-scheme names absent from the archive.
        missing: Vec<String>,
    },
}

impl CrossReference {
    /// True when at least one marking scheme can be shown.
    pub fn any_found(&self) -> bool {
        matches!(self, CrossReference::Resolved { found, .. } if !found.is_empty())
    }
}

/// Resolves the marking scheme for every held result, in result order.
pub fn cross_reference(state: &SessionState, store: &ArchiveStore) -> CrossReference {
    let results = state.results();
    if results.is_empty() {
        return CrossReference::NothingToShow;
    }

    let mut found = Vec::new();
    let mut missing = Vec::new();
    let mut resolvable = false;
    for result in results {
        let Some(ms_name) = marking_scheme_name(&result.source_file) else {
            tracing::debug!(file = %result.source_file, "held result has no question-paper marker");
            continue;
        };
        resolvable = true;
        if store.exists(DocKind::MarkingScheme, &ms_name) {
            found.push(SchemeHit {
                question_paper: result.source_file.clone(),
                path: store.path_for(DocKind::MarkingScheme, &ms_name),
                marking_scheme: ms_name,
            });
        } else {
            tracing::info!(expected = %ms_name, "marking scheme not in archive");
            missing.push(ms_name);
        }
    }

    if !resolvable {
        return CrossReference::Unresolvable;
    }
    CrossReference::Resolved { found, missing }
}

/// `data:application/pdf;base64,...` for inline display.
pub fn pdf_data_uri(bytes: &[u8]) -> String {
    format!(
        "data:{};base64,{}",
        MIME_PDF,
        base64::engine::general_purpose::STANDARD.encode(bytes)
    )
}
