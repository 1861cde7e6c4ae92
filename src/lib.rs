//! # pyp-archive
//!
//! Store, search and repackage past-exam-paper PDFs.
//!
//! Question papers and marking schemes live in two flat directories and are
//! addressed only by canonical file name (`9626_s23_qp_21.pdf`). Searches
//! enumerate candidate names for one year or a 4-year window, pull matching
//! pages out of each PDF, and hold the results in a session from which they
//! can be exported to Word or cross-referenced against marking schemes.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────┐   ┌───────────┐   ┌──────────┐
//! │  naming  │──▶│  search   │──▶│  extract  │──▶│  store   │
//! └──────────┘   └─────┬─────┘   └───────────┘   └──────────┘
//!                      ▼
//!                ┌───────────┐
//!                │  session  │
//!                └─────┬─────┘
//!            ┌─────────┴─────────┐
//!            ▼                   ▼
//!       ┌──────────┐       ┌──────────┐
//!       │  export  │       │ crossref │
//!       └──────────┘       └──────────┘
//! ```
//!
//! The `pyp` CLI and the HTTP [`server`] are two front ends over the same
//! modules.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Sessions, papers, variants, years, document kinds |
//! | [`naming`] | Canonical file names and the QP → MS mapping |
//! | [`extract`] | Per-page PDF text and keyword matching |
//! | [`store`] | Filename-addressed PDF directories |
//! | [`search`] | Single-year and batch search |
//! | [`session`] | Held results between actions |
//! | [`export`] | `.docx` assembly |
//! | [`crossref`] | Marking-scheme lookup |
//! | [`server`] | JSON HTTP API |

pub mod config;
pub mod crossref;
pub mod export;
pub mod extract;
pub mod models;
pub mod naming;
pub mod search;
pub mod server;
pub mod session;
pub mod store;
