//! Core domain types for the past-paper archive.
//!
//! Sessions, papers, variants, exam years and document kinds. The variant
//! table is a single immutable static shared by every component; a
//! [`Variant`] can only be obtained by looking a code up in it, so a
//! (paper, variant) pair outside the table cannot be constructed.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Earliest year accepted anywhere in the archive.
pub const YEAR_MIN: u16 = 2019;
/// Latest year accepted anywhere in the archive.
pub const YEAR_MAX: u16 = 2099;
/// Number of consecutive years covered by one batch search.
pub const BATCH_WINDOW_YEARS: u16 = 4;

/// Paper number → valid variant codes.
static VARIANT_TABLE: [(u8, &[&str]); 4] = [
    (1, &["11", "12", "13"]),
    (2, &["02", "21", "22", "23"]),
    (3, &["31", "32", "33"]),
    (4, &["04", "41", "42", "43"]),
];

/// One of the three yearly exam administrations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Session {
    March,
    June,
    November,
}

impl Session {
    /// Fixed iteration order used by every search: m, s, w.
    pub const ALL: [Session; 3] = [Session::March, Session::June, Session::November];

    pub fn letter(self) -> char {
        match self {
            Session::March => 'm',
            Session::June => 's',
            Session::November => 'w',
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Session::March => "MARCH",
            Session::June => "JUNE",
            Session::November => "NOVEMBER",
        }
    }

    pub fn from_letter(letter: char) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|s| s.letter() == letter.to_ascii_lowercase())
    }
}

impl fmt::Display for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Session {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let mut chars = trimmed.chars();
        if let (Some(c), None) = (chars.next(), chars.next()) {
            if let Some(session) = Session::from_letter(c) {
                return Ok(session);
            }
        }
        Session::ALL
            .into_iter()
            .find(|session| session.label().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| {
                format!(
                    "unknown session '{}': expected MARCH, JUNE or NOVEMBER (or m, s, w)",
                    s
                )
            })
    }
}

/// Paper number, 1 to 4.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Paper(u8);

impl Paper {
    pub fn new(number: u8) -> Option<Self> {
        VARIANT_TABLE
            .iter()
            .any(|(p, _)| *p == number)
            .then_some(Paper(number))
    }

    /// All papers in ascending order.
    pub fn all() -> impl Iterator<Item = Paper> {
        VARIANT_TABLE.iter().map(|(p, _)| Paper(*p))
    }

    pub fn number(self) -> u8 {
        self.0
    }

    /// The variant codes that may be chosen for this paper.
    pub fn variants(self) -> &'static [&'static str] {
        VARIANT_TABLE
            .iter()
            .find(|(p, _)| *p == self.0)
            .map(|(_, codes)| *codes)
            .unwrap_or(&[])
    }

    /// Looks up `code` within this paper's variant set.
    pub fn variant(self, code: &str) -> Option<Variant> {
        let code = code.trim();
        self.variants()
            .iter()
            .find(|c| **c == code)
            .map(|c| Variant {
                paper: self,
                code: *c,
            })
    }

    /// Like [`Paper::variant`], but explains which codes are valid.
    pub fn require_variant(self, code: &str) -> Result<Variant, String> {
        self.variant(code).ok_or_else(|| {
            format!(
                "variant '{}' is not valid for paper {}: choose one of {}",
                code,
                self.0,
                self.variants().join(", ")
            )
        })
    }
}

impl TryFrom<u8> for Paper {
    type Error = String;

    fn try_from(number: u8) -> Result<Self, Self::Error> {
        Paper::new(number).ok_or_else(|| format!("paper must be 1-4, got {}", number))
    }
}

impl From<Paper> for u8 {
    fn from(paper: Paper) -> u8 {
        paper.0
    }
}

impl FromStr for Paper {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let number: u8 = s
            .trim()
            .parse()
            .map_err(|_| format!("paper must be 1-4, got '{}'", s))?;
        Paper::try_from(number)
    }
}

impl fmt::Display for Paper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A variant code paired with the paper it belongs to.
///
/// Serialized as the bare code; every code appears under exactly one paper,
/// so the paper is recovered on deserialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(into = "String")]
pub struct Variant {
    paper: Paper,
    code: &'static str,
}

impl Variant {
    /// Finds the paper owning `code`.
    pub fn lookup(code: &str) -> Option<Variant> {
        Paper::all().find_map(|paper| paper.variant(code))
    }

    pub fn paper(self) -> Paper {
        self.paper
    }

    pub fn code(self) -> &'static str {
        self.code
    }
}

impl TryFrom<String> for Variant {
    type Error = String;

    fn try_from(code: String) -> Result<Self, Self::Error> {
        Variant::lookup(&code).ok_or_else(|| format!("unknown variant code '{}'", code))
    }
}

impl<'de> Deserialize<'de> for Variant {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let code = String::deserialize(deserializer)?;
        Variant::try_from(code).map_err(serde::de::Error::custom)
    }
}

impl From<Variant> for String {
    fn from(variant: Variant) -> String {
        variant.code.to_string()
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code)
    }
}

/// Four-digit exam year within [`YEAR_MIN`, `YEAR_MAX`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub struct ExamYear(u16);

impl ExamYear {
    pub fn new(year: u16) -> Option<Self> {
        (YEAR_MIN..=YEAR_MAX)
            .contains(&year)
            .then_some(ExamYear(year))
    }

    pub fn get(self) -> u16 {
        self.0
    }

    /// The two digits used in file names (2023 → 23).
    pub fn short(self) -> u16 {
        self.0 % 100
    }
}

impl TryFrom<u16> for ExamYear {
    type Error = String;

    fn try_from(year: u16) -> Result<Self, Self::Error> {
        ExamYear::new(year)
            .ok_or_else(|| format!("year must be in {}-{}, got {}", YEAR_MIN, YEAR_MAX, year))
    }
}

impl From<ExamYear> for u16 {
    fn from(year: ExamYear) -> u16 {
        year.0
    }
}

impl FromStr for ExamYear {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let year: u16 = s
            .trim()
            .parse()
            .map_err(|_| format!("year must be a 4-digit number, got '{}'", s))?;
        ExamYear::try_from(year)
    }
}

impl fmt::Display for ExamYear {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Question paper or marking scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DocKind {
    QuestionPaper,
    MarkingScheme,
}

impl DocKind {
    pub const ALL: [DocKind; 2] = [DocKind::QuestionPaper, DocKind::MarkingScheme];

    /// Short code embedded in file names.
    pub fn code(self) -> &'static str {
        match self {
            DocKind::QuestionPaper => "qp",
            DocKind::MarkingScheme => "ms",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            DocKind::QuestionPaper => "Question Paper (QP)",
            DocKind::MarkingScheme => "Marking Scheme (MS)",
        }
    }
}

impl fmt::Display for DocKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for DocKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "qp" | "question-paper" | "question_paper" => Ok(DocKind::QuestionPaper),
            "ms" | "marking-scheme" | "marking_scheme" => Ok(DocKind::MarkingScheme),
            other => Err(format!(
                "unknown file type '{}': expected qp or ms",
                other
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_obtainable_variant_belongs_to_its_paper() {
        for paper in Paper::all() {
            for code in paper.variants() {
                let variant = paper.variant(code).unwrap();
                assert_eq!(variant.paper(), paper);
                assert!(paper.variants().contains(&variant.code()));
            }
        }
    }

    #[test]
    fn cross_paper_variants_are_rejected() {
        let one = Paper::new(1).unwrap();
        assert!(one.variant("21").is_none());
        assert!(one.variant("04").is_none());
        let err = one.require_variant("21").unwrap_err();
        assert!(err.contains("11, 12, 13"), "got: {}", err);
    }

    #[test]
    fn variant_codes_are_unique_across_papers() {
        let mut seen = std::collections::HashSet::new();
        for paper in Paper::all() {
            for code in paper.variants() {
                assert!(seen.insert(*code), "duplicate code {}", code);
            }
        }
        assert_eq!(Variant::lookup("02").unwrap().paper().number(), 2);
        assert_eq!(Variant::lookup("43").unwrap().paper().number(), 4);
    }

    #[test]
    fn paper_out_of_range() {
        assert!(Paper::new(0).is_none());
        assert!(Paper::new(5).is_none());
        assert!("7".parse::<Paper>().is_err());
    }

    #[test]
    fn session_letters_are_total() {
        let letters: Vec<char> = Session::ALL.iter().map(|s| s.letter()).collect();
        assert_eq!(letters, vec!['m', 's', 'w']);
        assert_eq!("june".parse::<Session>().unwrap(), Session::June);
        assert_eq!("W".parse::<Session>().unwrap(), Session::November);
        assert!("july".parse::<Session>().is_err());
    }

    #[test]
    fn year_bounds() {
        assert!(ExamYear::new(2018).is_none());
        assert!(ExamYear::new(2100).is_none());
        assert_eq!(ExamYear::new(2023).unwrap().short(), 23);
        assert_eq!(ExamYear::new(2100 - 1).unwrap().short(), 99);
    }

    #[test]
    fn variant_serializes_as_code() {
        let v = Paper::new(2).unwrap().variant("02").unwrap();
        let json = serde_json::to_string(&v).unwrap();
        assert_eq!(json, "\"02\"");
        let back: Variant = serde_json::from_str(&json).unwrap();
        assert_eq!(back, v);
        assert!(serde_json::from_str::<Variant>("\"99\"").is_err());
    }

    #[test]
    fn variant_in_struct_deserializes_from_short_lived_buffer() {
        #[derive(Deserialize)]
        struct Holder {
            variant: Variant,
        }
        let buf = format!("{{\"variant\": \"{}\"}}", "43").into_bytes();
        let holder: Holder = serde_json::from_slice(&buf).unwrap();
        drop(buf);
        assert_eq!(holder.variant.paper().number(), 4);
    }
}
