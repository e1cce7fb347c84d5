use std::path::PathBuf;

use mks_core::{LevelStatus, LoadIssue, Markable, RenderStyle};
use mks_model::DiscourseIndex;
use mks_persistence::SaveOutcome;

#[derive(Debug, Clone)]
pub struct LevelSummary {
    pub name: String,
    pub status: LevelStatus,
    pub markables: usize,
    pub sets: usize,
    pub pointers: usize,
    pub skipped: usize,
    pub dirty: bool,
    pub read_only: bool,
}

#[derive(Debug, Clone)]
pub struct ProjectSummary {
    pub project: PathBuf,
    pub tokens: usize,
    pub levels: Vec<LevelSummary>,
    /// Load issues, tagged with their level.
    pub issues: Vec<(String, LoadIssue)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkableRow {
    pub id: String,
    pub span: String,
    pub text: String,
    pub attributes: Vec<(String, String)>,
}

impl MarkableRow {
    pub fn new(markable: &Markable, discourse: &DiscourseIndex) -> Self {
        Self {
            id: markable.id().to_string(),
            span: markable.span_expression(),
            text: markable.text(discourse),
            attributes: markable
                .attributes()
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AtReport {
    pub token: String,
    pub text: String,
    pub position: usize,
    /// One entry per reported level, top first.
    pub levels: Vec<(String, Vec<MarkableRow>)>,
    pub style: RenderStyle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProblemKind {
    Load,
    Index,
    Attribute,
}

impl ProblemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Load => "load",
            Self::Index => "index",
            Self::Attribute => "attribute",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Problem {
    pub level: String,
    pub kind: ProblemKind,
    pub markable: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Default)]
pub struct CheckReport {
    pub problems: Vec<Problem>,
}

impl CheckReport {
    pub fn is_clean(&self) -> bool {
        self.problems.is_empty()
    }

    pub fn count(&self, kind: ProblemKind) -> usize {
        self.problems.iter().filter(|p| p.kind == kind).count()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ResaveReport {
    pub outcomes: Vec<(String, SaveOutcome)>,
}

impl ResaveReport {
    pub fn written(&self) -> usize {
        self.outcomes.iter().filter(|(_, outcome)| outcome.is_written()).count()
    }

    pub fn refused(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| *outcome == SaveOutcome::ReadOnly)
            .count()
    }
}
