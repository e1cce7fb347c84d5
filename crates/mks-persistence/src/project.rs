//! Project descriptors and whole-project load and save.
//!
//! ```xml
//! <mmax_project>
//! <words file="Basedata/story_words.xml"/>
//! <level name="sentence" file="Markables/story_sentence_level.xml" scheme="Schemes/sentence_scheme.xml"/>
//! <level name="coref" file="Markables/story_coref_level.xml" scheme="Schemes/coref_scheme.xml"
//!        customization="Customizations/coref_customization.xml"/>
//! </mmax_project>
//! ```
//!
//! Paths are relative to the descriptor. Levels are stacked in file order,
//! the first level on top.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use mks_core::{LoadReport, MarkableChart, MarkableLevel};
use mks_model::AnnotationScheme;

use crate::error::{PersistenceError, Result};
use crate::io::{LevelFile, SaveOutcome, load_customization, load_scheme, load_words, open_level, read_file};
use crate::settings::Settings;
use crate::xml::{Node, read_nodes, root};

const KIND: &str = "project";

/// Extension of project descriptors.
pub const PROJECT_EXTENSION: &str = "mmax";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelEntry {
    pub name: String,
    pub file: PathBuf,
    pub scheme: Option<PathBuf>,
    pub customization: Option<PathBuf>,
}

/// Resolved contents of a project descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectDescriptor {
    pub words: PathBuf,
    pub levels: Vec<LevelEntry>,
}

pub fn parse_project(xml: &str, path: &Path) -> Result<ProjectDescriptor> {
    let nodes = read_nodes(xml, KIND, path)?;
    root(&nodes, "mmax_project", KIND, path)?;
    let base = path.parent().unwrap_or_else(|| Path::new(""));

    let mut words: Option<String> = None;
    let mut in_words = false;
    let mut levels = Vec::new();
    for node in &nodes {
        match node {
            Node::Open { name, attributes, empty } if name.eq_ignore_ascii_case("words") => {
                words = Node::attribute(attributes, "file").map(str::to_string);
                in_words = !*empty && words.is_none();
            }
            Node::Text(text) if in_words => {
                words = Some(text.trim().to_string());
                in_words = false;
            }
            Node::Open { name, attributes, .. } if name.eq_ignore_ascii_case("level") => {
                let required = |key: &str| {
                    Node::attribute(attributes, key)
                        .filter(|value| !value.trim().is_empty())
                        .ok_or_else(|| {
                            PersistenceError::invalid(KIND, path, format!("level #{} has no {key}", levels.len() + 1))
                        })
                };
                let name = required("name")?;
                let file = required("file")?;
                levels.push(LevelEntry {
                    name: name.to_string(),
                    file: base.join(file),
                    scheme: Node::attribute(attributes, "scheme").map(|p| base.join(p)),
                    customization: Node::attribute(attributes, "customization").map(|p| base.join(p)),
                });
            }
            Node::Close { name } if name.eq_ignore_ascii_case("words") => in_words = false,
            _ => {}
        }
    }

    let words = words
        .filter(|words| !words.is_empty())
        .ok_or_else(|| PersistenceError::invalid(KIND, path, "no words file named"))?;
    Ok(ProjectDescriptor {
        words: base.join(words),
        levels,
    })
}

/// A loaded project: the chart plus where each level came from.
#[derive(Debug)]
pub struct Project {
    path: PathBuf,
    descriptor: ProjectDescriptor,
    settings: Settings,
    chart: MarkableChart,
    reports: Vec<(String, LoadReport)>,
}

impl Project {
    /// Load with the settings file found next to the descriptor.
    pub fn open(path: &Path) -> Result<Self> {
        Self::load(path, Settings::for_project(path))
    }

    /// Load base data and every level.
    ///
    /// Bad markables are skipped and reported per level; a malformed file
    /// fails the whole load.
    pub fn load(path: &Path, settings: Settings) -> Result<Self> {
        let descriptor = parse_project(&read_file(path)?, path)?;
        let discourse = Arc::new(load_words(&descriptor.words)?);
        let mut chart = MarkableChart::new(Arc::clone(&discourse));
        let mut reports = Vec::with_capacity(descriptor.levels.len());

        for entry in &descriptor.levels {
            let scheme = match &entry.scheme {
                Some(scheme) => load_scheme(scheme)?,
                None => AnnotationScheme::default(),
            };
            let mut level = MarkableLevel::new(&entry.name, Arc::clone(&discourse), scheme)
                .with_purge_singletons(settings.relations.purge_singleton_sets)
                .with_none_value(&settings.relations.none_value);
            if let Some(customization) = &entry.customization {
                level = level.with_customization(load_customization(customization)?);
            }

            let (level, report) = open_level(level, &entry.file)?;
            if report.has_issues() {
                tracing::warn!(
                    level = entry.name.as_str(),
                    skipped = report.skipped(),
                    issues = report.issues.len(),
                    "Level loaded with issues"
                );
            }
            chart.seed_counters(&report);
            chart.add_level(level).map_err(|source| PersistenceError::Level {
                level: entry.name.clone(),
                source,
            })?;
            reports.push((entry.name.clone(), report));
        }

        tracing::info!(
            levels = chart.level_count(),
            tokens = discourse.len(),
            "Opened project {}",
            path.display()
        );
        Ok(Self {
            path: path.to_path_buf(),
            descriptor,
            settings,
            chart,
            reports,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn descriptor(&self) -> &ProjectDescriptor {
        &self.descriptor
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn chart(&self) -> &MarkableChart {
        &self.chart
    }

    pub fn chart_mut(&mut self) -> &mut MarkableChart {
        &mut self.chart
    }

    pub fn reports(&self) -> &[(String, LoadReport)] {
        &self.reports
    }

    pub fn report(&self, level: &str) -> Option<&LoadReport> {
        self.reports
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(level))
            .map(|(_, report)| report)
    }

    pub fn level_path(&self, level: &str) -> Option<&Path> {
        self.descriptor
            .levels
            .iter()
            .find(|entry| entry.name.eq_ignore_ascii_case(level))
            .map(|entry| entry.file.as_path())
    }

    pub fn save_level(&mut self, level: &str) -> Result<SaveOutcome> {
        let path = self
            .level_path(level)
            .map(Path::to_path_buf)
            .ok_or_else(|| PersistenceError::Level {
                level: level.to_string(),
                source: mks_core::CoreError::UnknownLevel(level.to_string()),
            })?;
        let options = self.settings.saving;
        let level = self
            .chart
            .level_mut(level)
            .map_err(|source| PersistenceError::Level {
                level: level.to_string(),
                source,
            })?;
        level.save_markables(&path, &options)
    }

    /// Save every level; stops at the first failure.
    pub fn save_all(&mut self) -> Result<Vec<(String, SaveOutcome)>> {
        let names: Vec<String> = self.descriptor.levels.iter().map(|entry| entry.name.clone()).collect();
        names
            .into_iter()
            .map(|name| {
                let outcome = self.save_level(&name)?;
                Ok((name, outcome))
            })
            .collect()
    }

    /// Save the levels whose edits have settled, per the auto-save settings.
    pub fn auto_save(&mut self) -> Result<Vec<(String, SaveOutcome)>> {
        let config = self.settings.autosave.clone();
        let due: Vec<String> = self
            .chart
            .levels_in_order()
            .filter(|level| level.dirty_tracker().should_auto_save(&config))
            .map(|level| level.name().to_string())
            .collect();
        due.into_iter()
            .map(|name| {
                let outcome = self.save_level(&name)?;
                Ok((name, outcome))
            })
            .collect()
    }
}
