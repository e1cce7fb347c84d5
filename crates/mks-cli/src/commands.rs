use anyhow::{Context, Result};
use tracing::{info, info_span};

use mks_core::{AttributeFilter, LevelFilter, MarkableLevel, MarkableQuery, QueryHit};
use mks_persistence::{Project, Settings};

use crate::cli::{AtArgs, ProjectArgs, QueryArgs, ResaveArgs};
use crate::types::{
    AtReport, CheckReport, LevelSummary, MarkableRow, Problem, ProblemKind, ProjectSummary, ResaveReport,
};

/// Load a project with the settings named on the command line, or the ones
/// next to the project.
pub fn open_project(args: &ProjectArgs) -> Result<Project> {
    open_with(args, settings_for(args)?)
}

fn settings_for(args: &ProjectArgs) -> Result<Settings> {
    match &args.settings {
        Some(path) => Settings::load_from(path).with_context(|| format!("load settings {}", path.display())),
        None => Ok(Settings::for_project(&args.project)),
    }
}

fn open_with(args: &ProjectArgs, settings: Settings) -> Result<Project> {
    Project::load(&args.project, settings).with_context(|| format!("open {}", args.project.display()))
}

fn relation_counts(level: &MarkableLevel) -> (usize, usize) {
    level.relations().fold((0, 0), |(sets, pointers), relation| {
        if relation.is_set() {
            (sets + relation.group_count(), pointers)
        } else {
            (sets, pointers + relation.group_count())
        }
    })
}

pub fn run_summary(args: &ProjectArgs) -> Result<ProjectSummary> {
    let project = open_project(args)?;
    let chart = project.chart();
    let levels = chart
        .levels_in_order()
        .map(|level| {
            let (sets, pointers) = relation_counts(level);
            LevelSummary {
                name: level.name().to_string(),
                status: level.status(),
                markables: level.len(),
                sets,
                pointers,
                skipped: project.report(level.name()).map_or(0, |report| report.skipped()),
                dirty: level.is_dirty(),
                read_only: level.is_read_only(),
            }
        })
        .collect();
    let issues = project
        .reports()
        .iter()
        .flat_map(|(level, report)| report.issues.iter().map(move |issue| (level.clone(), issue.clone())))
        .collect();
    Ok(ProjectSummary {
        project: args.project.clone(),
        tokens: chart.discourse().len(),
        levels,
        issues,
    })
}

pub fn run_at(args: &AtArgs) -> Result<AtReport> {
    let project = open_project(&args.project)?;
    let chart = project.chart();
    let discourse = chart.discourse();
    let element = discourse
        .element(&args.token)
        .with_context(|| format!("look up token {}", args.token))?;
    let filter = LevelFilter::from(args.levels);

    let slots = chart.markables_at_discourse_element(&args.token, filter)?;
    let levels = chart
        .levels_in_order()
        .zip(slots)
        .filter(|(level, _)| filter.accepts(level))
        .map(|(level, markables)| {
            let rows = markables
                .into_iter()
                .map(|markable| MarkableRow::new(markable, discourse))
                .collect();
            (level.name().to_string(), rows)
        })
        .collect();

    Ok(AtReport {
        token: element.id.clone(),
        text: element.text.clone(),
        position: element.position,
        levels,
        style: chart.top_attributes_at_discourse_element(&args.token),
    })
}

pub fn build_query(args: &QueryArgs) -> Result<MarkableQuery> {
    let mut query = MarkableQuery::new();
    for expression in &args.filters {
        let filter = AttributeFilter::parse(expression).with_context(|| format!("parse filter '{expression}'"))?;
        query = query.filter(filter);
    }
    for level in &args.levels {
        query = query.on_level(level.clone());
    }
    Ok(query)
}

pub fn run_query(args: &QueryArgs) -> Result<Vec<QueryHit>> {
    let query = build_query(args)?;
    let project = open_project(&args.project)?;
    for level in &args.levels {
        project.chart().level(level)?;
    }
    let result = project.chart().query(&query);
    info!(hits = result.len(), "query finished");
    let limit = args.limit.unwrap_or(usize::MAX);
    Ok(result.iter().take(limit).cloned().collect())
}

pub fn run_check(args: &ProjectArgs) -> Result<CheckReport> {
    let project = open_project(args)?;
    let span = info_span!("check", project = %args.project.display());
    let _guard = span.enter();

    let mut report = CheckReport::default();
    for (level, load) in project.reports() {
        report.problems.extend(load.issues.iter().map(|issue| Problem {
            level: level.clone(),
            kind: ProblemKind::Load,
            markable: issue.markable.clone(),
            message: issue.message.clone(),
        }));
    }
    report
        .problems
        .extend(project.chart().check_consistency().into_iter().map(|(level, message)| Problem {
            level,
            kind: ProblemKind::Index,
            markable: None,
            message,
        }));
    for level in project.chart().levels_in_order() {
        report
            .problems
            .extend(level.validate().into_iter().map(|(markable, issue)| Problem {
                level: level.name().to_string(),
                kind: ProblemKind::Attribute,
                markable: Some(markable),
                message: issue.message,
            }));
    }
    info!(problems = report.problems.len(), "check finished");
    Ok(report)
}

pub fn run_resave(args: &ResaveArgs) -> Result<ResaveReport> {
    let mut settings = settings_for(&args.project)?;
    if args.no_backup {
        settings.saving.create_backups = false;
    }
    let mut project = open_with(&args.project, settings)?;

    let names: Vec<String> = if args.levels.is_empty() {
        project.chart().levels_in_order().map(|l| l.name().to_string()).collect()
    } else {
        args.levels.clone()
    };
    let mut report = ResaveReport::default();
    for name in names {
        let level = project.chart_mut().level_mut(&name)?;
        if args.force && !level.is_dirty() {
            level.dirty_tracker_mut().mark_dirty();
        }
        let outcome = project
            .save_level(&name)
            .with_context(|| format!("save level {name}"))?;
        report.outcomes.push((name, outcome));
    }
    Ok(report)
}
