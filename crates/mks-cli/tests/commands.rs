//! Commands against a small project on disk.

use std::fs;
use std::path::{Path, PathBuf};

use clap::Parser;
use mks_cli::cli::{AtArgs, Cli, Command, LevelFilterArg, ProjectArgs, QueryArgs, ResaveArgs};
use mks_cli::commands::{build_query, run_at, run_check, run_query, run_resave, run_summary};
use mks_cli::summary::{at_table, describe_style, query_table, summary_table};
use mks_cli::types::{Problem, ProblemKind};
use mks_persistence::SaveOutcome;
use tempfile::{TempDir, tempdir};

const WORDS: &str = r#"<words>
<word id="word_1">Anna</word>
<word id="word_2">met</word>
<word id="word_3">her</word>
<word id="word_4">brother</word>
<word id="word_5">.</word>
</words>"#;

const SCHEME: &str = r#"<annotationscheme>
<attribute name="type" type="nominal_list"><value name="ne"/><value name="pron"/><value name="np"/></attribute>
<attribute name="coref_class" type="markable_set"/>
</annotationscheme>"#;

const CUSTOMIZATION: &str = r#"<customization>
<rule attribute="type" value="pron" foreground="red" italic="true"/>
</customization>"#;

const COREF: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE markables SYSTEM "markables.dtd">
<markables xmlns="www.eml.org/NameSpaces/coref">
<markable id="markable_1" span="word_1" mmax_level="coref" type="ne" coref_class="set_1"/>
<markable id="markable_2" span="word_3" mmax_level="coref" type="pron" coref_class="set_1"/>
<markable id="markable_3" span="word_3..word_4" mmax_level="coref" type="colour"/>
</markables>"#;

const SENTENCE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE markables SYSTEM "markables.dtd">
<markables xmlns="www.eml.org/NameSpaces/sentence">
<markable id="markable_10" span="word_1..word_5" mmax_level="sentence"/>
</markables>"#;

const PROJECT: &str = r#"<mmax_project>
<words file="words.xml"/>
<level name="sentence" file="sentence.xml"/>
<level name="coref" file="coref.xml" scheme="coref_scheme.xml" customization="coref_customization.xml"/>
</mmax_project>"#;

fn fixture() -> (TempDir, PathBuf) {
    let dir = tempdir().unwrap();
    for (name, content) in [
        ("words.xml", WORDS),
        ("coref_scheme.xml", SCHEME),
        ("coref_customization.xml", CUSTOMIZATION),
        ("coref.xml", COREF),
        ("sentence.xml", SENTENCE),
        ("story.mmax", PROJECT),
    ] {
        fs::write(dir.path().join(name), content).unwrap();
    }
    let path = dir.path().join("story.mmax");
    (dir, path)
}

fn project_args(path: &Path) -> ProjectArgs {
    ProjectArgs {
        project: path.to_path_buf(),
        settings: None,
    }
}

#[test]
fn arguments_parse() {
    let cli = Cli::try_parse_from([
        "markable-studio",
        "query",
        "story.mmax",
        "--where",
        "type=pron",
        "-w",
        "coref_class",
        "-l",
        "coref",
        "--limit",
        "5",
    ])
    .unwrap();
    let Command::Query(args) = cli.command else {
        panic!("expected the query command");
    };
    assert_eq!(args.project.project, PathBuf::from("story.mmax"));
    assert_eq!(args.filters, vec!["type=pron", "coref_class"]);
    assert_eq!(args.levels, vec!["coref"]);
    assert_eq!(args.limit, Some(5));

    assert!(Cli::try_parse_from(["markable-studio", "at", "story.mmax"]).is_err());
    assert!(Cli::try_parse_from(["markable-studio", "resave", "story.mmax", "--force", "--no-backup"]).is_ok());
}

#[test]
fn summary_counts_levels() {
    let (_dir, path) = fixture();
    let summary = run_summary(&project_args(&path)).unwrap();
    assert_eq!(summary.tokens, 5);

    let names: Vec<&str> = summary.levels.iter().map(|l| l.name.as_str()).collect();
    assert_eq!(names, vec!["sentence", "coref"]);
    let coref = &summary.levels[1];
    assert_eq!(coref.markables, 3);
    assert_eq!(coref.sets, 1);
    assert_eq!(coref.pointers, 0);
    assert!(!coref.dirty);
    assert!(summary.issues.is_empty());

    let rendered = summary_table(&summary).to_string();
    assert!(rendered.contains("coref"));
    assert!(rendered.contains("TOTAL"));
}

#[test]
fn at_reports_every_level_and_style() {
    let (_dir, path) = fixture();
    let report = run_at(&AtArgs {
        project: project_args(&path),
        token: "word_3".to_string(),
        levels: LevelFilterArg::All,
    })
    .unwrap();

    assert_eq!(report.text, "her");
    assert_eq!(report.position, 2);
    assert_eq!(report.levels.len(), 2);
    assert_eq!(report.levels[0].1[0].id, "markable_10");
    let coref_ids: Vec<&str> = report.levels[1].1.iter().map(|row| row.id.as_str()).collect();
    assert_eq!(coref_ids, vec!["markable_2", "markable_3"]);
    assert_eq!(report.levels[1].1[1].text, "her brother");

    assert_eq!(describe_style(&report.style), "foreground=red italic=true");
    assert!(at_table(&report).to_string().contains("markable_3"));
}

#[test]
fn at_unknown_token_fails() {
    let (_dir, path) = fixture();
    let err = run_at(&AtArgs {
        project: project_args(&path),
        token: "word_42".to_string(),
        levels: LevelFilterArg::All,
    })
    .unwrap_err();
    assert!(format!("{err:#}").contains("word_42"));
}

#[test]
fn query_filters_and_limits() {
    let (_dir, path) = fixture();
    let mut args = QueryArgs {
        project: project_args(&path),
        filters: vec!["coref_class~set_.*".to_string()],
        levels: vec!["coref".to_string()],
        limit: None,
    };
    let hits = run_query(&args).unwrap();
    let ids: Vec<&str> = hits.iter().map(|hit| hit.id.as_str()).collect();
    assert_eq!(ids, vec!["markable_1", "markable_2"]);
    assert!(query_table(&hits).to_string().contains("Anna"));

    args.limit = Some(1);
    assert_eq!(run_query(&args).unwrap().len(), 1);

    args.levels = vec!["paragraph".to_string()];
    assert!(run_query(&args).is_err());
}

#[test]
fn bad_filter_is_reported() {
    let args = QueryArgs {
        project: project_args(Path::new("unused.mmax")),
        filters: vec!["type~(".to_string()],
        levels: Vec::new(),
        limit: None,
    };
    let err = build_query(&args).unwrap_err();
    assert!(format!("{err:#}").contains("type~("));
}

#[test]
fn check_finds_attribute_problems() {
    let (_dir, path) = fixture();
    let report = run_check(&project_args(&path)).unwrap();
    assert_eq!(report.count(ProblemKind::Index), 0);
    assert_eq!(report.count(ProblemKind::Load), 0);
    assert_eq!(report.count(ProblemKind::Attribute), 1);
    assert_eq!(report.problems[0].markable.as_deref(), Some("markable_3"));
}

#[test]
fn check_reports_unresolved_cross_level_pointers() {
    let (dir, path) = fixture();
    let scheme = SCHEME.replace(
        "</annotationscheme>",
        "<attribute name=\"antecedent\" type=\"markable_pointer\"/>\n</annotationscheme>",
    );
    fs::write(dir.path().join("coref_scheme.xml"), scheme).unwrap();
    let coref = COREF.replace(
        r#"type="pron" coref_class="set_1"/>"#,
        r#"type="pron" coref_class="set_1" antecedent="sentence:markable_99"/>"#,
    );
    fs::write(dir.path().join("coref.xml"), coref).unwrap();

    let report = run_check(&project_args(&path)).unwrap();
    let index: Vec<&Problem> = report
        .problems
        .iter()
        .filter(|problem| problem.kind == ProblemKind::Index)
        .collect();
    assert_eq!(index.len(), 1);
    assert_eq!(index[0].level, "coref");
    assert!(index[0].message.contains("markable_2 points to unresolved sentence:markable_99"));
}

#[test]
fn resave_writes_only_when_forced() {
    let (dir, path) = fixture();
    let mut args = ResaveArgs {
        project: project_args(&path),
        levels: vec!["coref".to_string()],
        force: false,
        no_backup: false,
    };
    let report = run_resave(&args).unwrap();
    assert_eq!(report.outcomes, vec![("coref".to_string(), SaveOutcome::Clean)]);

    args.force = true;
    args.no_backup = true;
    let report = run_resave(&args).unwrap();
    assert_eq!(report.written(), 1);
    assert_eq!(
        report.outcomes[0].1,
        SaveOutcome::Written { backup: None }
    );
    let saved = fs::read_to_string(dir.path().join("coref.xml")).unwrap();
    assert!(saved.contains(r#"<markable id="markable_3" span="word_3..word_4" mmax_level="coref""#));
}
