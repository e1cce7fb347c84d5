use comfy_table::modifiers::{UTF8_ROUND_CORNERS, UTF8_SOLID_INNER_BORDERS};
use comfy_table::presets::{UTF8_FULL, UTF8_FULL_CONDENSED};
use comfy_table::{Attribute, Cell, CellAlignment, Color, ContentArrangement, Table};

use mks_core::{LevelStatus, QueryHit, RenderStyle};
use mks_persistence::SaveOutcome;

use crate::types::{AtReport, CheckReport, ProjectSummary, ResaveReport};

pub fn print_summary(summary: &ProjectSummary) {
    println!("Project: {}", summary.project.display());
    println!("Tokens: {}", summary.tokens);
    println!("{}", summary_table(summary));
    if !summary.issues.is_empty() {
        println!();
        println!("Load issues:");
        println!("{}", issue_table(summary));
    }
}

pub fn summary_table(summary: &ProjectSummary) -> Table {
    let mut table = Table::new();
    table.set_header(vec![
        header_cell("Level"),
        header_cell("Status"),
        header_cell("Markables"),
        header_cell("Sets"),
        header_cell("Pointers"),
        header_cell("Skipped"),
        header_cell("State"),
    ]);
    apply_summary_table_style(&mut table);
    for index in 2..=5 {
        align_column(&mut table, index, CellAlignment::Right);
    }
    let mut total_markables = 0usize;
    let mut total_skipped = 0usize;
    for level in &summary.levels {
        total_markables += level.markables;
        total_skipped += level.skipped;
        table.add_row(vec![
            Cell::new(&level.name).fg(Color::Blue).add_attribute(Attribute::Bold),
            status_cell(level.status),
            Cell::new(level.markables),
            count_cell(level.sets, Color::Green),
            count_cell(level.pointers, Color::Green),
            count_cell(level.skipped, Color::Yellow),
            state_cell(level.read_only, level.dirty),
        ]);
    }
    table.add_row(vec![
        Cell::new("TOTAL").fg(Color::Cyan).add_attribute(Attribute::Bold),
        dim_cell("-"),
        Cell::new(total_markables).add_attribute(Attribute::Bold),
        dim_cell("-"),
        dim_cell("-"),
        count_cell(total_skipped, Color::Yellow).add_attribute(Attribute::Bold),
        dim_cell("-"),
    ]);
    table
}

fn issue_table(summary: &ProjectSummary) -> Table {
    let mut table = Table::new();
    table.set_header(vec![
        header_cell("Level"),
        header_cell("Kind"),
        header_cell("Markable"),
        header_cell("Message"),
    ]);
    apply_table_style(&mut table);
    for (level, issue) in &summary.issues {
        table.add_row(vec![
            Cell::new(level),
            Cell::new(format!("{:?}", issue.kind)).fg(Color::Yellow),
            optional_cell(issue.markable.as_deref()),
            Cell::new(&issue.message),
        ]);
    }
    table
}

pub fn print_at(report: &AtReport) {
    println!("{} \"{}\" (position {})", report.token, report.text, report.position);
    println!("{}", at_table(report));
    if !report.style.is_empty() {
        println!("Style: {}", describe_style(&report.style));
    }
}

pub fn at_table(report: &AtReport) -> Table {
    let mut table = Table::new();
    table.set_header(vec![
        header_cell("Level"),
        header_cell("Markable"),
        header_cell("Span"),
        header_cell("Text"),
        header_cell("Attributes"),
    ]);
    apply_table_style(&mut table);
    for (level, rows) in &report.levels {
        if rows.is_empty() {
            table.add_row(vec![Cell::new(level), dim_cell("-"), dim_cell("-"), dim_cell("-"), dim_cell("-")]);
            continue;
        }
        for row in rows {
            let attributes = row
                .attributes
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join(" ");
            table.add_row(vec![
                Cell::new(level),
                Cell::new(&row.id).fg(Color::Blue),
                Cell::new(&row.span),
                Cell::new(&row.text),
                Cell::new(attributes),
            ]);
        }
    }
    table
}

pub fn describe_style(style: &RenderStyle) -> String {
    let mut parts = Vec::new();
    if let Some(color) = &style.foreground {
        parts.push(format!("foreground={color}"));
    }
    if let Some(color) = &style.background {
        parts.push(format!("background={color}"));
    }
    for (name, flag) in [
        ("bold", style.bold),
        ("italic", style.italic),
        ("underline", style.underline),
        ("strikethrough", style.strikethrough),
    ] {
        if let Some(flag) = flag {
            parts.push(format!("{name}={flag}"));
        }
    }
    parts.join(" ")
}

pub fn print_query(hits: &[QueryHit]) {
    println!("{}", query_table(hits));
    println!("{} hit(s)", hits.len());
}

pub fn query_table(hits: &[QueryHit]) -> Table {
    let mut table = Table::new();
    table.set_header(vec![
        header_cell("Level"),
        header_cell("Markable"),
        header_cell("Span"),
        header_cell("Text"),
    ]);
    apply_table_style(&mut table);
    for hit in hits {
        table.add_row(vec![
            Cell::new(&hit.level),
            Cell::new(&hit.id).fg(Color::Blue),
            Cell::new(&hit.span),
            Cell::new(&hit.text),
        ]);
    }
    table
}

pub fn print_check(report: &CheckReport) {
    if report.is_clean() {
        println!("No problems found.");
        return;
    }
    let mut table = Table::new();
    table.set_header(vec![
        header_cell("Level"),
        header_cell("Kind"),
        header_cell("Markable"),
        header_cell("Message"),
    ]);
    apply_table_style(&mut table);
    for problem in &report.problems {
        table.add_row(vec![
            Cell::new(&problem.level),
            Cell::new(problem.kind.as_str()).fg(Color::Red),
            optional_cell(problem.markable.as_deref()),
            Cell::new(&problem.message),
        ]);
    }
    println!("{table}");
    eprintln!("{} problem(s)", report.problems.len());
}

pub fn print_resave(report: &ResaveReport) {
    let mut table = Table::new();
    table.set_header(vec![header_cell("Level"), header_cell("Result"), header_cell("Backup")]);
    apply_table_style(&mut table);
    for (level, outcome) in &report.outcomes {
        let (result, backup) = match outcome {
            SaveOutcome::Clean => (dim_cell("unchanged"), dim_cell("-")),
            SaveOutcome::ReadOnly => (Cell::new("read-only").fg(Color::Red), dim_cell("-")),
            SaveOutcome::Written { backup } => (
                Cell::new("written").fg(Color::Green).add_attribute(Attribute::Bold),
                backup
                    .as_ref()
                    .map_or_else(|| dim_cell("-"), |path| Cell::new(path.display())),
            ),
        };
        table.add_row(vec![Cell::new(level), result, backup]);
    }
    println!("{table}");
}

pub fn apply_table_style(table: &mut Table) {
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_width(120);
}

fn apply_summary_table_style(table: &mut Table) {
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .apply_modifier(UTF8_SOLID_INNER_BORDERS)
        .set_content_arrangement(ContentArrangement::DynamicFullWidth)
        .set_width(120);
}

fn align_column(table: &mut Table, index: usize, alignment: CellAlignment) {
    if let Some(column) = table.column_mut(index) {
        column.set_cell_alignment(alignment);
    }
}

fn status_cell(status: LevelStatus) -> Cell {
    match status {
        LevelStatus::Active => Cell::new(status).fg(Color::Green),
        LevelStatus::Visible => Cell::new(status),
        LevelStatus::Inactive => dim_cell(status),
    }
}

fn state_cell(read_only: bool, dirty: bool) -> Cell {
    match (read_only, dirty) {
        (true, _) => Cell::new("read-only").fg(Color::Red).add_attribute(Attribute::Bold),
        (false, true) => Cell::new("modified").fg(Color::Yellow),
        (false, false) => dim_cell("saved"),
    }
}

fn count_cell(count: usize, color: Color) -> Cell {
    if count > 0 {
        Cell::new(count).fg(color).add_attribute(Attribute::Bold)
    } else {
        dim_cell(count)
    }
}

fn optional_cell(value: Option<&str>) -> Cell {
    value.map_or_else(|| dim_cell("-"), Cell::new)
}

fn header_cell(label: &str) -> Cell {
    Cell::new(label).fg(Color::Cyan).add_attribute(Attribute::Bold)
}

fn dim_cell<T: ToString>(value: T) -> Cell {
    Cell::new(value).fg(Color::DarkGrey)
}
