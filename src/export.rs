use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};
use clap::ValueEnum;
use printpdf::{BuiltinFont, Mm, PdfDocument};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_xlsxwriter::{Format, Workbook};
use serde_json::{Map, Value};

use crate::models::{CategoryTotal, FinanceFlowRow, HealthRow};
use crate::ranking::ChartRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ReportTab {
    Attendance,
    Membership,
    Finance,
    Events,
    Health,
    FinanceFlow,
    Categories,
}

impl ReportTab {
    pub fn file_stem(&self) -> &'static str {
        match self {
            ReportTab::Attendance => "attendance-by-branch",
            ReportTab::Membership => "membership-by-branch",
            ReportTab::Finance => "finance-by-branch",
            ReportTab::Events => "events-by-branch",
            ReportTab::Health => "branch-health-score",
            ReportTab::FinanceFlow => "finance-flow",
            ReportTab::Categories => "finance-categories",
        }
    }

    /// Also used as the worksheet name, so it stays under 31 characters.
    pub fn title(&self) -> &'static str {
        match self {
            ReportTab::Attendance => "Attendance",
            ReportTab::Membership => "Membership",
            ReportTab::Finance => "Finance",
            ReportTab::Events => "Events",
            ReportTab::Health => "Branch Health Score",
            ReportTab::FinanceFlow => "Finance Flow",
            ReportTab::Categories => "Finance Categories",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExportFormat {
    Csv,
    Xlsx,
    Pdf,
    Json,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Xlsx => "xlsx",
            ExportFormat::Pdf => "pdf",
            ExportFormat::Json => "json",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Text(String),
    Number(f64),
    Amount(Decimal),
}

impl Cell {
    fn render(&self) -> String {
        match self {
            Cell::Text(value) => value.clone(),
            Cell::Number(value) if value.fract() == 0.0 => format!("{value:.0}"),
            Cell::Number(value) => value.to_string(),
            Cell::Amount(value) => value.to_string(),
        }
    }

    fn to_json(&self) -> Value {
        match self {
            Cell::Text(value) => Value::String(value.clone()),
            Cell::Number(value) if value.fract() == 0.0 => Value::from(*value as i64),
            Cell::Number(value) => Value::from(*value),
            Cell::Amount(value) => Value::String(value.to_string()),
        }
    }
}

/// The rows currently shown for one report tab.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub tab: ReportTab,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl Table {
    pub fn new(tab: ReportTab, headers: &[&str]) -> Self {
        Table {
            tab,
            headers: headers.iter().map(|h| h.to_string()).collect(),
            rows: Vec::new(),
        }
    }

    /// Month rows with one column per charted branch. Finance tabs keep exact
    /// amounts, the others hold counts.
    pub fn trend(
        tab: ReportTab,
        chart: &[ChartRow],
        top: &[String],
        labels: &HashMap<String, String>,
    ) -> Self {
        let mut headers = vec!["month".to_string()];
        headers.extend(column_labels(top, labels));
        let rows = chart
            .iter()
            .map(|row| {
                let mut cells = vec![Cell::Text(row.month.clone())];
                cells.extend(row.values.iter().map(|value| match tab {
                    ReportTab::Finance => Cell::Amount(*value),
                    _ => Cell::Number(value.to_f64().unwrap_or_default()),
                }));
                cells
            })
            .collect();
        Table {
            tab,
            headers,
            rows,
        }
    }

    pub fn health(rows: &[HealthRow]) -> Self {
        let mut table = Table::new(
            ReportTab::Health,
            &[
                "branch",
                "attendance_30d",
                "new_members_30d",
                "events_30d",
                "finance_30d",
                "score",
            ],
        );
        for row in rows {
            table.rows.push(vec![
                Cell::Text(row.branch.clone()),
                Cell::Number(row.attendance_30d as f64),
                Cell::Number(row.new_members_30d as f64),
                Cell::Number(row.events_30d as f64),
                Cell::Amount(row.finance_30d),
                Cell::Number(row.score as f64),
            ]);
        }
        table
    }

    pub fn finance_flow(rows: &[FinanceFlowRow]) -> Self {
        let mut table = Table::new(ReportTab::FinanceFlow, &["month", "income", "expense", "net"]);
        for row in rows {
            table.rows.push(vec![
                Cell::Text(row.month.clone()),
                Cell::Amount(row.income),
                Cell::Amount(row.expense),
                Cell::Amount(row.net),
            ]);
        }
        table
    }

    pub fn categories(rows: &[CategoryTotal]) -> Self {
        let mut table = Table::new(ReportTab::Categories, &["category", "total"]);
        for row in rows {
            table
                .rows
                .push(vec![Cell::Text(row.category.clone()), Cell::Amount(row.total)]);
        }
        table
    }
}

/// Branch display names, suffixed with the id where two branches share a name
/// or a name would shadow the month column.
fn column_labels(top: &[String], labels: &HashMap<String, String>) -> Vec<String> {
    let names: Vec<&str> = top
        .iter()
        .map(|id| labels.get(id).map(String::as_str).unwrap_or(id))
        .collect();
    names
        .iter()
        .zip(top)
        .map(|(name, id)| {
            let shared = names.iter().filter(|other| *other == name).count() > 1;
            if shared || *name == "month" {
                format!("{name} ({id})")
            } else {
                name.to_string()
            }
        })
        .collect()
}

pub fn to_csv(table: &Table) -> anyhow::Result<Vec<u8>> {
    let mut wtr = csv::Writer::from_writer(Vec::new());
    wtr.write_record(&table.headers)?;
    for row in &table.rows {
        wtr.write_record(row.iter().map(Cell::render))?;
    }
    wtr.into_inner()
        .map_err(|err| anyhow!("failed to flush CSV buffer: {}", err.error()))
}

pub fn to_xlsx(table: &Table) -> anyhow::Result<Vec<u8>> {
    let mut workbook = Workbook::new();
    let bold = Format::new().set_bold();
    let sheet = workbook.add_worksheet();
    sheet.set_name(table.tab.title())?;

    for (col, header) in table.headers.iter().enumerate() {
        sheet.write_string_with_format(0, col as u16, header, &bold)?;
    }
    for (idx, row) in table.rows.iter().enumerate() {
        let line = idx as u32 + 1;
        for (col, cell) in row.iter().enumerate() {
            let col = col as u16;
            match cell {
                Cell::Text(value) => {
                    sheet.write_string(line, col, value)?;
                }
                Cell::Number(value) => {
                    sheet.write_number(line, col, *value)?;
                }
                Cell::Amount(value) => {
                    sheet.write_number(line, col, value.to_f64().unwrap_or_default())?;
                }
            }
        }
    }

    Ok(workbook.save_to_buffer()?)
}

const A4_LANDSCAPE_MM: (f32, f32) = (297.0, 210.0);
const PAGE_MARGIN_MM: f32 = 15.0;
const MAX_LINE_MM: f32 = 8.0;
const POINTS_PER_MM: f32 = 72.0 / 25.4;

/// One landscape A4 page with the table centred vertically. Long tables shrink
/// the line height so every row stays on the page. No rows gives a blank page.
pub fn to_pdf(table: &Table) -> anyhow::Result<Vec<u8>> {
    let (width, height) = A4_LANDSCAPE_MM;
    let (doc, page, layer) = PdfDocument::new(table.tab.title(), Mm(width), Mm(height), "table");

    if !table.rows.is_empty() {
        let regular = doc
            .add_builtin_font(BuiltinFont::Helvetica)
            .map_err(|err| anyhow!("failed to load PDF font: {err:?}"))?;
        let bold = doc
            .add_builtin_font(BuiltinFont::HelveticaBold)
            .map_err(|err| anyhow!("failed to load PDF font: {err:?}"))?;
        let canvas = doc.get_page(page).get_layer(layer);

        let mut lines = vec![table.headers.clone()];
        lines.extend(
            table
                .rows
                .iter()
                .map(|row| row.iter().map(Cell::render).collect::<Vec<_>>()),
        );

        let line_height = ((height - 2.0 * PAGE_MARGIN_MM) / lines.len() as f32).min(MAX_LINE_MM);
        let font_size = line_height * POINTS_PER_MM * 0.7;
        let column_width = (width - 2.0 * PAGE_MARGIN_MM) / table.headers.len().max(1) as f32;
        // Helvetica glyphs average about half an em.
        let max_chars = ((column_width * POINTS_PER_MM / (font_size * 0.5)) as usize).max(1);
        let top = (height + line_height * lines.len() as f32) / 2.0;

        for (idx, line) in lines.iter().enumerate() {
            let font = if idx == 0 { &bold } else { &regular };
            let y = top - line_height * (idx + 1) as f32;
            for (col, text) in line.iter().enumerate() {
                let x = PAGE_MARGIN_MM + column_width * col as f32;
                let fitted: String = text.chars().take(max_chars).collect();
                canvas.use_text(fitted, font_size, Mm(x), Mm(y), font);
            }
        }
    }

    doc.save_to_bytes()
        .map_err(|err| anyhow!("failed to render PDF: {err:?}"))
}

pub fn to_json(table: &Table) -> anyhow::Result<Vec<u8>> {
    let objects: Vec<Value> = table
        .rows
        .iter()
        .map(|row| {
            let object: Map<String, Value> = table
                .headers
                .iter()
                .cloned()
                .zip(row.iter().map(Cell::to_json))
                .collect();
            Value::Object(object)
        })
        .collect();
    Ok(serde_json::to_vec_pretty(&objects)?)
}

/// Writes `table` under its fixed file name inside `out_dir`.
pub fn export(table: &Table, format: ExportFormat, out_dir: &Path) -> anyhow::Result<PathBuf> {
    let bytes = match format {
        ExportFormat::Csv => to_csv(table)?,
        ExportFormat::Xlsx => to_xlsx(table)?,
        ExportFormat::Pdf => to_pdf(table)?,
        ExportFormat::Json => to_json(table)?,
    };
    let path = out_dir.join(format!("{}.{}", table.tab.file_stem(), format.extension()));
    std::fs::write(&path, bytes)
        .with_context(|| format!("failed to write {}", path.display()))?;
    tracing::info!(
        path = %path.display(),
        rows = table.rows.len(),
        format = format.extension(),
        "export written"
    );
    Ok(path)
}
