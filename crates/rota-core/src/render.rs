use std::io::{self, IsTerminal, Write};

use anyhow::anyhow;
use chrono::{Datelike, NaiveDate};
use unicode_width::UnicodeWidthStr;

use crate::calendar::short_day_name;
use crate::config::Config;
use crate::editor::Planner;
use crate::grouper::DisplayGroup;
use crate::model::{Slot, Timetable};
use crate::resolver::{PlannedDay, ResolvedOccurrence};

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let color_cfg = cfg.get("color").unwrap_or_else(|| "on".to_string());
        let color = match color_cfg.to_ascii_lowercase().as_str() {
            "on" | "yes" | "true" | "1" => true,
            "off" | "no" | "false" | "0" => false,
            other => return Err(anyhow!("invalid color setting: {other}")),
        };

        Ok(Self { color })
    }

    #[tracing::instrument(skip(self, timetable))]
    pub fn print_rotation_week(
        &mut self,
        timetable: &Timetable,
        date: NaiveDate,
        label: Option<String>,
    ) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        let label = label.unwrap_or_else(|| "fixed schedule".to_string());
        writeln!(
            out,
            "{} {}  {}",
            short_day_name(date.weekday()),
            date.format("%Y-%m-%d"),
            self.paint(&label, "33")
        )?;
        writeln!(
            out,
            "{}  {} .. {}  rotation {}",
            timetable.name(),
            timetable.start_date().format("%Y-%m-%d"),
            timetable.end_date().format("%Y-%m-%d"),
            timetable.rotation_length()
        )?;
        Ok(())
    }

    #[tracing::instrument(skip(self, groups))]
    pub fn print_day(
        &mut self,
        groups: &[DisplayGroup<ResolvedOccurrence<'_>>],
    ) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        if groups.is_empty() {
            writeln!(out, "nothing scheduled")?;
            return Ok(());
        }
        write_table(&mut out, occurrence_headers(), self.occurrence_rows(groups))?;
        Ok(())
    }

    #[tracing::instrument(skip(self, plan))]
    pub fn print_plan(&mut self, plan: &[PlannedDay<'_>], fixed: bool) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        for day in plan {
            let mut heading = format!(
                "{} {}",
                short_day_name(day.day_of_week),
                day.date.format("%Y-%m-%d")
            );
            if !fixed {
                heading.push_str(&format!("  Week {}", day.rotation_week));
            }
            writeln!(out, "{}", self.paint(&heading, "1"))?;

            let groups = crate::grouper::group(day.occurrences.clone());
            if groups.is_empty() {
                writeln!(out, "  -")?;
            } else {
                write_table(&mut out, occurrence_headers(), self.occurrence_rows(&groups))?;
            }
            writeln!(out)?;
        }

        Ok(())
    }

    #[tracing::instrument(skip(self, groups, planner))]
    pub fn print_groups(
        &mut self,
        groups: &[DisplayGroup<&Slot>],
        planner: &Planner,
        fixed: bool,
    ) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        if groups.is_empty() {
            writeln!(out, "no slots")?;
            return Ok(());
        }

        let mut headers = vec!["Time".to_string(), "Days".to_string()];
        if !fixed {
            headers.push("Weeks".to_string());
        }
        headers.push("Classes".to_string());

        let mut rows = Vec::with_capacity(groups.len());
        for group in groups {
            let days = group
                .days()
                .into_iter()
                .map(short_day_name)
                .collect::<Vec<_>>()
                .join(", ");

            let mut weeks: Vec<u32> = group.members().iter().map(|s| s.rotation_week()).collect();
            weeks.sort_unstable();
            weeks.dedup();
            let weeks = weeks
                .iter()
                .map(u32::to_string)
                .collect::<Vec<_>>()
                .join(",");

            let mut classes: Vec<&str> = Vec::new();
            for slot in group.members() {
                let subject = planner
                    .class(slot.class_id())
                    .map(|c| c.subject())
                    .unwrap_or("?");
                if !classes.contains(&subject) {
                    classes.push(subject);
                }
            }

            let mut row = vec![self.paint(&group.band_label(), "33"), days];
            if !fixed {
                row.push(weeks);
            }
            row.push(classes.join(", "));
            rows.push(row);
        }

        write_table(&mut out, headers, rows)?;
        Ok(())
    }

    #[tracing::instrument(skip(self, occurrence))]
    pub fn print_next(&mut self, occurrence: Option<&ResolvedOccurrence<'_>>) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        match occurrence {
            Some(occ) => writeln!(
                out,
                "{}  {} {}-{}  {}",
                self.paint(occ.class.subject(), "1"),
                occ.date.format("%Y-%m-%d"),
                occ.slot.start_time().format("%H:%M"),
                occ.slot.end_time().format("%H:%M"),
                occ.class.room().unwrap_or_default()
            )?,
            None => writeln!(out, "nothing scheduled")?,
        }
        Ok(())
    }

    pub fn print_message(&mut self, message: &str) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        writeln!(out, "{message}")?;
        Ok(())
    }

    fn occurrence_rows(&self, groups: &[DisplayGroup<ResolvedOccurrence<'_>>]) -> Vec<Vec<String>> {
        let mut rows = Vec::new();
        for group in groups {
            for (idx, occ) in group.members().iter().enumerate() {
                // the band is printed once per group
                let time = if idx == 0 {
                    self.paint(&group.band_label(), "33")
                } else {
                    String::new()
                };
                rows.push(vec![
                    time,
                    occ.class.subject().to_string(),
                    occ.class.room().unwrap_or_default().to_string(),
                    occ.class.teacher().unwrap_or_default().to_string(),
                ]);
            }
        }
        rows
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color || !io::stdout().is_terminal() {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn occurrence_headers() -> Vec<String> {
    vec![
        "Time".to_string(),
        "Class".to_string(),
        "Room".to_string(),
        "Teacher".to_string(),
    ]
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(header.as_str()));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for idx in 0..column_count {
        write!(writer, "{:width$} ", headers[idx], width = widths[idx])?;
    }
    writeln!(writer)?;

    for idx in 0..column_count {
        write!(writer, "{:-<width$} ", "", width = widths[idx])?;
    }
    writeln!(writer)?;

    for row in rows {
        for idx in 0..column_count {
            let cell = &row[idx];
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = widths[idx].saturating_sub(visible_width);
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}
