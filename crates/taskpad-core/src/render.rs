use std::io::{self, IsTerminal, Write};

use unicode_width::UnicodeWidthStr;

use crate::config::Config;
use crate::datetime::format_local;
use crate::task::Task;
use crate::view::{StatusFilter, TaskCounts};

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let color = cfg.get_bool("color").unwrap_or(true);
        Ok(Self { color })
    }

    /// One line of filter tabs with their badge counts; the active tab is
    /// bracketed.
    pub fn print_filter_tabs(&mut self, counts: &TaskCounts, active: StatusFilter) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        let tabs: Vec<String> = StatusFilter::TABS
            .iter()
            .map(|&tab| {
                let text = format!("{} {}", tab.label(), counts.for_filter(tab));
                if tab == active {
                    self.paint(&format!("[{text}]"), "1;34")
                } else {
                    format!(" {text} ")
                }
            })
            .collect();
        writeln!(out, "{}", tabs.join(" "))?;
        Ok(())
    }

    #[tracing::instrument(skip(self, tasks))]
    pub fn print_task_table(&mut self, tasks: &[&Task], filter: StatusFilter) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        if tasks.is_empty() {
            let (title, hint) = empty_state(filter);
            writeln!(out, "{title}")?;
            writeln!(out, "{hint}")?;
            return Ok(());
        }

        let headers = vec![
            "ID".to_string(),
            "Status".to_string(),
            "Title".to_string(),
            "Description".to_string(),
            "Created".to_string(),
        ];

        let rows = tasks
            .iter()
            .map(|task| {
                let status = if task.completed {
                    self.paint("done", "32")
                } else {
                    "pending".to_string()
                };
                vec![
                    self.paint(&task.id.to_string(), "33"),
                    status,
                    task.title.clone(),
                    task.description.clone(),
                    format_local(&task.created_at),
                ]
            })
            .collect();

        write_table(&mut out, headers, rows)?;
        Ok(())
    }

    pub fn print_counts(&mut self, counts: &TaskCounts) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        for tab in StatusFilter::TABS {
            writeln!(out, "{:<10}{}", tab.as_str(), counts.for_filter(tab))?;
        }
        Ok(())
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color || !io::stdout().is_terminal() {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn empty_state(filter: StatusFilter) -> (&'static str, &'static str) {
    match filter {
        StatusFilter::Completed => ("No completed tasks", "Complete some tasks to see them here"),
        StatusFilter::Pending => ("No pending tasks", "Great job! You have no pending tasks"),
        StatusFilter::All => ("No tasks yet", "Add your first task to get started"),
    }
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
