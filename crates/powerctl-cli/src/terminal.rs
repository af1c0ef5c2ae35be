use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use colored::Colorize;
use indicatif::ProgressBar;

use powerctl_orchestrator::{Closure, FinalizedReport, NotificationSurface, SurfaceHandle};

use crate::output::{self, OutputFormat};
use crate::ui;

/// Handle of the single presentation a terminal session ever shows.
const TERMINAL_HANDLE: &str = "terminal";

/// Notification surface for an interactive terminal session.
///
/// Human-facing text goes to stderr; the final report goes to stdout,
/// serialized when a machine-readable format is selected.
pub struct TerminalSurface {
    format: OutputFormat,
    spinner: Mutex<Option<ProgressBar>>,
}

impl TerminalSurface {
    pub fn new(format: OutputFormat) -> Self {
        Self {
            format,
            spinner: Mutex::new(None),
        }
    }

    fn stop_spinner(&self) {
        if let Ok(mut guard) = self.spinner.lock()
            && let Some(pb) = guard.take()
        {
            pb.finish_and_clear();
        }
    }
}

/// Collapse a multi-line progress text into one spinner line.
pub fn spinner_line(text: &str) -> String {
    text.lines().collect::<Vec<_>>().join(" | ")
}

#[async_trait]
impl NotificationSurface for TerminalSurface {
    async fn present_summary(&self, title: &str, body: &str) -> Result<SurfaceHandle> {
        ui::banner(&[title], true);
        eprintln!("{}\n", body);
        Ok(SurfaceHandle::new(TERMINAL_HANDLE))
    }

    async fn update_progress(&self, _handle: &SurfaceHandle, text: &str) -> Result<()> {
        let line = spinner_line(text);
        if let Ok(mut guard) = self.spinner.lock() {
            match guard.as_ref() {
                Some(pb) => pb.set_message(line),
                None => *guard = Some(ui::spinner(&line)),
            }
        }
        Ok(())
    }

    async fn present_final_report(
        &self,
        _handle: &SurfaceHandle,
        report: &FinalizedReport,
    ) -> Result<()> {
        self.stop_spinner();
        if let Some(text) = output::to_machine(report, self.format)? {
            println!("{}", text);
            return Ok(());
        }

        let rendered = report.render();
        let mut lines = rendered.lines();
        if let Some(title) = lines.next() {
            if report.is_clean() {
                println!("{}", title.bold().green());
            } else {
                println!("{}", title.bold().yellow());
            }
        }
        for line in lines {
            println!("{}", line);
        }
        Ok(())
    }

    async fn present_closed(&self, _handle: &SurfaceHandle, closure: Closure) -> Result<()> {
        self.stop_spinner();
        ui::warn(&format!("{}: {}", closure.title(), closure.message()));
        Ok(())
    }
}
