use crate::cost::CostSummary;
use crate::executor::{ExecutorEvent, Phase};
use crate::ui::icons::{CACHED, CHECK, CROSS, FOLDER, GENERATED, MONEY, SPARKLE, WARN};
use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Terminal UI for a workflow run, rendered via `indicatif` progress bars.
///
/// Two bars are stacked vertically:
/// - Phase bar, tracking the six run phases
/// - Step bar, a spinner with the latest step and cache/generation tallies
///
/// Feed it every [`ExecutorEvent`] through [`RunUI::handle`].
pub struct RunUI {
    multi: MultiProgress,
    phase_bar: ProgressBar,
    step_bar: ProgressBar,
    verbose: bool,
    cached: AtomicUsize,
    generated: AtomicUsize,
    degraded: AtomicUsize,
}

impl RunUI {
    pub fn new(verbose: bool) -> Self {
        Self::with_target(MultiProgress::new(), verbose)
    }

    /// A UI that draws nothing, for non-interactive use.
    pub fn hidden() -> Self {
        Self::with_target(
            MultiProgress::with_draw_target(indicatif::ProgressDrawTarget::hidden()),
            false,
        )
    }

    fn with_target(multi: MultiProgress, verbose: bool) -> Self {
        let phase_style = ProgressStyle::default_bar()
            .template("{prefix:.bold.dim} [{bar:30.cyan/blue}] {pos}/{len} {msg}")
            .expect("progress bar template is a valid static string")
            .progress_chars("█▓▒░");

        let phase_bar = multi.add(ProgressBar::new(Phase::ALL.len() as u64));
        phase_bar.set_style(phase_style);
        phase_bar.set_prefix("Phases");

        let step_style = ProgressStyle::default_spinner()
            .template("{prefix:.bold.dim} {spinner} {msg}")
            .expect("progress bar template is a valid static string");

        let step_bar = multi.add(ProgressBar::new_spinner());
        step_bar.set_style(step_style);
        step_bar.set_prefix(" Steps");

        Self {
            multi,
            phase_bar,
            step_bar,
            verbose,
            cached: AtomicUsize::new(0),
            generated: AtomicUsize::new(0),
            degraded: AtomicUsize::new(0),
        }
    }

    /// Print a line via `MultiProgress`, falling back to `eprintln!` if the rich UI fails.
    fn print_line(&self, msg: impl AsRef<str>) {
        if self.multi.println(msg.as_ref()).is_err() {
            eprintln!("{}", msg.as_ref());
        }
    }

    pub fn print_header(&self, workflow: &str, run_dir: &Path) {
        self.print_line("");
        self.print_line(format!("{}", style("═".repeat(60)).cyan()));
        self.print_line(format!(
            "{} Workflow {}",
            style("▶").green().bold(),
            style(workflow).yellow().bold()
        ));
        self.print_line(format!("{}{}", FOLDER, style(run_dir.display()).dim()));
        self.print_line(format!("{}", style("═".repeat(60)).cyan()));
        self.print_line("");
    }

    pub fn handle(&self, event: &ExecutorEvent) {
        match event {
            ExecutorEvent::PhaseStarted { phase, items } => {
                self.phase_bar.set_message(format!(
                    "{} {}",
                    style(phase).yellow(),
                    style(format!("({} items)", items)).dim()
                ));
                self.step_bar
                    .enable_steady_tick(Duration::from_millis(100));
            }
            ExecutorEvent::PhaseCompleted { phase } => {
                self.phase_bar.inc(1);
                if self.verbose {
                    self.print_line(format!("  {} {} done", CHECK, phase));
                }
            }
            ExecutorEvent::StepCached { .. } => {
                self.cached.fetch_add(1, Ordering::SeqCst);
                self.refresh_steps(event);
            }
            ExecutorEvent::StepGenerated { .. } => {
                self.generated.fetch_add(1, Ordering::SeqCst);
                self.refresh_steps(event);
            }
            ExecutorEvent::StepDegraded { .. } => {
                self.degraded.fetch_add(1, Ordering::SeqCst);
                self.refresh_steps(event);
            }
            ExecutorEvent::RunCompleted { .. } => {
                self.phase_bar.finish_with_message("complete");
                self.step_bar.finish_with_message(self.tally());
            }
        }

        // Degraded steps are always shown; the rest only in verbose mode.
        if let Some(line) = event_line(event)
            && (self.verbose || matches!(event, ExecutorEvent::StepDegraded { .. }))
        {
            self.print_line(line);
        }
    }

    fn refresh_steps(&self, event: &ExecutorEvent) {
        let latest = event_line(event).unwrap_or_default();
        self.step_bar
            .set_message(format!("{} {}", self.tally(), style(latest.trim()).dim()));
    }

    fn tally(&self) -> String {
        format!(
            "{} generated, {} cached, {} degraded",
            style(self.generated.load(Ordering::SeqCst)).green(),
            style(self.cached.load(Ordering::SeqCst)).cyan(),
            style(self.degraded.load(Ordering::SeqCst)).red()
        )
    }

    /// Print the success banner with the cost summary.
    pub fn finish(&self, summary: &CostSummary, run_dir: &Path) {
        self.print_line(format!(
            "\n{} Run complete: {}\n",
            SPARKLE,
            style(run_dir.display()).green().bold()
        ));
        self.print_line(format!(
            "{}{}",
            MONEY,
            crate::cost::format_summary(summary)
        ));
    }

    /// Print a failure banner and stop the bars.
    pub fn fail(&self, reason: &str) {
        self.step_bar.abandon();
        self.phase_bar.abandon();
        self.print_line(format!("\n{} Run failed: {}\n", CROSS, style(reason).red()));
    }
}

/// One-line description of a step event.
fn event_line(event: &ExecutorEvent) -> Option<String> {
    match event {
        ExecutorEvent::StepCached { step, target } => Some(format!(
            "    {} {} {}",
            CACHED,
            step,
            style(target).dim()
        )),
        ExecutorEvent::StepGenerated {
            step,
            target,
            model,
        } => Some(format!(
            "    {} {} {} via {}",
            GENERATED,
            step,
            style(target).dim(),
            style(model).cyan()
        )),
        ExecutorEvent::StepDegraded {
            step,
            target,
            error,
        } => Some(format!(
            "    {} {} {} skipped: {}",
            WARN,
            step,
            style(target).dim(),
            style(error).yellow()
        )),
        _ => None,
    }
}
