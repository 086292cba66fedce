use clap::ValueEnum;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use railway_vision::HazardLevel;
use std::io::{IsTerminal, Write};
use std::time::{Duration, Instant};

const BELL: char = '\u{7}';

/// How stage progress is drawn on stderr.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum UiMode {
    /// Spinners on an interactive terminal, plain lines otherwise.
    #[default]
    Auto,
    Plain,
}

/// Operator-facing terminal output: stage progress and hazard alerts.
#[derive(Clone, Debug)]
pub struct Ui {
    spinners: bool,
    bell: bool,
}

impl Ui {
    /// Inspect the attached terminals. Spinners need stderr on a TTY and are
    /// skipped when stdout is piped so redirected output stays clean.
    pub fn detect(mode: UiMode) -> Self {
        let stderr_tty = std::io::stderr().is_terminal();
        let stdout_tty = std::io::stdout().is_terminal();
        Self::new(mode, stderr_tty, stdout_tty)
    }

    fn new(mode: UiMode, stderr_tty: bool, stdout_tty: bool) -> Self {
        Self {
            spinners: mode == UiMode::Auto && stderr_tty && stdout_tty,
            bell: stderr_tty,
        }
    }

    pub fn stage(&self, name: &str) -> Stage {
        let spinner = if self.spinners {
            let spinner = ProgressBar::with_draw_target(None, ProgressDrawTarget::stderr());
            spinner.set_style(
                ProgressStyle::with_template("{spinner} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            spinner.enable_steady_tick(Duration::from_millis(120));
            spinner.set_message(format!("{name}…"));
            Some(spinner)
        } else {
            eprintln!("==> {}", name);
            None
        };
        Stage {
            name: name.to_string(),
            started: Instant::now(),
            spinner,
        }
    }

    /// Ring the terminal bell and print a banner when `level` calls for an alert.
    ///
    /// Returns whether an alert was raised.
    pub fn hazard_alert(&self, level: HazardLevel, image_name: &str) -> bool {
        let Some(banner) = hazard_banner(level, image_name) else {
            return false;
        };
        let mut stderr = std::io::stderr();
        if self.bell {
            let _ = write!(stderr, "{BELL}");
        }
        let _ = writeln!(stderr, "{banner}");
        true
    }
}

/// Banner text for a high-hazard result, `None` for anything lower.
pub fn hazard_banner(level: HazardLevel, image_name: &str) -> Option<String> {
    if !level.is_alert() {
        return None;
    }
    let line = "!".repeat(60);
    Some(format!(
        "{line}\n!! HIGH HAZARD DETECTED in {image_name}\n!! Stop traffic and inspect the track.\n{line}"
    ))
}

/// Running stage; reports its elapsed time when dropped.
pub struct Stage {
    name: String,
    started: Instant,
    spinner: Option<ProgressBar>,
}

impl Drop for Stage {
    fn drop(&mut self) {
        let done = format!("✔ {} ({})", self.name, elapsed_label(self.started.elapsed()));
        match &self.spinner {
            Some(spinner) => spinner.finish_with_message(done),
            None => eprintln!("{done}"),
        }
    }
}

fn elapsed_label(elapsed: Duration) -> String {
    if elapsed < Duration::from_secs(1) {
        format!("{}ms", elapsed.as_millis())
    } else {
        format!("{:.2}s", elapsed.as_secs_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn banner_only_for_high() {
        assert!(hazard_banner(HazardLevel::Medium, "a.jpg").is_none());
        let banner = hazard_banner(HazardLevel::High, "a.jpg").unwrap();
        assert!(banner.contains("HIGH HAZARD DETECTED in a.jpg"));
    }

    #[test]
    fn spinners_need_both_terminals_and_auto_mode() {
        assert!(Ui::new(UiMode::Auto, true, true).spinners);
        assert!(!Ui::new(UiMode::Auto, true, false).spinners);
        assert!(!Ui::new(UiMode::Plain, true, true).spinners);
        assert!(Ui::new(UiMode::Plain, true, false).bell);
        assert!(!Ui::new(UiMode::Auto, false, true).bell);
    }

    #[test]
    fn elapsed_switches_units_at_one_second() {
        assert_eq!(elapsed_label(Duration::from_millis(250)), "250ms");
        assert_eq!(elapsed_label(Duration::from_millis(1500)), "1.50s");
    }
}
