//! Colored output helpers for CLI
//!
//! Provides consistent, colored terminal output for the S.A.G.E CLI, including
//! rendering of research reports and run summaries.

use crate::research::report::{Report, Section, SectionContent};
use crate::research::run::{RunPhase, RunSummary};
use owo_colors::OwoColorize;

/// Output style configuration
pub struct Output {
    /// Whether to use colored output
    pub colored: bool,
}

impl Default for Output {
    fn default() -> Self {
        Self::new()
    }
}

impl Output {
    /// Create a new output helper with colors enabled
    pub fn new() -> Self {
        Self { colored: true }
    }

    /// Create a new output helper with colors disabled
    pub fn no_color() -> Self {
        Self { colored: false }
    }

    /// Print the S.A.G.E banner
    pub fn banner(&self) {
        if self.colored {
            println!(
                r#"
   {}
   {}
   {}
   {}
"#,
                " ___  _    ___  ___ ".bright_green().bold(),
                "/ __|/_\\  / __|| __|".bright_green().bold(),
                "\\__ \\/ _ \\| (_ || _| ".green().bold(),
                "|___/_/ \\_\\\\___||___|".green().bold(),
            );
            println!(
                "   {} {}\n",
                "Specialized Agent Graph Engine".bright_white().bold(),
                format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
            );
        } else {
            println!(
                r#"
 ___  _    ___  ___
/ __|/_\  / __|| __|
\__ \/ _ \| (_ || _|
|___/_/ \_\\___||___|

   Specialized Agent Graph Engine v{}
"#,
                env!("CARGO_PKG_VERSION")
            );
        }
    }

    /// Print a success message with a checkmark
    pub fn success(&self, message: &str) {
        if self.colored {
            println!("  {} {}", "✓".green().bold(), message.green());
        } else {
            println!("  [OK] {}", message);
        }
    }

    /// Print an info message
    pub fn info(&self, message: &str) {
        if self.colored {
            println!("  {} {}", "•".blue(), message);
        } else {
            println!("  [INFO] {}", message);
        }
    }

    /// Print a warning message
    pub fn warning(&self, message: &str) {
        if self.colored {
            println!("  {} {}", "⚠".yellow().bold(), message.yellow());
        } else {
            println!("  [WARN] {}", message);
        }
    }

    /// Print an error message
    pub fn error(&self, message: &str) {
        if self.colored {
            eprintln!("  {} {}", "✗".red().bold(), message.red());
        } else {
            eprintln!("  [ERROR] {}", message);
        }
    }

    /// Print a file creation message
    pub fn created(&self, file_type: &str, path: &str) {
        if self.colored {
            println!(
                "  {} {} {}",
                "✓".green().bold(),
                file_type.dimmed(),
                path.bright_white()
            );
        } else {
            println!("  [CREATED] {} {}", file_type, path);
        }
    }

    /// Print a directory creation message
    pub fn created_dir(&self, path: &str) {
        if self.colored {
            println!(
                "  {} {} {}",
                "✓".green().bold(),
                "directory".dimmed(),
                path.bright_white()
            );
        } else {
            println!("  [CREATED] directory {}", path);
        }
    }

    /// Print a header for a section
    pub fn header(&self, title: &str) {
        if self.colored {
            println!("\n  {}", title.bright_white().bold().underline());
        } else {
            println!("\n  === {} ===", title);
        }
    }

    /// Print a subheader
    pub fn subheader(&self, title: &str) {
        if self.colored {
            println!("\n  {}", title.cyan().bold());
        } else {
            println!("\n  --- {} ---", title);
        }
    }

    /// Print a key-value pair
    pub fn kv(&self, key: &str, value: &str) {
        if self.colored {
            println!("    {}: {}", key.dimmed(), value.bright_white());
        } else {
            println!("    {}: {}", key, value);
        }
    }

    /// Print a list item
    pub fn list_item(&self, item: &str) {
        if self.colored {
            println!("    {} {}", "•".blue(), item);
        } else {
            println!("    - {}", item);
        }
    }

    /// Print a hint/tip message
    pub fn hint(&self, message: &str) {
        if self.colored {
            println!("\n  {} {}", "💡".dimmed(), message.dimmed().italic());
        } else {
            println!("\n  [TIP] {}", message);
        }
    }

    /// Print a command suggestion
    pub fn command(&self, cmd: &str) {
        if self.colored {
            println!("     {}", format!("$ {}", cmd).bright_cyan());
        } else {
            println!("     $ {}", cmd);
        }
    }

    /// Print completion message with next steps
    pub fn complete(&self, message: &str) {
        if self.colored {
            println!("\n  {} {}", "🚀".green(), message.bright_green().bold());
        } else {
            println!("\n  [DONE] {}", message);
        }
    }

    /// Print newline
    pub fn newline(&self) {
        println!();
    }

    /// Print a run's phase, task counts and per-task outcome
    pub fn run_summary(&self, summary: &RunSummary) {
        self.header("Research Run");
        self.kv("Run", &summary.run_id.to_string());
        self.kv("Query", &summary.query);
        self.kv("Phase", summary.phase.as_str());
        if let Some(reason) = &summary.reason {
            self.kv("Reason", reason);
        }
        let counts = &summary.counts;
        self.kv(
            "Tasks",
            &format!(
                "{} total, {} succeeded, {} failed, {} cancelled",
                counts.total, counts.succeeded, counts.failed, counts.cancelled
            ),
        );

        for task in &summary.tasks {
            let line = match &task.error {
                Some(error) => format!("{} {} ({})", task.id, task.status, error),
                None => format!("{} {} after {} attempt(s)", task.id, task.status, task.attempts),
            };
            self.list_item(&line);
        }

        match summary.phase {
            RunPhase::Done => self.success("Report ready"),
            RunPhase::Rejected | RunPhase::Failed => self.error("Run did not produce a report"),
            RunPhase::Cancelled => self.warning("Run was cancelled"),
            _ => {}
        }
    }

    /// Print every section of a report
    pub fn report(&self, report: &Report) {
        self.header(&format!("Report: {}", report.query));
        for section in &report.sections {
            self.section(section);
        }
        self.newline();
    }

    fn section(&self, section: &Section) {
        self.subheader(section.kind().title());
        for reason in section.reasons() {
            self.warning(&format!("degraded: {}", reason));
        }

        match &section.content {
            SectionContent::Summary { bullets } => {
                for bullet in bullets {
                    self.list_item(bullet);
                }
            }
            SectionContent::FactCheck { verdicts } => {
                for v in verdicts {
                    let line = if self.colored {
                        format!("{} {}", v.verdict.symbol(), v.claim)
                    } else {
                        format!("[{}] {}", v.verdict, v.claim)
                    };
                    self.list_item(&line);
                }
            }
            SectionContent::Translations { items } => {
                for t in items {
                    self.kv(&t.language, &t.text);
                }
            }
            SectionContent::Sentiment { label } => {
                let label = label.map(|l| l.to_string());
                self.kv("Overall", label.as_deref().unwrap_or("unavailable"));
            }
            SectionContent::Citations { entries, .. } => {
                for entry in entries {
                    self.list_item(entry);
                }
            }
            SectionContent::Sources { items } => {
                for source in items {
                    self.list_item(&format!(
                        "{} ({})",
                        source.title.as_deref().unwrap_or(&source.url),
                        source.url
                    ));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_new() {
        let output = Output::new();
        assert!(output.colored);
    }

    #[test]
    fn test_output_no_color() {
        let output = Output::no_color();
        assert!(!output.colored);
    }

    #[test]
    fn test_output_default() {
        let output = Output::default();
        assert!(output.colored);
    }

    #[test]
    fn test_output_methods_no_panic() {
        // Smoke test - ensure none of the output methods panic
        let output = Output::no_color();

        output.success("test success");
        output.info("test info");
        output.warning("test warning");
        output.error("test error");
        output.created("file", "path/to/file");
        output.created_dir("some/dir");
        output.header("Test Header");
        output.subheader("Test Subheader");
        output.kv("key", "value");
        output.list_item("item");
        output.hint("hint message");
        output.command("some command");
        output.complete("complete message");
        output.newline();
    }

    #[test]
    fn test_output_methods_colored_no_panic() {
        // Smoke test for colored output
        let output = Output::new();

        output.success("test success");
        output.info("test info");
        output.warning("test warning");
        output.error("test error");
        output.created("file", "path/to/file");
        output.created_dir("some/dir");
        output.header("Test Header");
        output.subheader("Test Subheader");
        output.kv("key", "value");
        output.list_item("item");
        output.hint("hint message");
        output.command("some command");
        output.complete("complete message");
        output.newline();
        output.banner();
    }

    #[test]
    fn test_report_rendering_no_panic() {
        use crate::capabilities::Verdict;
        use crate::research::report::Section;
        use crate::research::task::ClaimVerdict;

        let report = Report {
            run_id: uuid::Uuid::nil(),
            query: "coral reefs".to_string(),
            generated_at: chrono::Utc::now(),
            sections: vec![
                Section::new(
                    SectionContent::FactCheck {
                        verdicts: vec![ClaimVerdict {
                            claim: "Reefs are bleaching".to_string(),
                            verdict: Verdict::Supported,
                        }],
                    },
                    vec![],
                ),
                Section::new(
                    SectionContent::Sentiment { label: None },
                    vec!["sentiment: capability unavailable".to_string()],
                ),
            ],
        };

        Output::no_color().report(&report);
        Output::new().report(&report);
    }
}
