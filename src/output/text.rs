use super::*;
use crate::credits::{Completion, RepositoryTally};
use colored::*;
use std::fmt::Write;

pub struct TextGenerator {
    color: bool,
}

impl TextGenerator {
    pub fn new(color: bool) -> Self {
        Self { color }
    }

    fn paint(&self, text: &str, style: fn(&str) -> ColoredString) -> String {
        if self.color {
            style(text).to_string()
        } else {
            text.to_string()
        }
    }

    fn write_tally(&self, out: &mut String, name: &str, tally: &RepositoryTally) -> Result<()> {
        writeln!(
            out,
            "{} ({} contributors, {} commits)",
            self.paint(name, |s| s.bright_white().bold()),
            tally.len(),
            tally.total_contributions()
        )?;

        for (attribution, entry) in tally.ranked() {
            let marker = if attribution.identity().is_none() {
                self.paint(" [unattributed]", |s| s.yellow())
            } else {
                String::new()
            };
            writeln!(
                out,
                "  {:>6}  {} <{}>{}",
                entry.total_contributions, entry.display_name, attribution, marker
            )?;
        }
        Ok(())
    }

    fn completion_line(&self, run: &CreditsRun) -> String {
        match &run.completion {
            Completion::Complete if run.failures.is_empty() => {
                self.paint("Credits complete", |s| s.bright_green().bold())
            }
            Completion::Complete => self.paint(
                &format!("Credits INCOMPLETE: {} failures", run.failures.len()),
                |s| s.bright_red().bold(),
            ),
            Completion::Cancelled => self.paint("Credits INCOMPLETE: run cancelled", |s| {
                s.bright_red().bold()
            }),
            Completion::DeadlineExceeded => self.paint("Credits INCOMPLETE: deadline exceeded", |s| {
                s.bright_red().bold()
            }),
            Completion::RateLimited { reset_at, .. } => {
                let reset = reset_at
                    .map(|at| format!(" (resets at {})", at.to_rfc3339()))
                    .unwrap_or_default();
                self.paint(
                    &format!("Credits INCOMPLETE: forge rate limit exhausted{}", reset),
                    |s| s.bright_red().bold(),
                )
            }
        }
    }
}

impl OutputGenerator for TextGenerator {
    fn generate(&self, run: &CreditsRun) -> Result<String> {
        let mut out = String::new();
        writeln!(
            out,
            "{} {}\n",
            self.paint("Credits for", |s| s.bright_cyan().bold()),
            run.organization
        )?;

        for (name, tally) in run.report.iter() {
            self.write_tally(&mut out, name, tally)?;
            writeln!(out)?;
        }

        if !run.skipped.is_empty() {
            writeln!(out, "Not started: {}", run.skipped.join(", "))?;
        }
        for failure in &run.failures {
            writeln!(
                out,
                "Failed: {} {} ({:?}): {}",
                failure.repository.as_deref().unwrap_or(&run.organization),
                failure.subject,
                failure.kind,
                failure.message
            )?;
        }
        if let Some(rate_limit) = run.rate_limit {
            writeln!(out, "Rate limit: {}/{}", rate_limit.remaining, rate_limit.limit)?;
        }

        writeln!(out, "{}", self.completion_line(run))?;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::fixtures::sample_run;

    #[test]
    fn plain_text_lists_ranked_contributors() {
        let rendered = TextGenerator::new(false).generate(&sample_run()).unwrap();

        let ana = rendered.find("Ana Lima <ana>").unwrap();
        let ghost = rendered.find("Ghost <ghost@example.com> [unattributed]").unwrap();
        assert!(ana < ghost);
        assert!(rendered.contains("widgets (2 contributors, 12 commits)"));
        assert!(rendered.contains("empty (0 contributors, 0 commits)"));
        assert!(rendered.contains("Not started: late"));
        assert!(rendered.contains("Credits INCOMPLETE: run cancelled"));
    }

    #[test]
    fn complete_run_says_so() {
        let mut run = sample_run();
        run.failures.clear();
        run.skipped.clear();
        run.completion = Completion::Complete;

        let rendered = TextGenerator::new(false).generate(&run).unwrap();
        assert!(rendered.ends_with("Credits complete\n"));
    }
}
