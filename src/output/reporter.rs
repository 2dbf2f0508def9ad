use super::json::JsonGenerator;
use super::text::TextGenerator;
use super::*;
use std::fs;
use std::path::PathBuf;
use tracing::info;

/// Renders a finished run and writes it to a file, or stdout when no path is set.
pub struct Reporter {
    format: OutputFormat,
    output_path: Option<PathBuf>,
    color: bool,
}

impl Reporter {
    pub fn new(format: &str, output_path: Option<&str>, color: bool) -> Self {
        let format = OutputFormat::from(format);
        let output_path = output_path.map(|path| PathBuf::from(add_file_extension(path, &format)));
        // never write escape codes into files
        let color = color && output_path.is_none();

        Self {
            format,
            output_path,
            color,
        }
    }

    pub fn render(&self, run: &CreditsRun) -> Result<String> {
        match self.format {
            OutputFormat::Text => TextGenerator::new(self.color).generate(run),
            OutputFormat::Json => JsonGenerator.generate(run),
        }
    }

    pub fn generate_report(&self, run: &CreditsRun) -> Result<()> {
        let content = self.render(run)?;

        match &self.output_path {
            Some(path) => {
                fs::write(path, content)?;
                info!("Report saved to {}", path.display());
            }
            None => print!("{}", content),
        }
        Ok(())
    }
}
