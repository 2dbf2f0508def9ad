use super::*;
use crate::credits::{Completion, CreditsReport, Failure};
use crate::forge::RateLimit;

#[derive(Serialize)]
struct JsonReport<'a> {
    organization: &'a str,
    complete: bool,
    completion: &'a Completion,
    repositories: &'a CreditsReport,
    failures: &'a [Failure],
    skipped: &'a [String],
    rate_limit: Option<RateLimit>,
}

pub struct JsonGenerator;

impl OutputGenerator for JsonGenerator {
    fn generate(&self, run: &CreditsRun) -> Result<String> {
        let report = JsonReport {
            organization: &run.organization,
            complete: run.is_complete(),
            completion: &run.completion,
            repositories: &run.report,
            failures: &run.failures,
            skipped: &run.skipped,
            rate_limit: run.rate_limit,
        };
        Ok(serde_json::to_string_pretty(&report)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::fixtures::sample_run;
    use serde_json::{json, Value};

    #[test]
    fn renders_repositories_and_incomplete_signal() {
        let rendered = JsonGenerator.generate(&sample_run()).unwrap();
        let value: Value = serde_json::from_str(&rendered).unwrap();

        assert_eq!(value["complete"], json!(false));
        assert_eq!(value["completion"], json!({"status": "cancelled"}));
        assert_eq!(
            value["repositories"]["widgets"]["ana"],
            json!({"login": "ana", "email": null, "display_name": "Ana Lima", "contributions": 8})
        );
        let ghost = &value["repositories"]["widgets"]["ghost@example.com"];
        assert_eq!(ghost["login"], Value::Null);
        assert_eq!(ghost["email"], json!("ghost@example.com"));
        assert_eq!(ghost["contributions"], json!(4));
        assert_eq!(value["repositories"]["empty"], json!({}));
        assert_eq!(value["skipped"], json!(["late"]));
        assert_eq!(value["failures"][0]["kind"], json!("transport"));
    }
}
