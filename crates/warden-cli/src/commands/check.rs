//! `warden check` command implementation.
//!
//! Loads the configuration, schema and policy files and reports every
//! problem found, not just the first one:
//! - configuration parse and semantic errors
//! - schema consistency (relations, keys, duplicate names)
//! - policy rules naming unknown models or fields
//! - warnings for settings that have no effect on the loaded schema

use anyhow::{Result, bail};
use std::path::{Path, PathBuf};
use warden_core::{Catalog, ConfigError, EngineConfig, SchemaCatalog};
use warden_policy::PolicyDocument;

/// Severity level for check results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Info => write!(f, "INFO"),
            Severity::Warning => write!(f, "WARN"),
            Severity::Error => write!(f, "ERROR"),
        }
    }
}

/// A single check finding.
#[derive(Debug, Clone)]
pub struct CheckFinding {
    pub severity: Severity,
    /// Which check produced the finding ("config", "schema", "policy", ...).
    pub category: String,
    pub message: String,
    pub file: Option<PathBuf>,
}

impl CheckFinding {
    fn error(category: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Severity::Error, category, message)
    }

    fn warning(category: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, category, message)
    }

    fn info(category: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Severity::Info, category, message)
    }

    fn new(severity: Severity, category: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity,
            category: category.into(),
            message: message.into(),
            file: None,
        }
    }

    fn with_file(mut self, file: impl Into<PathBuf>) -> Self {
        self.file = Some(file.into());
        self
    }
}

/// Results from running all checks.
#[derive(Debug, Default)]
pub struct CheckResults {
    pub findings: Vec<CheckFinding>,
}

impl CheckResults {
    fn push(&mut self, finding: CheckFinding) {
        self.findings.push(finding);
    }

    pub fn has_errors(&self) -> bool {
        self.findings.iter().any(|f| f.severity == Severity::Error)
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.findings.iter().filter(|f| f.severity == severity).count()
    }

    /// Print human-readable summary.
    pub fn print_summary(&self) {
        let mut findings: Vec<&CheckFinding> = self.findings.iter().collect();
        findings.sort_by(|a, b| b.severity.cmp(&a.severity).then(a.category.cmp(&b.category)));

        for finding in &findings {
            let location = finding
                .file
                .as_ref()
                .map(|f| format!(" [{}]", f.display()))
                .unwrap_or_default();
            println!("  {:<5} [{}]{}: {}", finding.severity.to_string(), finding.category, location, finding.message);
        }

        println!();
        println!("{}", "=".repeat(60));
        let errors = self.count(Severity::Error);
        let warnings = self.count(Severity::Warning);
        if errors == 0 && warnings == 0 {
            println!("All checks passed.");
        } else {
            println!("Summary: {} error(s), {} warning(s)", errors, warnings);
        }
    }
}

fn config_findings(err: ConfigError, category: &str, file: &Path) -> Vec<CheckFinding> {
    match err {
        ConfigError::Schema { problems } => problems
            .into_iter()
            .map(|p| CheckFinding::error(category, p).with_file(file))
            .collect(),
        other => vec![CheckFinding::error(category, other.to_string()).with_file(file)],
    }
}

/// Run all checks quietly, returning the findings.
pub async fn run_quiet(config_path: &Path) -> Result<CheckResults> {
    let mut results = CheckResults::default();

    let config = match EngineConfig::load_with_context(config_path) {
        Ok(config) => config,
        Err(e) => {
            results.findings.extend(config_findings(e, "config", config_path));
            return Ok(results);
        }
    };

    let Some(schema_file) = config.schema_file.clone() else {
        results.push(CheckFinding::error("config", "schema_file is not set").with_file(config_path));
        return Ok(results);
    };
    let catalog = match Catalog::from_file(&schema_file) {
        Ok(catalog) => catalog,
        Err(e) => {
            results.findings.extend(config_findings(e, "schema", &schema_file));
            return Ok(results);
        }
    };

    match &config.policy_file {
        Some(policy_file) => match PolicyDocument::from_file(policy_file) {
            Ok(doc) => {
                for problem in doc.validate(&catalog) {
                    results.push(CheckFinding::error("policy", problem).with_file(policy_file));
                }
                for model in catalog.model_names() {
                    if !doc.models.contains_key(model) {
                        results.push(
                            CheckFinding::warning("policy", format!("model '{}' has no policy and is unrestricted", model))
                                .with_file(policy_file),
                        );
                    }
                }
            }
            Err(e) => results.findings.extend(config_findings(e, "policy", policy_file)),
        },
        None => results.push(
            CheckFinding::warning("policy", "policy_file is not set; every model is unrestricted").with_file(config_path),
        ),
    }

    check_middleware_fields(&config, &catalog, &mut results);

    if config.audit.enabled && config.audit.log_payloads {
        results.push(CheckFinding::warning(
            "audit",
            "audit.log_payloads is on; mutation payloads may contain sensitive data",
        ));
    }

    Ok(results)
}

fn check_middleware_fields(config: &EngineConfig, catalog: &Catalog, results: &mut CheckResults) {
    let declares = |field: &str| {
        catalog
            .model_names()
            .into_iter()
            .filter_map(|name| catalog.model(name))
            .any(|m| m.field(field).is_some_and(|f| f.is_scalar()))
    };

    if config.soft_delete.enabled && !declares(&config.soft_delete.field) {
        results.push(CheckFinding::warning(
            "soft_delete",
            format!(
                "soft_delete is enabled but no model declares '{}'",
                config.soft_delete.field
            ),
        ));
    }

    let ts = &config.timestamps;
    if ts.enabled && ![&ts.created_at, &ts.updated_at, &ts.created_by, &ts.updated_by].iter().any(|f| declares(f.as_str())) {
        results.push(CheckFinding::info("timestamps", "no model declares a timestamp field"));
    }
}

/// Run all checks and print the summary. Fails when any error was found.
pub async fn run(config_path: &Path) -> Result<()> {
    println!("Checking {}", config_path.display());
    let results = run_quiet(config_path).await?;
    results.print_summary();
    if results.has_errors() {
        bail!("configuration has {} error(s)", results.count(Severity::Error));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;

    const SCHEMA: &str = r#"
models:
  - name: Post
    fields:
      - { name: id, id: true }
      - { name: title }
      - { name: createdAt, type: DateTime }
"#;

    fn write_project(dir: &Path, config: &str, schema: &str, policies: Option<&str>) -> PathBuf {
        fs::write(dir.join("schema.yaml"), schema).unwrap();
        if let Some(policies) = policies {
            fs::write(dir.join("policies.yaml"), policies).unwrap();
        }
        let path = dir.join("warden.yaml");
        fs::write(&path, config).unwrap();
        path
    }

    #[tokio::test]
    async fn test_clean_project_passes() {
        let dir = tempfile::tempdir().unwrap();
        let config = write_project(
            dir.path(),
            "schema_file: schema.yaml\npolicy_file: policies.yaml\n",
            SCHEMA,
            Some("models:\n  Post:\n    roles:\n      editor: { create: true, access: true }\n"),
        );

        let results = run_quiet(&config).await.unwrap();
        assert!(!results.has_errors(), "{:?}", results.findings);
        assert_eq!(results.count(Severity::Warning), 0);
    }

    #[tokio::test]
    async fn test_reports_policy_problems() {
        let dir = tempfile::tempdir().unwrap();
        let config = write_project(
            dir.path(),
            "schema_file: schema.yaml\npolicy_file: policies.yaml\n",
            SCHEMA,
            Some("models:\n  Post:\n    omit: [secret]\n  Ghost: {}\n"),
        );

        let results = run_quiet(&config).await.unwrap();
        assert_eq!(results.count(Severity::Error), 2);
        assert!(results.findings.iter().all(|f| f.category == "policy"));
    }

    #[tokio::test]
    async fn test_reports_schema_problems() {
        let dir = tempfile::tempdir().unwrap();
        let schema = "models:\n  - name: Post\n    fields:\n      - { name: id, id: true }\n      - { name: author, relation: { model: User } }\n";
        let config = write_project(dir.path(), "schema_file: schema.yaml\n", schema, None);

        let results = run_quiet(&config).await.unwrap();
        assert!(results.has_errors());
        assert!(results.findings.iter().any(|f| f.category == "schema"));
    }

    #[tokio::test]
    async fn test_warns_about_unused_soft_delete() {
        let dir = tempfile::tempdir().unwrap();
        let config = write_project(
            dir.path(),
            "schema_file: schema.yaml\nsoft_delete: { enabled: true }\n",
            SCHEMA,
            None,
        );

        let results = run_quiet(&config).await.unwrap();
        assert!(!results.has_errors());
        let categories: Vec<&str> = results
            .findings
            .iter()
            .filter(|f| f.severity == Severity::Warning)
            .map(|f| f.category.as_str())
            .collect();
        assert!(categories.contains(&"soft_delete"));
        assert!(categories.contains(&"policy"));
    }

    #[tokio::test]
    async fn test_missing_schema_file_setting() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("warden.yaml");
        fs::write(&path, "{}").unwrap();

        let results = run_quiet(&path).await.unwrap();
        assert_eq!(results.count(Severity::Error), 1);
        assert!(run(&path).await.is_err());
    }
}
