mod common;

use common::mocks::healthy_capabilities;
use sage::research::query::Query;
use sage::research::report::SectionKind;
use sage::research::run::RunPhase;
use sage::state_with_capabilities;
use sage::utils::toml_config::{ConfigError, SageConfigManager};
use std::io::Write;
use std::sync::Arc;
use tempfile::NamedTempFile;

const FAST_RETRY: &str = r#"
[orchestration.retry]
initial_backoff_ms = 1
max_backoff_ms = 5
jitter = 0.0
"#;

#[tokio::test]
async fn test_pipeline_from_file_and_reload_between_runs() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(
        file,
        "{}\n[pipeline]\nsources_per_type = 2\n\n[pipeline.stages.sentiment]\nenabled = false",
        FAST_RETRY
    )
    .unwrap();

    let manager = Arc::new(SageConfigManager::new(file.path()).unwrap());
    let state = state_with_capabilities(Arc::clone(&manager), healthy_capabilities());

    let (_, summary, report) = state
        .coordinator
        .research(Query::new("wildfire smoke health effects"))
        .await
        .unwrap();
    assert_eq!(summary.phase, RunPhase::Done);
    assert_eq!(
        summary
            .tasks
            .iter()
            .filter(|t| t.id.as_str().starts_with("scrape-"))
            .count(),
        2
    );
    assert!(report.unwrap().section(SectionKind::Sentiment).is_none());

    std::fs::write(file.path(), format!("{}\n[pipeline]\nsources_per_type = 1\n", FAST_RETRY))
        .unwrap();
    manager.reload().unwrap();

    let (_, summary, report) = state
        .coordinator
        .research(Query::new("wildfire smoke health effects"))
        .await
        .unwrap();
    assert_eq!(summary.phase, RunPhase::Done);
    assert_eq!(summary.counts.total, 5); // scrape-1, summarize, fact-check, sentiment, cite
    assert!(report.unwrap().section(SectionKind::Sentiment).is_some());
}

#[test]
fn test_cyclic_pipeline_file_is_refused() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(
        file,
        "[pipeline.stages.summarize]\ndepends_on = [\"fact_check\"]"
    )
    .unwrap();

    let result = SageConfigManager::new(file.path());
    assert!(matches!(result, Err(ConfigError::Pipeline(_))));
}

#[test]
fn test_invalid_reload_keeps_previous_config() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "[orchestration]\nmax_concurrency = 3").unwrap();
    let manager = SageConfigManager::new(file.path()).unwrap();

    std::fs::write(file.path(), "[pipeline.stages.bogus]\nenabled = true\n").unwrap();
    assert!(manager.reload().is_err());
    assert_eq!(manager.config().orchestration.max_concurrency, 3);
}
