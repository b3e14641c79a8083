mod common;

use common::mocks::{
    EchoTranslator, MockFetcher, MockLLMClient, PlainExtractor, ScriptedFactChecker,
    capabilities_with, config_without, fast_config, healthy_capabilities,
};
use sage::capabilities::sentiment::LexiconSentiment;
use sage::capabilities::summarize::LlmSummarizer;
use sage::capabilities::{CapabilityError, CapabilitySet, SentimentLabel, Verdict};
use sage::research::coordinator::ResearchCoordinator;
use sage::research::error::OrchestrationError;
use sage::research::query::{CitationStyle, Query, SourceType};
use sage::research::report::{SectionContent, SectionKind};
use sage::research::run::{RunEvent, RunEventKind, RunId, RunPhase};
use sage::research::store::RunStore;
use sage::research::task::{TaskFailure, TaskStatus};
use sage::utils::toml_config::{SageConfig, SageConfigManager};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

fn coordinator(config: SageConfig, capabilities: CapabilitySet) -> ResearchCoordinator {
    ResearchCoordinator::new(
        Arc::new(RunStore::new(32)),
        capabilities,
        SageConfigManager::from_config(config),
    )
}

fn events(coordinator: &ResearchCoordinator, run_id: RunId) -> Vec<RunEvent> {
    coordinator
        .store()
        .get(&run_id)
        .expect("run should be stored")
        .read(|state| state.events().to_vec())
}

fn position(events: &[RunEvent], matches: impl Fn(&RunEventKind) -> bool) -> usize {
    events
        .iter()
        .position(|e| matches(&e.kind))
        .expect("event should be recorded")
}

// ============= Full Runs =============

#[tokio::test]
async fn test_climate_query_produces_complete_report() {
    let coordinator = coordinator(fast_config(), healthy_capabilities());

    let (run_id, summary, report) = coordinator
        .research(Query::new("climate change 2024 impacts").with_language("fr"))
        .await
        .unwrap();

    assert_eq!(summary.phase, RunPhase::Done);
    assert!(summary.report_ready);
    // 3 scrapes + summarize + fact-check + translate-fr + sentiment + cite
    assert_eq!(summary.counts.total, 8);
    assert_eq!(summary.counts.succeeded, 8);

    let report = report.unwrap();
    assert_eq!(report.run_id, run_id);
    assert!(!report.is_degraded());

    let kinds: Vec<SectionKind> = report.sections.iter().map(|s| s.kind()).collect();
    assert_eq!(
        kinds,
        vec![
            SectionKind::Summary,
            SectionKind::FactCheck,
            SectionKind::Translations,
            SectionKind::Sentiment,
            SectionKind::Citations,
            SectionKind::Sources,
        ]
    );
    assert_eq!(report.verdict_counts(), (2, 0, 0));

    match &report.section(SectionKind::Translations).unwrap().content {
        SectionContent::Translations { items } => {
            assert_eq!(items.len(), 1);
            assert_eq!(items[0].language, "fr");
            assert!(items[0].text.starts_with("[fr] Global temperatures rose"));
        }
        other => panic!("Expected translations, got {:?}", other),
    }
    match &report.section(SectionKind::Citations).unwrap().content {
        SectionContent::Citations { style, entries } => {
            assert_eq!(*style, CitationStyle::Apa);
            assert_eq!(entries.len(), 3);
            assert!(entries[0].starts_with("[1] Article 1 on climate change 2024 impacts."));
        }
        other => panic!("Expected citations, got {:?}", other),
    }
    match &report.section(SectionKind::Sentiment).unwrap().content {
        SectionContent::Sentiment { label } => {
            assert_eq!(*label, Some(SentimentLabel::Informative))
        }
        other => panic!("Expected sentiment, got {:?}", other),
    }
}

#[tokio::test]
async fn test_query_constraints_shape_the_plan() {
    let coordinator = coordinator(fast_config(), healthy_capabilities());

    let query = Query::new("CRISPR off-target effects")
        .with_source_type(SourceType::Academic)
        .with_source("https://example.org/review")
        .with_language("es")
        .with_language("de");
    let (_, summary, report) = coordinator.research(query).await.unwrap();

    assert_eq!(summary.phase, RunPhase::Done);
    // explicit source + 3 academic results
    let scrapes = summary
        .tasks
        .iter()
        .filter(|t| t.id.as_str().starts_with("scrape-"))
        .count();
    assert_eq!(scrapes, 4);

    let report = report.unwrap();
    match &report.section(SectionKind::Translations).unwrap().content {
        SectionContent::Translations { items } => {
            let languages: Vec<&str> = items.iter().map(|t| t.language.as_str()).collect();
            assert_eq!(languages, vec!["de", "es"]);
        }
        other => panic!("Expected translations, got {:?}", other),
    }
    match &report.section(SectionKind::Sources).unwrap().content {
        SectionContent::Sources { items } => {
            assert_eq!(items[0].url, "https://example.org/review");
            assert_eq!(items[1].source_type, SourceType::Academic);
        }
        other => panic!("Expected sources, got {:?}", other),
    }
}

#[tokio::test]
async fn test_llm_backed_summary_and_lexicon_sentiment() {
    let llm = Arc::new(MockLLMClient::new(
        "- Temperatures broke records\n- Heat waves caused crop losses",
    ));
    let capabilities = CapabilitySet::new(
        Arc::new(MockFetcher::new()),
        Arc::new(PlainExtractor),
        Arc::new(LlmSummarizer::new(llm, 6_000)),
        Arc::new(ScriptedFactChecker::answering(Verdict::Unverifiable)),
        Arc::new(EchoTranslator),
        Arc::new(LexiconSentiment),
    );
    let coordinator = coordinator(fast_config(), capabilities);

    let (_, summary, report) = coordinator
        .research(Query::new("heat records 2024"))
        .await
        .unwrap();

    assert_eq!(summary.phase, RunPhase::Done);
    let report = report.unwrap();
    match &report.section(SectionKind::Summary).unwrap().content {
        SectionContent::Summary { bullets } => assert_eq!(
            bullets,
            &vec![
                "Temperatures broke records".to_string(),
                "Heat waves caused crop losses".to_string()
            ]
        ),
        other => panic!("Expected summary, got {:?}", other),
    }
    assert_eq!(report.verdict_counts(), (0, 0, 2));
}

// ============= Degraded Runs =============

#[tokio::test]
async fn test_failing_fact_checker_degrades_only_its_section() {
    let checker = ScriptedFactChecker::failing(CapabilityError::Lookup("upstream 503".into()));
    let calls = Arc::clone(&checker.calls);
    let coordinator = coordinator(fast_config(), capabilities_with(MockFetcher::new(), checker));

    let (run_id, summary, report) = coordinator
        .research(Query::new("climate change 2024 impacts"))
        .await
        .unwrap();

    assert_eq!(summary.phase, RunPhase::Done);
    let fact_check = summary
        .tasks
        .iter()
        .find(|t| t.id.as_str() == "fact-check")
        .unwrap();
    assert_eq!(fact_check.status, TaskStatus::Failed);
    assert_eq!(fact_check.attempts, 3);
    assert!(calls.load(Ordering::SeqCst) >= 3);

    let report = report.unwrap();
    assert!(report.is_degraded());
    let section = report.section(SectionKind::FactCheck).unwrap();
    assert!(section.is_degraded());
    assert_eq!(
        section.reasons(),
        &["fact-check: lookup failed: upstream 503".to_string()]
    );
    assert!(!report.section(SectionKind::Summary).unwrap().is_degraded());
    assert!(!report.section(SectionKind::Sources).unwrap().is_degraded());

    let retries = events(&coordinator, run_id)
        .iter()
        .filter(|e| matches!(&e.kind, RunEventKind::TaskRetrying { task, .. } if task.as_str() == "fact-check"))
        .count();
    assert_eq!(retries, 2);
}

#[tokio::test]
async fn test_unavailable_capability_is_not_retried() {
    let checker = ScriptedFactChecker::failing(CapabilityError::Unavailable("no app id".into()));
    let calls = Arc::clone(&checker.calls);
    let coordinator = coordinator(fast_config(), capabilities_with(MockFetcher::new(), checker));

    let (_, summary, report) = coordinator
        .research(Query::new("ocean acidification"))
        .await
        .unwrap();

    let fact_check = summary
        .tasks
        .iter()
        .find(|t| t.id.as_str() == "fact-check")
        .unwrap();
    assert_eq!(fact_check.attempts, 1);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(report
        .unwrap()
        .section(SectionKind::FactCheck)
        .unwrap()
        .is_degraded());
}

#[tokio::test]
async fn test_failed_scrape_fails_its_dependents() {
    let checker = ScriptedFactChecker::answering(Verdict::Supported);
    let coordinator = coordinator(
        config_without(&["translate"]),
        capabilities_with(MockFetcher::failing(&[2]), checker),
    );

    let (run_id, summary, report) = coordinator
        .research(Query::new("climate change 2024 impacts"))
        .await
        .unwrap();

    assert_eq!(summary.phase, RunPhase::Done);
    let state = coordinator.store().get(&run_id).unwrap();
    state.read(|run| {
        let scrape = run.tasks().iter().find(|t| t.id.as_str() == "scrape-2").unwrap();
        assert_eq!(scrape.status, TaskStatus::Failed);
        assert_eq!(scrape.attempts, 3);

        for id in ["summarize", "fact-check", "sentiment", "cite"] {
            let task = run.tasks().iter().find(|t| t.id.as_str() == id).unwrap();
            assert_eq!(task.status, TaskStatus::Failed, "{} should fail upstream", id);
            assert_eq!(task.attempts, 0);
            assert!(matches!(task.failure, Some(TaskFailure::UpstreamFailed { .. })));
        }
    });

    let report = report.unwrap();
    match &report.section(SectionKind::Sources).unwrap().content {
        SectionContent::Sources { items } => assert_eq!(items.len(), 2),
        other => panic!("Expected sources, got {:?}", other),
    }
    // citations still come from the sources that were retrieved
    let citations = report.section(SectionKind::Citations).unwrap();
    assert!(citations.is_degraded());
    match &citations.content {
        SectionContent::Citations { entries, .. } => assert_eq!(entries.len(), 2),
        other => panic!("Expected citations, got {:?}", other),
    }
}

#[tokio::test]
async fn test_non_ascii_source_url_is_cited() {
    let url = "https://x.org/\u{130}\u{130}/arxiv.org/";
    let coordinator = coordinator(config_without(&["translate"]), healthy_capabilities());

    let (_, summary, report) = tokio::time::timeout(
        Duration::from_secs(5),
        coordinator.research(Query::new("sea level rise").with_source(url)),
    )
    .await
    .expect("run should finish")
    .unwrap();

    assert_eq!(summary.phase, RunPhase::Done);
    let report = report.unwrap();
    let citations = report.section(SectionKind::Citations).unwrap();
    assert!(!citations.is_degraded());
    match &citations.content {
        SectionContent::Citations { entries, .. } => {
            assert!(entries.iter().any(|entry| entry.contains(url)))
        }
        other => panic!("Expected citations, got {:?}", other),
    }
}

// ============= Ordering & Concurrency =============

#[tokio::test]
async fn test_dependents_start_after_dependencies_succeed() {
    let coordinator = coordinator(fast_config(), healthy_capabilities());
    let (run_id, summary, _) = coordinator
        .research(Query::new("urban heat islands").with_language("it"))
        .await
        .unwrap();
    assert_eq!(summary.phase, RunPhase::Done);

    let events = events(&coordinator, run_id);
    let started = |id: &'static str| {
        position(&events, move |k| {
            matches!(k, RunEventKind::TaskStarted { task } if task.as_str() == id)
        })
    };
    let succeeded = |id: &'static str| {
        position(&events, move |k| {
            matches!(k, RunEventKind::TaskSucceeded { task, .. } if task.as_str() == id)
        })
    };

    for scrape in ["scrape-1", "scrape-2", "scrape-3"] {
        assert!(succeeded(scrape) < started("summarize"));
        assert!(succeeded(scrape) < started("cite"));
        assert!(succeeded(scrape) < started("sentiment"));
    }
    assert!(succeeded("summarize") < started("fact-check"));
    assert!(succeeded("summarize") < started("translate-it"));
}

#[tokio::test]
async fn test_concurrency_limit_is_respected() {
    let mut config = config_without(&["translate", "sentiment", "fact_check"]);
    config.orchestration.max_concurrency = 2;
    config.pipeline.sources_per_type = 5;
    let capabilities = capabilities_with(
        MockFetcher::slow(Duration::from_millis(20)),
        ScriptedFactChecker::answering(Verdict::Supported),
    );
    let coordinator = coordinator(config, capabilities);

    let (run_id, summary, _) = coordinator
        .research(Query::new("permafrost thaw"))
        .await
        .unwrap();
    assert_eq!(summary.phase, RunPhase::Done);

    let mut running = 0usize;
    let mut peak = 0usize;
    for event in events(&coordinator, run_id) {
        match event.kind {
            RunEventKind::TaskStarted { .. } => {
                running += 1;
                peak = peak.max(running);
            }
            RunEventKind::TaskSucceeded { .. } | RunEventKind::TaskFailed { .. } => {
                running = running.saturating_sub(1)
            }
            _ => {}
        }
    }
    assert_eq!(peak, 2);
}

// ============= Lifecycle =============

#[tokio::test]
async fn test_cancel_stops_in_flight_tasks() {
    let fetcher = MockFetcher::slow(Duration::from_secs(30));
    let coordinator = coordinator(
        fast_config(),
        capabilities_with(fetcher, ScriptedFactChecker::answering(Verdict::Supported)),
    );

    let run_id = coordinator.submit(Query::new("glacier retreat"));
    tokio::time::sleep(Duration::from_millis(50)).await;

    let summary = tokio::time::timeout(Duration::from_secs(5), coordinator.cancel(run_id))
        .await
        .expect("cancel should resolve promptly")
        .unwrap();

    assert_eq!(summary.phase, RunPhase::Cancelled);
    assert_eq!(summary.counts.cancelled, summary.counts.total);
    assert!(summary.tasks.iter().all(|t| t.status == TaskStatus::Cancelled));
    assert!(matches!(
        coordinator.report(run_id),
        Err(OrchestrationError::NotReady {
            phase: RunPhase::Cancelled
        })
    ));
}

#[tokio::test]
async fn test_invalid_language_is_rejected() {
    let coordinator = coordinator(fast_config(), healthy_capabilities());
    let (_, summary, report) = coordinator
        .research(Query::new("bees").with_language("french!!"))
        .await
        .unwrap();

    assert_eq!(summary.phase, RunPhase::Rejected);
    assert!(summary.reason.unwrap().contains("not a language code"));
    assert!(summary.tasks.is_empty());
    assert!(report.is_none());
}

#[tokio::test]
async fn test_wait_on_finished_run_returns_immediately() {
    let coordinator = coordinator(fast_config(), healthy_capabilities());
    let (run_id, _, _) = coordinator.research(Query::new("soil carbon")).await.unwrap();

    let summary = coordinator.wait(run_id).await.unwrap();
    assert_eq!(summary.phase, RunPhase::Done);
    assert_eq!(coordinator.active_runs(), 0);
    assert_eq!(coordinator.store().summaries().len(), 1);
}
