use anyhow::Context;
use sage::{
    api::routes::build_app,
    build_state,
    cli::{
        Cli, Commands, ResearchArgs,
        init::{self, InitConfig, InitResult},
        output::Output,
    },
    research::run::RunPhase,
    utils::toml_config::{ConfigError, SageConfig, SageConfigManager},
};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse_args();
    let output = if cli.no_color {
        Output::no_color()
    } else {
        Output::new()
    };

    match cli.command {
        Some(Commands::Init {
            path,
            force,
            provider,
            host,
            port,
        }) => {
            let result = init::run(
                InitConfig {
                    path,
                    force,
                    provider,
                    host,
                    port,
                },
                &output,
            );
            match result {
                InitResult::Success | InitResult::AlreadyExists => Ok(()),
                InitResult::Error(e) => anyhow::bail!(e),
            }
        }
        Some(Commands::Config { full, validate }) => {
            show_config(&cli.config, full, validate, &output)
        }
        Some(Commands::Research(ref args)) => {
            let level = if cli.verbose { "info,sage=debug" } else { "warn" };
            init_tracing(level, cli.log_json);
            run_research(&cli.config, args, &output).await
        }
        Some(Commands::Serve) | None => serve(&cli, &output).await,
    }
}

fn init_tracing(default_filter: &str, json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}

/// Load `path`, or run on defaults when the file does not exist.
fn load_manager(path: &Path) -> anyhow::Result<SageConfigManager> {
    match SageConfigManager::new(path) {
        Ok(manager) => Ok(manager),
        Err(ConfigError::FileNotFound(path)) => {
            warn!(path = %path.display(), "Configuration file not found, using defaults");
            Ok(SageConfigManager::from_config(SageConfig::default()))
        }
        Err(e) => Err(e).context("Failed to load configuration"),
    }
}

async fn serve(cli: &Cli, output: &Output) -> anyhow::Result<()> {
    let bootstrap = SageConfig::load_or_default(&cli.config).context("Failed to load configuration")?;
    init_tracing(&bootstrap.server.log_level, cli.log_json);
    output.banner();

    let mut manager = load_manager(&cli.config)?;
    if cli.config.exists() {
        if let Err(e) = manager.start_watching() {
            warn!(error = %e, "Configuration hot reload disabled");
        }
    }
    let manager = Arc::new(manager);
    let config = manager.config();

    let state = build_state(Arc::clone(&manager))
        .await
        .context("Failed to set up capabilities")?;
    let app = build_app(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!(addr = %addr, "S.A.G.E server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
    }
}

async fn run_research(config_path: &Path, args: &ResearchArgs, output: &Output) -> anyhow::Result<()> {
    let manager = Arc::new(load_manager(config_path)?);
    let state = build_state(manager)
        .await
        .context("Failed to set up capabilities")?;

    let (_, summary, report) = state.coordinator.research(args.to_query()).await?;

    if args.json {
        let body = serde_json::json!({
            "run": &summary,
            "report": report.as_deref(),
        });
        println!("{}", serde_json::to_string_pretty(&body)?);
    } else {
        output.run_summary(&summary);
        if let Some(report) = &report {
            output.report(report);
        }
    }

    if let (Some(path), Some(report)) = (&args.output, &report) {
        std::fs::write(path, report.to_markdown())
            .with_context(|| format!("Failed to write {}", path.display()))?;
        output.created("report", &path.display().to_string());
    }

    match summary.phase {
        RunPhase::Done => Ok(()),
        phase => anyhow::bail!(
            "research run ended as {}{}",
            phase,
            summary.reason.map(|r| format!(": {}", r)).unwrap_or_default()
        ),
    }
}

fn show_config(path: &Path, full: bool, validate: bool, output: &Output) -> anyhow::Result<()> {
    output.header("Configuration");
    output.kv("File", &path.display().to_string());

    let config = if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        SageConfig::parse(&content)?
    } else {
        output.warning("Configuration file not found, showing defaults");
        SageConfig::default()
    };

    if validate {
        match config.validate_with_warnings() {
            Ok(warnings) => {
                output.success("Configuration is valid");
                for warning in warnings {
                    output.warning(&warning.to_string());
                }
            }
            Err(e) => {
                output.error(&e.to_string());
                anyhow::bail!("invalid configuration");
            }
        }
    }

    if full {
        output.newline();
        println!("{}", config.to_toml()?);
    } else {
        output.kv(
            "Server",
            &format!("{}:{}", config.server.host, config.server.port),
        );
        output.kv(
            "Concurrency",
            &config.orchestration.max_concurrency.to_string(),
        );
        output.kv(
            "Retry attempts",
            &config.orchestration.retry.max_attempts.to_string(),
        );
        output.kv(
            "Source types",
            &config
                .pipeline
                .default_source_types
                .iter()
                .map(|t| t.as_str())
                .collect::<Vec<_>>()
                .join(", "),
        );
        output.kv(
            "Citation style",
            &format!("{:?}", config.pipeline.citation_style).to_lowercase(),
        );
    }

    Ok(())
}
