mod brain;
mod console;
mod dom;
mod hands;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use dotenvy::dotenv;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use console::{Console, ConsoleObserver, MenuChoice, parse_node_id};
use hands::BrowserSession;
use uxpilot::config::{DEFAULT_START_URL, parse_retries};
use uxpilot::prompt::render_page_index;
use uxpilot::{
    Action, ActionResolver, AgentConfig, AgentError, ArtifactSink, Crawler, PageIndex,
    PromptBuilder, ScrollDirection, StepOutcome, Transcript,
};

const INTERRUPT_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Parser)]
#[command(name = "agent", about = "Drive a browser toward an objective with a language model")]
struct Cli {
    /// Start URL (asked for interactively when omitted)
    #[arg(long)]
    url: Option<String>,

    /// Persona the model should reason as
    #[arg(long)]
    persona: Option<String>,

    /// What the session should accomplish
    #[arg(long)]
    objective: Option<String>,

    /// Run every resolved action without asking
    #[arg(short = 'y', long)]
    yes: bool,

    #[arg(long)]
    headless: bool,

    /// Model name, overrides UXPILOT_MODEL
    #[arg(long)]
    model: Option<String>,

    /// Attempts per step before giving up
    #[arg(long, value_parser = |s: &str| parse_retries(s).map_err(|e| e.to_string()))]
    max_retries: Option<usize>,

    #[arg(long)]
    artifacts_dir: Option<PathBuf>,

    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let config = build_config(&cli)?;
    tokio::spawn(force_exit_after_interrupt());

    tokio::select! {
        result = run(cli, config) => result,
        _ = tokio::signal::ctrl_c() => {
            println!("\n[!] Ctrl+C detected, exiting gracefully.");
            Ok(())
        }
    }
}

/// Backstop for when `run` is parked inside a blocking browser call and the
/// select above cannot observe the interrupt.
async fn force_exit_after_interrupt() {
    if tokio::signal::ctrl_c().await.is_err() {
        return;
    }
    tokio::time::sleep(INTERRUPT_GRACE).await;
    tracing::warn!("session did not stop after Ctrl+C, exiting");
    std::process::exit(0);
}

fn build_config(cli: &Cli) -> Result<AgentConfig> {
    let mut config = AgentConfig::from_env()?;
    if let Some(model) = &cli.model {
        config.model = model.clone();
    }
    if let Some(retries) = cli.max_retries {
        config.max_retries = retries;
    }
    if let Some(dir) = &cli.artifacts_dir {
        config.artifacts_dir = dir.clone();
    }
    config.headless = cli.headless;
    config.force_run = cli.yes;
    Ok(config)
}

async fn run(cli: Cli, config: AgentConfig) -> Result<()> {
    let mut console = Console::new();

    let start_url = match cli.url {
        Some(url) => url,
        None => console.prompt("Your webapp URL?\n> ").await?,
    };
    let start_url = if start_url.is_empty() {
        DEFAULT_START_URL.to_string()
    } else {
        start_url
    };
    let persona = match cli.persona {
        Some(persona) => persona,
        None => console.prompt("Your user persona?\n> ").await?,
    };
    let objective = match cli.objective {
        Some(objective) => objective,
        None => console.prompt("What is your objective?\n> ").await?,
    };

    let artifacts = ArtifactSink::new(&config.artifacts_dir).with_context(|| {
        format!(
            "creating artifacts directory {}",
            config.artifacts_dir.display()
        )
    })?;
    let mut prompt = PromptBuilder::new(objective, persona).with_artifacts(artifacts.clone());
    let resolver = ActionResolver::new(brain::Brain::new(&config))
        .with_params(config.generation)
        .with_max_retries(config.max_retries)
        .with_artifacts(artifacts)
        .with_observer(Arc::new(ConsoleObserver));

    tracing::info!("launching Chrome");
    let headless = config.headless;
    let mut session = tokio::task::spawn_blocking(move || BrowserSession::launch(headless))
        .await
        .map_err(|e| anyhow!("Browser launch panicked: {e}"))??;
    tokio::task::block_in_place(|| session.navigate(&start_url))?;

    let mut transcript = Transcript::new();
    loop {
        let (index, action) = match step(&mut session, &prompt, &resolver, &mut transcript).await {
            Ok(resolved) => resolved,
            Err(e @ AgentError::ResolutionExhausted { .. }) => {
                tracing::error!(error = %e, "giving up on this session");
                return Err(e.into());
            }
            Err(e) if e.is_transient() => {
                tracing::debug!(error = %e, "page not settled");
                println!("Error crawling page, retrying...");
                tokio::time::sleep(config.crawl_backoff).await;
                continue;
            }
            Err(e) => {
                tracing::warn!(error = %e, "step failed, retrying");
                println!("{e}\nStep failed, retrying...");
                tokio::time::sleep(config.crawl_backoff).await;
                continue;
            }
        };

        println!("\nModel command:");
        println!("{}", action.describe(&index));

        let run_it = config.force_run || console.confirm_run().await?;
        if run_it {
            if execute(&mut session, &action, &index) == StepOutcome::ObjectiveComplete {
                tracing::info!("objective complete");
                return Ok(());
            }
            continue;
        }

        manual_override(&mut console, &mut session, &mut prompt, &index).await?;
    }
}

/// Crawl, render and resolve. Nothing is executed here.
async fn step(
    session: &mut BrowserSession,
    prompt: &PromptBuilder,
    resolver: &ActionResolver<brain::Brain>,
    transcript: &mut Transcript,
) -> Result<(PageIndex, Action), AgentError> {
    let index = tokio::task::block_in_place(|| session.crawl())?;
    prompt.prepare(&index, transcript);
    let action = resolver.resolve(transcript, &index).await?;
    Ok((index, action))
}

/// A failed action is reported and the session carries on from a fresh crawl.
fn execute(session: &mut BrowserSession, action: &Action, index: &PageIndex) -> StepOutcome {
    match tokio::task::block_in_place(|| action.apply(session, index)) {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::warn!(error = %e, operation = %action.operation(), "action failed");
            println!("Action failed: {e}");
            StepOutcome::Continue
        }
    }
}

async fn manual_override(
    console: &mut Console,
    session: &mut BrowserSession,
    prompt: &mut PromptBuilder,
    index: &PageIndex,
) -> Result<()> {
    println!("{}", render_page_index(index));

    loop {
        let result = match console.menu_choice().await? {
            MenuChoice::GoToUrl => {
                let url = console.prompt("URL:").await?;
                tokio::task::block_in_place(|| session.navigate(&url))
            }
            MenuChoice::GoBack => tokio::task::block_in_place(|| session.go_back()),
            MenuChoice::ScrollUp => {
                tokio::task::block_in_place(|| session.scroll(ScrollDirection::Up))
            }
            MenuChoice::ScrollDown => {
                tokio::task::block_in_place(|| session.scroll(ScrollDirection::Down))
            }
            MenuChoice::Click => {
                let raw = console.prompt("id:").await?;
                match parse_node_id(&raw).and_then(|id| index.clickable(id)) {
                    Some(node) => tokio::task::block_in_place(|| session.click(node)),
                    None => {
                        println!("{raw} is not a clickable node id");
                        continue;
                    }
                }
            }
            MenuChoice::Type => {
                let raw = console.prompt("id:").await?;
                let Some(node) = parse_node_id(&raw).and_then(|id| index.inputable(id))
                else {
                    println!("{raw} is not an inputable node id");
                    continue;
                };
                let text = console.prompt("text:").await?;
                tokio::task::block_in_place(|| session.type_text(node, &text, true))
            }
            MenuChoice::ChangeObjective => {
                let objective = console.prompt("Objective:").await?;
                tracing::info!(%objective, "objective changed");
                prompt.set_objective(objective);
                Ok(())
            }
            MenuChoice::Help | MenuChoice::Unknown => continue,
        };

        if let Err(e) = result {
            tracing::warn!(error = %e, "manual command failed");
            println!("Command failed: {e}");
        }
        return Ok(());
    }
}
