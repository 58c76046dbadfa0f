//! Storyloom Engine - stdin-driven runner.
//!
//! Wires the turn pipeline against an OpenAI-compatible endpoint and
//! plays a story package on the terminal: player lines in, frames out as
//! JSON lines. The HTTP/SSE transport lives elsewhere; this runner is
//! the reference harness for the engine crate.

use std::io::BufRead;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use storyloom_domain::{
    Act, ActId, Encounter, EncounterId, Frame, Location, LocationId, PackageId, SessionId,
    StoryPackage, WorldInfoEntry, YieldKind,
};
use storyloom_engine::infrastructure::{
    cache::{PackageCache, PlotStateCache},
    clock::SystemClock,
    memory_store::MemoryStore,
    ollama::OllamaClient,
    ports::FrameSink,
    resilient_llm::{ResilientLlmClient, RetryConfig},
};
use storyloom_engine::use_cases::{
    combat::CombatEngine,
    context::{CompressorConfig, ContextCompressor},
    director::Director,
    plot::PlotStates,
    storyteller::{Storyteller, StorytellerConfig, ToolExecutor},
    turn::TurnRunner,
};

/// Prints frames and turn boundaries as JSON lines.
struct StdoutFrameSink;

#[async_trait]
impl FrameSink for StdoutFrameSink {
    async fn emit(&self, _session_id: SessionId, frame: Frame) {
        match serde_json::to_string(&frame) {
            Ok(line) => println!("{line}"),
            Err(e) => tracing::error!(error = %e, "Failed to serialize frame"),
        }
    }

    async fn turn_complete(&self, _session_id: SessionId, waiting_for: YieldKind) {
        println!(r#"{{"turn_complete":true,"waiting_for":"{}"}}"#, waiting_for.as_str());
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "storyloom_engine=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::info!("Starting Storyloom Engine");

    // Load the story package: a JSON file path from the environment, or
    // the built-in demo package.
    let package = match std::env::var("STORY_PACKAGE_PATH") {
        Ok(path) => load_package(Path::new(&path))?,
        Err(_) => demo_package(),
    };
    let package_id = package.id.clone();
    tracing::info!(package = %package_id, title = %package.title, "Package loaded");

    // Model endpoint
    let ollama_client = Arc::new(OllamaClient::from_env());
    let retry_config = RetryConfig::default();
    tracing::info!(
        max_retries = retry_config.max_retries,
        base_delay_ms = retry_config.base_delay_ms,
        "LLM client configured"
    );
    let llm = Arc::new(ResilientLlmClient::new(ollama_client, retry_config));

    // In-memory store; the relational adapter plugs in through the same
    // ports in the full deployment.
    let store = Arc::new(MemoryStore::new());
    store.put_package(package);

    let frames: Arc<StdoutFrameSink> = Arc::new(StdoutFrameSink);
    let clock = Arc::new(SystemClock);
    let plots = Arc::new(PlotStates::new(
        Arc::new(PlotStateCache::new(store.clone())),
        clock,
    ));
    let combat = Arc::new(CombatEngine::new(store.clone()));
    let executor = ToolExecutor::new(plots.clone(), combat, store.clone(), frames.clone());
    let runner = TurnRunner::new(
        Arc::new(PackageCache::new(store.clone())),
        plots,
        Director::new(llm.clone()),
        Storyteller::new(
            llm.clone(),
            executor,
            frames.clone(),
            StorytellerConfig::default(),
        ),
        Arc::new(ContextCompressor::new(llm, CompressorConfig::default())),
        store.clone(),
        frames,
    );

    let session = SessionId::new();
    tracing::info!(%session, "Session opened; empty line seeds the opening scene");

    // Seed the session before the first prompt
    let cancel = CancellationToken::new();
    runner.run_turn(session, &package_id, "", &cancel).await?;

    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let action = line?;
        if action.trim() == "/quit" {
            break;
        }
        let cancel = CancellationToken::new();
        match runner.run_turn(session, &package_id, &action, &cancel).await {
            Ok(outcome) => {
                tracing::debug!(
                    turn = outcome.state.turn_count,
                    waiting_for = outcome.waiting_for.as_str(),
                    "Turn finished"
                );
            }
            Err(e) => tracing::error!(error = %e, "Turn failed"),
        }
    }

    tracing::info!("Goodbye");
    Ok(())
}

fn load_package(path: &Path) -> anyhow::Result<StoryPackage> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

/// A two-location demo story for running the engine without content.
fn demo_package() -> StoryPackage {
    StoryPackage {
        id: PackageId::new("demo-waystation"),
        title: "The Waystation".to_string(),
        premise: "A traveler reaches a mountain waystation as the last light fails.".to_string(),
        acts: vec![Act {
            id: ActId::new("act-1"),
            title: "Nightfall".to_string(),
            locations: vec![
                Location {
                    id: LocationId::new("courtyard"),
                    name: "The Courtyard".to_string(),
                    description: "Snow settles on a cold brazier.".to_string(),
                    beats: vec!["Find shelter before dark".to_string()],
                    connections: vec![LocationId::new("common-room")],
                    encounters: vec![Encounter {
                        id: EncounterId::new("gatekeeper"),
                        title: "The gatekeeper".to_string(),
                        description: "Someone watches from the gate house".to_string(),
                        priority: 5,
                    }],
                    sandbox: false,
                },
                Location {
                    id: LocationId::new("common-room"),
                    name: "The Common Room".to_string(),
                    description: "A fire, three travelers, and no innkeeper.".to_string(),
                    beats: vec![],
                    connections: vec![LocationId::new("courtyard")],
                    encounters: vec![],
                    sandbox: true,
                },
            ],
        }],
        world_info: vec![WorldInfoEntry {
            keys: vec!["waystation".to_string(), "innkeeper".to_string()],
            content: "The waystation has stood empty since the pass closed.".to_string(),
        }],
        characters: vec![],
    }
}
