//! Shared fixtures: a scripted LLM, a collecting frame sink, a sample
//! story package and a fully wired turn runner over the in-memory store.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;

use storyloom_domain::{
    Act, ActId, CharacterId, CharacterSeed, Encounter, EncounterId, Frame, Location, LocationId,
    PackageId, SessionId, StoryPackage, WorldInfoEntry, YieldKind,
};

use crate::infrastructure::cache::{PackageCache, PlotStateCache};
use crate::infrastructure::clock::SystemClock;
use crate::infrastructure::memory_store::MemoryStore;
use crate::infrastructure::ports::{
    FinishReason, FrameSink, LlmError, LlmPort, LlmRequest, LlmResponse, ToolCall, ToolDefinition,
};
use crate::use_cases::combat::CombatEngine;
use crate::use_cases::context::{CompressorConfig, ContextCompressor};
use crate::use_cases::director::Director;
use crate::use_cases::plot::PlotStates;
use crate::use_cases::storyteller::{Storyteller, StorytellerConfig, ToolExecutor};
use crate::use_cases::turn::TurnRunner;

// ── Scripted LLM ─────────────────────────────────────────────────────────

/// Plays back scripted responses: one queue for plain generation
/// (Director, summarizer) and one for tool-calling steps (storyteller).
/// An exhausted tool queue produces an empty prose step.
pub struct ScriptedLlm {
    plain: Mutex<Vec<String>>,
    tool_steps: Mutex<Vec<LlmResponse>>,
    call_counter: AtomicUsize,
}

impl ScriptedLlm {
    pub fn new(plain: Vec<String>, tool_steps: Vec<LlmResponse>) -> Self {
        Self {
            plain: Mutex::new(plain),
            tool_steps: Mutex::new(tool_steps),
            call_counter: AtomicUsize::new(0),
        }
    }

    /// A storyteller step invoking the given tools in order.
    pub fn tool_step(calls: Vec<(&str, serde_json::Value)>) -> LlmResponse {
        static NEXT_ID: AtomicUsize = AtomicUsize::new(0);
        let tool_calls = calls
            .into_iter()
            .map(|(name, arguments)| ToolCall {
                id: format!("call_{}", NEXT_ID.fetch_add(1, Ordering::SeqCst)),
                name: name.to_string(),
                arguments,
            })
            .collect();
        LlmResponse {
            content: String::new(),
            tool_calls,
            finish_reason: FinishReason::ToolCalls,
            usage: None,
        }
    }

    /// A step that yields to the player.
    pub fn yield_step(waiting_for: &str) -> LlmResponse {
        Self::tool_step(vec![("yield_to_player", json!({"waiting_for": waiting_for}))])
    }

    pub fn total_calls(&self) -> usize {
        self.call_counter.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmPort for ScriptedLlm {
    async fn generate(&self, _request: LlmRequest) -> Result<LlmResponse, LlmError> {
        self.call_counter.fetch_add(1, Ordering::SeqCst);
        let mut plain = self.plain.lock().unwrap_or_else(|e| e.into_inner());
        let content = if plain.is_empty() {
            String::new()
        } else {
            plain.remove(0)
        };
        Ok(LlmResponse {
            content,
            tool_calls: vec![],
            finish_reason: FinishReason::Stop,
            usage: None,
        })
    }

    async fn generate_with_tools(
        &self,
        _request: LlmRequest,
        _tools: Vec<ToolDefinition>,
    ) -> Result<LlmResponse, LlmError> {
        self.call_counter.fetch_add(1, Ordering::SeqCst);
        let mut steps = self.tool_steps.lock().unwrap_or_else(|e| e.into_inner());
        if steps.is_empty() {
            return Ok(LlmResponse {
                content: String::new(),
                tool_calls: vec![],
                finish_reason: FinishReason::Stop,
                usage: None,
            });
        }
        Ok(steps.remove(0))
    }
}

// ── Collecting frame sink ────────────────────────────────────────────────

/// Records every frame and turn-complete signal.
#[derive(Default)]
pub struct CollectingFrameSink {
    frames: Mutex<Vec<Frame>>,
    completions: Mutex<Vec<YieldKind>>,
}

impl CollectingFrameSink {
    pub fn frames(&self) -> Vec<Frame> {
        self.frames.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn completions(&self) -> Vec<YieldKind> {
        self.completions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl FrameSink for CollectingFrameSink {
    async fn emit(&self, _session_id: SessionId, frame: Frame) {
        self.frames
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(frame);
    }

    async fn turn_complete(&self, _session_id: SessionId, waiting_for: YieldKind) {
        self.completions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(waiting_for);
    }
}

// ── Sample package ───────────────────────────────────────────────────────

pub fn sample_package() -> StoryPackage {
    StoryPackage {
        id: PackageId::new("midnight-harbor"),
        title: "Midnight Harbor".to_string(),
        premise: "A courier arrives in a harbor town where the lighthouse went dark.".to_string(),
        acts: vec![
            Act {
                id: ActId::new("act-arrival"),
                title: "Arrival".to_string(),
                locations: vec![
                    Location {
                        id: LocationId::new("quay"),
                        name: "The Quay".to_string(),
                        description: "Fog, rope, and one lit lantern.".to_string(),
                        beats: vec![
                            "Make landfall and find the harbormaster".to_string(),
                            "Learn why the lighthouse is dark".to_string(),
                        ],
                        connections: vec![LocationId::new("tavern")],
                        encounters: vec![
                            Encounter {
                                id: EncounterId::new("customs-shakedown"),
                                title: "Customs shakedown".to_string(),
                                description: "Two officers want the satchel opened".to_string(),
                                priority: 3,
                            },
                            Encounter {
                                id: EncounterId::new("drowned-bell"),
                                title: "The drowned bell".to_string(),
                                description: "A bell tolls under the water".to_string(),
                                priority: 7,
                            },
                        ],
                        sandbox: false,
                    },
                    Location {
                        id: LocationId::new("tavern"),
                        name: "The Gutted Lamp".to_string(),
                        description: "Low beams, lower voices.".to_string(),
                        beats: vec!["Find the keeper's daughter".to_string()],
                        connections: vec![LocationId::new("quay")],
                        encounters: vec![],
                        sandbox: true,
                    },
                ],
            },
            Act {
                id: ActId::new("act-lighthouse"),
                title: "The Lighthouse".to_string(),
                locations: vec![Location {
                    id: LocationId::new("lighthouse"),
                    name: "The Lighthouse".to_string(),
                    description: "The lamp room smells of cold oil.".to_string(),
                    beats: vec![],
                    connections: vec![],
                    encounters: vec![],
                    sandbox: false,
                }],
            },
        ],
        world_info: vec![WorldInfoEntry {
            keys: vec!["lighthouse".to_string(), "keeper".to_string()],
            content: "The keeper was last seen rowing out on a flat sea.".to_string(),
        }],
        characters: vec![CharacterSeed {
            id: CharacterId::new("harbormaster"),
            name: "Harbormaster Venn".to_string(),
            default_location: Some(LocationId::new("quay")),
            default_disposition: "guarded".to_string(),
        }],
    }
}

// ── Wired harness ────────────────────────────────────────────────────────

pub struct TestHarness {
    pub store: Arc<MemoryStore>,
    pub frames: Arc<CollectingFrameSink>,
    pub plots: Arc<PlotStates>,
    pub runner: TurnRunner,
    pub session: SessionId,
    pub package_id: PackageId,
}

/// Wire a full turn runner over the in-memory store and a scripted LLM.
pub fn harness(package: StoryPackage, llm: Arc<ScriptedLlm>) -> TestHarness {
    harness_with_config(package, llm, StorytellerConfig::default())
}

pub fn harness_with_config(
    package: StoryPackage,
    llm: Arc<ScriptedLlm>,
    config: StorytellerConfig,
) -> TestHarness {
    let package_id = package.id.clone();
    let store = Arc::new(MemoryStore::new());
    store.put_package(package);

    let frames = Arc::new(CollectingFrameSink::default());
    let clock = Arc::new(SystemClock);
    let plots = Arc::new(PlotStates::new(
        Arc::new(PlotStateCache::new(store.clone())),
        clock,
    ));
    let combat = Arc::new(CombatEngine::new(store.clone()));
    let executor = ToolExecutor::new(
        plots.clone(),
        combat,
        store.clone(),
        frames.clone(),
    );
    let runner = TurnRunner::new(
        Arc::new(PackageCache::new(store.clone())),
        plots.clone(),
        Director::new(llm.clone()),
        Storyteller::new(llm.clone(), executor, frames.clone(), config),
        Arc::new(ContextCompressor::new(llm, CompressorConfig::default())),
        store.clone(),
        frames.clone(),
    );

    TestHarness {
        store,
        frames,
        plots,
        runner,
        session: SessionId::new(),
        package_id,
    }
}
