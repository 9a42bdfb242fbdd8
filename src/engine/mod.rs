//! The reasoning loop
//!
//! Orchestrates memory, planner, sandbox, and termination detection into the
//! Thought → Action → Observation cycle. `run` and `run_stream` share one
//! internal engine; `run` simply drains the stream. Each run is logically
//! single-threaded: no step begins before the previous step's observation is
//! recorded.

mod events;
pub(crate) mod termination;

use std::collections::VecDeque;
use std::pin::pin;
use std::sync::Arc;

use async_stream::stream;
use futures::{Stream, StreamExt};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::config::RunConfig;
use crate::error::AbortCause;
use crate::llm::{with_retry, LlmClient, RetryPolicy};
use crate::memory::{MemoryProvider, WindowMemory};
use crate::planner::{HybridPlanner, PlannedAction, RuleTable};
use crate::prompts;
use crate::tools::{Sandbox, ToolRegistry};
use crate::trajectory::{Action, Step, Task, TerminationSignal, Thought, Trajectory};

pub use events::RunEvent;
pub use termination::Phase;

/// What a finished run hands back: the answer (possibly best-effort or
/// empty on abort), the signal that ended the run, and the frozen
/// trajectory. A run never returns without one of these.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub answer: String,
    pub signal: TerminationSignal,
    pub trajectory: Trajectory,
}

/// Cooperative stop flag, checked at every suspension point.
#[derive(Clone)]
pub struct StopHandle {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl StopHandle {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self { tx: Arc::new(tx), rx }
    }

    /// Request a stop. Idempotent.
    pub fn stop(&self) {
        let _ = self.tx.send(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once a stop has been requested.
    pub async fn stopped(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

impl Default for StopHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Internal engine items: public events plus the final outcome.
enum EngineEvent {
    Event(RunEvent),
    Done(Box<RunOutcome>),
}

/// The Thought → Action → Observation loop for one or more runs.
///
/// The loop itself holds only read-only shared state; every call to `run`
/// or `run_stream` owns its trajectory exclusively, so independent runs may
/// execute fully in parallel.
pub struct ReasoningLoop {
    config: RunConfig,
    client: Arc<dyn LlmClient>,
    planner: HybridPlanner,
    sandbox: Sandbox,
    memory: Arc<dyn MemoryProvider>,
}

impl ReasoningLoop {
    pub fn new(config: RunConfig, client: Arc<dyn LlmClient>, registry: Arc<ToolRegistry>) -> Self {
        let retry = RetryPolicy::new(config.max_retries, config.backoff_base);
        let planner = HybridPlanner::new(
            client.clone(),
            registry.clone(),
            config.max_corrections,
            retry,
        );
        let sandbox = Sandbox::new(registry);
        let memory: Arc<dyn MemoryProvider> = Arc::new(
            WindowMemory::new(prompts::SYSTEM_ANCHOR).with_near_field_steps(config.near_field_steps),
        );
        Self {
            config,
            client,
            planner,
            sandbox,
            memory,
        }
    }

    pub fn with_memory(mut self, memory: Arc<dyn MemoryProvider>) -> Self {
        self.memory = memory;
        self
    }

    pub fn with_rules(mut self, rules: RuleTable) -> Self {
        self.planner.set_rules(rules);
        self
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Run a task to completion and return the outcome.
    pub async fn run(&self, task: Task) -> RunOutcome {
        self.run_with(task, StopHandle::new()).await
    }

    /// Run with an external stop handle for cooperative cancellation.
    pub async fn run_with(&self, task: Task, stop: StopHandle) -> RunOutcome {
        let mut events = pin!(self.events(task, stop));
        let mut outcome = None;
        while let Some(event) = events.next().await {
            if let EngineEvent::Done(done) = event {
                outcome = Some(*done);
            }
        }
        outcome.expect("engine stream always ends with an outcome")
    }

    /// Lazy, finite, non-restartable event sequence for one run. Terminates
    /// with exactly one `RunEvent::Terminated`.
    pub fn run_stream(&self, task: Task) -> impl Stream<Item = RunEvent> + Send + '_ {
        self.run_stream_with(task, StopHandle::new())
    }

    pub fn run_stream_with(
        &self,
        task: Task,
        stop: StopHandle,
    ) -> impl Stream<Item = RunEvent> + Send + '_ {
        self.events(task, stop).filter_map(|event| async move {
            match event {
                EngineEvent::Event(e) => Some(e),
                EngineEvent::Done(_) => None,
            }
        })
    }

    /// The shared engine. Yields public events in strict step order and
    /// finishes with the boxed outcome.
    fn events(&self, task: Task, stop: StopHandle) -> impl Stream<Item = EngineEvent> + Send + '_ {
        stream! {
            let retry = RetryPolicy::new(self.config.max_retries, self.config.backoff_base);
            let mut trajectory = Trajectory::new();
            let mut phase = Phase::Planning;
            let mut queue: VecDeque<(Thought, PlannedAction)> = VecDeque::new();
            let mut signal: Option<TerminationSignal> = None;
            let mut answer: Option<String> = None;

            'iterations: for iteration in 1..=self.config.max_iterations {
                if stop.is_stopped() {
                    signal = Some(TerminationSignal::Aborted(AbortCause::Cancelled));
                    break 'iterations;
                }

                // One bounded context per iteration; the anchor is always in it.
                let context = self.memory.context(&trajectory);

                let (thought, planned) = match queue.pop_front() {
                    Some((thought, planned)) => (thought, Some(planned)),
                    None => {
                        let decision = tokio::select! {
                            biased;
                            _ = stop.stopped() => {
                                debug!(iteration, "cancelled while awaiting planner");
                                signal = Some(TerminationSignal::Aborted(AbortCause::Cancelled));
                                break 'iterations;
                            }
                            result = self.planner.decide(&task, &trajectory, &context) => match result {
                                Ok(decision) => decision,
                                Err(err) => {
                                    error!(iteration, error = %err, "planner failed");
                                    signal = Some(TerminationSignal::Aborted(err.into()));
                                    break 'iterations;
                                }
                            }
                        };

                        let mut actions = decision.actions.into_iter();
                        let first = actions.next();
                        for planned in actions {
                            let tool = planned.action.tool().unwrap_or("FINISH").to_string();
                            queue.push_back((
                                format!("Continue the planned sequence with `{tool}`.").into(),
                                planned,
                            ));
                        }
                        (decision.thought, first)
                    }
                };

                yield EngineEvent::Event(RunEvent::ThoughtDelta {
                    iteration,
                    text: thought.to_string(),
                });

                // Terminal decisions are finalized before anything is dispatched.
                let action_ref = planned.as_ref().map(|p| &p.action);
                if let Some(terminal) = termination::detect(thought.as_str(), action_ref) {
                    let extracted = termination::extract_final_answer(thought.as_str());
                    answer = Some(match &terminal {
                        TerminationSignal::FinalAnswer(text) => text.clone(),
                        _ => extracted,
                    });
                    trajectory.push(Step {
                        thought,
                        action: planned.map(|p| p.action).unwrap_or(Action::Finish),
                        observation: None,
                    });
                    signal = Some(terminal);
                    break 'iterations;
                }

                let Some(planned) = planned else {
                    // Validation keeps this unreachable; never guess an action.
                    warn!(iteration, "planner produced no action and no terminal marker");
                    answer = Some(termination::extract_final_answer(thought.as_str()));
                    trajectory.push(Step {
                        thought,
                        action: Action::Finish,
                        observation: None,
                    });
                    signal = Some(TerminationSignal::FinalAnswer(
                        answer.clone().unwrap_or_default(),
                    ));
                    break 'iterations;
                };

                yield EngineEvent::Event(RunEvent::ActionDispatched {
                    iteration,
                    action: planned.action.clone(),
                });
                phase = phase.on_action_dispatched();

                let observation = tokio::select! {
                    biased;
                    _ = stop.stopped() => {
                        // The in-flight tool future is dropped; any result it
                        // would have produced is discarded.
                        debug!(iteration, "cancelled while awaiting tool");
                        signal = Some(TerminationSignal::Aborted(AbortCause::Cancelled));
                        break 'iterations;
                    }
                    observation = self.sandbox.execute(&planned.action, &self.config.allowed_tools) => observation,
                };

                yield EngineEvent::Event(RunEvent::ObservationReceived {
                    iteration,
                    observation: observation.clone(),
                });
                phase = phase.on_observation();

                let succeeded = observation.is_success();
                let observed_text = observation.to_string();
                trajectory.push(Step {
                    thought,
                    action: planned.action,
                    observation: Some(observation),
                });

                if planned.answer_from_observation && succeeded {
                    answer = Some(observed_text.clone());
                    signal = Some(TerminationSignal::FinalAnswer(observed_text));
                    break 'iterations;
                }
            }

            if signal.is_none() {
                // Iteration cap hit without a terminal marker: a defined
                // outcome, not an error. Synthesize a best-effort answer from
                // the observations, falling back to the most recent thought.
                let fallback = trajectory
                    .last_thought()
                    .map(|t| t.to_string())
                    .unwrap_or_else(|| prompts::NO_ANSWER.to_string());
                let observations: Vec<String> = trajectory
                    .steps()
                    .iter()
                    .filter_map(|s| s.observation.as_ref().map(ToString::to_string))
                    .collect();

                let mut synthesized = None;
                if !observations.is_empty() && !stop.is_stopped() {
                    let prompt = prompts::final_answer_prompt(&task, &observations);
                    match with_retry(&retry, "final answer", || {
                        self.client.complete_stream(&prompt)
                    })
                    .await
                    {
                        Ok(mut tokens) => {
                            let mut buf = String::new();
                            let mut broken = false;
                            while let Some(token) = tokens.next().await {
                                match token {
                                    Ok(text) => {
                                        buf.push_str(&text);
                                        yield EngineEvent::Event(RunEvent::ThoughtDelta {
                                            iteration: self.config.max_iterations,
                                            text,
                                        });
                                    }
                                    Err(err) => {
                                        warn!(error = %err, "answer synthesis stream broke off");
                                        broken = true;
                                        break;
                                    }
                                }
                            }
                            let buf = buf.trim();
                            if !broken && !buf.is_empty() {
                                synthesized = Some(buf.to_string());
                            }
                        }
                        Err(err) => {
                            warn!(error = %err, "answer synthesis failed, using last thought");
                        }
                    }
                }

                answer = Some(synthesized.unwrap_or(fallback));
                signal = Some(TerminationSignal::MaxIterationsReached);
            }

            let signal = signal.take().unwrap_or(TerminationSignal::MaxIterationsReached);
            phase = if signal.is_aborted() {
                phase.on_abort()
            } else {
                phase.on_terminal()
            };
            trajectory.freeze();

            let answer = answer.unwrap_or_default();
            info!(
                steps = trajectory.len(),
                ?phase,
                signal = ?signal,
                "run finalized"
            );

            yield EngineEvent::Event(RunEvent::Terminated {
                signal: signal.clone(),
                answer: answer.clone(),
            });
            yield EngineEvent::Done(Box::new(RunOutcome {
                answer,
                signal,
                trajectory,
            }));
        }
    }
}
