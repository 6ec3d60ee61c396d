//! Orchestrator: drives rounds of concurrent chunk classifications.
//!
//! Rounds run strictly sequentially; chunks inside a round run concurrently
//! with no defined completion order. Cancellation is cooperative and takes
//! effect at round boundaries — in-flight requests are not aborted, and
//! outcomes computed before the flag was observed are still merged.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;

use crate::aggregate::ResultAggregator;
use crate::client::BatchClassifier;
use crate::error::ScreenError;
use crate::keypool::CredentialPool;
use crate::planner::plan;
use crate::types::{ClassificationItem, RunState, RunStatusEvent};

/// Upper bound of the random wait before the first round.
pub const START_JITTER_MAX: Duration = Duration::from_millis(2000);

/// Advisory stop signal, shared between the caller and a running screen.
#[derive(Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Progress callback invoked after state transitions.
pub type ProgressFn<'a> = &'a dyn Fn(RunStatusEvent);

/// Drives a full screening run over one item backlog.
pub struct Orchestrator {
    classifier: BatchClassifier,
    rng: Arc<dyn crate::keypool::RandomSource>,
}

impl Orchestrator {
    pub fn new(classifier: BatchClassifier, rng: Arc<dyn crate::keypool::RandomSource>) -> Self {
        Self { classifier, rng }
    }

    /// Run rounds until the backlog is exhausted, the caller cancels, or the
    /// credential pool dies. Returns the final run state; `PoolExhausted` is
    /// the only error surfaced, and everything merged before the failure is
    /// preserved in `aggregator`.
    pub async fn run(
        &self,
        items: &[ClassificationItem],
        pool: &CredentialPool,
        aggregator: &mut ResultAggregator,
        cancel: &CancelFlag,
        progress: Option<ProgressFn<'_>>,
    ) -> Result<RunState, ScreenError> {
        if pool.is_empty() {
            return Err(ScreenError::NoCredentials);
        }

        let config = self.classifier.config();
        let rounds = plan(items, config.chunk_size, config.mode.concurrency());

        let mut state = RunState {
            total: items.len() as u32,
            total_rounds: rounds.len() as u32,
            ..RunState::default()
        };

        emit(
            progress,
            RunStatusEvent::Started {
                total_items: state.total,
                total_rounds: state.total_rounds,
            },
        );

        if config.start_jitter {
            tokio::time::sleep(self.rng.jitter(START_JITTER_MAX)).await;
        }

        let inter_round_delay = config.mode.inter_round_delay();

        for (round_idx, round) in rounds.iter().enumerate() {
            if cancel.is_cancelled() {
                state.cancelled = true;
                break;
            }
            state.current_round = round_idx as u32 + 1;

            tracing::debug!(
                round = state.current_round,
                total_rounds = state.total_rounds,
                chunks = round.chunks.len(),
                "dispatching round"
            );

            let futures = round
                .chunks
                .iter()
                .map(|chunk| self.classifier.classify_batch(chunk, pool, cancel));
            let results = join_all(futures).await;

            // Merge every completed sibling before acting on a fatal error:
            // one chunk dying must not discard the others' outcomes.
            let mut fatal = false;
            for (chunk, result) in round.chunks.iter().zip(results) {
                match result {
                    Ok(outcomes) => {
                        aggregator.merge(chunk, &outcomes);
                        state.processed += chunk.len() as u32;
                    }
                    Err(ScreenError::PoolExhausted) => fatal = true,
                    Err(ScreenError::Cancelled) => state.cancelled = true,
                    // classify_batch converts everything else into
                    // Error-filled outcome maps.
                    Err(e) => {
                        tracing::warn!(error = %e, "unexpected chunk error");
                    }
                }
            }

            state.found = aggregator.significant_count();
            state.errors = aggregator.error_count();
            state.dead_credentials = pool.removed_count();

            if fatal {
                tracing::warn!(
                    processed = state.processed,
                    "credential pool exhausted, stopping run"
                );
                emit(
                    progress,
                    RunStatusEvent::FatallyStopped {
                        state: state.clone(),
                    },
                );
                return Err(ScreenError::PoolExhausted);
            }

            emit(
                progress,
                RunStatusEvent::RoundCompleted {
                    state: state.clone(),
                },
            );

            if state.cancelled {
                break;
            }
            if round_idx + 1 < rounds.len() {
                tokio::time::sleep(inter_round_delay).await;
            }
        }

        state.cancelled = state.cancelled || cancel.is_cancelled();
        tracing::info!(
            processed = state.processed,
            found = state.found,
            errors = state.errors,
            cancelled = state.cancelled,
            "screening run finished"
        );
        emit(
            progress,
            RunStatusEvent::Completed {
                state: state.clone(),
            },
        );
        Ok(state)
    }
}

fn emit(progress: Option<ProgressFn<'_>>, event: RunStatusEvent) {
    if let Some(f) = progress {
        f(event);
    }
}
