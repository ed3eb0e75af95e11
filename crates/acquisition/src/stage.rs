//! Concurrent stage execution with per-stage deadlines.
//!
//! Each fetch attempt spawns its stages up front and then collects them one
//! at a time, giving every stage its own wall-clock budget. A stage that
//! misses its deadline is abandoned, not aborted: the handle is dropped and
//! the task keeps running detached, so a slow download cannot corrupt the
//! attempt that replaces it mid-write.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::warn;

use storm_common::{StormError, StormResult};

/// Result of waiting on one named stage.
#[derive(Debug)]
pub struct StageOutcome {
    pub name: &'static str,
    pub result: StormResult<()>,
}

impl StageOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// A set of named spawned stages.
#[derive(Default)]
pub struct TaskGroup {
    tasks: Vec<(&'static str, JoinHandle<StormResult<()>>)>,
}

impl TaskGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Spawns a stage onto the runtime.
    pub fn spawn<F>(&mut self, name: &'static str, fut: F)
    where
        F: Future<Output = StormResult<()>> + Send + 'static,
    {
        self.tasks.push((name, tokio::spawn(fut)));
    }

    /// Waits up to `deadline` for the named stage. On timeout the stage is
    /// left running detached and reported as [`StormError::Timeout`].
    pub async fn join(&mut self, name: &str, deadline: Duration) -> StageOutcome {
        let Some(pos) = self.tasks.iter().position(|(n, _)| *n == name) else {
            return StageOutcome {
                name: "unknown",
                result: Err(StormError::NotFound(format!("no stage named {}", name))),
            };
        };
        let (name, handle) = self.tasks.remove(pos);
        StageOutcome {
            name,
            result: Self::wait(name, handle, deadline).await,
        }
    }

    /// Drains every remaining stage, each with its own deadline.
    pub async fn join_remaining(&mut self, deadline: Duration) -> Vec<StageOutcome> {
        let mut outcomes = Vec::with_capacity(self.tasks.len());
        for (name, handle) in self.tasks.drain(..) {
            outcomes.push(StageOutcome {
                name,
                result: Self::wait(name, handle, deadline).await,
            });
        }
        outcomes
    }

    async fn wait(
        name: &'static str,
        handle: JoinHandle<StormResult<()>>,
        deadline: Duration,
    ) -> StormResult<()> {
        match timeout(deadline, handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(StormError::Io(format!(
                "stage {} panicked: {}",
                name, join_err
            ))),
            Err(_) => {
                warn!(stage = name, secs = deadline.as_secs(), "Stage missed its deadline");
                Err(StormError::Timeout {
                    stage: name.to_string(),
                    secs: deadline.as_secs(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stages_join_with_their_results() {
        let mut group = TaskGroup::new();
        group.spawn("ok", async { Ok(()) });
        group.spawn("bad", async { Err(StormError::MissingData("scan".into())) });

        let ok = group.join("ok", Duration::from_secs(1)).await;
        assert!(ok.is_ok());
        let bad = group.join("bad", Duration::from_secs(1)).await;
        assert!(matches!(bad.result, Err(StormError::MissingData(_))));
        assert!(group.is_empty());
    }

    #[tokio::test]
    async fn slow_stage_times_out_and_is_abandoned() {
        let mut group = TaskGroup::new();
        group.spawn("slow", async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(())
        });

        let outcome = group.join("slow", Duration::from_millis(20)).await;
        assert!(matches!(
            outcome.result,
            Err(StormError::Timeout { ref stage, .. }) if stage == "slow"
        ));
        assert!(group.is_empty());
    }

    #[tokio::test]
    async fn unknown_stage_is_reported_not_hung() {
        let mut group = TaskGroup::new();
        let outcome = group.join("ghost", Duration::from_secs(1)).await;
        assert!(matches!(outcome.result, Err(StormError::NotFound(_))));
    }

    #[tokio::test]
    async fn join_remaining_drains_in_spawn_order() {
        let mut group = TaskGroup::new();
        group.spawn("a", async { Ok(()) });
        group.spawn("b", async { Ok(()) });

        let outcomes = group.join_remaining(Duration::from_secs(1)).await;
        let names: Vec<_> = outcomes.iter().map(|o| o.name).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert!(outcomes.iter().all(|o| o.is_ok()));
    }

    #[tokio::test]
    async fn panicking_stage_surfaces_as_an_error() {
        let mut group = TaskGroup::new();
        group.spawn("boom", async { panic!("stage blew up") });

        let outcome = group.join("boom", Duration::from_secs(1)).await;
        assert!(matches!(outcome.result, Err(StormError::Io(_))));
    }
}
