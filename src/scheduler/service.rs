//! The tick loop: scan for due tasks every five seconds and fire them.
//!
//! Due tasks fire concurrently - a slow agent turn must not delay a
//! reminder scheduled for the same tick.  Per-task failures are logged
//! and still advance `run_count`; nothing aborts the loop.

use std::{sync::Arc, time::Duration};

use chrono::Utc;
use futures::future::join_all;
use tokio::sync::watch;

use crate::adapters::AdapterClient;
use crate::agent::{AgentRunner, TurnRequest};
use crate::config::schema::SchedulerConfig;

use super::{
    store::TaskStore,
    types::{Task, TaskKind},
};

pub struct SchedulerService {
    store: Arc<TaskStore>,
    adapters: Arc<AdapterClient>,
    runner: Arc<dyn AgentRunner>,
    config: SchedulerConfig,
    stop_tx: watch::Sender<bool>,
    stop_rx: watch::Receiver<bool>,
}

impl SchedulerService {
    pub fn new(
        store: Arc<TaskStore>,
        adapters: Arc<AdapterClient>,
        runner: Arc<dyn AgentRunner>,
        config: SchedulerConfig,
    ) -> Arc<Self> {
        let (stop_tx, stop_rx) = watch::channel(false);
        Arc::new(Self {
            store,
            adapters,
            runner,
            config,
            stop_tx,
            stop_rx,
        })
    }

    /// Spawn the background tick task.  Overdue tasks (including ones
    /// accumulated while the process was down) fire on the first tick.
    pub fn start(self: &Arc<Self>) {
        let service = self.clone();
        let mut stop_rx = self.stop_rx.clone();

        tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval(Duration::from_secs(service.config.tick_secs));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            log::info!(
                "scheduler: tick loop started ({}s interval)",
                service.config.tick_secs
            );
            loop {
                tokio::select! {
                    _ = ticker.tick() => service.tick().await,
                    Ok(()) = stop_rx.changed() => {
                        if *stop_rx.borrow() {
                            log::info!("scheduler: tick loop stopped");
                            break;
                        }
                    }
                }
            }
        });
    }

    pub fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }

    /// One scan: fire every due task concurrently, then record outcomes.
    pub async fn tick(&self) {
        let now = Utc::now().timestamp();
        let due = self.store.due(now);
        if due.is_empty() {
            return;
        }
        log::info!("scheduler: {} task(s) due", due.len());

        let executions = due.into_iter().map(|task| async move {
            let id = task.id.clone();
            if let Err(e) = self.execute(&task).await {
                log::error!("scheduler: task {id} failed: {e}");
            }
            // Success or failure, the attempt counts and the task either
            // reschedules or retires.
            self.store.complete_run(&id, Utc::now().timestamp());
        });
        join_all(executions).await;
    }

    async fn execute(&self, task: &Task) -> Result<(), String> {
        log::info!(
            "scheduler: firing {} task {} (user={}, run #{})",
            task.task_type.as_str(),
            task.id,
            task.user_id,
            task.run_count + 1
        );

        match task.task_type {
            TaskKind::Message => {
                let kind = AdapterClient::kind_for_source(&task.source);
                let text = format!("⏰ Reminder: {}", task.content);
                tokio::time::timeout(
                    Duration::from_secs(self.config.message_timeout_secs),
                    self.adapters.send(kind, task.chat_id, &text),
                )
                .await
                .map_err(|_| "adapter send timed out".to_owned())?
            }
            TaskKind::Agent => {
                let request = TurnRequest {
                    user_id: task.user_id,
                    chat_id: task.chat_id,
                    message: task.content.clone(),
                    username: "scheduler".to_owned(),
                    chat_type: "private".to_owned(),
                    source: task.source.clone(),
                };
                let response = tokio::time::timeout(
                    Duration::from_secs(self.config.agent_timeout_secs),
                    self.runner.run_turn(request),
                )
                .await
                .map_err(|_| "agent turn timed out".to_owned())?;
                log::debug!("scheduler: agent task {} replied {} chars", task.id, response.len());

                // The turn's reply goes back to the originating chat.
                let kind = AdapterClient::kind_for_source(&task.source);
                if let Err(e) = self.adapters.send(kind, task.chat_id, &response).await {
                    log::warn!("scheduler: could not deliver agent reply: {e}");
                }
                Ok(())
            }
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
