use flume::{bounded, Receiver, Sender};
use tracing::{debug, error, info, warn};

use crate::config::HistoryConfig;
use crate::database::models::TurnRecord;
use crate::services::history_service::HistoryService;
use crate::utils::error::AnswerError;

/// Background persistence of completed turns.
///
/// Enqueue never blocks the request path; a full queue or a failed write is
/// logged and the turn is dropped.
#[derive(Clone)]
pub struct HistoryWriter {
    sender: Sender<TurnRecord>,
}

impl HistoryWriter {
    pub fn new(history: HistoryService, config: &HistoryConfig) -> Self {
        let (sender, receiver) = bounded(config.queue_capacity.max(1));
        let worker_count = config.worker_count.max(1);

        info!(
            "Initializing HistoryWriter: queue={}, workers={}",
            config.queue_capacity, worker_count
        );

        for worker_id in 0..worker_count {
            let history = history.clone();
            let receiver = receiver.clone();

            tokio::spawn(async move {
                Self::worker_loop(worker_id, history, receiver).await;
            });
        }

        Self { sender }
    }

    /// Fire-and-forget
    pub fn enqueue(&self, turn: TurnRecord) {
        if let Err(e) = self.sender.try_send(turn) {
            warn!("Failed to enqueue turn for persistence ({} pending): {}", self.pending(), e);
        }
    }

    pub fn pending(&self) -> usize {
        self.sender.len()
    }

    async fn worker_loop(worker_id: usize, history: HistoryService, receiver: Receiver<TurnRecord>) {
        info!("History worker {} started", worker_id);

        while let Ok(turn) = receiver.recv_async().await {
            let start = std::time::Instant::now();
            match Self::persist(&history, &turn).await {
                Ok(()) => debug!(
                    "Worker {} persisted turn for session {} in {:?}",
                    worker_id,
                    turn.session_id,
                    start.elapsed()
                ),
                Err(e) => error!(
                    "Worker {} failed to persist turn for session {} ({}): {}",
                    worker_id,
                    turn.session_id,
                    e.code(),
                    e
                ),
            }
        }

        info!("History worker {} shutting down (channel closed)", worker_id);
    }

    async fn persist(history: &HistoryService, turn: &TurnRecord) -> Result<(), AnswerError> {
        history
            .save_turn(turn)
            .await
            .map_err(|e| AnswerError::Persistence(format!("{:#}", e)))
    }
}
