//! Cancellation token and the event stream a run reports through.

use crate::domain::model::RunSummary;
use crate::utils::error::ErrorSeverity;
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Cooperative stop flag shared between the caller and the pipeline task.
/// Set once, never reset.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// 進度訊息
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    ClientConfigured { model: String },
    DatasetLoaded { file_name: String },
    RowsFound { total: usize },
    RowStarted { index: usize, total: usize, username: String },
    RowFailed { index: usize, username: String, error: String },
    Stopped,
}

impl ProgressEvent {
    pub fn is_warning(&self) -> bool {
        matches!(self, Self::RowFailed { .. })
    }
}

impl fmt::Display for ProgressEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ClientConfigured { model } => write!(f, "{} API configured successfully.", model),
            Self::DatasetLoaded { file_name } => write!(f, "Successfully loaded {}.", file_name),
            Self::RowsFound { total } => write!(f, "Found {} rows to analyze.", total),
            Self::RowStarted {
                index,
                total,
                username,
            } => write!(f, "Analyzing row {}/{}: {}...", index + 1, total, username),
            Self::RowFailed {
                index,
                username,
                error,
            } => write!(
                f,
                "Warning: API call failed for row {} ({}). Error: {}",
                index + 1,
                username,
                error
            ),
            Self::Stopped => write!(f, "Analysis stopped by user."),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    Progress(ProgressEvent),
    Finished { summary: RunSummary },
    Failed { message: String },
    Cancelled,
}

impl PipelineEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Progress(_))
    }
}

/// How a run ended. Exactly one per run.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Completed(RunSummary),
    Cancelled,
    /// `severity` 來自造成失敗的錯誤，供前端決定退出碼
    Failed { message: String, severity: ErrorSeverity },
}

impl RunOutcome {
    pub fn output_path(&self) -> Option<&PathBuf> {
        match self {
            Self::Completed(summary) => Some(&summary.output_path),
            _ => None,
        }
    }

    pub fn into_event(self) -> PipelineEvent {
        match self {
            Self::Completed(summary) => PipelineEvent::Finished { summary },
            Self::Cancelled => PipelineEvent::Cancelled,
            Self::Failed { message, .. } => PipelineEvent::Failed { message },
        }
    }
}

/// Sending half of the event stream. A dropped receiver is not an error:
/// the run keeps going and its outcome is still returned from the task.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: Option<mpsc::UnboundedSender<PipelineEvent>>,
}

impl EventSender {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<PipelineEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// 不接收事件的 sender，用於測試與批次呼叫
    pub fn discard() -> Self {
        Self { tx: None }
    }

    pub fn progress(&self, event: ProgressEvent) {
        if event.is_warning() {
            tracing::warn!("⚠️ {}", event);
        } else {
            tracing::info!("{}", event);
        }
        self.send(PipelineEvent::Progress(event));
    }

    pub fn send(&self, event: PipelineEvent) {
        if let Some(tx) = &self.tx {
            if tx.send(event).is_err() {
                tracing::debug!("Event receiver dropped");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancellation_token_shared_between_clones() {
        let token = CancellationToken::new();
        let other = token.clone();
        assert!(!other.is_cancelled());

        token.cancel();
        assert!(other.is_cancelled());

        token.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_progress_messages() {
        let started = ProgressEvent::RowStarted {
            index: 0,
            total: 3,
            username: "ada".to_string(),
        };
        assert_eq!(started.to_string(), "Analyzing row 1/3: ada...");
        assert!(!started.is_warning());

        let failed = ProgressEvent::RowFailed {
            index: 1,
            username: "bob".to_string(),
            error: "timeout".to_string(),
        };
        assert!(failed.to_string().contains("row 2 (bob)"));
        assert!(failed.is_warning());
    }

    #[tokio::test]
    async fn test_events_arrive_in_order() {
        let (sender, mut rx) = EventSender::channel();
        sender.progress(ProgressEvent::RowsFound { total: 2 });
        sender.send(PipelineEvent::Cancelled);
        drop(sender);

        assert_eq!(
            rx.recv().await,
            Some(PipelineEvent::Progress(ProgressEvent::RowsFound { total: 2 }))
        );
        let terminal = rx.recv().await.unwrap();
        assert!(terminal.is_terminal());
        assert_eq!(rx.recv().await, None);
    }

    #[test]
    fn test_discard_sender_does_not_panic() {
        EventSender::discard().progress(ProgressEvent::Stopped);
    }
}
