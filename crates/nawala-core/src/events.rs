//! Engine events
//!
//! Both the check engine and the rotation service publish to one bounded
//! channel. When the channel is full new events are dropped with a warning;
//! the engines never block on a slow consumer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::warn;

use crate::model::{
    ProbeStatus, ResolverId, RotationReason, ShortlinkId, ShortlinkTargetId, TargetGroupId,
    TargetId,
};

/// A target's fused status changed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    /// Target identity
    pub target_id: TargetId,
    /// Domain or URL of the target
    pub target: String,
    /// Owning target group, used by notifiers to route
    pub group_id: Option<TargetGroupId>,
    /// Operator notes of the target
    pub notes: Option<String>,
    /// Status before the check
    pub old_status: ProbeStatus,
    /// Status after the check
    pub new_status: ProbeStatus,
    /// When the change was recorded
    pub changed_at: DateTime<Utc>,
}

impl StatusChange {
    /// The target moved from a non-blocked into a blocked status
    pub fn is_block(&self) -> bool {
        !self.old_status.is_blocked() && self.new_status.is_blocked()
    }

    /// The target moved from a blocked into a non-blocked status
    pub fn is_recovery(&self) -> bool {
        self.old_status.is_blocked() && !self.new_status.is_blocked()
    }
}

/// Events emitted by the engines
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// A target check finished and was committed
    CheckCompleted {
        target_id: TargetId,
        status: ProbeStatus,
        confidence: u8,
        resolver_count: usize,
    },

    /// A resolver probe failed outside the status machine and was excluded
    ResolverFailed {
        target_id: TargetId,
        resolver_id: ResolverId,
        error: String,
    },

    /// A target's fused status changed
    StatusChanged(StatusChange),

    /// A shortlink moved to another candidate
    Rotated {
        shortlink_id: ShortlinkId,
        from_target_id: Option<ShortlinkTargetId>,
        to_target_id: ShortlinkTargetId,
        reason: RotationReason,
    },

    /// An auto-rotation or auto-rollback sweep finished
    SweepCompleted {
        reason: RotationReason,
        examined: usize,
        rotated: usize,
    },
}

/// Sending half of the event channel
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: Option<mpsc::Sender<EngineEvent>>,
}

impl EventSink {
    /// Create a sink and its receiver
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<EngineEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx: Some(tx) }, rx)
    }

    /// A sink that discards everything
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// Emit an event without waiting
    pub fn emit(&self, event: EngineEvent) {
        let Some(tx) = &self.tx else {
            return;
        };

        match tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(
                    "Event channel full, dropping event. Consider increasing event_channel_capacity."
                );
            }
            // Receiver dropped: nobody is listening
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn change(old: ProbeStatus, new: ProbeStatus) -> StatusChange {
        StatusChange {
            target_id: 1,
            target: "example.com".to_string(),
            group_id: None,
            notes: None,
            old_status: old,
            new_status: new,
            changed_at: Utc::now(),
        }
    }

    #[test]
    fn test_block_and_recovery() {
        assert!(change(ProbeStatus::Ok, ProbeStatus::DnsFiltered).is_block());
        assert!(change(ProbeStatus::Unknown, ProbeStatus::Rst).is_block());
        assert!(change(ProbeStatus::HttpBlockpage, ProbeStatus::Ok).is_recovery());
        assert!(!change(ProbeStatus::Ok, ProbeStatus::Timeout).is_block());
        assert!(!change(ProbeStatus::Rst, ProbeStatus::DnsFiltered).is_recovery());
    }

    #[tokio::test]
    async fn test_full_channel_drops_events() {
        let (sink, mut rx) = EventSink::channel(1);
        let event = EngineEvent::SweepCompleted {
            reason: RotationReason::AutoRotation,
            examined: 0,
            rotated: 0,
        };
        sink.emit(event.clone());
        sink.emit(event.clone());

        assert_eq!(rx.recv().await, Some(event));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_disabled_sink_is_silent() {
        EventSink::disabled().emit(EngineEvent::SweepCompleted {
            reason: RotationReason::Rollback,
            examined: 0,
            rotated: 0,
        });
    }
}
