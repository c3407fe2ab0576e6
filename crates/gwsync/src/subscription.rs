//! Caller-side handle for one bus topic.
//!
//! A [`Subscription`] is the blocking read surface of the correlation bus:
//! synchronous request wrappers call [`recv_timeout`](Subscription::recv_timeout)
//! once, streaming wrappers iterate. Dropping the handle unsubscribes, which
//! is the cancellation primitive for streaming requests; frames published
//! after that are silently dropped by the bus.

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};
use gwsync_core::error::GwError;
use gwsync_core::wire;
use serde::de::DeserializeOwned;

use crate::bus::{EventBus, Topic};

/// A live subscription to one bus topic.
pub struct Subscription {
    bus: Arc<EventBus>,
    topic: Topic,
    token: u64,
    rx: Receiver<String>,
    cancelled: std::sync::atomic::AtomicBool,
}

impl Subscription {
    pub(crate) fn new(bus: Arc<EventBus>, topic: Topic, token: u64, rx: Receiver<String>) -> Self {
        Self {
            bus,
            topic,
            token,
            rx,
            cancelled: std::sync::atomic::AtomicBool::new(false),
        }
    }

    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    /// Block until the next frame arrives.
    pub fn recv(&self) -> Result<String, GwError> {
        self.rx.recv().map_err(|_| GwError::SubscriptionClosed)
    }

    /// Block until the next frame arrives or the deadline passes.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<String, GwError> {
        self.rx.recv_timeout(timeout).map_err(|e| match e {
            RecvTimeoutError::Timeout => GwError::Timeout,
            RecvTimeoutError::Disconnected => GwError::SubscriptionClosed,
        })
    }

    /// Non-blocking read.
    pub fn try_recv(&self) -> Option<String> {
        self.rx.try_recv().ok()
    }

    /// Blocking iterator over frames until the subscription disconnects.
    pub fn iter(&self) -> impl Iterator<Item = String> + '_ {
        self.rx.iter()
    }

    /// Wait for one frame and decode it, translating error frames into
    /// [`GwError::Gateway`]. Warning frames can precede the real reply on the
    /// request's own topic; they are logged and skipped. `timeout` bounds the
    /// whole wait.
    pub fn recv_decoded<T: DeserializeOwned>(&self, timeout: Duration) -> Result<T, GwError> {
        let deadline = std::time::Instant::now() + timeout;
        loop {
            let remaining = deadline
                .checked_duration_since(std::time::Instant::now())
                .ok_or(GwError::Timeout)?;
            let frame = self.recv_timeout(remaining)?;
            if let Some(cm) = wire::as_error(&frame) {
                let cm = cm?;
                if cm.is_warning() {
                    tracing::warn!(code = cm.code, msg = %cm.message, topic = %self.topic, "gateway warning");
                    continue;
                }
                return Err(GwError::from_code_msg(&cm));
            }
            let (_, body) = wire::split_frame(&frame)?;
            return wire::decode(body);
        }
    }

    /// Collect the bodies of a finite stream: frames until the terminal
    /// `"end"` marker. An error frame aborts the wait with a typed error.
    /// `timeout` bounds the whole collection, not each frame.
    pub fn collect_until_end(&self, timeout: Duration) -> Result<Vec<String>, GwError> {
        let deadline = std::time::Instant::now() + timeout;
        let mut out = Vec::new();
        loop {
            let remaining = deadline
                .checked_duration_since(std::time::Instant::now())
                .ok_or(GwError::Timeout)?;
            let frame = self.recv_timeout(remaining)?;
            if wire::is_end(&frame) {
                return Ok(out);
            }
            if let Some(cm) = wire::as_error(&frame) {
                let cm = cm?;
                if cm.is_warning() {
                    tracing::warn!(code = cm.code, msg = %cm.message, topic = %self.topic, "gateway warning");
                    continue;
                }
                return Err(GwError::from_code_msg(&cm));
            }
            out.push(frame);
        }
    }

    /// Unsubscribe now instead of at drop time. Idempotent.
    pub fn cancel(&self) {
        if !self
            .cancelled
            .swap(true, std::sync::atomic::Ordering::AcqRel)
        {
            self.bus.unsubscribe(&self.topic, self.token);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("topic", &self.topic)
            .field("token", &self.token)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gwsync_core::error::CodeMsg;
    use gwsync_core::types::Bar;

    #[test]
    fn recv_decoded_returns_payload() {
        let bus = EventBus::new();
        let sub = bus.subscribe(11);
        let bar = Bar {
            date: "20250117".into(),
            close: 101.5,
            ..Default::default()
        };
        bus.publish(11, &wire::tagged("bar", &bar).unwrap());
        let got: Bar = sub.recv_decoded(Duration::from_secs(1)).unwrap();
        assert_eq!(got, bar);
    }

    #[test]
    fn recv_decoded_translates_error_frames() {
        let bus = EventBus::new();
        let sub = bus.subscribe(12);
        bus.publish(12, &wire::error_frame(&CodeMsg::new(321, "bad request")));
        let err = sub.recv_decoded::<Bar>(Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, GwError::Gateway { code: 321, .. }));
    }

    #[test]
    fn recv_decoded_skips_warning_frames() {
        let bus = EventBus::new();
        let sub = bus.subscribe(18);
        bus.publish(
            18,
            &wire::error_frame(&CodeMsg::new(10167, "displaying delayed data")),
        );
        let bar = Bar {
            date: "20250117".into(),
            close: 99.0,
            ..Default::default()
        };
        bus.publish(18, &wire::tagged("bar", &bar).unwrap());
        let got: Bar = sub.recv_decoded(Duration::from_secs(1)).unwrap();
        assert_eq!(got, bar);
    }

    #[test]
    fn collect_until_end_gathers_data_frames() {
        let bus = EventBus::new();
        let sub = bus.subscribe_with_buffer(13, 16);
        bus.publish(13, "bar::{}");
        bus.publish(13, "bar::{}");
        bus.publish(13, wire::END_MARKER);
        let frames = sub.collect_until_end(Duration::from_secs(1)).unwrap();
        assert_eq!(frames.len(), 2);
    }

    #[test]
    fn collect_until_end_skips_warnings_but_fails_on_errors() {
        let bus = EventBus::new();
        let sub = bus.subscribe_with_buffer(14, 16);
        bus.publish(14, &wire::error_frame(&CodeMsg::new(2104, "farm ok")));
        bus.publish(14, "bar::{}");
        bus.publish(14, &wire::error_frame(&CodeMsg::new(162, "query failed")));
        let err = sub.collect_until_end(Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, GwError::Gateway { code: 162, .. }));
    }

    #[test]
    fn timeout_is_reported() {
        let bus = EventBus::new();
        let sub = bus.subscribe(15);
        let err = sub.recv_timeout(Duration::from_millis(10)).unwrap_err();
        assert!(matches!(err, GwError::Timeout));
    }

    #[test]
    fn cancel_is_idempotent() {
        let bus = EventBus::new();
        let sub = bus.subscribe(16);
        sub.cancel();
        sub.cancel();
        assert_eq!(bus.subscriber_count(16), 0);
    }
}
