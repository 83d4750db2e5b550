//! Retry-until-confirmed close loop.
//!
//! One webhook alert drives exactly one loop run. Each iteration verifies
//! live position state first, so a close that succeeded out-of-band (or on
//! a previous attempt whose response was lost) ends the loop without
//! another order. Every attempt re-signs with a fresh timestamp, so no
//! signed request is ever reused.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::RetryConfig;
use crate::domain::{
    CloseReport, CloseResolution, NotificationEvent, OrderIntent, OutcomeClass,
};
use crate::exchange::ExchangeAdapter;
use crate::services::{NotificationSink, PositionVerifier};

struct RetryState {
    attempt: u64,
    started_at: Instant,
}

pub struct PositionCloser {
    adapter: Arc<dyn ExchangeAdapter>,
    verifier: PositionVerifier,
    sink: Arc<dyn NotificationSink>,
    retry: RetryConfig,
    shutdown: watch::Receiver<bool>,
}

impl PositionCloser {
    pub fn new(
        adapter: Arc<dyn ExchangeAdapter>,
        sink: Arc<dyn NotificationSink>,
        retry: RetryConfig,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            verifier: PositionVerifier::new(adapter.clone()),
            adapter,
            sink,
            retry,
            shutdown,
        }
    }

    pub async fn run(mut self, intent: OrderIntent) -> CloseReport {
        let mut state = RetryState {
            attempt: 0,
            started_at: Instant::now(),
        };
        let mut consecutive_rejects: u32 = 0;

        info!(
            exchange = %intent.exchange,
            symbol = %intent.symbol,
            side = %intent.side,
            qty = %intent.quantity,
            "close loop started"
        );

        loop {
            if *self.shutdown.borrow() {
                info!(attempts = state.attempt, "close loop cancelled by shutdown");
                return self.finish(intent, CloseResolution::Cancelled, state.attempt);
            }

            if !self.verifier.is_open(&intent.symbol).await {
                info!(attempts = state.attempt, "position verified closed");
                self.sink
                    .notify(&Self::success_event(&intent, state.attempt))
                    .await;
                return self.finish(intent, CloseResolution::Confirmed, state.attempt);
            }

            state.attempt += 1;
            match self
                .adapter
                .place_market_order(&intent.symbol, intent.side, intent.quantity)
                .await
            {
                Ok(outcome) if outcome.is_filled() => {
                    info!(attempts = state.attempt, "close order accepted");
                    self.sink
                        .notify(&Self::success_event(&intent, state.attempt))
                        .await;
                    return self.finish(intent, CloseResolution::Confirmed, state.attempt);
                }
                Ok(outcome) if outcome.class == OutcomeClass::Rejected => {
                    consecutive_rejects += 1;
                    warn!(
                        attempt = state.attempt,
                        status = outcome.http_status,
                        body = %outcome.raw_body,
                        rejects = consecutive_rejects,
                        "close order rejected"
                    );
                    if consecutive_rejects >= self.retry.reject_cutoff {
                        self.sink
                            .notify(&Self::gave_up_event(
                                &intent,
                                state.attempt,
                                "the exchange rejected the order as permanently invalid",
                            ))
                            .await;
                        return self.finish(intent, CloseResolution::GaveUp, state.attempt);
                    }
                }
                Ok(outcome) => {
                    consecutive_rejects = 0;
                    debug!(
                        attempt = state.attempt,
                        status = outcome.http_status,
                        body = %outcome.raw_body,
                        "close attempt failed; will retry"
                    );
                }
                Err(e) => {
                    consecutive_rejects = 0;
                    warn!(attempt = state.attempt, error = %e, "close attempt errored; will retry");
                }
            }

            if self.retry.escalation_milestones.contains(&state.attempt) {
                self.sink
                    .notify(&Self::milestone_event(&intent, state.attempt))
                    .await;
            }

            if let Some(cap) = self.retry.max_attempts {
                if state.attempt >= cap {
                    self.sink
                        .notify(&Self::gave_up_event(
                            &intent,
                            state.attempt,
                            "the configured attempt cap was reached",
                        ))
                        .await;
                    return self.finish(intent, CloseResolution::GaveUp, state.attempt);
                }
            }
            if let Some(cap_secs) = self.retry.max_duration_secs {
                if state.started_at.elapsed() >= Duration::from_secs(cap_secs) {
                    self.sink
                        .notify(&Self::gave_up_event(
                            &intent,
                            state.attempt,
                            "the configured duration cap was reached",
                        ))
                        .await;
                    return self.finish(intent, CloseResolution::GaveUp, state.attempt);
                }
            }

            tokio::select! {
                _ = sleep(Duration::from_millis(self.retry.attempt_interval_ms)) => {}
                _ = self.shutdown.changed() => {}
            }
        }
    }

    fn finish(&self, intent: OrderIntent, resolution: CloseResolution, attempts: u64) -> CloseReport {
        CloseReport {
            intent,
            resolution,
            attempts,
        }
    }

    fn success_event(intent: &OrderIntent, attempts: u64) -> NotificationEvent {
        let body = if attempts == 0 {
            format!(
                "{} position on {} was already closed; no order was needed.",
                intent.symbol, intent.exchange
            )
        } else {
            format!(
                "Close order for {} on {} succeeded on attempt {}.",
                intent.symbol, intent.exchange, attempts
            )
        };
        NotificationEvent {
            subject: format!("✅ Close confirmed: {} {}", intent.exchange, intent.symbol),
            body,
            trigger_attempt: Some(attempts),
        }
    }

    fn milestone_event(intent: &OrderIntent, attempt: u64) -> NotificationEvent {
        NotificationEvent {
            subject: format!("⚠️ Close still failing: {} {}", intent.exchange, intent.symbol),
            body: format!(
                "Close order for {} on {} has failed {} consecutive attempts; still retrying.",
                intent.symbol, intent.exchange, attempt
            ),
            trigger_attempt: Some(attempt),
        }
    }

    fn gave_up_event(intent: &OrderIntent, attempt: u64, reason: &str) -> NotificationEvent {
        NotificationEvent {
            subject: format!("🛑 Close abandoned: {} {}", intent.exchange, intent.symbol),
            body: format!(
                "Close loop for {} on {} stopped after {} attempts: {}. The position may still be open.",
                intent.symbol, intent.exchange, attempt, reason
            ),
            trigger_attempt: Some(attempt),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use rust_decimal_macros::dec;

    use crate::domain::{OrderOutcome, OrderSide};
    use crate::exchange::{ExchangeKind, MockExchangeAdapter};

    struct RecordingSink {
        events: Mutex<Vec<NotificationEvent>>,
    }

    impl RecordingSink {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                events: Mutex::new(Vec::new()),
            })
        }

        fn events(&self) -> Vec<NotificationEvent> {
            self.events.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl NotificationSink for RecordingSink {
        async fn notify(&self, event: &NotificationEvent) {
            self.events.lock().unwrap().push(event.clone());
        }
    }

    fn intent() -> OrderIntent {
        OrderIntent {
            exchange: ExchangeKind::Bybit,
            symbol: "BTCUSDT".to_string(),
            side: OrderSide::Sell,
            quantity: dec!(10),
        }
    }

    fn fast_retry() -> RetryConfig {
        RetryConfig {
            attempt_interval_ms: 1,
            ..RetryConfig::default()
        }
    }

    fn transient() -> OrderOutcome {
        OrderOutcome {
            http_status: 502,
            raw_body: "bad gateway".to_string(),
            class: OutcomeClass::Transient,
        }
    }

    fn filled() -> OrderOutcome {
        OrderOutcome {
            http_status: 200,
            raw_body: r#"{"retCode":0}"#.to_string(),
            class: OutcomeClass::Filled,
        }
    }

    fn rejected() -> OrderOutcome {
        OrderOutcome {
            http_status: 400,
            raw_body: r#"{"retCode":10001}"#.to_string(),
            class: OutcomeClass::Rejected,
        }
    }

    fn closer(
        adapter: MockExchangeAdapter,
        sink: Arc<RecordingSink>,
        retry: RetryConfig,
    ) -> (PositionCloser, watch::Sender<bool>) {
        let (tx, rx) = watch::channel(false);
        (
            PositionCloser::new(Arc::new(adapter), sink, retry, rx),
            tx,
        )
    }

    #[tokio::test]
    async fn terminates_without_order_when_position_already_closed() {
        let mut adapter = MockExchangeAdapter::new();
        adapter
            .expect_query_position_open()
            .times(1)
            .returning(|_| Ok(false));
        adapter.expect_place_market_order().never();

        let sink = RecordingSink::new();
        let (closer, _tx) = closer(adapter, sink.clone(), fast_retry());

        let report = closer.run(intent()).await;

        assert_eq!(report.resolution, CloseResolution::Confirmed);
        assert_eq!(report.attempts, 0);

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].trigger_attempt, Some(0));
        assert!(events[0].subject.contains("Close confirmed"));
    }

    #[tokio::test]
    async fn success_on_third_attempt_reports_three_attempts() {
        let mut adapter = MockExchangeAdapter::new();
        adapter.expect_query_position_open().returning(|_| Ok(true));

        let calls = Arc::new(AtomicU64::new(0));
        let calls_in_mock = calls.clone();
        adapter
            .expect_place_market_order()
            .returning(move |_, _, _| {
                let n = calls_in_mock.fetch_add(1, Ordering::SeqCst) + 1;
                if n >= 3 {
                    Ok(filled())
                } else {
                    Ok(transient())
                }
            });

        let sink = RecordingSink::new();
        let (closer, _tx) = closer(adapter, sink.clone(), fast_retry());

        let report = closer.run(intent()).await;

        assert_eq!(report.resolution, CloseResolution::Confirmed);
        assert_eq!(report.attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].trigger_attempt, Some(3));
    }

    #[tokio::test]
    async fn milestone_fires_exactly_at_attempt_fifty() {
        let mut adapter = MockExchangeAdapter::new();
        adapter.expect_query_position_open().returning(|_| Ok(true));

        let calls = Arc::new(AtomicU64::new(0));
        let calls_in_mock = calls.clone();
        adapter
            .expect_place_market_order()
            .returning(move |_, _, _| {
                let n = calls_in_mock.fetch_add(1, Ordering::SeqCst) + 1;
                if n >= 51 {
                    Ok(filled())
                } else {
                    Ok(transient())
                }
            });

        let sink = RecordingSink::new();
        let (closer, _tx) = closer(adapter, sink.clone(), fast_retry());

        let report = closer.run(intent()).await;
        assert_eq!(report.attempts, 51);

        let events = sink.events();
        let milestones: Vec<_> = events
            .iter()
            .filter(|e| e.subject.contains("still failing"))
            .collect();
        assert_eq!(milestones.len(), 1, "exactly one milestone below 500");
        assert_eq!(milestones[0].trigger_attempt, Some(50));
        assert!(
            !events.iter().any(|e| e.trigger_attempt == Some(49)),
            "attempt 49 must not emit an event"
        );

        let successes: Vec<_> = events
            .iter()
            .filter(|e| e.subject.contains("Close confirmed"))
            .collect();
        assert_eq!(successes.len(), 1);
        assert_eq!(successes[0].trigger_attempt, Some(51));
    }

    #[tokio::test]
    async fn consecutive_rejections_terminate_the_loop() {
        let mut adapter = MockExchangeAdapter::new();
        adapter.expect_query_position_open().returning(|_| Ok(true));
        adapter
            .expect_place_market_order()
            .returning(|_, _, _| Ok(rejected()));

        let sink = RecordingSink::new();
        let (closer, _tx) = closer(adapter, sink.clone(), fast_retry());

        let report = closer.run(intent()).await;

        assert_eq!(report.resolution, CloseResolution::GaveUp);
        assert_eq!(report.attempts, 3);

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert!(events[0].subject.contains("Close abandoned"));
        assert!(!events.iter().any(|e| e.subject.contains("Close confirmed")));
    }

    #[tokio::test]
    async fn transient_failures_reset_the_rejection_counter() {
        let mut adapter = MockExchangeAdapter::new();
        adapter.expect_query_position_open().returning(|_| Ok(true));

        // reject, reject, transient, reject, reject, filled: never three in a row
        let calls = Arc::new(AtomicU64::new(0));
        let calls_in_mock = calls.clone();
        adapter
            .expect_place_market_order()
            .returning(move |_, _, _| {
                let n = calls_in_mock.fetch_add(1, Ordering::SeqCst) + 1;
                Ok(match n {
                    1 | 2 | 4 | 5 => rejected(),
                    3 => transient(),
                    _ => filled(),
                })
            });

        let sink = RecordingSink::new();
        let (closer, _tx) = closer(adapter, sink.clone(), fast_retry());

        let report = closer.run(intent()).await;

        assert_eq!(report.resolution, CloseResolution::Confirmed);
        assert_eq!(report.attempts, 6);
    }

    #[tokio::test]
    async fn attempt_cap_terminates_with_failure_notification() {
        let mut adapter = MockExchangeAdapter::new();
        adapter.expect_query_position_open().returning(|_| Ok(true));
        adapter
            .expect_place_market_order()
            .returning(|_, _, _| Ok(transient()));

        let retry = RetryConfig {
            attempt_interval_ms: 1,
            max_attempts: Some(5),
            ..RetryConfig::default()
        };
        let sink = RecordingSink::new();
        let (closer, _tx) = closer(adapter, sink.clone(), retry);

        let report = closer.run(intent()).await;

        assert_eq!(report.resolution, CloseResolution::GaveUp);
        assert_eq!(report.attempts, 5);
        assert!(sink
            .events()
            .iter()
            .any(|e| e.subject.contains("Close abandoned")));
    }

    #[tokio::test]
    async fn shutdown_cancels_the_loop() {
        let mut adapter = MockExchangeAdapter::new();
        adapter.expect_query_position_open().returning(|_| Ok(true));
        adapter
            .expect_place_market_order()
            .returning(|_, _, _| Ok(transient()));

        let sink = RecordingSink::new();
        let (closer, tx) = closer(adapter, sink.clone(), fast_retry());

        let handle = tokio::spawn(closer.run(intent()));
        tokio::time::sleep(Duration::from_millis(20)).await;
        tx.send(true).expect("receiver should be alive");

        let report = handle.await.expect("closer task should not panic");
        assert_eq!(report.resolution, CloseResolution::Cancelled);
        assert!(!sink
            .events()
            .iter()
            .any(|e| e.subject.contains("Close confirmed")));
    }
}
