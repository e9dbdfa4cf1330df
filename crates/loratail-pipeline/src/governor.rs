use loratail_core::config::{BudgetPolicy, GovernorConfig};
use loratail_core::{FrameSink, IngestEvent, TelemetryFrame};
use loratail_output::StdoutReporter;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Why the governor stopped consuming events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    /// More faults than the ceiling allows
    BudgetExhausted,
    /// The producer closed the event stream
    SourceClosed,
}

impl std::fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TerminationReason::BudgetExhausted => write!(f, "error budget exhausted"),
            TerminationReason::SourceClosed => write!(f, "source closed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GovernorState {
    Running,
    Terminated(TerminationReason),
}

/// Fault counter with a fixed ceiling
///
/// Exhausted once the count exceeds the ceiling, so a ceiling of 10 tolerates
/// ten faults and stops on the eleventh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorBudget {
    count: u32,
    ceiling: u32,
    policy: BudgetPolicy,
}

impl ErrorBudget {
    pub fn new(ceiling: u32, policy: BudgetPolicy) -> Self {
        Self {
            count: 0,
            ceiling,
            policy,
        }
    }

    pub fn from_config(config: &GovernorConfig) -> Self {
        Self::new(config.error_ceiling, config.budget_policy)
    }

    /// Count a fault; returns true when the budget is now exhausted
    pub fn record_fault(&mut self) -> bool {
        self.count = self.count.saturating_add(1);
        self.is_exhausted()
    }

    /// Note a successful frame; resets the count under the consecutive policy
    pub fn record_success(&mut self) {
        if self.policy == BudgetPolicy::Consecutive && self.count > 0 {
            debug!(cleared = self.count, "Resetting consecutive fault count");
            self.count = 0;
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.count > self.ceiling
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn ceiling(&self) -> u32 {
        self.ceiling
    }

    pub fn policy(&self) -> BudgetPolicy {
        self.policy
    }
}

/// Summary returned when the governor stops
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GovernorReport {
    pub frames: u64,
    pub faults: u64,
    pub delivery_failures: u64,
    /// Budget count at termination
    pub budget_count: u32,
    pub budget_ceiling: u32,
    pub reason: TerminationReason,
}

/// Consumes ingest events, applies the error budget and forwards frames
pub struct Governor<S: FrameSink> {
    budget: ErrorBudget,
    sink: S,
    reporter: Option<StdoutReporter>,
    state: GovernorState,
    frames: u64,
    faults: u64,
    delivery_failures: u64,
}

impl<S: FrameSink> Governor<S> {
    pub fn new(budget: ErrorBudget, sink: S) -> Self {
        Self {
            budget,
            sink,
            reporter: None,
            state: GovernorState::Running,
            frames: 0,
            faults: 0,
            delivery_failures: 0,
        }
    }

    pub fn from_config(config: &GovernorConfig, sink: S) -> Self {
        Self::new(ErrorBudget::from_config(config), sink)
    }

    /// Also print every frame to stdout
    pub fn with_reporter(mut self, reporter: StdoutReporter) -> Self {
        self.reporter = Some(reporter);
        self
    }

    pub fn state(&self) -> GovernorState {
        self.state
    }

    pub fn budget(&self) -> &ErrorBudget {
        &self.budget
    }

    /// Apply one event; events after termination are ignored
    pub async fn handle(&mut self, event: IngestEvent) -> GovernorState {
        if let GovernorState::Terminated(_) = self.state {
            return self.state;
        }

        match event {
            IngestEvent::Frame(frame) => self.on_frame(frame).await,
            IngestEvent::Fault(reason) => self.on_fault(&reason),
        }
        self.state
    }

    async fn on_frame(&mut self, frame: TelemetryFrame) {
        self.frames += 1;
        self.budget.record_success();

        info!(
            pressure = frame.pressure,
            temperature = frame.temperature,
            altitude = frame.altitude,
            current_ma = frame.current_ma,
            load_voltage = frame.load_voltage,
            power_mw = frame.power_mw,
            "Ingested frame"
        );

        if let Some(reporter) = self.reporter.as_mut() {
            if let Err(e) = reporter.report(&frame).await {
                warn!(error = %e, "Failed to report frame");
            }
        }

        // Delivery is fire-and-forget: never retried, never counted as a fault
        if let Err(e) = self.sink.deliver(&frame).await {
            self.delivery_failures += 1;
            warn!(sink = self.sink.name(), error = %e, "Failed to deliver frame");
        }
    }

    fn on_fault(&mut self, reason: &str) {
        self.faults += 1;
        let exhausted = self.budget.record_fault();
        warn!(
            errors = self.budget.count(),
            ceiling = self.budget.ceiling(),
            fault = %reason,
            "Ingestion fault"
        );
        if exhausted {
            self.state = GovernorState::Terminated(TerminationReason::BudgetExhausted);
        }
    }

    /// Consume events until the budget runs out or the stream closes
    pub async fn run(mut self, mut events: mpsc::Receiver<IngestEvent>) -> GovernorReport {
        info!(
            ceiling = self.budget.ceiling(),
            policy = ?self.budget.policy(),
            sink = self.sink.name(),
            "Starting ingestion governor"
        );

        while let Some(event) = events.recv().await {
            if let GovernorState::Terminated(_) = self.handle(event).await {
                break;
            }
        }

        let reason = match self.state {
            GovernorState::Terminated(reason) => reason,
            GovernorState::Running => {
                self.state = GovernorState::Terminated(TerminationReason::SourceClosed);
                TerminationReason::SourceClosed
            }
        };

        info!(
            frames = self.frames,
            faults = self.faults,
            delivery_failures = self.delivery_failures,
            reason = %reason,
            "Ingestion governor stopped"
        );

        GovernorReport {
            frames: self.frames,
            faults: self.faults,
            delivery_failures: self.delivery_failures,
            budget_count: self.budget.count(),
            budget_ceiling: self.budget.ceiling(),
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loratail_core::OutputError;

    /// Records delivered frames, optionally failing every delivery
    #[derive(Default)]
    struct RecordingSink {
        delivered: Vec<TelemetryFrame>,
        fail: bool,
    }

    impl FrameSink for RecordingSink {
        fn name(&self) -> &'static str {
            "recording"
        }

        async fn deliver(&mut self, frame: &TelemetryFrame) -> Result<(), OutputError> {
            if self.fail {
                return Err(OutputError::Delivery {
                    endpoint: "https://collector/node/state".to_string(),
                    message: "operation timed out".to_string(),
                });
            }
            self.delivered.push(*frame);
            Ok(())
        }
    }

    fn frame() -> TelemetryFrame {
        TelemetryFrame::new(101.3, 21.5, 120.0, 5.0, 3.7, 18.5)
    }

    fn fault() -> IngestEvent {
        IngestEvent::Fault("buffer overflow without match".to_string())
    }

    async fn run_events(
        governor: Governor<RecordingSink>,
        events: Vec<IngestEvent>,
    ) -> GovernorReport {
        let (tx, rx) = mpsc::channel(events.len().max(1));
        for event in events {
            tx.send(event).await.unwrap();
        }
        drop(tx);
        governor.run(rx).await
    }

    #[test]
    fn test_budget_exceeds_semantics() {
        let mut budget = ErrorBudget::new(10, BudgetPolicy::Cumulative);
        for _ in 0..10 {
            assert!(!budget.record_fault());
        }
        assert!(budget.record_fault());
        assert_eq!(budget.count(), 11);
    }

    #[test]
    fn test_cumulative_budget_never_resets() {
        let mut budget = ErrorBudget::new(10, BudgetPolicy::Cumulative);
        budget.record_fault();
        budget.record_success();
        assert_eq!(budget.count(), 1);
    }

    #[test]
    fn test_consecutive_budget_resets_on_success() {
        let mut budget = ErrorBudget::new(10, BudgetPolicy::Consecutive);
        budget.record_fault();
        budget.record_fault();
        budget.record_success();
        assert_eq!(budget.count(), 0);
    }

    #[tokio::test]
    async fn test_ten_faults_do_not_terminate() {
        let governor = Governor::new(ErrorBudget::new(10, BudgetPolicy::Cumulative), RecordingSink::default());
        let report = run_events(governor, vec![fault(); 10]).await;
        assert_eq!(report.reason, TerminationReason::SourceClosed);
        assert_eq!(report.faults, 10);
    }

    #[tokio::test]
    async fn test_eleven_faults_terminate() {
        let governor = Governor::new(ErrorBudget::new(10, BudgetPolicy::Cumulative), RecordingSink::default());
        let mut events = vec![fault(); 11];
        // Never consumed once the budget is gone
        events.push(fault());
        events.push(IngestEvent::Frame(frame()));

        let report = run_events(governor, events).await;
        assert_eq!(report.reason, TerminationReason::BudgetExhausted);
        assert_eq!(report.faults, 11);
        assert_eq!(report.frames, 0);
        assert_eq!(report.budget_count, 11);
    }

    #[tokio::test]
    async fn test_frames_between_faults_under_each_policy() {
        let mut events = vec![fault(); 10];
        events.push(IngestEvent::Frame(frame()));
        events.extend(vec![fault(); 10]);

        let cumulative = Governor::new(ErrorBudget::new(10, BudgetPolicy::Cumulative), RecordingSink::default());
        let report = run_events(cumulative, events.clone()).await;
        assert_eq!(report.reason, TerminationReason::BudgetExhausted);
        assert_eq!(report.faults, 11);

        let consecutive = Governor::new(ErrorBudget::new(10, BudgetPolicy::Consecutive), RecordingSink::default());
        let report = run_events(consecutive, events).await;
        assert_eq!(report.reason, TerminationReason::SourceClosed);
        assert_eq!(report.faults, 20);
        assert_eq!(report.frames, 1);
    }

    #[tokio::test]
    async fn test_delivery_failures_are_not_counted() {
        let sink = RecordingSink {
            fail: true,
            ..Default::default()
        };
        let governor = Governor::new(ErrorBudget::new(10, BudgetPolicy::Cumulative), sink);
        let report = run_events(governor, vec![IngestEvent::Frame(frame()); 15]).await;

        assert_eq!(report.reason, TerminationReason::SourceClosed);
        assert_eq!(report.frames, 15);
        assert_eq!(report.delivery_failures, 15);
        assert_eq!(report.budget_count, 0);
    }

    #[tokio::test]
    async fn test_frames_delivered_in_order() {
        let mut governor = Governor::new(ErrorBudget::new(10, BudgetPolicy::Cumulative), RecordingSink::default());
        let first = TelemetryFrame::new(1.0, 1.0, 1.0, 1.0, 1.0, 1.0);
        let second = TelemetryFrame::new(2.0, 2.0, 2.0, 2.0, 2.0, 2.0);

        assert_eq!(governor.handle(IngestEvent::Frame(first)).await, GovernorState::Running);
        assert_eq!(governor.handle(IngestEvent::Frame(second)).await, GovernorState::Running);
        assert_eq!(governor.sink.delivered, vec![first, second]);
    }

    #[tokio::test]
    async fn test_terminated_governor_ignores_events() {
        let mut governor = Governor::new(ErrorBudget::new(0, BudgetPolicy::Cumulative), RecordingSink::default());
        let state = governor.handle(fault()).await;
        assert_eq!(state, GovernorState::Terminated(TerminationReason::BudgetExhausted));

        governor.handle(IngestEvent::Frame(frame())).await;
        assert!(governor.sink.delivered.is_empty());
    }
}
