//! WorkerController - owns one worker's poll loop.
//!
//! Each `run`:
//! 1. Resolves receiver names and options, picks the target bus
//! 2. Builds the stop condition set and writes the startup banner
//! 3. Polls receivers in priority order, dispatching each message
//! 4. Checks the stop conditions after every message and every idle pass
//! 5. Reports the single reason it stopped
//!
//! Nothing survives between runs: the next `run` resolves everything again.

use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;

use log::{debug, info, warn};
use tokio_util::sync::CancellationToken;

use crate::bus::{HandlerError, MessageBus, RoutableBus};
use crate::error::{Result, WorkerError};
use crate::options::{RawOptions, WorkerOptions, resolve};
use crate::signal::handle::idle_wait;
use crate::signal::{RestartSignalStore, StopHandle};
use crate::stop::{LoopState, MemoryProbe, ProcessMemoryProbe, StopConditionSet};
use crate::transport::{Envelope, Receiver, ReceiverLocator};
use crate::worker::rate_limit::RateLimiter;
use crate::worker::report::{RunReport, WorkerMetadata, startup_banner};

/// Invoked after every handled message unless `no-reset` is set.
pub type ResetHook = Arc<dyn Fn() + Send + Sync>;

/// Collaborators a controller is built from.
pub struct WorkerSetup {
    pub receiver_locator: Arc<dyn ReceiverLocator>,
    /// Receivers to consume from, highest priority first
    pub receiver_names: Vec<String>,
    pub bus: Arc<dyn RoutableBus>,
    pub signal_store: Arc<dyn RestartSignalStore>,
    pub options: RawOptions,
}

enum TargetBus {
    Routable(Arc<dyn RoutableBus>),
    Named(Arc<dyn MessageBus>),
}

impl TargetBus {
    async fn dispatch(&self, envelope: Envelope) -> std::result::Result<Envelope, HandlerError> {
        match self {
            TargetBus::Routable(bus) => bus.dispatch(envelope).await,
            TargetBus::Named(bus) => bus.dispatch(envelope).await,
        }
    }
}

/// Everything resolved for one run.
struct PreparedRun {
    options: WorkerOptions,
    receivers: Vec<(String, Arc<dyn Receiver>)>,
    bus: TargetBus,
    conditions: StopConditionSet,
    interrupt: CancellationToken,
    banner: String,
    metadata: WorkerMetadata,
}

pub struct WorkerController {
    setup: WorkerSetup,
    memory_probe: Arc<dyn MemoryProbe>,
    reset_hook: Option<ResetHook>,
    rate_limiters: HashMap<String, Arc<RateLimiter>>,
    stop_handle: StopHandle,
    output: Box<dyn Write + Send + Sync>,
    prepared: Option<PreparedRun>,
}

impl WorkerController {
    pub fn new(setup: WorkerSetup) -> Self {
        Self {
            setup,
            memory_probe: Arc::new(ProcessMemoryProbe::new()),
            reset_hook: None,
            rate_limiters: HashMap::new(),
            stop_handle: StopHandle::new(),
            output: Box::new(std::io::stdout()),
            prepared: None,
        }
    }

    pub fn with_memory_probe(mut self, probe: Arc<dyn MemoryProbe>) -> Self {
        self.memory_probe = probe;
        self
    }

    pub fn with_reset_hook(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.reset_hook = Some(Arc::new(hook));
        self
    }

    /// Throttle dispatch of messages coming from `receiver`.
    pub fn with_rate_limiter(mut self, receiver: impl Into<String>, limiter: RateLimiter) -> Self {
        self.rate_limiters.insert(receiver.into(), Arc::new(limiter));
        self
    }

    pub fn with_stop_handle(mut self, handle: StopHandle) -> Self {
        self.stop_handle = handle;
        self
    }

    /// Where the banner and status lines go. Defaults to stdout.
    pub fn with_output(mut self, output: impl Write + Send + Sync + 'static) -> Self {
        self.output = Box::new(output);
        self
    }

    /// Handle for interrupting a run from another task.
    pub fn stop_handle(&self) -> StopHandle {
        self.stop_handle.clone()
    }

    /// Startup banner for the next run, resolving the configuration if needed.
    pub fn banner(&mut self) -> Result<String> {
        Ok(self.ensure_prepared()?.banner.clone())
    }

    /// Describe the configured receivers and bus without running.
    pub fn get_metadata(&mut self) -> Result<WorkerMetadata> {
        Ok(self.ensure_prepared()?.metadata.clone())
    }

    /// Ask every worker sharing the signal store to stop.
    ///
    /// Always returns 0; it does not check whether any worker is running.
    pub fn stop_workers(&mut self) -> Result<i32> {
        self.setup.signal_store.request_stop()?;
        writeln!(
            self.output,
            "Signal successfully sent to stop any running workers."
        )?;
        self.output.flush()?;
        Ok(0)
    }

    /// Consume messages until a stop condition holds.
    ///
    /// An interrupt requested through the stop handle ends this run only.
    pub async fn run(&mut self) -> Result<RunReport> {
        let result = self.run_once().await;
        self.stop_handle.rearm();
        result
    }

    async fn run_once(&mut self) -> Result<RunReport> {
        let prepared = match self.prepared.take() {
            Some(prepared) => prepared,
            None => self.prepare()?,
        };

        self.output.write_all(prepared.banner.as_bytes())?;
        self.output.flush()?;

        let report = self.poll(&prepared).await?;

        info!("{}", report.summary());
        writeln!(self.output, "{}", report.summary())?;
        self.output.flush()?;
        Ok(report)
    }

    fn ensure_prepared(&mut self) -> Result<&PreparedRun> {
        if self.prepared.is_none() {
            self.prepared = Some(self.prepare()?);
        }
        self.prepared
            .as_ref()
            .ok_or_else(|| WorkerError::Receiver("worker is not prepared".to_string()))
    }

    fn prepare(&self) -> Result<PreparedRun> {
        let locator = &self.setup.receiver_locator;
        let mut resolved: Vec<(String, Arc<dyn Receiver>)> = Vec::new();

        for name in &self.setup.receiver_names {
            let receiver = locator
                .has(name)
                .then(|| locator.get(name))
                .flatten()
                .ok_or_else(|| WorkerError::UnknownReceiver {
                    name: name.clone(),
                    valid: locator.names(),
                })?;
            resolved.push((name.clone(), receiver));
        }

        let options = resolve(&self.setup.options)?;

        let receivers = match &options.queues {
            None => resolved,
            Some(queues) => {
                let mut selected = Vec::with_capacity(queues.len());
                for queue in queues {
                    let entry = resolved
                        .iter()
                        .find(|(name, _)| name == queue)
                        .cloned()
                        .ok_or_else(|| WorkerError::UnknownReceiver {
                            name: queue.clone(),
                            valid: self.setup.receiver_names.clone(),
                        })?;
                    selected.push(entry);
                }
                selected
            }
        };

        let bus = match &options.bus {
            None => TargetBus::Routable(self.setup.bus.clone()),
            Some(name) => TargetBus::Named(self.setup.bus.named(name).ok_or_else(|| {
                WorkerError::UnknownBus {
                    name: name.clone(),
                    valid: self.setup.bus.bus_names(),
                }
            })?),
        };

        let interrupt = self.stop_handle.token();
        let conditions = StopConditionSet::new(
            &options,
            self.setup.signal_store.clone(),
            self.memory_probe.clone(),
            interrupt.clone(),
        );

        let banner = startup_banner(&self.setup.receiver_names, &conditions.describe());

        let metadata = WorkerMetadata {
            transport_names: self.setup.receiver_names.clone(),
            queue_names: options.queues.clone(),
            bus_name: options.bus.clone(),
        };

        Ok(PreparedRun {
            options,
            receivers,
            bus,
            conditions,
            interrupt,
            banner,
            metadata,
        })
    }

    async fn poll(&self, prepared: &PreparedRun) -> Result<RunReport> {
        let mut state = LoopState::start();
        info!(
            "Worker started on {} receiver(s), stops once it has {}",
            prepared.receivers.len(),
            prepared.conditions.describe()
        );
        for (name, _) in &prepared.receivers {
            if let Some(limiter) = self.rate_limiters.get(name) {
                info!(
                    "Receiver {} is limited to {} message(s) per {:?}",
                    name,
                    limiter.permits(),
                    limiter.interval()
                );
            }
        }

        let stop_reason = 'poll: loop {
            let mut handled = false;

            for (name, receiver) in &prepared.receivers {
                let batch = receiver.get().await?;
                if batch.is_empty() {
                    continue;
                }
                handled = true;

                for envelope in batch {
                    self.handle(name, receiver.as_ref(), envelope, prepared, &mut state)
                        .await?;
                    if let Some(reason) = prepared.conditions.should_stop(&state)? {
                        break 'poll reason;
                    }
                }

                // Higher-priority receivers are asked again before lower ones.
                break;
            }

            if !handled {
                if let Some(reason) = prepared.conditions.should_stop(&state)? {
                    break 'poll reason;
                }
                idle_wait(&prepared.interrupt, prepared.options.sleep).await;
            }
        };

        Ok(RunReport {
            exit_code: 0,
            processed: state.processed,
            failed: state.failed,
            stop_reason,
            elapsed: state.elapsed(),
        })
    }

    async fn handle(
        &self,
        receiver_name: &str,
        receiver: &dyn Receiver,
        envelope: Envelope,
        prepared: &PreparedRun,
        state: &mut LoopState,
    ) -> Result<()> {
        if let Some(limiter) = self.rate_limiters.get(receiver_name) {
            limiter.acquire().await;
        }

        let envelope = envelope.received_from(receiver_name);
        debug!(
            "Received {} ({}) from {}",
            envelope.id, envelope.message_type, receiver_name
        );

        match prepared.bus.dispatch(envelope.clone()).await {
            Ok(_) => {
                receiver.ack(&envelope).await?;
                state.record_success();
                debug!("Handled {}", envelope.id);
            }
            Err(err) => {
                warn!("Message {} from {} failed: {}", envelope.id, receiver_name, err);
                receiver.reject(&envelope).await?;
                state.record_failure();
            }
        }

        if !prepared.options.no_reset {
            if let Some(hook) = &self.reset_hook {
                hook();
            }
        }
        Ok(())
    }
}
