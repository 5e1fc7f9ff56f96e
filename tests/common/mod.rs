#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tracing_subscriber::fmt::MakeWriter;

use validation_scope::{FieldState, FlagPatch, Validatable, ValidationResult};

/// Scripted leaf that records how the scope drives it.
pub struct Probe {
    id: String,
    persist: bool,
    disabled: AtomicBool,
    valid: AtomicBool,
    reject: AtomicBool,
    state: watch::Sender<FieldState>,
    pub validate_calls: AtomicUsize,
    pub silent_calls: AtomicUsize,
    pub reset_calls: AtomicUsize,
    pub received_errors: Mutex<Vec<Vec<String>>>,
}

impl Probe {
    pub fn new(id: &str, valid: bool) -> Arc<Self> {
        Self::build(id, valid, false)
    }

    pub fn persistent(id: &str, valid: bool) -> Arc<Self> {
        Self::build(id, valid, true)
    }

    fn build(id: &str, valid: bool, persist: bool) -> Arc<Self> {
        let (state, _) = watch::channel(FieldState::default());
        Arc::new(Self {
            id: id.to_string(),
            persist,
            disabled: AtomicBool::new(false),
            valid: AtomicBool::new(valid),
            reject: AtomicBool::new(false),
            state,
            validate_calls: AtomicUsize::new(0),
            silent_calls: AtomicUsize::new(0),
            reset_calls: AtomicUsize::new(0),
            received_errors: Mutex::new(Vec::new()),
        })
    }

    /// A probe whose `validate()` calls fail outright.
    pub fn rejecting(id: &str) -> Arc<Self> {
        let probe = Self::new(id, false);
        probe.reject.store(true, Ordering::SeqCst);
        probe
    }

    pub fn set_disabled(&self, disabled: bool) {
        self.disabled.store(disabled, Ordering::SeqCst);
    }

    /// Publish a state with the given `valid` flag and errors.
    pub fn publish(&self, valid: bool, errors: &[&str]) {
        self.state.send_modify(|s| {
            s.flags.valid = valid;
            s.flags.invalid = !valid;
            s.errors = errors.iter().map(|e| e.to_string()).collect();
        });
    }

    fn outcome(&self) -> Result<ValidationResult> {
        if self.reject.load(Ordering::SeqCst) {
            anyhow::bail!("rule backend unavailable");
        }
        if self.valid.load(Ordering::SeqCst) {
            Ok(ValidationResult::passed())
        } else {
            Ok(ValidationResult::from_errors(vec!["invalid".to_string()], Default::default()))
        }
    }
}

#[async_trait]
impl Validatable for Probe {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn disabled(&self) -> bool {
        self.disabled.load(Ordering::SeqCst)
    }

    fn persist(&self) -> bool {
        self.persist
    }

    fn watch(&self) -> watch::Receiver<FieldState> {
        self.state.subscribe()
    }

    async fn validate(&self) -> Result<ValidationResult> {
        self.validate_calls.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        let result = self.outcome()?;
        self.apply_result(&result);
        Ok(result)
    }

    async fn validate_silent(&self) -> Result<ValidationResult> {
        self.silent_calls.fetch_add(1, Ordering::SeqCst);
        self.outcome()
    }

    fn reset(&self) {
        self.reset_calls.fetch_add(1, Ordering::SeqCst);
        self.state.send_replace(FieldState::default());
    }

    fn set_errors(&self, messages: Vec<String>) {
        self.received_errors.lock().unwrap().push(messages.clone());
        self.state.send_modify(|s| {
            s.flags.valid = messages.is_empty();
            s.flags.invalid = !messages.is_empty();
            s.errors = messages;
        });
    }

    fn set_flags(&self, patch: &FlagPatch) {
        self.state.send_modify(|s| s.flags.apply(patch));
    }

    fn apply_result(&self, result: &ValidationResult) {
        self.state.send_modify(|s| {
            s.errors = result.errors.clone();
            s.failed_rules = result.failed_rules.clone();
            s.flags.valid = result.valid;
            s.flags.invalid = !result.valid;
            s.flags.validated = true;
        });
    }
}

/// In-memory log sink for asserting on emitted `tracing` events.
#[derive(Clone, Default)]
pub struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    /// Install a WARN-level fmt subscriber writing here for the current thread.
    pub fn capture_warnings(&self) -> tracing::subscriber::DefaultGuard {
        let subscriber = tracing_subscriber::fmt()
            .with_writer(self.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::WARN)
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    pub fn lines(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.0.lock().unwrap())
            .lines()
            .map(str::to_string)
            .collect()
    }
}

impl std::io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogBuffer {
    type Writer = LogBuffer;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
