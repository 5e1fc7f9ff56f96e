//! In-Memory Field
//!
//! A minimal validatable leaf: a JSON value, its initial value, and a list of
//! named synchronous rules. Real deployments plug their own rule engine in
//! behind [`Validatable`]; this type covers demos, tests and simple forms.

use crate::flags::{FlagPatch, Flags};
use crate::identity::{IdGenerator, IdOrigin};
use crate::member::{FailedRules, FieldState, Validatable, ValidationResult};
use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

type RuleCheck = Arc<dyn Fn(&Value) -> Option<String> + Send + Sync>;

/// A named check returning an error message on failure.
#[derive(Clone)]
pub struct Rule {
    name: String,
    check: RuleCheck,
}

impl Rule {
    pub fn new<F>(name: impl Into<String>, check: F) -> Self
    where
        F: Fn(&Value) -> Option<String> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            check: Arc::new(check),
        }
    }

    /// Fails on null, empty strings and empty arrays.
    pub fn required() -> Self {
        Self::new("required", |value| {
            let empty = match value {
                Value::Null => true,
                Value::String(s) => s.trim().is_empty(),
                Value::Array(items) => items.is_empty(),
                _ => false,
            };
            empty.then(|| "This field is required".to_string())
        })
    }

    /// Fails on strings shorter than `min` characters. Other values pass.
    pub fn min_length(min: usize) -> Self {
        Self::new("min", move |value| match value {
            Value::String(s) if s.chars().count() < min => {
                Some(format!("Must be at least {} characters", min))
            }
            _ => None,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rule").field("name", &self.name).finish()
    }
}

pub struct FieldBuilder {
    id: String,
    origin: IdOrigin,
    rules: Vec<Rule>,
    initial: Value,
    persist: bool,
    disabled: bool,
}

impl FieldBuilder {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            origin: IdOrigin::Explicit,
            rules: Vec::new(),
            initial: Value::Null,
            persist: false,
            disabled: false,
        }
    }

    /// A field whose id comes from `ids`.
    pub fn generated(ids: &dyn IdGenerator) -> Self {
        Self {
            origin: IdOrigin::Generated,
            ..Self::new(ids.next_id("field"))
        }
    }

    pub fn rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn initial(mut self, value: Value) -> Self {
        self.initial = value;
        self
    }

    pub fn persist(mut self, persist: bool) -> Self {
        self.persist = persist;
        self
    }

    pub fn disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }

    pub fn build(self) -> Arc<Field> {
        let (value, _) = watch::channel(self.initial.clone());
        let (state, _) = watch::channel(FieldState::default());
        Arc::new(Field {
            id: self.id,
            origin: self.origin,
            rules: self.rules,
            initial: self.initial,
            persist: self.persist,
            disabled: AtomicBool::new(self.disabled),
            value,
            state,
        })
    }
}

pub struct Field {
    id: String,
    origin: IdOrigin,
    rules: Vec<Rule>,
    initial: Value,
    persist: bool,
    disabled: AtomicBool,
    value: watch::Sender<Value>,
    state: watch::Sender<FieldState>,
}

impl Field {
    pub fn builder(id: impl Into<String>) -> FieldBuilder {
        FieldBuilder::new(id)
    }

    pub fn value(&self) -> Value {
        self.value.borrow().clone()
    }

    /// Replace the value, marking the field dirty.
    pub fn set_value(&self, value: Value) {
        let changed = value != self.initial;
        self.value.send_replace(value);
        self.state.send_modify(|s| {
            s.flags.dirty = true;
            s.flags.pristine = false;
            s.flags.changed = changed;
        });
    }

    /// Record that the user focused and left the field.
    pub fn touch(&self) {
        self.state.send_modify(|s| {
            s.flags.touched = true;
            s.flags.untouched = false;
        });
    }

    pub fn set_disabled(&self, disabled: bool) {
        self.disabled.store(disabled, Ordering::Relaxed);
    }

    fn run_rules(&self) -> ValidationResult {
        let value = self.value();
        let mut errors = Vec::new();
        let mut failed_rules = FailedRules::new();
        for rule in &self.rules {
            if let Some(message) = (rule.check)(&value) {
                failed_rules
                    .entry(rule.name.clone())
                    .or_default()
                    .push(message.clone());
                errors.push(message);
            }
        }
        ValidationResult::from_errors(errors, failed_rules)
    }

    fn set_pending(&self, pending: bool) {
        self.state.send_modify(|s| s.flags.pending = pending);
    }
}

#[async_trait]
impl Validatable for Field {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn id_origin(&self) -> IdOrigin {
        self.origin
    }

    fn disabled(&self) -> bool {
        self.disabled.load(Ordering::Relaxed)
    }

    fn persist(&self) -> bool {
        self.persist
    }

    fn watch(&self) -> watch::Receiver<FieldState> {
        self.state.subscribe()
    }

    async fn validate(&self) -> Result<ValidationResult> {
        self.set_pending(true);
        let result = self.run_rules();
        self.apply_result(&result);
        Ok(result)
    }

    async fn validate_silent(&self) -> Result<ValidationResult> {
        self.set_pending(true);
        let result = self.run_rules();
        self.set_pending(false);
        Ok(result)
    }

    fn reset(&self) {
        self.value.send_replace(self.initial.clone());
        self.state.send_replace(FieldState {
            errors: Vec::new(),
            flags: Flags::field_default(),
            failed_rules: FailedRules::new(),
        });
    }

    fn set_errors(&self, messages: Vec<String>) {
        self.state.send_modify(|s| {
            let valid = messages.is_empty();
            s.errors = messages;
            s.failed_rules.clear();
            s.flags.valid = valid;
            s.flags.invalid = !valid;
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
            s.flags.passed = result.valid;
            s.flags.failed = !result.valid;
            s.flags.validated = true;
            s.flags.pending = false;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::SequentialIds;
    use serde_json::json;

    #[tokio::test]
    async fn test_validate_applies_errors_and_flags() {
        let field = Field::builder("name").rule(Rule::required()).build();

        let result = field.validate().await.unwrap();
        assert!(!result.valid);

        let state = field.state();
        assert_eq!(state.errors, vec!["This field is required".to_string()]);
        assert!(state.failed_rules.contains_key("required"));
        assert!(state.flags.invalid && state.flags.failed && state.flags.validated);
        assert!(!state.flags.pending);
    }

    #[tokio::test]
    async fn test_validate_silent_leaves_state_alone() {
        let field = Field::builder("name").rule(Rule::required()).build();

        let result = field.validate_silent().await.unwrap();
        assert!(!result.valid);

        let state = field.state();
        assert!(state.errors.is_empty());
        assert!(!state.flags.validated);
    }

    #[tokio::test]
    async fn test_rules_collect_every_failure() {
        let field = Field::builder("password")
            .rule(Rule::required())
            .rule(Rule::min_length(8))
            .initial(json!("abc"))
            .build();

        let result = field.validate().await.unwrap();
        assert_eq!(result.errors, vec!["Must be at least 8 characters".to_string()]);
        assert_eq!(result.failed_rules.keys().collect::<Vec<_>>(), vec!["min"]);
    }

    #[test]
    fn test_set_value_marks_dirty_and_changed() {
        let field = Field::builder("name").initial(json!("a")).build();

        field.set_value(json!("b"));
        let flags = field.state().flags;
        assert!(flags.dirty && flags.changed && !flags.pristine);

        field.set_value(json!("a"));
        assert!(!field.state().flags.changed);
        assert!(field.state().flags.dirty);
    }

    #[test]
    fn test_reset_restores_initial_value_and_flags() {
        let field = Field::builder("name").initial(json!("a")).build();
        field.set_value(json!("b"));
        field.touch();
        field.set_errors(vec!["taken".into()]);

        field.reset();
        assert_eq!(field.value(), json!("a"));
        assert_eq!(field.state().flags, Flags::field_default());
        assert!(field.state().errors.is_empty());
    }

    #[test]
    fn test_generated_field_reports_origin() {
        let ids = SequentialIds::new();
        let field = FieldBuilder::generated(&ids).build();
        assert_eq!(field.id(), "field_0");
        assert_eq!(field.id_origin(), IdOrigin::Generated);
    }
}
