//! Validation Scope Demo
//!
//! Walks a signup form with a nested address scope through validation,
//! conditional removal of a persisted field, server-side error injection and
//! reset, printing the aggregate after each step.

use anyhow::Result;
use serde_json::json;
use std::sync::Arc;
use tracing::info;

use validation_scope::utils::init_tracing;
use validation_scope::{
    ConfigManager, ErrorMap, Field, IdGenerator, MemberKind, Rule, Scope, ScopeConfig, SequentialIds, Validatable,
};

// ──────────────────────────────────────────────────────────────────────────────
// CONFIGURATION
// ──────────────────────────────────────────────────────────────────────────────

/// Configuration for the demo
struct DemoConfig {
    /// Path to the scope config file (JSON or YAML)
    scope_config: String,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            scope_config: std::env::var("SCOPE_CONFIG").unwrap_or_else(|_| "scope.json".to_string()),
        }
    }
}

async fn settle(config: &ScopeConfig) {
    // Two debounce windows for the nested scope, then the parent.
    tokio::time::sleep(config.debounce() * 4).await;
}

fn print_state(title: &str, scope: &Scope) -> Result<()> {
    println!("\n── {} ──", title);
    println!("{}", serde_json::to_string_pretty(&scope.state())?);
    Ok(())
}

// ──────────────────────────────────────────────────────────────────────────────
// MAIN ENTRY POINT
// ──────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing()?;

    println!("\n{}", "═".repeat(60));
    println!("Validation Scope v{}", env!("CARGO_PKG_VERSION"));
    println!("{}", "═".repeat(60));

    let demo = DemoConfig::default();
    let config = ConfigManager::new(&demo.scope_config).load().await?;
    info!(path = %demo.scope_config, debounce_ms = config.debounce_ms, "Loaded scope config");

    let ids: Arc<dyn IdGenerator> = Arc::new(SequentialIds::new());
    let form = Scope::builder()
        .id("signup")
        .ids(ids.clone())
        .config(config.clone())
        .build()
        .await;
    let address = Scope::builder()
        .id("address")
        .ids(ids)
        .config(config.clone())
        .parent(&form)
        .build()
        .await;

    let email = Field::builder("email").rule(Rule::required()).build();
    let password = Field::builder("password")
        .rule(Rule::required())
        .rule(Rule::min_length(8))
        .build();
    let city = Field::builder("city").rule(Rule::required()).persist(true).build();

    form.subscribe(email.clone()).await;
    form.subscribe(password.clone()).await;
    address.subscribe(city.clone()).await;

    email.set_value(json!("ada@example.com"));
    email.touch();
    password.set_value(json!("short"));

    let valid = form.validate().await?;
    settle(&config).await;
    info!(valid, "First validation finished");
    print_state("After validation", &form)?;

    // The city input is hidden; its last state stays visible via the cache.
    address.unsubscribe("city", MemberKind::Member).await;
    settle(&config).await;
    println!("\nCached in address scope: {:?}", address.inactive_ids().await);
    print_state("City hidden", &form)?;

    // Shown again under the same id: the cached state is replayed.
    let city = Field::builder("city").rule(Rule::required()).persist(true).build();
    address.subscribe(city.clone()).await;
    println!("\nRestored city errors: {:?}", city.state().errors);

    city.set_value(json!("Lisbon"));
    password.set_value(json!("correct horse battery"));
    let outcome = form.passes(|| "submitted").await?;
    println!("\npasses() -> {:?}", outcome);

    let mut server_errors = ErrorMap::new();
    server_errors.insert("email".into(), vec!["Email already registered".into()]);
    server_errors.insert("city".into(), vec!["We do not ship there".into()]);
    server_errors.insert("coupon".into(), vec!["Unknown coupon".into()]);
    form.set_errors(&server_errors).await;
    settle(&config).await;
    print_state("After server errors", &form)?;

    form.reset().await?;
    settle(&config).await;
    print_state("After reset", &form)?;

    println!("\nRecomputes: form={} address={}\n", form.recompute_count(), address.recompute_count());
    Ok(())
}
