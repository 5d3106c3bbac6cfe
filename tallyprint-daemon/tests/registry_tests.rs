//! Command registry behaviour: registration, dispatch isolation, status
//! notices, request-log suppression and the built-in handlers.

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::sync::broadcast;

use tallyprint_core::{HostEvent, LogLevel, LogStore, LogStoreOptions, StatusNotice};
use tallyprint_daemon::handlers::{register_get_logs, register_print_summary};
use tallyprint_daemon::{CommandRegistry, HandlerResult, RegisterOptions};
use tallyprint_locator::ToolPattern;
use tallyprint_print::{
    InvocationRequest, PassthroughGenerator, PrintError, PrintPipeline, PrinterBackend,
    ToolResolver,
};

struct Fixture {
    dir: TempDir,
    logs: Arc<LogStore>,
    registry: CommandRegistry,
    events: broadcast::Receiver<HostEvent>,
}

fn fixture() -> Fixture {
    let dir = TempDir::new().expect("tempdir");
    let logs = Arc::new(
        LogStore::open(dir.path().join("logs"), LogStoreOptions::default()).expect("log store"),
    );
    let (tx, events) = broadcast::channel(64);
    let registry = CommandRegistry::new(logs.clone(), tx);
    Fixture {
        dir,
        logs,
        registry,
        events,
    }
}

fn count_messages(logs: &LogStore, message: &str) -> usize {
    logs.recent_logs(100)
        .iter()
        .filter(|entry| entry.message == message)
        .count()
}

fn next_status(events: &mut broadcast::Receiver<HostEvent>) -> (String, StatusNotice) {
    loop {
        match events.try_recv().expect("status event") {
            HostEvent::Status { channel, notice } => return (channel, notice),
            HostEvent::LogUpdate => continue,
        }
    }
}

async fn fails(_args: Value) -> HandlerResult {
    Err(anyhow::anyhow!("printer on fire"))
}

async fn panics(_args: Value) -> HandlerResult {
    panic!("handler bug")
}

// ---------------------------------------------------------------------------
// 1. Registration
// ---------------------------------------------------------------------------

#[tokio::test]
async fn second_registration_is_rejected_and_first_handler_kept() {
    let fx = fixture();
    assert!(fx.registry.register(
        "echo",
        |_args| async { Ok(json!("first")) },
        RegisterOptions::default()
    ));
    assert!(!fx.registry.register(
        "echo",
        |_args| async { Ok(json!("second")) },
        RegisterOptions::default()
    ));

    assert_eq!(fx.registry.channels(), vec!["echo"]);
    let response = fx.registry.dispatch("echo", Value::Null).await;
    assert_eq!(response.data, Some(json!("first")));
    assert_eq!(
        count_messages(&fx.logs, "Command handler for 'echo' already registered, skipping"),
        1
    );
}

#[tokio::test]
async fn unregister_is_idempotent_and_frees_the_channel() {
    let fx = fixture();
    fx.registry
        .register("echo", |args| async move { Ok(args) }, RegisterOptions::default());

    fx.registry.unregister("echo");
    fx.registry.unregister("echo");
    fx.registry.unregister("never-registered");
    assert!(!fx.registry.is_registered("echo"));

    assert!(fx.registry.register(
        "echo",
        |_args| async { Ok(json!("again")) },
        RegisterOptions::default()
    ));
    fx.registry.unregister_all();
    assert!(fx.registry.channels().is_empty());
}

// ---------------------------------------------------------------------------
// 2. Dispatch never raises
// ---------------------------------------------------------------------------

#[tokio::test]
async fn successful_dispatch_returns_data_and_notifies() {
    let mut fx = fixture();
    fx.registry.register(
        "echo",
        |args| async move { Ok(json!({ "echo": args })) },
        RegisterOptions::default(),
    );

    let response = fx.registry.dispatch("echo", json!(42)).await;
    assert!(response.success);
    assert_eq!(response.data, Some(json!({ "echo": 42 })));

    let (channel, notice) = next_status(&mut fx.events);
    assert_eq!(channel, "echo-status");
    assert!(notice.success);
    assert_eq!(notice.message, "Operation echo completed successfully");
    assert_eq!(notice.data, Some(json!({ "echo": 42 })));
}

#[tokio::test]
async fn failing_handler_becomes_a_failed_response() {
    let mut fx = fixture();
    fx.registry.register(
        "explode",
        fails,
        RegisterOptions::default(),
    );

    let response = fx.registry.dispatch("explode", Value::Null).await;
    assert!(!response.success);
    assert_eq!(response.error.as_deref(), Some("printer on fire"));

    let (_, notice) = next_status(&mut fx.events);
    assert!(!notice.success);
    assert_eq!(notice.message, "printer on fire");

    let newest = &fx.logs.recent_logs(1)[0];
    assert_eq!(newest.level, LogLevel::Error);
    assert_eq!(newest.message, "Error handling command request: explode");
    assert_eq!(newest.details.as_ref().unwrap()["error"], json!("printer on fire"));
}

#[tokio::test]
async fn panicking_handler_is_isolated() {
    let fx = fixture();
    fx.registry.register(
        "panic",
        panics,
        RegisterOptions::default(),
    );

    let response = fx.registry.dispatch("panic", Value::Null).await;
    assert!(!response.success);
    let error = response.error.expect("error message");
    assert!(error.contains("panicked") && error.contains("handler bug"), "{error}");

    // The registry still works afterwards.
    fx.registry
        .register("ok", |_args| async { Ok(Value::Null) }, RegisterOptions::default());
    assert!(fx.registry.dispatch("ok", Value::Null).await.success);
}

#[tokio::test]
async fn unknown_channel_resolves_to_failure() {
    let fx = fixture();
    let response = fx.registry.dispatch("missing", Value::Null).await;
    assert!(!response.success);
    assert!(response.error.unwrap().contains("missing"));
}

#[tokio::test]
async fn notifications_follow_registration_options() {
    let mut fx = fixture();
    fx.registry.register(
        "custom",
        |_args| async { Ok(Value::Null) },
        RegisterOptions {
            notification_channel: Some("jobs".to_string()),
            ..RegisterOptions::default()
        },
    );
    fx.registry.register(
        "silent",
        |_args| async { Ok(Value::Null) },
        RegisterOptions {
            notify: false,
            ..RegisterOptions::default()
        },
    );

    fx.registry.dispatch("silent", Value::Null).await;
    fx.registry.dispatch("custom", Value::Null).await;
    let (channel, _) = next_status(&mut fx.events);
    assert_eq!(channel, "jobs");
    assert!(fx.events.try_recv().is_err());
}

// ---------------------------------------------------------------------------
// 3. Request-log suppression
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true, flavor = "current_thread")]
async fn identical_requests_are_logged_once_per_window() {
    let fx = fixture();
    let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let counter = calls.clone();
    fx.registry.register(
        "echo",
        move |args| {
            counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            async move { Ok(args) }
        },
        RegisterOptions::default(),
    );

    fx.registry.dispatch("echo", json!({"n": 1})).await;
    tokio::time::advance(Duration::from_secs(1)).await;
    fx.registry.dispatch("echo", json!({"n": 1})).await;
    assert_eq!(count_messages(&fx.logs, "Handling command request: echo"), 1);

    tokio::time::advance(Duration::from_secs(6)).await;
    fx.registry.dispatch("echo", json!({"n": 1})).await;
    assert_eq!(count_messages(&fx.logs, "Handling command request: echo"), 2);

    // Different arguments are a different request.
    fx.registry.dispatch("echo", json!({"n": 2})).await;
    assert_eq!(count_messages(&fx.logs, "Handling command request: echo"), 3);
    assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 4);
}

#[tokio::test]
async fn quiet_registrations_do_not_log_requests() {
    let fx = fixture();
    fx.registry
        .register("poll", |_args| async { Ok(Value::Null) }, RegisterOptions::quiet());
    fx.registry.dispatch("poll", Value::Null).await;
    assert_eq!(count_messages(&fx.logs, "Handling command request: poll"), 0);
}

// ---------------------------------------------------------------------------
// 4. Built-in handlers
// ---------------------------------------------------------------------------

#[tokio::test]
async fn get_logs_never_writes_to_the_log() {
    let fx = fixture();
    fx.logs.info("hello", None);
    assert!(register_get_logs(&fx.registry, fx.logs.clone()));

    let response = fx.registry.dispatch("get-logs", json!({"limit": 5})).await;
    assert!(response.success);
    let entries = response.data.expect("entries");
    assert_eq!(entries.as_array().expect("array").len(), 1);
    assert_eq!(entries[0]["message"], json!("hello"));

    let failed = fx.registry.dispatch("get-logs", json!({"limit": "x"})).await;
    assert!(!failed.success);
    assert_eq!(fx.logs.recent_logs(100).len(), 1, "get-logs must stay silent");
}

#[derive(Default)]
struct AcceptingBackend;

impl PrinterBackend for AcceptingBackend {
    async fn default_printer(&self) -> Result<Option<String>, PrintError> {
        Ok(Some("Front Desk".to_string()))
    }

    async fn print(&self, _request: InvocationRequest<'_>) -> Result<(), PrintError> {
        Ok(())
    }
}

#[tokio::test]
async fn print_summary_round_trip_reports_success() {
    let mut fx = fixture();
    let tools = fx.dir.path().join("resources");
    fs::create_dir_all(&tools).expect("tools dir");
    fs::write(tools.join("SumatraPDF-3.5.exe"), b"").expect("tool");
    let pipeline = Arc::new(PrintPipeline::new(
        PassthroughGenerator::new("txt"),
        AcceptingBackend,
        ToolResolver::new(
            vec![tools],
            ToolPattern::new("SumatraPDF", "exe").expect("pattern"),
        ),
        fx.dir.path().join("tmp"),
        fx.logs.clone(),
    ));
    assert!(register_print_summary(&fx.registry, pipeline));

    let response = fx
        .registry
        .dispatch(
            "print-summary",
            json!({"document": {"content": "Total: 10,000"}, "options": {"base_name": "summary"}}),
        )
        .await;
    assert!(response.success, "{:?}", response.error);
    assert_eq!(response.data, Some(json!({"success": true})));

    let (channel, notice) = next_status(&mut fx.events);
    assert_eq!(channel, "print-summary-status");
    assert!(notice.success);
    assert_eq!(notice.message, "Operation print-summary completed successfully");
    assert_eq!(notice.data, Some(json!({"success": true})));

    let leftovers = fs::read_dir(fx.dir.path().join("tmp")).expect("tmp").count();
    assert_eq!(leftovers, 0);
}
