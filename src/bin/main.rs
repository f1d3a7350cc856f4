//! Notemind CLI - Note I/O Interface
//!
//! One-shot commands open the durable store, act, wait for the resulting
//! executions to settle, and print JSON:
//!   notemind spawn <json>        → Spawn a Note, output {"id"}
//!   notemind get <id>            → Read a Note
//!   notemind list                → Every Note
//!   notemind run <id>            → Explicit run (bypasses the self-spawn guard)
//!   notemind pause | resume      → Toggle the scheduler gate
//!   notemind snapshot            → {nodes, edges} for visualizers
//!   notemind capabilities        → Registered capabilities and their schemas
//!
//! Server:
//!   notemind serve --port 8080
//!
//! Output format:
//!   --json     Output raw JSON (default for non-tty)
//!   --pretty   Pretty-print JSON (default for tty)

use notemind::logging::init_logging;
use notemind::node::{load_dotenv, Backend};
use notemind::{ControlCommand, Node, NodeConfig, SpawnRequest};
use serde_json::{json, Value};
use std::env;
use std::io::IsTerminal;
use std::time::Duration;
use tracing::{debug, info};

fn main() {
    init_logging();

    let args: Vec<String> = env::args().collect();
    let opts = ParsedArgs::parse(&args[1..]);

    if opts.help {
        print_usage();
        return;
    }

    if opts.version {
        println!("notemind {}", env!("CARGO_PKG_VERSION"));
        return;
    }

    let result = match opts.command.as_deref() {
        Some("serve") => cmd_serve(&opts),
        Some(cmd @ ("spawn" | "get" | "list" | "ls" | "run" | "pause" | "resume" | "snapshot" | "capabilities" | "caps")) => {
            with_node(&opts, cmd)
        }
        Some(cmd) => Err(format!("Unknown command: {}", cmd)),
        None => {
            print_usage();
            return;
        }
    };

    let pretty = opts.pretty || (!opts.json && std::io::stdout().is_terminal());
    match result {
        Ok(output) => println!("{}", render(&output, pretty)),
        Err(e) => {
            eprintln!("{}", render(&json!({"error": e}), pretty));
            std::process::exit(1);
        }
    }
}

fn render(value: &Value, pretty: bool) -> String {
    let rendered = if pretty { serde_json::to_string_pretty(value) } else { serde_json::to_string(value) };
    rendered.unwrap_or_else(|e| format!("{{\"error\":\"render failed: {}\"}}", e))
}

#[derive(Default)]
struct ParsedArgs {
    command: Option<String>,
    target: Option<String>,
    data: Option<String>,
    app: Option<String>,
    data_dir: Option<String>,
    backend: Option<String>,
    concurrency: Option<usize>,
    max_retries: Option<u32>,
    base_delay_ms: Option<u64>,
    port: Option<u16>,
    no_wait: bool,
    json: bool,
    pretty: bool,
    help: bool,
    version: bool,
}

impl ParsedArgs {
    fn parse(args: &[String]) -> Self {
        load_dotenv(".env");

        let mut opts = ParsedArgs::default();
        let mut positional = Vec::new();
        let mut i = 0;

        while i < args.len() {
            let arg = &args[i];
            let next = args.get(i + 1).cloned();
            match arg.as_str() {
                "--help" | "-h" => opts.help = true,
                "--version" | "-V" => opts.version = true,
                "--json" => opts.json = true,
                "--pretty" => opts.pretty = true,
                "--no-wait" => opts.no_wait = true,
                "--app" | "-a" => { opts.app = next; i += 1; }
                "--data-dir" | "-d" => { opts.data_dir = next; i += 1; }
                "--backend" | "-b" => { opts.backend = next; i += 1; }
                "--concurrency" | "-k" => { opts.concurrency = next.and_then(|v| v.parse().ok()); i += 1; }
                "--retries" => { opts.max_retries = next.and_then(|v| v.parse().ok()); i += 1; }
                "--base-delay-ms" => { opts.base_delay_ms = next.and_then(|v| v.parse().ok()); i += 1; }
                "--port" | "-p" => { opts.port = next.and_then(|v| v.parse().ok()); i += 1; }
                _ if !arg.starts_with('-') => positional.push(arg.clone()),
                _ => {} // Ignore unknown flags
            }
            i += 1;
        }

        // First positional is command, second the target, rest is data (joined)
        if !positional.is_empty() {
            opts.command = Some(positional.remove(0));
        }
        if !positional.is_empty() {
            opts.target = Some(positional.remove(0));
        }
        if !positional.is_empty() {
            opts.data = Some(positional.join(" "));
        }

        opts
    }

    /// Environment first, flags on top. One-shot commands default to the file backend.
    fn config(&self, one_shot: bool) -> Result<NodeConfig, String> {
        let mut config = NodeConfig::from_env();
        if one_shot && env::var("NOTEMIND_BACKEND").is_err() {
            config.backend = Backend::File;
        }
        if let Some(app) = &self.app {
            config.app = app.clone();
        }
        if let Some(raw) = &self.backend {
            config.backend = Backend::from_str(raw).ok_or_else(|| format!("Invalid backend: {}", raw))?;
        }
        if let Some(dir) = &self.data_dir {
            config = config.with_data_dir(dir);
        }
        if let Some(k) = self.concurrency {
            config = config.with_concurrency(k);
        }
        if let Some(n) = self.max_retries {
            config = config.with_max_retries(n);
        }
        if let Some(ms) = self.base_delay_ms {
            config = config.with_base_delay(Duration::from_millis(ms));
        }
        if let Some(port) = self.port {
            config = config.with_port(port);
        }
        Ok(config)
    }
}

fn print_usage() {
    println!(
        r#"notemind - Note execution engine

USAGE:
    notemind <command> [target] [data] [options]

COMMANDS:
    spawn <json>            Spawn a Note from a spawn request
    get <id>                Read a Note
    list                    List every Note
    run <id>                Explicitly run a Note
    pause                   Pause the scheduler gate
    resume                  Resume the scheduler gate
    snapshot                Export {{nodes, edges}}
    capabilities            List registered capabilities
    serve                   Start HTTP server

NODE OPTIONS:
    --app, -a <name>        Application name (env: NOTEMIND_APP)
    --backend, -b <kind>    memory|file (env: NOTEMIND_BACKEND; one-shot default: file)
    --data-dir, -d <path>   Note directory (env: NOTEMIND_DATA_DIR)
    --concurrency, -k <n>   Max concurrent executions (env: NOTEMIND_CONCURRENCY, default 10)
    --retries <n>           Attempts per trigger (env: NOTEMIND_MAX_RETRIES, default 3)
    --base-delay-ms <ms>    Backoff base (env: NOTEMIND_BASE_DELAY_MS, default 1000)
    --no-wait               Do not wait for triggered executions to settle

SERVER OPTIONS:
    --port, -p <port>       Server port (default: 8080, env: NOTEMIND_PORT)

OUTPUT OPTIONS:
    --json                  Raw JSON output
    --pretty                Pretty-print JSON
    --version, -V           Print version

EXAMPLES:
    # Spawn a task with two children
    notemind spawn '{{"content":{{"type":"task","desc":"plan"}},"logic":{{"type":"sequential","steps":[
        {{"capability":"spawn","input":{{"content":{{"type":"step","desc":"a"}}}}}},
        {{"capability":"spawn","input":{{"content":{{"type":"step","desc":"b"}}}}}}]}}}}'

    # Inspect
    notemind get root
    notemind snapshot --json | jq '.edges | length'

    # Gate
    notemind pause
    notemind resume
"#
    );
}

fn runtime() -> Result<tokio::runtime::Runtime, String> {
    tokio::runtime::Runtime::new().map_err(|e| format!("Failed to create runtime: {}", e))
}

fn with_node(opts: &ParsedArgs, cmd: &str) -> Result<Value, String> {
    let config = opts.config(true)?;
    runtime()?.block_on(async {
        let node = Node::start(config).await.map_err(|e| format!("Failed to start node: {}", e))?;
        let result = dispatch(&node, opts, cmd).await;
        if result.is_ok() && !opts.no_wait {
            node.settle().await;
        }
        node.close().await;
        result
    })
}

async fn dispatch(node: &Node, opts: &ParsedArgs, cmd: &str) -> Result<Value, String> {
    match cmd {
        "spawn" => {
            let raw = match (&opts.target, &opts.data) {
                (Some(t), Some(d)) => format!("{} {}", t, d),
                (Some(t), None) => t.clone(),
                _ => return Err("Spawn request required: notemind spawn <json>".into()),
            };
            let value: Value = serde_json::from_str(&raw).map_err(|e| format!("Invalid JSON: {}", e))?;
            let request = SpawnRequest::from_value(value).map_err(|e| e.to_string())?;
            let id = node.spawn(request).await.map_err(|e| format!("Spawn failed: {}", e))?;
            Ok(json!({"id": id}))
        }
        "get" => {
            let id = opts.target.as_ref().ok_or("Id required: notemind get <id>")?;
            let note = node.get(id).await.map_err(|e| e.to_string())?;
            serde_json::to_value(note).map_err(|e| e.to_string())
        }
        "list" | "ls" => {
            let notes = node.list().await.map_err(|e| format!("List failed: {}", e))?;
            Ok(json!({"count": notes.len(), "notes": notes}))
        }
        "run" => {
            let id = opts.target.as_ref().ok_or("Id required: notemind run <id>")?;
            node.run(id).await.map_err(|e| format!("Run failed: {}", e))?;
            Ok(json!({"id": id, "queued": true}))
        }
        "pause" | "resume" => {
            let command = ControlCommand::from_str(cmd).ok_or("unreachable control command")?;
            let note = node.control(command).await.map_err(|e| format!("Control failed: {}", e))?;
            Ok(json!({"command": command.as_str(), "paused": note.is_paused()}))
        }
        "snapshot" => {
            let snapshot = node.snapshot().await.map_err(|e| format!("Snapshot failed: {}", e))?;
            serde_json::to_value(snapshot).map_err(|e| e.to_string())
        }
        _ => serde_json::to_value(node.capabilities()).map_err(|e| e.to_string()),
    }
}

#[cfg(feature = "server")]
fn cmd_serve(opts: &ParsedArgs) -> Result<Value, String> {
    use notemind::{create_router_with_name, install_signal_handlers};
    use std::sync::Arc;

    let config = opts.config(false)?;
    let port = config.port;
    let app_name = config.app.clone();

    runtime()?.block_on(async {
        // Install signal handlers for graceful shutdown
        let signals = install_signal_handlers();

        let node = Arc::new(Node::start(config).await.map_err(|e| format!("Failed to start node: {}", e))?);
        let router = create_router_with_name(node.clone(), &app_name);
        let addr = format!("0.0.0.0:{}", port);

        info!("Notemind server listening on http://{}", addr);
        info!("Endpoints:");
        info!("  GET  /health              - Health check");
        info!("  GET  /notes               - List notes");
        info!("  POST /notes               - Spawn note");
        debug!("  GET  /notes/:id           - Read note");
        debug!("  POST /notes/:id/run       - Explicit run");
        debug!("  POST /control            - {{command: pause|resume}}");
        debug!("  GET  /snapshot            - Graph export");
        debug!("  GET  /capabilities        - Registered capabilities");

        let listener = tokio::net::TcpListener::bind(&addr).await
            .map_err(|e| format!("Failed to bind: {}", e))?;

        // Run server with graceful shutdown
        tokio::select! {
            result = axum::serve(listener, router) => {
                result.map_err(|e| format!("Server error: {}", e))?;
            }
            _ = signals.wait() => {
                info!("Shutdown signal received, stopping server...");
            }
        }

        node.close().await;
        Ok::<(), String>(())
    }).map_err(|e| format!("Server failed: {}", e))?;

    Ok(json!({"status": "stopped"}))
}

#[cfg(not(feature = "server"))]
fn cmd_serve(_opts: &ParsedArgs) -> Result<Value, String> {
    Err("Built without the `server` feature".into())
}
