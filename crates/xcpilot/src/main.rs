use anyhow::{Context, Result, anyhow, bail};
use serde_json::Value;
use std::env;
use std::process;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use xcpilot_automation::mcp::{McpServer, UiAutomationKit, stdio};
use xcpilot_automation::{
    Action, AutomationConfig, Backend, CancellationToken, Dispatcher, ExecutionContext,
    SystemProcessRunner,
};

#[tokio::main]
async fn main() {
    // stdout is the protocol channel; logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    match run(&args).await {
        Ok(code) => process::exit(code),
        Err(err) => {
            eprintln!("Error: {:#}", err);
            process::exit(1);
        }
    }
}

async fn run(args: &[String]) -> Result<i32> {
    let Some(command) = args.first() else {
        print_usage();
        bail!("No command provided");
    };

    match command.as_str() {
        "serve" => serve().await.map(|_| 0),
        "run" => run_once(&args[1..]).await,
        "support" => {
            print_support();
            Ok(0)
        }
        "help" | "-h" | "--help" => {
            print_usage();
            Ok(0)
        }
        "-v" | "--version" => {
            println!("xcpilot {}", env!("CARGO_PKG_VERSION"));
            Ok(0)
        }
        other => {
            print_usage();
            Err(anyhow!("Unknown command: {}", other))
        }
    }
}

fn load_config() -> Result<Arc<AutomationConfig>> {
    let config = AutomationConfig::load_default().context("Failed to load configuration")?;
    Ok(Arc::new(config))
}

async fn serve() -> Result<()> {
    let config = load_config()?;
    let dispatcher = Arc::new(Dispatcher::new(Arc::new(SystemProcessRunner::new()), config.clone()));
    let shutdown = CancellationToken::new();

    let mut server = McpServer::new();
    server.register_tool(Arc::new(UiAutomationKit::new(
        dispatcher,
        config,
        shutdown.clone(),
    )?));
    tracing::info!(tools = server.tool_schemas().len(), "xcpilot MCP server ready on stdio");

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let stdout = tokio::io::stdout();
    tokio::select! {
        result = stdio::serve(&server, stdin, stdout) => result?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupted, cancelling in-flight calls");
            shutdown.cancel();
        }
    }
    Ok(())
}

#[derive(Debug, Default)]
struct RunArgs {
    action: String,
    backend: Option<String>,
    device: Option<String>,
    application: Option<String>,
    scheme: Option<String>,
    runner: Option<String>,
    params: Option<String>,
}

fn parse_run_args(args: &[String]) -> Result<RunArgs> {
    let mut parsed = RunArgs::default();
    let mut iter = args.iter();

    while let Some(arg) = iter.next() {
        let mut value = |flag: &str| {
            iter.next()
                .cloned()
                .ok_or_else(|| anyhow!("{} requires a value", flag))
        };
        match arg.as_str() {
            "--backend" | "-b" => parsed.backend = Some(value(arg)?),
            "--device" | "-d" => parsed.device = Some(value(arg)?),
            "--app" | "-a" => parsed.application = Some(value(arg)?),
            "--scheme" | "-s" => parsed.scheme = Some(value(arg)?),
            "--runner" | "-r" => parsed.runner = Some(value(arg)?),
            "--params" | "-p" => parsed.params = Some(value(arg)?),
            flag if flag.starts_with('-') => bail!("Unknown option: {}", flag),
            action if parsed.action.is_empty() => parsed.action = action.to_string(),
            extra => bail!("Unexpected argument: {}", extra),
        }
    }

    if parsed.action.is_empty() {
        bail!("run requires an action, e.g. `xcpilot run tap --params '{{\"identifier\":\"save\"}}'`");
    }
    Ok(parsed)
}

async fn run_once(args: &[String]) -> Result<i32> {
    let args = parse_run_args(args)?;
    let action: Action = args.action.parse().map_err(|e: String| anyhow!(e))?;
    let backend = Backend::parse_choice(args.backend.as_deref()).map_err(|e| anyhow!(e))?;
    let params: Value = match &args.params {
        Some(text) => serde_json::from_str(text).context("--params must be a JSON object")?,
        None => Value::Null,
    };

    let config = load_config()?;
    let cancel = CancellationToken::new();

    let mut ctx = ExecutionContext::new(action)
        .with_params(params)
        .with_cancellation(cancel.clone());
    if let Some(backend) = backend {
        ctx = ctx.with_backend(backend);
    }
    if let Some(device) = args.device {
        ctx = ctx.with_device(device);
    }
    if let Some(application) = args.application {
        ctx = ctx.with_application(application);
    }
    if let Some(command) = config.resolve_runner_command(args.runner.as_deref(), args.scheme.as_deref()) {
        ctx = ctx.with_runner_command(command);
    }

    let dispatcher = Dispatcher::new(Arc::new(SystemProcessRunner::new()), config);
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted, cancelling");
            interrupt.cancel();
        }
    });

    let envelope = dispatcher.execute(&ctx).await;
    println!("{}", serde_json::to_string_pretty(&envelope)?);
    Ok(if envelope.ok { 0 } else { 1 })
}

fn print_support() {
    print!("{:<16}", "action");
    for backend in Backend::ALL {
        print!("{:<10}", backend.as_str());
    }
    println!();
    for action in Action::ALL {
        print!("{:<16}", action.as_str());
        for backend in Backend::ALL {
            print!("{:<10}", if Dispatcher::supports(backend, action) { "yes" } else { "-" });
        }
        println!();
    }
}

fn print_usage() {
    println!("xcpilot - UI automation for Xcode-platform apps");
    println!();
    println!("USAGE:");
    println!("    xcpilot <COMMAND> [OPTIONS]");
    println!();
    println!("COMMANDS:");
    println!("    serve      Serve the ui_automation MCP tool over stdio");
    println!("    run        Run one automation action and print its result");
    println!("    support    Print the backend/action support matrix");
    println!("    help       Print this help message");
    println!();
    println!("RUN OPTIONS:");
    println!("    xcpilot run <action> [--backend B] [--device ID] [--app APP]");
    println!("                [--scheme S] [--runner CMD] [--params JSON]");
    println!();
    println!("Configuration is read from $XCPILOT_CONFIG or <config dir>/xcpilot/config.json.");
    println!("Set RUST_LOG to adjust log verbosity (logs are written to stderr).");
}
