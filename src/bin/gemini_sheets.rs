//! gemini-sheets — 在终端中驱动公式运行时：提交提示、查看统计、管理凭据与设置。
//!
//! Usage:
//!   gemini-sheets ask <prompt> [--model M] [--system S] [--temperature T]
//!   gemini-sheets stats
//!   gemini-sheets settings [--experimental on|off] [--legacy on|off] [--default-model M]
//!   gemini-sheets setup <api-key>
//!   gemini-sheets reset

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context};
use gemini_sheets::store::FileStore;
use gemini_sheets::telemetry::init_tracing;
use gemini_sheets::{GatewayConfig, SettingsUpdate, SheetsGateway};

const DEFAULT_STATE_DIR: &str = ".gemini-sheets";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first().map(String::as_str) else {
        print_usage();
        std::process::exit(1);
    };
    let rest = &args[1..];

    match command {
        "help" | "--help" | "-h" => {
            print_usage();
            return Ok(());
        }
        "version" | "--version" | "-V" => {
            println!("gemini-sheets {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        _ => {}
    }

    let gateway = open_gateway(rest).await?;
    match command {
        "ask" => cmd_ask(&gateway, rest).await,
        "stats" => cmd_stats(&gateway).await,
        "settings" => cmd_settings(&gateway, rest).await,
        "setup" => cmd_setup(&gateway, rest).await,
        "reset" => cmd_reset(&gateway).await,
        other => {
            eprintln!("Unknown command: {other}");
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    }
}

fn print_usage() {
    println!(
        r#"gemini-sheets — Gemini 公式运行时命令行工具

USAGE:
    gemini-sheets <COMMAND> [OPTIONS]

COMMANDS:
    ask <prompt>                Submit a prompt and wait for the answer
        --model <id>            Model id or legacy alias
        --system <text>         System prompt
        --temperature <t>       Sampling temperature (default 0.7)
    stats                       Show request statistics
    settings                    Show settings, or change them with
        --experimental on|off
        --legacy on|off
        --default-model <id>
    setup <api-key>             Store and validate an API key
    reset                       Reset state to defaults
    version                     Show version information

GLOBAL OPTIONS:
    --state-dir <path>          State directory (default .gemini-sheets)
    --config <file>             YAML configuration file

ENVIRONMENT:
    GEMINI_API_KEY              Credential used when none is stored
    GEMINI_SHEETS_*             Configuration overrides
    RUST_LOG                    Log filter (default info)"#
    );
}

fn flag<'a>(args: &'a [String], name: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == name)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

/// First argument that is neither a flag nor a flag's value.
fn positional(args: &[String]) -> Option<&str> {
    let mut skip_next = false;
    for arg in args {
        if skip_next {
            skip_next = false;
            continue;
        }
        if arg.starts_with("--") {
            skip_next = true;
            continue;
        }
        return Some(arg);
    }
    None
}

fn on_off(value: Option<&str>, name: &str) -> anyhow::Result<Option<bool>> {
    match value {
        None => Ok(None),
        Some("on" | "true" | "1") => Ok(Some(true)),
        Some("off" | "false" | "0") => Ok(Some(false)),
        Some(other) => bail!("{name} expects on|off, got {other:?}"),
    }
}

async fn open_gateway(args: &[String]) -> anyhow::Result<SheetsGateway> {
    let config = match flag(args, "--config") {
        Some(path) => GatewayConfig::from_yaml_file(path)
            .with_context(|| format!("loading config from {path}"))?,
        None => GatewayConfig::default(),
    }
    .apply_env_overrides();

    let state_dir = PathBuf::from(flag(args, "--state-dir").unwrap_or(DEFAULT_STATE_DIR));
    let store = FileStore::new(state_dir);

    let gateway = SheetsGateway::builder()
        .config(config)
        .store(Arc::new(store))
        .build()
        .await?;

    if !gateway.get_settings().await.api_key_set {
        if let Ok(key) = std::env::var("GEMINI_API_KEY") {
            gateway.set_credential(&key).await;
        }
    }
    Ok(gateway)
}

async fn cmd_ask(gateway: &SheetsGateway, args: &[String]) -> anyhow::Result<()> {
    let prompt = positional(args).ok_or_else(|| anyhow!("ask requires a prompt"))?;
    let model = flag(args, "--model");
    let system = flag(args, "--system");
    let temperature = flag(args, "--temperature")
        .map(|t| t.parse::<f64>())
        .transpose()
        .context("--temperature must be a number")?;

    loop {
        let answer = gateway
            .submit_prompt(prompt, model, system, temperature)
            .await;
        if answer.starts_with('⏳') {
            eprintln!("{answer}");
            gateway.wait_idle().await;
            continue;
        }
        if answer.starts_with('❌') || answer.starts_with('⚠') {
            eprintln!("{answer}");
            std::process::exit(2);
        }
        println!("{answer}");
        return Ok(());
    }
}

async fn cmd_stats(gateway: &SheetsGateway) -> anyhow::Result<()> {
    let stats = gateway.get_stats().await;
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}

async fn cmd_settings(gateway: &SheetsGateway, args: &[String]) -> anyhow::Result<()> {
    let update = SettingsUpdate {
        experimental: on_off(flag(args, "--experimental"), "--experimental")?,
        show_legacy: on_off(flag(args, "--legacy"), "--legacy")?,
        default_model: flag(args, "--default-model").map(str::to_string),
    };
    if update != SettingsUpdate::default() && !gateway.update_settings(update).await {
        bail!("failed to save settings");
    }
    let settings = gateway.get_settings().await;
    println!("{}", serde_json::to_string_pretty(&settings)?);
    Ok(())
}

async fn cmd_setup(gateway: &SheetsGateway, args: &[String]) -> anyhow::Result<()> {
    let key = positional(args).ok_or_else(|| anyhow!("setup requires an API key"))?;
    let outcome = gateway.setup_credential(key).await;
    if outcome.success {
        println!("✅ API key saved and validated");
        Ok(())
    } else {
        bail!(
            "API key rejected: {}",
            outcome.error.unwrap_or_else(|| "unknown error".to_string())
        )
    }
}

async fn cmd_reset(gateway: &SheetsGateway) -> anyhow::Result<()> {
    if !gateway.reset_all().await {
        bail!("failed to reset state");
    }
    println!("State reset to defaults");
    Ok(())
}
