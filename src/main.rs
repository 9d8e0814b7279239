//! CLI entry point for netblock.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use netblock::cli::{Cli, Command};
use netblock::config::{load_config, load_default_config, NetblockConfig};
use netblock::engine::{BlockResult, EngineOptions, EngineSelector};
use netblock::restore::{JsonDeviceRepository, RestorationProcedure, RestorationState};
use netblock::security_log::TracingSecurityLog;
use netblock::utils::{current_platform, init_debug_logging, local_mac_addresses};
use netblock::SystemCommandRunner;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse_args();

    init_debug_logging(cli.debug);

    match run(&cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(1)
        }
    }
}

/// Execute the selected subcommand; `Ok(false)` means it ran but did not succeed.
async fn run(cli: &Cli) -> anyhow::Result<bool> {
    let config = match &cli.settings {
        Some(path) => load_config(path)
            .with_context(|| format!("Error loading config from {}", path.display()))?,
        None => load_default_config().context("Error loading default config")?,
    };

    let selector = build_selector(&config);

    match &cli.command {
        Command::Block { mac, ip } => {
            let engine = selector.select_or_null();
            let result = engine.block_device(mac, ip.as_deref()).await;
            print_result(cli.json, &result)
        }
        Command::Unblock { mac, ip } => {
            let engine = selector.select_or_null();
            let result = engine.unblock_device(mac, ip.as_deref()).await;
            print_result(cli.json, &result)
        }
        Command::Clear => {
            let engine = selector.select_or_null();
            let result = engine.clear_all_rules().await;
            print_result(cli.json, &result)
        }
        Command::Check => check(cli.json, &selector).await,
        Command::Restore => restore(cli.json, &config, selector).await,
    }
}

fn build_selector(config: &NetblockConfig) -> EngineSelector {
    let runner = Arc::new(SystemCommandRunner::new(Duration::from_millis(
        config.command_timeout_ms,
    )));
    let options = EngineOptions::from_config(config, &local_mac_addresses());
    tracing::debug!(
        "Engine options: chain={} prefix={} protected={}",
        options.chain_name,
        options.rule_prefix,
        options.protected_macs.len()
    );

    EngineSelector::new(runner, options).with_security_log(Arc::new(TracingSecurityLog))
}

fn print_result(json: bool, result: &BlockResult) -> anyhow::Result<bool> {
    if json {
        println!("{}", serde_json::to_string_pretty(result)?);
    } else if result.success {
        println!("{}", result.message);
        if let Some(details) = &result.error_details {
            println!("  note: {}", details);
        }
    } else {
        eprintln!("{} ({})", result.message, result.error_code);
        if let Some(details) = &result.error_details {
            eprintln!("  {}", details);
        }
    }
    Ok(result.success)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CheckReport {
    platform: String,
    engine: &'static str,
    supported: bool,
    has_permissions: bool,
}

async fn check(json: bool, selector: &EngineSelector) -> anyhow::Result<bool> {
    let engine = selector.select_or_null();
    let report = CheckReport {
        platform: current_platform()
            .map(|p| p.to_string())
            .unwrap_or_else(|| std::env::consts::OS.to_string()),
        engine: engine.engine_name(),
        supported: engine.is_supported(),
        has_permissions: engine.is_supported() && engine.check_permissions().await,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Platform:    {}", report.platform);
        println!("Engine:      {}", report.engine);
        println!("Supported:   {}", report.supported);
        println!("Permissions: {}", report.has_permissions);
    }
    Ok(report.has_permissions)
}

async fn restore(
    json: bool,
    config: &NetblockConfig,
    selector: EngineSelector,
) -> anyhow::Result<bool> {
    let devices_file = config
        .devices_file
        .clone()
        .context("No devicesFile configured; nothing to restore from")?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted; cancelling restore");
            on_interrupt.cancel();
        }
    });

    let procedure =
        RestorationProcedure::new(selector, Arc::new(JsonDeviceRepository::new(devices_file)))
            .with_startup_delay(Duration::from_millis(config.restore_delay_ms))
            .with_cancellation(cancel);
    let outcome = procedure.run().await;
    let rules = outcome.engine.get_active_rules();

    if json {
        let body = serde_json::json!({
            "report": outcome.report,
            "activeRules": rules,
        });
        println!("{}", serde_json::to_string_pretty(&body)?);
    } else {
        println!(
            "Restoration {}: {}/{} device(s) restored",
            outcome.report.state, outcome.report.restored, outcome.report.total
        );
        for rule in &rules {
            println!(
                "  {} {} {}",
                rule.rule_name,
                rule.mac_address,
                rule.ip_string().unwrap_or_else(|| "-".to_string())
            );
        }
    }

    Ok(outcome.report.state != RestorationState::Failed)
}
