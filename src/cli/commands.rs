use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::{
    discover_pattern_files, log_pattern_report, merge_patterns, AppConfig,
};
use crate::mode::{run_mode_listener, ModeController};
use crate::probe::{wait_for_upstream, PROBE_ATTEMPTS, PROBE_RETRY_DELAY};
use crate::rules::RuleSet;
use crate::server::{run_server, ServerState};

use super::template;
use super::{Cli, Commands};

/// Execute CLI commands
pub async fn execute_command(cli: &Cli) -> Result<()> {
    match &cli.command {
        Commands::Run { config } => {
            let config_path = expand_path(config)?;
            run_proxy(&config_path).await?;
        }
        Commands::Check { config, format } => {
            let config_path = expand_path(config)?;
            check_config(&config_path, format)?;
        }
        Commands::Template { output } => {
            template::generate_config_template(output.as_deref())?;
        }
    }
    Ok(())
}

/// 展开路径中的 `~` 与环境变量
pub fn expand_path(path: &str) -> Result<String> {
    let expanded = shellexpand::full(path)
        .with_context(|| format!("Failed to expand path: {}", path))?;
    Ok(expanded.into_owned())
}

/// 运行代理
///
/// 启动顺序：加载配置 → 合并白名单文件 → 构建模式控制器与规则 →
/// 探测上游（失败即退出，不开始服务）→ 启动模式监听与前端监听。
async fn run_proxy(config_path: &str) -> Result<()> {
    let mut config = AppConfig::load_or_default(config_path)?;

    apply_whitelist_files(&mut config, config_path)?;

    let controller = Arc::new(ModeController::new(
        config.mode_names(),
        config.key_map(),
        &config.proxy.default_mode,
    )?);
    let rules = RuleSet::new(
        config.block_patterns(),
        config.allow_patterns(),
        config.mode_patterns(),
        controller.clone(),
    );

    info!("Upstream proxy: {}", config.proxy.upstream_addr);
    let keys: Vec<String> = controller
        .key_bindings()
        .into_iter()
        .map(|(key, mode)| format!("{}={}", key, mode))
        .collect();
    info!(
        "Default mode: [{}] (switch keys: {})",
        config.proxy.default_mode,
        keys.join(" ")
    );

    // 启动前检查上游代理是否可用，探测耗尽即为致命错误
    wait_for_upstream(
        &config.proxy.upstream_addr,
        PROBE_ATTEMPTS,
        PROBE_RETRY_DELAY,
    )
    .await
    .context("Upstream proxy is not available")?;

    // 模式切换监听独立运行，stdin 关闭后静默退出
    let listener_controller = controller.clone();
    tokio::spawn(async move {
        if let Err(e) = run_mode_listener(tokio::io::stdin(), listener_controller).await {
            warn!("Mode listener stopped: {}", e);
        }
    });

    let state = Arc::new(ServerState::new(config.proxy.upstream_addr.clone(), rules));
    run_server(&config.proxy.listen_addr, state).await?;

    Ok(())
}

/// 用配置文件所在目录下发现的 *.whitelist 文件替换白名单
fn apply_whitelist_files(config: &mut AppConfig, config_path: &str) -> Result<()> {
    let scan_root = Path::new(config_path)
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let files = discover_pattern_files(scan_root)
        .with_context(|| format!("Failed to scan {} for whitelist files", scan_root.display()))?;

    if files.is_empty() {
        info!(
            "No *.whitelist files found under {}, keeping configured whitelist ({} entries)",
            scan_root.display(),
            config.whitelist.len()
        );
        return Ok(());
    }

    let merged = merge_patterns(&files);
    if merged.is_empty() {
        info!(
            "Whitelist files found but no valid entries, keeping configured whitelist ({} entries)",
            config.whitelist.len()
        );
        return Ok(());
    }

    info!(
        "Loaded {} whitelist entries from {} file(s) under {}",
        merged.len(),
        files.len(),
        scan_root.display()
    );
    log_pattern_report(&files);
    config.whitelist = merged;
    Ok(())
}

/// 检查配置文件格式
fn check_config(config_path: &str, format: &str) -> Result<()> {
    if !Path::new(config_path).exists() {
        anyhow::bail!("Configuration file not found: {}", config_path);
    }

    let config = match AppConfig::load(config_path) {
        Ok(config) => config,
        Err(e) => {
            println!("✗ Configuration validation failed!");
            println!("\nError details:");
            println!("{:#}", e);
            println!("\nCommon issues:");
            println!("  1. Check TOML syntax (brackets, quotes, commas)");
            println!("  2. Ensure addresses are in host:port form");
            println!("  3. Verify default_mode names a [modes.<name>] table");
            println!("  4. Ensure mode keys are unique");
            return Err(e);
        }
    };

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    println!("Checking configuration file: {}\n", config_path);
    println!("✓ Listen address: {}", config.proxy.listen_addr);
    println!("✓ Upstream address: {}", config.proxy.upstream_addr);
    println!("✓ Default mode: {}", config.proxy.default_mode);
    println!("✓ Blocklist patterns: {}", config.blocklist.len());
    println!("✓ Whitelist patterns: {}", config.whitelist.len());
    println!("✓ Modes: {}", config.modes.len());
    for (name, mode) in &config.modes {
        let key = mode.key.as_deref().unwrap_or("-");
        println!(
            "  Mode '{}': key '{}', {} pattern(s)",
            name,
            key,
            mode.patterns.len()
        );
    }
    println!("\n✓ Configuration is valid!");
    Ok(())
}
