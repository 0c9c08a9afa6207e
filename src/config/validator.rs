use anyhow::{bail, Result};
use std::collections::HashSet;
use tracing::warn;

use super::AppConfig;

/// 配置验证器 - 负责所有配置验证逻辑
pub struct ConfigValidator;

impl ConfigValidator {
    /// 验证 host:port 形式的地址
    pub fn validate_addr(addr: &str, context: &str) -> Result<()> {
        if addr.trim().is_empty() {
            bail!("{}: address cannot be empty", context);
        }
        let Some((host, port)) = addr.rsplit_once(':') else {
            bail!("{}: '{}' must be in host:port form", context, addr);
        };
        if host.is_empty() {
            bail!("{}: '{}' is missing a host", context, addr);
        }
        match port.parse::<u16>() {
            Ok(0) => bail!("{}: port cannot be 0", context),
            Ok(_) => Ok(()),
            Err(_) => bail!("{}: '{}' is not a valid port", context, port),
        }
    }

    /// 验证模式列表中的单条主机模式
    pub fn validate_pattern(pattern: &str, context: &str) -> Result<()> {
        if pattern.trim().is_empty() {
            bail!("{}: pattern cannot be empty", context);
        }
        if pattern.contains(char::is_whitespace) {
            bail!("{}: pattern '{}' contains whitespace", context, pattern);
        }
        Ok(())
    }

    /// 验证整体应用配置
    pub fn validate_app_config(config: &AppConfig) -> Result<()> {
        Self::validate_addr(&config.proxy.listen_addr, "proxy.listen_addr")?;
        Self::validate_addr(&config.proxy.upstream_addr, "proxy.upstream_addr")?;

        if config.modes.is_empty() {
            bail!("at least one mode must be configured");
        }
        if !config.modes.contains_key(&config.proxy.default_mode) {
            bail!(
                "proxy.default_mode '{}' is not a configured mode",
                config.proxy.default_mode
            );
        }

        for (i, pattern) in config.blocklist.iter().enumerate() {
            Self::validate_pattern(pattern, &format!("blocklist[{}]", i))?;
        }
        for (i, pattern) in config.whitelist.iter().enumerate() {
            Self::validate_pattern(pattern, &format!("whitelist[{}]", i))?;
        }

        let mut seen_keys = HashSet::new();
        for (name, mode) in &config.modes {
            if name.trim().is_empty() {
                bail!("mode name cannot be empty");
            }
            if let Some(ref key) = mode.key {
                if key.trim().is_empty() {
                    bail!("modes.{}: key cannot be empty", name);
                }
                if !seen_keys.insert(key.clone()) {
                    bail!("modes.{}: key '{}' is bound more than once", name, key);
                }
            }
            for (i, pattern) in mode.patterns.iter().enumerate() {
                Self::validate_pattern(pattern, &format!("modes.{}.patterns[{}]", name, i))?;
            }
        }

        let unkeyed: Vec<&str> = config
            .modes
            .iter()
            .filter(|(_, m)| m.key.is_none())
            .map(|(n, _)| n.as_str())
            .collect();
        if !unkeyed.is_empty() {
            warn!(
                "Modes without a switch key cannot be selected at runtime: {}",
                unkeyed.join(", ")
            );
        }

        Ok(())
    }
}
