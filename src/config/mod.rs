// 配置管理模块 - 使用模块化设计

mod patterns;
mod validator;

pub use patterns::{
    discover_pattern_files, log_pattern_report, merge_patterns, PatternFile,
    WHITELIST_FILE_SUFFIX,
};
pub use validator::ConfigValidator;

use crate::pattern::HostPattern;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::info;

/// 代理核心参数
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxySection {
    /// 前端监听地址
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// 上游代理地址，进程生命周期内固定
    #[serde(default = "default_upstream_addr")]
    pub upstream_addr: String,
    /// 启动时的默认模式
    #[serde(default = "default_mode")]
    pub default_mode: String,
}

impl Default for ProxySection {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            upstream_addr: default_upstream_addr(),
            default_mode: default_mode(),
        }
    }
}

fn default_listen_addr() -> String {
    "127.0.0.1:7895".to_string()
}

fn default_upstream_addr() -> String {
    "127.0.0.1:7890".to_string()
}

fn default_mode() -> String {
    "work".to_string()
}

/// 单个模式的配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModeConfig {
    /// 切换到该模式的快捷键（一行一个键的命令输入）
    #[serde(default)]
    pub key: Option<String>,
    /// 该模式下额外走代理的主机模式
    #[serde(default)]
    pub patterns: Vec<String>,
}

/// 应用配置
///
/// 全部规则以已解析结构体的形式交给核心组件，核心不关心来源。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// 代理参数
    #[serde(default)]
    pub proxy: ProxySection,
    /// 拦截名单（任何模式下生效，优先级最高）
    #[serde(default)]
    pub blocklist: Vec<String>,
    /// 全局白名单（任何模式下生效）
    #[serde(default)]
    pub whitelist: Vec<String>,
    /// 模式名 -> 模式配置
    #[serde(default = "default_modes")]
    pub modes: BTreeMap<String, ModeConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            proxy: ProxySection::default(),
            blocklist: Vec::new(),
            whitelist: Vec::new(),
            modes: default_modes(),
        }
    }
}

/// 内置模式集：down/work/WORK/fun/FUN 及其快捷键
fn default_modes() -> BTreeMap<String, ModeConfig> {
    let mut modes = BTreeMap::new();
    for (name, key) in [
        ("down", "d"),
        ("work", "w"),
        ("WORK", "W"),
        ("fun", "f"),
        ("FUN", "F"),
    ] {
        modes.insert(
            name.to_string(),
            ModeConfig {
                key: Some(key.to_string()),
                patterns: Vec::new(),
            },
        );
    }
    modes
}

impl AppConfig {
    /// 从文件加载配置
    ///
    /// 按扩展名选择解析器：`.json` 用 serde_json，其余按 TOML 解析。
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file {}", path))?;

        let config: AppConfig = if Path::new(path)
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
        {
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse JSON configuration {}", path))?
        } else {
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse TOML configuration {}", path))?
        };

        config
            .validate()
            .context("Configuration validation failed")?;
        Ok(config)
    }

    /// 加载配置，文件不存在时回退到内置默认值
    pub fn load_or_default(path: &str) -> anyhow::Result<Self> {
        if Path::new(path).is_file() {
            let config = Self::load(path)?;
            info!(
                "Config loaded from {} (listen={}, upstream={})",
                path, config.proxy.listen_addr, config.proxy.upstream_addr
            );
            Ok(config)
        } else {
            let config = Self::default();
            info!(
                "Config file {} not found, using defaults (listen={}, upstream={})",
                path, config.proxy.listen_addr, config.proxy.upstream_addr
            );
            Ok(config)
        }
    }

    /// 校验配置
    pub fn validate(&self) -> anyhow::Result<()> {
        ConfigValidator::validate_app_config(self)
    }

    /// 已知模式名列表
    pub fn mode_names(&self) -> Vec<String> {
        self.modes.keys().cloned().collect()
    }

    /// 快捷键 -> 模式名
    pub fn key_map(&self) -> HashMap<String, String> {
        self.modes
            .iter()
            .filter_map(|(name, mode)| {
                mode.key.as_ref().map(|key| (key.clone(), name.clone()))
            })
            .collect()
    }

    /// 拦截名单模式
    pub fn block_patterns(&self) -> Vec<HostPattern> {
        self.blocklist.iter().map(HostPattern::new).collect()
    }

    /// 白名单模式
    pub fn allow_patterns(&self) -> Vec<HostPattern> {
        self.whitelist.iter().map(HostPattern::new).collect()
    }

    /// 模式名 -> 该模式的代理模式列表
    pub fn mode_patterns(&self) -> HashMap<String, Vec<HostPattern>> {
        self.modes
            .iter()
            .map(|(name, mode)| {
                (
                    name.clone(),
                    mode.patterns.iter().map(HostPattern::new).collect(),
                )
            })
            .collect()
    }
}
