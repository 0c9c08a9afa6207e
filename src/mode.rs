/// 模式状态管理
///
/// 当前模式是进程级共享状态：每条连接的路由决策都会读取它，而写入只
/// 来自操作员的切换输入。使用 parking_lot 的读写锁，读者之间互不阻塞，
/// 临界区内只做克隆，绝不跨 await 持锁。
use crate::error::{ProxyError, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tracing::{debug, info, warn};

/// 模式控制器
///
/// 已知模式集合在构造后不可变；`switch_to` 对未知模式是只记录日志的
/// 空操作。
pub struct ModeController {
    /// 已知模式名（区分大小写）
    known: Vec<String>,
    /// 快捷键 -> 模式名
    keys: HashMap<String, String>,
    /// 当前模式
    current: parking_lot::RwLock<String>,
}

impl ModeController {
    /// 创建控制器，`initial` 必须是已知模式之一
    pub fn new(
        known: Vec<String>,
        keys: HashMap<String, String>,
        initial: &str,
    ) -> Result<Self> {
        if !known.iter().any(|m| m == initial) {
            return Err(ProxyError::config_error(format!(
                "default mode '{}' is not a known mode",
                initial
            )));
        }
        for (key, mode) in &keys {
            if !known.iter().any(|m| m == mode) {
                return Err(ProxyError::config_error(format!(
                    "key '{}' is bound to unknown mode '{}'",
                    key, mode
                )));
            }
        }
        Ok(Self {
            known,
            keys,
            current: parking_lot::RwLock::new(initial.to_string()),
        })
    }

    /// 当前模式快照
    pub fn current(&self) -> String {
        self.current.read().clone()
    }

    /// 切换到指定模式
    ///
    /// 未知模式名保持状态不变并返回 false，调用方无需处理错误。
    pub fn switch_to(&self, name: &str) -> bool {
        if !self.is_known(name) {
            warn!("Ignoring switch to unknown mode '{}'", name);
            return false;
        }
        let mut current = self.current.write();
        if *current != name {
            info!("Switched to '{}' mode", name);
            *current = name.to_string();
        } else {
            debug!("Already in '{}' mode", name);
        }
        true
    }

    /// 模式名是否已知
    pub fn is_known(&self, name: &str) -> bool {
        self.known.iter().any(|m| m == name)
    }

    /// 已知模式名列表
    pub fn known_modes(&self) -> &[String] {
        &self.known
    }

    /// 按快捷键查找模式名
    pub fn mode_for_key(&self, key: &str) -> Option<&str> {
        self.keys.get(key).map(String::as_str)
    }

    /// 快捷键一览，用于启动横幅
    pub fn key_bindings(&self) -> Vec<(String, String)> {
        let mut bindings: Vec<(String, String)> = self
            .keys
            .iter()
            .map(|(k, m)| (k.clone(), m.clone()))
            .collect();
        bindings.sort();
        bindings
    }
}

impl std::fmt::Debug for ModeController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModeController")
            .field("known", &self.known)
            .field("current", &self.current())
            .finish()
    }
}

/// 监听行式命令输入并切换模式
///
/// 每行一个快捷键（生产环境为 stdin，测试用 duplex 管道）。无法识别
/// 的输入直接忽略。输入流关闭后任务自然退出。
pub async fn run_mode_listener<R>(input: R, controller: Arc<ModeController>) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(input).lines();
    while let Some(line) = lines.next_line().await? {
        let key = line.trim();
        if key.is_empty() {
            continue;
        }
        match controller.mode_for_key(key) {
            Some(mode) => {
                let mode = mode.to_string();
                controller.switch_to(&mode);
            }
            None => {
                debug!("Ignoring unrecognized mode key '{}'", key);
            }
        }
    }
    Ok(())
}
