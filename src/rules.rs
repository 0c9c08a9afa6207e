/// 分层路由规则
///
/// 决策顺序固定：拦截名单 > 全局白名单 > 当前模式名单 > 直连。
/// 拦截名单在任何模式下都优先于其他一切；白名单在所有模式下生效；
/// 模式名单只在白名单未命中后查询。规则列表加载后不可变，唯一的
/// 共享可变状态是当前模式（见 mode 模块）。
use crate::mode::ModeController;
use crate::pattern::HostPattern;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::info;

/// 单次分类的三态结果，逐连接重新计算，从不存储
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteDecision {
    /// 命中拦截名单，拒绝连接
    Blocked,
    /// 经上游代理转发
    Proxied,
    /// 直连目标
    Direct,
}

impl fmt::Display for RouteDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RouteDecision::Blocked => "BLOCKED",
            RouteDecision::Proxied => "PROXIED",
            RouteDecision::Direct => "DIRECT",
        };
        f.write_str(s)
    }
}

/// 路由规则集
pub struct RuleSet {
    blocklist: Vec<HostPattern>,
    whitelist: Vec<HostPattern>,
    mode_rules: HashMap<String, Vec<HostPattern>>,
    modes: Arc<ModeController>,
}

impl RuleSet {
    /// 从已解析的规则列表创建
    pub fn new(
        blocklist: Vec<HostPattern>,
        whitelist: Vec<HostPattern>,
        mode_rules: HashMap<String, Vec<HostPattern>>,
        modes: Arc<ModeController>,
    ) -> Self {
        Self {
            blocklist,
            whitelist,
            mode_rules,
            modes,
        }
    }

    /// 分类目标主机
    ///
    /// `host` 可以带端口（`host:port`），匹配前先剥离。空主机名在每一步
    /// 都视为未命中，最终落到直连。
    pub fn decide(&self, host: &str) -> RouteDecision {
        let bare = strip_port(host);
        if bare.is_empty() {
            info!("Route: host=[{}] DIRECT (empty host)", host);
            return RouteDecision::Direct;
        }

        if let Some(rule) = first_match(&self.blocklist, bare) {
            info!("Route: host=[{}] BLOCKED by rule [{}]", host, rule);
            return RouteDecision::Blocked;
        }

        if let Some(rule) = first_match(&self.whitelist, bare) {
            info!("Route: host=[{}] PROXIED by whitelist rule [{}]", host, rule);
            return RouteDecision::Proxied;
        }

        let mode = self.modes.current();
        if let Some(rules) = self.mode_rules.get(&mode) {
            if let Some(rule) = first_match(rules, bare) {
                info!(
                    "Route: host=[{}] PROXIED by mode '{}' rule [{}]",
                    host, mode, rule
                );
                return RouteDecision::Proxied;
            }
        }

        info!("Route: host=[{}] DIRECT (mode '{}')", host, mode);
        RouteDecision::Direct
    }

    /// 是否命中拦截名单（供只需拦截判断的调用方使用）
    pub fn is_blocked(&self, host: &str) -> bool {
        self.decide(host) == RouteDecision::Blocked
    }

    /// 模式控制器引用
    pub fn modes(&self) -> &Arc<ModeController> {
        &self.modes
    }
}

impl fmt::Debug for RuleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleSet")
            .field("blocklist", &self.blocklist.len())
            .field("whitelist", &self.whitelist.len())
            .field("modes", &self.mode_rules.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn first_match<'a>(patterns: &'a [HostPattern], host: &str) -> Option<&'a HostPattern> {
    patterns.iter().find(|p| p.matches(host))
}

/// 剥离尾部端口，保留裸主机名
///
/// 带方括号的 IPv6 字面量取括号内内容；不带括号但含多个冒号的字符串
/// 视为纯 IPv6 地址，原样返回。
pub fn strip_port(host: &str) -> &str {
    if let Some(rest) = host.strip_prefix('[') {
        return rest.split(']').next().unwrap_or(rest);
    }
    if host.matches(':').count() > 1 {
        return host;
    }
    host.split(':').next().unwrap_or(host)
}
