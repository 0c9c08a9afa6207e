/// 主机名通配模式匹配
///
/// 实现 shell 风格的通配语义：`*` 匹配任意长度的字符序列（包括空序列
/// 和 `.`），`?` 匹配恰好一个字符，其余字符逐一比较。主机名中不存在
/// `/`，因此 `*` 不需要像路径匹配那样受分隔符限制。匹配区分大小写。
use serde::{Deserialize, Serialize};
use std::fmt;

/// 单条主机名模式
///
/// 模式一旦加载即不可变，列表整体在进程启动时替换。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HostPattern(String);

impl HostPattern {
    /// 从原始字符串创建模式
    pub fn new(pattern: impl Into<String>) -> Self {
        Self(pattern.into())
    }

    /// 原始模式字符串
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// 判断裸主机名是否匹配该模式
    pub fn matches(&self, host: &str) -> bool {
        glob_match(&self.0, host)
    }
}

impl fmt::Display for HostPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for HostPattern {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for HostPattern {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// 通配匹配核心算法
///
/// 迭代回溯实现：遇到 `*` 时记录回溯点，失配时回退并让 `*` 多吞一个
/// 字符。时间复杂度 O(len(pattern) * len(text))，无递归。
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();

    let mut pi = 0;
    let mut ti = 0;
    // 最近一个 `*` 的位置及其当前吞掉的文本终点
    let mut star: Option<(usize, usize)> = None;

    while ti < t.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some((pi, ti));
            pi += 1;
        } else if let Some((star_pi, star_ti)) = star {
            pi = star_pi + 1;
            ti = star_ti + 1;
            star = Some((star_pi, star_ti + 1));
        } else {
            return false;
        }
    }

    // 文本耗尽后，模式剩余部分只能是 `*`
    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }

    pi == p.len()
}
