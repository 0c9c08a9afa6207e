use anyhow::{Context, Result};

/// 内置配置模板
const CONFIG_TEMPLATE: &str = r#"# smart-proxy 配置示例
#
# 同目录（递归）下的 *.whitelist 文件会在启动时合并为白名单，
# 找到有效条目时覆盖此处的 whitelist。

[proxy]
# 前端监听地址（浏览器/系统代理指向这里）
listen_addr = "127.0.0.1:7895"
# 上游代理地址，启动前会探测其可用性
upstream_addr = "127.0.0.1:7890"
# 启动时的默认模式
default_mode = "work"

# 拦截名单：任何模式下直接拒绝（HTTP 403）
blocklist = [
    "*analy*.wikimedia.org",
    "brave.com",
    "*.brave.com",
    "*.mozilla.org",
    "mtalk.google.com",
]

# 全局白名单：任何模式下都走上游代理
whitelist = []

# 各模式及其切换快捷键（运行时 stdin 一行一个键）
[modes.down]
key = "d"

[modes.work]
key = "w"

[modes.WORK]
key = "W"

[modes.fun]
key = "f"

[modes.FUN]
key = "F"
patterns = ["s*-e*.*.*"]
"#;

/// 生成配置模板
pub fn generate_config_template(output: Option<&str>) -> Result<()> {
    if let Some(path) = output {
        std::fs::write(path, CONFIG_TEMPLATE)
            .with_context(|| format!("Failed to write config template to {}", path))?;
        println!("Generated configuration template: {}", path);
    } else {
        println!("{}", CONFIG_TEMPLATE);
    }
    Ok(())
}
