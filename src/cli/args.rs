use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "smart-proxy")]
#[command(author, version, about = "Mode-aware forward proxy", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// 日志级别 (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// 运行代理
    Run {
        /// 配置文件路径（不存在时使用内置默认值）
        #[arg(short, long, default_value = "smart-proxy.toml")]
        config: String,
    },
    /// 检查配置文件格式是否正确
    Check {
        /// 配置文件路径
        #[arg(short, long)]
        config: String,

        /// 输出格式
        #[arg(long, default_value = "text", value_parser = ["text", "json"])]
        format: String,
    },
    /// 生成示例配置
    Template {
        /// 输出文件路径（缺省打印到标准输出）
        #[arg(short, long)]
        output: Option<String>,
    },
}
