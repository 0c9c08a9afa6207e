/// 白名单模式文件的发现与加载
///
/// 递归扫描目录下所有以 `.whitelist` 结尾的文件，每行一个主机模式。
/// 行内注释（`#` 或 `//`）会被剥离，空行跳过，跨文件去重。找到有效
/// 条目时整体替换内置白名单，否则保留内置值。
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// 模式文件的扩展后缀
pub const WHITELIST_FILE_SUFFIX: &str = ".whitelist";

/// 单个已加载的模式文件
#[derive(Debug, Clone)]
pub struct PatternFile {
    /// 文件名（不含目录）
    pub name: String,
    /// 文件内的模式，去重后保持出现顺序
    pub patterns: Vec<String>,
}

/// 递归收集目录下的 `*.whitelist` 文件并解析
///
/// 单个文件的读取错误只记录日志并跳过，不中断整体扫描。返回按文件名
/// 排序的结果，保证报告输出稳定。
pub fn discover_pattern_files(root: &Path) -> io::Result<Vec<PatternFile>> {
    let mut paths = Vec::new();
    collect_whitelist_paths(root, &mut paths)?;
    paths.sort();

    let mut files = Vec::new();
    for path in paths {
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) => {
                warn!("Failed to read {}: {}", path.display(), e);
                continue;
            }
        };

        let mut seen = HashSet::new();
        let mut patterns = Vec::new();
        for line in content.lines() {
            if let Some(pattern) = parse_pattern_line(line) {
                if seen.insert(pattern.to_string()) {
                    patterns.push(pattern.to_string());
                }
            }
        }

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        files.push(PatternFile { name, patterns });
    }

    Ok(files)
}

fn collect_whitelist_paths(dir: &Path, out: &mut Vec<PathBuf>) -> io::Result<()> {
    if !dir.is_dir() {
        return Ok(());
    }
    for entry in fs::read_dir(dir)? {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable entry under {}: {}", dir.display(), e);
                continue;
            }
        };
        let path = entry.path();
        if path.is_dir() {
            // 单个子目录出错不影响其余目录
            if let Err(e) = collect_whitelist_paths(&path, out) {
                warn!("Skipping directory {}: {}", path.display(), e);
            }
        } else if path
            .file_name()
            .is_some_and(|n| n.to_string_lossy().ends_with(WHITELIST_FILE_SUFFIX))
        {
            out.push(path);
        }
    }
    Ok(())
}

/// 解析单行：剥离行内注释与首尾空白，空行返回 None
fn parse_pattern_line(line: &str) -> Option<&str> {
    let mut line = line;
    if let Some(idx) = line.find('#') {
        line = &line[..idx];
    }
    if let Some(idx) = line.find("//") {
        line = &line[..idx];
    }
    let line = line.trim();
    if line.is_empty() {
        None
    } else {
        Some(line)
    }
}

/// 跨文件合并去重，保持首次出现顺序
pub fn merge_patterns(files: &[PatternFile]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut merged = Vec::new();
    for file in files {
        for pattern in &file.patterns {
            if seen.insert(pattern.clone()) {
                merged.push(pattern.clone());
            }
        }
    }
    merged
}

/// 打印加载结果的树形报告（文件 -> 域名）
pub fn log_pattern_report(files: &[PatternFile]) {
    let total: usize = files.iter().map(|f| f.patterns.len()).sum();
    info!(
        "Whitelist entries by file ({} files, {} domains):",
        files.len(),
        total
    );
    for (i, file) in files.iter().enumerate() {
        let last_file = i == files.len() - 1;
        let file_branch = if last_file { "└──" } else { "├──" };
        let child_indent = if last_file { "    " } else { "│   " };
        info!("  {} {} ({})", file_branch, file.name, file.patterns.len());
        for (j, pattern) in file.patterns.iter().enumerate() {
            let domain_branch = if j == file.patterns.len() - 1 {
                "└──"
            } else {
                "├──"
            };
            info!("  {}{} {}", child_indent, domain_branch, pattern);
        }
    }
}
