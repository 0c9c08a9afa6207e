/// 上游代理可用性探测
///
/// 在开始接受客户端流量之前验证上游代理可达且具备 HTTP 代理语义。
/// 探测失败是致命的启动条件，进程不得开始服务。
use crate::error::{ProxyError, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, warn};

/// 单次探测的连接与读写截止时间
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// 探测重试次数
pub const PROBE_ATTEMPTS: u32 = 3;

/// 重试之间的固定间隔
pub const PROBE_RETRY_DELAY: Duration = Duration::from_millis(1500);

/// 探测响应的读取上限
const PROBE_READ_BUFFER: usize = 1024;

/// 发送的最小化代理请求，符合 HTTP 代理语义
const PROBE_REQUEST: &[u8] = b"HEAD http://example.com/ HTTP/1.1\r\nHost: example.com\r\n\r\n";

/// 单次探测上游代理
///
/// 先做 TCP 直连探测，再发送最小化 HEAD 代理请求并验证响应以
/// HTTP 状态行前缀开头。
pub async fn check_upstream(addr: &str) -> Result<()> {
    let mut conn = timeout(PROBE_TIMEOUT, TcpStream::connect(addr))
        .await
        .map_err(|_| ProxyError::timeout(PROBE_TIMEOUT))?
        .map_err(|e| ProxyError::connection_failed(addr, e))?;

    timeout(PROBE_TIMEOUT, conn.write_all(PROBE_REQUEST))
        .await
        .map_err(|_| ProxyError::timeout(PROBE_TIMEOUT))??;

    let mut buf = vec![0u8; PROBE_READ_BUFFER];
    let n = timeout(PROBE_TIMEOUT, conn.read(&mut buf))
        .await
        .map_err(|_| ProxyError::timeout(PROBE_TIMEOUT))??;
    if n == 0 {
        return Err(ProxyError::protocol_error(
            "upstream closed connection without responding to probe",
        ));
    }

    let line = String::from_utf8_lossy(&buf[..n]);
    if !line.starts_with("HTTP/") {
        return Err(ProxyError::protocol_error(format!(
            "unexpected upstream response: {:?}",
            line.lines().next().unwrap_or_default()
        )));
    }

    debug!("Upstream probe to {} succeeded", addr);
    Ok(())
}

/// 有限重试地等待上游代理就绪
///
/// 首次立即尝试，之后每次重试前等待固定间隔；全部失败时返回
/// `UpstreamUnavailable`。
pub async fn wait_for_upstream(addr: &str, attempts: u32, delay: Duration) -> Result<()> {
    let mut last_err = String::new();
    for attempt in 1..=attempts {
        if attempt > 1 {
            sleep(delay).await;
        }
        match check_upstream(addr).await {
            Ok(()) => return Ok(()),
            Err(e) => {
                warn!(
                    "Upstream check failed (attempt {}/{}): {}",
                    attempt, attempts, e
                );
                last_err = e.to_string();
            }
        }
    }
    Err(ProxyError::upstream_unavailable(addr, attempts, last_err))
}
