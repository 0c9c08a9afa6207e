/// CONNECT 隧道中继
///
/// 代理从不解密 HTTPS：隧道建立后客户端与目标之间是不透明字节流。
/// 出站连接按路由决策选择：经上游代理（对其再发一次 CONNECT）或
/// 直连目标。200 响应行发出之后不再向客户端报告任何错误，失败只
/// 通过关闭两条腿传播。
use super::http::{parse_status_line, write_error_response, ParsedRequest};
use super::ServerState;
use crate::error::{ProxyError, Result};
use crate::io_util::{relay_bidirectional, write_vectored_all};
use crate::rules::RouteDecision;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info};

/// 隧道就绪响应，逐字节固定
const TUNNEL_ESTABLISHED: &[u8] = b"HTTP/1.1 200 Connection Established\r\n\r\n";

/// 上游 CONNECT 响应的读取上限
const UPSTREAM_REPLY_BUFFER: usize = 1024;

/// 处理一个 CONNECT 请求
pub(crate) async fn handle_connect(
    mut client: TcpStream,
    req: ParsedRequest,
    state: &ServerState,
) -> Result<()> {
    let target = normalize_connect_target(&req.head.target);

    let dest = match state.rules.decide(&target) {
        RouteDecision::Blocked => {
            state.stats.connection_blocked();
            write_error_response(&mut client, 403, "Forbidden by blocklist").await?;
            return Ok(());
        }
        RouteDecision::Proxied => {
            connect_via_upstream(&state.upstream_addr, &target).await
        }
        RouteDecision::Direct => TcpStream::connect(&target)
            .await
            .map_err(|e| ProxyError::connection_failed(&target, e)),
    };

    let mut dest = match dest {
        Ok(dest) => dest,
        Err(e) => {
            // 隧道尚未建立，失败以干净的 503 报告给客户端
            write_error_response(&mut client, 503, &e.to_string()).await.ok();
            return Err(e);
        }
    };

    write_vectored_all(&mut client, &[TUNNEL_ESTABLISHED]).await?;
    if !req.leftover.is_empty() {
        dest.write_all(&req.leftover).await?;
    }

    debug!("Tunnel established to {}", target);
    let (sent, received) = relay_bidirectional(client, dest, Some(&state.stats)).await;
    info!(
        "Tunnel to {} closed (sent={}, received={})",
        target,
        sent.unwrap_or(0),
        received.unwrap_or(0)
    );
    Ok(())
}

/// 经上游代理建立隧道
///
/// 对上游发出合成的 CONNECT 请求并校验其状态行为 2xx。早期实现只在
/// 响应前 1KB 中查找子串 "200"，这里收紧为真正的状态行解析。
async fn connect_via_upstream(upstream_addr: &str, target: &str) -> Result<TcpStream> {
    let mut conn = TcpStream::connect(upstream_addr)
        .await
        .map_err(|e| ProxyError::connection_failed(upstream_addr, e))?;

    let connect_req = format!("CONNECT {0} HTTP/1.1\r\nHost: {0}\r\n\r\n", target);
    conn.write_all(connect_req.as_bytes()).await?;
    conn.flush().await?;

    let mut buf = vec![0u8; UPSTREAM_REPLY_BUFFER];
    let n = conn.read(&mut buf).await?;
    if n == 0 {
        return Err(ProxyError::upstream_refused(
            "upstream closed connection during CONNECT handshake",
        ));
    }

    match parse_status_line(&buf[..n]) {
        Some(code) if (200..300).contains(&code) => Ok(conn),
        _ => {
            let reply = String::from_utf8_lossy(&buf[..n]);
            Err(ProxyError::upstream_refused(
                reply.lines().next().unwrap_or_default().to_string(),
            ))
        }
    }
}

/// CONNECT 目标缺省补上 443 端口
fn normalize_connect_target(target: &str) -> String {
    if target.starts_with('[') {
        // [IPv6]:port 或 [IPv6]
        if target.rsplit(']').next().is_some_and(|rest| rest.starts_with(':')) {
            return target.to_string();
        }
        return format!("{}:443", target);
    }
    if target.contains(':') {
        target.to_string()
    } else {
        format!("{}:443", target)
    }
}
