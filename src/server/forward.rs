/// 普通 HTTP 请求转发
///
/// 走代理时原始的绝对形式请求逐字转发给上游代理；直连时重建为
/// origin-form 请求发给源站。响应不做解析，从出站连接原样复制回
/// 客户端，状态码随字节流自然透传。
use super::http::{write_error_response, ParsedRequest, RequestHead};
use super::ServerState;
use crate::error::{ProxyError, Result};
use crate::io_util::{relay_bidirectional, write_vectored_all};
use crate::rules::RouteDecision;
use tokio::net::TcpStream;
use tracing::{debug, info};

/// 处理一个非 CONNECT 请求
pub(crate) async fn handle_request(
    mut client: TcpStream,
    req: ParsedRequest,
    state: &ServerState,
) -> Result<()> {
    let target = match request_target(&req.head) {
        Ok(target) => target,
        Err(e) => {
            write_error_response(&mut client, 400, &e.to_string()).await.ok();
            return Err(e);
        }
    };

    let decision = state.rules.decide(&target);
    let outbound = match decision {
        RouteDecision::Blocked => {
            state.stats.connection_blocked();
            write_error_response(&mut client, 403, "Forbidden by blocklist").await?;
            return Ok(());
        }
        RouteDecision::Proxied => {
            // 上游代理收到的仍是绝对形式的原始请求
            TcpStream::connect(&state.upstream_addr)
                .await
                .map_err(|e| ProxyError::connection_failed(&state.upstream_addr, e))
                .map(|conn| (conn, req.head.as_bytes().to_vec()))
        }
        RouteDecision::Direct => TcpStream::connect(&target)
            .await
            .map_err(|e| ProxyError::connection_failed(&target, e))
            .map(|conn| (conn, rebuild_origin_request(&req.head))),
    };

    let (mut dest, request_bytes) = match outbound {
        Ok(outbound) => outbound,
        Err(e) => {
            write_error_response(&mut client, 503, &e.to_string()).await.ok();
            return Err(e);
        }
    };

    write_vectored_all(&mut dest, &[&request_bytes, &req.leftover]).await?;

    debug!(
        "Forwarding {} {} via {}",
        req.head.method, req.head.target, decision
    );
    let (sent, received) = relay_bidirectional(client, dest, Some(&state.stats)).await;
    info!(
        "Forward to {} closed (sent={}, received={})",
        target,
        sent.unwrap_or(0),
        received.unwrap_or(0)
    );
    Ok(())
}

/// 从请求确定目标 host:port
///
/// 优先取绝对形式请求目标的 URL，其次取 Host 头；两者都没有时无法
/// 路由，报协议错误。
fn request_target(head: &RequestHead) -> Result<String> {
    if head.target.starts_with("http://") || head.target.starts_with("https://") {
        let parsed = url::Url::parse(&head.target)
            .map_err(|e| ProxyError::protocol_error(format!("invalid request URL: {}", e)))?;
        let host = parsed
            .host_str()
            .ok_or_else(|| ProxyError::protocol_error("request URL has no host"))?;
        let port = parsed
            .port()
            .unwrap_or(if parsed.scheme() == "https" { 443 } else { 80 });
        return Ok(format!("{}:{}", host, port));
    }

    if let Some(host) = head.header("host") {
        if host.is_empty() {
            return Err(ProxyError::protocol_error("empty Host header"));
        }
        if host.contains(':') {
            return Ok(host.to_string());
        }
        return Ok(format!("{}:80", host));
    }

    Err(ProxyError::protocol_error(
        "cannot determine target host from request",
    ))
}

/// 把绝对形式请求重建为发给源站的 origin-form 请求
///
/// 路径取 URL 的 path+query，代理相关与逐跳头部剥离，并固定
/// `Connection: close`，让响应以连接关闭作为结束信号。
fn rebuild_origin_request(head: &RequestHead) -> Vec<u8> {
    let path = if head.target.starts_with("http://") || head.target.starts_with("https://") {
        url::Url::parse(&head.target)
            .ok()
            .map(|u| {
                let mut path = u.path().to_string();
                if let Some(query) = u.query() {
                    path.push('?');
                    path.push_str(query);
                }
                path
            })
            .unwrap_or_else(|| "/".to_string())
    } else {
        head.target.clone()
    };

    let mut request = format!("{} {} {}\r\n", head.method, path, head.version).into_bytes();
    for (key, value) in &head.headers {
        if is_hop_by_hop(key) {
            continue;
        }
        request.extend(format!("{}: {}\r\n", key, value).into_bytes());
    }
    request.extend(b"Connection: close\r\n\r\n");
    request
}

fn is_hop_by_hop(header: &str) -> bool {
    header.eq_ignore_ascii_case("proxy-connection")
        || header.eq_ignore_ascii_case("connection")
        || header.eq_ignore_ascii_case("keep-alive")
        || header.eq_ignore_ascii_case("proxy-authorization")
}
