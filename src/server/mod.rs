/// 前端监听器
///
/// 接受本地客户端的代理连接，按方法分派：CONNECT 走隧道中继，其余
/// 方法走普通 HTTP 转发。每条连接一个任务，并发量由信号量限制。
mod forward;
mod http;
mod tunnel;

pub use http::{
    parse_status_line, read_request_head, write_error_response, ParsedRequest, RequestHead,
    MAX_HEAD_SIZE,
};

use crate::error::{ProxyError, Result};
use crate::rules::RuleSet;
use crate::stats::RelayStatsTracker;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, error, info, warn};

/// 最大并发连接数（防止 DoS 攻击）
const MAX_CONCURRENT_CONNECTIONS: usize = 1000;

/// 请求头解析超时时间（防止慢速攻击）
const HEAD_PARSE_TIMEOUT: Duration = Duration::from_secs(30);

/// 服务器共享状态
pub struct ServerState {
    /// 上游代理地址
    pub upstream_addr: String,
    /// 路由规则（内部引用模式控制器）
    pub rules: RuleSet,
    /// 中继计数器
    pub stats: RelayStatsTracker,
}

impl ServerState {
    pub fn new(upstream_addr: impl Into<String>, rules: RuleSet) -> Self {
        Self {
            upstream_addr: upstream_addr.into(),
            rules,
            stats: RelayStatsTracker::new(),
        }
    }
}

/// 运行前端监听器
///
/// 绑定监听地址后进入接受循环，每条连接派生一个处理任务。正常情况
/// 下不返回。
pub async fn run_server(listen_addr: &str, state: Arc<ServerState>) -> Result<()> {
    let listener = TcpListener::bind(listen_addr)
        .await
        .map_err(|e| ProxyError::connection_failed(listen_addr, e))?;
    info!("Proxy listening on {}", listen_addr);

    let connection_limiter = Arc::new(Semaphore::new(MAX_CONCURRENT_CONNECTIONS));

    loop {
        match listener.accept().await {
            Ok((stream, peer_addr)) => {
                if let Err(e) = stream.set_nodelay(true) {
                    warn!("Failed to set TCP_NODELAY: {}", e);
                }

                let permit = match connection_limiter.clone().try_acquire_owned() {
                    Ok(permit) => permit,
                    Err(_) => {
                        warn!(
                            "Connection limit reached ({}), rejecting connection from {}",
                            MAX_CONCURRENT_CONNECTIONS, peer_addr
                        );
                        drop(stream);
                        continue;
                    }
                };

                let state = state.clone();
                tokio::spawn(async move {
                    let _permit = permit;
                    state.stats.connection_started();
                    if let Err(e) = handle_connection(stream, &state).await {
                        debug!("Connection from {} ended with error: {}", peer_addr, e);
                    }
                    state.stats.connection_ended();
                });
            }
            Err(e) => {
                error!("Accept error: {}", e);
                sleep(Duration::from_millis(100)).await;
            }
        }
    }
}

/// 处理单条客户端连接
async fn handle_connection(mut stream: TcpStream, state: &ServerState) -> Result<()> {
    let parsed = match timeout(HEAD_PARSE_TIMEOUT, read_request_head(&mut stream)).await {
        Ok(Ok(parsed)) => parsed,
        Ok(Err(e)) => {
            write_error_response(&mut stream, 400, &e.to_string()).await.ok();
            return Err(e);
        }
        Err(_) => {
            let e = ProxyError::timeout(HEAD_PARSE_TIMEOUT);
            write_error_response(&mut stream, 400, &e.to_string()).await.ok();
            return Err(e);
        }
    };

    if parsed.head.is_connect() {
        tunnel::handle_connect(stream, parsed, state).await
    } else {
        forward::handle_request(stream, parsed, state).await
    }
}
