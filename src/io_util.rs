/// 字节中继 I/O 工具
///
/// 提供隧道与转发共用的双向复制泵：两个方向各自独立复制，任一方向
/// 到达流末尾或出错后关闭本侧写端，使镜像方向解除阻塞并退出，空闲
/// 超时兜底防止半开连接长期挂起。
use crate::stats::RelayStatsTracker;
use std::io::{self, IoSlice};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::{timeout, Duration};
use tracing::debug;

/// 数据复制缓冲区大小（64KB 适合高吞吐）
pub const COPY_BUFFER_SIZE: usize = 65536;

/// 连接空闲超时时间（防止资源泄漏）
pub const CONNECTION_IDLE_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// 批量写入辅助函数 - 使用 write_vectored 减少系统调用
///
/// 用于把响应行与已缓冲的请求剩余字节一次写出。
pub async fn write_vectored_all<W>(writer: &mut W, bufs: &[&[u8]]) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let total: usize = bufs.iter().map(|b| b.len()).sum();
    if total == 0 {
        return Ok(());
    }

    if bufs.len() == 1 {
        writer.write_all(bufs[0]).await?;
        return writer.flush().await;
    }

    // write_vectored 可能部分写入；剩余部分退化为逐段 write_all
    let io_slices: Vec<IoSlice> = bufs.iter().map(|b| IoSlice::new(b)).collect();
    let mut written = match writer.write_vectored(&io_slices).await {
        Ok(0) => {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                "failed to write vectored data",
            ))
        }
        Ok(n) => n,
        Err(e) => return Err(e),
    };

    if written < total {
        for buf in bufs {
            if written >= buf.len() {
                written -= buf.len();
                continue;
            }
            writer.write_all(&buf[written..]).await?;
            written = 0;
        }
    }

    writer.flush().await
}

/// 带空闲超时的单向复制泵
///
/// 相比 tokio::io::copy，每次读到数据后立即更新统计信息，并在连接
/// 空闲超过 CONNECTION_IDLE_TIMEOUT 时主动结束。
pub async fn copy_with_idle_timeout<R, W>(
    reader: &mut R,
    writer: &mut W,
    stats: Option<&RelayStatsTracker>,
    record_fn: impl Fn(&RelayStatsTracker, u64),
) -> io::Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; COPY_BUFFER_SIZE];
    let mut total_copied = 0u64;

    loop {
        let n = match timeout(CONNECTION_IDLE_TIMEOUT, reader.read(&mut buf)).await {
            Ok(Ok(n)) => n,
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                return Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    "connection idle timeout",
                ));
            }
        };

        if n == 0 {
            break;
        }

        writer.write_all(&buf[..n]).await?;
        total_copied += n as u64;

        if let Some(tracker) = stats {
            record_fn(tracker, n as u64);
        }
    }

    Ok(total_copied)
}

/// 双向中继泵
///
/// 两个方向并发运行：client→dest 与 dest→client。每个方向复制结束后
/// 关闭本侧写端，对端读到 EOF 后自身也会结束，两个方向都退出后双方
/// 套接字随之丢弃，不会留下半开的泵。
pub async fn relay_bidirectional<A, B>(
    client: A,
    dest: B,
    stats: Option<&RelayStatsTracker>,
) -> (io::Result<u64>, io::Result<u64>)
where
    A: AsyncRead + AsyncWrite + Unpin,
    B: AsyncRead + AsyncWrite + Unpin,
{
    let (mut client_read, mut client_write) = tokio::io::split(client);
    let (mut dest_read, mut dest_write) = tokio::io::split(dest);

    let client_to_dest = async {
        let result = copy_with_idle_timeout(&mut client_read, &mut dest_write, stats, |t, n| {
            t.add_bytes_sent(n)
        })
        .await;
        dest_write.shutdown().await.ok();
        result
    };

    let dest_to_client = async {
        let result = copy_with_idle_timeout(&mut dest_read, &mut client_write, stats, |t, n| {
            t.add_bytes_received(n)
        })
        .await;
        client_write.shutdown().await.ok();
        result
    };

    let (c2d, d2c) = tokio::join!(client_to_dest, dest_to_client);

    if let Err(ref e) = c2d {
        debug!("Client to destination copy ended with error: {}", e);
    }
    if let Err(ref e) = d2c {
        debug!("Destination to client copy ended with error: {}", e);
    }

    (c2d, d2c)
}
