/// HTTP/1.1 请求头解析与错误响应
///
/// 前端监听器直接持有原始套接字，请求头在有限缓冲内手工解析，头部
/// 之后多读的字节作为 leftover 保留，由中继在建立出站连接后先行
/// 转发，保证不丢字节。
use crate::error::{ProxyError, Result};
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// HTTP 请求头解析缓冲区大小
pub const MAX_HEAD_SIZE: usize = 16 * 1024;

/// 已解析的请求头
#[derive(Debug)]
pub struct RequestHead {
    pub method: String,
    pub target: String,
    pub version: String,
    /// 保留原始大小写与顺序的头部列表
    pub headers: Vec<(String, String)>,
    /// 原始头部字节（含结尾空行），用于逐字转发
    raw: Vec<u8>,
}

impl RequestHead {
    /// 不区分大小写地查找头部值
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// 原始头部字节
    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }

    pub fn is_connect(&self) -> bool {
        self.method == "CONNECT"
    }
}

/// 请求头及其后已缓冲的剩余字节
#[derive(Debug)]
pub struct ParsedRequest {
    pub head: RequestHead,
    pub leftover: Vec<u8>,
}

/// 从流中读取并解析一个请求头
///
/// 读到第一个 `\r\n\r\n` 为止，超出 MAX_HEAD_SIZE 报协议错误。
pub async fn read_request_head<R>(stream: &mut R) -> Result<ParsedRequest>
where
    R: AsyncRead + Unpin,
{
    let mut buffer = vec![0u8; MAX_HEAD_SIZE];
    let mut pos = 0;

    loop {
        if pos == buffer.len() {
            return Err(ProxyError::protocol_error("HTTP request head too long"));
        }
        let n = stream.read(&mut buffer[pos..]).await?;
        if n == 0 {
            return Err(ProxyError::protocol_error(
                "unexpected EOF while reading HTTP request head",
            ));
        }
        pos += n;

        if let Some(end) = find_head_end(&buffer[..pos]) {
            let head = parse_head(&buffer[..end])?;
            let leftover = buffer[end..pos].to_vec();
            return Ok(ParsedRequest { head, leftover });
        }
    }
}

/// 查找 `\r\n\r\n` 的结束偏移（含分隔符本身）
fn find_head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n").map(|i| i + 4)
}

fn parse_head(raw: &[u8]) -> Result<RequestHead> {
    let text = std::str::from_utf8(raw)
        .map_err(|_| ProxyError::protocol_error("request head is not valid UTF-8"))?;
    let mut lines = text.lines();

    let request_line = lines
        .next()
        .ok_or_else(|| ProxyError::protocol_error("empty HTTP request"))?;
    let mut parts = request_line.split_whitespace();
    let method = parts
        .next()
        .ok_or_else(|| ProxyError::protocol_error("missing HTTP method"))?
        .to_string();
    let target = parts
        .next()
        .ok_or_else(|| ProxyError::protocol_error("missing request target"))?
        .to_string();
    let version = parts.next().unwrap_or("HTTP/1.1").to_string();
    if !version.starts_with("HTTP/") {
        return Err(ProxyError::protocol_error(format!(
            "invalid HTTP version '{}'",
            version
        )));
    }

    let mut headers = Vec::new();
    for line in lines {
        if line.is_empty() {
            break;
        }
        if let Some((key, value)) = line.split_once(':') {
            headers.push((key.trim().to_string(), value.trim().to_string()));
        }
    }

    Ok(RequestHead {
        method,
        target,
        version,
        headers,
        raw: raw.to_vec(),
    })
}

/// 解析 HTTP 响应状态行，返回状态码
///
/// 要求严格的 `HTTP/<ver> <code>` 形式；不做正文里的子串匹配，避免
/// 无关头部中的数字造成误判。
pub fn parse_status_line(response: &[u8]) -> Option<u16> {
    let first_line = response.split(|&b| b == b'\r' || b == b'\n').next()?;
    let text = std::str::from_utf8(first_line).ok()?;
    let mut parts = text.split_whitespace();
    let version = parts.next()?;
    if !version.starts_with("HTTP/") {
        return None;
    }
    parts.next()?.parse::<u16>().ok()
}

/// 写出一个带正文的纯文本错误响应
pub async fn write_error_response<W>(
    stream: &mut W,
    status: u16,
    body: &str,
) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let response = format!(
        "HTTP/1.1 {} {}\r\n\
         Content-Type: text/plain; charset=utf-8\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\
         \r\n\
         {}",
        status,
        status_reason(status),
        body.len(),
        body
    );
    stream.write_all(response.as_bytes()).await?;
    stream.flush().await
}

fn status_reason(status: u16) -> &'static str {
    match status {
        400 => "Bad Request",
        403 => "Forbidden",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        _ => "Error",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn parse_bytes(bytes: &[u8]) -> Result<ParsedRequest> {
        let mut cursor = std::io::Cursor::new(bytes.to_vec());
        read_request_head(&mut cursor).await
    }

    #[tokio::test]
    async fn test_parse_connect_request() {
        let parsed = parse_bytes(b"CONNECT example.org:443 HTTP/1.1\r\nHost: example.org:443\r\n\r\n")
            .await
            .unwrap();
        assert!(parsed.head.is_connect());
        assert_eq!(parsed.head.target, "example.org:443");
        assert_eq!(parsed.head.version, "HTTP/1.1");
        assert_eq!(parsed.head.header("host"), Some("example.org:443"));
        assert!(parsed.leftover.is_empty());
    }

    #[tokio::test]
    async fn test_parse_preserves_leftover() {
        let parsed = parse_bytes(
            b"POST http://example.org/api HTTP/1.1\r\nHost: example.org\r\nContent-Length: 4\r\n\r\nbody",
        )
        .await
        .unwrap();
        assert_eq!(parsed.head.method, "POST");
        assert_eq!(parsed.leftover, b"body");
        assert!(parsed.head.as_bytes().ends_with(b"\r\n\r\n"));
    }

    #[tokio::test]
    async fn test_parse_header_case_insensitive_lookup() {
        let parsed = parse_bytes(b"GET http://a.example/ HTTP/1.1\r\nX-Custom-Header: value\r\n\r\n")
            .await
            .unwrap();
        assert_eq!(parsed.head.header("x-custom-header"), Some("value"));
        assert_eq!(parsed.head.header("missing"), None);
    }

    #[tokio::test]
    async fn test_parse_rejects_garbage() {
        assert!(parse_bytes(b"\r\n\r\n").await.is_err());
        assert!(parse_bytes(b"GET\r\n\r\n").await.is_err());
        assert!(parse_bytes(b"GET / NOTHTTP\r\n\r\n").await.is_err());
    }

    #[tokio::test]
    async fn test_parse_eof_before_head_end() {
        let err = parse_bytes(b"GET / HTTP/1.1\r\nHost: a").await.unwrap_err();
        assert!(err.to_string().contains("EOF"));
    }

    #[test]
    fn test_parse_status_line() {
        assert_eq!(
            parse_status_line(b"HTTP/1.1 200 Connection Established\r\n\r\n"),
            Some(200)
        );
        assert_eq!(parse_status_line(b"HTTP/1.0 502 Bad Gateway\r\n"), Some(502));
        // 子串 "200" 出现在别处不能算成功
        assert_eq!(parse_status_line(b"HTTP/1.1 403 X-Hint: 200\r\n"), Some(403));
        assert_eq!(parse_status_line(b"SSH-2.0-OpenSSH\r\n"), None);
        assert_eq!(parse_status_line(b""), None);
    }

    #[tokio::test]
    async fn test_write_error_response() {
        let mut buf = Vec::new();
        write_error_response(&mut buf, 403, "Forbidden by blocklist")
            .await
            .unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.starts_with("HTTP/1.1 403 Forbidden\r\n"));
        assert!(text.contains("Content-Length: 22\r\n"));
        assert!(text.ends_with("Forbidden by blocklist"));
    }
}
