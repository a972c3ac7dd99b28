//! Server-sent-event plumbing shared by the HTTP backends.

use moltyclaw_core::error::ProviderError;

/// One meaningful SSE line.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum SseLine {
    /// `event: <name>`
    Event(String),
    /// `data: <payload>`
    Data(String),
}

/// Splits a byte stream into SSE lines.
///
/// Bytes are buffered until a newline arrives, so multi-byte UTF-8 characters
/// split across network chunks decode correctly.
#[derive(Debug, Default)]
pub(crate) struct SseLines {
    buffer: Vec<u8>,
}

impl SseLines {
    pub(crate) fn push(&mut self, bytes: &[u8]) -> Vec<SseLine> {
        self.buffer.extend_from_slice(bytes);

        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
            let text = String::from_utf8_lossy(&raw);
            let line = text.trim_end_matches(['\n', '\r']);

            // Skip empty lines and SSE comments
            if line.is_empty() || line.starts_with(':') {
                continue;
            }
            if let Some(event) = line.strip_prefix("event:") {
                lines.push(SseLine::Event(event.trim().to_string()));
            } else if let Some(data) = line.strip_prefix("data:") {
                lines.push(SseLine::Data(data.trim().to_string()));
            }
        }
        lines
    }
}

/// Map a non-success HTTP status to a provider error.
pub(crate) fn status_error(provider: &str, status: u16, body: String) -> ProviderError {
    match status {
        429 => ProviderError::RateLimited { retry_after_secs: 5 },
        401 | 403 => ProviderError::AuthenticationFailed(format!(
            "{provider}: invalid API key or insufficient permissions"
        )),
        404 => ProviderError::ModelNotFound(body),
        _ => ProviderError::ApiError {
            status_code: status,
            message: body,
        },
    }
}

/// Map a reqwest transport failure to a provider error.
pub(crate) fn transport_error(err: reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Timeout(err.to_string())
    } else {
        ProviderError::Network(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lines_split_across_chunks() {
        let mut sse = SseLines::default();
        assert!(sse.push(b"data: {\"a\"").is_empty());
        let lines = sse.push(b":1}\n\nevent: message_stop\r\n");
        assert_eq!(
            lines,
            vec![
                SseLine::Data("{\"a\":1}".into()),
                SseLine::Event("message_stop".into()),
            ]
        );
    }

    #[test]
    fn multibyte_char_split_across_chunks() {
        let mut sse = SseLines::default();
        let bytes = "data: ção\n".as_bytes();
        // Split inside the two-byte 'ç'
        assert!(sse.push(&bytes[..7]).is_empty());
        let lines = sse.push(&bytes[7..]);
        assert_eq!(lines, vec![SseLine::Data("ção".into())]);
    }

    #[test]
    fn comments_and_blank_lines_ignored() {
        let mut sse = SseLines::default();
        assert!(sse.push(b": keep-alive\n\n\n").is_empty());
    }

    #[test]
    fn status_mapping() {
        assert!(matches!(status_error("x", 429, String::new()), ProviderError::RateLimited { .. }));
        assert!(matches!(status_error("x", 401, String::new()), ProviderError::AuthenticationFailed(_)));
        assert!(matches!(status_error("x", 404, "no model".into()), ProviderError::ModelNotFound(_)));
        let err = status_error("x", 503, "overloaded".into());
        assert!(err.is_transient());
        assert!(err.to_string().contains("overloaded"));
    }
}
