//! Bridge identification handshake
//!
//! A microcontroller bridge answers the in-band request `A4 FF 10 00` with
//! its id in angle brackets, e.g. `<HD1A2B3C>`. Tuners behind an MJS cable
//! never see this request.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::{timeout_at, Instant};
use tracing::{debug, trace, warn};

use crate::error::DetectError;

/// In-band id request understood by the bridge firmware
pub const BRIDGE_ID_REQUEST: [u8; 4] = [0xA4, 0xFF, 0x10, 0x00];

/// Id length between the brackets
const ID_LEN: usize = 8;

/// Configuration for the id handshake
#[derive(Debug, Clone)]
pub struct BridgeIdentifyConfig {
    /// Total time allowed for the answer
    pub timeout: Duration,
    /// Give up after this many bytes without a closing bracket
    pub max_response: usize,
}

impl Default for BridgeIdentifyConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(1),
            max_response: 64,
        }
    }
}

/// Check whether `id` has the shape of a bridge id
pub fn is_bridge_id(id: &str) -> bool {
    id.len() == ID_LEN && id.starts_with("HD") && id.is_ascii()
}

/// Send the id request and wait for `<HDxxxxxx>`
///
/// Returns the id without brackets. Bytes before the opening bracket are
/// ignored, the bridge may still be flushing boot output.
pub async fn identify_bridge<S>(
    stream: &mut S,
    port: &str,
    config: &BridgeIdentifyConfig,
) -> Result<String, DetectError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let io_err = |e: std::io::Error| DetectError::IoError {
        port: port.to_string(),
        reason: e.to_string(),
    };

    trace!("Sending bridge id request to {}", port);
    stream.write_all(&BRIDGE_ID_REQUEST).await.map_err(io_err)?;
    stream.flush().await.map_err(io_err)?;

    let deadline = Instant::now() + config.timeout;
    let mut response: Vec<u8> = Vec::new();
    let mut buf = [0u8; 32];

    loop {
        let n = match timeout_at(deadline, stream.read(&mut buf)).await {
            Ok(Ok(0)) => {
                warn!("Port {} closed during id handshake", port);
                return Err(DetectError::Timeout(port.to_string()));
            }
            Ok(Ok(n)) => n,
            Ok(Err(e)) => return Err(io_err(e)),
            Err(_) => {
                debug!("No bridge id from {}", port);
                return Err(DetectError::Timeout(port.to_string()));
            }
        };
        response.extend_from_slice(&buf[..n]);

        if let Some(id) = extract_id(&response)? {
            debug!("Bridge on {} identified as {}", port, id);
            return Ok(id);
        }
        if response.len() > config.max_response {
            return Err(DetectError::BadResponse(
                String::from_utf8_lossy(&response).into_owned(),
            ));
        }
    }
}

/// `Ok(None)` until a complete bracketed token has arrived
fn extract_id(response: &[u8]) -> Result<Option<String>, DetectError> {
    let Some(open) = response.iter().position(|&b| b == b'<') else {
        return Ok(None);
    };
    let Some(len) = response[open + 1..].iter().position(|&b| b == b'>') else {
        return Ok(None);
    };
    let token = String::from_utf8_lossy(&response[open + 1..open + 1 + len]).into_owned();
    if is_bridge_id(&token) {
        Ok(Some(token))
    } else {
        Err(DetectError::BadResponse(token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[test]
    fn test_is_bridge_id() {
        assert!(is_bridge_id("HD1A2B3C"));
        assert!(!is_bridge_id("HD1A2B3"));
        assert!(!is_bridge_id("XX1A2B3C"));
    }

    #[test]
    fn test_extract_id() {
        assert_eq!(extract_id(b"boot\r\n<HD000042>").unwrap().as_deref(), Some("HD000042"));
        assert_eq!(extract_id(b"<HD00").unwrap(), None);
        assert!(matches!(extract_id(b"<nope>"), Err(DetectError::BadResponse(_))));
    }

    #[tokio::test]
    async fn test_identify_bridge() {
        let (mut host, mut bridge) = duplex(64);

        let device = tokio::spawn(async move {
            let mut req = [0u8; 4];
            bridge.read_exact(&mut req).await.unwrap();
            assert_eq!(req, BRIDGE_ID_REQUEST);
            // answer in two pieces
            bridge.write_all(b"<HD12").await.unwrap();
            bridge.write_all(b"3456>").await.unwrap();
            bridge
        });

        let id = identify_bridge(&mut host, "test", &BridgeIdentifyConfig::default())
            .await
            .unwrap();
        assert_eq!(id, "HD123456");
        device.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_identify_bridge_timeout() {
        let (mut host, _silent) = duplex(64);
        let result = identify_bridge(&mut host, "test", &BridgeIdentifyConfig::default()).await;
        assert!(matches!(result, Err(DetectError::Timeout(_))));
    }
}
