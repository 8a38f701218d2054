//! # wire
//!
//! Fixed-width field reader for the terminal's binary stream.
//!
//! There is no framing beyond field widths: every read either yields exactly
//! the requested value or fails, and a failure ends the connection. Scalars
//! use the producer's native byte order, configured via [`ByteOrder`].

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::config::ByteOrder;
use crate::error::BridgeError;

/// Width of an instrument name on the wire, NUL-padded.
pub const NAME_LEN: usize = 32;

pub struct WireReader<R> {
    inner: R,
    byte_order: ByteOrder,
}

impl<R: AsyncRead + Unpin> WireReader<R> {
    pub fn new(inner: R, byte_order: ByteOrder) -> Self {
        Self { inner, byte_order }
    }

    async fn read_array<const N: usize>(&mut self) -> Result<[u8; N], BridgeError> {
        let mut buf = [0u8; N];
        self.inner
            .read_exact(&mut buf)
            .await
            .map_err(BridgeError::from_read)?;
        Ok(buf)
    }

    /// Reads `NAME_LEN` bytes and keeps everything before the first NUL.
    pub async fn read_string(&mut self) -> Result<String, BridgeError> {
        let raw = self.read_array::<NAME_LEN>().await?;
        let end = raw.iter().position(|&b| b == 0).unwrap_or(NAME_LEN);
        Ok(String::from_utf8_lossy(&raw[..end]).into_owned())
    }

    pub async fn read_u32(&mut self) -> Result<u32, BridgeError> {
        let raw = self.read_array::<4>().await?;
        Ok(match self.byte_order {
            ByteOrder::Little => u32::from_le_bytes(raw),
            ByteOrder::Big    => u32::from_be_bytes(raw),
        })
    }

    pub async fn read_u64(&mut self) -> Result<u64, BridgeError> {
        let raw = self.read_array::<8>().await?;
        Ok(match self.byte_order {
            ByteOrder::Little => u64::from_le_bytes(raw),
            ByteOrder::Big    => u64::from_be_bytes(raw),
        })
    }

    pub async fn read_f64(&mut self) -> Result<f64, BridgeError> {
        let raw = self.read_array::<8>().await?;
        Ok(match self.byte_order {
            ByteOrder::Little => f64::from_le_bytes(raw),
            ByteOrder::Big    => f64::from_be_bytes(raw),
        })
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
