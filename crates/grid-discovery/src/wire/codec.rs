//! Length-prefixed frame codec.

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::domain::WireError;

/// Serialize `message` into a frame body, enforcing `max_bytes`.
pub fn encode_frame<T: Serialize>(message: &T, max_bytes: usize) -> Result<Vec<u8>, WireError> {
    let body = bincode::serialize(message).map_err(|e| WireError::Encode(e.to_string()))?;
    if body.len() > max_bytes || body.len() > u32::MAX as usize {
        return Err(WireError::MessageTooLarge {
            size: body.len(),
            max: max_bytes,
        });
    }
    Ok(body)
}

pub fn decode_frame<T: DeserializeOwned>(body: &[u8]) -> Result<T, WireError> {
    bincode::deserialize(body).map_err(|e| WireError::Decode(e.to_string()))
}

/// Write one frame and flush.
pub async fn write_frame<W, T>(writer: &mut W, message: &T, max_bytes: usize) -> Result<(), WireError>
where
    W: AsyncWrite + Unpin + ?Sized,
    T: Serialize,
{
    let body = encode_frame(message, max_bytes)?;
    writer.write_u32(body.len() as u32).await?;
    writer.write_all(&body).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one frame.
///
/// The length prefix is checked before any body byte is buffered, so an
/// oversized frame costs four bytes of reading.
pub async fn read_frame<R, T>(reader: &mut R, max_bytes: usize) -> Result<T, WireError>
where
    R: AsyncRead + Unpin + ?Sized,
    T: DeserializeOwned,
{
    let len = reader.read_u32().await? as usize;
    if len > max_bytes {
        return Err(WireError::MessageTooLarge {
            size: len,
            max: max_bytes,
        });
    }
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    decode_frame(&body)
}
