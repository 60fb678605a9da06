//! Fixed-size coordinate encoding: `DIMENSIONS` big-endian `f64`
//! components followed by the sender's error estimate.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::domain::{Coordinate, WireError, DIMENSIONS};

/// Encoded size in bytes.
pub const COORDINATE_WIRE_LEN: usize = (DIMENSIONS + 1) * 8;

pub fn encode_coordinate(coordinate: &Coordinate, error: f64) -> [u8; COORDINATE_WIRE_LEN] {
    let mut out = [0u8; COORDINATE_WIRE_LEN];
    let values = coordinate.components().into_iter().chain(std::iter::once(error));
    for (chunk, value) in out.chunks_exact_mut(8).zip(values) {
        chunk.copy_from_slice(&value.to_be_bytes());
    }
    out
}

pub fn decode_coordinate(bytes: &[u8; COORDINATE_WIRE_LEN]) -> (Coordinate, f64) {
    let mut values = [0.0f64; DIMENSIONS + 1];
    for (value, chunk) in values.iter_mut().zip(bytes.chunks_exact(8)) {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(chunk);
        *value = f64::from_be_bytes(raw);
    }
    let mut components = [0.0; DIMENSIONS];
    components.copy_from_slice(&values[..DIMENSIONS]);
    (Coordinate::new(components), values[DIMENSIONS])
}

pub async fn write_coordinate<W>(writer: &mut W, coordinate: &Coordinate, error: f64) -> Result<(), WireError>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    writer.write_all(&encode_coordinate(coordinate, error)).await?;
    writer.flush().await?;
    Ok(())
}

pub async fn read_coordinate<R>(reader: &mut R) -> Result<(Coordinate, f64), WireError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut bytes = [0u8; COORDINATE_WIRE_LEN];
    reader.read_exact(&mut bytes).await?;
    Ok(decode_coordinate(&bytes))
}
