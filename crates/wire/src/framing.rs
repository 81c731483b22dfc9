// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Length-prefixed JSON framing over any async byte stream.

use crate::contracts::{CoreRequest, CoreResponse};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Upper bound for a single frame. Oversized frames are a protocol error,
/// not an allocation request.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("connection closed")]
    ConnectionClosed,

    #[error("read/write timeout")]
    Timeout,

    #[error("frame exceeds {MAX_FRAME_LEN} bytes: {0}")]
    FrameTooLarge(usize),

    #[error("malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Encode a request into a length-prefixed frame.
pub fn encode_request(request: &CoreRequest) -> Result<Vec<u8>, ProtocolError> {
    encode(&serde_json::to_vec(request)?)
}

/// Encode a response into a length-prefixed frame.
pub fn encode_response(response: &CoreResponse) -> Result<Vec<u8>, ProtocolError> {
    encode(&serde_json::to_vec(response)?)
}

fn encode(payload: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    if payload.len() > MAX_FRAME_LEN {
        return Err(ProtocolError::FrameTooLarge(payload.len()));
    }
    let mut frame = Vec::with_capacity(payload.len() + 4);
    frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// Decode a request from a full frame (prefix included).
pub fn decode_request(frame: &[u8]) -> Result<CoreRequest, ProtocolError> {
    Ok(serde_json::from_slice(decode_payload(frame)?)?)
}

/// Decode a response from a full frame (prefix included).
pub fn decode_response(frame: &[u8]) -> Result<CoreResponse, ProtocolError> {
    Ok(serde_json::from_slice(decode_payload(frame)?)?)
}

fn decode_payload(frame: &[u8]) -> Result<&[u8], ProtocolError> {
    if frame.len() < 4 {
        return Err(ProtocolError::ConnectionClosed);
    }
    let mut prefix = [0u8; 4];
    prefix.copy_from_slice(&frame[..4]);
    let len = u32::from_be_bytes(prefix) as usize;
    if len > MAX_FRAME_LEN {
        return Err(ProtocolError::FrameTooLarge(len));
    }
    if frame.len() < 4 + len {
        return Err(ProtocolError::ConnectionClosed);
    }
    Ok(&frame[4..4 + len])
}

async fn read_frame<R>(reader: &mut R, timeout: Duration) -> Result<Vec<u8>, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let read = async {
        let mut prefix = [0u8; 4];
        reader.read_exact(&mut prefix).await?;
        let len = u32::from_be_bytes(prefix) as usize;
        if len > MAX_FRAME_LEN {
            return Err(ProtocolError::FrameTooLarge(len));
        }
        let mut payload = vec![0u8; len];
        reader.read_exact(&mut payload).await?;
        Ok::<_, ProtocolError>(payload)
    };
    match tokio::time::timeout(timeout, read).await {
        Err(_) => Err(ProtocolError::Timeout),
        Ok(Err(ProtocolError::Io(error)))
            if error.kind() == std::io::ErrorKind::UnexpectedEof =>
        {
            Err(ProtocolError::ConnectionClosed)
        }
        Ok(result) => result,
    }
}

async fn write_frame<W>(
    writer: &mut W,
    frame: &[u8],
    timeout: Duration,
) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    let write = async {
        writer.write_all(frame).await?;
        writer.flush().await?;
        Ok::<_, ProtocolError>(())
    };
    match tokio::time::timeout(timeout, write).await {
        Err(_) => Err(ProtocolError::Timeout),
        Ok(result) => result,
    }
}

/// Read one request frame with a timeout.
pub async fn read_request<R>(
    reader: &mut R,
    timeout: Duration,
) -> Result<CoreRequest, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let payload = read_frame(reader, timeout).await?;
    Ok(serde_json::from_slice(&payload)?)
}

/// Read one response frame with a timeout.
pub async fn read_response<R>(
    reader: &mut R,
    timeout: Duration,
) -> Result<CoreResponse, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let payload = read_frame(reader, timeout).await?;
    Ok(serde_json::from_slice(&payload)?)
}

/// Write one request frame with a timeout.
pub async fn write_request<W>(
    writer: &mut W,
    request: &CoreRequest,
    timeout: Duration,
) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    let frame = encode_request(request)?;
    write_frame(writer, &frame, timeout).await
}

/// Write one response frame with a timeout.
pub async fn write_response<W>(
    writer: &mut W,
    response: &CoreResponse,
    timeout: Duration,
) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    let frame = encode_response(response)?;
    write_frame(writer, &frame, timeout).await
}

#[cfg(test)]
#[path = "framing_tests.rs"]
mod tests;
