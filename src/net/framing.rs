//! Message framing for length-prefixed protocol
//!
//! Format: `[4 bytes little-endian length][bincode payload]`

use std::io;

use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::game::constants::net::MAX_MESSAGE_SIZE;
use crate::net::protocol::{self, ClientMessage, DecodeError, EncodeError};

/// Errors that can occur during message framing
#[derive(Debug, thiserror::Error)]
pub enum FramingError {
    #[error("Connection closed")]
    ConnectionClosed,
    #[error("Message too large: {0} bytes (max {1})")]
    MessageTooLarge(usize, usize),
    #[error(transparent)]
    Encode(#[from] EncodeError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl FramingError {
    /// Whether the stream can no longer be used
    pub fn is_fatal(&self) -> bool {
        !matches!(self, FramingError::Decode(_))
    }
}

/// Read one length-prefixed payload
pub async fn read_message<R: AsyncRead + Unpin>(stream: &mut R) -> Result<Vec<u8>, FramingError> {
    let mut len_buf = [0u8; 4];
    match stream.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
            return Err(FramingError::ConnectionClosed);
        }
        Err(e) => return Err(FramingError::Io(e)),
    }

    let len = u32::from_le_bytes(len_buf) as usize;

    // Photos travel inline, so the cap is generous but still enforced
    if len > MAX_MESSAGE_SIZE {
        return Err(FramingError::MessageTooLarge(len, MAX_MESSAGE_SIZE));
    }

    if len == 0 {
        return Ok(Vec::new());
    }

    let mut buf = vec![0u8; len];
    match stream.read_exact(&mut buf).await {
        Ok(_) => Ok(buf),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(FramingError::ConnectionClosed),
        Err(e) => Err(FramingError::Io(e)),
    }
}

/// Write one length-prefixed payload and flush
pub async fn write_message<W: AsyncWrite + Unpin>(stream: &mut W, data: &[u8]) -> Result<(), FramingError> {
    if data.len() > MAX_MESSAGE_SIZE {
        return Err(FramingError::MessageTooLarge(data.len(), MAX_MESSAGE_SIZE));
    }

    let len_bytes = (data.len() as u32).to_le_bytes();
    stream.write_all(&len_bytes).await?;
    stream.write_all(data).await?;
    stream.flush().await?;

    Ok(())
}

/// Read and decode the next client message
pub async fn read_client_message<R: AsyncRead + Unpin>(stream: &mut R) -> Result<ClientMessage, FramingError> {
    let payload = read_message(stream).await?;
    Ok(protocol::decode(&payload)?)
}

/// Encode and write a message
pub async fn write_encoded<W: AsyncWrite + Unpin, T: Serialize>(stream: &mut W, message: &T) -> Result<(), FramingError> {
    let payload = protocol::encode(message)?;
    write_message(stream, &payload).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::protocol::ServerMessage;
    use std::io::Cursor;

    #[tokio::test]
    async fn test_read_write_message() {
        let data = b"Hello, arena!";
        let mut buffer = Vec::new();

        write_message(&mut buffer, data).await.unwrap();

        let mut cursor = Cursor::new(buffer);
        let result = read_message(&mut cursor).await.unwrap();
        assert_eq!(result, data);
    }

    #[tokio::test]
    async fn test_empty_message() {
        let mut buffer = Vec::new();
        write_message(&mut buffer, b"").await.unwrap();

        let mut cursor = Cursor::new(buffer);
        assert!(read_message(&mut cursor).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_message_too_large() {
        let large_data = vec![0u8; MAX_MESSAGE_SIZE + 1];
        let mut buffer = Vec::new();

        let result = write_message(&mut buffer, &large_data).await;
        assert!(matches!(result, Err(FramingError::MessageTooLarge(_, _))));
    }

    #[tokio::test]
    async fn test_oversized_prefix_rejected() {
        let mut buffer = Vec::new();
        buffer.extend_from_slice(&((MAX_MESSAGE_SIZE as u32) + 1).to_le_bytes());

        let mut cursor = Cursor::new(buffer);
        let result = read_message(&mut cursor).await;
        assert!(matches!(result, Err(FramingError::MessageTooLarge(_, _))));
    }

    #[tokio::test]
    async fn test_read_truncated_payload() {
        let mut buffer = Vec::new();
        buffer.extend_from_slice(&10u32.to_le_bytes());
        buffer.extend_from_slice(&[1, 2, 3]);

        let mut cursor = Cursor::new(buffer);
        let result = read_message(&mut cursor).await;
        assert!(matches!(result, Err(FramingError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_client_message_stream() {
        let mut buffer = Vec::new();
        write_encoded(&mut buffer, &ClientMessage::JoinAsDisplay { physics_host: true })
            .await
            .unwrap();
        write_encoded(&mut buffer, &ClientMessage::Ping { timestamp: 99 })
            .await
            .unwrap();

        let mut cursor = Cursor::new(buffer);
        assert!(matches!(
            read_client_message(&mut cursor).await.unwrap(),
            ClientMessage::JoinAsDisplay { physics_host: true }
        ));
        assert!(matches!(
            read_client_message(&mut cursor).await.unwrap(),
            ClientMessage::Ping { timestamp: 99 }
        ));
        assert!(matches!(
            read_client_message(&mut cursor).await,
            Err(FramingError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_undecodable_payload_is_not_fatal() {
        let mut buffer = Vec::new();
        write_message(&mut buffer, &[0xff; 8]).await.unwrap();

        let mut cursor = Cursor::new(buffer);
        let err = read_client_message(&mut cursor).await.unwrap_err();
        assert!(matches!(err, FramingError::Decode(_)));
        assert!(!err.is_fatal());
        assert!(FramingError::ConnectionClosed.is_fatal());
    }

    #[tokio::test]
    async fn test_server_message_roundtrip_through_frame() {
        let mut buffer = Vec::new();
        write_encoded(&mut buffer, &ServerMessage::RoundStarted).await.unwrap();

        let mut cursor = Cursor::new(buffer);
        let payload = read_message(&mut cursor).await.unwrap();
        assert!(matches!(
            protocol::decode::<ServerMessage>(&payload).unwrap(),
            ServerMessage::RoundStarted
        ));
    }

    #[test]
    fn test_frame_split_across_reads() {
        let payload = protocol::encode(&ClientMessage::StartRound).unwrap();
        let len = (payload.len() as u32).to_le_bytes();
        let mut stream = tokio_test::io::Builder::new()
            .read(&len[..2])
            .read(&len[2..])
            .read(&payload)
            .build();

        let message = tokio_test::block_on(read_client_message(&mut stream)).unwrap();
        assert!(matches!(message, ClientMessage::StartRound));
    }

    #[test]
    fn test_write_emits_prefix_then_payload() {
        let payload = protocol::encode(&ServerMessage::RoundStarted).unwrap();
        let len = (payload.len() as u32).to_le_bytes();
        let mut stream = tokio_test::io::Builder::new()
            .write(&len)
            .write(&payload)
            .build();

        tokio_test::block_on(write_encoded(&mut stream, &ServerMessage::RoundStarted)).unwrap();
    }
}
