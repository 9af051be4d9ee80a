//! Length-delimited bincode framing

use crate::error::{NetworkError, Result};
use bytes::{Bytes, BytesMut};
use futures::{Sink, SinkExt, Stream, StreamExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io;
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LengthDelimitedCodec};

pub type FramedStream = Framed<TcpStream, LengthDelimitedCodec>;

/// Wrap a TCP stream in a length-delimited codec
pub fn framed(stream: TcpStream, max_frame_length: usize) -> FramedStream {
    let codec = LengthDelimitedCodec::builder()
        .max_frame_length(max_frame_length)
        .new_codec();
    Framed::new(stream, codec)
}

pub fn encode_frame<T: Serialize>(message: &T) -> Result<Bytes> {
    Ok(Bytes::from(bincode::serialize(message)?))
}

pub fn decode_frame<T: DeserializeOwned>(frame: &[u8]) -> Result<T> {
    Ok(bincode::deserialize(frame)?)
}

/// Encode and send one message
pub async fn send_message<S, T>(sink: &mut S, message: &T) -> Result<()>
where
    S: Sink<Bytes, Error = io::Error> + Unpin,
    T: Serialize,
{
    let frame = encode_frame(message)?;
    sink.send(frame)
        .await
        .map_err(|e| NetworkError::Transport(format!("write failed: {}", e)))
}

/// Receive and decode one message; `None` once the peer closed the stream
pub async fn recv_message<S, T>(stream: &mut S) -> Result<Option<T>>
where
    S: Stream<Item = io::Result<BytesMut>> + Unpin,
    T: DeserializeOwned,
{
    match stream.next().await {
        Some(Ok(frame)) => decode_frame(&frame).map(Some),
        Some(Err(e)) => Err(NetworkError::Transport(format!("read failed: {}", e))),
        None => Ok(None),
    }
}
