//! WebSocket adapter for the socket transport.
//!
//! Maps tungstenite messages onto [`Frame`]s: text to text, binary to binary.
//! Control frames are handled by tungstenite itself and never surface; a close
//! frame ends the stream.

use crate::core::codec::Frame;
use crate::error::{ProtocolError, Result};
use futures::{Sink, Stream};
use std::pin::Pin;
use std::task::{ready, Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

/// A WebSocket connection speaking [`Frame`]s
pub struct WebSocketFrames<S> {
    inner: WebSocketStream<S>,
}

impl<S> WebSocketFrames<S> {
    pub fn new(inner: WebSocketStream<S>) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> WebSocketStream<S> {
        self.inner
    }
}

impl<S> std::fmt::Debug for WebSocketFrames<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocketFrames").finish_non_exhaustive()
    }
}

/// Perform the server side of the WebSocket handshake on `stream`
pub async fn accept<S>(stream: S) -> Result<WebSocketFrames<S>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let ws = tokio_tungstenite::accept_async(stream).await?;
    Ok(WebSocketFrames::new(ws))
}

/// Like [`accept`], also returning the raw query string of the request URI
/// (`EIO=4&transport=websocket&sid=...`).
pub async fn accept_with_query<S>(stream: S) -> Result<(WebSocketFrames<S>, String)>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut query = String::new();
    let ws = tokio_tungstenite::accept_hdr_async(stream, |req: &Request, resp: Response| {
        query = req.uri().query().unwrap_or_default().to_string();
        Ok(resp)
    })
    .await?;
    Ok((WebSocketFrames::new(ws), query))
}

impl<S> Stream for WebSocketFrames<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    type Item = Result<Frame>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            let msg = match ready!(Pin::new(&mut self.inner).poll_next(cx)) {
                Some(Ok(msg)) => msg,
                Some(Err(e)) => return Poll::Ready(Some(Err(e.into()))),
                None => return Poll::Ready(None),
            };
            match msg {
                Message::Text(text) => {
                    return Poll::Ready(Some(Ok(Frame::Text(text.as_str().to_owned()))))
                }
                Message::Binary(bytes) => return Poll::Ready(Some(Ok(Frame::Binary(bytes)))),
                Message::Close(_) => return Poll::Ready(None),
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => continue,
            }
        }
    }
}

impl<S> Sink<Frame> for WebSocketFrames<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    type Error = ProtocolError;

    fn poll_ready(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<()>> {
        Pin::new(&mut self.inner).poll_ready(cx).map_err(Into::into)
    }

    fn start_send(mut self: Pin<&mut Self>, frame: Frame) -> Result<()> {
        let msg = match frame {
            Frame::Text(text) => Message::Text(text.into()),
            Frame::Binary(bytes) => Message::Binary(bytes),
        };
        Pin::new(&mut self.inner).start_send(msg).map_err(Into::into)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx).map_err(Into::into)
    }

    fn poll_close(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<()>> {
        Pin::new(&mut self.inner).poll_close(cx).map_err(Into::into)
    }
}
