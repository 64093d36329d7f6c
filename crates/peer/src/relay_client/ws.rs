//! WebSocket client: pipes lines into the relay and prints what it relays back.

use std::time::Duration;

use anyhow::Result;
use futures_util::{SinkExt, StreamExt};
use shared::SignalMessage;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

pub type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

pub async fn connect(url: &str) -> Result<WsStream> {
    let (ws, _) = connect_async(url).await?;
    tracing::info!("Connected to relayer at {}", url);
    Ok(ws)
}

/// Printable form of a relayed frame. Control frames are not printed.
pub fn render(msg: &Message) -> Option<String> {
    match msg {
        Message::Text(text) => {
            if let Some(signal) = SignalMessage::parse(text) {
                tracing::info!(kind = signal.kind().as_str(), "signal received");
            }
            Some(text.clone())
        }
        Message::Binary(bytes) => Some(format!("[binary {} bytes]", bytes.len())),
        Message::Ping(_) | Message::Pong(_) | Message::Close(_) | Message::Frame(_) => None,
    }
}

/// Send each line of `input` as a text frame and write relayed frames to
/// `output`, one per line. Ends when the relay closes the connection, or when
/// `input` is exhausted (the connection is then closed).
pub async fn pump<R, W>(ws: WsStream, input: Option<R>, output: &mut W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let (mut ws_tx, mut ws_rx) = ws.split();
    let mut lines = input.map(|r| r.lines());

    loop {
        tokio::select! {
            line = async {
                match lines.as_mut() {
                    Some(lines) => lines.next_line().await,
                    None => std::future::pending().await,
                }
            } => {
                match line? {
                    Some(line) if line.trim().is_empty() => continue,
                    Some(line) => ws_tx.send(Message::Text(line)).await?,
                    None => {
                        ws_tx.send(Message::Close(None)).await.ok();
                        break;
                    }
                }
            }
            msg = ws_rx.next() => {
                let msg = match msg {
                    Some(Ok(Message::Close(_))) | None => {
                        tracing::info!("Relayer closed the connection");
                        break;
                    }
                    Some(Ok(msg)) => msg,
                    Some(Err(e)) => return Err(e.into()),
                };
                if let Some(line) = render(&msg) {
                    output.write_all(line.as_bytes()).await?;
                    output.write_all(b"\n").await?;
                    output.flush().await?;
                }
            }
        }
    }

    Ok(())
}

/// Interactive session over stdin/stdout.
pub async fn run_chat(url: &str) -> Result<()> {
    let ws = connect(url).await?;
    let stdin = BufReader::new(tokio::io::stdin());
    let mut stdout = tokio::io::stdout();
    pump(ws, Some(stdin), &mut stdout).await
}

/// Print relayed frames; optionally reconnect whenever the connection drops.
pub async fn run_listen(url: &str, reconnect: bool) -> Result<()> {
    let mut stdout = tokio::io::stdout();
    loop {
        match connect(url).await {
            Ok(ws) => {
                if let Err(e) = pump(ws, None::<tokio::io::Empty>, &mut stdout).await {
                    tracing::warn!("Connection error: {}", e);
                }
            }
            Err(e) if reconnect => {
                tracing::warn!("Connect failed: {}, retrying in 5s", e);
            }
            Err(e) => return Err(e),
        }
        if !reconnect {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_secs(5)).await;
    }
}

/// Send one text frame, print relayed frames for `linger`, then close.
pub async fn send_once(url: &str, message: &str, linger: Duration) -> Result<()> {
    let mut ws = connect(url).await?;
    ws.send(Message::Text(message.to_string())).await?;

    if !linger.is_zero() {
        let mut stdout = tokio::io::stdout();
        let deadline = tokio::time::sleep(linger);
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                _ = &mut deadline => break,
                msg = ws.next() => match msg {
                    Some(Ok(Message::Close(_))) | None => return Ok(()),
                    Some(Ok(msg)) => {
                        if let Some(line) = render(&msg) {
                            stdout.write_all(line.as_bytes()).await?;
                            stdout.write_all(b"\n").await?;
                        }
                    }
                    Some(Err(e)) => return Err(e.into()),
                },
            }
        }
        stdout.flush().await?;
    }

    ws.close(None).await?;
    Ok(())
}
