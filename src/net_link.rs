use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use url::Url;

use crate::transport::{NetCommand, NetEvent, Transport};

/// WebSocket transport, one background task per call. No reconnection: a
/// dropped socket ends the call.
#[derive(Debug, Default, Clone, Copy)]
pub struct WsTransport;

impl Transport for WsTransport {
    fn open(
        &self,
        url: &Url,
        commands: mpsc::Receiver<NetCommand>,
        events: mpsc::Sender<NetEvent>,
        hangup: oneshot::Receiver<()>,
    ) -> anyhow::Result<()> {
        match url.scheme() {
            "ws" | "wss" => {}
            other => anyhow::bail!("Unsupported WebSocket scheme: {}", other),
        }
        let link = NetLink::new(url.clone(), events, commands, hangup);
        tokio::spawn(link.run());
        Ok(())
    }
}

pub struct NetLink {
    url: Url,
    tx: mpsc::Sender<NetEvent>,
    rx_cmd: mpsc::Receiver<NetCommand>,
    hangup: oneshot::Receiver<()>,
}

impl NetLink {
    pub fn new(
        url: Url,
        tx: mpsc::Sender<NetEvent>,
        rx_cmd: mpsc::Receiver<NetCommand>,
        hangup: oneshot::Receiver<()>,
    ) -> Self {
        Self {
            url,
            tx,
            rx_cmd,
            hangup,
        }
    }

    pub async fn run(mut self) {
        if let Err(e) = self.connect_and_loop().await {
            log::error!("Web call websocket error: {:#}", e);
            let _ = self.tx.send(NetEvent::Error(e.to_string())).await;
        }
        let _ = self.tx.send(NetEvent::Disconnected).await;
    }

    // 进入连接和主循环，处理WebSocket消息和发送命令
    async fn connect_and_loop(&mut self) -> anyhow::Result<()> {
        // auth_token 在 query 中，日志里只打印路径
        log::info!("Connecting to {}://{}{}...", self.url.scheme(), self.url.host_str().unwrap_or(""), self.url.path());
        let (ws_stream, _) = tokio::select! {
            biased;

            _ = &mut self.hangup => {
                log::info!("Hung up before the websocket connected");
                return Ok(());
            }
            connected = connect_async(self.url.as_str()) => connected?,
        };
        log::info!("WebSocket connected.");

        let (mut write, mut read) = ws_stream.split();

        if self.tx.send(NetEvent::Connected).await.is_err() {
            // 会话已结束
            return Ok(());
        }

        loop {
            tokio::select! {
                // 挂断优先于排队中的麦克风帧
                biased;

                _ = &mut self.hangup => {
                    log::info!("Closing websocket");
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(());
                }
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            if self.tx.send(NetEvent::Text(text.to_string())).await.is_err() {
                                let _ = write.send(Message::Close(None)).await;
                                return Ok(());
                            }
                        }
                        Some(Ok(Message::Binary(data))) => {
                            log::debug!("Ignoring {} byte binary frame", data.len());
                        }
                        Some(Ok(Message::Close(frame))) => {
                            log::info!("Server closed connection: {:?}", frame);
                            return Ok(());
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => return Err(e.into()),
                        None => return Ok(()),
                    }
                }
                cmd = self.rx_cmd.recv() => {
                    match cmd {
                        Some(NetCommand::SendText(text)) => {
                            write.send(Message::Text(text.into())).await?;
                        }
                        None => {
                            log::info!("Command channel closed, closing websocket");
                            let _ = write.send(Message::Close(None)).await;
                            return Ok(());
                        }
                    }
                }
            }
        }
    }
}
