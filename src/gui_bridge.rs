use std::net::SocketAddr;

use anyhow::Context;
use serde::Deserialize;
use serde_json::json;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;

use crate::config::Config;
use crate::error::ErrorKind;
use crate::events::CallObserver;

#[derive(Debug, Clone, PartialEq)]
pub enum GuiEvent {
    StartCall,
    EndCall,
    /// Anything else the GUI sends, passed through as text.
    Message(String),
}

#[derive(Deserialize)]
struct GuiCommand {
    #[serde(rename = "type")]
    msg_type: String,
}

impl GuiEvent {
    fn parse(text: &str) -> Self {
        match serde_json::from_str::<GuiCommand>(text) {
            Ok(cmd) if cmd.msg_type == "start_call" => GuiEvent::StartCall,
            Ok(cmd) if cmd.msg_type == "end_call" => GuiEvent::EndCall,
            _ => GuiEvent::Message(text.to_string()),
        }
    }
}

pub struct GuiBridge {
    socket: UdpSocket,
    target_addr: SocketAddr,
    tx: mpsc::Sender<GuiEvent>,
}

// GUI进程和Core进程通过本地UDP通信，端口在配置中指定
impl GuiBridge {
    pub async fn new(config: &Config, tx: mpsc::Sender<GuiEvent>) -> anyhow::Result<Self> {
        let target_addr = SocketAddr::from(([127, 0, 0, 1], config.gui_remote_port));
        Self::bind(&format!("0.0.0.0:{}", config.gui_local_port), target_addr, tx).await
    }

    pub async fn bind(local: &str, target_addr: SocketAddr, tx: mpsc::Sender<GuiEvent>) -> anyhow::Result<Self> {
        // 绑定本地UDP端口
        let socket = UdpSocket::bind(local)
            .await
            .with_context(|| format!("Failed to bind GUI socket on {}", local))?;
        Ok(Self {
            socket,
            target_addr,
            tx,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub async fn run(&self) -> anyhow::Result<()> {
        let mut buf = [0u8; 4096]; // 4KB缓冲区
        loop {
            let (len, _) = self.socket.recv_from(&mut buf).await?;
            if len == 0 {
                continue;
            }
            let Ok(msg) = std::str::from_utf8(&buf[..len]) else {
                log::debug!("Ignoring non UTF-8 GUI datagram");
                continue;
            };
            if self.tx.send(GuiEvent::parse(msg.trim())).await.is_err() {
                log::warn!("GUI event receiver dropped");
                break;
            }
        }
        Ok(())
    }

    // 回调在会话任务里同步调用，不能等待
    fn notify(&self, msg: serde_json::Value) {
        if let Err(e) = self.socket.try_send_to(msg.to_string().as_bytes(), self.target_addr) {
            log::debug!("Failed to notify GUI: {}", e);
        }
    }
}

impl CallObserver for GuiBridge {
    fn on_call_state_change(&self, active: bool) {
        log::info!("Call state changed: active={}", active);
        self.notify(json!({"type": "call_state", "active": active}));
    }

    fn on_first_audio_packet(&self) {
        self.notify(json!({"type": "first_audio_packet"}));
    }

    fn on_media_permission_granted(&self) {
        self.notify(json!({"type": "media_permission_granted"}));
    }

    fn on_error(&self, kind: ErrorKind, detail: &str) {
        log::error!("Call error [{}]: {}", kind, detail);
        self.notify(json!({"type": "error", "kind": kind.as_str(), "detail": detail}));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn parses_gui_commands() {
        assert_eq!(GuiEvent::parse(r#"{"type":"start_call"}"#), GuiEvent::StartCall);
        assert_eq!(GuiEvent::parse(r#"{"type":"end_call"}"#), GuiEvent::EndCall);
        assert_eq!(GuiEvent::parse("hello"), GuiEvent::Message("hello".to_string()));
    }

    #[tokio::test]
    async fn forwards_notifications_and_commands() {
        let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let (tx, mut rx) = mpsc::channel(4);
        let bridge = Arc::new(
            GuiBridge::bind("127.0.0.1:0", peer.local_addr().unwrap(), tx)
                .await
                .unwrap(),
        );

        bridge.on_error(ErrorKind::Websocket, "reset");
        let mut buf = [0u8; 512];
        let (len, _) = tokio::time::timeout(Duration::from_secs(2), peer.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
        let msg: serde_json::Value = serde_json::from_slice(&buf[..len]).unwrap();
        assert_eq!(msg, json!({"type": "error", "kind": "websocket_error", "detail": "reset"}));

        let runner = bridge.clone();
        tokio::spawn(async move { runner.run().await });
        peer.send_to(br#"{"type":"end_call"}"#, bridge.local_addr().unwrap())
            .await
            .unwrap();
        let event = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await.unwrap();
        assert_eq!(event, Some(GuiEvent::EndCall));
    }
}
