use std::sync::Arc;

use tokio::signal;
use tokio::sync::mpsc;

use webcall_linux_rs::audio::AlsaBackend;
use webcall_linux_rs::config::Config;
use webcall_linux_rs::gui_bridge::{GuiBridge, GuiEvent};
use webcall_linux_rs::net_link::WsTransport;
use webcall_linux_rs::{CallError, CallSession, CallSettings};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    env_logger::init();

    // 加载配置
    let config = Config::new()?;
    log::info!("{} {} starting", env!("APP_NAME"), env!("APP_VERSION"));

    // GUI进程通道
    let (tx_gui_event, mut rx_gui_event) = mpsc::channel::<GuiEvent>(100);

    // 启动GUI桥，同时作为通话事件的接收者
    let gui_bridge = Arc::new(GuiBridge::new(&config, tx_gui_event).await?);
    let gui_bridge_clone = gui_bridge.clone();
    tokio::spawn(async move {
        if let Err(e) = gui_bridge_clone.run().await {
            log::error!("GuiBridge error: {:#}", e);
        }
    });

    let mut session = CallSession::new(
        CallSettings::from_config(&config),
        Arc::new(WsTransport),
        Arc::new(AlsaBackend::new(config.audio.clone())),
        gui_bridge.clone(),
    );

    if config.auto_start {
        start_call(&mut session).await;
        if !session.is_call_active() && config.exit_on_hangup {
            return Ok(());
        }
    }

    loop {
        tokio::select! {
            // 监听 Ctrl+C 信号
            _ = signal::ctrl_c() => {
                log::info!("Received Ctrl+C, shutting down...");
                session.end_call().await;
                break;
            }

            event = session.next_event() => {
                session.handle_net_event(event).await;
                if !session.is_call_active() && config.exit_on_hangup {
                    log::info!("Call finished, exiting");
                    break;
                }
            }

            Some(event) = rx_gui_event.recv() => {
                match event {
                    GuiEvent::StartCall => start_call(&mut session).await,
                    GuiEvent::EndCall => {
                        session.end_call().await;
                        if config.exit_on_hangup {
                            break;
                        }
                    }
                    GuiEvent::Message(msg) => {
                        log::debug!("Unhandled message from GUI: {}", msg);
                    }
                }
            }
        }
    }
    Ok(())
}

async fn start_call(session: &mut CallSession) {
    match session.initiate_call().await {
        Ok(()) => {}
        Err(CallError::AlreadyInProgress) => {}
        // 已通过回调通知GUI
        Err(e) => log::warn!("Call did not start: {}", e),
    }
}
