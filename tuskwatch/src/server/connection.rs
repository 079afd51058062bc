//! One WebSocket client.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures_util::{Sink, SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::broadcast::error::RecvError;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::controller::{StartOutcome, TrackingController};
use super::protocol::{ClientCommand, CommandResponse, ResponseStatus, ServerMessage, StatusPayload};
use super::ServerError;
use crate::session::SessionEvent;

/// Serves one client until it disconnects or `cancel` fires.
///
/// The client receives a `config` message first, then command responses
/// interleaved with session updates.
pub(crate) async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    controller: Arc<TrackingController>,
    clients: Arc<AtomicUsize>,
    cancel: CancellationToken,
) -> Result<(), ServerError> {
    let websocket = accept_async(stream).await?;
    let (mut write, mut read) = websocket.split();
    let mut events = controller.subscribe();

    let connected = clients.fetch_add(1, Ordering::SeqCst) + 1;
    info!(%peer, clients = connected, "Client connected");

    let result = async {
        send(&mut write, &ServerMessage::Config(controller.config_payload())).await?;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    let _ = write.send(Message::Close(None)).await;
                    break;
                }
                incoming = read.next() => match incoming {
                    Some(Ok(Message::Text(text))) => {
                        let reply = respond(&text, &controller, &clients).await;
                        send(&mut write, &reply).await?;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(ServerError::from(e)),
                },
                event = events.recv() => match event {
                    Ok(SessionEvent::ConfigApplied(_)) => {
                        send(&mut write, &ServerMessage::Config(controller.config_payload()))
                            .await?;
                    }
                    Ok(event) => {
                        if let Some(message) = ServerMessage::from_event(event) {
                            send(&mut write, &message).await?;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(%peer, skipped, "Client lagging, dropped updates");
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }
        Ok::<(), ServerError>(())
    }
    .await;

    let remaining = clients.fetch_sub(1, Ordering::SeqCst) - 1;
    info!(%peer, clients = remaining, "Client disconnected");
    result
}

async fn send<S>(sink: &mut S, message: &ServerMessage) -> Result<(), ServerError>
where
    S: Sink<Message, Error = WsError> + Unpin,
{
    sink.send(Message::Text(message.to_json()?)).await?;
    Ok(())
}

/// Executes one client command and builds the reply.
async fn respond(
    text: &str,
    controller: &TrackingController,
    clients: &AtomicUsize,
) -> ServerMessage {
    let command: ClientCommand = match serde_json::from_str(text) {
        Ok(command) => command,
        Err(e) => {
            warn!(error = %e, "Unparseable client command");
            return ServerMessage::error(format!("Invalid command: {}", e));
        }
    };
    debug!(command = command.name(), "Client command");

    match command {
        ClientCommand::StartTracking => match controller.start().await {
            Ok(StartOutcome::Started) => response(ResponseStatus::TrackingStarted),
            Ok(StartOutcome::AlreadyRunning) => response(ResponseStatus::AlreadyRunning),
            Err(e) => ServerMessage::error(e.to_string()),
        },
        ClientCommand::StopTracking => {
            controller.stop();
            response(ResponseStatus::TrackingStopped)
        }
        ClientCommand::GetStatus => {
            let session = controller.status().await;
            ServerMessage::Status(StatusPayload {
                is_running: session.as_ref().is_some_and(|s| s.running),
                connected_clients: clients.load(Ordering::SeqCst),
                session,
            })
        }
        ClientCommand::UpdateConfig { config } => {
            let report = controller.update_config(config).await;
            ServerMessage::CommandResponse(CommandResponse {
                report: Some(report),
                ..CommandResponse::status(ResponseStatus::ConfigUpdated)
            })
        }
        ClientCommand::ForceAlert { entity_id, zone_id } => {
            match controller.force_alert(entity_id, zone_id).await {
                Ok(alert) => ServerMessage::CommandResponse(CommandResponse {
                    alert: Some(alert),
                    ..CommandResponse::status(ResponseStatus::AlertForced)
                }),
                Err(e) => ServerMessage::error(e.to_string()),
            }
        }
    }
}

fn response(status: ResponseStatus) -> ServerMessage {
    ServerMessage::CommandResponse(CommandResponse::status(status))
}
