//! Per-connection transport loop (spec §4.8): owns the upgraded
//! `fastwebsockets` connection and is the only task that ever touches it,
//! driving both directions off a single `tokio::select!` — incoming frames
//! feed `WebSocketManager::dispatch_*`, and guest-issued `ws.send`/`ws.close`
//! commands arrive back here over an `mpsc` channel filtered by
//! `connection_id`, matching `islet_io`'s own stream-producer loop shape.

use std::sync::Arc;

use bytes::Bytes;
use fastwebsockets::{upgrade, FragmentCollector, Frame, OpCode, WebSocketError};
use hyper::body::Incoming;
use hyper::Request;
use serde_json::Value;

use crate::manager::{Command, WebSocketManager};

/// `server.upgrade(request)`'s host-side counterpart: performs the HTTP
/// Upgrade handshake on the inbound request (spec §4.6, §4.8) and hands the
/// resulting connection to `serve_connection` on its own task, so the
/// caller gets the `101` response back immediately without blocking on the
/// connection's lifetime.
pub fn upgrade_and_serve(
    request: &mut Request<Incoming>,
    connection_id: u64,
    manager: Arc<WebSocketManager>,
) -> Result<http::Response<http_body_util::Empty<Bytes>>, WebSocketError> {
    let (response, fut) = upgrade::upgrade(request)?;
    tokio::spawn(async move {
        match fut.await {
            Ok(ws) => serve_connection(ws, connection_id, manager).await,
            Err(e) => {
                manager.dispatch_error(connection_id, Value::String(e.to_string()));
                manager.dispatch_close(connection_id, None, None);
            }
        }
    });
    Ok(response)
}

/// Runs until the peer closes, this side closes, or the socket errors.
/// Registers its own `on_command` listener for the lifetime of the
/// connection; `WebSocketManager` never removes listeners, so this, like
/// the manager's existing broadcast list, accumulates one entry per
/// connection for the life of the manager.
pub async fn serve_connection<S>(ws: fastwebsockets::WebSocket<S>, connection_id: u64, manager: Arc<WebSocketManager>)
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    let mut ws = FragmentCollector::new(ws);
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<Command>();
    manager.on_command(Box::new(move |cmd| {
        if command_connection_id(cmd) == connection_id {
            let _ = tx.send(cmd.clone());
        }
    }));

    manager.dispatch_open(connection_id);

    loop {
        tokio::select! {
            frame = ws.read_frame() => {
                match frame {
                    Ok(frame) => match frame.opcode {
                        OpCode::Text => {
                            let text = String::from_utf8_lossy(&frame.payload).into_owned();
                            manager.dispatch_message(connection_id, Value::String(text));
                        }
                        OpCode::Binary => {
                            manager.dispatch_message(connection_id, Value::from(frame.payload.to_vec()));
                        }
                        OpCode::Close => {
                            let (code, reason) = parse_close_payload(&frame.payload);
                            manager.dispatch_close(connection_id, code, reason);
                            break;
                        }
                        _ => {}
                    },
                    Err(e) => {
                        manager.dispatch_error(connection_id, Value::String(e.to_string()));
                        manager.dispatch_close(connection_id, None, None);
                        break;
                    }
                }
            }
            Some(cmd) = rx.recv() => {
                if !send_outgoing(&mut ws, cmd).await {
                    break;
                }
            }
        }
    }
}

fn command_connection_id(cmd: &Command) -> u64 {
    match cmd {
        Command::Message { connection_id, .. } => *connection_id,
        Command::Close { connection_id, .. } => *connection_id,
    }
}

/// Returns `false` once the outgoing side should stop driving the loop
/// (a guest-issued close, or a write failure).
async fn send_outgoing<S>(ws: &mut FragmentCollector<S>, cmd: Command) -> bool
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    match cmd {
        Command::Message { data, .. } => {
            let payload = match data {
                Value::String(text) => Frame::text(text.into_bytes().into()),
                other => Frame::binary(other.to_string().into_bytes().into()),
            };
            ws.write_frame(payload).await.is_ok()
        }
        Command::Close { code, reason, .. } => {
            let reason = reason.unwrap_or_default();
            let _ = ws
                .write_frame(Frame::close(code.unwrap_or(1000), reason.as_bytes()))
                .await;
            false
        }
    }
}

fn parse_close_payload(payload: &[u8]) -> (Option<u16>, Option<String>) {
    if payload.len() < 2 {
        return (None, None);
    }
    let code = u16::from_be_bytes([payload[0], payload[1]]);
    let reason = std::str::from_utf8(&payload[2..]).ok().filter(|s| !s.is_empty()).map(str::to_string);
    (Some(code), reason)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fastwebsockets::{Role, WebSocket};

    use crate::manager::WebSocketHandlers;

    #[tokio::test]
    async fn message_round_trip_over_a_duplex_pair_reaches_the_guest_echo_handler() {
        let (client_io, server_io) = tokio::io::duplex(4096);
        let manager = Arc::new(WebSocketManager::new());
        manager.register_connection(1, Value::Null);
        manager.set_handlers(WebSocketHandlers {
            open: None,
            message: Some(Box::new(|ws, data| {
                let text = data.as_str().unwrap_or_default().to_string();
                ws.send(Value::String(format!("echo:{text}")));
            })),
            close: None,
            error: None,
        });

        let server_ws = WebSocket::after_handshake(server_io, Role::Server);
        let server_task = tokio::spawn(serve_connection(server_ws, 1, manager.clone()));

        let mut client_ws = FragmentCollector::new(WebSocket::after_handshake(client_io, Role::Client));
        client_ws
            .write_frame(Frame::text("hi".to_string().into_bytes().into()))
            .await
            .unwrap();
        let reply = client_ws.read_frame().await.unwrap();
        assert_eq!(reply.opcode, OpCode::Text);
        assert_eq!(String::from_utf8_lossy(&reply.payload), "echo:hi");

        client_ws.write_frame(Frame::close(1000, b"bye")).await.unwrap();
        server_task.await.unwrap();
        assert!(!manager.has_active_connections());
    }
}
