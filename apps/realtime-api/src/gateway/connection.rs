//! Per-connection pumps: mailbox → socket delivery and socket → hub liveness.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::oneshot;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};

use crate::auth::{AccessService, Principal};
use crate::config::Config;

use super::hub::Hub;
use super::session::{ConnectionInfo, Mailbox};

/// Timing and buffering knobs for a single connection.
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    pub mailbox_capacity: usize,
    pub ping_interval: Duration,
    pub pong_wait: Duration,
    pub write_wait: Duration,
    pub reauth_interval: Option<Duration>,
    pub coalesce_frames: bool,
}

impl From<&Config> for ConnectionSettings {
    fn from(config: &Config) -> Self {
        Self {
            mailbox_capacity: config.mailbox_capacity,
            ping_interval: config.ping_interval,
            pong_wait: config.pong_wait,
            write_wait: config.write_wait,
            reauth_interval: config.reauth_interval,
            coalesce_frames: config.coalesce_frames,
        }
    }
}

/// What the inbound pump needs to re-check access while connected.
pub struct Reauthorizer {
    pub access: Arc<dyn AccessService>,
    pub principal: Principal,
}

/// Drive one subscribed connection until it ends.
///
/// Runs both pumps concurrently and returns once both have exited. The
/// connection must already be subscribed to `hub`; it is always unsubscribed
/// before this returns.
pub async fn run_connection(
    socket: WebSocket,
    hub: Hub,
    info: Arc<ConnectionInfo>,
    mailbox: Mailbox,
    settings: ConnectionSettings,
    reauth: Option<Reauthorizer>,
) {
    let (sink, stream) = socket.split();
    let (writer_done_tx, writer_done_rx) = oneshot::channel();

    tokio::join!(
        write_pump(sink, mailbox, &info, &settings, writer_done_tx),
        read_pump(stream, &hub, &info, &settings, writer_done_rx, reauth),
    );
}

/// Deliver mailbox frames and keep-alive pings to the client.
///
/// Exits on mailbox closure (sending a Close frame first) or on any failed
/// write, then closes the sink. Dropping `done` tells the inbound pump.
async fn write_pump<S>(
    mut sink: S,
    mut mailbox: Mailbox,
    info: &ConnectionInfo,
    settings: &ConnectionSettings,
    done: oneshot::Sender<()>,
) where
    S: Sink<Message> + Unpin,
    S::Error: std::fmt::Debug,
{
    let mut ping = time::interval_at(
        Instant::now() + settings.ping_interval,
        settings.ping_interval,
    );
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            frame = mailbox.recv() => {
                let Some(frame) = frame else {
                    // Closed by the hub.
                    let _ = write(&mut sink, Message::Close(None), settings.write_wait).await;
                    break;
                };

                let text = if settings.coalesce_frames {
                    let mut batch = String::from(&*frame);
                    // Only what is already queued; the mailbox is bounded.
                    while let Ok(next) = mailbox.try_recv() {
                        batch.push('\n');
                        batch.push_str(&next);
                    }
                    batch
                } else {
                    String::from(&*frame)
                };

                if let Err(err) = write(&mut sink, Message::Text(text.into()), settings.write_wait).await {
                    tracing::debug!(connection_id = %info.id, %err, "write failed");
                    break;
                }
            }
            _ = ping.tick() => {
                if let Err(err) = write(&mut sink, Message::Ping(Bytes::new()), settings.write_wait).await {
                    tracing::debug!(connection_id = %info.id, %err, "ping failed");
                    break;
                }
            }
        }
    }

    // A stalled peer must not hold the pump open.
    let _ = time::timeout(settings.write_wait, sink.close()).await;
    drop(done);
}

/// Drain client frames to detect disconnects and dead peers.
///
/// Any frame counts as proof of life; the read deadline is pushed out on each
/// one. Application frames are ignored. Always unsubscribes on exit.
async fn read_pump<R, E>(
    mut stream: R,
    hub: &Hub,
    info: &ConnectionInfo,
    settings: &ConnectionSettings,
    mut writer_done: oneshot::Receiver<()>,
    reauth: Option<Reauthorizer>,
) where
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: std::fmt::Debug,
{
    let deadline = time::sleep(settings.pong_wait);
    tokio::pin!(deadline);

    let mut reauth_timer = settings.reauth_interval.map(|period| {
        let mut timer = time::interval_at(Instant::now() + period, period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        timer
    });

    loop {
        tokio::select! {
            msg = stream.next() => {
                match msg {
                    Some(Ok(Message::Close(frame))) => {
                        tracing::debug!(connection_id = %info.id, ?frame, "client closed");
                        break;
                    }
                    Some(Ok(Message::Text(text))) => {
                        tracing::debug!(connection_id = %info.id, len = text.as_str().len(), "ignoring client text frame");
                    }
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        tracing::debug!(connection_id = %info.id, ?err, "ws read error");
                        break;
                    }
                    None => break,
                }
                deadline.as_mut().reset(Instant::now() + settings.pong_wait);
            }
            _ = &mut deadline => {
                tracing::debug!(connection_id = %info.id, "read timeout; closing dead connection");
                break;
            }
            _ = &mut writer_done => break,
            _ = next_tick(&mut reauth_timer) => {
                if let Some(reauth) = &reauth {
                    if !still_allowed(reauth, info).await {
                        break;
                    }
                }
            }
        }
    }

    hub.unsubscribe(info);
}

async fn write<S>(sink: &mut S, msg: Message, write_wait: Duration) -> Result<(), String>
where
    S: Sink<Message> + Unpin,
    S::Error: std::fmt::Debug,
{
    match time::timeout(write_wait, sink.send(msg)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(format!("{err:?}")),
        Err(_) => Err("write timed out".to_string()),
    }
}

async fn next_tick(timer: &mut Option<Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// Service errors keep the connection; only an explicit denial ends it.
async fn still_allowed(reauth: &Reauthorizer, info: &ConnectionInfo) -> bool {
    match reauth.access.can_observe(&reauth.principal, &info.topic).await {
        Ok(true) => true,
        Ok(false) => {
            tracing::info!(
                connection_id = %info.id,
                user_id = %info.user_id,
                topic = %info.topic,
                "access revoked; closing connection"
            );
            false
        }
        Err(err) => {
            tracing::warn!(connection_id = %info.id, %err, "re-authorization check failed");
            true
        }
    }
}
