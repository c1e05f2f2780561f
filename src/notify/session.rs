// ============================================================================
// Connection Session
// Reader and writer loops for one registered driver connection
// ============================================================================

use crate::domain::{ConnectionId, DriverId, HubConfig};
use crate::error::TransportError;
use crate::notify::connection::DriverConnection;
use crate::notify::{Frame, HubHandle};
use futures::{Sink, SinkExt, Stream, StreamExt};
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, trace};

/// Running session; resolves to the reason the connection ended
pub struct SessionHandle {
    driver_id: DriverId,
    connection_id: ConnectionId,
    task: JoinHandle<TransportError>,
}

impl SessionHandle {
    pub fn driver_id(&self) -> DriverId {
        self.driver_id
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for both loops to stop. `None` if the task panicked or was aborted.
    pub async fn join(self) -> Option<TransportError> {
        self.task.await.ok()
    }

    pub fn abort(&self) {
        self.task.abort();
    }
}

pub(crate) fn spawn<S, R, E>(
    hub: HubHandle,
    connection: Arc<DriverConnection>,
    sink: S,
    stream: R,
    config: Arc<HubConfig>,
) -> SessionHandle
where
    S: Sink<Frame> + Unpin + Send + 'static,
    S::Error: Display,
    R: Stream<Item = Result<Frame, E>> + Unpin + Send + 'static,
    E: Display + Send,
{
    let driver_id = connection.driver_id();
    let connection_id = connection.id();

    let task = tokio::spawn(async move {
        let reason = {
            let reader = read_loop(stream, &config);
            let writer = write_loop(&connection, sink, &config);
            tokio::pin!(reader);
            tokio::pin!(writer);

            tokio::select! {
                reason = &mut reader => {
                    // Let the writer say goodbye before the socket goes away
                    connection.close();
                    let _ = (&mut writer).await;
                    reason
                },
                reason = &mut writer => reason,
            }
        };

        connection.close();
        hub.unregister_connection(driver_id, connection_id).await;
        info!(driver_id = %driver_id, connection = %connection_id, reason = %reason, "Driver session ended");
        reason
    });

    SessionHandle {
        driver_id,
        connection_id,
        task,
    }
}

/// Consume inbound frames until the peer goes quiet, misbehaves or leaves.
/// Any inbound frame counts as liveness.
async fn read_loop<R, E>(mut stream: R, config: &HubConfig) -> TransportError
where
    R: Stream<Item = Result<Frame, E>> + Unpin,
    E: Display,
{
    loop {
        let frame = match tokio::time::timeout(config.pong_wait, stream.next()).await {
            Err(_) => return TransportError::LivenessTimeout(config.pong_wait),
            Ok(None) => return TransportError::Closed,
            Ok(Some(Err(e))) => return TransportError::Io(e.to_string()),
            Ok(Some(Ok(frame))) => frame,
        };

        let size = frame.payload_len();
        if size > config.max_inbound_frame_bytes {
            return TransportError::FrameTooLarge {
                size,
                limit: config.max_inbound_frame_bytes,
            };
        }

        match frame {
            Frame::Close => return TransportError::Closed,
            Frame::Pong(_) => trace!("Pong received"),
            Frame::Ping(_) => trace!("Ping received"),
            Frame::Text(_) => debug!("Ignoring inbound text frame"),
        }
    }
}

/// Drain the outbound queue to the wire and emit keepalive pings.
/// Sends a close frame once the queue is closed.
async fn write_loop<S>(connection: &DriverConnection, mut sink: S, config: &HubConfig) -> TransportError
where
    S: Sink<Frame> + Unpin,
    S::Error: Display,
{
    let mut ping = tokio::time::interval_at(
        Instant::now() + config.ping_interval,
        config.ping_interval,
    );
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            message = connection.outbound().next() => {
                let Some(text) = message else {
                    let _ = write_frame(&mut sink, Frame::Close, config.write_wait).await;
                    return TransportError::Closed;
                };

                connection.begin_delivery();
                let written = write_frame(&mut sink, Frame::Text(text), config.write_wait).await;
                connection.end_delivery();
                if let Err(e) = written {
                    return e;
                }
            },
            _ = ping.tick() => {
                if let Err(e) = write_frame(&mut sink, Frame::Ping(Vec::new()), config.write_wait).await {
                    return e;
                }
            },
        }
    }
}

async fn write_frame<S>(sink: &mut S, frame: Frame, write_wait: Duration) -> Result<(), TransportError>
where
    S: Sink<Frame> + Unpin,
    S::Error: Display,
{
    match tokio::time::timeout(write_wait, sink.send(frame)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(TransportError::Io(e.to_string())),
        Err(_) => Err(TransportError::WriteTimeout(write_wait)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interfaces::SendOutcome;
    use crate::notify::NotificationHub;
    use futures::channel::mpsc;

    type ClientRx = mpsc::Receiver<Frame>;
    type ClientTx = mpsc::Sender<Result<Frame, String>>;

    fn config() -> HubConfig {
        HubConfig {
            ping_interval: Duration::from_secs(54),
            pong_wait: Duration::from_secs(60),
            write_wait: Duration::from_secs(10),
            ..HubConfig::default()
        }
    }

    async fn connect(hub: &HubHandle, driver: u64) -> (SessionHandle, ClientRx, ClientTx) {
        let (server_sink, client_rx) = mpsc::channel::<Frame>(16);
        let (client_tx, server_stream) = mpsc::channel::<Result<Frame, String>>(16);
        let session = hub
            .connect(DriverId::new(driver), server_sink, server_stream)
            .await
            .unwrap();
        (session, client_rx, client_tx)
    }

    #[tokio::test]
    async fn test_message_reaches_the_wire() {
        let hub = NotificationHub::spawn(config()).unwrap();
        let (_session, mut client_rx, _client_tx) = connect(&hub, 5).await;

        assert_eq!(hub.send(DriverId::new(5), "assigned".into()).await, SendOutcome::Enqueued);
        assert_eq!(client_rx.next().await, Some(Frame::Text("assigned".into())));
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_client_times_out_and_unregisters() {
        let hub = NotificationHub::spawn(config()).unwrap();
        let (session, mut client_rx, _client_tx) = connect(&hub, 5).await;

        let reason = session.join().await;
        assert_eq!(reason, Some(TransportError::LivenessTimeout(Duration::from_secs(60))));

        // One keepalive at 54s, then the goodbye
        assert_eq!(client_rx.next().await, Some(Frame::Ping(Vec::new())));
        assert_eq!(client_rx.next().await, Some(Frame::Close));

        assert_eq!(hub.stats().live_connections, 0);
        assert_eq!(hub.send(DriverId::new(5), "late".into()).await, SendOutcome::NotConnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pongs_keep_connection_alive() {
        let hub = NotificationHub::spawn(config()).unwrap();
        let (session, mut client_rx, mut client_tx) = connect(&hub, 5).await;

        for _ in 0..3 {
            assert_eq!(client_rx.next().await, Some(Frame::Ping(Vec::new())));
            client_tx.send(Ok(Frame::Pong(Vec::new()))).await.unwrap();
        }
        assert!(!session.is_finished());
        assert_eq!(hub.stats().live_connections, 1);

        client_tx.send(Ok(Frame::Close)).await.unwrap();
        assert_eq!(session.join().await, Some(TransportError::Closed));
        assert_eq!(hub.stats().live_connections, 0);
    }

    #[tokio::test]
    async fn test_oversized_frame_tears_down() {
        let hub = NotificationHub::spawn(config()).unwrap();
        let (session, _client_rx, mut client_tx) = connect(&hub, 5).await;

        client_tx
            .send(Ok(Frame::Text("x".repeat(513))))
            .await
            .unwrap();
        assert_eq!(
            session.join().await,
            Some(TransportError::FrameTooLarge { size: 513, limit: 512 })
        );
        assert_eq!(hub.stats().live_connections, 0);
    }

    #[tokio::test]
    async fn test_write_failure_unregisters() {
        let hub = NotificationHub::spawn(config()).unwrap();
        let (session, client_rx, _client_tx) = connect(&hub, 5).await;
        drop(client_rx);

        hub.send(DriverId::new(5), "nobody listening".into()).await;
        assert!(matches!(session.join().await, Some(TransportError::Io(_))));
        assert_eq!(hub.stats().live_connections, 0);
    }

    #[tokio::test]
    async fn test_hub_unregister_sends_close_frame() {
        let hub = NotificationHub::spawn(config()).unwrap();
        let (session, mut client_rx, _client_tx) = connect(&hub, 5).await;

        hub.unregister(DriverId::new(5)).await;
        assert_eq!(client_rx.next().await, Some(Frame::Close));
        assert_eq!(session.join().await, Some(TransportError::Closed));
    }

    #[tokio::test]
    async fn test_reconnect_survives_old_session_teardown() {
        let hub = NotificationHub::spawn(config()).unwrap();
        let (old, _old_rx, old_tx) = connect(&hub, 5).await;
        let (_new, mut new_rx, _new_tx) = connect(&hub, 5).await;

        drop(old_tx);
        assert_eq!(old.join().await, Some(TransportError::Closed));

        assert_eq!(hub.stats().live_connections, 1);
        assert_eq!(hub.send(DriverId::new(5), "still here".into()).await, SendOutcome::Enqueued);
        assert_eq!(new_rx.next().await, Some(Frame::Text("still here".into())));
    }
}
