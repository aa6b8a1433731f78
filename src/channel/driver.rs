use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use futures::future::OptionFuture;
use futures::{SinkExt as _, StreamExt as _};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior, Sleep, interval, sleep, timeout};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use super::engine::Engine;
use super::types::SubscriptionKey;
use crate::error::{Error, Kind};
use crate::ws::config::Config;
use crate::ws::{Action, WsError};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type ConnectFuture = Pin<Box<dyn Future<Output = Result<WsStream, WsError>> + Send>>;

/// Facade request handed to the driver task.
#[derive(Debug)]
pub(crate) enum Command {
    Subscribe(SubscriptionKey),
    Unsubscribe(SubscriptionKey),
    Send(String),
    Reset,
    Shutdown,
}

/// Task that owns the [`Engine`] and the transport and executes the engine's actions.
///
/// Every engine input happens on this task, one at a time.
pub(crate) struct Driver {
    endpoint: String,
    engine: Engine,
    commands: mpsc::UnboundedReceiver<Command>,
    stream: Option<WsStream>,
    connecting: Option<ConnectFuture>,
    retry: Option<Pin<Box<Sleep>>>,
    heartbeat_interval: Duration,
    heartbeat_timeout: Duration,
    last_seen: Instant,
}

impl Driver {
    pub(crate) fn new(
        endpoint: String,
        config: &Config,
        engine: Engine,
        commands: mpsc::UnboundedReceiver<Command>,
    ) -> Self {
        Self {
            endpoint,
            engine,
            commands,
            stream: None,
            connecting: None,
            retry: None,
            heartbeat_interval: config.heartbeat_interval,
            heartbeat_timeout: config.heartbeat_timeout,
            last_seen: Instant::now(),
        }
    }

    /// Run until shut down or until every facade handle is gone.
    pub(crate) async fn run(mut self) {
        let mut heartbeat = interval(self.heartbeat_interval);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        self.engine.connect();
        self.execute().await;

        loop {
            tokio::select! {
                command = self.commands.recv() => {
                    match command {
                        Some(Command::Subscribe(key)) => self.engine.subscribe(key),
                        Some(Command::Unsubscribe(key)) => self.engine.unsubscribe(&key),
                        Some(Command::Send(frame)) => self.engine.send(frame),
                        Some(Command::Reset) => self.engine.reset(),
                        Some(Command::Shutdown) | None => {
                            tracing::debug!(endpoint = %self.endpoint, "Shutting down channel");
                            self.engine.teardown();
                            self.execute().await;
                            break;
                        }
                    }
                }

                Some(result) = OptionFuture::from(self.connecting.as_mut()) => {
                    self.connecting = None;
                    match result {
                        Ok(stream) => {
                            tracing::debug!(endpoint = %self.endpoint, "Connected");
                            self.stream = Some(stream);
                            self.last_seen = Instant::now();
                            heartbeat.reset();
                            self.engine.on_open();
                        }
                        Err(e) => {
                            let error = Error::with_source(Kind::WebSocket, e);
                            tracing::warn!(endpoint = %self.endpoint, %error, "Unable to connect");
                            self.engine.on_close();
                        }
                    }
                }

                Some(message) = OptionFuture::from(self.stream.as_mut().map(|s| s.next())) => {
                    self.last_seen = Instant::now();
                    match message {
                        Some(Ok(Message::Text(text))) => {
                            tracing::trace!(%text, "Received WebSocket text message");
                            self.engine.on_frame(text.as_bytes());
                        }
                        Some(Ok(Message::Close(frame))) => {
                            tracing::debug!(?frame, "Server closed the connection");
                            self.drop_transport(WsError::ConnectionClosed);
                        }
                        Some(Err(e)) => self.drop_transport(WsError::Connection(e)),
                        None => self.drop_transport(WsError::ConnectionClosed),
                        Some(Ok(_)) => {
                            // Binary frames and control replies only count as liveness.
                        }
                    }
                }

                Some(()) = OptionFuture::from(self.retry.as_mut()) => {
                    self.retry = None;
                    self.engine.on_retry_elapsed();
                }

                _ = heartbeat.tick(), if self.stream.is_some() => {
                    if self.last_seen.elapsed() > self.heartbeat_timeout {
                        self.drop_transport(WsError::HeartbeatTimeout(self.heartbeat_timeout));
                    } else if let Some(stream) = self.stream.as_mut() {
                        let sent = stream.send(Message::Ping(Vec::<u8>::new().into())).await;
                        if let Err(e) = sent {
                            self.drop_transport(WsError::Connection(e));
                        }
                    }
                }
            }

            self.execute().await;
        }
    }

    /// Perform every action the engine has queued, in order.
    async fn execute(&mut self) {
        while let Some(action) = self.engine.poll_action() {
            match action {
                Action::Open => {
                    self.stream = None;
                    let endpoint = self.endpoint.clone();
                    let limit = self.heartbeat_timeout;
                    self.connecting = Some(Box::pin(async move {
                        match timeout(limit, connect_async(endpoint)).await {
                            Ok(Ok((stream, _))) => Ok(stream),
                            Ok(Err(e)) => Err(WsError::Connection(e)),
                            Err(_elapsed) => Err(WsError::HandshakeTimeout(limit)),
                        }
                    }));
                }
                Action::Send(text) => {
                    let Some(stream) = self.stream.as_mut() else {
                        tracing::debug!(%text, "No transport, dropping frame");
                        continue;
                    };
                    tracing::trace!(%text, "Sending WebSocket text message");
                    let sent = stream.send(Message::Text(text.into())).await;
                    if let Err(e) = sent {
                        self.drop_transport(WsError::Connection(e));
                    }
                }
                Action::Close => {
                    self.connecting = None;
                    if let Some(mut stream) = self.stream.take() {
                        _ = stream.close(None).await;
                    }
                }
                Action::ScheduleRetry(delay) => {
                    self.retry = Some(Box::pin(sleep(delay)));
                }
                Action::CancelRetry => {
                    self.retry = None;
                }
            }
        }
    }

    /// Forget the current transport and let the engine decide what comes next.
    fn drop_transport(&mut self, reason: WsError) {
        if self.stream.take().is_none() {
            return;
        }
        let error = Error::from(reason);
        tracing::warn!(endpoint = %self.endpoint, %error, "Connection lost");
        self.engine.on_close();
    }
}
