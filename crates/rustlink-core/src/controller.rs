// ── Session lifecycle controller ──
//
// Owns the connection state machine for one game server: open, prime,
// serve requests, refresh, tear down, reconnect with linear backoff.
// Each open link gets its own session task with its own correlator; a
// generation counter keeps superseded sessions from touching shared state.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rustlink_api::proto::AppResponse;
use rustlink_api::{
    Request, Transport, TransportEvent, TransportHandle, WebSocketTransport, decode_message,
};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use url::Url;

use crate::broadcast::BroadcastDispatcher;
use crate::config::{ControllerConfig, Server};
use crate::correlator::{Completion, Correlator, Reply, Resolution};
use crate::error::CoreError;
use crate::model::{
    ConnectionState, ConnectionStatus, EntityInfo, GameTime, ServerInfo, TeamInfo, TeamMessage,
};
use crate::sink::EventSink;

const COMMAND_CHANNEL_SIZE: usize = 64;
const MAX_SWEEP_PERIOD: Duration = Duration::from_secs(1);

pub const RECONNECT_EXHAUSTED: &str = "reconnect attempts exhausted";

struct RequestEnvelope {
    request: Request,
    reply: Reply,
}

// ── Controller ───────────────────────────────────────────────────

/// Entry point for talking to one game server.
///
/// Cheaply cloneable via `Arc`. Generic over the transport so tests can
/// drive it with an in-memory link.
pub struct Controller<T: Transport = WebSocketTransport> {
    inner: Arc<Inner<T>>,
}

impl<T: Transport> Clone for Controller<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct Inner<T> {
    config: ControllerConfig,
    transport: T,
    sink: Arc<dyn EventSink>,
    status: watch::Sender<ConnectionStatus>,
    server_info: watch::Sender<Option<Arc<ServerInfo>>>,
    lifecycle: Mutex<Lifecycle>,
}

struct Lifecycle {
    generation: u64,
    cancel: CancellationToken,
    commands: Option<mpsc::Sender<RequestEnvelope>>,
    task: Option<JoinHandle<()>>,
}

impl<T: Transport> Controller<T> {
    /// Create a controller. Does NOT connect.
    pub fn new(config: ControllerConfig, transport: T, sink: Arc<dyn EventSink>) -> Self {
        let (status, _) = watch::channel(ConnectionStatus::default());
        let (server_info, _) = watch::channel(None);

        Self {
            inner: Arc::new(Inner {
                config,
                transport,
                sink,
                status,
                server_info,
                lifecycle: Mutex::new(Lifecycle {
                    generation: 0,
                    cancel: CancellationToken::new(),
                    commands: None,
                    task: None,
                }),
            }),
        }
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.inner.config
    }

    // ── Connection lifecycle ─────────────────────────────────────

    /// Open a session to `server`.
    ///
    /// Rejected unless the controller is idle. A failed initial open leaves
    /// the controller in `error` without scheduling reconnects.
    pub async fn connect(&self, server: Server) -> Result<(), CoreError> {
        let (generation, cancel) = {
            let mut lc = self.inner.lifecycle();
            if !self.inner.status.borrow().is_idle() {
                return Err(CoreError::AlreadyConnected);
            }
            lc.generation += 1;
            lc.cancel.cancel();
            lc.cancel = CancellationToken::new();
            lc.commands = None;
            self.inner
                .status
                .send_replace(ConnectionStatus::new(ConnectionState::Connecting));
            (lc.generation, lc.cancel.clone())
        };

        info!(server = %server.name, endpoint = %server.endpoint, generation, "connecting");

        let url = match server.endpoint.url(self.inner.config.protocol_version) {
            Ok(url) => url,
            Err(e) => {
                let err = CoreError::from(e);
                self.inner.publish_status(
                    generation,
                    ConnectionStatus::with_message(ConnectionState::Error, err.to_string()),
                );
                return Err(err);
            }
        };

        let opened = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(CoreError::ConnectionLost),
            result = self.inner.transport.open(&url) => result,
        };

        let link = match opened {
            Ok(link) => link,
            Err(e) => {
                let err = CoreError::from(e);
                warn!(error = %err, "connect failed");
                self.inner.publish_status(
                    generation,
                    ConnectionStatus::with_message(ConnectionState::Error, err.to_string()),
                );
                return Err(err);
            }
        };

        let mut lc = self.inner.lifecycle();
        if lc.generation != generation {
            return Err(CoreError::ConnectionLost);
        }
        let (tx, rx) = mpsc::channel(COMMAND_CHANNEL_SIZE);
        lc.commands = Some(tx);
        self.inner
            .status
            .send_replace(ConnectionStatus::new(ConnectionState::Connected));
        info!(server = %server.name, "connected");

        let inner = Arc::clone(&self.inner);
        lc.task = Some(tokio::spawn(supervise(
            inner, server, url, generation, cancel, link, rx,
        )));
        Ok(())
    }

    /// Tear down the session and any scheduled reconnect.
    ///
    /// Every pending request fails with `ConnectionLost` before this
    /// returns. No automatic reconnect follows.
    pub async fn disconnect(&self) {
        let task = {
            let mut lc = self.inner.lifecycle();
            lc.generation += 1;
            lc.cancel.cancel();
            lc.cancel = CancellationToken::new();
            lc.commands = None;
            self.inner.status.send_replace(ConnectionStatus::with_message(
                ConnectionState::Disconnected,
                "disconnected by user",
            ));
            lc.task.take()
        };

        if let Some(task) = task {
            let _ = task.await;
        }
        info!("disconnected");
    }

    // ── State observation ────────────────────────────────────────

    pub fn status(&self) -> watch::Receiver<ConnectionStatus> {
        self.inner.status.subscribe()
    }

    pub fn status_stream(&self) -> WatchStream<ConnectionStatus> {
        WatchStream::new(self.inner.status.subscribe())
    }

    pub fn current_status(&self) -> ConnectionStatus {
        self.inner.status.borrow().clone()
    }

    /// Latest server info seen by priming, refresh or `get_server_info`.
    pub fn server_info(&self) -> watch::Receiver<Option<Arc<ServerInfo>>> {
        self.inner.server_info.subscribe()
    }

    // ── Requests ─────────────────────────────────────────────────

    /// Issue a raw request and await its response.
    ///
    /// Error responses surface as `RemoteOperation`.
    pub async fn request(&self, request: Request) -> Result<AppResponse, CoreError> {
        let commands = self
            .inner
            .lifecycle()
            .commands
            .clone()
            .ok_or(CoreError::NotConnected)?;

        debug!(kind = request.kind(), "request");
        let (reply, rx) = oneshot::channel();
        commands
            .send(RequestEnvelope { request, reply })
            .await
            .map_err(|_| CoreError::ConnectionLost)?;

        let response = rx.await.map_err(|_| CoreError::ConnectionLost)??;
        match response.error {
            Some(err) => Err(CoreError::remote(err.error)),
            None => Ok(response),
        }
    }

    pub async fn get_server_info(&self) -> Result<ServerInfo, CoreError> {
        let response = self.request(Request::GetInfo).await?;
        let info = ServerInfo::from(expect(response.info, "info")?);
        self.inner
            .server_info
            .send_replace(Some(Arc::new(info.clone())));
        Ok(info)
    }

    pub async fn get_time(&self) -> Result<GameTime, CoreError> {
        let response = self.request(Request::GetTime).await?;
        Ok(expect(response.time, "time")?.into())
    }

    pub async fn get_team_info(&self) -> Result<TeamInfo, CoreError> {
        let response = self.request(Request::GetTeamInfo).await?;
        Ok(TeamInfo::from(&expect(response.team_info, "team info")?))
    }

    pub async fn get_team_chat(&self) -> Result<Vec<TeamMessage>, CoreError> {
        let response = self.request(Request::GetTeamChat).await?;
        let chat = expect(response.team_chat, "team chat")?;
        Ok(chat.messages.into_iter().map(TeamMessage::from).collect())
    }

    pub async fn send_team_message(&self, message: impl Into<String>) -> Result<(), CoreError> {
        self.request(Request::SendTeamMessage {
            message: message.into(),
        })
        .await
        .map(drop)
    }

    pub async fn get_entity_info(&self, entity_id: u32) -> Result<EntityInfo, CoreError> {
        let response = self.request(Request::GetEntityInfo { entity_id }).await?;
        Ok(expect(response.entity_info, "entity info")?.into())
    }

    pub async fn set_entity_value(&self, entity_id: u32, value: bool) -> Result<(), CoreError> {
        self.request(Request::SetEntityValue { entity_id, value })
            .await
            .map(drop)
    }

    pub async fn set_subscription(&self, entity_id: u32, value: bool) -> Result<(), CoreError> {
        self.request(Request::SetSubscription { entity_id, value })
            .await
            .map(drop)
    }

    pub async fn check_subscription(&self, entity_id: u32) -> Result<bool, CoreError> {
        let response = self.request(Request::CheckSubscription { entity_id }).await?;
        Ok(expect(response.flag, "subscription flag")?.value)
    }
}

fn expect<V>(field: Option<V>, expected: &'static str) -> Result<V, CoreError> {
    field.ok_or(CoreError::UnexpectedResponse { expected })
}

// ── Shared state helpers ─────────────────────────────────────────

impl<T> Inner<T> {
    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_current(&self, generation: u64) -> bool {
        self.lifecycle().generation == generation
    }

    /// Publish `status` unless the session has been superseded.
    fn publish_status(&self, generation: u64, status: ConnectionStatus) -> bool {
        let lc = self.lifecycle();
        if lc.generation != generation {
            return false;
        }
        info!(state = %status.state, message = ?status.message, "connection status");
        self.status.send_replace(status);
        true
    }

    /// Make a freshly opened link the live session.
    fn install(&self, generation: u64, commands: mpsc::Sender<RequestEnvelope>) -> bool {
        let mut lc = self.lifecycle();
        if lc.generation != generation {
            return false;
        }
        lc.commands = Some(commands);
        self.status
            .send_replace(ConnectionStatus::new(ConnectionState::Connected));
        true
    }

    fn uninstall(&self, generation: u64) {
        let mut lc = self.lifecycle();
        if lc.generation == generation {
            lc.commands = None;
        }
    }
}

// ── Supervisor ───────────────────────────────────────────────────

enum SessionEnd {
    Cancelled,
    Closed(String),
    Failed(String),
}

/// Run sessions back to back until cancelled or out of reconnect attempts.
async fn supervise<T: Transport>(
    inner: Arc<Inner<T>>,
    server: Server,
    url: Url,
    generation: u64,
    cancel: CancellationToken,
    mut link: TransportHandle,
    mut commands: mpsc::Receiver<RequestEnvelope>,
) {
    let reconnect = inner.config.reconnect.clone();

    loop {
        let end = run_session(&inner, &server, generation, &cancel, link, commands).await;

        let mut last = match end {
            SessionEnd::Cancelled => return,
            SessionEnd::Closed(reason) => {
                ConnectionStatus::with_message(ConnectionState::Disconnected, reason)
            }
            SessionEnd::Failed(reason) => {
                warn!(%reason, "connection failed");
                ConnectionStatus::with_message(ConnectionState::Error, reason)
            }
        };
        if !inner.publish_status(generation, last.clone()) {
            return;
        }

        let mut attempt: u32 = 0;
        let (next_link, next_commands) = loop {
            if attempt >= reconnect.max_attempts {
                warn!(attempts = attempt, "giving up on reconnect");
                last.message = Some(RECONNECT_EXHAUSTED.into());
                inner.publish_status(generation, last);
                return;
            }
            attempt += 1;

            let delay = reconnect.delay_for(attempt);
            info!(
                attempt,
                max_attempts = reconnect.max_attempts,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "scheduling reconnect"
            );
            tokio::select! {
                biased;
                () = cancel.cancelled() => return,
                () = tokio::time::sleep(delay) => {}
            }

            if !inner.publish_status(
                generation,
                ConnectionStatus::new(ConnectionState::Connecting),
            ) {
                return;
            }

            let opened = tokio::select! {
                biased;
                () = cancel.cancelled() => return,
                result = inner.transport.open(&url) => result,
            };

            match opened {
                Ok(new_link) => {
                    let (tx, rx) = mpsc::channel(COMMAND_CHANNEL_SIZE);
                    if !inner.install(generation, tx) {
                        return;
                    }
                    info!(attempt, "reconnected");
                    break (new_link, rx);
                }
                Err(e) => {
                    warn!(attempt, error = %e, "reconnect failed");
                    last = ConnectionStatus::with_message(ConnectionState::Error, e.to_string());
                    if !inner.publish_status(generation, last.clone()) {
                        return;
                    }
                }
            }
        };

        link = next_link;
        commands = next_commands;
    }
}

// ── Session ──────────────────────────────────────────────────────

async fn run_session<T: Transport>(
    inner: &Inner<T>,
    server: &Server,
    generation: u64,
    cancel: &CancellationToken,
    mut link: TransportHandle,
    mut commands: mpsc::Receiver<RequestEnvelope>,
) -> SessionEnd {
    let config = &inner.config;
    let mut correlator = Correlator::new(server.credentials.clone());
    let mut dispatcher = BroadcastDispatcher::new();

    if config.prime_on_connect {
        if let Err(e) = correlator.issue(&Request::GetInfo, Completion::RefreshInfo, &link) {
            debug!(error = %e, "priming server info failed");
        }
        if let Err(e) = correlator.issue(&Request::GetTeamInfo, Completion::SeedRoster, &link) {
            debug!(error = %e, "priming team roster failed");
        }
    }

    let mut refresh = config.refresh_interval.map(|period| {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval
    });
    let mut sweep = config.request_timeout.map(|timeout| {
        let period = timeout.min(MAX_SWEEP_PERIOD);
        tokio::time::interval_at(Instant::now() + period, period)
    });

    let end = loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break SessionEnd::Cancelled,
            event = link.next_event() => match event {
                Some(TransportEvent::Frame(frame)) => {
                    handle_frame(inner, generation, &mut correlator, &mut dispatcher, &frame);
                }
                Some(TransportEvent::Closed { code, reason }) => {
                    info!(?code, %reason, "connection closed");
                    let reason = if reason.is_empty() { "connection closed".into() } else { reason };
                    break SessionEnd::Closed(reason);
                }
                Some(TransportEvent::Failed(reason)) => break SessionEnd::Failed(reason),
                None => break SessionEnd::Closed("connection closed".into()),
            },
            Some(envelope) = commands.recv() => {
                let RequestEnvelope { request, reply } = envelope;
                if let Err(e) = correlator.issue(&request, Completion::Caller(reply), &link) {
                    debug!(kind = request.kind(), error = %e, "request not sent");
                }
            }
            () = tick(&mut refresh) => {
                trace!("periodic refresh");
                if let Err(e) = correlator.issue(&Request::GetInfo, Completion::RefreshInfo, &link) {
                    debug!(error = %e, "refresh not sent");
                }
            }
            () = tick(&mut sweep) => {
                if let Some(timeout) = config.request_timeout {
                    correlator.expire(Instant::now(), timeout);
                }
            }
        }
    };

    // Teardown: nothing issued against this link may stay pending.
    inner.uninstall(generation);
    commands.close();
    while let Ok(envelope) = commands.try_recv() {
        let _ = envelope.reply.send(Err(CoreError::ConnectionLost));
    }
    correlator.fail_all(&CoreError::ConnectionLost);
    link.close();

    end
}

fn handle_frame<T>(
    inner: &Inner<T>,
    generation: u64,
    correlator: &mut Correlator,
    dispatcher: &mut BroadcastDispatcher,
    frame: &[u8],
) {
    let message = match decode_message(frame) {
        Ok(message) => message,
        Err(e) => {
            warn!(error = %e, len = frame.len(), "dropping undecodable frame");
            return;
        }
    };

    if let Some(response) = message.response {
        match correlator.resolve(response) {
            Resolution::Delivered | Resolution::Internal(Completion::Caller(_), _) => {}
            Resolution::Internal(Completion::RefreshInfo, response) => match response.info {
                Some(info) if inner.is_current(generation) => {
                    inner
                        .server_info
                        .send_replace(Some(Arc::new(ServerInfo::from(info))));
                }
                Some(_) => {}
                None => debug!(error = ?response.error, "server info refresh failed"),
            },
            Resolution::Internal(Completion::SeedRoster, response) => match response.team_info {
                Some(team) => dispatcher.seed(&team),
                None => debug!(error = ?response.error, "team roster unavailable"),
            },
            Resolution::Unmatched(response) => {
                debug!(seq = response.seq, "response with no pending request");
            }
        }
    }

    if let Some(broadcast) = message.broadcast {
        let events = dispatcher.classify(&broadcast);
        if !events.is_empty() && inner.is_current(generation) {
            for event in events {
                inner.sink.publish(event);
            }
        }
    }
}

async fn tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::DomainEvent;
    use crate::sink::EventBus;
    use crate::test_support::{MockServer, MockTransport, mock_transport, reply};
    use rustlink_api::proto::{
        AppBroadcast, AppError, AppFlag, AppInfo, AppTeamChanged, AppTeamInfo, AppTeamMember,
        AppTime,
    };
    use rustlink_api::{Endpoint, PlayerCredentials};

    fn quiet_config() -> ControllerConfig {
        ControllerConfig {
            refresh_interval: None,
            request_timeout: None,
            prime_on_connect: false,
            ..ControllerConfig::default()
        }
    }

    fn server() -> Server {
        Server::new(
            "Test Server",
            Endpoint::new("127.0.0.1", 28082),
            PlayerCredentials::new("76561198000000000", "12345"),
        )
    }

    fn setup(config: ControllerConfig) -> (Controller<MockTransport>, MockServer, EventBus) {
        let (transport, mock) = mock_transport();
        let bus = EventBus::new();
        let controller = Controller::new(config, transport, Arc::new(bus.clone()));
        (controller, mock, bus)
    }

    fn info(name: &str) -> AppInfo {
        AppInfo {
            name: name.into(),
            max_players: 100,
            ..AppInfo::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn requests_before_connect_are_rejected() {
        let (ctrl, _mock, _bus) = setup(quiet_config());
        assert!(matches!(
            ctrl.get_time().await,
            Err(CoreError::NotConnected)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn connect_twice_is_rejected() {
        let (ctrl, mut mock, _bus) = setup(quiet_config());
        ctrl.connect(server()).await.unwrap();
        let _peer = mock.accept().await;

        assert_eq!(ctrl.current_status().state, ConnectionState::Connected);
        assert!(matches!(
            ctrl.connect(server()).await,
            Err(CoreError::AlreadyConnected)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn responses_are_matched_by_sequence_not_arrival() {
        let (ctrl, mut mock, _bus) = setup(quiet_config());
        ctrl.connect(server()).await.unwrap();
        let mut peer = mock.accept().await;

        let c = ctrl.clone();
        let time_task = tokio::spawn(async move { c.get_time().await });
        let time_req = peer.next_request().await;
        let c = ctrl.clone();
        let sub_task = tokio::spawn(async move { c.check_subscription(7).await });
        let sub_req = peer.next_request().await;

        assert!(time_req.get_time.is_some());
        assert_eq!(sub_req.entity_id, Some(7));
        assert_ne!(time_req.seq, sub_req.seq);

        peer.respond(AppResponse {
            flag: Some(AppFlag { value: true }),
            ..reply(sub_req.seq)
        });
        peer.respond(AppResponse {
            time: Some(AppTime {
                time: 12.5,
                sunrise: 7.0,
                sunset: 20.0,
                ..AppTime::default()
            }),
            ..reply(time_req.seq)
        });

        assert!(sub_task.await.unwrap().unwrap());
        assert!((time_task.await.unwrap().unwrap().time - 12.5).abs() < f32::EPSILON);
    }

    #[tokio::test(start_paused = true)]
    async fn remote_error_is_surfaced_with_code() {
        let (ctrl, mut mock, _bus) = setup(quiet_config());
        ctrl.connect(server()).await.unwrap();
        let mut peer = mock.accept().await;

        let c = ctrl.clone();
        let task = tokio::spawn(async move { c.get_entity_info(99).await });
        let req = peer.next_request().await;
        peer.respond(AppResponse {
            error: Some(AppError {
                error: "not_found".into(),
            }),
            ..reply(req.seq)
        });

        let err = task.await.unwrap().unwrap_err();
        assert!(matches!(
            err,
            CoreError::RemoteOperation { ref code, ref message }
                if code == "not_found" && message == "entity not found"
        ));
        // The session survives a remote error.
        assert_eq!(ctrl.current_status().state, ConnectionState::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn transport_failure_fails_every_pending_request() {
        let config = ControllerConfig {
            reconnect: crate::config::ReconnectConfig {
                max_attempts: 0,
                ..Default::default()
            },
            ..quiet_config()
        };
        let (ctrl, mut mock, _bus) = setup(config);
        ctrl.connect(server()).await.unwrap();
        let mut peer = mock.accept().await;

        let mut tasks = Vec::new();
        for id in 0..3 {
            let c = ctrl.clone();
            tasks.push(tokio::spawn(async move { c.get_entity_info(id).await }));
            peer.next_request().await;
        }

        peer.fail("connection reset");

        for task in tasks {
            assert!(matches!(
                task.await.unwrap(),
                Err(CoreError::ConnectionLost)
            ));
        }
        let mut status = ctrl.status();
        let settled = status
            .wait_for(|s| s.message.as_deref() == Some(RECONNECT_EXHAUSTED))
            .await
            .unwrap()
            .clone();
        assert_eq!(settled.state, ConnectionState::Error);
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_backoff_is_linear_until_exhausted() {
        let (ctrl, mut mock, _bus) = setup(quiet_config());
        ctrl.connect(server()).await.unwrap();
        let peer = mock.accept().await;

        mock.refuse_next(5);
        peer.fail("connection reset");

        let mut status = ctrl.status();
        status
            .wait_for(|s| s.message.as_deref() == Some(RECONNECT_EXHAUSTED))
            .await
            .unwrap();

        let opens = mock.open_times();
        assert_eq!(opens.len(), 6);
        let gaps: Vec<u64> = opens.windows(2).map(|w| (w[1] - w[0]).as_secs()).collect();
        assert_eq!(gaps, vec![5, 10, 15, 20, 25]);

        // Settled: no further attempts.
        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(mock.open_count(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn successful_reconnect_resets_attempts_and_serves_requests() {
        let (ctrl, mut mock, _bus) = setup(quiet_config());
        ctrl.connect(server()).await.unwrap();
        let first = mock.accept().await;

        mock.refuse_next(2);
        first.close();

        let mut second = mock.accept().await;
        let opens = mock.open_times();
        assert_eq!(opens.len(), 4);
        assert_eq!((opens[3] - opens[0]).as_secs(), 5 + 10 + 15);

        let mut status = ctrl.status();
        status
            .wait_for(|s| s.state == ConnectionState::Connected)
            .await
            .unwrap();

        let c = ctrl.clone();
        let task = tokio::spawn(async move { c.send_team_message("back").await });
        let req = second.next_request().await;
        assert_eq!(req.send_team_message.unwrap().message, "back");
        second.respond(reply(req.seq));
        task.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn no_reconnect_after_manual_disconnect() {
        let (ctrl, mut mock, _bus) = setup(quiet_config());
        ctrl.connect(server()).await.unwrap();
        let peer = mock.accept().await;

        peer.fail("connection reset");
        let mut status = ctrl.status();
        status
            .wait_for(|s| s.state == ConnectionState::Error)
            .await
            .unwrap();

        ctrl.disconnect().await;
        tokio::time::sleep(Duration::from_secs(600)).await;

        assert_eq!(mock.open_count(), 1);
        let status = ctrl.current_status();
        assert_eq!(status.state, ConnectionState::Disconnected);
        assert_eq!(status.message.as_deref(), Some("disconnected by user"));
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_fails_pending_and_closes_link() {
        let (ctrl, mut mock, _bus) = setup(quiet_config());
        ctrl.connect(server()).await.unwrap();
        let mut peer = mock.accept().await;

        let c = ctrl.clone();
        let task = tokio::spawn(async move { c.get_team_chat().await });
        let req = peer.next_request().await;

        ctrl.disconnect().await;
        assert!(matches!(
            task.await.unwrap(),
            Err(CoreError::ConnectionLost)
        ));
        assert!(peer.is_closed());

        // A late response for the old sequence number goes nowhere.
        peer.respond(reply(req.seq));
        assert!(matches!(
            ctrl.get_time().await,
            Err(CoreError::NotConnected)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn initial_connect_failure_does_not_retry() {
        let (ctrl, mock, _bus) = setup(quiet_config());
        mock.refuse_next(1);

        let err = ctrl.connect(server()).await.unwrap_err();
        assert!(matches!(err, CoreError::TransportFailure { .. }));
        assert_eq!(ctrl.current_status().state, ConnectionState::Error);

        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(mock.open_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn pending_requests_time_out() {
        let config = ControllerConfig {
            request_timeout: Some(Duration::from_secs(2)),
            ..quiet_config()
        };
        let (ctrl, mut mock, _bus) = setup(config);
        ctrl.connect(server()).await.unwrap();
        let mut peer = mock.accept().await;

        let c = ctrl.clone();
        let started = Instant::now();
        let task = tokio::spawn(async move { c.get_time().await });
        peer.next_request().await;

        assert!(matches!(
            task.await.unwrap(),
            Err(CoreError::Timeout { timeout_secs: 2 })
        ));
        assert!(started.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn periodic_refresh_updates_server_info() {
        let config = ControllerConfig {
            refresh_interval: Some(Duration::from_secs(30)),
            ..quiet_config()
        };
        let (ctrl, mut mock, _bus) = setup(config);
        ctrl.connect(server()).await.unwrap();
        let mut peer = mock.accept().await;

        let started = Instant::now();
        let req = peer.next_request().await;
        assert!(req.get_info.is_some());
        assert_eq!(started.elapsed(), Duration::from_secs(30));

        let mut info_rx = ctrl.server_info();
        peer.respond(AppResponse {
            info: Some(info("Rustopia")),
            ..reply(req.seq)
        });
        info_rx.changed().await.unwrap();
        assert_eq!(info_rx.borrow().as_ref().unwrap().name, "Rustopia");

        // Failed refreshes are ignored.
        let req = peer.next_request().await;
        peer.respond(AppResponse {
            error: Some(AppError {
                error: "server_error".into(),
            }),
            ..reply(req.seq)
        });
        let req = peer.next_request().await;
        assert!(req.get_info.is_some());
        assert_eq!(ctrl.current_status().state, ConnectionState::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn priming_seeds_roster_for_broadcast_diffing() {
        let config = ControllerConfig {
            prime_on_connect: true,
            ..quiet_config()
        };
        let (ctrl, mut mock, bus) = setup(config);
        let mut events = bus.subscribe();
        ctrl.connect(server()).await.unwrap();
        let mut peer = mock.accept().await;

        let info_req = peer.next_request().await;
        let team_req = peer.next_request().await;
        assert!(info_req.get_info.is_some());
        assert!(team_req.get_team_info.is_some());

        let member = |online| AppTeamMember {
            steam_id: 42,
            name: "Ann".into(),
            is_online: online,
            is_alive: true,
            ..AppTeamMember::default()
        };
        peer.respond(AppResponse {
            info: Some(info("Primed")),
            ..reply(info_req.seq)
        });
        peer.respond(AppResponse {
            team_info: Some(AppTeamInfo {
                leader_steam_id: 42,
                members: vec![member(false)],
            }),
            ..reply(team_req.seq)
        });
        peer.broadcast(AppBroadcast {
            team_changed: Some(AppTeamChanged {
                player_id: 42,
                team_info: Some(AppTeamInfo {
                    leader_steam_id: 42,
                    members: vec![member(true)],
                }),
            }),
            ..AppBroadcast::default()
        });

        let event = events.recv().await.unwrap();
        assert_eq!(*event, DomainEvent::PlayerLoginStateChanged {
            steam_id: "42".into(),
            name: "Ann".into(),
            online: true,
        });
        assert_eq!(
            ctrl.server_info().borrow().as_ref().unwrap().name,
            "Primed"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn garbage_frames_do_not_end_the_session() {
        let (ctrl, mut mock, _bus) = setup(quiet_config());
        ctrl.connect(server()).await.unwrap();
        let mut peer = mock.accept().await;

        peer.send_raw(&[0xff, 0xff, 0xff]);

        let c = ctrl.clone();
        let task = tokio::spawn(async move { c.set_entity_value(3, true).await });
        let req = peer.next_request().await;
        assert!(req.set_entity_value.unwrap().value);
        peer.respond(reply(req.seq));
        task.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn clean_close_reports_disconnected_with_reason() {
        let config = ControllerConfig {
            reconnect: crate::config::ReconnectConfig {
                max_attempts: 0,
                ..Default::default()
            },
            ..quiet_config()
        };
        let (ctrl, mut mock, _bus) = setup(config);
        ctrl.connect(server()).await.unwrap();
        let peer = mock.accept().await;

        let mut status = ctrl.status();
        peer.close();
        let settled = status
            .wait_for(|s| s.state == ConnectionState::Disconnected)
            .await
            .unwrap()
            .clone();
        assert!(settled.message.is_some());
        // Idle again, so a manual connect is accepted.
        ctrl.connect(server()).await.unwrap();
        assert_eq!(mock.open_count(), 2);
    }
}
