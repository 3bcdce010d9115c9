use std::pin::Pin;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{Sleep, sleep};
use uuid::Uuid;

use crate::constants::SEARCH_TIMEOUT;
use crate::messages::MessageLog;
use crate::models::{ActiveConnection, ConnectionRequest, Message, PeerProfile, RequestStatus};
use crate::registry::RequestRegistry;
use crate::store::{ChangeEvent, ChangeOp, ConnectStore};

/// Local view of the matching lifecycle: Idle -> Searching -> Connected and
/// back. The store is the source of truth; this state only moves after a
/// re-query confirms what a notification claimed.
#[derive(Debug, Clone)]
pub enum SessionState {
    Idle,
    Searching(ConnectionRequest),
    Connected(Box<LiveSession>),
}

/// Everything the caller needs while a pairing is live.
#[derive(Debug, Clone)]
pub struct LiveSession {
    pub connection: ActiveConnection,
    pub peer: PeerProfile,
    pub messages: Vec<Message>,
}

/// User-initiated actions fed into the controller loop.
#[derive(Debug, Clone)]
pub enum SessionCommand {
    Submit {
        nickname: String,
        location: String,
        interests: Vec<String>,
    },
    CancelSearch,
    SendMessage(String),
    LoadOlderMessages,
    EndConnection,
}

/// Everything the controller reports back to its caller.
#[derive(Debug, Clone)]
pub enum SessionNotice {
    SearchStarted(ConnectionRequest),
    SearchCancelled,
    /// No match arrived within the timeout window; the request was removed.
    SearchTimedOut,
    Matched {
        peer: PeerProfile,
        messages: Vec<Message>,
    },
    MessageSent(Message),
    MessageReceived(Message),
    OlderMessages(Vec<Message>),
    ConnectionEnded {
        by_peer: bool,
    },
    /// A store operation failed. The previous stable state is kept; for a
    /// failed send, `unsent` carries the text back so the caller can retry.
    Failed {
        context: &'static str,
        error: String,
        unsent: Option<String>,
        retryable: bool,
    },
}

/// Drives one user's matching session against an injected store.
///
/// `run` owns the event loop: user commands, the store change feed, and the
/// one-shot search timer all land here, so every transition happens in one
/// place. The timer is armed only while Searching and disarming is the single
/// cancel path; once fired or disarmed it cannot fire again.
pub struct SessionController<S> {
    user_id: Uuid,
    store: S,
    registry: RequestRegistry<S>,
    log: MessageLog<S>,
    state: SessionState,
    timer: Option<Pin<Box<Sleep>>>,
}

impl<S: ConnectStore + Clone> SessionController<S> {
    pub fn new(store: S, user_id: Uuid) -> Self {
        Self {
            user_id,
            registry: RequestRegistry::new(store.clone()),
            log: MessageLog::new(store.clone()),
            store,
            state: SessionState::Idle,
            timer: None,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Run until the command channel closes. Resumes any state already
    /// persisted for this user before processing commands.
    pub async fn run(
        mut self,
        mut commands: mpsc::Receiver<SessionCommand>,
        notices: mpsc::Sender<SessionNotice>,
    ) {
        let mut feed = self.store.subscribe();
        self.sync_from_store(&notices).await;

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command, &notices).await,
                    None => break,
                },
                event = feed.recv() => match event {
                    Ok(event) => self.handle_event(event, &notices).await,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(
                            "change feed lagged by {} events, re-syncing from store",
                            skipped
                        );
                        self.sync_from_store(&notices).await;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                // Pends forever while no timer is armed; the branch future is
                // rebuilt on every loop turn, so arming takes effect
                // immediately.
                () = async {
                    match self.timer.as_mut() {
                        Some(timer) => timer.await,
                        None => std::future::pending::<()>().await,
                    }
                } => {
                    self.handle_search_timeout(&notices).await;
                }
            }
        }
    }

    fn arm_timer(&mut self) {
        self.timer = Some(Box::pin(sleep(SEARCH_TIMEOUT)));
    }

    fn disarm_timer(&mut self) {
        self.timer = None;
    }

    async fn handle_command(
        &mut self,
        command: SessionCommand,
        notices: &mpsc::Sender<SessionNotice>,
    ) {
        match command {
            SessionCommand::Submit {
                nickname,
                location,
                interests,
            } => self.handle_submit(&nickname, &location, interests, notices).await,
            SessionCommand::CancelSearch => self.handle_cancel(notices).await,
            SessionCommand::SendMessage(content) => self.handle_send(content, notices).await,
            SessionCommand::LoadOlderMessages => self.handle_load_older(notices).await,
            SessionCommand::EndConnection => self.handle_end(notices).await,
        }
    }

    async fn handle_submit(
        &mut self,
        nickname: &str,
        location: &str,
        interests: Vec<String>,
        notices: &mpsc::Sender<SessionNotice>,
    ) {
        if !matches!(self.state, SessionState::Idle) {
            tracing::debug!("ignoring submit while not idle");
            return;
        }
        match self
            .registry
            .create_request(self.user_id, nickname, location, interests)
            .await
        {
            Ok(request) => {
                self.arm_timer();
                self.state = SessionState::Searching(request.clone());
                self.notify(notices, SessionNotice::SearchStarted(request)).await;
            }
            Err(e) => {
                self.notify(
                    notices,
                    SessionNotice::Failed {
                        context: "create request",
                        error: e.to_string(),
                        unsent: None,
                        retryable: e.is_retryable(),
                    },
                )
                .await;
            }
        }
    }

    async fn handle_cancel(&mut self, notices: &mpsc::Sender<SessionNotice>) {
        let SessionState::Searching(request) = &self.state else {
            return;
        };
        let request_id = request.id;
        match self.registry.cancel_request(request_id).await {
            Ok(()) => {
                self.disarm_timer();
                self.state = SessionState::Idle;
                self.notify(notices, SessionNotice::SearchCancelled).await;
            }
            Err(e) => {
                // Stay Searching; the timer keeps running.
                self.notify(
                    notices,
                    SessionNotice::Failed {
                        context: "cancel request",
                        error: e.to_string(),
                        unsent: None,
                        retryable: e.is_retryable(),
                    },
                )
                .await;
            }
        }
    }

    async fn handle_search_timeout(&mut self, notices: &mpsc::Sender<SessionNotice>) {
        // One-shot: the timer just fired and is consumed either way.
        self.disarm_timer();
        let SessionState::Searching(request) = &self.state else {
            return;
        };
        let request_id = request.id;

        // A match may have landed with its notification still in flight;
        // check the store before tearing the request down.
        if let Ok(Some(_)) = self.store.find_connection_for_user(self.user_id).await {
            self.sync_from_store(notices).await;
            return;
        }

        match self.registry.cancel_request(request_id).await {
            Ok(()) => {
                self.state = SessionState::Idle;
                self.notify(notices, SessionNotice::SearchTimedOut).await;
            }
            Err(e) => {
                // Leave the request in place for a manual cancel or retry.
                self.notify(
                    notices,
                    SessionNotice::Failed {
                        context: "auto-cancel after timeout",
                        error: e.to_string(),
                        unsent: None,
                        retryable: e.is_retryable(),
                    },
                )
                .await;
            }
        }
    }

    async fn handle_send(&mut self, content: String, notices: &mpsc::Sender<SessionNotice>) {
        let SessionState::Connected(live) = &self.state else {
            return;
        };
        let connection_id = live.connection.id;
        match self.log.append(connection_id, self.user_id, &content).await {
            Ok(message) => {
                self.notify(notices, SessionNotice::MessageSent(message)).await;
            }
            Err(e) => {
                self.notify(
                    notices,
                    SessionNotice::Failed {
                        context: "send message",
                        error: e.to_string(),
                        unsent: Some(content),
                        retryable: e.is_retryable(),
                    },
                )
                .await;
            }
        }
    }

    async fn handle_load_older(&mut self, notices: &mpsc::Sender<SessionNotice>) {
        let SessionState::Connected(live) = &self.state else {
            return;
        };
        let connection_id = live.connection.id;
        let before = live.messages.first().map(|m| m.id);
        match self.log.fetch_page(connection_id, before).await {
            Ok(older) => {
                if let SessionState::Connected(live) = &mut self.state {
                    live.messages.splice(0..0, older.iter().cloned());
                }
                self.notify(notices, SessionNotice::OlderMessages(older)).await;
            }
            Err(e) => {
                self.notify(
                    notices,
                    SessionNotice::Failed {
                        context: "load older messages",
                        error: e.to_string(),
                        unsent: None,
                        retryable: e.is_retryable(),
                    },
                )
                .await;
            }
        }
    }

    async fn handle_end(&mut self, notices: &mpsc::Sender<SessionNotice>) {
        let SessionState::Connected(live) = &self.state else {
            return;
        };
        let connection_id = live.connection.id;
        match self.store.end_connection(connection_id).await {
            // Ok(false): the peer tore it down first; either way it is gone.
            Ok(_) => {
                self.state = SessionState::Idle;
                self.notify(notices, SessionNotice::ConnectionEnded { by_peer: false })
                    .await;
            }
            Err(e) => {
                self.notify(
                    notices,
                    SessionNotice::Failed {
                        context: "end connection",
                        error: e.to_string(),
                        unsent: None,
                        retryable: e.is_retryable(),
                    },
                )
                .await;
            }
        }
    }

    async fn handle_event(&mut self, event: ChangeEvent, notices: &mpsc::Sender<SessionNotice>) {
        match event {
            ChangeEvent::Message { op, message } => {
                if op != ChangeOp::Insert {
                    return;
                }
                let SessionState::Connected(live) = &mut self.state else {
                    return;
                };
                if live.connection.id != message.connection_id {
                    return;
                }
                let own = message.sender_id == self.user_id;
                live.messages.push(message.clone());
                if !own {
                    self.notify(notices, SessionNotice::MessageReceived(message)).await;
                }
            }
            other if other.concerns_user(self.user_id) => {
                self.sync_from_store(notices).await;
            }
            _ => {}
        }
    }

    /// Re-query the store and reconcile local state with what it says.
    /// Notification payloads never drive a transition directly; this is the
    /// only place Searching becomes Connected or Connected becomes Idle.
    async fn sync_from_store(&mut self, notices: &mpsc::Sender<SessionNotice>) {
        let view = match self.registry.status(self.user_id).await {
            Ok(view) => view,
            Err(e) => {
                self.notify(
                    notices,
                    SessionNotice::Failed {
                        context: "refresh status",
                        error: e.to_string(),
                        unsent: None,
                        retryable: e.is_retryable(),
                    },
                )
                .await;
                return;
            }
        };

        if let Some(connection) = view.connection {
            let already_live = matches!(
                &self.state,
                SessionState::Connected(live) if live.connection.id == connection.id
            );
            if already_live {
                return;
            }
            // A pairing only counts while our request row survived; a
            // connection observed after the request timed out or was
            // cancelled is a stale notification.
            if view.request.is_none() {
                tracing::warn!(
                    "connection {} observed without a request row, ignoring stale pairing",
                    connection.id
                );
                return;
            }
            self.enter_connected(connection, notices).await;
            return;
        }

        match &self.state {
            SessionState::Connected(_) => {
                self.state = SessionState::Idle;
                self.notify(notices, SessionNotice::ConnectionEnded { by_peer: true })
                    .await;
            }
            SessionState::Searching(_) => {
                if view.request.is_none() {
                    // Removed elsewhere (another device, external cleanup).
                    self.disarm_timer();
                    self.state = SessionState::Idle;
                    self.notify(notices, SessionNotice::SearchCancelled).await;
                }
            }
            SessionState::Idle => {
                if let Some(request) = view.request {
                    if request.status == RequestStatus::Searching {
                        // Resume a search persisted before this controller
                        // started; the timeout window restarts.
                        self.arm_timer();
                        self.state = SessionState::Searching(request.clone());
                        self.notify(notices, SessionNotice::SearchStarted(request)).await;
                    }
                    // A connected-status request without its connection row
                    // means the teardown events are still in flight; wait.
                }
            }
        }
    }

    async fn enter_connected(
        &mut self,
        connection: ActiveConnection,
        notices: &mpsc::Sender<SessionNotice>,
    ) {
        let Some(peer_id) = connection.peer_of(self.user_id) else {
            return;
        };
        let peer = match self.store.find_request_for_user(peer_id).await {
            Ok(Some(peer_request)) => PeerProfile::from(&peer_request),
            Ok(None) => {
                tracing::warn!(
                    "peer {} has no request row, ignoring stale pairing {}",
                    peer_id,
                    connection.id
                );
                return;
            }
            Err(e) => {
                self.notify(
                    notices,
                    SessionNotice::Failed {
                        context: "load peer profile",
                        error: e.to_string(),
                        unsent: None,
                        retryable: e.is_retryable(),
                    },
                )
                .await;
                return;
            }
        };
        let messages = match self.log.fetch_page(connection.id, None).await {
            Ok(messages) => messages,
            Err(e) => {
                self.notify(
                    notices,
                    SessionNotice::Failed {
                        context: "load message history",
                        error: e.to_string(),
                        unsent: None,
                        retryable: e.is_retryable(),
                    },
                )
                .await;
                return;
            }
        };

        self.disarm_timer();
        self.state = SessionState::Connected(Box::new(LiveSession {
            connection,
            peer: peer.clone(),
            messages: messages.clone(),
        }));
        self.notify(notices, SessionNotice::Matched { peer, messages }).await;
    }

    async fn notify(&self, notices: &mpsc::Sender<SessionNotice>, notice: SessionNotice) {
        if notices.send(notice).await.is_err() {
            tracing::debug!("session notice receiver dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewConnectionRequest;
    use crate::services::matchmaker::run_matchmaker_once;
    use crate::store::MemoryStore;
    use std::time::Duration;

    fn spawn_controller(
        store: &MemoryStore,
        user_id: Uuid,
    ) -> (mpsc::Sender<SessionCommand>, mpsc::Receiver<SessionNotice>) {
        let (command_tx, command_rx) = mpsc::channel(8);
        let (notice_tx, notice_rx) = mpsc::channel(64);
        let controller = SessionController::new(store.clone(), user_id);
        tokio::spawn(controller.run(command_rx, notice_tx));
        (command_tx, notice_rx)
    }

    fn submit(nickname: &str, location: &str, interests: &[&str]) -> SessionCommand {
        SessionCommand::Submit {
            nickname: nickname.to_string(),
            location: location.to_string(),
            interests: interests.iter().map(|s| s.to_string()).collect(),
        }
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    fn seed_request(user_id: Uuid, nickname: &str, location: &str) -> NewConnectionRequest {
        NewConnectionRequest {
            user_id,
            nickname: nickname.to_string(),
            location: location.to_string(),
            interests: vec!["math".to_string()],
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_unmatched_search_times_out_exactly_once() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        let (commands, mut notices) = spawn_controller(&store, user);

        commands
            .send(submit("Cleo", "LA", &["surfing"]))
            .await
            .unwrap();
        assert!(matches!(
            notices.recv().await.unwrap(),
            SessionNotice::SearchStarted(_)
        ));

        // Nobody else is searching in LA; the paused clock jumps straight to
        // the 40 second timer.
        assert!(matches!(
            notices.recv().await.unwrap(),
            SessionNotice::SearchTimedOut
        ));
        assert!(store.find_request_for_user(user).await.unwrap().is_none());

        // The notice fires exactly once, even long after.
        tokio::time::advance(Duration::from_secs(300)).await;
        settle().await;
        assert!(notices.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_match_disarms_the_timeout() {
        let store = MemoryStore::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let (commands, mut notices) = spawn_controller(&store, a);

        commands.send(submit("Ada", "NYC", &["math"])).await.unwrap();
        assert!(matches!(
            notices.recv().await.unwrap(),
            SessionNotice::SearchStarted(_)
        ));

        store.create_request(seed_request(b, "Bo", "NYC")).await.unwrap();
        store.create_connection(a, b).await.unwrap();

        match notices.recv().await.unwrap() {
            SessionNotice::Matched { peer, messages } => {
                assert_eq!(peer.user_id, b);
                assert_eq!(peer.nickname, "Bo");
                assert!(messages.is_empty());
            }
            other => panic!("unexpected notice: {:?}", other),
        }

        // Well past the window: the disarmed timer must not fire.
        tokio::time::advance(Duration::from_secs(300)).await;
        settle().await;
        assert!(notices.try_recv().is_err());
        assert!(store.find_connection_for_user(a).await.unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_prevents_the_timeout() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        let (commands, mut notices) = spawn_controller(&store, user);

        commands.send(submit("Ada", "NYC", &["math"])).await.unwrap();
        assert!(matches!(
            notices.recv().await.unwrap(),
            SessionNotice::SearchStarted(_)
        ));

        commands.send(SessionCommand::CancelSearch).await.unwrap();
        assert!(matches!(
            notices.recv().await.unwrap(),
            SessionNotice::SearchCancelled
        ));
        assert!(store.find_request_for_user(user).await.unwrap().is_none());

        tokio::time::advance(Duration::from_secs(300)).await;
        settle().await;
        assert!(notices.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_connection_event_is_ignored() {
        let store = MemoryStore::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let (commands, mut notices) = spawn_controller(&store, a);

        commands.send(submit("Ada", "NYC", &["math"])).await.unwrap();
        assert!(matches!(
            notices.recv().await.unwrap(),
            SessionNotice::SearchStarted(_)
        ));

        // A notification for a pairing that does not exist in the store:
        // the re-query finds nothing and the state must not move.
        store.publish(ChangeEvent::Connection {
            op: ChangeOp::Insert,
            connection_id: Uuid::new_v4(),
            user1_id: a,
            user2_id: b,
        });
        settle().await;

        // Still searching, so the timeout eventually fires as usual.
        assert!(matches!(
            notices.recv().await.unwrap(),
            SessionNotice::SearchTimedOut
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_matched_pair_chats_and_ends() {
        let store = MemoryStore::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let (a_commands, mut a_notices) = spawn_controller(&store, a);
        let (b_commands, mut b_notices) = spawn_controller(&store, b);

        a_commands.send(submit("Ada", "NYC", &["math"])).await.unwrap();
        b_commands
            .send(submit("Bo", "NYC", &["math", "art"]))
            .await
            .unwrap();
        assert!(matches!(
            a_notices.recv().await.unwrap(),
            SessionNotice::SearchStarted(_)
        ));
        assert!(matches!(
            b_notices.recv().await.unwrap(),
            SessionNotice::SearchStarted(_)
        ));

        let paired = run_matchmaker_once(&store).await.unwrap();
        assert_eq!(paired, 1);

        match a_notices.recv().await.unwrap() {
            SessionNotice::Matched { peer, .. } => assert_eq!(peer.nickname, "Bo"),
            other => panic!("unexpected notice for a: {:?}", other),
        }
        match b_notices.recv().await.unwrap() {
            SessionNotice::Matched { peer, .. } => assert_eq!(peer.nickname, "Ada"),
            other => panic!("unexpected notice for b: {:?}", other),
        }

        a_commands
            .send(SessionCommand::SendMessage("hi".to_string()))
            .await
            .unwrap();
        match a_notices.recv().await.unwrap() {
            SessionNotice::MessageSent(message) => assert_eq!(message.content, "hi"),
            other => panic!("unexpected notice for a: {:?}", other),
        }
        match b_notices.recv().await.unwrap() {
            SessionNotice::MessageReceived(message) => {
                assert_eq!(message.content, "hi");
                assert_eq!(message.sender_id, a);
            }
            other => panic!("unexpected notice for b: {:?}", other),
        }

        b_commands.send(SessionCommand::EndConnection).await.unwrap();
        assert!(matches!(
            b_notices.recv().await.unwrap(),
            SessionNotice::ConnectionEnded { by_peer: false }
        ));
        assert!(matches!(
            a_notices.recv().await.unwrap(),
            SessionNotice::ConnectionEnded { by_peer: true }
        ));

        // Both users can start a fresh search immediately.
        assert!(store.create_request(seed_request(a, "Ada", "NYC")).await.is_ok());
        assert!(store.create_request(seed_request(b, "Bo", "NYC")).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_store_failure_leaves_idle_state() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        let (commands, mut notices) = spawn_controller(&store, user);
        settle().await;

        store.set_failing(true);
        commands.send(submit("Ada", "NYC", &["math"])).await.unwrap();
        match notices.recv().await.unwrap() {
            SessionNotice::Failed {
                context, retryable, ..
            } => {
                assert_eq!(context, "create request");
                assert!(retryable);
            }
            other => panic!("unexpected notice: {:?}", other),
        }

        // Still Idle: the same submit succeeds once the store recovers.
        store.set_failing(false);
        commands.send(submit("Ada", "NYC", &["math"])).await.unwrap();
        assert!(matches!(
            notices.recv().await.unwrap(),
            SessionNotice::SearchStarted(_)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_send_preserves_unsent_text() {
        let store = MemoryStore::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        store.create_request(seed_request(a, "Ada", "NYC")).await.unwrap();
        store.create_request(seed_request(b, "Bo", "NYC")).await.unwrap();
        store.create_connection(a, b).await.unwrap();

        let (commands, mut notices) = spawn_controller(&store, a);
        assert!(matches!(
            notices.recv().await.unwrap(),
            SessionNotice::Matched { .. }
        ));

        store.set_failing(true);
        commands
            .send(SessionCommand::SendMessage("hello".to_string()))
            .await
            .unwrap();
        match notices.recv().await.unwrap() {
            SessionNotice::Failed {
                unsent, retryable, ..
            } => {
                assert_eq!(unsent.as_deref(), Some("hello"));
                assert!(retryable);
            }
            other => panic!("unexpected notice: {:?}", other),
        }

        // The session stayed Connected; the retry goes through.
        store.set_failing(false);
        commands
            .send(SessionCommand::SendMessage("hello".to_string()))
            .await
            .unwrap();
        assert!(matches!(
            notices.recv().await.unwrap(),
            SessionNotice::MessageSent(_)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_resume_restarts_search_with_fresh_window() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        store
            .create_request(seed_request(user, "Ada", "NYC"))
            .await
            .unwrap();

        let (_commands, mut notices) = spawn_controller(&store, user);
        assert!(matches!(
            notices.recv().await.unwrap(),
            SessionNotice::SearchStarted(_)
        ));
        assert!(matches!(
            notices.recv().await.unwrap(),
            SessionNotice::SearchTimedOut
        ));
        assert!(store.find_request_for_user(user).await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_resume_enters_existing_connection() {
        let store = MemoryStore::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        store.create_request(seed_request(a, "Ada", "NYC")).await.unwrap();
        store.create_request(seed_request(b, "Bo", "NYC")).await.unwrap();
        let connection = store.create_connection(a, b).await.unwrap();
        store.insert_message(connection.id, b, "welcome back").await.unwrap();

        let (_commands, mut notices) = spawn_controller(&store, a);
        match notices.recv().await.unwrap() {
            SessionNotice::Matched { peer, messages } => {
                assert_eq!(peer.user_id, b);
                assert_eq!(messages.len(), 1);
                assert_eq!(messages[0].content, "welcome back");
            }
            other => panic!("unexpected notice: {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_older_before_first_page_is_empty() {
        let store = MemoryStore::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        store.create_request(seed_request(a, "Ada", "NYC")).await.unwrap();
        store.create_request(seed_request(b, "Bo", "NYC")).await.unwrap();
        let connection = store.create_connection(a, b).await.unwrap();
        for i in 0..60 {
            store
                .insert_message(connection.id, b, &format!("msg {}", i))
                .await
                .unwrap();
        }

        let (commands, mut notices) = spawn_controller(&store, a);
        match notices.recv().await.unwrap() {
            SessionNotice::Matched { messages, .. } => {
                assert_eq!(messages.len(), 50);
            }
            other => panic!("unexpected notice: {:?}", other),
        }

        // The first page already starts at the oldest message, so paging
        // further back yields nothing.
        commands.send(SessionCommand::LoadOlderMessages).await.unwrap();
        match notices.recv().await.unwrap() {
            SessionNotice::OlderMessages(older) => assert!(older.is_empty()),
            other => panic!("unexpected notice: {:?}", other),
        }
    }
}
