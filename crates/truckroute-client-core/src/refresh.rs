//! Single-flight session refresh for requests rejected with 401.
//!
//! Every 401 funnels through one [`RefreshCoordinator`]. The first rejected
//! request flips the coordinator into `Refreshing` and spawns the refresh;
//! requests rejected while it is in flight are queued behind it. Once the
//! refresh settles the coordinator is idle again and the queue is either
//! replayed concurrently, dispatched in arrival order with the new token, or
//! rejected with [`ApiError::AuthExpired`].

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, oneshot};

use crate::credentials::CredentialStore;
use crate::error::ApiError;
use crate::transport::{HttpReply, ReplayFn};

const SESSION_EVENT_CAPACITY: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshedTokens {
    pub access: String,
    /// Present when the backend rotates refresh tokens.
    #[serde(default)]
    pub refresh: Option<String>,
}

#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, refresh_token: &str) -> Result<RefreshedTokens, ApiError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshPhase {
    Idle,
    Refreshing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginRequiredReason {
    MissingRefreshToken,
    RefreshFailed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Refreshed,
    /// Credentials were cleared; the user has to log in again.
    LoginRequired { reason: LoginRequiredReason },
}

struct PendingRequest {
    replay: ReplayFn,
    reply: oneshot::Sender<Result<HttpReply, ApiError>>,
}

struct CoordinatorState {
    phase: RefreshPhase,
    queue: VecDeque<PendingRequest>,
}

struct CoordinatorInner {
    credentials: CredentialStore,
    refresher: Arc<dyn TokenRefresher>,
    state: Mutex<CoordinatorState>,
    events: broadcast::Sender<SessionEvent>,
    refresh_calls: AtomicU64,
}

enum Recovery {
    Wait,
    StartRefresh,
    ReplayWith(ReplayFn, Option<String>),
}

#[derive(Clone)]
pub struct RefreshCoordinator {
    inner: Arc<CoordinatorInner>,
}

impl std::fmt::Debug for RefreshCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshCoordinator")
            .field("phase", &self.phase())
            .field("pending", &self.pending_len())
            .field("refresh_calls", &self.refresh_calls())
            .finish()
    }
}

impl RefreshCoordinator {
    pub fn new(credentials: CredentialStore, refresher: Arc<dyn TokenRefresher>) -> Self {
        let (events, _) = broadcast::channel(SESSION_EVENT_CAPACITY);
        Self {
            inner: Arc::new(CoordinatorInner {
                credentials,
                refresher,
                state: Mutex::new(CoordinatorState {
                    phase: RefreshPhase::Idle,
                    queue: VecDeque::new(),
                }),
                events,
                refresh_calls: AtomicU64::new(0),
            }),
        }
    }

    #[must_use]
    pub fn credentials(&self) -> &CredentialStore {
        &self.inner.credentials
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    #[must_use]
    pub fn phase(&self) -> RefreshPhase {
        self.lock_state().phase
    }

    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.lock_state().queue.len()
    }

    /// Number of refresh calls issued so far.
    #[must_use]
    pub fn refresh_calls(&self) -> u64 {
        self.inner.refresh_calls.load(Ordering::SeqCst)
    }

    /// Sends `replay` with the current access token and recovers from a 401.
    ///
    /// A 401 on the replay is returned as-is; it never re-enters the queue.
    pub async fn execute(&self, replay: ReplayFn) -> Result<HttpReply, ApiError> {
        let sent_with = self.inner.credentials.access_token();
        let reply = replay(sent_with.clone()).await?;
        if !reply.is_unauthorized() {
            return Ok(reply);
        }
        self.recover(replay, sent_with).await
    }

    async fn recover(
        &self,
        replay: ReplayFn,
        sent_with: Option<String>,
    ) -> Result<HttpReply, ApiError> {
        let Some(refresh_token) = self.inner.credentials.refresh_token() else {
            tracing::info!("Request rejected with no refresh token; session expired");
            self.expire(LoginRequiredReason::MissingRefreshToken);
            return Err(ApiError::AuthExpired);
        };

        let (reply_tx, reply_rx) = oneshot::channel();
        let recovery = {
            let mut state = self.lock_state();
            if state.phase == RefreshPhase::Refreshing {
                state.queue.push_back(PendingRequest {
                    replay,
                    reply: reply_tx,
                });
                Recovery::Wait
            } else {
                let current = self.inner.credentials.access_token();
                if current.is_some() && current != sent_with {
                    Recovery::ReplayWith(replay, current)
                } else {
                    state.phase = RefreshPhase::Refreshing;
                    state.queue.push_back(PendingRequest {
                        replay,
                        reply: reply_tx,
                    });
                    Recovery::StartRefresh
                }
            }
        };

        match recovery {
            // A refresh already finished while this request was in flight.
            Recovery::ReplayWith(replay, token) => return replay(token).await,
            Recovery::StartRefresh => {
                let coordinator = self.clone();
                tokio::spawn(async move {
                    coordinator.drive_refresh(refresh_token).await;
                });
            }
            Recovery::Wait => {}
        }

        reply_rx.await.unwrap_or(Err(ApiError::AuthExpired))
    }

    async fn drive_refresh(self, refresh_token: String) {
        self.inner.refresh_calls.fetch_add(1, Ordering::SeqCst);
        tracing::debug!("Access token rejected; refreshing session");

        match self.inner.refresher.refresh(&refresh_token).await {
            Ok(tokens) => {
                self.inner
                    .credentials
                    .replace_access(tokens.access, tokens.refresh);
                let _ = self.inner.events.send(SessionEvent::Refreshed);
                let token = self.inner.credentials.access_token();
                let pending = {
                    let mut state = self.lock_state();
                    state.phase = RefreshPhase::Idle;
                    std::mem::take(&mut state.queue)
                };
                tracing::info!(replayed = pending.len(), "Session refreshed");

                // Dispatched in queue order; each caller is answered as soon as
                // its own replay settles.
                let replays = pending.into_iter().map(|request| {
                    let token = token.clone();
                    async move {
                        let result = (request.replay)(token).await;
                        let _ = request.reply.send(result);
                    }
                });
                futures::future::join_all(replays).await;
            }
            Err(error) => {
                tracing::warn!(error = %error, "Session refresh failed; clearing credentials");
                self.inner.credentials.clear();
                let pending = {
                    let mut state = self.lock_state();
                    state.phase = RefreshPhase::Idle;
                    std::mem::take(&mut state.queue)
                };
                let _ = self.inner.events.send(SessionEvent::LoginRequired {
                    reason: LoginRequiredReason::RefreshFailed,
                });
                for request in pending {
                    let _ = request.reply.send(Err(ApiError::AuthExpired));
                }
            }
        }
    }

    fn expire(&self, reason: LoginRequiredReason) {
        self.inner.credentials.clear();
        let _ = self
            .inner
            .events
            .send(SessionEvent::LoginRequired { reason });
    }

    fn lock_state(&self) -> MutexGuard<'_, CoordinatorState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use std::time::Duration;
    use tokio::sync::{Notify, Semaphore};

    const FRESH: &str = "access-fresh";

    #[derive(Default)]
    struct FakeBackend {
        accepted: Mutex<Option<String>>,
        calls: Mutex<Vec<(u32, Option<String>)>>,
    }

    impl FakeBackend {
        fn accepting(token: &str) -> Arc<Self> {
            Arc::new(Self {
                accepted: Mutex::new(Some(token.to_string())),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn handle(&self, tag: u32, token: Option<String>) -> HttpReply {
            let accepted = self.accepted.lock().expect("accepted lock").clone();
            self.calls
                .lock()
                .expect("calls lock")
                .push((tag, token.clone()));
            if token.is_some() && token == accepted {
                HttpReply::new(200, tag.to_string().into_bytes())
            } else {
                HttpReply::new(401, br#"{"detail":"token not valid"}"#.to_vec())
            }
        }

        fn tags_sent_with(&self, token: &str) -> Vec<u32> {
            self.calls
                .lock()
                .expect("calls lock")
                .iter()
                .filter(|(_, sent)| sent.as_deref() == Some(token))
                .map(|(tag, _)| *tag)
                .collect()
        }
    }

    fn replay_for(backend: &Arc<FakeBackend>, tag: u32) -> ReplayFn {
        let backend = backend.clone();
        Arc::new(move |token: Option<String>| {
            let backend = backend.clone();
            async move { Ok::<_, ApiError>(backend.handle(tag, token)) }.boxed()
        })
    }

    struct GatedRefresher {
        calls: AtomicU64,
        started: Notify,
        gate: Semaphore,
        outcome: Result<RefreshedTokens, ApiError>,
    }

    impl GatedRefresher {
        fn new(outcome: Result<RefreshedTokens, ApiError>) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicU64::new(0),
                started: Notify::new(),
                gate: Semaphore::new(0),
                outcome,
            })
        }

        fn succeeding() -> Arc<Self> {
            Self::new(Ok(RefreshedTokens {
                access: FRESH.to_string(),
                refresh: None,
            }))
        }

        fn release(&self) {
            self.gate.add_permits(1);
        }
    }

    #[async_trait]
    impl TokenRefresher for GatedRefresher {
        async fn refresh(&self, _refresh_token: &str) -> Result<RefreshedTokens, ApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.started.notify_one();
            let _permit = self
                .gate
                .acquire()
                .await
                .map_err(|_| ApiError::network("gate closed"))?;
            self.outcome.clone()
        }
    }

    fn coordinator_with(refresher: Arc<GatedRefresher>) -> RefreshCoordinator {
        let credentials = CredentialStore::in_memory();
        credentials.set("access-stale", "refresh-1");
        RefreshCoordinator::new(credentials, refresher)
    }

    async fn wait_for_pending(coordinator: &RefreshCoordinator, expected: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while coordinator.pending_len() < expected {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .expect("requests queued in time");
    }

    #[tokio::test]
    async fn successful_request_skips_refresh() {
        let backend = FakeBackend::accepting("access-stale");
        let refresher = GatedRefresher::succeeding();
        let coordinator = coordinator_with(refresher.clone());

        let reply = coordinator
            .execute(replay_for(&backend, 1))
            .await
            .expect("reply");
        assert_eq!(reply.status, 200);
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 0);
        assert_eq!(coordinator.phase(), RefreshPhase::Idle);
    }

    #[tokio::test]
    async fn concurrent_401s_share_one_refresh_and_replay_in_fifo_order() {
        let backend = FakeBackend::accepting(FRESH);
        let refresher = GatedRefresher::succeeding();
        let coordinator = coordinator_with(refresher.clone());
        let mut events = coordinator.subscribe();

        let mut handles = Vec::new();
        for tag in 0..5_u32 {
            let worker = coordinator.clone();
            let replay = replay_for(&backend, tag);
            handles.push(tokio::spawn(async move { worker.execute(replay).await }));
            wait_for_pending(&coordinator, tag as usize + 1).await;
        }

        assert_eq!(coordinator.phase(), RefreshPhase::Refreshing);
        refresher.release();

        for (tag, handle) in handles.into_iter().enumerate() {
            let reply = handle.await.expect("join").expect("replayed reply");
            assert_eq!(reply.status, 200);
            assert_eq!(reply.body, tag.to_string().into_bytes());
        }

        assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(coordinator.refresh_calls(), 1);
        assert_eq!(backend.tags_sent_with(FRESH), vec![0, 1, 2, 3, 4]);
        assert_eq!(backend.tags_sent_with("access-stale").len(), 5);
        assert_eq!(coordinator.phase(), RefreshPhase::Idle);
        assert_eq!(coordinator.credentials().access_token().as_deref(), Some(FRESH));
        assert_eq!(events.recv().await.expect("event"), SessionEvent::Refreshed);
    }

    #[tokio::test]
    async fn slow_replay_does_not_hold_back_other_queued_requests() {
        let backend = FakeBackend::accepting(FRESH);
        let refresher = GatedRefresher::succeeding();
        let coordinator = coordinator_with(refresher.clone());
        let slow_gate = Arc::new(Notify::new());

        let gate = slow_gate.clone();
        let slow: ReplayFn = Arc::new(move |token: Option<String>| {
            let gate = gate.clone();
            async move {
                if token.as_deref() == Some(FRESH) {
                    gate.notified().await;
                    return Ok::<_, ApiError>(HttpReply::new(200, b"slow".to_vec()));
                }
                Ok(HttpReply::new(401, Vec::new()))
            }
            .boxed()
        });

        let slow_handle = {
            let worker = coordinator.clone();
            tokio::spawn(async move { worker.execute(slow).await })
        };
        wait_for_pending(&coordinator, 1).await;
        let fast_handle = {
            let worker = coordinator.clone();
            let replay = replay_for(&backend, 1);
            tokio::spawn(async move { worker.execute(replay).await })
        };
        wait_for_pending(&coordinator, 2).await;
        refresher.release();

        let fast = tokio::time::timeout(Duration::from_millis(500), fast_handle)
            .await
            .expect("fast replay finished while the slow one is pending")
            .expect("join")
            .expect("replayed reply");
        assert_eq!(fast.status, 200);
        assert_eq!(coordinator.phase(), RefreshPhase::Idle);
        assert_eq!(coordinator.pending_len(), 0);
        assert!(!slow_handle.is_finished());

        slow_gate.notify_one();
        let slow = slow_handle.await.expect("join").expect("slow reply");
        assert_eq!(slow.body, b"slow".to_vec());
        assert_eq!(coordinator.refresh_calls(), 1);
    }

    #[tokio::test]
    async fn failed_refresh_rejects_every_queued_request_and_clears_credentials() {
        let backend = FakeBackend::accepting(FRESH);
        let refresher = GatedRefresher::new(Err(ApiError::Unauthorized {
            body: "refresh token expired".to_string(),
        }));
        let coordinator = coordinator_with(refresher.clone());
        let mut events = coordinator.subscribe();

        let mut handles = Vec::new();
        for tag in 0..3_u32 {
            let worker = coordinator.clone();
            let replay = replay_for(&backend, tag);
            handles.push(tokio::spawn(async move { worker.execute(replay).await }));
            wait_for_pending(&coordinator, tag as usize + 1).await;
        }
        refresher.release();

        for handle in handles {
            let result = handle.await.expect("join");
            assert_eq!(result, Err(ApiError::AuthExpired));
        }

        assert!(coordinator.credentials().get().is_empty());
        assert_eq!(coordinator.phase(), RefreshPhase::Idle);
        assert_eq!(coordinator.pending_len(), 0);
        assert!(backend.tags_sent_with(FRESH).is_empty());
        assert_eq!(
            events.recv().await.expect("event"),
            SessionEvent::LoginRequired {
                reason: LoginRequiredReason::RefreshFailed
            }
        );
    }

    #[tokio::test]
    async fn missing_refresh_token_expires_immediately() {
        let backend = FakeBackend::accepting(FRESH);
        let refresher = GatedRefresher::succeeding();
        let credentials = CredentialStore::in_memory();
        credentials.replace_access("access-stale", None);
        let coordinator = RefreshCoordinator::new(credentials, refresher.clone());
        let mut events = coordinator.subscribe();

        let result = coordinator.execute(replay_for(&backend, 1)).await;
        assert_eq!(result, Err(ApiError::AuthExpired));
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 0);
        assert!(coordinator.credentials().get().is_empty());
        assert_eq!(
            events.recv().await.expect("event"),
            SessionEvent::LoginRequired {
                reason: LoginRequiredReason::MissingRefreshToken
            }
        );
    }

    #[tokio::test]
    async fn replayed_request_that_is_rejected_again_surfaces_the_401() {
        let backend = FakeBackend::accepting("token-nobody-has");
        let refresher = GatedRefresher::succeeding();
        refresher.release();
        let coordinator = coordinator_with(refresher.clone());

        let reply = coordinator
            .execute(replay_for(&backend, 9))
            .await
            .expect("reply");
        assert_eq!(reply.status, 401);
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(backend.tags_sent_with(FRESH), vec![9]);
        assert_eq!(coordinator.phase(), RefreshPhase::Idle);
        assert_eq!(coordinator.credentials().access_token().as_deref(), Some(FRESH));
    }

    #[tokio::test]
    async fn stale_token_after_completed_refresh_replays_without_refreshing() {
        let refresher = GatedRefresher::succeeding();
        let coordinator = coordinator_with(refresher.clone());
        let credentials = coordinator.credentials().clone();
        let sent = Arc::new(Mutex::new(Vec::new()));

        let sent_in_replay = sent.clone();
        let replay: ReplayFn = Arc::new(move |token: Option<String>| {
            let credentials = credentials.clone();
            let sent = sent_in_replay.clone();
            async move {
                let first = {
                    let mut sent = sent.lock().expect("sent lock");
                    sent.push(token.clone());
                    sent.len() == 1
                };
                if first {
                    // Another caller's refresh lands while this request is in flight.
                    credentials.replace_access(FRESH, None);
                    return Ok::<_, ApiError>(HttpReply::new(401, Vec::new()));
                }
                Ok(HttpReply::new(200, Vec::new()))
            }
            .boxed()
        });

        let reply = coordinator.execute(replay).await.expect("reply");
        assert_eq!(reply.status, 200);
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 0);
        assert_eq!(
            sent.lock().expect("sent lock").clone(),
            vec![Some("access-stale".to_string()), Some(FRESH.to_string())]
        );
    }

    #[tokio::test]
    async fn dropped_trigger_does_not_strand_queued_requests() {
        let backend = FakeBackend::accepting(FRESH);
        let refresher = GatedRefresher::succeeding();
        let coordinator = coordinator_with(refresher.clone());

        let trigger = {
            let worker = coordinator.clone();
            let replay = replay_for(&backend, 0);
            tokio::spawn(async move { worker.execute(replay).await })
        };
        wait_for_pending(&coordinator, 1).await;
        refresher.started.notified().await;

        let queued = {
            let worker = coordinator.clone();
            let replay = replay_for(&backend, 1);
            tokio::spawn(async move { worker.execute(replay).await })
        };
        wait_for_pending(&coordinator, 2).await;

        trigger.abort();
        refresher.release();

        let reply = queued.await.expect("join").expect("replayed reply");
        assert_eq!(reply.status, 200);
        assert_eq!(backend.tags_sent_with(FRESH), vec![0, 1]);
        assert_eq!(coordinator.phase(), RefreshPhase::Idle);
    }

    #[tokio::test]
    async fn transport_failure_is_returned_without_touching_credentials() {
        let refresher = GatedRefresher::succeeding();
        let coordinator = coordinator_with(refresher.clone());
        let replay: ReplayFn = Arc::new(|_token: Option<String>| {
            async { Err::<HttpReply, _>(ApiError::network("connection refused")) }.boxed()
        });

        let result = coordinator.execute(replay).await;
        assert_eq!(result, Err(ApiError::network("connection refused")));
        assert_eq!(
            coordinator.credentials().access_token().as_deref(),
            Some("access-stale")
        );
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 0);
    }
}
