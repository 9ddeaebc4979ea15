use tokio::sync::mpsc;

use crate::error::{LedgerError, WalletError};
use crate::ledger::{BoardHandle, LedgerGateway, Link};
use crate::logger;
use crate::session::{Identity, Session};
use crate::wallet::WalletProvider;

/// Authoritative view of the remote board. `Uninitialized`, `Unknown` and
/// `Ready(vec![])` are three different situations with three different next
/// actions; collapsing any pair of them is a bug.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoardState {
    Disconnected,
    Loading,
    Uninitialized,
    Ready(Vec<Link>),
    Unknown,
}

impl BoardState {
    pub fn label(&self) -> &'static str {
        match self {
            BoardState::Disconnected => "Disconnected",
            BoardState::Loading => "Loading...",
            BoardState::Uninitialized => "Not Initialized",
            BoardState::Ready(_) => "Synced",
            BoardState::Unknown => "Unavailable",
        }
    }
}

/// User and lifecycle intents, drained one at a time by the controller task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    ConnectSilent,
    Connect,
    SetInput(String),
    Submit,
    Initialize,
    Refresh,
}

/// Read-only projection handed to the presentation layer after every
/// transition. The UI never mutates state; it renders this and sends intents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub identity: Option<Identity>,
    pub board: BoardState,
    pub pending_input: String,
    pub last_error: Option<String>,
}

pub struct Controller<W, G> {
    session: Session<W>,
    gateway: G,
    handle: BoardHandle,
    board: BoardState,
    pending_input: String,
    last_error: Option<String>,
    snapshots: mpsc::UnboundedSender<Snapshot>,
}

impl<W: WalletProvider, G: LedgerGateway> Controller<W, G> {
    pub fn new(
        session: Session<W>,
        gateway: G,
        handle: BoardHandle,
        snapshots: mpsc::UnboundedSender<Snapshot>,
    ) -> Self {
        Self {
            session,
            gateway,
            handle,
            board: BoardState::Disconnected,
            pending_input: String::new(),
            last_error: None,
            snapshots,
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            identity: self.session.identity().cloned(),
            board: self.board.clone(),
            pending_input: self.pending_input.clone(),
            last_error: self.last_error.clone(),
        }
    }

    pub fn board(&self) -> &BoardState {
        &self.board
    }

    pub fn pending_input(&self) -> &str {
        &self.pending_input
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    fn publish(&self) {
        let _ = self.snapshots.send(self.snapshot());
    }

    pub async fn apply(&mut self, intent: Intent) {
        match intent {
            Intent::ConnectSilent => self.connect(true).await,
            Intent::Connect => self.connect(false).await,
            Intent::SetInput(value) => {
                self.pending_input = value;
                self.publish();
            }
            Intent::Submit => self.submit().await,
            Intent::Initialize => self.initialize().await,
            Intent::Refresh => self.refresh().await,
        }
    }

    async fn connect(&mut self, silent: bool) {
        if self.session.identity().is_some() {
            // Already connected; the initial fetch already ran.
            return;
        }

        let result = if silent {
            self.session.connect_silent().await
        } else {
            self.session.connect_interactive().await
        };

        match result {
            Ok(_) => {
                self.last_error = None;
                // Identity going from absent to present is the one trigger
                // for the initial fetch, whichever connect path fired.
                self.refresh().await;
            }
            Err(WalletError::NoProvider) => {
                self.last_error = Some(WalletError::NoProvider.to_string());
                self.publish();
            }
            Err(WalletError::Rejected) => {
                logger::log("connect: declined by the wallet");
                self.publish();
            }
            Err(WalletError::Provider(msg)) => {
                if silent {
                    logger::warn(&format!("silent connect failed: {}", msg));
                } else {
                    self.last_error = Some(format!("Wallet agent error: {}", msg));
                }
                self.publish();
            }
        }
    }

    async fn refresh(&mut self) {
        if self.session.identity().is_none() {
            return;
        }

        self.board = BoardState::Loading;
        self.publish();

        match self.gateway.fetch_links(&self.handle).await {
            Ok(links) => {
                logger::log(&format!("fetch: {} links", links.len()));
                self.board = BoardState::Ready(links);
                self.last_error = None;
            }
            Err(LedgerError::AccountNotFound) => {
                // Expected before one-time initialization, never an error.
                self.board = BoardState::Uninitialized;
                self.last_error = None;
            }
            Err(e) => {
                logger::error(&format!("fetch failed: {}", e));
                self.board = BoardState::Unknown;
                self.last_error = Some(e.to_string());
            }
        }
        self.publish();
    }

    async fn initialize(&mut self) {
        // Gating on Uninitialized is what keeps the one-time create from
        // ever being issued against an existing account.
        if self.board != BoardState::Uninitialized {
            logger::warn("initialize ignored: board is not in the uninitialized state");
            return;
        }
        let Some(authority) = self.session.identity().cloned() else {
            return;
        };

        match self.gateway.initialize_board(&self.handle, &authority).await {
            Ok(()) => {
                logger::log("board initialized");
                self.last_error = None;
                // The fresh account is confirmed by re-fetching, not assumed
                // to be empty-but-fetchable.
                self.refresh().await;
            }
            Err(e) => {
                logger::error(&format!("initialize failed: {}", e));
                self.last_error = Some(e.to_string());
                self.publish();
            }
        }
    }

    async fn submit(&mut self) {
        if !matches!(self.board, BoardState::Ready(_)) {
            return;
        }
        let Some(authority) = self.session.identity().cloned() else {
            return;
        };

        let url = self.pending_input.trim().to_string();
        if url.is_empty() {
            // Rejected before any remote call.
            return;
        }

        match self
            .gateway
            .append_link(&self.handle, &authority, &url)
            .await
        {
            Ok(()) => {
                self.pending_input.clear();
                self.last_error = None;
                // The remote list is authoritative: remote-assigned order and
                // fields cannot be guessed, so re-fetch instead of appending
                // a locally built row.
                self.refresh().await;
            }
            Err(e) => {
                // Input and list stay exactly as they were, ready for retry.
                logger::error(&format!("append failed: {}", e));
                self.last_error = Some(e.to_string());
                self.publish();
            }
        }
    }
}

pub struct ControllerTask<W, G> {
    controller: Controller<W, G>,
    intents: mpsc::UnboundedReceiver<Intent>,
}

impl<W: WalletProvider, G: LedgerGateway> ControllerTask<W, G> {
    pub fn new(controller: Controller<W, G>, intents: mpsc::UnboundedReceiver<Intent>) -> Self {
        Self { controller, intents }
    }

    /// Drains intents strictly one at a time. An append always completes
    /// before its refresh is issued, and a submit queued behind an in-flight
    /// one re-validates state and input when its turn comes, so remote
    /// operations against the board never interleave.
    pub async fn start(mut self) {
        logger::log("controller: started");
        self.controller.publish();

        while let Some(intent) = self.intents.recv().await {
            self.controller.apply(intent).await;
        }

        logger::log("controller: intent channel closed, stopping");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct FakeWallet {
        silent: Mutex<VecDeque<Result<Identity, WalletError>>>,
        interactive: Mutex<VecDeque<Result<Identity, WalletError>>>,
    }

    impl FakeWallet {
        fn silent_ok(id: &str) -> Self {
            Self {
                silent: Mutex::new(VecDeque::from([Ok(Identity::new(id))])),
                interactive: Mutex::new(VecDeque::new()),
            }
        }

        fn interactive_ok(id: &str) -> Self {
            Self {
                silent: Mutex::new(VecDeque::new()),
                interactive: Mutex::new(VecDeque::from([Ok(Identity::new(id))])),
            }
        }

        fn silent_err(err: WalletError) -> Self {
            Self {
                silent: Mutex::new(VecDeque::from([Err(err)])),
                interactive: Mutex::new(VecDeque::new()),
            }
        }
    }

    impl WalletProvider for FakeWallet {
        async fn is_available(&self) -> bool {
            true
        }

        async fn connect_silent(&self) -> Result<Identity, WalletError> {
            self.silent
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(WalletError::NoProvider))
        }

        async fn connect_interactive(&self) -> Result<Identity, WalletError> {
            self.interactive
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(WalletError::NoProvider))
        }
    }

    #[derive(Default)]
    struct FakeGateway {
        fetches: Mutex<VecDeque<Result<Vec<Link>, LedgerError>>>,
        inits: Mutex<VecDeque<Result<(), LedgerError>>>,
        appends: Mutex<VecDeque<Result<(), LedgerError>>>,
        calls: Mutex<Vec<String>>,
    }

    impl FakeGateway {
        fn script_fetch(&self, result: Result<Vec<Link>, LedgerError>) {
            self.fetches.lock().unwrap().push_back(result);
        }

        fn script_init(&self, result: Result<(), LedgerError>) {
            self.inits.lock().unwrap().push_back(result);
        }

        fn script_append(&self, result: Result<(), LedgerError>) {
            self.appends.lock().unwrap().push_back(result);
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl LedgerGateway for FakeGateway {
        async fn fetch_links(&self, _handle: &BoardHandle) -> Result<Vec<Link>, LedgerError> {
            self.calls.lock().unwrap().push("fetch".to_string());
            self.fetches
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(LedgerError::Remote("unscripted fetch".to_string())))
        }

        async fn initialize_board(
            &self,
            _handle: &BoardHandle,
            _authority: &Identity,
        ) -> Result<(), LedgerError> {
            self.calls.lock().unwrap().push("init".to_string());
            self.inits
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(LedgerError::Remote("unscripted init".to_string())))
        }

        async fn append_link(
            &self,
            _handle: &BoardHandle,
            _authority: &Identity,
            url: &str,
        ) -> Result<(), LedgerError> {
            self.calls.lock().unwrap().push(format!("append:{}", url));
            self.appends
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(LedgerError::Remote("unscripted append".to_string())))
        }
    }

    fn link(url: &str) -> Link {
        Link {
            url: url.to_string(),
            submitter: "pk-1".to_string(),
        }
    }

    fn controller(
        wallet: FakeWallet,
        gateway: FakeGateway,
    ) -> (
        Controller<FakeWallet, FakeGateway>,
        mpsc::UnboundedReceiver<Snapshot>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = BoardHandle {
            account: "board-account".to_string(),
            program: "linkboard-program-v1".to_string(),
        };
        (
            Controller::new(Session::new(wallet), gateway, handle, tx),
            rx,
        )
    }

    /// Connected controller sitting in `Ready(initial)`.
    async fn ready_controller(
        initial: Vec<Link>,
    ) -> (
        Controller<FakeWallet, FakeGateway>,
        mpsc::UnboundedReceiver<Snapshot>,
    ) {
        let gateway = FakeGateway::default();
        gateway.script_fetch(Ok(initial));
        let (mut c, rx) = controller(FakeWallet::silent_ok("pk-1"), gateway);
        c.apply(Intent::ConnectSilent).await;
        assert!(matches!(c.board(), BoardState::Ready(_)));
        (c, rx)
    }

    #[tokio::test]
    async fn no_provider_at_load_stays_disconnected_and_never_fetches() {
        let (mut c, _rx) = controller(
            FakeWallet::silent_err(WalletError::NoProvider),
            FakeGateway::default(),
        );

        c.apply(Intent::ConnectSilent).await;

        assert_eq!(*c.board(), BoardState::Disconnected);
        assert!(c.gateway.calls().is_empty());
        assert!(c.last_error().unwrap().contains("wallet agent"));
    }

    #[tokio::test]
    async fn silent_rejection_is_quiet_and_leaves_disconnected() {
        let (mut c, _rx) = controller(
            FakeWallet::silent_err(WalletError::Rejected),
            FakeGateway::default(),
        );

        c.apply(Intent::ConnectSilent).await;

        assert_eq!(*c.board(), BoardState::Disconnected);
        assert_eq!(c.last_error(), None);
        assert!(c.gateway.calls().is_empty());
    }

    #[tokio::test]
    async fn account_not_found_yields_uninitialized_not_unknown() {
        let gateway = FakeGateway::default();
        gateway.script_fetch(Err(LedgerError::AccountNotFound));
        let (mut c, _rx) = controller(FakeWallet::silent_ok("pk-1"), gateway);

        c.apply(Intent::ConnectSilent).await;

        assert_eq!(*c.board(), BoardState::Uninitialized);
        assert_eq!(c.last_error(), None);
    }

    #[tokio::test]
    async fn fetch_failure_yields_unknown_not_empty() {
        let gateway = FakeGateway::default();
        gateway.script_fetch(Err(LedgerError::Remote("boom".to_string())));
        let (mut c, _rx) = controller(FakeWallet::silent_ok("pk-1"), gateway);

        c.apply(Intent::ConnectSilent).await;

        assert_eq!(*c.board(), BoardState::Unknown);
        assert_ne!(*c.board(), BoardState::Ready(vec![]));
        assert!(c.last_error().unwrap().contains("boom"));
    }

    #[tokio::test]
    async fn explicit_connect_triggers_the_same_single_fetch() {
        let gateway = FakeGateway::default();
        gateway.script_fetch(Ok(vec![]));
        let (mut c, _rx) = controller(FakeWallet::interactive_ok("pk-1"), gateway);

        c.apply(Intent::Connect).await;
        assert_eq!(*c.board(), BoardState::Ready(vec![]));
        assert_eq!(c.gateway.calls(), vec!["fetch"]);

        // A second connect intent while connected is a no-op.
        c.apply(Intent::Connect).await;
        assert_eq!(c.gateway.calls(), vec!["fetch"]);
    }

    #[tokio::test]
    async fn initialize_refetches_exactly_once_on_success() {
        let gateway = FakeGateway::default();
        gateway.script_fetch(Err(LedgerError::AccountNotFound));
        gateway.script_init(Ok(()));
        gateway.script_fetch(Ok(vec![]));
        let (mut c, _rx) = controller(FakeWallet::silent_ok("pk-1"), gateway);

        c.apply(Intent::ConnectSilent).await;
        assert_eq!(*c.board(), BoardState::Uninitialized);

        c.apply(Intent::Initialize).await;

        assert_eq!(*c.board(), BoardState::Ready(vec![]));
        assert_eq!(c.gateway.calls(), vec!["fetch", "init", "fetch"]);
    }

    #[tokio::test]
    async fn initialize_failure_stays_uninitialized_and_is_retriable() {
        let gateway = FakeGateway::default();
        gateway.script_fetch(Err(LedgerError::AccountNotFound));
        gateway.script_init(Err(LedgerError::Remote("node down".to_string())));
        gateway.script_init(Ok(()));
        gateway.script_fetch(Ok(vec![]));
        let (mut c, _rx) = controller(FakeWallet::silent_ok("pk-1"), gateway);

        c.apply(Intent::ConnectSilent).await;
        c.apply(Intent::Initialize).await;

        assert_eq!(*c.board(), BoardState::Uninitialized);
        assert!(c.last_error().unwrap().contains("node down"));

        c.apply(Intent::Initialize).await;
        assert_eq!(*c.board(), BoardState::Ready(vec![]));
    }

    #[tokio::test]
    async fn initialize_is_gated_on_the_uninitialized_state() {
        let (mut c, _rx) = ready_controller(vec![]).await;

        c.apply(Intent::Initialize).await;

        // No init call: the account already exists.
        assert_eq!(c.gateway.calls(), vec!["fetch"]);
    }

    #[tokio::test]
    async fn submit_appends_then_refetches_and_clears_input() {
        let (mut c, _rx) = ready_controller(vec![link("https://a.example")]).await;
        c.gateway.script_append(Ok(()));
        c.gateway
            .script_fetch(Ok(vec![link("https://a.example"), link("https://b.example")]));

        c.apply(Intent::SetInput("https://b.example".to_string())).await;
        c.apply(Intent::Submit).await;

        assert_eq!(
            *c.board(),
            BoardState::Ready(vec![link("https://a.example"), link("https://b.example")])
        );
        assert_eq!(c.pending_input(), "");
        assert_eq!(
            c.gateway.calls(),
            vec!["fetch", "append:https://b.example", "fetch"]
        );
    }

    #[tokio::test]
    async fn failed_submit_preserves_input_and_list() {
        let before = vec![link("https://a.example")];
        let (mut c, _rx) = ready_controller(before.clone()).await;
        c.gateway
            .script_append(Err(LedgerError::Remote("timeout".to_string())));

        c.apply(Intent::SetInput("https://b.example".to_string())).await;
        c.apply(Intent::Submit).await;

        assert_eq!(*c.board(), BoardState::Ready(before));
        assert_eq!(c.pending_input(), "https://b.example");
        assert!(c.last_error().unwrap().contains("timeout"));
        // append attempted, but no refresh followed the failure
        assert_eq!(
            c.gateway.calls(),
            vec!["fetch", "append:https://b.example"]
        );
    }

    #[tokio::test]
    async fn unauthorized_submit_is_surfaced_without_state_change() {
        let before = vec![link("https://a.example")];
        let (mut c, _rx) = ready_controller(before.clone()).await;
        c.gateway
            .script_append(Err(LedgerError::Unauthorized("authority mismatch".to_string())));

        c.apply(Intent::SetInput("https://b.example".to_string())).await;
        c.apply(Intent::Submit).await;

        assert_eq!(*c.board(), BoardState::Ready(before));
        assert!(c.last_error().unwrap().contains("authority mismatch"));
    }

    #[tokio::test]
    async fn empty_or_whitespace_input_never_reaches_the_gateway() {
        let (mut c, _rx) = ready_controller(vec![link("https://a.example")]).await;

        c.apply(Intent::Submit).await;
        c.apply(Intent::SetInput("   ".to_string())).await;
        c.apply(Intent::Submit).await;

        assert_eq!(c.gateway.calls(), vec!["fetch"]);
        assert_eq!(*c.board(), BoardState::Ready(vec![link("https://a.example")]));
    }

    #[tokio::test]
    async fn submit_is_ignored_outside_ready() {
        let gateway = FakeGateway::default();
        gateway.script_fetch(Err(LedgerError::AccountNotFound));
        let (mut c, _rx) = controller(FakeWallet::silent_ok("pk-1"), gateway);
        c.apply(Intent::ConnectSilent).await;

        c.apply(Intent::SetInput("https://b.example".to_string())).await;
        c.apply(Intent::Submit).await;

        assert_eq!(c.gateway.calls(), vec!["fetch"]);
        assert_eq!(*c.board(), BoardState::Uninitialized);
    }

    #[tokio::test]
    async fn list_grows_by_exactly_the_successful_appends() {
        let (mut c, _rx) = ready_controller(vec![]).await;

        let urls = ["https://a.example", "https://b.example", "https://c.example"];
        let mut remote: Vec<Link> = vec![];
        for url in urls {
            remote.push(link(url));
            c.gateway.script_append(Ok(()));
            c.gateway.script_fetch(Ok(remote.clone()));
            c.apply(Intent::SetInput(url.to_string())).await;
            c.apply(Intent::Submit).await;
        }

        let BoardState::Ready(links) = c.board() else {
            panic!("expected ready board");
        };
        assert_eq!(links.len(), urls.len());
        let appends = c
            .gateway
            .calls()
            .iter()
            .filter(|call| call.starts_with("append:"))
            .count();
        assert_eq!(appends, urls.len());
    }

    #[tokio::test]
    async fn unknown_recovers_through_an_explicit_refresh() {
        let gateway = FakeGateway::default();
        gateway.script_fetch(Err(LedgerError::Remote("boom".to_string())));
        gateway.script_fetch(Ok(vec![]));
        let (mut c, _rx) = controller(FakeWallet::silent_ok("pk-1"), gateway);

        c.apply(Intent::ConnectSilent).await;
        assert_eq!(*c.board(), BoardState::Unknown);

        c.apply(Intent::Refresh).await;
        assert_eq!(*c.board(), BoardState::Ready(vec![]));
        assert_eq!(c.last_error(), None);
    }

    #[tokio::test]
    async fn refresh_without_identity_is_a_noop() {
        let (mut c, _rx) = controller(
            FakeWallet::silent_err(WalletError::Rejected),
            FakeGateway::default(),
        );

        c.apply(Intent::Refresh).await;

        assert_eq!(*c.board(), BoardState::Disconnected);
        assert!(c.gateway.calls().is_empty());
    }

    #[tokio::test]
    async fn refresh_failure_after_successful_append_goes_unknown() {
        let (mut c, _rx) = ready_controller(vec![link("https://a.example")]).await;
        c.gateway.script_append(Ok(()));
        c.gateway
            .script_fetch(Err(LedgerError::Remote("boom".to_string())));

        c.apply(Intent::SetInput("https://b.example".to_string())).await;
        c.apply(Intent::Submit).await;

        // The append landed but the authoritative list could not be read
        // back; pretending the old list still holds would be a lie.
        assert_eq!(*c.board(), BoardState::Unknown);
        assert_eq!(c.pending_input(), "");
        assert!(c.last_error().is_some());
    }

    #[tokio::test]
    async fn loading_is_published_before_the_terminal_state() {
        let gateway = FakeGateway::default();
        gateway.script_fetch(Ok(vec![]));
        let (mut c, mut rx) = controller(FakeWallet::silent_ok("pk-1"), gateway);

        c.apply(Intent::ConnectSilent).await;

        let mut states = vec![];
        while let Ok(snap) = rx.try_recv() {
            states.push(snap.board);
        }
        assert_eq!(states, vec![BoardState::Loading, BoardState::Ready(vec![])]);
    }

    #[tokio::test]
    async fn queued_intents_are_drained_in_order_by_the_task() {
        let gateway = FakeGateway::default();
        gateway.script_fetch(Ok(vec![]));
        gateway.script_append(Ok(()));
        gateway.script_fetch(Ok(vec![link("https://a.example")]));
        let (c, mut snapshots) = controller(FakeWallet::silent_ok("pk-1"), gateway);

        let (intent_tx, intent_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(ControllerTask::new(c, intent_rx).start());

        // Queued before the connect even starts: each runs against the state
        // its predecessors left behind.
        intent_tx.send(Intent::ConnectSilent).unwrap();
        intent_tx.send(Intent::SetInput("https://a.example".to_string())).unwrap();
        intent_tx.send(Intent::Submit).unwrap();
        drop(intent_tx);
        task.await.unwrap();

        let mut last = None;
        while let Ok(snap) = snapshots.try_recv() {
            last = Some(snap);
        }
        let last = last.unwrap();
        assert_eq!(last.board, BoardState::Ready(vec![link("https://a.example")]));
        assert_eq!(last.pending_input, "");
    }
}
