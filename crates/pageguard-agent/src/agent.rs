//! Visit controller
//!
//! Owns the current [`PageAnalysisSession`] and routes document events to
//! it: inserted nodes go straight to the pipeline, scrolls go through the
//! [`ScrollGate`], and client-side navigation replaces the session.

use crate::session::{AgentContext, ClassifierConnector, ClassifierSource, PageAnalysisSession, SessionState};
use crate::watcher::{DocumentEvent, NavigationSignal, ScrollGate};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info};

pub struct PageAgent {
    ctx: AgentContext,
    connector: ClassifierConnector,
    gate: ScrollGate,
    session: Option<Arc<PageAnalysisSession>>,
}

impl PageAgent {
    pub fn new(ctx: AgentContext, source: ClassifierSource) -> Self {
        Self {
            ctx,
            connector: ClassifierConnector::new(source),
            gate: ScrollGate::new(),
            session: None,
        }
    }

    /// Session for the current visit, if one was started
    pub fn session(&self) -> Option<Arc<PageAnalysisSession>> {
        self.session.clone()
    }

    pub fn state(&self) -> SessionState {
        self.session
            .as_ref()
            .map(|s| s.state())
            .unwrap_or(SessionState::Idle)
    }

    /// Start a fresh visit for the document's current location and run
    /// the initial scan
    pub async fn start_visit(&mut self) -> Arc<PageAnalysisSession> {
        self.gate.reset();
        let session = Arc::new(PageAnalysisSession::start(&self.ctx, &mut self.connector).await);
        self.session = Some(session.clone());
        session.scan().await;
        session
    }

    /// Start a visit and keep analyzing until the event channel closes.
    ///
    /// Returns the state of the last visit.
    pub async fn run<N: NavigationSignal>(
        mut self,
        mut events: mpsc::UnboundedReceiver<DocumentEvent>,
        mut navigation: N,
    ) -> SessionState {
        let mut session = self.start_visit().await;
        let mut navigation_open = true;

        loop {
            let deadline = self.gate.deadline();

            tokio::select! {
                event = events.recv() => match event {
                    Some(DocumentEvent::NodesAdded(nodes)) => session.process_nodes(nodes).await,
                    Some(DocumentEvent::Scrolled) => {
                        if session.state() == SessionState::Monitoring && self.gate.on_scroll(Instant::now()) {
                            debug!("Scroll accepted, rescan scheduled");
                        }
                    }
                    None => break,
                },
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    if self.gate.take_due(Instant::now()) {
                        session.rescan().await;
                    }
                }
                // Recreated every turn; signals keep their own schedule across cancellation
                location = navigation.changed(), if navigation_open => match location {
                    Some(location) => {
                        info!(url = %location, "Client-side navigation, starting a new visit");
                        session = self.start_visit().await;
                    }
                    None => navigation_open = false,
                },
            }
        }

        debug!(state = ?session.state(), "Document closed");
        session.state()
    }
}
