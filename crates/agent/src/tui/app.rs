//! TUI application state
//!
//! The status view plays the part of a tray shell: it polls the control
//! surface on its own cadence and only touches the agent through
//! [`AgentHandle`].

use crate::agent::HubStatus;
use crate::handle::{AgentHandle, ConnectionState};
use anyhow::{Context, Result};
use crossterm::{
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{Terminal, backend::CrosstermBackend};
use std::io::{self, Stdout};
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

use super::events::{Action, Event, EventHandler};
use super::ui;

/// Status polling cadence
pub const POLL_INTERVAL: Duration = Duration::from_millis(500);

pub struct App {
    handle: AgentHandle,
    state: ConnectionState,
    hubs: Vec<HubStatus>,
    selected_index: usize,
    should_quit: bool,
    start_time: Instant,
}

impl App {
    pub fn new(handle: AgentHandle) -> Self {
        Self {
            handle,
            state: ConnectionState::Disconnected,
            hubs: Vec::new(),
            selected_index: 0,
            should_quit: false,
            start_time: Instant::now(),
        }
    }

    /// Pull state from the control surface
    ///
    /// The connection state only changes when a rebuild has been published;
    /// the per-hub view is refreshed on every poll so liveness stays current.
    pub fn poll(&mut self) {
        if !self.handle.is_running() {
            self.state = ConnectionState::Paused;
        } else if self.handle.is_updated() {
            self.state = ConnectionState::new(true, self.handle.connected_hub_count());
            self.handle.acknowledge_update();
        }
        self.hubs = self.handle.hubs();
        if self.selected_index >= self.hubs.len() {
            self.selected_index = self.hubs.len().saturating_sub(1);
        }
    }

    pub async fn handle_action(&mut self, action: Action) -> Result<()> {
        match action {
            Action::Quit => self.should_quit = true,
            Action::TogglePause => {
                if self.handle.is_running() {
                    info!("Pausing hub monitoring");
                    self.handle.stop().await.context("Failed to stop monitoring")?;
                } else {
                    info!("Resuming hub monitoring");
                    self.handle.start().await.context("Failed to start monitoring")?;
                }
                self.poll();
            }
            Action::Up => self.selected_index = self.selected_index.saturating_sub(1),
            Action::Down => {
                if self.selected_index + 1 < self.hubs.len() {
                    self.selected_index += 1;
                }
            }
            Action::None => {}
        }
        Ok(())
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn hubs(&self) -> &[HubStatus] {
        &self.hubs
    }

    pub fn selected_hub(&self) -> Option<&HubStatus> {
        self.hubs.get(self.selected_index)
    }

    pub fn selected_index(&self) -> usize {
        self.selected_index
    }

    pub fn should_quit(&self) -> bool {
        self.should_quit
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }
}

/// Terminal wrapper for setup/teardown
pub struct Tui {
    terminal: Terminal<CrosstermBackend<Stdout>>,
}

impl Tui {
    pub fn new() -> Result<Self> {
        let backend = CrosstermBackend::new(io::stdout());
        let terminal = Terminal::new(backend)?;
        Ok(Self { terminal })
    }

    /// Enter TUI mode (raw mode, alternate screen)
    pub fn enter(&mut self) -> Result<()> {
        enable_raw_mode()?;
        execute!(io::stdout(), EnterAlternateScreen)?;
        self.terminal.hide_cursor()?;
        self.terminal.clear()?;
        Ok(())
    }

    /// Exit TUI mode (restore terminal state)
    pub fn exit(&mut self) -> Result<()> {
        disable_raw_mode()?;
        execute!(io::stdout(), LeaveAlternateScreen)?;
        self.terminal.show_cursor()?;
        Ok(())
    }

    pub fn draw(&mut self, app: &App) -> Result<()> {
        self.terminal.draw(|frame| ui::render(frame, app))?;
        Ok(())
    }
}

impl Drop for Tui {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
        let _ = self.terminal.show_cursor();
    }
}

/// Run the status view until the user quits
pub async fn run(handle: AgentHandle) -> Result<()> {
    let mut tui = Tui::new()?;
    tui.enter()?;

    let mut app = App::new(handle);
    app.poll();
    let mut events = EventHandler::new(POLL_INTERVAL);

    loop {
        if let Err(e) = tui.draw(&app) {
            error!("Failed to draw UI: {:#}", e);
            break;
        }

        match events.next().await {
            Some(Event::Key(key)) => {
                if let Err(e) = app.handle_action(Action::from(key)).await {
                    warn!("{:#}", e);
                }
            }
            Some(Event::Resize(_, _)) => {}
            Some(Event::Tick) => app.poll(),
            None => break,
        }

        if app.should_quit() {
            break;
        }
    }

    tui.exit()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::InsightAgent;
    use crate::directory::SnapshotDirectory;
    use crate::endpoint::RecordingEndpointFactory;
    use crate::handle::spawn_service;
    use crate::hub::HardwareIds;
    use crate::scheduler::Timing;
    use common::test_utils::SnapshotBuilder;
    use std::sync::Arc;

    async fn app_with_one_hub() -> (App, RecordingEndpointFactory) {
        let mut builder = SnapshotBuilder::new();
        let host = builder.add_host("0014");
        builder.add_insight_hub(&host, "1", "15", "COM5");

        let endpoints = RecordingEndpointFactory::new();
        let agent = InsightAgent::new(
            Arc::new(SnapshotDirectory::new(builder.build())),
            Arc::new(endpoints.clone()),
            HardwareIds::default(),
        );
        let (handle, _task) = spawn_service(agent, Timing::default());
        handle.start().await.unwrap();
        (App::new(handle), endpoints)
    }

    #[tokio::test]
    async fn test_poll_acknowledges_update() {
        let (mut app, _endpoints) = app_with_one_hub().await;
        assert_eq!(app.state(), ConnectionState::Disconnected);

        app.poll();
        assert_eq!(app.state(), ConnectionState::Connected(1));
        assert_eq!(app.hubs().len(), 1);
        assert!(!app.handle.is_updated());
    }

    #[tokio::test]
    async fn test_pause_and_resume() {
        let (mut app, endpoints) = app_with_one_hub().await;

        app.handle_action(Action::TogglePause).await.unwrap();
        assert_eq!(app.state(), ConnectionState::Paused);
        assert_eq!(endpoints.live_count(), 0);

        app.handle_action(Action::TogglePause).await.unwrap();
        assert_eq!(app.state(), ConnectionState::Connected(1));
        assert_eq!(endpoints.live_count(), 1);
    }

    #[tokio::test]
    async fn test_quit() {
        let (mut app, _endpoints) = app_with_one_hub().await;
        app.handle_action(Action::Quit).await.unwrap();
        assert!(app.should_quit());
    }
}
