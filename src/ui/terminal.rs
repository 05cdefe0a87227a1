use std::io::{self, Stdout};
use std::time::Duration;

use anyhow::{Context, Result};
use crossterm::event::{self, Event, KeyEventKind};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

use super::app::App;

/// Redraw and housekeeping cadence when no input arrives.
const TICK_RATE: Duration = Duration::from_millis(50);
/// How long the input thread waits for an event before checking for shutdown.
const INPUT_POLL: Duration = Duration::from_millis(100);

/// Spin up the terminal backend, enter the draw loop, and keep processing input
/// until the user quits.
pub async fn run_app(app: &mut App) -> Result<()> {
    let mut stdout = io::stdout();
    enable_raw_mode().context("failed to enable raw mode")?;
    execute!(stdout, EnterAlternateScreen).context("failed to enter alternate screen")?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("failed to create terminal backend")?;

    let result = event_loop(&mut terminal, app).await;

    cleanup_terminal(&mut terminal)?;
    result
}

async fn event_loop(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    app: &mut App,
) -> Result<()> {
    app.reload_favorites().await;

    // event::read() blocks, so input is read on its own thread. It polls so
    // the thread notices when the loop has gone away.
    let (tx, mut events) = mpsc::channel::<io::Result<Event>>(64);
    tokio::task::spawn_blocking(move || {
        while !tx.is_closed() {
            let read = match event::poll(INPUT_POLL) {
                Ok(false) => continue,
                Ok(true) => event::read(),
                Err(err) => Err(err),
            };
            let failed = read.is_err();
            if tx.blocking_send(read).is_err() || failed {
                break;
            }
        }
    });

    let mut ticker = tokio::time::interval(TICK_RATE);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        terminal
            .draw(|frame| app.draw(frame))
            .context("failed to draw frame")?;

        tokio::select! {
            _ = ticker.tick() => app.on_tick().await?,
            event = events.recv() => match event {
                Some(Ok(Event::Key(key_event))) if key_event.kind == KeyEventKind::Press => {
                    if app.handle_key(key_event.code, key_event.modifiers).await? {
                        return Ok(());
                    }
                }
                Some(Ok(_)) => {}
                Some(Err(err)) => return Err(err).context("failed to read event"),
                None => return Ok(()),
            },
        }
    }
}

fn cleanup_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
    disable_raw_mode().context("failed to disable raw mode")?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)
        .context("failed to leave alternate screen")?;
    terminal
        .show_cursor()
        .context("failed to restore cursor visibility")
}
