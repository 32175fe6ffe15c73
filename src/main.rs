mod app;
mod bus;
mod cli;
mod config;
mod error;
mod events;
mod input;
mod model;
mod panels;
mod store;
mod trees;
mod ui;
mod workbench;

#[cfg(test)]
mod test_support;

use anyhow::{Context, Result};
use app::{App, AppCommand};
use bus::{CliCommandBus, CommandBus};
use clap::Parser;
use cli::CliArgs;
use config::{FileSettings, MemorySettings, RefreshPolicy, Settings, SettingsStore};
use crossterm::event::{
    Event, EventStream, KeyEventKind, KeyboardEnhancementFlags, PopKeyboardEnhancementFlags,
    PushKeyboardEnhancementFlags,
};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
    supports_keyboard_enhancement,
};
use events::{ChannelPrompter, EventSink, PanelKind, Prompter, ViewEvent};
use futures::StreamExt;
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use std::fs::OpenOptions;
use std::io::{self, Stdout};
use std::path::Path;
use std::sync::{Arc, Mutex};
use store::ActiveProfileStore;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;
use workbench::Workbench;

type TuiTerminal = Terminal<CrosstermBackend<Stdout>>;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = CliArgs::parse();
    init_tracing(&args.log_filter, args.log_file.as_deref())?;

    let settings: Arc<dyn SettingsStore> = if args.ephemeral {
        info!("using in-memory settings");
        Arc::new(MemorySettings::new(Settings::default()))
    } else {
        let file = FileSettings::discover(args.config.clone());
        info!("using settings file {}", file.path().display());
        Arc::new(file)
    };
    let store = Arc::new(ActiveProfileStore::new(settings));
    let current = store.settings();

    let program = args
        .backend
        .clone()
        .unwrap_or_else(|| current.backend_command.clone());
    let policy = args
        .refresh_delay_secs
        .map(RefreshPolicy::from_delay_secs)
        .unwrap_or_else(|| current.refresh_policy());
    info!("backend={program} refresh_policy={policy:?}");

    let bus: Arc<dyn CommandBus> = Arc::new(CliCommandBus::new(program, store.clone()));
    let (events, view_rx) = EventSink::channel();
    let prompter: Arc<dyn Prompter> = Arc::new(ChannelPrompter::new(events.clone()));
    let workbench = Arc::new(Workbench::new(bus, store, prompter, events, policy));

    run(workbench, view_rx).await
}

fn init_tracing(level_filter: &str, log_file: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::try_new(level_filter)
        .or_else(|_| EnvFilter::try_new("info"))
        .context("failed to initialize tracing filter")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact();

    // The terminal belongs to the UI, so logs go to a file or nowhere.
    let _ = match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            builder
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
        }
        None => builder.with_writer(io::sink).try_init(),
    };

    Ok(())
}

async fn run(workbench: Arc<Workbench>, view_rx: UnboundedReceiver<ViewEvent>) -> Result<()> {
    let (mut terminal, keyboard_enhanced) = init_terminal()?;
    let run_result = run_loop(&mut terminal, workbench, view_rx).await;
    let restore_result = restore_terminal(&mut terminal, keyboard_enhanced);

    match (run_result, restore_result) {
        (Err(run_error), Err(restore_error)) => Err(anyhow::anyhow!(
            "{run_error:#}\nterminal restore error: {restore_error:#}"
        )),
        (Err(error), _) => Err(error),
        (_, Err(error)) => Err(error),
        (Ok(()), Ok(())) => Ok(()),
    }
}

fn init_terminal() -> Result<(TuiTerminal, bool)> {
    enable_raw_mode().context("failed to enable raw mode")?;
    let mut stdout = io::stdout();
    let keyboard_enhanced = matches!(supports_keyboard_enhancement(), Ok(true));
    if keyboard_enhanced {
        execute!(
            stdout,
            EnterAlternateScreen,
            PushKeyboardEnhancementFlags(
                KeyboardEnhancementFlags::DISAMBIGUATE_ESCAPE_CODES
                    | KeyboardEnhancementFlags::REPORT_ALTERNATE_KEYS
            )
        )
        .context("failed to enter alternate screen with keyboard enhancement")?;
    } else {
        execute!(stdout, EnterAlternateScreen).context("failed to enter alternate screen")?;
    }
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("failed to create terminal backend")?;
    terminal.clear().context("failed to clear terminal")?;
    Ok((terminal, keyboard_enhanced))
}

fn restore_terminal(terminal: &mut TuiTerminal, keyboard_enhanced: bool) -> Result<()> {
    if keyboard_enhanced {
        execute!(terminal.backend_mut(), PopKeyboardEnhancementFlags)
            .context("failed to pop keyboard enhancement flags")?;
    }
    disable_raw_mode().context("failed to disable raw mode")?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)
        .context("failed to leave alternate screen")?;
    terminal.show_cursor().context("failed to show cursor")?;
    Ok(())
}

async fn run_loop(
    terminal: &mut TuiTerminal,
    workbench: Arc<Workbench>,
    mut view_rx: UnboundedReceiver<ViewEvent>,
) -> Result<()> {
    let mut app = App::new();
    app.set_active_profile(workbench.active_profile());

    let startup = Arc::clone(&workbench);
    tokio::spawn(async move { startup.start().await });

    let mut reader = EventStream::new();
    loop {
        terminal
            .draw(|frame| ui::render(frame, &app))
            .context("failed to render terminal frame")?;

        if !app.running() {
            break;
        }

        tokio::select! {
            maybe_event = reader.next() => {
                match maybe_event {
                    Some(Ok(Event::Key(key))) if key.kind == KeyEventKind::Press => {
                        if let Some(action) = input::map_key(app.mode(), key) {
                            debug!("action={action:?}");
                            let command = app.apply_action(action);
                            spawn_command(&workbench, command);
                        }
                    }
                    Some(Ok(_)) => {}
                    Some(Err(error)) => {
                        app.set_status(format!("terminal event error: {error}"));
                    }
                    None => {
                        app.set_status("terminal event stream closed");
                        break;
                    }
                }
            }
            maybe_view = view_rx.recv() => {
                match maybe_view {
                    Some(event) => apply_view_event(&mut app, &workbench, event),
                    None => break,
                }
            }
        }
    }

    Ok(())
}

/// Commands may wait on a confirmation, so they run off the loop.
fn spawn_command(workbench: &Arc<Workbench>, command: AppCommand) {
    if matches!(command, AppCommand::None) {
        return;
    }
    let workbench = Arc::clone(workbench);
    tokio::spawn(async move { workbench.execute(command).await });
}

fn apply_view_event(app: &mut App, workbench: &Arc<Workbench>, event: ViewEvent) {
    match event {
        ViewEvent::Refresh(tree) => {
            let workbench = Arc::clone(workbench);
            tokio::spawn(async move { workbench.query_tree(tree).await });
        }
        ViewEvent::TreeUpdated(tree) => {
            app.set_tree_rows(tree, workbench.tree_rows(tree));
            app.set_active_profile(workbench.active_profile());
        }
        ViewEvent::PanelUpdated(kind) => {
            app.sync_panel(kind, workbench.panel_content(kind));
            // Closing the visible panel uncovers any other one still open.
            if app.panel().is_none()
                && let Some((other, content)) = PanelKind::ALL
                    .into_iter()
                    .find_map(|other| workbench.panel_content(other).map(|content| (other, content)))
            {
                app.sync_panel(other, Some(content));
            }
        }
        ViewEvent::Notice(notice) => app.set_notice(notice),
        ViewEvent::Confirm { request, reply } => app.ask(request, reply),
    }
}
