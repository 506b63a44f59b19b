use clap::{error::ErrorKind, CommandFactory, Parser};
use crossterm::{
    event::KeyEventKind,
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    tty::IsTty,
};
use gesturecam::{
    app_dirs::AppDirs,
    camera::{list_cameras, Camera, NokhwaCamera},
    capture::{CaptureLoop, CaptureSettings},
    config::{Config, ConfigStore, FileConfigStore},
    detection::HttpDetector,
    export::BrowserNavigator,
    logging,
    runtime::{AppEvent, CrosstermEventSource, EventSource, FixedTicker, Runner, Ticker},
    shell::{AppShell, SessionTimeForwarder},
    stats::StatsStore,
    worker::FrameWorker,
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    Terminal,
};
use std::{
    error::Error,
    io::{self, stdin},
    path::PathBuf,
    time::Duration,
};
use tracing::{error, info};

/// live hand gesture recognition from your webcam
#[derive(Parser, Debug, Clone, Default)]
#[clap(
    version,
    about,
    long_about = "Streams webcam frames to a gesture recognition server and shows the detected gesture, hand distance and session statistics in the terminal."
)]
pub struct Cli {
    /// base URL of the gesture recognition server
    #[clap(short = 'u', long)]
    server_url: Option<String>,

    /// index of the camera to open
    #[clap(short = 'c', long)]
    camera_index: Option<u32>,

    /// requested capture width
    #[clap(long)]
    width: Option<u32>,

    /// requested capture height
    #[clap(long)]
    height: Option<u32>,

    /// jpeg quality of uploaded frames (1-100)
    #[clap(short = 'q', long, value_parser = clap::value_parser!(u8).range(1..=100))]
    jpeg_quality: Option<u8>,

    /// milliseconds between frame ticks
    #[clap(short = 'i', long)]
    frame_interval_ms: Option<u64>,

    /// request timeout in milliseconds
    #[clap(short = 't', long)]
    timeout_ms: Option<u64>,

    /// directory for local csv exports
    #[clap(short = 'o', long)]
    export_dir: Option<PathBuf>,

    /// print detected cameras and exit
    #[clap(long)]
    list_cameras: bool,

    /// save the effective settings as the new defaults
    #[clap(long)]
    save_config: bool,
}

impl Cli {
    /// Overlay command line flags on the stored config
    fn apply(&self, cfg: &mut Config) {
        if let Some(url) = &self.server_url {
            cfg.server_url = url.clone();
        }
        if let Some(index) = self.camera_index {
            cfg.camera_index = index;
        }
        if let Some(width) = self.width {
            cfg.frame_width = width;
        }
        if let Some(height) = self.height {
            cfg.frame_height = height;
        }
        if let Some(quality) = self.jpeg_quality {
            cfg.jpeg_quality = quality;
        }
        if let Some(interval) = self.frame_interval_ms {
            cfg.frame_interval_ms = interval;
        }
        if let Some(timeout) = self.timeout_ms {
            cfg.request_timeout_ms = timeout;
        }
        if let Some(dir) = &self.export_dir {
            cfg.export_dir = Some(dir.clone());
        }
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    if cli.list_cameras {
        for camera in list_cameras()? {
            println!("{}\t{}\t{}", camera.index, camera.name, camera.description);
        }
        return Ok(());
    }

    if !stdin().is_tty() {
        let mut cmd = Cli::command();
        cmd.error(ErrorKind::Io, "stdin must be a tty").exit();
    }

    let _log_guard = match AppDirs::state_dir() {
        Some(dir) => Some(logging::init_logging(&dir)?),
        None => None,
    };

    let store = FileConfigStore::new();
    let mut config = store.load();
    cli.apply(&mut config);
    if cli.save_config {
        store.save(&config)?;
        info!(path = %store.path().display(), "config saved");
    }

    enable_raw_mode()?;

    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = start_tui(&mut terminal, &config);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen,)?;
    terminal.show_cursor()?;

    if let Err(e) = &result {
        error!(error = %e, "exiting with error");
    }
    result
}

fn start_tui<B: Backend>(terminal: &mut Terminal<B>, config: &Config) -> Result<(), Box<dyn Error>> {
    let events = CrosstermEventSource::new();
    let detector = HttpDetector::new(
        &config.server_url,
        Duration::from_millis(config.request_timeout_ms),
    )?;
    info!(endpoint = detector.endpoint(), "using detection server");
    let worker = FrameWorker::spawn(detector, events.sender());

    let mut stats = StatsStore::new();
    stats.set_observer(Box::new(SessionTimeForwarder::new(events.sender())));

    let capture = CaptureLoop::new(NokhwaCamera, CaptureSettings::from(config));
    let export_dir = config
        .export_dir
        .clone()
        .unwrap_or_else(AppDirs::export_dir);
    let mut shell = AppShell::new(
        capture,
        stats,
        Box::new(BrowserNavigator),
        config.server_url.clone(),
        export_dir,
    );

    let ticker = FixedTicker::new(Duration::from_millis(config.frame_interval_ms.max(1)));
    let runner = Runner::new(events, ticker);
    run_app(terminal, &mut shell, &runner, &worker)
}

fn run_app<B: Backend, C: Camera, E: EventSource, T: Ticker>(
    terminal: &mut Terminal<B>,
    shell: &mut AppShell<C>,
    runner: &Runner<E, T>,
    worker: &FrameWorker,
) -> Result<(), Box<dyn Error>> {
    terminal.draw(|f| f.render_widget(shell.view(), f.area()))?;

    loop {
        match runner.step() {
            AppEvent::Key(key) => {
                if key.kind != KeyEventKind::Press {
                    continue;
                }
                shell.handle_key(key);
                if shell.should_quit() {
                    break;
                }
            }
            AppEvent::Resize => {}
            AppEvent::Tick => {
                if let Some(request) = shell.on_tick() {
                    let generation = request.generation;
                    if !worker.submit(request) {
                        shell.on_submit_failed(generation);
                    }
                }
            }
            AppEvent::Frame(response) => shell.on_frame_response(response),
            AppEvent::SessionTime(_) => shell.on_session_time(),
        }

        terminal.draw(|f| f.render_widget(shell.view(), f.area()))?;
    }

    Ok(())
}
