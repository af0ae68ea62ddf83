use crate::app::App;
use crate::core::app_state::ConnectionStatus;
use crate::core::theme::EnvironmentSnapshot;
use crate::domain::models::CommandTemplate;
use crate::infra::config::StartupConfig;
use crate::infra::host_bridge::{HostBridge, JsonLinesTransport, decode_line};
use log::{debug, info, warn};
use std::io::{self, BufRead};
use std::rc::Rc;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

const IDLE_WAIT: Duration = Duration::from_secs(3600);

/// Run the JSON-lines host loop on stdin/stdout until the host closes stdin.
pub fn serve(config: &StartupConfig, templates: Option<Vec<CommandTemplate>>) -> anyhow::Result<()> {
    let transport = JsonLinesTransport::new(io::stdout());
    let bridge = Rc::new(HostBridge::new(Box::new(transport)));

    let env = match &config.theme {
        Some(theme) if theme.contains("high-contrast") => {
            let mut snapshot = EnvironmentSnapshot::default();
            snapshot.classes.insert("vscode-high-contrast".to_string());
            snapshot
        }
        Some(theme) if theme == "dark" => EnvironmentSnapshot::with_background("#1e1e1e"),
        _ => EnvironmentSnapshot::default(),
    };

    let mut app = App::new(bridge, config, &env, templates);

    // stdin is the only blocking source; it owns no state
    let (tx, rx) = mpsc::channel::<String>();
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            match line {
                Ok(line) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!("Failed to read from host: {}", e);
                    break;
                }
            }
        }
    });

    app.start(Instant::now(), config);
    info!("Serving host channel for {}", config.workspace_name);

    loop {
        let wait = app
            .init_timer()
            .map(|timer| timer.remaining(Instant::now()))
            .unwrap_or(IDLE_WAIT);

        match rx.recv_timeout(wait) {
            Ok(line) => {
                if line.trim().is_empty() {
                    continue;
                }
                match decode_line(&line) {
                    Ok(message) => {
                        debug!("Received {}", message.kind);
                        if let Err(e) = app.handle_message(message) {
                            warn!("Message handling failed: {}", e);
                        }
                    }
                    Err(e) => warn!("Dropping malformed host message: {}", e),
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                app.tick(Instant::now());
            }
            Err(RecvTimeoutError::Disconnected) => {
                info!("Host closed the channel");
                app.state.set_connection(ConnectionStatus::Disconnected);
                break;
            }
        }
    }

    debug!("Final state: {}", app.snapshot());
    Ok(())
}
