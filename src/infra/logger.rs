use crossterm::{
    ExecutableCommand,
    style::{Color, ResetColor, SetForegroundColor},
};
use env_logger::{Builder, Target};
use log::{Level, debug, info};
use std::io::Write;

pub const LOG_LEVEL_ENV_VAR: &str = "PTAH_LOG_LEVEL";

pub fn level_for_verbosity(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "error",
        1 => "warn",
        2 => "info",
        _ => "debug",
    }
}

/// Logs always go to stderr; stdout may be the host channel.
pub fn setup_logger(verbosity: u8) -> Result<(), log::SetLoggerError> {
    let env =
        env_logger::Env::default().filter_or(LOG_LEVEL_ENV_VAR, level_for_verbosity(verbosity));

    Builder::from_env(env)
        .target(Target::Stderr)
        .format(|buf, record| {
            let level_color = match record.level() {
                Level::Error => "31", // Red
                Level::Warn => "33",  // Yellow
                Level::Info => "32",  // Green
                Level::Debug => "36", // Cyan
                Level::Trace => "35", // Magenta
            };

            writeln!(
                buf,
                "\x1B[{}m[{}]\x1B[0m [{}] {}",
                level_color,
                record.level(),
                buf.timestamp(),
                record.args()
            )
        })
        .format_timestamp_secs()
        .try_init()
}

pub fn print_welcome_message() -> std::io::Result<()> {
    let mut stderr = std::io::stderr();

    writeln!(stderr)?;
    stderr.execute(SetForegroundColor(Color::Yellow))?;
    writeln!(stderr, "𓂀 Ptah v{}", env!("CARGO_PKG_VERSION"))?;
    stderr.execute(ResetColor)?;
    writeln!(stderr, "Shape your context before you ask")?;
    writeln!(stderr)?;

    debug!("Debug logging enabled");
    info!("Starting Ptah...");
    Ok(())
}
