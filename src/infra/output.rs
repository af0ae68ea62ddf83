#[cfg(feature = "clipboard-support")]
use clipboard::{ClipboardContext, ClipboardProvider};
use crossterm::{
    ExecutableCommand,
    style::{Color, ResetColor, SetForegroundColor},
};
use log::{debug, info, warn};
use std::fs;
use std::io::{self, Write};
use std::path::Path;

pub trait OutputWriter {
    fn write(&self, content: &str) -> anyhow::Result<()>;
}

pub struct FileWriter {
    path: String,
}

impl FileWriter {
    pub fn new(path: String) -> Self {
        Self { path }
    }
}

impl OutputWriter for FileWriter {
    fn write(&self, content: &str) -> anyhow::Result<()> {
        debug!("Writing output to file: {}", self.path);
        fs::write(Path::new(&self.path), content)?;
        info!("Output written to file: {}", self.path);
        Ok(())
    }
}

pub struct ConsoleWriter;

impl OutputWriter for ConsoleWriter {
    fn write(&self, content: &str) -> anyhow::Result<()> {
        debug!("Writing output to console");
        let mut stdout = io::stdout();
        stdout.write_all(content.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

pub struct ClipboardWriter;

#[cfg(feature = "clipboard-support")]
impl OutputWriter for ClipboardWriter {
    fn write(&self, content: &str) -> anyhow::Result<()> {
        debug!("Writing output to clipboard");

        let mut ctx: ClipboardContext = ClipboardProvider::new().map_err(|e| {
            warn!("Failed to access clipboard: {}", e);
            anyhow::anyhow!("Failed to access clipboard: {}", e)
        })?;

        ctx.set_contents(content.to_owned()).map_err(|e| {
            warn!("Failed to copy to clipboard: {}", e);
            anyhow::anyhow!("Failed to copy to clipboard: {}", e)
        })?;
        info!("Output copied to clipboard (size: {} bytes)", content.len());
        Ok(())
    }
}

#[cfg(not(feature = "clipboard-support"))]
impl OutputWriter for ClipboardWriter {
    fn write(&self, _content: &str) -> anyhow::Result<()> {
        warn!("Clipboard support was not compiled in");
        anyhow::bail!("Clipboard support is disabled; rebuild with the clipboard-support feature")
    }
}

pub fn create_writer(output_path: Option<&str>, clipboard_output: bool) -> Box<dyn OutputWriter> {
    if clipboard_output {
        return Box::new(ClipboardWriter);
    }

    match output_path {
        Some(path) => Box::new(FileWriter::new(path.to_string())),
        None => Box::new(ConsoleWriter),
    }
}

pub fn preview(content: &str, max_chars: usize) -> String {
    if content.chars().count() > max_chars {
        let safe_substring: String = content.chars().take(max_chars).collect();
        format!("{}...", safe_substring)
    } else {
        content.to_string()
    }
}

pub fn write_output(
    content: &str,
    output_path: Option<&str>,
    clipboard_output: bool,
) -> anyhow::Result<()> {
    let writer = create_writer(output_path, clipboard_output);
    writer.write(content)?;

    if clipboard_output {
        let mut stderr = io::stderr();
        stderr.execute(SetForegroundColor(Color::Green))?;
        writeln!(stderr, "\n📋 Copied to clipboard!")?;
        stderr.execute(ResetColor)?;
        writeln!(stderr, "\n{}\n", preview(content, 200))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_file_writer() {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path().to_string_lossy().to_string();
        let writer = FileWriter::new(path.clone());

        writer.write("Review Go code: main.go").unwrap();

        let read_content = fs::read_to_string(path).unwrap();
        assert_eq!(read_content, "Review Go code: main.go");
    }

    #[test]
    fn test_write_output_to_file() {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path().to_string_lossy().to_string();

        write_output("a.rs\nb.rs", Some(path.as_str()), false).unwrap();

        assert_eq!(fs::read_to_string(path).unwrap(), "a.rs\nb.rs");
    }

    #[test]
    fn test_utf8_safe_preview() {
        let content = "𓂀 Ptah builds context: ├── ./src/file.rs";

        let short = preview(content, 5);
        assert_eq!(short.chars().count(), 8);
        assert!(short.ends_with("..."));
        assert_eq!(preview("short", 20), "short");
    }
}
