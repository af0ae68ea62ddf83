use crate::domain::models::ContextFile;
use crossterm::{
    ExecutableCommand, cursor,
    terminal::{Clear, ClearType},
};
use log::{debug, info, warn};
use std::io::{self, Write};
use std::path::Path;
use std::time::{Duration, Instant};

const BYTES_PER_TOKEN: u64 = 4;

/// Rough model-token estimate for a file of `size` bytes.
pub fn estimate_tokens(size: u64) -> u64 {
    size.div_ceil(BYTES_PER_TOKEN)
}

// Progress line for workspace scanning, drawn on stderr
struct ScanProgress {
    start_time: Instant,
    update_interval: Duration,
    last_update: Instant,
    scanned_count: usize,
    matched_count: usize,
    enabled: bool,
}

impl ScanProgress {
    fn new(enabled: bool) -> Self {
        Self {
            start_time: Instant::now(),
            update_interval: Duration::from_millis(250),
            last_update: Instant::now(),
            scanned_count: 0,
            matched_count: 0,
            enabled,
        }
    }

    fn update(&mut self, matched: bool) -> io::Result<()> {
        self.scanned_count += 1;
        if matched {
            self.matched_count += 1;
        }
        if !self.enabled {
            return Ok(());
        }

        let now = Instant::now();
        if now.duration_since(self.last_update) >= self.update_interval {
            self.last_update = now;
            let spinner_chars = ['⠋', '⠙', '⠹', '⠸', '⠼', '⠴', '⠦', '⠧', '⠇', '⠏'];
            let spinner_idx = ((now.duration_since(self.start_time).as_millis() / 100)
                % spinner_chars.len() as u128) as usize;

            let mut stderr = io::stderr();
            stderr.execute(cursor::SavePosition)?;
            stderr.execute(Clear(ClearType::CurrentLine))?;
            write!(
                stderr,
                "{} Scanning workspace: {} scanned, {} matched",
                spinner_chars[spinner_idx], self.scanned_count, self.matched_count
            )?;
            stderr.flush()?;
            stderr.execute(cursor::RestorePosition)?;
        }
        Ok(())
    }

    fn finish(&self) -> io::Result<()> {
        if !self.enabled {
            return Ok(());
        }
        let elapsed = self.start_time.elapsed().as_secs_f32();
        let mut stderr = io::stderr();
        stderr.execute(Clear(ClearType::CurrentLine))?;
        writeln!(
            stderr,
            "✓ Scan complete: {} files scanned, {} matched in {:.1}s",
            self.scanned_count, self.matched_count, elapsed
        )?;
        Ok(())
    }
}

fn relative_path(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .collect::<Vec<_>>()
        .join("/")
}

fn extension_matches(path: &Path, extensions: &[&str]) -> bool {
    if extensions.is_empty() {
        return true;
    }
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            extensions
                .iter()
                .any(|ext| ext.trim_start_matches('.') == e)
        })
        .unwrap_or(false)
}

/// Walk `root` and produce the file listing the host would send: paths
/// relative to `root` with `/` separators, sizes and token estimates.
pub fn list_workspace_files(
    root: &str,
    extensions: &[&str],
    exclude_patterns: &[&str],
    show_progress: bool,
) -> anyhow::Result<Vec<ContextFile>> {
    info!("Listing workspace files in: {}", root);
    debug!("Extensions: {:?}", extensions);
    debug!("Exclude patterns: {:?}", exclude_patterns);

    let root_path = Path::new(root);
    if !root_path.is_dir() {
        anyhow::bail!("Workspace root is not a directory: {}", root);
    }

    let mut result = Vec::new();
    let mut progress = ScanProgress::new(show_progress);

    for entry in walkdir::WalkDir::new(root_path)
        .into_iter()
        .filter_entry(|e| {
            let rel = relative_path(root_path, e.path());
            !exclude_patterns
                .iter()
                .any(|pat| !pat.is_empty() && rel.contains(pat))
        })
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("Skipping unreadable entry: {}", e);
                None
            }
        })
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let matched = extension_matches(path, extensions);
        progress.update(matched)?;
        if !matched {
            continue;
        }

        let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
        let rel = relative_path(root_path, path);
        debug!("Found workspace file: {} ({} bytes)", rel, size);
        result.push(ContextFile {
            path: rel,
            size: Some(size),
            token_estimate: Some(estimate_tokens(size)),
        });
    }

    progress.finish()?;
    info!("Found {} matching files", result.len());
    Ok(result)
}
