//! Terminal rendering for the `doca` commands.
//!
//! Human output is colored unless `NO_COLOR` is set. JSON output never
//! goes through this module.

use crate::core::progress::ProgressEvent;

/// Styles shared by every command
pub mod colors {
    use colored::{ColoredString, Colorize};

    /// Headings
    pub fn label(s: &str) -> ColoredString {
        s.bold()
    }

    pub fn collection(s: &str) -> ColoredString {
        s.cyan()
    }

    pub fn file_path(s: &str) -> ColoredString {
        s.blue()
    }

    /// Counts and percentages
    pub fn number(s: &str) -> ColoredString {
        s.yellow()
    }

    pub fn success(s: &str) -> ColoredString {
        s.green()
    }

    pub fn warning(s: &str) -> ColoredString {
        s.yellow()
    }

    pub fn error(s: &str) -> ColoredString {
        s.red().bold()
    }

    /// Secondary detail such as run status tags
    pub fn dim(s: &str) -> ColoredString {
        s.dimmed()
    }
}

/// Byte count with a binary unit, e.g. `512.0 MB`
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 3] = ["KB", "MB", "GB"];

    if bytes < 1024 {
        return format!("{bytes} B");
    }

    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}

/// Elapsed run time: milliseconds below a second, minutes past one
pub fn format_duration(secs: f64) -> String {
    match secs {
        s if s < 1.0 => format!("{:.0}ms", s * 1000.0),
        s if s < 60.0 => format!("{s:.2}s"),
        s => {
            let whole_minutes = (s / 60.0).floor();
            format!("{whole_minutes:.0}m {:.1}s", s - whole_minutes * 60.0)
        }
    }
}

/// One-line human rendering of a progress event
pub fn render_event(event: &ProgressEvent) -> String {
    match event {
        ProgressEvent::IndexingStarted {
            directory,
            recursive,
        } => {
            let mode = if *recursive { "recursive" } else { "top level only" };
            format!(
                "Indexing {} ({})",
                colors::file_path(directory),
                colors::dim(mode)
            )
        }
        ProgressEvent::IndexingStatus { status, message } => {
            format!("{} {}", colors::dim(&format!("[{}]", status.as_str())), message)
        }
        ProgressEvent::IndexingProgress {
            current,
            total,
            percentage,
            file_path,
            chunks_indexed,
        } => format!(
            "[{}/{}] {} {} ({} chunks)",
            current,
            total,
            colors::number(&format!("{percentage:>5.1}%")),
            colors::file_path(file_path),
            chunks_indexed
        ),
        ProgressEvent::IndexingWarning { file_path, warning } => format!(
            "{}: {} {}",
            colors::warning("Warning"),
            colors::file_path(file_path),
            warning
        ),
        ProgressEvent::IndexingCompleted {
            total_files,
            total_chunks,
            skipped_files,
            error_files,
        } => format!(
            "{} {} files ({} chunks), {} skipped, {} failed",
            colors::success("Completed"),
            colors::number(&total_files.to_string()),
            colors::number(&total_chunks.to_string()),
            colors::number(&skipped_files.to_string()),
            colors::number(&error_files.to_string())
        ),
        ProgressEvent::IndexingError {
            file_path: Some(path),
            error,
        } => format!(
            "{}: {} {}",
            colors::error("Failed"),
            colors::file_path(path),
            error
        ),
        ProgressEvent::IndexingError {
            file_path: None,
            error,
        } => format!("{}: {}", colors::error("Error"), error),
    }
}

/// Bold section title on stdout
pub fn print_header(title: &str) {
    println!("{}", colors::label(title));
}
