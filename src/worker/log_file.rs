use std::{
    fmt,
    fs::{File, OpenOptions},
    io::{self, Read, Seek, SeekFrom, Write},
    path::Path,
    thread,
    time::Duration,
};

use chrono::{DateTime, SecondsFormat, Utc};

use crate::models::task::TaskId;

const SEPARATOR_WIDTH: usize = 60;

pub fn separator() -> String {
    "─".repeat(SEPARATOR_WIDTH)
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    Exited(i32),
    Signaled(i32),
    Error(String),
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Termination::Exited(code) => write!(f, "Exit code: {code}"),
            Termination::Signaled(signal) => write!(f, "Terminated by signal {signal}"),
            Termination::Error(message) => write!(f, "Error: {message}"),
        }
    }
}

pub fn open_append(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

pub fn write_header(
    out: &mut impl Write,
    id: &TaskId,
    project: &str,
    task: &str,
    started_at: DateTime<Utc>,
) -> io::Result<()> {
    writeln!(out, "Task ID: {id}")?;
    writeln!(out, "Project: {project}")?;
    writeln!(out, "Task: {task}")?;
    writeln!(out, "Started: {}", timestamp(started_at))?;
    writeln!(out, "{}", separator())?;
    writeln!(out)?;
    out.flush()
}

pub fn write_footer(path: &Path, ended_at: DateTime<Utc>, termination: &Termination) -> io::Result<()> {
    let mut out = open_append(path)?;
    writeln!(out)?;
    writeln!(out, "{}", separator())?;
    writeln!(out, "Ended: {}", timestamp(ended_at))?;
    writeln!(out, "{termination}")?;
    out.flush()
}

/// Copies the log to `out`, then keeps polling for appended bytes while
/// `keep_going` returns true. A last read after it turns false picks up
/// whatever was appended in between. Returns the number of bytes copied.
pub fn follow<W, F>(path: &Path, poll: Duration, mut keep_going: F, out: &mut W) -> io::Result<u64>
where
    W: Write,
    F: FnMut() -> bool,
{
    let mut file = File::open(path)?;
    let mut offset = 0u64;
    let mut buf = Vec::new();

    loop {
        let running = keep_going();

        file.seek(SeekFrom::Start(offset))?;
        buf.clear();
        let read = file.read_to_end(&mut buf)?;
        if read > 0 {
            out.write_all(&buf)?;
            out.flush()?;
            offset += read as u64;
        }

        if !running {
            return Ok(offset);
        }
        thread::sleep(poll);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn header_and_footer_frame_the_output() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("logs/task.log");
        let started = Utc::now();

        let mut file = open_append(&path).expect("open");
        write_header(&mut file, &TaskId::new("task-1-x"), "alpha", "write docs", started)
            .expect("header");
        writeln!(file, "assistant output").expect("body");
        drop(file);
        write_footer(&path, Utc::now(), &Termination::Exited(3)).expect("footer");

        let content = fs::read_to_string(&path).expect("read");
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "Task ID: task-1-x");
        assert_eq!(lines[1], "Project: alpha");
        assert_eq!(lines[2], "Task: write docs");
        assert!(lines[3].starts_with("Started: "));
        assert!(content.contains("assistant output"));
        assert_eq!(lines.last().copied(), Some("Exit code: 3"));
        assert_eq!(content.matches(&separator()).count(), 2);
    }

    #[test]
    fn follow_stops_after_final_drain() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("task.log");
        fs::write(&path, "first\n").expect("write");

        let mut polls = 0;
        let mut out = Vec::new();
        let copied = follow(
            &path,
            Duration::from_millis(1),
            || {
                polls += 1;
                if polls == 2 {
                    let mut file = open_append(&path).expect("append");
                    writeln!(file, "second").expect("write");
                }
                polls < 3
            },
            &mut out,
        )
        .expect("follow");

        assert_eq!(String::from_utf8(out).expect("utf8"), "first\nsecond\n");
        assert_eq!(copied, 13);
    }
}
