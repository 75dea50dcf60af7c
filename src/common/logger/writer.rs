use std::{
    fs::{self, File, OpenOptions},
    io::{self, BufRead, BufReader, Write},
    path::{Path, PathBuf},
    sync::Arc,
};

use parking_lot::Mutex;

/// Removes ANSI escape sequences so the log file stays plain text.
pub fn strip_ansi_escapes(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut in_escape = false;
    for c in s.chars() {
        if c == '\x1b' {
            in_escape = true;
        } else if in_escape {
            if c.is_ascii_alphabetic() {
                in_escape = false;
            }
        } else {
            result.push(c);
        }
    }
    result
}

/// Append-only log file that keeps at most `max_lines` lines.
///
/// Lines are counted as they are written; once the file grows past the
/// limit by a tenth (at least 50 lines) the oldest lines are cut.
#[derive(Clone)]
pub struct RollingLineWriter {
    path: PathBuf,
    max_lines: usize,
    lines: Arc<Mutex<usize>>,
}

impl RollingLineWriter {
    pub fn new(path: impl Into<PathBuf>, max_lines: usize) -> Self {
        let path = path.into();
        let existing = count_lines(&path).unwrap_or(0);
        Self {
            path,
            max_lines: max_lines.max(1),
            lines: Arc::new(Mutex::new(existing)),
        }
    }

    fn slack(&self) -> usize {
        (self.max_lines / 10).max(50)
    }

    fn truncate_head(&self) -> io::Result<usize> {
        let file = File::open(&self.path)?;
        let lines: Vec<String> = BufReader::new(file).lines().collect::<Result<_, _>>()?;
        if lines.len() <= self.max_lines {
            return Ok(lines.len());
        }

        let keep = &lines[lines.len() - self.max_lines..];
        let tmp = self.path.with_extension("rotate");
        {
            let mut out = File::create(&tmp)?;
            for line in keep {
                writeln!(out, "{line}")?;
            }
        }
        fs::rename(&tmp, &self.path)?;
        Ok(keep.len())
    }
}

fn count_lines(path: &Path) -> io::Result<usize> {
    let file = File::open(path)?;
    Ok(BufReader::new(file).lines().count())
}

impl io::Write for RollingLineWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut lines = self.lines.lock();

        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?
            .write_all(buf)?;

        *lines += buf.iter().filter(|&&b| b == b'\n').count();
        if *lines >= self.max_lines + self.slack() {
            match self.truncate_head() {
                Ok(remaining) => *lines = remaining,
                Err(e) => eprintln!("Failed to rotate log file: {e}"),
            }
        }

        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for RollingLineWriter {
    type Writer = Self;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_colour_codes() {
        assert_eq!(strip_ansi_escapes("\x1b[32mINFO \x1b[0mready"), "INFO ready");
        assert_eq!(strip_ansi_escapes("plain"), "plain");
    }

    #[test]
    fn keeps_only_the_newest_lines() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("bridge.log");
        let mut writer = RollingLineWriter::new(&path, 10);

        for i in 0..200 {
            writeln!(writer, "line {i}").expect("write");
        }

        let contents = fs::read_to_string(&path).expect("read");
        let lines: Vec<&str> = contents.lines().collect();
        assert!(lines.len() < 10 + 50);
        assert_eq!(lines.last().copied(), Some("line 199"));
    }
}
