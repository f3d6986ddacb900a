use async_trait::async_trait;
use std::io;
use std::path::Path;
use std::process::Stdio;
use std::sync::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// Receives process output line by line while the process is still running.
pub trait OutputSink: Send + Sync {
    fn write_line(&self, stream: OutputStream, line: &str);
}

/// Forwards lines to this process's own stdout/stderr.
pub struct ConsoleSink;

impl OutputSink for ConsoleSink {
    fn write_line(&self, stream: OutputStream, line: &str) {
        match stream {
            OutputStream::Stdout => println!("{}", line),
            OutputStream::Stderr => eprintln!("{}", line),
        }
    }
}

/// Collects lines in memory.
#[derive(Default)]
pub struct BufferSink {
    lines: Mutex<Vec<(OutputStream, String)>>,
}

impl BufferSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<(OutputStream, String)> {
        self.lines.lock().map(|l| l.clone()).unwrap_or_default()
    }

    pub fn stdout(&self) -> String {
        self.joined(OutputStream::Stdout)
    }

    pub fn stderr(&self) -> String {
        self.joined(OutputStream::Stderr)
    }

    fn joined(&self, stream: OutputStream) -> String {
        self.lines()
            .into_iter()
            .filter(|(s, _)| *s == stream)
            .map(|(_, line)| line)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl OutputSink for BufferSink {
    fn write_line(&self, stream: OutputStream, line: &str) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push((stream, line.to_string()));
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Combined, trimmed stdout and stderr for error messages.
    pub fn diagnostic(&self) -> String {
        let combined = format!("{}\n{}", self.stdout.trim(), self.stderr.trim());
        let combined = combined.trim();
        if combined.is_empty() {
            match self.exit_code {
                Some(code) => format!("exit status {}", code),
                None => "terminated by signal".to_string(),
            }
        } else {
            combined.to_string()
        }
    }
}

/// Capability to run an external program.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Run to completion and capture both output streams.
    async fn output(&self, program: &Path, args: &[String]) -> io::Result<ProcessOutput>;

    /// Run to completion, handing every line to `sink` as soon as it is read.
    /// Both streams are captured as well.
    async fn stream(
        &self,
        program: &Path,
        args: &[String],
        sink: &dyn OutputSink,
    ) -> io::Result<ProcessOutput>;
}

/// Spawns real child processes with tokio.
pub struct SystemProcessRunner;

#[async_trait]
impl ProcessRunner for SystemProcessRunner {
    async fn output(&self, program: &Path, args: &[String]) -> io::Result<ProcessOutput> {
        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await?;

        Ok(ProcessOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    async fn stream(
        &self,
        program: &Path,
        args: &[String],
        sink: &dyn OutputSink,
    ) -> io::Result<ProcessOutput> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "stdout was not piped"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "stderr was not piped"))?;

        let (stdout, stderr) = tokio::join!(
            forward_lines(stdout, OutputStream::Stdout, sink),
            forward_lines(stderr, OutputStream::Stderr, sink)
        );
        let status = child.wait().await?;

        Ok(ProcessOutput {
            exit_code: status.code(),
            stdout: stdout?,
            stderr: stderr?,
        })
    }
}

async fn forward_lines<R>(
    reader: R,
    stream: OutputStream,
    sink: &dyn OutputSink,
) -> io::Result<String>
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut captured = String::new();
    let mut buf = Vec::new();

    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            break;
        }
        let line = String::from_utf8_lossy(&buf);
        let line = line.trim_end_matches(|c: char| c == '\n' || c == '\r');
        sink.write_line(stream, line);
        captured.push_str(line);
        captured.push('\n');
    }

    Ok(captured)
}
