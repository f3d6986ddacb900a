//! A `ProcessRunner` that stands in for the container CLI in tests.
//!
//! Every invocation is recorded. Responses are looked up in the scripted
//! rules first (first match wins); otherwise `create` echoes an id derived
//! from `--name`, `exec` interprets a tiny subset of shell (`echo`, `exit`,
//! `sleep`, `true`, `false`), and everything else succeeds silently.

use crate::process::{OutputSink, OutputStream, ProcessOutput, ProcessRunner};
use async_trait::async_trait;
use std::io;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

struct Rule {
    subcommand: String,
    needle: Option<String>,
    delay: Option<Duration>,
    output: ProcessOutput,
}

#[derive(Default)]
pub struct ScriptedRunner {
    calls: Mutex<Vec<Vec<String>>>,
    rules: Mutex<Vec<Rule>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn succeed(&self, subcommand: &str, stdout: &str) {
        self.push_rule(subcommand, None, None, Some(0), stdout, "");
    }

    pub fn fail(&self, subcommand: &str, exit_code: i32, stderr: &str) {
        self.push_rule(subcommand, None, None, Some(exit_code), "", stderr);
    }

    /// Fail only invocations whose joined arguments contain `needle`.
    pub fn fail_matching(&self, subcommand: &str, needle: &str, exit_code: i32, stderr: &str) {
        self.push_rule(subcommand, Some(needle), None, Some(exit_code), "", stderr);
    }

    /// Succeed after sleeping for `delay`.
    pub fn delay(&self, subcommand: &str, delay: Duration) {
        self.push_rule(subcommand, None, Some(delay), Some(0), "", "");
    }

    fn push_rule(
        &self,
        subcommand: &str,
        needle: Option<&str>,
        delay: Option<Duration>,
        exit_code: Option<i32>,
        stdout: &str,
        stderr: &str,
    ) {
        if let Ok(mut rules) = self.rules.lock() {
            rules.push(Rule {
                subcommand: subcommand.to_string(),
                needle: needle.map(str::to_string),
                delay,
                output: ProcessOutput {
                    exit_code,
                    stdout: stdout.to_string(),
                    stderr: stderr.to_string(),
                },
            });
        }
    }

    /// All recorded argument lists, in call order.
    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn calls_to(&self, subcommand: &str) -> Vec<Vec<String>> {
        self.calls()
            .into_iter()
            .filter(|args| args.first().map(String::as_str) == Some(subcommand))
            .collect()
    }

    pub fn count(&self, subcommand: &str) -> usize {
        self.calls_to(subcommand).len()
    }

    /// First argument of each call, in order: `["pull", "create", "start", ...]`.
    pub fn subcommands(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|args| args.into_iter().next())
            .collect()
    }

    async fn respond(&self, args: &[String]) -> ProcessOutput {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(args.to_vec());
        }

        let subcommand = args.first().map(String::as_str).unwrap_or_default();
        let joined = args.join(" ");
        let scripted = self.rules.lock().ok().and_then(|rules| {
            rules
                .iter()
                .find(|rule| {
                    rule.subcommand == subcommand
                        && rule.needle.as_ref().map_or(true, |n| joined.contains(n))
                })
                .map(|rule| (rule.delay, rule.output.clone()))
        });

        if let Some((delay, output)) = scripted {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            return output;
        }

        match subcommand {
            "create" => {
                let name = args
                    .iter()
                    .position(|a| a == "--name")
                    .and_then(|i| args.get(i + 1))
                    .cloned()
                    .unwrap_or_default();
                ProcessOutput {
                    exit_code: Some(0),
                    stdout: format!("{}-id\n", name),
                    stderr: String::new(),
                }
            }
            "exec" => simulate_shell(args).await,
            _ => ProcessOutput {
                exit_code: Some(0),
                ..Default::default()
            },
        }
    }
}

#[async_trait]
impl ProcessRunner for ScriptedRunner {
    async fn output(&self, _program: &Path, args: &[String]) -> io::Result<ProcessOutput> {
        Ok(self.respond(args).await)
    }

    async fn stream(
        &self,
        _program: &Path,
        args: &[String],
        sink: &dyn OutputSink,
    ) -> io::Result<ProcessOutput> {
        let output = self.respond(args).await;
        for line in output.stdout.lines() {
            sink.write_line(OutputStream::Stdout, line);
        }
        for line in output.stderr.lines() {
            sink.write_line(OutputStream::Stderr, line);
        }
        Ok(output)
    }
}

/// Interpret `exec ... sh -lc <script>` with `-e KEY=VALUE` expansion.
async fn simulate_shell(args: &[String]) -> ProcessOutput {
    let mut env: Vec<(String, String)> = Vec::new();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == "-e" {
            if let Some((key, value)) = iter.next().and_then(|kv| kv.split_once('=')) {
                env.push((key.to_string(), value.to_string()));
            }
        }
    }
    // Longest names first so $FOO_BAR is not clobbered by $FOO.
    env.sort_by(|a, b| b.0.len().cmp(&a.0.len()));

    let script = args.last().cloned().unwrap_or_default();
    let mut stdout = String::new();

    for statement in script
        .split(|c: char| c == '\n' || c == ';')
        .flat_map(|s| s.split("&&"))
        .map(str::trim)
        .filter(|s| !s.is_empty())
    {
        let mut expanded = statement.to_string();
        for (key, value) in &env {
            expanded = expanded
                .replace(&format!("${{{}}}", key), value)
                .replace(&format!("${}", key), value);
        }

        let (word, rest) = expanded
            .split_once(char::is_whitespace)
            .unwrap_or((expanded.as_str(), ""));
        match word {
            "echo" => {
                stdout.push_str(rest.trim().trim_matches(|c: char| c == '"' || c == '\''));
                stdout.push('\n');
            }
            "exit" => {
                let code = rest.trim().parse().unwrap_or(1);
                return ProcessOutput {
                    exit_code: Some(code),
                    stdout,
                    stderr: if code == 0 {
                        String::new()
                    } else {
                        format!("exited with {}", code)
                    },
                };
            }
            "false" => {
                return ProcessOutput {
                    exit_code: Some(1),
                    stdout,
                    stderr: String::new(),
                }
            }
            "sleep" => {
                let secs: f64 = rest.trim().parse().unwrap_or(0.0);
                tokio::time::sleep(Duration::from_secs_f64(secs)).await;
            }
            _ => {}
        }
    }

    ProcessOutput {
        exit_code: Some(0),
        stdout,
        stderr: String::new(),
    }
}
