use anyhow::{Context, Result};
use serde::Deserialize;
use std::{collections::VecDeque, fs, path::Path};
use tabletop_core::SimTick;

#[derive(Debug, Deserialize)]
struct CommandScriptFile {
    steps: Vec<CommandScriptStepDef>,
}

#[derive(Debug, Clone, Deserialize)]
struct CommandScriptStepDef {
    tick: u64,
    command: String,
}

/// A scheduler call issued by a script step.
#[derive(Debug, Clone, PartialEq)]
pub enum WaitCommand {
    /// `frames <label> <count>`
    Frames { label: String, count: i64 },
    /// `time <label> <seconds> [repetitions]`
    Time {
        label: String,
        seconds: f64,
        repetitions: i64,
    },
    /// `condition <label> <ready_tick> [timeout_seconds]`
    ///
    /// The predicate holds once the scheduler's tick reaches `ready_tick`.
    Condition {
        label: String,
        ready_tick: SimTick,
        timeout: Option<f64>,
    },
    /// `stop <label>`
    Stop { label: String },
    /// `stop_all`
    StopAll,
}

impl WaitCommand {
    pub fn parse(command: &str) -> Result<Self> {
        let mut parts = command.split_whitespace();
        let verb = parts.next().context("empty command")?;
        let args: Vec<&str> = parts.collect();

        let parsed = match (verb, args.as_slice()) {
            ("frames", [label, count]) => WaitCommand::Frames {
                label: label.to_string(),
                count: count
                    .parse()
                    .with_context(|| format!("invalid frame count {count:?}"))?,
            },
            ("time", [label, seconds, rest @ ..]) if rest.len() <= 1 => WaitCommand::Time {
                label: label.to_string(),
                seconds: seconds
                    .parse()
                    .with_context(|| format!("invalid seconds {seconds:?}"))?,
                repetitions: match rest.first() {
                    Some(reps) => reps
                        .parse()
                        .with_context(|| format!("invalid repetitions {reps:?}"))?,
                    None => 1,
                },
            },
            ("condition", [label, ready, rest @ ..]) if rest.len() <= 1 => {
                WaitCommand::Condition {
                    label: label.to_string(),
                    ready_tick: SimTick(
                        ready
                            .parse()
                            .with_context(|| format!("invalid ready tick {ready:?}"))?,
                    ),
                    timeout: match rest.first() {
                        Some(timeout) => Some(
                            timeout
                                .parse()
                                .with_context(|| format!("invalid timeout {timeout:?}"))?,
                        ),
                        None => None,
                    },
                }
            }
            ("stop", [label]) => WaitCommand::Stop {
                label: label.to_string(),
            },
            ("stop_all", []) => WaitCommand::StopAll,
            _ => anyhow::bail!("unrecognized command {command:?}"),
        };
        Ok(parsed)
    }
}

#[derive(Debug, Clone)]
struct CommandScriptStep {
    tick: SimTick,
    command: WaitCommand,
}

/// Deterministic command script runner.
///
/// Scripts are a list of `{tick, command}` steps, executed in file order.
#[derive(Debug)]
pub struct CommandScriptPlayer {
    pending: VecDeque<CommandScriptStep>,
}

impl CommandScriptPlayer {
    /// Load a command script from a JSON file on disk.
    pub fn from_path(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read command script {}", path.display()))?;
        Self::from_str(&contents)
            .with_context(|| format!("invalid command script {}", path.display()))
    }

    /// Load a command script from an in-memory JSON string.
    pub fn from_str(contents: &str) -> Result<Self> {
        let file: CommandScriptFile = serde_json::from_str(contents)?;
        if file.steps.is_empty() {
            anyhow::bail!("command script contains no steps");
        }

        let mut pending = VecDeque::with_capacity(file.steps.len());
        let mut last_tick: Option<u64> = None;
        for (index, step) in file.steps.into_iter().enumerate() {
            if let Some(prev) = last_tick {
                if step.tick < prev {
                    anyhow::bail!("command script steps must be sorted by tick");
                }
            }
            last_tick = Some(step.tick);

            let command = WaitCommand::parse(step.command.trim())
                .with_context(|| format!("step {index} (tick {})", step.tick))?;
            pending.push_back(CommandScriptStep {
                tick: SimTick(step.tick),
                command,
            });
        }

        Ok(Self { pending })
    }

    /// Drain and return all commands scheduled for ticks `<= tick`.
    pub fn drain_ready_commands(&mut self, tick: SimTick) -> Vec<WaitCommand> {
        let mut commands = Vec::new();
        while self.pending.front().is_some_and(|step| step.tick <= tick) {
            if let Some(step) = self.pending.pop_front() {
                commands.push(step.command);
            }
        }
        commands
    }

    pub fn is_finished(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_script_rejects_unsorted_ticks() {
        let json = r#"{
            "steps": [
                {"tick": 2, "command": "stop_all"},
                {"tick": 1, "command": "stop_all"}
            ]
        }"#;
        let err = CommandScriptPlayer::from_str(json).unwrap_err();
        assert!(
            err.to_string().contains("sorted by tick"),
            "unexpected error: {err:#}"
        );
    }

    #[test]
    fn command_script_rejects_unknown_commands() {
        let json = r#"{"steps": [{"tick": 0, "command": "teleport a 1"}]}"#;
        let err = CommandScriptPlayer::from_str(json).unwrap_err();
        assert!(format!("{err:#}").contains("unrecognized command"));
    }

    #[test]
    fn parses_every_command_form() {
        assert_eq!(
            WaitCommand::parse("frames hello 60").unwrap(),
            WaitCommand::Frames {
                label: "hello".into(),
                count: 60
            }
        );
        assert_eq!(
            WaitCommand::parse("time beat 1.5").unwrap(),
            WaitCommand::Time {
                label: "beat".into(),
                seconds: 1.5,
                repetitions: 1
            }
        );
        assert_eq!(
            WaitCommand::parse("time beat 1 -1").unwrap(),
            WaitCommand::Time {
                label: "beat".into(),
                seconds: 1.0,
                repetitions: -1
            }
        );
        assert_eq!(
            WaitCommand::parse("condition rest 40 2").unwrap(),
            WaitCommand::Condition {
                label: "rest".into(),
                ready_tick: SimTick(40),
                timeout: Some(2.0)
            }
        );
        assert_eq!(
            WaitCommand::parse("stop beat").unwrap(),
            WaitCommand::Stop {
                label: "beat".into()
            }
        );
        assert_eq!(WaitCommand::parse("stop_all").unwrap(), WaitCommand::StopAll);
        assert!(WaitCommand::parse("frames hello").is_err());
        assert!(WaitCommand::parse("time beat soon").is_err());
        assert!(WaitCommand::parse("").is_err());
    }

    #[test]
    fn command_script_drains_in_order_and_is_deterministic() {
        let json = r#"{
            "steps": [
                {"tick": 1, "command": "frames a 1"},
                {"tick": 1, "command": "time b 2"},
                {"tick": 3, "command": "stop a"}
            ]
        }"#;
        let mut script = CommandScriptPlayer::from_str(json).expect("script should parse");

        assert!(script.drain_ready_commands(SimTick(0)).is_empty());
        let first = script.drain_ready_commands(SimTick(1));
        assert_eq!(first.len(), 2);
        assert!(matches!(first[0], WaitCommand::Frames { .. }));
        assert!(matches!(first[1], WaitCommand::Time { .. }));
        assert!(script.drain_ready_commands(SimTick(2)).is_empty());
        assert_eq!(
            script.drain_ready_commands(SimTick(3)),
            vec![WaitCommand::Stop { label: "a".into() }]
        );
        assert!(script.is_finished());
    }
}
