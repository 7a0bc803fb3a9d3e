use crate::command_script::{CommandScriptPlayer, WaitCommand};
use crate::config::DriverConfig;
use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use tabletop_core::{ClockSource, FixedStepClock, SimTick};
use tabletop_scripting::{TaskId, TickReport, Timeout, Wait};
use tabletop_testkit::{EventRecord, JsonlSink};
use tracing::{debug, info, warn};

pub struct HeadlessConfig {
    pub script: PathBuf,
    pub driver: DriverConfig,
}

/// Totals printed when a run ends.
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub ticks: u64,
    pub fired: usize,
    pub timed_out: usize,
    pub stopped: usize,
    pub rejected: usize,
    pub faults: usize,
    pub pending: usize,
}

pub fn run(cfg: HeadlessConfig) -> Result<RunSummary> {
    cfg.driver
        .wait
        .validate()
        .context("invalid [wait] configuration")?;
    let mut script = CommandScriptPlayer::from_path(&cfg.script)?;
    let mut events = match cfg.driver.event_log.as_deref() {
        Some(path) => Some(
            JsonlSink::create(path)
                .with_context(|| format!("failed to create event log {}", path.display()))?,
        ),
        None => None,
    };

    let wait = Wait::with_config(cfg.driver.wait.clone());
    let mut clock = FixedStepClock::new(cfg.driver.ticks_per_second);
    let mut driver = ScriptDriver::new(wait);

    // Tick-0 steps register before the first evaluation.
    for command in script.drain_ready_commands(SimTick::ZERO) {
        driver.apply(SimTick::ZERO, command, events.as_mut())?;
    }

    while clock.frame().0 < cfg.driver.max_ticks {
        if script.is_finished() && driver.wait.pending_count() == 0 {
            break;
        }
        let report = driver.wait.advance(&mut clock);
        driver.record_report(&report, events.as_mut())?;
        for command in script.drain_ready_commands(report.tick) {
            driver.apply(report.tick, command, events.as_mut())?;
        }
    }

    if clock.frame().0 >= cfg.driver.max_ticks && driver.wait.pending_count() > 0 {
        warn!(
            max_ticks = cfg.driver.max_ticks,
            pending = driver.wait.pending_count(),
            "Stopping at tick limit with tasks still pending"
        );
    }
    if let Some(sink) = events.as_mut() {
        sink.flush()?;
    }

    driver.summary.ticks = clock.frame().0;
    driver.summary.pending = driver.wait.pending_count();
    info!(summary = ?driver.summary, "Headless run finished");
    Ok(driver.summary)
}

/// Applies script commands to a scheduler and turns tick reports into events.
struct ScriptDriver {
    wait: Wait,
    labels: HashMap<TaskId, String>,
    ids: HashMap<String, TaskId>,
    summary: RunSummary,
}

impl ScriptDriver {
    fn new(wait: Wait) -> Self {
        Self {
            wait,
            labels: HashMap::new(),
            ids: HashMap::new(),
            summary: RunSummary::default(),
        }
    }

    fn apply(
        &mut self,
        tick: SimTick,
        command: WaitCommand,
        mut events: Option<&mut JsonlSink>,
    ) -> Result<()> {
        debug!(%tick, ?command, "Applying script command");
        let scheduled = match command {
            WaitCommand::Frames { label, count } => {
                let result = self.wait.frames(announce(&label), count);
                (label, result)
            }
            WaitCommand::Time {
                label,
                seconds,
                repetitions,
            } => {
                let result = self.wait.time(announce(&label), seconds, repetitions);
                (label, result)
            }
            WaitCommand::Condition {
                label,
                ready_tick,
                timeout,
            } => {
                let probe = self.wait.downgrade();
                let predicate = move || {
                    probe
                        .upgrade()
                        .is_some_and(|wait| wait.current_tick() >= ready_tick)
                };
                let result = match timeout {
                    Some(seconds) => {
                        let name = label.clone();
                        self.wait.condition_with_timeout(
                            announce(&label),
                            predicate,
                            Timeout::after(seconds)
                                .then(move || info!(label = %name, "Wait condition gave up")),
                        )
                    }
                    None => Ok(self.wait.condition(announce(&label), predicate)),
                };
                (label, result)
            }
            WaitCommand::Stop { label } => {
                let stopped = match self.ids.get(&label) {
                    Some(id) => match self.wait.try_stop(*id) {
                        Ok(()) => true,
                        Err(err) => {
                            debug!(%label, %err, "Task already finished");
                            false
                        }
                    },
                    None => false,
                };
                if stopped {
                    self.summary.stopped += 1;
                    let task = self.ids.remove(&label);
                    if let Some(id) = task {
                        self.labels.remove(&id);
                    }
                    write_event(events.as_deref_mut(), tick, "stopped", &label, task)?;
                } else {
                    debug!(%label, "stop had nothing to cancel");
                    write_event(events.as_deref_mut(), tick, "stop_missed", &label, None)?;
                }
                return Ok(());
            }
            WaitCommand::StopAll => {
                let pending = self.wait.pending_count();
                self.wait.stop_all();
                self.summary.stopped += pending;
                self.labels.clear();
                self.ids.clear();
                write_event(events.as_deref_mut(), tick, "stop_all", "*", None)?;
                return Ok(());
            }
        };

        match scheduled {
            (label, Ok(id)) => {
                write_event(events.as_deref_mut(), tick, "scheduled", &label, Some(id))?;
                self.labels.insert(id, label.clone());
                self.ids.insert(label, id);
            }
            (label, Err(err)) => {
                warn!(%label, %err, "Script command rejected");
                self.summary.rejected += 1;
                write_event(events.as_deref_mut(), tick, "rejected", &label, None)?;
            }
        }
        Ok(())
    }

    fn record_report(
        &mut self,
        report: &TickReport,
        mut events: Option<&mut JsonlSink>,
    ) -> Result<()> {
        for id in &report.fired {
            self.summary.fired += 1;
            let label = self.label_of(*id);
            write_event(events.as_deref_mut(), report.tick, "fired", &label, Some(*id))?;
        }
        for id in &report.timed_out {
            self.summary.timed_out += 1;
            let label = self.label_of(*id);
            write_event(events.as_deref_mut(), report.tick, "timed_out", &label, Some(*id))?;
        }
        for fault in &report.faults {
            self.summary.faults += 1;
            let label = self.label_of(fault.task);
            write_event(events.as_deref_mut(), report.tick, "fault", &label, Some(fault.task))?;
        }

        // Forget labels of tasks that are no longer pending.
        let wait = &self.wait;
        self.labels.retain(|id, _| wait.is_pending(*id));
        let labels = &self.labels;
        self.ids.retain(|_, id| labels.contains_key(id));
        Ok(())
    }

    fn label_of(&self, id: TaskId) -> String {
        self.labels
            .get(&id)
            .cloned()
            .unwrap_or_else(|| format!("task-{id}"))
    }
}

fn announce(label: &str) -> impl FnMut() + 'static {
    let label = label.to_string();
    move || info!(%label, "Wait task fired")
}

fn write_event(
    sink: Option<&mut JsonlSink>,
    tick: SimTick,
    kind: &str,
    label: &str,
    task: Option<TaskId>,
) -> Result<()> {
    if let Some(sink) = sink {
        sink.write(&EventRecord {
            tick,
            kind,
            label,
            task: task.map(|id| id.0),
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("tabletop-headless-{}-{name}", std::process::id()))
    }

    #[test]
    fn run_replays_script_and_stops_when_idle() {
        let script = temp_path("script.json");
        let log = temp_path("events.jsonl");
        fs::write(
            &script,
            r#"{"steps": [
                {"tick": 0, "command": "frames hello 3"},
                {"tick": 0, "command": "time beat 0.5 2"},
                {"tick": 0, "command": "time goodbye 10"},
                {"tick": 1, "command": "stop goodbye"},
                {"tick": 2, "command": "condition rest 6 100"},
                {"tick": 2, "command": "time bad -1"}
            ]}"#,
        )
        .unwrap();

        let summary = run(HeadlessConfig {
            script: script.clone(),
            driver: DriverConfig {
                ticks_per_second: 4,
                event_log: Some(log.clone()),
                ..DriverConfig::default()
            },
        })
        .unwrap();

        assert_eq!(summary.fired, 4);
        assert_eq!(summary.stopped, 1);
        assert_eq!(summary.rejected, 1);
        assert_eq!(summary.timed_out, 0);
        assert_eq!(summary.pending, 0);
        assert_eq!(summary.ticks, 6);

        let contents = fs::read_to_string(&log).unwrap();
        let fired: Vec<serde_json::Value> = contents
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .filter(|event: &serde_json::Value| event["kind"] == "fired")
            .collect();
        let labels: Vec<_> = fired
            .iter()
            .map(|event| {
                (
                    event["tick"].as_u64().unwrap(),
                    event["label"].as_str().unwrap().to_string(),
                )
            })
            .collect();
        assert_eq!(
            labels,
            vec![
                (2, "beat".to_string()),
                (3, "hello".to_string()),
                (4, "beat".to_string()),
                (6, "rest".to_string()),
            ]
        );

        let _ = fs::remove_file(&script);
        let _ = fs::remove_file(&log);
    }

    #[test]
    fn run_honours_tick_limit() {
        let script = temp_path("forever.json");
        fs::write(
            &script,
            r#"{"steps": [{"tick": 0, "command": "time loop 0.25 -1"}]}"#,
        )
        .unwrap();
        let summary = run(HeadlessConfig {
            script: script.clone(),
            driver: DriverConfig {
                ticks_per_second: 4,
                max_ticks: 8,
                ..DriverConfig::default()
            },
        })
        .unwrap();
        assert_eq!(summary.ticks, 8);
        assert_eq!(summary.fired, 8);
        assert_eq!(summary.pending, 1);
        let _ = fs::remove_file(&script);
    }
}
