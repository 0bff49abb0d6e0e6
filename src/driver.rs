use std::str::FromStr;
use std::time::Duration;

use anyhow::{Result, bail};
use tokio::sync::{mpsc, watch};
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info};

use crate::error::Rejection;
use crate::state_machine::{Engine, GroupMode, Snapshot, TickReport};

/// An operator intent delivered to the driving loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PanelCommand {
    ToggleUnit(String),
    ToggleDefect(String),
    SetGroupMode(GroupMode),
    PowerOn,
    PowerOff,
    Quit,
}

impl FromStr for PanelCommand {
    type Err = anyhow::Error;

    /// Parse one panel line: `toggle <key>`, `defect <key>`,
    /// `mode auto|manu`, `on`, `off` or `quit`.
    fn from_str(line: &str) -> Result<Self> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            bail!("empty command");
        };
        let arg = words.next();
        if words.next().is_some() {
            bail!("too many arguments: {line}");
        }

        let command = match (verb.to_ascii_lowercase().as_str(), arg) {
            ("toggle", Some(key)) => PanelCommand::ToggleUnit(key.to_string()),
            ("defect", Some(key)) => PanelCommand::ToggleDefect(key.to_string()),
            ("mode", Some(mode)) => match mode.to_ascii_lowercase().as_str() {
                "auto" => PanelCommand::SetGroupMode(GroupMode::Auto),
                "manu" | "manual" => PanelCommand::SetGroupMode(GroupMode::Manual),
                other => bail!("unknown group mode: {other}"),
            },
            ("on", None) => PanelCommand::PowerOn,
            ("off", None) => PanelCommand::PowerOff,
            ("quit" | "exit", None) => PanelCommand::Quit,
            _ => bail!("unrecognized command: {line}"),
        };
        Ok(command)
    }
}

/// Owns the engine and serializes ticks with operator commands.
pub struct LineDriver {
    engine: Engine,
    period: Duration,
}

impl LineDriver {
    pub fn new(engine: Engine, period: Duration) -> Self {
        Self { engine, period }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Apply one command to the engine. `Quit` is handled by [`Self::run`].
    pub fn apply(&mut self, command: &PanelCommand) -> Result<(), Rejection> {
        match command {
            PanelCommand::ToggleUnit(key) => self.engine.toggle_unit(key),
            PanelCommand::ToggleDefect(key) => self.engine.toggle_defect(key),
            PanelCommand::SetGroupMode(mode) => self.engine.set_group_mode(*mode),
            PanelCommand::PowerOn => self.engine.group_power_on(),
            PanelCommand::PowerOff => self.engine.group_power_off(),
            PanelCommand::Quit => Ok(()),
        }
    }

    pub fn tick(&mut self) -> TickReport {
        let report = self.engine.tick();
        if let Some(run) = report.finished {
            info!(%run, "Run complete");
        }
        report
    }

    /// Drive the line until `Quit` arrives or every sender is gone.
    ///
    /// Each period fires one tick; commands are applied between ticks, never
    /// during one. A fresh snapshot is published whenever something changed.
    pub async fn run(
        mut self,
        mut commands: mpsc::Receiver<PanelCommand>,
        snapshots: watch::Sender<Snapshot>,
    ) -> Engine {
        let mut clock = interval(self.period);
        clock.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick of a tokio interval completes immediately.
        clock.tick().await;

        snapshots.send_replace(self.engine.snapshot());
        loop {
            tokio::select! {
                _ = clock.tick() => {
                    let report = self.tick();
                    if !report.is_quiet() || self.engine.line().has_timers() {
                        snapshots.send_replace(self.engine.snapshot());
                    }
                }
                command = commands.recv() => {
                    let Some(command) = command else { break };
                    if command == PanelCommand::Quit {
                        break;
                    }
                    match self.apply(&command) {
                        Ok(()) => {
                            snapshots.send_replace(self.engine.snapshot());
                        }
                        Err(rejection) => debug!(?command, %rejection, "Panel command ignored"),
                    }
                }
            }
        }
        info!("Driver stopped");
        self.engine
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_machine::{Mode, Policy, RunKind};
    use crate::topology::Topology;

    fn driver(countdown_secs: u32) -> LineDriver {
        let policy = Policy {
            countdown_secs,
            ..Policy::default()
        };
        let engine = Engine::new(Topology::standard(), policy);
        LineDriver::new(engine, Duration::from_millis(5))
    }

    #[test]
    fn parses_panel_lines() {
        assert_eq!(
            "toggle millA".parse::<PanelCommand>().unwrap(),
            PanelCommand::ToggleUnit("millA".into())
        );
        assert_eq!(
            "defect separador".parse::<PanelCommand>().unwrap(),
            PanelCommand::ToggleDefect("separador".into())
        );
        assert_eq!(
            "MODE Auto".parse::<PanelCommand>().unwrap(),
            PanelCommand::SetGroupMode(GroupMode::Auto)
        );
        assert_eq!(
            "mode manu".parse::<PanelCommand>().unwrap(),
            PanelCommand::SetGroupMode(GroupMode::Manual)
        );
        assert_eq!("on".parse::<PanelCommand>().unwrap(), PanelCommand::PowerOn);
        assert_eq!("  off ".parse::<PanelCommand>().unwrap(), PanelCommand::PowerOff);
        assert_eq!("quit".parse::<PanelCommand>().unwrap(), PanelCommand::Quit);
    }

    #[test]
    fn rejects_malformed_lines() {
        assert!("".parse::<PanelCommand>().is_err());
        assert!("toggle".parse::<PanelCommand>().is_err());
        assert!("on now".parse::<PanelCommand>().is_err());
        assert!("mode turbo".parse::<PanelCommand>().is_err());
        assert!("toggle a b".parse::<PanelCommand>().is_err());
    }

    #[test]
    fn apply_routes_to_engine() {
        let mut d = driver(1);
        d.apply(&PanelCommand::ToggleUnit("separador".into())).unwrap();
        assert_eq!(d.engine().snapshot().mode("separador"), Some(Mode::Manual));
        assert!(d.apply(&PanelCommand::PowerOn).is_err());
        d.apply(&PanelCommand::Quit).unwrap();
    }

    #[tokio::test]
    async fn drives_startup_to_completion() {
        let d = driver(1);
        let (tx, rx) = mpsc::channel(8);
        let (snap_tx, mut snap_rx) = watch::channel(d.engine().snapshot());
        let handle = tokio::spawn(d.run(rx, snap_tx));

        tx.send(PanelCommand::SetGroupMode(GroupMode::Auto)).await.unwrap();
        tx.send(PanelCommand::PowerOn).await.unwrap();

        let settled = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                snap_rx.changed().await.unwrap();
                let snap = snap_rx.borrow_and_update().clone();
                if snap.run == RunKind::Idle && snap.mode("esteiraMain") == Some(Mode::Manual) {
                    break snap;
                }
            }
        })
        .await
        .unwrap();
        assert!(settled.units.iter().all(|u| u.mode.is_on()));

        tx.send(PanelCommand::Quit).await.unwrap();
        let engine = handle.await.unwrap();
        assert!(!engine.line().has_timers());
    }

    #[tokio::test]
    async fn stops_when_senders_drop() {
        let d = driver(1);
        let (tx, rx) = mpsc::channel(1);
        let (snap_tx, _snap_rx) = watch::channel(d.engine().snapshot());
        drop(tx);
        let engine = d.run(rx, snap_tx).await;
        assert!(!engine.line().any_on());
    }
}
