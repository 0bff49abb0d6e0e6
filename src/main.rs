mod cli;

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, watch};
use tokio::time::sleep;

use cli::{Cli, Command};
use linha::Rejection;
use linha::config::LinhaConfig;
use linha::driver::{LineDriver, PanelCommand};
use linha::state_machine::{Engine, GroupMode, StateImage};
use linha::ui::PanelView;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    linha::logging::init(cli.verbose);

    let mut config = match &cli.config {
        Some(path) => LinhaConfig::load_from(path)?,
        None => LinhaConfig::load()?,
    };
    if let Some(secs) = cli.countdown {
        config.policy.countdown_secs = secs;
        config.validate()?;
    }

    match cli.command {
        Command::Run { state } => run(&config, state.as_deref()).await,
        Command::Demo => demo(&config).await,
        Command::Topology => {
            PanelView::new().print_topology(&config.topology()?);
            Ok(())
        }
        Command::Snapshot { state } => {
            let mut engine = load_engine(&config, state.as_deref())?;
            engine.tick();
            println!("{}", serde_json::to_string_pretty(&engine.snapshot())?);
            Ok(())
        }
    }
}

fn load_engine(config: &LinhaConfig, state: Option<&Path>) -> Result<Engine> {
    let Some(path) = state else {
        return Ok(config.engine()?);
    };
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let image: StateImage = serde_json::from_str(&contents)
        .with_context(|| format!("parsing {}", path.display()))?;
    Ok(Engine::restore(config.topology()?, config.policy.clone(), &image)?)
}

async fn run(config: &LinhaConfig, state: Option<&Path>) -> Result<()> {
    let engine = load_engine(config, state)?;
    let driver = LineDriver::new(engine, Duration::from_millis(config.tick_ms));
    let (tx, rx) = mpsc::channel(16);
    let (snap_tx, mut snap_rx) = watch::channel(driver.engine().snapshot());
    let driver_task = tokio::spawn(driver.run(rx, snap_tx));

    let render = tokio::spawn(async move {
        let mut view = PanelView::new();
        let first = snap_rx.borrow_and_update().clone();
        view.show(&first);
        while snap_rx.changed().await.is_ok() {
            let snapshot = snap_rx.borrow_and_update().clone();
            view.show(&snapshot);
        }
    });

    let view = PanelView::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        match line.parse::<PanelCommand>() {
            Ok(command) => {
                let quit = command == PanelCommand::Quit;
                if tx.send(command).await.is_err() || quit {
                    break;
                }
            }
            Err(err) => view.rejected(&err.to_string()),
        }
    }

    drop(tx);
    let engine = driver_task.await?;
    render.await?;
    let image = StateImage::from(&engine.snapshot());
    println!("{}", serde_json::to_string_pretty(&image)?);
    Ok(())
}

async fn demo(config: &LinhaConfig) -> Result<()> {
    let mut engine = config.engine()?;
    let mut view = PanelView::new();
    let pause = Duration::from_millis(config.tick_ms.min(250));

    println!("\n1. Partida em grupo");
    report(&view, engine.set_group_mode(GroupMode::Auto));
    report(&view, engine.group_power_on());
    run_out(&mut engine, &mut view, pause).await;

    println!("\n2. Parada em grupo");
    report(&view, engine.group_power_off());
    run_out(&mut engine, &mut view, pause).await;

    println!("\n3. Comando individual recusado em modo AUTO");
    report(&view, engine.toggle_unit("separador"));

    println!("\n4. Defeito no moinho A com a linha ligada em modo MANU");
    report(&view, engine.set_group_mode(GroupMode::Manual));
    let keys: Vec<String> = engine
        .snapshot()
        .units
        .into_iter()
        .map(|u| u.key)
        .collect();
    for key in &keys {
        if !engine.snapshot().mode(key).is_some_and(|m| m.is_on()) {
            report(&view, engine.toggle_unit(key));
        }
    }
    view.show(&engine.snapshot());
    report(&view, engine.toggle_defect("millA"));
    view.show(&engine.snapshot());

    println!("\n5. Defeito liberado");
    report(&view, engine.toggle_defect("millA"));
    view.show(&engine.snapshot());
    Ok(())
}

async fn run_out(engine: &mut Engine, view: &mut PanelView, pause: Duration) {
    view.show(&engine.snapshot());
    while engine.line().has_timers() || engine.line().run().is_running() {
        sleep(pause).await;
        engine.tick();
        view.show(&engine.snapshot());
    }
}

fn report(view: &PanelView, result: Result<(), Rejection>) {
    if let Err(rejection) = result {
        view.rejected(&rejection.to_string());
    }
}
