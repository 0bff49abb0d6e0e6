//! Interface de terminal do painel: cores e spinner de cascata.
//!
//! Usa a crate `console` para colorir o modo de cada unidade e a crate
//! `indicatif` para um spinner enquanto uma partida ou parada em cascata
//! está em andamento. Só lê [`Snapshot`]s; nunca altera o motor.

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::state_machine::{Mode, RunKind, Snapshot};
use crate::topology::Topology;

/// Renderizador do painel no terminal.
pub struct PanelView {
    // Verde para unidades em MANUAL.
    green: Style,
    // Ciano para unidades em AUTO.
    cyan: Style,
    // Vermelho para unidades em DEFEITO.
    red: Style,
    // Esmaecido para unidades desligadas.
    dim: Style,
    // Amarelo para contagens regressivas.
    yellow: Style,
    // Spinner ativo durante uma cascata, se houver.
    spinner: Option<ProgressBar>,
}

impl Default for PanelView {
    fn default() -> Self {
        Self::new()
    }
}

impl PanelView {
    pub fn new() -> Self {
        Self {
            green: Style::new().green().bold(),
            cyan: Style::new().cyan(),
            red: Style::new().red().bold(),
            dim: Style::new().dim(),
            yellow: Style::new().yellow(),
            spinner: None,
        }
    }

    fn mode_style(&self, mode: Mode) -> &Style {
        match mode {
            Mode::Manual => &self.green,
            Mode::Auto => &self.cyan,
            Mode::Defect => &self.red,
            Mode::Off => &self.dim,
        }
    }

    /// Monta as linhas do painel, uma por unidade, mais o cabeçalho.
    pub fn render_lines(&self, snapshot: &Snapshot) -> Vec<String> {
        let mut lines = vec![format!(
            "── grupo {} · cascata {} ──",
            snapshot.group_mode, snapshot.run
        )];
        for unit in &snapshot.units {
            let timer = unit
                .remaining_secs
                .map(|secs| format!(" {}", self.yellow.apply_to(format!("⏱ {secs}s"))))
                .unwrap_or_default();
            lines.push(format!(
                "  {:<18} {:<22} {}{timer}",
                unit.key,
                unit.label,
                self.mode_style(unit.mode).apply_to(format!("{:<7}", unit.mode.to_string())),
            ));
        }
        lines
    }

    /// Imprime o painel e liga ou desliga o spinner conforme a cascata.
    pub fn show(&mut self, snapshot: &Snapshot) {
        self.update_spinner(snapshot.run);
        let lines = self.render_lines(snapshot);
        match &self.spinner {
            Some(pb) => lines.iter().for_each(|line| pb.println(line)),
            None => lines.iter().for_each(|line| println!("{line}")),
        }
    }

    fn update_spinner(&mut self, run: RunKind) {
        if run == RunKind::Idle {
            if let Some(pb) = self.spinner.take() {
                pb.finish_and_clear();
            }
            return;
        }

        let message = format!("{run} em andamento");
        if let Some(pb) = &self.spinner {
            pb.set_message(message);
            return;
        }
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg}")
                .expect("invalid template"),
        );
        pb.enable_steady_tick(std::time::Duration::from_millis(100));
        pb.set_message(message);
        self.spinner = Some(pb);
    }

    /// Imprime uma mensagem de comando recusado em amarelo.
    pub fn rejected(&self, message: &str) {
        println!("  {} {message}", self.yellow.apply_to("✗"));
    }

    /// Imprime a topologia: adjacência e pares.
    pub fn print_topology(&self, topology: &Topology) {
        println!("{}", self.green.apply_to("─── Topologia ───"));
        for id in topology.ids() {
            let downstream: Vec<&str> = topology
                .immediate_downstream(id)
                .iter()
                .map(|&d| topology.key(d))
                .collect();
            let pair = topology
                .pair_of(id)
                .map(|p| format!("  (par: {})", topology.key(p)))
                .unwrap_or_default();
            println!(
                "  {:<18} → {}{pair}",
                topology.key(id),
                if downstream.is_empty() {
                    "saída".to_string()
                } else {
                    downstream.join(", ")
                }
            );
        }
    }
}
