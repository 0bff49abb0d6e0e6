//! Interface de linha de comando do painel baseada em clap.
//!
//! Define a struct [`Cli`] com subcomandos [`Command`] (run, demo,
//! topology, snapshot) e flags globais (--config, --countdown, --verbose).

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// LINHA: motor de intertravamento e cascata da linha de moagem.
#[derive(Debug, Parser)]
#[command(name = "linha", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Caminho do arquivo de configuração (padrão: `linha.toml`).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Segundos por camada da cascata, sobrepondo a configuração.
    #[arg(long, global = true)]
    pub countdown: Option<u32>,

    /// Habilita saída detalhada (verbose).
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Executa o painel ao vivo, lendo comandos da entrada padrão.
    Run {
        /// Estado salvo (JSON) para retomar a linha.
        #[arg(long)]
        state: Option<PathBuf>,
    },

    /// Executa a demonstração roteirizada: partida, defeito e parada.
    Demo,

    /// Mostra as unidades, a adjacência e os pares da linha.
    Topology,

    /// Imprime o snapshot JSON após um tick.
    Snapshot {
        /// Estado salvo (JSON) a ser carregado antes do tick.
        #[arg(long)]
        state: Option<PathBuf>,
    },
}
