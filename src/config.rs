//! Configuração da linha carregada a partir de `linha.toml`.
//!
//! A struct [`LinhaConfig`] reúne a topologia, a política do painel e o
//! período do relógio. Valores ausentes no arquivo usam os defaults da
//! linha padrão. As variáveis de ambiente `LINHA_COUNTDOWN_SECS` e
//! `LINHA_TICK_MS` têm precedência sobre o arquivo.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

use crate::error::LinhaError;
use crate::state_machine::{Engine, Policy};
use crate::topology::{Topology, UnitSpec, standard_pairs, standard_units};

/// Nome do arquivo procurado no diretório atual.
pub const CONFIG_FILE: &str = "linha.toml";

/// Configuração de nível superior carregada de `linha.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct LinhaConfig {
    /// Período do relógio do painel em milissegundos.
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,

    /// Política do painel (temporização e variações de intertravamento).
    #[serde(default)]
    pub policy: Policy,

    /// Unidades da linha, da entrada para as saídas.
    #[serde(default = "standard_units")]
    pub units: Vec<UnitSpec>,

    /// Pares rígidos (unidades que sempre compartilham o modo).
    #[serde(default = "standard_pairs")]
    pub pairs: Vec<[String; 2]>,
}

// Valor padrão para o relógio: um tick por segundo.
fn default_tick_ms() -> u64 {
    1000
}

impl Default for LinhaConfig {
    fn default() -> Self {
        Self {
            tick_ms: default_tick_ms(),
            policy: Policy::default(),
            units: standard_units(),
            pairs: standard_pairs(),
        }
    }
}

impl LinhaConfig {
    /// Carrega a configuração de `linha.toml` no diretório atual.
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new(CONFIG_FILE))
    }

    /// Carrega a configuração do caminho indicado.
    /// Usa valores padrão se o arquivo não existir.
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            toml::from_str::<LinhaConfig>(&contents).map_err(LinhaError::from)?
        } else {
            Self::default()
        };

        config.apply_env(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Aplica as variáveis de ambiente sobre os valores do arquivo.
    ///
    /// Recebe a função de consulta para que os testes não precisem
    /// alterar o ambiente do processo.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), LinhaError> {
        if let Some(raw) = lookup("LINHA_COUNTDOWN_SECS")
            && !raw.is_empty()
        {
            self.policy.countdown_secs = raw
                .parse()
                .map_err(|_| LinhaError::Config(format!("LINHA_COUNTDOWN_SECS={raw} is not a number")))?;
        }
        if let Some(raw) = lookup("LINHA_TICK_MS")
            && !raw.is_empty()
        {
            self.tick_ms = raw
                .parse()
                .map_err(|_| LinhaError::Config(format!("LINHA_TICK_MS={raw} is not a number")))?;
        }
        Ok(())
    }

    /// Rejeita valores que travariam o painel.
    pub fn validate(&self) -> Result<(), LinhaError> {
        if self.policy.countdown_secs == 0 {
            return Err(LinhaError::Config("countdown_secs must be at least 1".into()));
        }
        if self.tick_ms == 0 {
            return Err(LinhaError::Config("tick_ms must be at least 1".into()));
        }
        Ok(())
    }

    /// Monta a topologia validada, pareando as esteiras de saída se a
    /// política pedir.
    pub fn topology(&self) -> Result<Topology, LinhaError> {
        let topology = Topology::build(&self.units, &self.pairs)?;
        Ok(if self.policy.pair_output_belts {
            topology.with_output_pair()
        } else {
            topology
        })
    }

    /// Cria o motor com a linha inteira desligada.
    pub fn engine(&self) -> Result<Engine, LinhaError> {
        Ok(Engine::new(self.topology()?, self.policy.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_machine::StartupPromotion;
    use std::io::Write;

    #[test]
    fn default_config_values() {
        let config = LinhaConfig::default();
        assert_eq!(config.tick_ms, 1000);
        assert_eq!(config.policy.countdown_secs, 2);
        assert_eq!(config.units.len(), 8);
        assert_eq!(config.pairs.len(), 1);
    }

    #[test]
    fn deserialize_partial_toml() {
        let toml_str = r#"
            tick_ms = 250

            [policy]
            countdown_secs = 3
            pair_output_belts = true
        "#;
        let config: LinhaConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.tick_ms, 250);
        assert_eq!(config.policy.countdown_secs, 3);
        assert_eq!(config.policy.startup_promotion, StartupPromotion::Direct);
        assert_eq!(config.units.len(), 8);

        let topology = config.topology().unwrap();
        let left = topology.id("esteiraEsquerda").unwrap();
        assert_eq!(topology.pair_of(left), topology.id("esteiraDireita"));
    }

    #[test]
    fn deserialize_custom_topology() {
        let toml_str = r#"
            pairs = []

            [[units]]
            key = "alimentador"
            downstream = ["britador"]

            [[units]]
            key = "britador"
            label = "Britador"
        "#;
        let config: LinhaConfig = toml::from_str(toml_str).unwrap();
        let topology = config.topology().unwrap();
        assert_eq!(topology.len(), 2);
        assert!(topology.pairs().is_empty());
        assert_eq!(topology.label(topology.id("alimentador").unwrap()), "alimentador");
    }

    #[test]
    fn env_overrides_file_values() {
        let mut config = LinhaConfig::default();
        config
            .apply_env(|name| match name {
                "LINHA_COUNTDOWN_SECS" => Some("3".into()),
                "LINHA_TICK_MS" => Some(String::new()),
                _ => None,
            })
            .unwrap();
        assert_eq!(config.policy.countdown_secs, 3);
        assert_eq!(config.tick_ms, 1000);

        let err = config
            .apply_env(|_| Some("soon".into()))
            .unwrap_err();
        assert!(err.to_string().contains("LINHA_COUNTDOWN_SECS"));
    }

    #[test]
    fn zero_countdown_is_rejected() {
        let mut config = LinhaConfig::default();
        config.policy.countdown_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn load_reads_file_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[policy]\ncountdown_secs = 3").unwrap();
        let config = LinhaConfig::load_from(file.path()).unwrap();
        assert_eq!(config.policy.countdown_secs, 3);
        assert_eq!(config.engine().unwrap().topology().len(), 8);
    }

    #[test]
    fn load_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = LinhaConfig::load_from(&dir.path().join(CONFIG_FILE)).unwrap();
        assert_eq!(config.units.len(), 8);
    }

    #[test]
    fn load_reports_bad_topology() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[[units]]\nkey = \"a\"\ndownstream = [\"b\"]").unwrap();
        let config = LinhaConfig::load_from(file.path()).unwrap();
        assert!(config.topology().is_err());
    }
}
