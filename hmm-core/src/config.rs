//! # Configuração do Modelo
//!
//! Os ajustes de um modelo são passados explicitamente na construção, para que
//! vários modelos convivam no mesmo processo. O formato em disco é JSON; todo
//! campo ausente assume o valor padrão.
//!
//! ```json
//! {
//!   "emitter": "bigram",
//!   "training": "tolerant",
//!   "record_margin": true,
//!   "k_best": false,
//!   "cacheable_tags": ["PER", "ORG", "LOC"],
//!   "tag_bias": { "O": 0.5 }
//! }
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::emission::EmitterKind;
use crate::error::Result;
use crate::trainer::TrainingMode;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HmmConfig {
    /// Modelo de emissão dos estados criados por este modelo.
    pub emitter: EmitterKind,
    pub training: TrainingMode,
    /// Registrar a margem global a cada decodificação.
    pub record_margin: bool,
    /// Preparar o gerador de k melhores caminhos a cada decodificação.
    pub k_best: bool,
    /// Tags cujas decisões entram no cache de nomes.
    pub cacheable_tags: Vec<String>,
    /// Viés aditivo (log) por tag, somado à emissão.
    pub tag_bias: BTreeMap<String, f64>,
}

impl HmmConfig {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_json(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_for_missing_fields() {
        let config = HmmConfig::from_json("{}").unwrap();
        assert_eq!(config, HmmConfig::default());
        assert_eq!(config.emitter, EmitterKind::Shape);
        assert_eq!(config.training, TrainingMode::Strict);
    }

    #[test]
    fn test_full_config() {
        let config = HmmConfig::from_json(
            r#"{"emitter":"bigram","training":"tolerant","record_margin":true,
                "cacheable_tags":["PER"],"tag_bias":{"O":0.5}}"#,
        )
        .unwrap();
        assert_eq!(config.emitter, EmitterKind::Bigram);
        assert_eq!(config.training, TrainingMode::Tolerant);
        assert!(config.record_margin);
        assert!(!config.k_best);
        assert_eq!(config.cacheable_tags, vec!["PER"]);
        assert_eq!(config.tag_bias.get("O"), Some(&0.5));
    }

    #[test]
    fn test_invalid_json() {
        assert!(HmmConfig::from_json(r#"{"emitter":"trigram"}"#).is_err());
    }
}
