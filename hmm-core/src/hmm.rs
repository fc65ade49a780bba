//! # Hidden Markov Model (HMM) — o Motor de Etiquetagem
//!
//! O HMM modela uma sentença como uma cadeia de **estados ocultos**, cada um
//! emitindo um token observado. A mesma máquina serve a vários etiquetadores
//! (classes gramaticais, nomes próprios...), que diferem apenas na topologia
//! e no modelo de emissão de cada estado.
//!
//! ## Fases
//!
//! ```text
//! Training ──finalize──▶ Ready
//!    ▲                     │
//!    └─reset_for_training──┘
//! ```
//!
//! - **Training**: construir a topologia e acumular contagens (`train`).
//! - **Ready**: probabilidades calculadas; `decode`, margens e k-best.
//!
//! Operações fora da fase devolvem [`HmmError::WrongPhase`].
//!
//! ## Componentes
//!
//! $$ P(\text{estados}, \text{tokens}) = \prod_i P(s_i \mid s_{i-1}) \cdot P(w_i \mid s_i) $$
//!
//! - Transições: [`crate::topology`]
//! - Emissões: [`crate::emission`]
//! - Decodificação e margens: [`crate::viterbi`]
//! - Caminhos alternativos: [`crate::kbest`]
//! - Consistência de nomes no documento: [`crate::cache`]

use serde::Serialize;

use crate::cache::NameCache;
use crate::config::HmmConfig;
use crate::corpus::Document;
use crate::error::{HmmError, Result};
use crate::kbest::{KBestPaths, RankedPath};
use crate::tagset::ExclusionConstraint;
use crate::tokenizer::Token;
use crate::topology::{FeatureConstraint, StateId, Topology};
use crate::trainer::{self, TrainingMode};
use crate::viterbi::{DecodeOptions, Decoder};

/// Fase do ciclo de vida do modelo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Phase {
    Training,
    Ready,
}

/// Resultado de uma decodificação bem-sucedida.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Decoded {
    /// Estados do caminho, incluindo `start` e `end`.
    pub states: Vec<StateId>,
    /// Uma tag por token.
    pub tags: Vec<String>,
    /// Log-probabilidade do caminho.
    pub score: f64,
    /// Margem global, quando registrada.
    pub margin: Option<f64>,
}

/// Resumo do treino sobre um corpus.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TrainingReport {
    pub sentences: usize,
    pub trained: usize,
    /// (documento, sentença, motivo)
    pub failures: Vec<(usize, usize, String)>,
}

/// O modelo completo: topologia, cache, configuração e estado da última decodificação.
#[derive(Debug, Clone)]
pub struct HmmModel {
    topology: Topology,
    cache: NameCache,
    config: HmmConfig,
    phase: Phase,
    margin: Option<f64>,
    k_best: Option<KBestPaths>,
}

impl Default for HmmModel {
    fn default() -> Self {
        Self::new(HmmConfig::default())
    }
}

impl HmmModel {
    pub fn new(config: HmmConfig) -> Self {
        Self {
            topology: Topology::new(config.emitter),
            cache: NameCache::new(&config.cacheable_tags),
            config,
            phase: Phase::Training,
            margin: None,
            k_best: None,
        }
    }

    fn require(&self, phase: Phase, operation: &'static str) -> Result<()> {
        if self.phase == phase {
            Ok(())
        } else {
            Err(HmmError::WrongPhase {
                operation,
                phase: self.phase,
            })
        }
    }

    fn lookup(&self, name: &str) -> Result<StateId> {
        self.topology
            .id(name)
            .ok_or_else(|| HmmError::UnknownState(name.to_string()))
    }

    // ─── Topologia ────────────────────────────────────────────────────────

    pub fn add_state(&mut self, name: &str, tag: &str) -> Result<StateId> {
        self.require(Phase::Training, "add_state")?;
        self.topology.add_state(name, tag)
    }

    /// Declara `from -> to`; `to` pode ainda não existir.
    pub fn add_transition(&mut self, from: &str, to: &str) -> Result<()> {
        self.require(Phase::Training, "add_transition")?;
        let from = self.lookup(from)?;
        self.topology.add_transition(from, to, 0.0)
    }

    pub fn set_feature(&mut self, state: &str, constraint: FeatureConstraint) -> Result<()> {
        self.require(Phase::Training, "set_feature")?;
        let id = self.lookup(state)?;
        self.topology.state_mut(id).feature = Some(constraint);
        Ok(())
    }

    /// Resolve os nomes das transições declaradas.
    pub fn resolve(&mut self) -> Result<()> {
        self.topology.resolve()
    }

    /// Resolve se necessário; destinos desconhecidos já foram descartados e
    /// registrados no log pela própria topologia.
    fn ensure_resolved(&mut self) {
        if !self.topology.is_resolved() {
            if let Err(err) = self.topology.resolve() {
                tracing::warn!(%err, "topologia resolvida com descartes");
            }
        }
    }

    // ─── Treino ───────────────────────────────────────────────────────────

    /// Zera todas as contagens e volta à fase de treino.
    pub fn reset_for_training(&mut self) {
        self.topology.reset_counts();
        self.cache.clear();
        self.phase = Phase::Training;
        self.margin = None;
        self.k_best = None;
    }

    /// Treina uma sentença com o algoritmo configurado.
    pub fn train(&mut self, tokens: &[Token], tags: &[String]) -> Result<()> {
        match self.config.training {
            TrainingMode::Strict => self.train_strict(tokens, tags),
            TrainingMode::Tolerant => self.train_tolerant(tokens, tags),
        }
    }

    pub fn train_strict(&mut self, tokens: &[Token], tags: &[String]) -> Result<()> {
        self.train_with(TrainingMode::Strict, tokens, tags)
    }

    pub fn train_tolerant(&mut self, tokens: &[Token], tags: &[String]) -> Result<()> {
        self.train_with(TrainingMode::Tolerant, tokens, tags)
    }

    fn train_with(&mut self, mode: TrainingMode, tokens: &[Token], tags: &[String]) -> Result<()> {
        self.require(Phase::Training, "train")?;
        if tokens.len() != tags.len() {
            return Err(HmmError::LengthMismatch {
                tokens: tokens.len(),
                tags: tags.len(),
            });
        }
        self.ensure_resolved();
        let result = match mode {
            TrainingMode::Strict => {
                trainer::train_strict(&mut self.topology, &mut self.cache, tokens, tags)
            }
            TrainingMode::Tolerant => {
                trainer::train_tolerant(&mut self.topology, &mut self.cache, tokens, tags)
            }
        };
        if let Err(err) = &result {
            tracing::warn!(?mode, %err, "sentença descartada do treino");
        }
        result
    }

    /// Treina um corpus inteiro, limpando o cache a cada documento.
    ///
    /// Sentenças que falham são contadas no relatório; o treino continua.
    pub fn train_corpus(&mut self, documents: &[Document]) -> Result<TrainingReport> {
        self.require(Phase::Training, "train_corpus")?;
        let mut report = TrainingReport::default();
        for (d, document) in documents.iter().enumerate() {
            self.new_document();
            for (s, sentence) in document.sentences.iter().enumerate() {
                report.sentences += 1;
                match self.train(&sentence.tokens(), &sentence.tags) {
                    Ok(()) => report.trained += 1,
                    Err(err @ HmmError::Training { .. })
                    | Err(err @ HmmError::LengthMismatch { .. }) => {
                        report.failures.push((d, s, err.to_string()))
                    }
                    Err(err) => return Err(err),
                }
            }
        }
        self.new_document();
        tracing::info!(
            sentences = report.sentences,
            trained = report.trained,
            failed = report.failures.len(),
            "treino concluído"
        );
        Ok(report)
    }

    /// Converte contagens em probabilidades: fronteira Training → Ready.
    pub fn finalize(&mut self) -> Result<()> {
        self.require(Phase::Training, "finalize")?;
        self.ensure_resolved();
        self.topology.compute_transition_probs();
        for state in self.topology.states_mut() {
            state.emitter.finalize();
        }
        self.cache.clear();
        self.phase = Phase::Ready;
        tracing::debug!(states = self.topology.len(), "modelo finalizado");
        Ok(())
    }

    // ─── Decodificação ────────────────────────────────────────────────────

    /// Decodifica uma sentença e registra no cache as decisões cacheáveis.
    ///
    /// `Ok(None)` quando nenhum caminho legal existe.
    pub fn decode(&mut self, tokens: &[Token]) -> Result<Option<Decoded>> {
        let decoded = self.decode_uncommitted(tokens)?;
        if let Some(decoded) = &decoded {
            self.commit(tokens, &decoded.tags);
        }
        Ok(decoded)
    }

    /// Como [`HmmModel::decode`], sem tocar no cache; o chamador decide
    /// quando registrar a decisão com [`HmmModel::commit`].
    pub fn decode_uncommitted(&mut self, tokens: &[Token]) -> Result<Option<Decoded>> {
        self.require(Phase::Ready, "decode")?;
        self.margin = None;
        self.k_best = None;

        let options = DecodeOptions {
            second_best: self.config.record_margin,
            exclusion: None,
        };
        let lattice = self.decoder().decode(tokens, &options)?;
        let (Some(states), Some(score)) = (lattice.best_path(), lattice.best_score()) else {
            tracing::debug!(tokens = tokens.len(), "nenhum caminho legal");
            return Ok(None);
        };

        if self.config.record_margin {
            self.margin = lattice.margin(&states);
        }
        let tags = self.tags_of(&states);
        if self.config.k_best {
            let mut generator = KBestPaths::new(lattice);
            // O primeiro caminho do gerador é o ótimo, já devolvido aqui.
            generator.next(&self.topology);
            self.k_best = Some(generator);
        }

        Ok(Some(Decoded {
            states,
            tags,
            score,
            margin: self.margin,
        }))
    }

    /// Registra no cache as tags escolhidas para a sentença.
    pub fn commit(&mut self, tokens: &[Token], tags: &[String]) {
        for (token, tag) in tokens.iter().zip(tags) {
            self.cache.record(&token.text, tag);
        }
    }

    pub fn decode_best_path(&mut self, tokens: &[Token]) -> Result<Option<Vec<StateId>>> {
        Ok(self.decode(tokens)?.map(|d| d.states))
    }

    pub fn decode_best_tags(&mut self, tokens: &[Token]) -> Result<Option<Vec<String>>> {
        Ok(self.decode(tokens)?.map(|d| d.tags))
    }

    pub fn set_record_margin(&mut self, enabled: bool) {
        self.config.record_margin = enabled;
    }

    /// Margem da última decodificação.
    pub fn margin(&self) -> Option<f64> {
        self.margin
    }

    /// Quanto o melhor caminho piora se o tipo de `tag` for proibido nos
    /// tokens `start..=end`.
    ///
    /// `Ok(None)` quando não existe caminho (com ou sem a restrição). Não
    /// altera o cache de nomes.
    pub fn local_margin(
        &self,
        tokens: &[Token],
        tag: &str,
        start: usize,
        end: usize,
    ) -> Result<Option<f64>> {
        self.require(Phase::Ready, "local_margin")?;
        if start > end || end >= tokens.len() {
            return Err(HmmError::InvalidRange {
                start,
                end,
                len: tokens.len(),
            });
        }
        let options = DecodeOptions {
            second_best: false,
            exclusion: Some(ExclusionConstraint::new(tag, start, end)),
        };
        let lattice = self.decoder().decode(tokens, &options)?;
        match (lattice.best_score(), lattice.constrained_score()) {
            (Some(best), Some(constrained)) => Ok(Some(best - constrained)),
            _ => {
                tracing::debug!(tag, start, end, "nenhum caminho respeita a exclusão");
                Ok(None)
            }
        }
    }

    pub fn set_k_best(&mut self, enabled: bool) {
        self.config.k_best = enabled;
        if !enabled {
            self.k_best = None;
        }
    }

    /// Próximo melhor caminho da última decodificação (2º, 3º, ...).
    pub fn next_best_path(&mut self) -> Option<RankedPath> {
        let Self {
            topology, k_best, ..
        } = self;
        k_best.as_mut()?.next(topology)
    }

    pub fn next_best_tags(&mut self) -> Option<Vec<String>> {
        let path = self.next_best_path()?;
        Some(self.tags_of(&path.states))
    }

    /// Início de documento: limpa o cache de nomes.
    pub fn new_document(&mut self) {
        self.cache.clear();
    }

    pub fn set_cacheable_tags<S: AsRef<str>>(&mut self, tags: &[S]) {
        self.cache.set_cacheable_tags(tags);
        self.config.cacheable_tags = tags.iter().map(|t| t.as_ref().to_string()).collect();
    }

    /// Score de uma sequência explícita de estados com o estado atual do cache.
    pub fn path_score(&self, tokens: &[Token], states: &[StateId]) -> Result<Option<f64>> {
        self.require(Phase::Ready, "path_score")?;
        self.decoder().path_score(tokens, states)
    }

    /// Tags dos estados emissores de um caminho completo.
    pub fn tags_of(&self, states: &[StateId]) -> Vec<String> {
        let inner = states.len().saturating_sub(2);
        states
            .iter()
            .skip(1)
            .take(inner)
            .map(|&s| self.topology.state(s).tag.clone())
            .collect()
    }

    fn decoder(&self) -> Decoder<'_> {
        Decoder::new(&self.topology, &self.cache, &self.config.tag_bias)
    }

    // ─── Acesso ───────────────────────────────────────────────────────────

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub(crate) fn topology_mut(&mut self) -> &mut Topology {
        &mut self.topology
    }

    pub fn config(&self) -> &HmmConfig {
        &self.config
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn cache(&self) -> &NameCache {
        &self.cache
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::tokens_from_words;
    use crate::topology::{END, START};

    fn tags(list: &[&str]) -> Vec<String> {
        list.iter().map(|t| t.to_string()).collect()
    }

    fn big_cat(config: HmmConfig) -> HmmModel {
        let mut model = HmmModel::new(config);
        model.add_state(START, "").unwrap();
        model.add_state("adj", "adj").unwrap();
        model.add_state("noun", "noun").unwrap();
        model.add_state(END, "").unwrap();
        for (from, to) in [
            (START, "adj"),
            (START, "noun"),
            ("adj", "adj"),
            ("adj", "noun"),
            ("adj", END),
            ("noun", "noun"),
            ("noun", "adj"),
            ("noun", END),
        ] {
            model.add_transition(from, to).unwrap();
        }
        model
            .train(
                &tokens_from_words(&["big", "big", "cat", "nap"]),
                &tags(&["adj", "adj", "noun", "noun"]),
            )
            .unwrap();
        model.finalize().unwrap();
        model
    }

    #[test]
    fn test_hmm_basic_training() {
        let mut model = big_cat(HmmConfig::default());
        let tokens = tokens_from_words(&["big", "big", "cat", "nap"]);
        let decoded = model.decode(&tokens).unwrap().unwrap();
        assert_eq!(decoded.tags, tags(&["adj", "adj", "noun", "noun"]));
        assert_eq!(decoded.states.len(), 6);
        assert!(decoded.margin.is_none());
    }

    #[test]
    fn test_hmm_unknown_word() {
        let mut model = big_cat(HmmConfig::default());
        let tokens = tokens_from_words(&["big", "dog"]);
        let tags = model.decode_best_tags(&tokens).unwrap().unwrap();
        assert_eq!(tags.len(), 2);
        assert_eq!(tags[0], "adj");
    }

    #[test]
    fn test_phase_guards() {
        let mut model = HmmModel::default();
        model.add_state(START, "").unwrap();
        assert!(matches!(
            model.decode(&tokens_from_words(&["x"])),
            Err(HmmError::WrongPhase { operation: "decode", phase: Phase::Training })
        ));
        model.finalize().unwrap();
        assert!(matches!(
            model.add_state("x", "X"),
            Err(HmmError::WrongPhase { .. })
        ));
        assert!(matches!(model.finalize(), Err(HmmError::WrongPhase { .. })));
        // Sem estado final, toda decodificação falha com erro explícito
        assert!(matches!(
            model.decode(&tokens_from_words(&["x"])),
            Err(HmmError::MissingEnd)
        ));
        model.reset_for_training();
        assert_eq!(model.phase(), Phase::Training);
    }

    #[test]
    fn test_missing_start() {
        let mut model = HmmModel::default();
        model.add_state(END, "").unwrap();
        model.finalize().unwrap();
        assert!(matches!(model.decode(&[]), Err(HmmError::MissingStart)));
    }

    #[test]
    fn test_length_mismatch() {
        let mut model = HmmModel::default();
        let err = model
            .train(&tokens_from_words(&["a", "b"]), &tags(&["X"]))
            .unwrap_err();
        assert!(matches!(err, HmmError::LengthMismatch { tokens: 2, tags: 1 }));
    }

    #[test]
    fn test_margin_recorded() {
        let config = HmmConfig {
            record_margin: true,
            ..HmmConfig::default()
        };
        let mut model = big_cat(config);
        let tokens = tokens_from_words(&["big", "cat"]);
        let decoded = model.decode(&tokens).unwrap().unwrap();
        let margin = model.margin().unwrap();
        assert_eq!(decoded.margin, Some(margin));
        assert!(margin >= 0.0);
    }

    #[test]
    fn test_k_best_continues_after_decode() {
        let config = HmmConfig {
            k_best: true,
            record_margin: true,
            ..HmmConfig::default()
        };
        let mut model = big_cat(config);
        let tokens = tokens_from_words(&["big", "cat"]);
        let best = model.decode(&tokens).unwrap().unwrap();
        let second = model.next_best_path().unwrap();
        assert!(second.score < best.score);
        assert_ne!(second.states, best.states);
        // Margem == distância até o 2º melhor caminho
        assert!((best.score - second.score - best.margin.unwrap()).abs() < 1e-9);
        let third = model.next_best_tags().unwrap();
        assert_eq!(third.len(), 2);
    }

    #[test]
    fn test_local_margin_range_checked() {
        let model = big_cat(HmmConfig::default());
        let tokens = tokens_from_words(&["big", "cat"]);
        assert!(matches!(
            model.local_margin(&tokens, "noun", 1, 2),
            Err(HmmError::InvalidRange { .. })
        ));
        let margin = model.local_margin(&tokens, "noun", 1, 1).unwrap().unwrap();
        assert!(margin > 0.0);
        // Proibir uma tag que o melhor caminho não usa não custa nada
        let free = model.local_margin(&tokens, "adj", 1, 1).unwrap().unwrap();
        assert!(free.abs() < 1e-9);
    }
}
