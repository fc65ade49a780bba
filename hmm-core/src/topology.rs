//! # Topologia do HMM
//!
//! A topologia é o grafo de estados e transições. Cada estado tem:
//!
//! - um **nome** único e uma **tag** de saída (vazia para `start`/`end`);
//! - uma **restrição de feature** opcional: o estado só emite tokens cujo
//!   atributo `name` esteja entre os valores permitidos;
//! - seu próprio **modelo de emissão**;
//! - uma tabela esparsa de **transições** de saída, indexada pelo estado destino.
//!
//! Os estados vivem em uma arena (`Vec<State>`) e são endereçados por
//! [`StateId`] estáveis. Transições são declaradas pelo **nome** do destino e
//! resolvidas em uma segunda passada ([`Topology::resolve`]), o que permite
//! referenciar estados ainda não criados.
//!
//! ## Probabilidade de transição
//!
//! $$ \log P(t \mid s) = \log \frac{count(s \to t) + 0.01}{count(s)} $$
//!
//! Transições ausentes valem [`UNLIKELY`], um sentinela finito no lugar de
//! $-\infty$ para manter a aritmética ordenada e livre de NaN.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::cache::CacheStats;
use crate::emission::{Emitter, EmitterKind};
use crate::error::{HmmError, Result};
use crate::tokenizer::Token;

/// Índice estável de um estado na arena.
pub type StateId = usize;

/// Nome reservado do estado inicial.
pub const START: &str = "start";
/// Nome reservado do estado final.
pub const END: &str = "end";

/// Log-probabilidade "impossível".
pub const UNLIKELY: f64 = -1.0e10;

/// Suavização somada à contagem de cada transição.
pub const ARC_SMOOTHING: f64 = 0.01;

/// Verdadeiro se o score representa um evento possível.
pub fn is_possible(score: f64) -> bool {
    score > UNLIKELY
}

/// Restrição de feature de um estado.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureConstraint {
    pub name: String,
    pub values: BTreeSet<String>,
}

impl FeatureConstraint {
    pub fn new<S: AsRef<str>>(name: impl Into<String>, values: &[S]) -> Self {
        Self {
            name: name.into(),
            values: values.iter().map(|v| v.as_ref().to_string()).collect(),
        }
    }

    /// Um token sem o atributo nunca é aceito.
    pub fn allows(&self, token: &Token) -> bool {
        token
            .attribute(&self.name)
            .map(|value| self.values.contains(value))
            .unwrap_or(false)
    }
}

/// Transição resolvida.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transition {
    pub target: StateId,
    pub count: f64,
    pub log_prob: f64,
}

#[derive(Debug, Clone)]
struct PendingArc {
    target: String,
    count: f64,
}

/// Um nó da topologia.
#[derive(Debug, Clone)]
pub struct State {
    pub name: String,
    pub tag: String,
    pub feature: Option<FeatureConstraint>,
    pub emitter: Box<dyn Emitter>,
    /// Quantas vezes o treino partiu deste estado.
    pub count: f64,
    pub cache_stats: CacheStats,
    pending: Vec<PendingArc>,
    arcs: Vec<Option<Transition>>,
}

impl State {
    fn new(name: &str, tag: &str, emitter: Box<dyn Emitter>) -> Self {
        Self {
            name: name.to_string(),
            tag: tag.to_string(),
            feature: None,
            emitter,
            count: 0.0,
            cache_stats: CacheStats::default(),
            pending: Vec::new(),
            arcs: Vec::new(),
        }
    }

    /// Transições resolvidas, em ordem de destino.
    pub fn transitions(&self) -> impl Iterator<Item = &Transition> {
        self.arcs.iter().flatten()
    }

    /// Transições declaradas e ainda não resolvidas: (destino, contagem).
    pub fn pending_transitions(&self) -> impl Iterator<Item = (&str, f64)> {
        self.pending.iter().map(|arc| (arc.target.as_str(), arc.count))
    }

    pub fn transition_to(&self, target: StateId) -> Option<&Transition> {
        self.arcs.get(target).and_then(Option::as_ref)
    }

    /// Zera contagens de treino (estado, transições, emissor, cache).
    pub fn reset_counts(&mut self) {
        self.count = 0.0;
        self.cache_stats = CacheStats::default();
        self.emitter.reset();
        for arc in self.arcs.iter_mut().flatten() {
            arc.count = 0.0;
        }
        for arc in &mut self.pending {
            arc.count = 0.0;
        }
    }
}

/// Arena de estados com resolução de nomes em duas passadas.
#[derive(Debug, Clone, Default)]
pub struct Topology {
    states: Vec<State>,
    index: HashMap<String, StateId>,
    start: Option<StateId>,
    end: Option<StateId>,
    predecessors: Vec<Vec<StateId>>,
    resolved: bool,
    emitter_kind: EmitterKind,
}

impl Topology {
    pub fn new(emitter_kind: EmitterKind) -> Self {
        Self {
            emitter_kind,
            ..Self::default()
        }
    }

    /// Adiciona um estado com o emissor padrão da topologia.
    pub fn add_state(&mut self, name: &str, tag: &str) -> Result<StateId> {
        let emitter = self.emitter_kind.build();
        self.add_state_with_emitter(name, tag, emitter)
    }

    pub fn add_state_with_emitter(
        &mut self,
        name: &str,
        tag: &str,
        emitter: Box<dyn Emitter>,
    ) -> Result<StateId> {
        if self.index.contains_key(name) {
            return Err(HmmError::DuplicateState(name.to_string()));
        }
        let id = self.states.len();
        self.states.push(State::new(name, tag, emitter));
        self.index.insert(name.to_string(), id);
        match name {
            START => self.start = Some(id),
            END => self.end = Some(id),
            _ => {}
        }
        self.resolved = false;
        Ok(id)
    }

    /// Declara a transição `from -> target`; o destino é resolvido depois.
    pub fn add_transition(&mut self, from: StateId, target: &str, count: f64) -> Result<()> {
        let state = self
            .states
            .get_mut(from)
            .ok_or_else(|| HmmError::UnknownState(format!("#{from}")))?;
        state.pending.push(PendingArc {
            target: target.to_string(),
            count,
        });
        self.resolved = false;
        Ok(())
    }

    /// Segunda passada: resolve nomes de destino em índices.
    ///
    /// Destinos desconhecidos são descartados (nunca inventados) e devolvidos
    /// em [`HmmError::UnresolvedTransitions`]; o restante da topologia continua
    /// resolvido e utilizável.
    pub fn resolve(&mut self) -> Result<()> {
        let n = self.states.len();
        let mut unresolved = Vec::new();

        for state in &mut self.states {
            state.arcs.resize(n, None);
            for arc in std::mem::take(&mut state.pending) {
                match self.index.get(&arc.target) {
                    Some(&target) => {
                        // Uma entrada por destino: declarações repetidas somam contagens.
                        let slot = &mut state.arcs[target];
                        match slot {
                            Some(existing) => existing.count += arc.count,
                            None => {
                                *slot = Some(Transition {
                                    target,
                                    count: arc.count,
                                    log_prob: UNLIKELY,
                                })
                            }
                        }
                    }
                    None => {
                        tracing::warn!(
                            from = %state.name,
                            target = %arc.target,
                            "transição para estado desconhecido descartada"
                        );
                        unresolved.push(format!("{} -> {}", state.name, arc.target));
                    }
                }
            }
        }

        self.predecessors = vec![Vec::new(); n];
        for (from, state) in self.states.iter().enumerate() {
            for arc in state.transitions() {
                self.predecessors[arc.target].push(from);
            }
        }
        self.resolved = true;

        if unresolved.is_empty() {
            Ok(())
        } else {
            Err(HmmError::UnresolvedTransitions(unresolved))
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved
    }

    /// Converte as contagens de transição em log-probabilidades.
    ///
    /// Um estado nunca percorrido no treino distribui a massa igualmente
    /// entre suas transições.
    pub fn compute_transition_probs(&mut self) {
        for state in &mut self.states {
            let total = state.count;
            let fanout = state.arcs.iter().flatten().count() as f64;
            for arc in state.arcs.iter_mut().flatten() {
                arc.log_prob = if total > 0.0 {
                    ((arc.count + ARC_SMOOTHING) / total).ln()
                } else {
                    (1.0 / fanout).ln()
                };
            }
        }
    }

    /// Zera todas as contagens de treino.
    pub fn reset_counts(&mut self) {
        for state in &mut self.states {
            state.reset_counts();
        }
    }

    /// Recalcula a contagem de cada estado como a soma de suas transições.
    pub fn recount_states(&mut self) {
        for state in &mut self.states {
            let pending: f64 = state.pending.iter().map(|a| a.count).sum();
            let resolved: f64 = state.arcs.iter().flatten().map(|a| a.count).sum();
            state.count = pending + resolved;
        }
    }

    /// Registra uma passagem de treino por `from -> to`.
    pub(crate) fn count_transition(&mut self, from: StateId, to: StateId) {
        let state = &mut self.states[from];
        state.count += 1.0;
        if let Some(Some(arc)) = state.arcs.get_mut(to) {
            arc.count += 1.0;
        }
    }

    /// O estado aceita este token? (verdadeiro se não há restrição)
    pub fn allowed_token(&self, state: StateId, token: &Token) -> bool {
        match &self.states[state].feature {
            None => true,
            Some(constraint) => constraint.allows(token),
        }
    }

    /// Log-probabilidade da transição, ou [`UNLIKELY`] se ausente.
    pub fn arc_log_prob(&self, from: StateId, to: StateId) -> f64 {
        self.states[from]
            .transition_to(to)
            .map(|arc| arc.log_prob)
            .unwrap_or(UNLIKELY)
    }

    /// Estados com transição para `to` (disponível após `resolve`).
    pub fn predecessors(&self, to: StateId) -> &[StateId] {
        self.predecessors.get(to).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn state(&self, id: StateId) -> &State {
        &self.states[id]
    }

    pub fn state_mut(&mut self, id: StateId) -> &mut State {
        &mut self.states[id]
    }

    pub fn states(&self) -> &[State] {
        &self.states
    }

    pub fn states_mut(&mut self) -> impl Iterator<Item = &mut State> {
        self.states.iter_mut()
    }

    pub fn id(&self, name: &str) -> Option<StateId> {
        self.index.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn start(&self) -> Result<StateId> {
        self.start.ok_or(HmmError::MissingStart)
    }

    pub fn end(&self) -> Result<StateId> {
        self.end.ok_or(HmmError::MissingEnd)
    }

    /// Estados que emitem tokens (todos exceto `start` e `end`).
    pub fn is_emitting(&self, id: StateId) -> bool {
        Some(id) != self.start && Some(id) != self.end
    }

    pub fn emitter_kind(&self) -> EmitterKind {
        self.emitter_kind
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small() -> Topology {
        let mut topo = Topology::new(EmitterKind::Shape);
        let start = topo.add_state(START, "").unwrap();
        // "noun" ainda não existe: resolvido na segunda passada
        topo.add_transition(start, "noun", 1.0).unwrap();
        let noun = topo.add_state("noun", "noun").unwrap();
        topo.add_transition(noun, END, 1.0).unwrap();
        topo.add_state(END, "").unwrap();
        topo
    }

    #[test]
    fn test_forward_references_resolve() {
        let mut topo = small();
        topo.resolve().unwrap();
        let start = topo.start().unwrap();
        let noun = topo.id("noun").unwrap();
        let end = topo.end().unwrap();
        assert!(topo.state(start).transition_to(noun).is_some());
        assert_eq!(topo.predecessors(end), &[noun]);
        assert_eq!(topo.predecessors(noun), &[start]);
    }

    #[test]
    fn test_unknown_target_dropped_not_invented() {
        let mut topo = small();
        let noun = topo.id("noun").unwrap();
        topo.add_transition(noun, "verb", 1.0).unwrap();
        let err = topo.resolve().unwrap_err();
        match err {
            HmmError::UnresolvedTransitions(names) => assert_eq!(names, vec!["noun -> verb"]),
            other => panic!("erro inesperado: {other}"),
        }
        assert!(topo.id("verb").is_none());
        assert_eq!(topo.state(noun).transitions().count(), 1);
        assert!(topo.is_resolved());
    }

    #[test]
    fn test_duplicate_targets_merge() {
        let mut topo = small();
        let start = topo.start().unwrap();
        topo.add_transition(start, "noun", 2.0).unwrap();
        topo.resolve().unwrap();
        let noun = topo.id("noun").unwrap();
        assert_eq!(topo.state(start).transitions().count(), 1);
        assert_eq!(topo.state(start).transition_to(noun).unwrap().count, 3.0);
    }

    #[test]
    fn test_duplicate_state_rejected() {
        let mut topo = small();
        assert!(matches!(
            topo.add_state("noun", "x"),
            Err(HmmError::DuplicateState(_))
        ));
    }

    #[test]
    fn test_transition_probs() {
        let mut topo = small();
        topo.resolve().unwrap();
        topo.recount_states();
        topo.compute_transition_probs();
        let start = topo.start().unwrap();
        let noun = topo.id("noun").unwrap();
        let expected = (1.01f64 / 1.0).ln();
        assert!((topo.arc_log_prob(start, noun) - expected).abs() < 1e-12);
        assert_eq!(topo.arc_log_prob(noun, start), UNLIKELY);
    }

    #[test]
    fn test_feature_constraint() {
        let mut topo = small();
        let noun = topo.id("noun").unwrap();
        topo.state_mut(noun).feature = Some(FeatureConstraint::new("shape", &["lower"]));
        assert!(topo.allowed_token(noun, &Token::new("gato")));
        assert!(!topo.allowed_token(noun, &Token::new("Brasil")));
        // Token sem o atributo
        let bare = Token {
            text: "gato".into(),
            ..Token::default()
        };
        assert!(!topo.allowed_token(noun, &bare));
    }
}
