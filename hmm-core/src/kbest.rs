//! # K Melhores Caminhos
//!
//! Enumera preguiçosamente o 2º, 3º, ... melhor caminho reaproveitando a
//! treliça já calculada pelo Viterbi, sem refazer nenhum score.
//!
//! ## Desvios
//!
//! Um desvio diz: "no caminho `P`, entre na coluna `p` vindo de `q` em vez do
//! predecessor escolhido". O prefixo até `q` é o melhor prefixo da treliça
//! (segue os ponteiros de volta) e o sufixo a partir de `p` é o de `P`:
//!
//! ```text
//! custo = score(P) - best[p-1][escolhido] - arco(escolhido, s)
//!                  + arco(q, s) + best[p-1][q]
//! ```
//!
//! Os desvios ficam em uma fila de prioridade por custo. Cada caminho
//! devolvido semeia desvios apenas nas colunas **anteriores** ao seu ponto de
//! emenda; o melhor caminho semeia em todas. Assim todo caminho tem um único
//! pai, a fila sempre contém o melhor desvio ainda não explorado de cada
//! caminho já devolvido, e os scores saem em ordem não crescente.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use ordered_float::OrderedFloat;
use serde::Serialize;

use crate::topology::{is_possible, StateId, Topology};
use crate::viterbi::Lattice;

/// Um caminho completo (com `start` e `end`) e seu score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedPath {
    pub states: Vec<StateId>,
    pub score: f64,
    /// Coluna onde este caminho se separa do pai (`N + 2` para o melhor).
    pub splice: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Deviation {
    cost: OrderedFloat<f64>,
    seq: u64,
    parent: usize,
    column: usize,
    predecessor: StateId,
}

impl Ord for Deviation {
    fn cmp(&self, other: &Self) -> Ordering {
        // Maior custo primeiro; em empate, o desvio mais antigo.
        self.cost
            .cmp(&other.cost)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Deviation {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Gerador preguiçoso de caminhos em ordem de score.
#[derive(Debug, Clone)]
pub struct KBestPaths {
    lattice: Lattice,
    paths: Vec<RankedPath>,
    heap: BinaryHeap<Deviation>,
    seq: u64,
    started: bool,
}

impl KBestPaths {
    pub fn new(lattice: Lattice) -> Self {
        Self {
            lattice,
            paths: Vec::new(),
            heap: BinaryHeap::new(),
            seq: 0,
            started: false,
        }
    }

    /// Quantos caminhos já foram devolvidos.
    pub fn produced(&self) -> usize {
        self.paths.len()
    }

    /// Próximo melhor caminho; a primeira chamada devolve o ótimo.
    pub fn next(&mut self, topology: &Topology) -> Option<RankedPath> {
        if !self.started {
            self.started = true;
            let states = self.lattice.best_path()?;
            let score = self.lattice.best_score()?;
            let splice = states.len();
            return Some(self.accept(topology, RankedPath { states, score, splice }));
        }

        while let Some(deviation) = self.heap.pop() {
            match self.splice(&deviation) {
                Some(path) => return Some(self.accept(topology, path)),
                None => tracing::debug!(
                    column = deviation.column,
                    predecessor = deviation.predecessor,
                    "desvio sem prefixo legal descartado"
                ),
            }
        }
        None
    }

    fn accept(&mut self, topology: &Topology, path: RankedPath) -> RankedPath {
        self.paths.push(path.clone());
        self.seed(topology, self.paths.len() - 1);
        path
    }

    /// Aplica o desvio: prefixo pelos ponteiros de volta + sufixo do pai.
    fn splice(&self, deviation: &Deviation) -> Option<RankedPath> {
        let parent = &self.paths[deviation.parent];
        let column = deviation.column;
        let mut states = self.lattice.prefix(column - 1, deviation.predecessor)?;
        states.extend_from_slice(&parent.states[column..]);
        Some(RankedPath {
            states,
            score: deviation.cost.into_inner(),
            splice: column,
        })
    }

    /// Semeia os desvios das colunas `1..splice` do caminho `index`.
    fn seed(&mut self, topology: &Topology, index: usize) {
        let path = &self.paths[index];
        let mut fresh = Vec::new();
        for column in 1..path.splice {
            let state = path.states[column];
            let chosen = path.states[column - 1];
            let base = path.score
                - self.lattice.score(column - 1, chosen)
                - topology.arc_log_prob(chosen, state);
            for &q in topology.predecessors(state) {
                let prefix = self.lattice.score(column - 1, q);
                if q == chosen || !is_possible(prefix) {
                    continue;
                }
                let cost = base + topology.arc_log_prob(q, state) + prefix;
                fresh.push((cost, column, q));
            }
        }
        for (cost, column, predecessor) in fresh {
            self.seq += 1;
            self.heap.push(Deviation {
                cost: OrderedFloat(cost),
                seq: self.seq,
                parent: index,
                column,
                predecessor,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::NameCache;
    use crate::emission::EmitterKind;
    use crate::tokenizer::tokens_from_words;
    use crate::topology::{END, START};
    use crate::viterbi::{DecodeOptions, Decoder};
    use std::collections::{BTreeMap, HashSet};

    fn chain() -> Topology {
        let mut topo = Topology::new(EmitterKind::Shape);
        let start = topo.add_state(START, "").unwrap();
        let a = topo.add_state("a", "A").unwrap();
        let b = topo.add_state("b", "B").unwrap();
        let c = topo.add_state("c", "C").unwrap();
        topo.add_state(END, "").unwrap();
        for (target, count) in [("a", 5.0), ("b", 2.0), ("c", 1.0)] {
            topo.add_transition(start, target, count).unwrap();
        }
        for from in [a, b, c] {
            topo.add_transition(from, "a", 1.0).unwrap();
            topo.add_transition(from, "b", 2.0).unwrap();
            topo.add_transition(from, END, 1.0).unwrap();
        }
        // "c" só é alcançável a partir de start
        topo.resolve().unwrap();
        topo.state_mut(a).emitter.accumulate("um", None, 3.0);
        topo.state_mut(b).emitter.accumulate("dois", None, 3.0);
        topo.state_mut(c).emitter.accumulate("um", None, 1.0);
        topo.recount_states();
        topo.compute_transition_probs();
        for state in topo.states_mut() {
            state.emitter.finalize();
        }
        topo
    }

    #[test]
    fn test_enumerates_every_path_in_order() {
        let topo = chain();
        let cache = NameCache::default();
        let bias = BTreeMap::new();
        let decoder = Decoder::new(&topo, &cache, &bias);
        let tokens = tokens_from_words(&["um", "dois", "um"]);
        let lattice = decoder.decode(&tokens, &DecodeOptions::default()).unwrap();
        let mut kbest = KBestPaths::new(lattice);

        let mut seen = HashSet::new();
        let mut previous = f64::INFINITY;
        while let Some(path) = kbest.next(&topo) {
            let expected = decoder.path_score(&tokens, &path.states).unwrap().unwrap();
            assert!((path.score - expected).abs() < 1e-9);
            assert!(path.score <= previous + 1e-9);
            assert!(seen.insert(path.states.clone()), "caminho repetido");
            previous = path.score;
        }
        // 1º token: a, b ou c; depois a ou b → 3 × 2 × 2
        assert_eq!(seen.len(), 12);
        assert_eq!(kbest.produced(), 12);
        assert!(kbest.next(&topo).is_none());
    }

    #[test]
    fn test_second_best_is_single_swap() {
        let topo = chain();
        let cache = NameCache::default();
        let bias = BTreeMap::new();
        let decoder = Decoder::new(&topo, &cache, &bias);
        let tokens = tokens_from_words(&["um", "dois"]);
        let lattice = decoder.decode(&tokens, &DecodeOptions::default()).unwrap();
        let mut kbest = KBestPaths::new(lattice);
        let best = kbest.next(&topo).unwrap();
        let second = kbest.next(&topo).unwrap();
        assert!(second.score < best.score);
        // Idêntico ao melhor a partir do ponto de emenda
        assert_eq!(second.states[second.splice..], best.states[second.splice..]);
        assert_ne!(second.states[second.splice - 1], best.states[second.splice - 1]);
    }

    #[test]
    fn test_no_path_yields_nothing() {
        let mut topo = Topology::new(EmitterKind::Shape);
        topo.add_state(START, "").unwrap();
        topo.add_state(END, "").unwrap();
        topo.resolve().unwrap();
        let cache = NameCache::default();
        let bias = BTreeMap::new();
        let decoder = Decoder::new(&topo, &cache, &bias);
        let lattice = decoder.decode(&[], &DecodeOptions::default()).unwrap();
        let mut kbest = KBestPaths::new(lattice);
        assert!(kbest.next(&topo).is_none());
        assert!(kbest.next(&topo).is_none());
    }
}
