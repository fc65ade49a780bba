//! # Algoritmo de Viterbi — Decodificação em Treliça
//!
//! O Viterbi encontra a sequência de estados mais provável por **programação
//! dinâmica** sobre uma treliça `(posição × estado)`. Em vez de enumerar as
//! `S^N` sequências, explora que o melhor caminho até a célula `(i, s)` passa
//! pelo melhor caminho até alguma célula `(i-1, q)` → `O(N × S²)`.
//!
//! ## Colunas
//!
//! Para `N` tokens a treliça tem `N + 2` colunas:
//!
//! ```text
//! coluna 0        : apenas `start`, score 0
//! colunas 1..=N   : estados emissores; coluna i emite o token i-1
//! coluna N+1      : apenas `end`, sem emissão
//! ```
//!
//! ## Recursão
//!
//! ```text
//! best[i][s] = max_q ( best[i-1][q] + log P(s | q) ) + emit(s, i)
//! ```
//!
//! `emit` soma o score do emissor do estado, o viés configurado para a tag e
//! o bônus/penalidade do cache de nomes. Um estado cuja restrição de feature
//! rejeita o token vale [`UNLIKELY`] na coluna, qualquer que seja a estatística.
//!
//! ## Tabelas opcionais
//!
//! - **segundo melhor** (`second`): o melhor score entre os caminhos que
//!   chegam à célula por um caminho diferente do ótimo. Alimenta a margem.
//! - **restrita** (`constrained`): a mesma recursão, mas zerando as células
//!   proibidas por uma [`ExclusionConstraint`]. Alimenta a margem local.

use std::collections::BTreeMap;

use crate::cache::NameCache;
use crate::error::Result;
use crate::tagset::ExclusionConstraint;
use crate::tokenizer::Token;
use crate::topology::{is_possible, StateId, Topology, UNLIKELY};

/// Quais tabelas extras construir durante a passada.
#[derive(Debug, Clone, Default)]
pub struct DecodeOptions {
    pub second_best: bool,
    pub exclusion: Option<ExclusionConstraint>,
}

/// Visão somente-leitura do modelo usada por uma decodificação.
#[derive(Debug, Clone, Copy)]
pub struct Decoder<'a> {
    topology: &'a Topology,
    cache: &'a NameCache,
    tag_bias: &'a BTreeMap<String, f64>,
}

impl<'a> Decoder<'a> {
    pub fn new(
        topology: &'a Topology,
        cache: &'a NameCache,
        tag_bias: &'a BTreeMap<String, f64>,
    ) -> Self {
        Self {
            topology,
            cache,
            tag_bias,
        }
    }

    /// Log-score de `state` emitir `tokens[i]`.
    pub fn emission(&self, state: StateId, tokens: &[Token], i: usize) -> f64 {
        let token = &tokens[i];
        if !self.topology.allowed_token(state, token) {
            return UNLIKELY;
        }
        let st = self.topology.state(state);
        let prior = i.checked_sub(1).map(|j| tokens[j].text.as_str());
        let mut score = st.emitter.score(token, prior);
        score += self.tag_bias.get(&st.tag).copied().unwrap_or(0.0);
        if self.cache.applies(&token.text, &st.tag) {
            score += st.cache_stats.bonus(self.cache.contains(&token.text, &st.tag));
        }
        score
    }

    /// Constrói a treliça completa.
    pub fn decode(&self, tokens: &[Token], options: &DecodeOptions) -> Result<Lattice> {
        let topo = self.topology;
        let start = topo.start()?;
        let end = topo.end()?;
        let n = tokens.len();
        let m = topo.len();
        let cols = n + 2;

        let mut lattice = Lattice {
            best: vec![vec![UNLIKELY; m]; cols],
            back: vec![vec![None; m]; cols],
            second: options.second_best.then(|| vec![vec![UNLIKELY; m]; cols]),
            constrained: options
                .exclusion
                .as_ref()
                .map(|_| vec![vec![UNLIKELY; m]; cols]),
            start,
            end,
        };
        lattice.best[0][start] = 0.0;
        if let Some(constrained) = lattice.constrained.as_mut() {
            constrained[0][start] = 0.0;
        }

        for col in 1..cols {
            for state in 0..m {
                let emission = if col == n + 1 {
                    if state != end {
                        continue;
                    }
                    0.0
                } else {
                    if !topo.is_emitting(state) {
                        continue;
                    }
                    self.emission(state, tokens, col - 1)
                };
                if !is_possible(emission) {
                    continue;
                }
                lattice.fill_cell(topo, col, state, emission);

                if let (Some(exclusion), Some(constrained)) =
                    (options.exclusion.as_ref(), lattice.constrained.as_mut())
                {
                    let legal = col == n + 1 || exclusion.permits(col - 1, &topo.state(state).tag);
                    if legal {
                        constrained[col][state] =
                            best_incoming(topo, &constrained[col - 1], state, emission).0;
                    }
                }
            }
        }

        tracing::debug!(
            tokens = n,
            states = m,
            best = lattice.best_score().unwrap_or(UNLIKELY),
            "treliça construída"
        );
        Ok(lattice)
    }

    /// Score de uma sequência explícita de estados (com `start` e `end`).
    ///
    /// Devolve `None` se a sequência não é um caminho legal.
    pub fn path_score(&self, tokens: &[Token], states: &[StateId]) -> Result<Option<f64>> {
        let start = self.topology.start()?;
        let end = self.topology.end()?;
        let n = tokens.len();
        if states.len() != n + 2 || states[0] != start || states[n + 1] != end {
            return Ok(None);
        }
        let mut total = 0.0;
        for col in 1..n + 2 {
            let (from, to) = (states[col - 1], states[col]);
            let arc = self.topology.arc_log_prob(from, to);
            let emission = if col == n + 1 {
                0.0
            } else if self.topology.is_emitting(to) {
                self.emission(to, tokens, col - 1)
            } else {
                UNLIKELY
            };
            if !is_possible(arc) || !is_possible(emission) {
                return Ok(None);
            }
            total += arc + emission;
        }
        Ok(Some(total))
    }
}

/// Melhor predecessor em `column` para entrar em `state`.
///
/// Empates mantêm o predecessor de menor índice.
fn best_incoming(
    topo: &Topology,
    column: &[f64],
    state: StateId,
    emission: f64,
) -> (f64, Option<StateId>) {
    let mut best = UNLIKELY;
    let mut arg = None;
    for &q in topo.predecessors(state) {
        if !is_possible(column[q]) {
            continue;
        }
        let candidate = column[q] + topo.arc_log_prob(q, state) + emission;
        if arg.is_none() || candidate > best {
            best = candidate;
            arg = Some(q);
        }
    }
    (best, arg)
}

/// Treliça de uma decodificação: scores, ponteiros de volta e tabelas opcionais.
#[derive(Debug, Clone)]
pub struct Lattice {
    best: Vec<Vec<f64>>,
    back: Vec<Vec<Option<StateId>>>,
    second: Option<Vec<Vec<f64>>>,
    constrained: Option<Vec<Vec<f64>>>,
    start: StateId,
    end: StateId,
}

impl Lattice {
    fn fill_cell(&mut self, topo: &Topology, col: usize, state: StateId, emission: f64) {
        let (best, arg) = best_incoming(topo, &self.best[col - 1], state, emission);
        let Some(chosen) = arg else {
            return;
        };
        self.best[col][state] = best;
        self.back[col][state] = Some(chosen);

        let Some(second) = self.second.as_mut() else {
            return;
        };
        // Segundo melhor verdadeiro: o melhor entre os outros predecessores
        // ou o segundo melhor do próprio predecessor escolhido.
        let mut runner_up = UNLIKELY;
        for &q in topo.predecessors(state) {
            let previous = if q == chosen {
                second[col - 1][q]
            } else {
                self.best[col - 1][q]
            };
            if !is_possible(previous) {
                continue;
            }
            let candidate = previous + topo.arc_log_prob(q, state) + emission;
            if candidate > runner_up {
                runner_up = candidate;
            }
        }
        second[col][state] = runner_up;
    }

    /// Número de tokens decodificados.
    pub fn len(&self) -> usize {
        self.best.len() - 2
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn start(&self) -> StateId {
        self.start
    }

    pub fn end(&self) -> StateId {
        self.end
    }

    pub fn score(&self, col: usize, state: StateId) -> f64 {
        self.best[col][state]
    }

    /// Score do melhor caminho completo, se existir algum.
    pub fn best_score(&self) -> Option<f64> {
        let score = self.best[self.len() + 1][self.end];
        is_possible(score).then_some(score)
    }

    /// Segue os ponteiros de volta a partir de `(col, state)` até a coluna 0.
    ///
    /// Devolve os estados das colunas `0..=col`.
    pub fn prefix(&self, col: usize, state: StateId) -> Option<Vec<StateId>> {
        let mut states = vec![self.start; col + 1];
        let mut current = state;
        for c in (1..=col).rev() {
            states[c] = current;
            current = self.back[c][current]?;
        }
        (current == self.start).then_some(states)
    }

    /// Melhor caminho, incluindo `start` e `end` (`N + 2` estados).
    pub fn best_path(&self) -> Option<Vec<StateId>> {
        self.best_score()?;
        self.prefix(self.len() + 1, self.end)
    }

    /// Menor diferença entre o melhor e o segundo melhor score ao longo do
    /// caminho ótimo.
    ///
    /// As colunas dos tokens e a do estado final participam; assim o valor é
    /// exatamente a distância entre o melhor e o segundo melhor caminho
    /// completo. `None` sem tokens, sem tabela de segundo melhor ou quando não
    /// há caminho alternativo.
    pub fn margin(&self, path: &[StateId]) -> Option<f64> {
        let second = self.second.as_ref()?;
        if self.is_empty() {
            return None;
        }
        let mut margin: Option<f64> = None;
        for (col, &state) in path.iter().enumerate().skip(1) {
            let runner_up = second[col][state];
            if !is_possible(runner_up) {
                continue;
            }
            let gap = self.best[col][state] - runner_up;
            margin = Some(margin.map_or(gap, |m| m.min(gap)));
        }
        margin
    }

    /// Melhor score entre os caminhos que respeitam a restrição de exclusão.
    pub fn constrained_score(&self) -> Option<f64> {
        let constrained = self.constrained.as_ref()?;
        let score = constrained[self.len() + 1][self.end];
        is_possible(score).then_some(score)
    }
}
