//! # Treino Supervisionado
//!
//! Os dois algoritmos percorrem uma sentença totalmente etiquetada e somam
//! contagens de estado, transição, emissão e cache.
//!
//! ## Estrito
//!
//! A cada token, do estado corrente deve partir **exatamente uma** transição
//! para um estado cuja tag é a tag de referência (e que aceita o token). Zero
//! ou várias transições abortam a sentença ali; as contagens já aplicadas
//! permanecem.
//!
//! ## Tolerante (alinhamento forçado)
//!
//! Quando vários estados compartilham uma tag, um passo à frente registra,
//! para cada célula `(posição, estado)` alcançável, o **único** predecessor
//! consistente. Uma célula com dois ou mais predecessores fica marcada como
//! ambígua; o caminho é recuperado de trás para frente a partir do estado
//! final e qualquer célula ambígua ou inalcançável no caminho aborta a
//! sentença. Nada é aplicado antes do alinhamento completo.

use serde::{Deserialize, Serialize};

use crate::cache::NameCache;
use crate::error::{HmmError, Result, TrainFailure};
use crate::tokenizer::Token;
use crate::topology::{StateId, Topology};

/// Algoritmo de treino usado por [`crate::hmm::HmmModel::train`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainingMode {
    #[default]
    Strict,
    Tolerant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cell {
    Unreached,
    Start,
    From(StateId),
    Ambiguous,
}

impl Cell {
    fn reached(self) -> bool {
        self != Cell::Unreached
    }
}

fn check_lengths(tokens: &[Token], tags: &[String]) -> Result<()> {
    if tokens.len() == tags.len() {
        Ok(())
    } else {
        Err(HmmError::LengthMismatch {
            tokens: tokens.len(),
            tags: tags.len(),
        })
    }
}

fn failure(position: usize, tokens: &[Token], reason: TrainFailure) -> HmmError {
    HmmError::Training {
        position,
        token: tokens
            .get(position)
            .map(|t| t.text.clone())
            .unwrap_or_default(),
        reason,
    }
}

/// Estado pode ocupar o token `i` com a tag de referência?
fn fits(topology: &Topology, state: StateId, tokens: &[Token], tags: &[String], i: usize) -> bool {
    topology.is_emitting(state)
        && topology.state(state).tag == tags[i]
        && topology.allowed_token(state, &tokens[i])
}

/// Treino estrito: um único candidato por passo.
pub fn train_strict(
    topology: &mut Topology,
    cache: &mut NameCache,
    tokens: &[Token],
    tags: &[String],
) -> Result<()> {
    check_lengths(tokens, tags)?;
    let mut current = topology.start()?;
    let end = topology.end()?;

    for i in 0..tokens.len() {
        let candidates: Vec<StateId> = topology
            .state(current)
            .transitions()
            .map(|arc| arc.target)
            .filter(|&target| fits(topology, target, tokens, tags, i))
            .collect();

        let next = match candidates.as_slice() {
            [only] => *only,
            [] => {
                return Err(failure(
                    i,
                    tokens,
                    TrainFailure::NoMatchingTransition { tag: tags[i].clone() },
                ))
            }
            many => {
                return Err(failure(
                    i,
                    tokens,
                    TrainFailure::MultipleMatchingTransitions {
                        tag: tags[i].clone(),
                        count: many.len(),
                    },
                ))
            }
        };
        apply_step(topology, cache, current, next, tokens, i);
        current = next;
    }

    if topology.state(current).transition_to(end).is_none() {
        let state = topology.state(current).name.clone();
        return Err(failure(
            tokens.len(),
            tokens,
            TrainFailure::NoTransitionToEnd { state },
        ));
    }
    topology.count_transition(current, end);
    Ok(())
}

/// Treino tolerante: alinha primeiro, aplica depois.
pub fn train_tolerant(
    topology: &mut Topology,
    cache: &mut NameCache,
    tokens: &[Token],
    tags: &[String],
) -> Result<()> {
    let path = align(topology, tokens, tags)?;
    let mut current = topology.start()?;
    for (i, &state) in path.iter().enumerate() {
        apply_step(topology, cache, current, state, tokens, i);
        current = state;
    }
    let end = topology.end()?;
    topology.count_transition(current, end);
    Ok(())
}

/// Alinhamento forçado: devolve um estado por token.
pub fn align(topology: &Topology, tokens: &[Token], tags: &[String]) -> Result<Vec<StateId>> {
    check_lengths(tokens, tags)?;
    let start = topology.start()?;
    let end = topology.end()?;
    let n = tokens.len();
    let m = topology.len();

    // Colunas 0..=n; a coluna 0 contém só o estado inicial.
    let mut cells = vec![vec![Cell::Unreached; m]; n + 1];
    cells[0][start] = Cell::Start;

    for i in 0..n {
        let mut any = false;
        for state in 0..m {
            if !fits(topology, state, tokens, tags, i) {
                continue;
            }
            let cell = link(topology.predecessors(state), &cells[i]);
            any |= cell.reached();
            cells[i + 1][state] = cell;
        }
        if !any {
            return Err(failure(i, tokens, TrainFailure::Unreachable));
        }
    }

    // Volta do estado final; `cell` descreve o predecessor da coluna `col`.
    let mut path = vec![start; n];
    let mut cell = link(topology.predecessors(end), &cells[n]);
    for col in (1..=n + 1).rev() {
        let position = col - 1;
        let state = match cell {
            Cell::From(state) => state,
            Cell::Ambiguous => return Err(failure(position, tokens, TrainFailure::Ambiguous)),
            Cell::Unreached | Cell::Start => {
                return Err(failure(position, tokens, TrainFailure::Unreachable))
            }
        };
        if position == 0 {
            break;
        }
        path[position - 1] = state;
        cell = cells[position][state];
    }
    Ok(path)
}

/// Quantos predecessores alcançados levam a esta célula?
fn link(predecessors: &[StateId], column: &[Cell]) -> Cell {
    let mut reached = predecessors.iter().filter(|&&q| column[q].reached());
    match (reached.next(), reached.next()) {
        (None, _) => Cell::Unreached,
        (Some(&q), None) => Cell::From(q),
        (Some(_), Some(_)) => Cell::Ambiguous,
    }
}

/// Soma um passo `from -> to` emitindo `tokens[i]`.
fn apply_step(
    topology: &mut Topology,
    cache: &mut NameCache,
    from: StateId,
    to: StateId,
    tokens: &[Token],
    i: usize,
) {
    topology.count_transition(from, to);
    let text = tokens[i].text.as_str();
    let prior = i.checked_sub(1).map(|j| tokens[j].text.as_str());
    let state = topology.state_mut(to);
    state.emitter.accumulate(text, prior, 1.0);
    if cache.applies(text, &state.tag) {
        state.cache_stats.observe(cache.contains(text, &state.tag));
        cache.record(text, &state.tag);
    }
}
