//! # Modelos de Emissão
//!
//! Cada estado do HMM possui sua própria instância de modelo de emissão, que
//! responde à pergunta: qual a log-probabilidade deste estado produzir o token
//! `w`, dado o token anterior e os atributos de `w`?
//!
//! Todas as variantes obedecem ao mesmo contrato ([`Emitter`]):
//!
//! 1. `reset` zera as estatísticas de treino;
//! 2. `accumulate` soma contagens de instâncias `(token, anterior)`;
//! 3. `finalize` calcula a tabela de probabilidades uma única vez;
//! 4. `score` é determinístico e **nunca** devolve probabilidade zero: tokens
//!    inéditos recebem uma estimativa pela classe ortográfica ([`TokenShape`]);
//! 5. `counts`/`load_count` serializam as contagens brutas.
//!
//! ## Fórmulas
//!
//! [`ShapeEmitter`] (unigrama com back-off para a forma), com `N` instâncias,
//! `D` tokens distintos e `c(w)` contagens:
//!
//! $$ P_{forma}(k) = \frac{c(k) + 1}{N + 4} \qquad
//!    P(w) = \frac{c(w) + (D + 1) \cdot P_{forma}(forma(w))}{N + D + 1} $$
//!
//! [`BigramEmitter`] condiciona no token anterior `v` (Witten-Bell), recuando
//! para o unigrama:
//!
//! $$ P(w \mid v) = \frac{c(v, w) + T(v) \cdot P(w)}{c(v) + T(v)} $$
//!
//! onde `T(v)` é o número de sucessores distintos de `v`, mais um.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{HmmError, Result};
use crate::tokenizer::{Token, TokenShape};

/// Contagem bruta persistida (`EMIT token [anterior] contagem`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmitCount {
    pub token: String,
    pub prior: Option<String>,
    pub count: f64,
}

/// Contrato comum a todos os modelos de emissão.
pub trait Emitter: fmt::Debug + Send + Sync {
    /// Zera as estatísticas de treino.
    fn reset(&mut self);
    /// Acumula `count` instâncias do token (com o token anterior, se houver).
    fn accumulate(&mut self, token: &str, prior: Option<&str>, count: f64);
    /// Converte contagens em log-probabilidades.
    fn finalize(&mut self);
    /// Log-probabilidade de emitir `token` após `prior`.
    fn score(&self, token: &Token, prior: Option<&str>) -> f64;
    /// Contagens brutas em ordem determinística.
    fn counts(&self) -> Vec<EmitCount>;
    /// Restaura uma contagem lida do arquivo do modelo.
    ///
    /// Uma contagem que a variante não sabe representar é recusada.
    fn load_count(&mut self, count: &EmitCount) -> Result<()>;
    fn box_clone(&self) -> Box<dyn Emitter>;
}

impl Clone for Box<dyn Emitter> {
    fn clone(&self) -> Self {
        self.box_clone()
    }
}

/// Qual variante de emissor os novos estados recebem.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmitterKind {
    #[default]
    Shape,
    Bigram,
}

impl EmitterKind {
    pub fn build(self) -> Box<dyn Emitter> {
        match self {
            EmitterKind::Shape => Box::new(ShapeEmitter::default()),
            EmitterKind::Bigram => Box::new(BigramEmitter::default()),
        }
    }

    /// Nome usado na linha `EMITTER` do arquivo do modelo.
    pub fn name(self) -> &'static str {
        match self {
            EmitterKind::Shape => "shape",
            EmitterKind::Bigram => "bigram",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "shape" => Some(EmitterKind::Shape),
            "bigram" => Some(EmitterKind::Bigram),
            _ => None,
        }
    }
}

/// Emissor de unigramas com back-off para a forma do token.
#[derive(Debug, Clone, Default)]
pub struct ShapeEmitter {
    tokens: HashMap<String, f64>,
    shapes: [f64; TokenShape::COUNT],
    total: f64,
    table: Option<ShapeTable>,
}

#[derive(Debug, Clone)]
struct ShapeTable {
    seen: HashMap<String, f64>,
    unseen: [f64; TokenShape::COUNT],
}

impl ShapeEmitter {
    /// Probabilidade (não logarítmica) de `text`, direto das contagens.
    pub fn prob(&self, text: &str) -> f64 {
        let distinct = self.tokens.len() as f64;
        let backoff = self.shape_prob(TokenShape::of(text));
        let count = self.tokens.get(text).copied().unwrap_or(0.0);
        (count + (distinct + 1.0) * backoff) / (self.total + distinct + 1.0)
    }

    fn shape_prob(&self, shape: TokenShape) -> f64 {
        (self.shapes[shape.index()] + 1.0) / (self.total + TokenShape::COUNT as f64)
    }

    fn add(&mut self, token: &str, count: f64) {
        *self.tokens.entry(token.to_string()).or_insert(0.0) += count;
        self.shapes[TokenShape::of(token).index()] += count;
        self.total += count;
        self.table = None;
    }
}

impl Emitter for ShapeEmitter {
    fn reset(&mut self) {
        *self = Self::default();
    }

    fn accumulate(&mut self, token: &str, _prior: Option<&str>, count: f64) {
        self.add(token, count);
    }

    fn finalize(&mut self) {
        let seen = self
            .tokens
            .keys()
            .map(|w| (w.clone(), self.prob(w).ln()))
            .collect();
        let distinct = self.tokens.len() as f64;
        let mut unseen = [0.0; TokenShape::COUNT];
        for shape in TokenShape::all() {
            let p = (distinct + 1.0) * self.shape_prob(shape) / (self.total + distinct + 1.0);
            unseen[shape.index()] = p.ln();
        }
        self.table = Some(ShapeTable { seen, unseen });
    }

    fn score(&self, token: &Token, _prior: Option<&str>) -> f64 {
        match &self.table {
            Some(table) => table
                .seen
                .get(&token.text)
                .copied()
                .unwrap_or_else(|| table.unseen[token.shape().index()]),
            None => self.prob(&token.text).ln(),
        }
    }

    fn counts(&self) -> Vec<EmitCount> {
        let mut counts: Vec<EmitCount> = self
            .tokens
            .iter()
            .map(|(token, &count)| EmitCount {
                token: token.clone(),
                prior: None,
                count,
            })
            .collect();
        counts.sort_by(|a, b| a.token.cmp(&b.token));
        counts
    }

    fn load_count(&mut self, count: &EmitCount) -> Result<()> {
        match &count.prior {
            None => {
                self.add(&count.token, count.count);
                Ok(())
            }
            Some(prior) => Err(HmmError::IncompatibleCount {
                token: count.token.clone(),
                prior: prior.clone(),
            }),
        }
    }

    fn box_clone(&self) -> Box<dyn Emitter> {
        Box::new(self.clone())
    }
}

/// Emissor condicionado ao token anterior, com back-off para [`ShapeEmitter`].
#[derive(Debug, Clone, Default)]
pub struct BigramEmitter {
    unigram: ShapeEmitter,
    /// (anterior, token) → contagem
    pairs: HashMap<(String, String), f64>,
    /// anterior → (contagem total, sucessores distintos)
    priors: HashMap<String, (f64, usize)>,
    table: Option<HashMap<(String, String), f64>>,
}

impl BigramEmitter {
    fn add_pair(&mut self, prior: &str, token: &str, count: f64) {
        let key = (prior.to_string(), token.to_string());
        let fresh = !self.pairs.contains_key(&key);
        *self.pairs.entry(key).or_insert(0.0) += count;
        let entry = self.priors.entry(prior.to_string()).or_insert((0.0, 0));
        entry.0 += count;
        if fresh {
            entry.1 += 1;
        }
        self.table = None;
    }

    fn prob(&self, text: &str, prior: Option<&str>) -> f64 {
        let unigram = self.unigram.prob(text);
        let Some((seen, successors)) = prior.and_then(|p| self.priors.get(p)) else {
            return unigram;
        };
        let types = *successors as f64 + 1.0;
        let pair = prior
            .and_then(|p| self.pairs.get(&(p.to_string(), text.to_string())))
            .copied()
            .unwrap_or(0.0);
        (pair + types * unigram) / (seen + types)
    }
}

impl Emitter for BigramEmitter {
    fn reset(&mut self) {
        *self = Self::default();
    }

    fn accumulate(&mut self, token: &str, prior: Option<&str>, count: f64) {
        self.unigram.add(token, count);
        if let Some(prior) = prior {
            self.add_pair(prior, token, count);
        }
    }

    fn finalize(&mut self) {
        self.unigram.finalize();
        let table = self
            .pairs
            .keys()
            .map(|(prior, token)| {
                let p = self.prob(token, Some(prior));
                ((prior.clone(), token.clone()), p.ln())
            })
            .collect();
        self.table = Some(table);
    }

    fn score(&self, token: &Token, prior: Option<&str>) -> f64 {
        let known_prior = prior.filter(|p| self.priors.contains_key(*p));
        match (known_prior, &self.table) {
            (None, _) => self.unigram.score(token, None),
            (Some(p), Some(table)) => table
                .get(&(p.to_string(), token.text.clone()))
                .copied()
                .unwrap_or_else(|| self.prob(&token.text, Some(p)).ln()),
            (Some(p), None) => self.prob(&token.text, Some(p)).ln(),
        }
    }

    fn counts(&self) -> Vec<EmitCount> {
        let mut counts = self.unigram.counts();
        let mut pairs: Vec<EmitCount> = self
            .pairs
            .iter()
            .map(|((prior, token), &count)| EmitCount {
                token: token.clone(),
                prior: Some(prior.clone()),
                count,
            })
            .collect();
        pairs.sort_by(|a, b| (&a.prior, &a.token).cmp(&(&b.prior, &b.token)));
        counts.extend(pairs);
        counts
    }

    fn load_count(&mut self, count: &EmitCount) -> Result<()> {
        match &count.prior {
            None => self.unigram.add(&count.token, count.count),
            Some(prior) => self.add_pair(prior, &count.token, count.count),
        }
        Ok(())
    }

    fn box_clone(&self) -> Box<dyn Emitter> {
        Box::new(self.clone())
    }
}
