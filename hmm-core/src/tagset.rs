//! # Convenção de Tags: Início e Continuação
//!
//! As tags de saída dos estados seguem uma convenção de início/continuação:
//!
//! | Tag       | Papel                                   |
//! |-----------|-----------------------------------------|
//! | `B-PER`   | começa uma anotação do tipo `PER`       |
//! | `I-PER`   | continua a anotação `PER` corrente      |
//! | `PER`     | tag simples: tokens vizinhos iguais formam uma única anotação |
//! | `O`, `""` | fora de qualquer anotação               |
//!
//! Um etiquetador POS usa apenas tags simples; um etiquetador de nomes usa o
//! esquema BIO. Ambos passam pelas mesmas funções deste módulo.

use serde::{Deserialize, Serialize};

/// Papel de uma tag na convenção de início/continuação.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagRole<'a> {
    Begin(&'a str),
    Continue(&'a str),
    Plain(&'a str),
    Outside,
}

impl<'a> TagRole<'a> {
    pub fn parse(tag: &'a str) -> Self {
        if tag.is_empty() || tag == "O" {
            TagRole::Outside
        } else if let Some(kind) = tag.strip_prefix("B-") {
            TagRole::Begin(kind)
        } else if let Some(kind) = tag.strip_prefix("I-") {
            TagRole::Continue(kind)
        } else {
            TagRole::Plain(tag)
        }
    }

    /// Tipo da anotação (ex: `PER` para `B-PER`), ou `None` fora de anotações.
    pub fn kind(&self) -> Option<&'a str> {
        match *self {
            TagRole::Begin(k) | TagRole::Continue(k) | TagRole::Plain(k) => Some(k),
            TagRole::Outside => None,
        }
    }

    pub fn belongs_to(&self, kind: &str) -> bool {
        self.kind() == Some(kind)
    }

    /// Verdadeiro apenas para tags que exigem uma anotação já aberta (`I-X`).
    pub fn continues(&self, kind: &str) -> bool {
        matches!(*self, TagRole::Continue(k) if k == kind)
    }
}

/// Normaliza uma tag para o tipo de anotação: `B-PER`, `I-PER` e `PER` viram `PER`.
pub fn annotation_kind(tag: &str) -> Option<&str> {
    TagRole::parse(tag).kind()
}

/// Uma anotação contígua reconstruída a partir das tags de saída.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TagSpan {
    /// Índice do primeiro token (inclusivo).
    pub start: usize,
    /// Índice do último token (inclusivo).
    pub end: usize,
    /// Tipo da anotação (ex: "PER", "noun").
    pub label: String,
}

/// Agrupa a sequência de tags em anotações.
///
/// `B-X` sempre abre uma anotação nova; `I-X` estende a anotação `X` aberta
/// (ou abre uma, se a anterior for de outro tipo); tags simples iguais e
/// consecutivas formam uma única anotação.
pub fn tags_to_spans<S: AsRef<str>>(tags: &[S]) -> Vec<TagSpan> {
    let mut spans: Vec<TagSpan> = Vec::new();
    let mut open: Option<(usize, String, bool)> = None; // (início, tipo, simples?)

    for (i, tag) in tags.iter().enumerate() {
        let role = TagRole::parse(tag.as_ref());
        let extend = match (&open, role) {
            (Some((_, kind, false)), TagRole::Continue(k)) => kind == k,
            (Some((_, kind, true)), TagRole::Plain(k)) => kind == k,
            _ => false,
        };
        if extend {
            continue;
        }
        if let Some((start, label, _)) = open.take() {
            spans.push(TagSpan { start, end: i - 1, label });
        }
        open = match role {
            TagRole::Begin(k) | TagRole::Continue(k) => Some((i, k.to_string(), false)),
            TagRole::Plain(k) => Some((i, k.to_string(), true)),
            TagRole::Outside => None,
        };
    }
    if let Some((start, label, _)) = open {
        spans.push(TagSpan {
            start,
            end: tags.len() - 1,
            label,
        });
    }
    spans
}

/// Em que região de uma restrição de exclusão cai uma posição de token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExclusionRegion {
    /// Antes do intervalo: sem restrição.
    Before,
    /// Dentro do intervalo: nenhum estado do tipo excluído.
    Inside,
    /// Exatamente o token seguinte ao intervalo: nenhuma continuação do tipo excluído.
    After,
    /// Depois disso: sem restrição.
    Beyond,
}

/// Restrição usada pela **margem local**: proíbe o tipo `kind` nos tokens
/// `start..=end`.
///
/// São três condições disjuntas, avaliadas por posição de token:
///
/// 1. **antes** do intervalo, qualquer estado é legal;
/// 2. **dentro** do intervalo, um estado cuja tag pertence ao tipo excluído
///    (`X`, `B-X` ou `I-X`) é ilegal;
/// 3. no token **logo após** o intervalo, um estado que *continua* o tipo
///    excluído (`I-X`) é ilegal: a anotação que ele continuaria foi proibida.
///
/// Com tags simples a condição 3 nunca dispara: `X` após um token fora de `X`
/// abre uma anotação nova.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExclusionConstraint {
    pub kind: String,
    pub start: usize,
    pub end: usize,
}

impl ExclusionConstraint {
    /// `tag` pode ser o tipo puro (`PER`) ou uma tag com prefixo (`B-PER`).
    pub fn new(tag: &str, start: usize, end: usize) -> Self {
        let kind = annotation_kind(tag).unwrap_or(tag).to_string();
        Self { kind, start, end }
    }

    pub fn region(&self, position: usize) -> ExclusionRegion {
        if position < self.start {
            ExclusionRegion::Before
        } else if position <= self.end {
            ExclusionRegion::Inside
        } else if position == self.end + 1 {
            ExclusionRegion::After
        } else {
            ExclusionRegion::Beyond
        }
    }

    /// Um estado com tag `tag` pode ocupar o token `position`?
    pub fn permits(&self, position: usize, tag: &str) -> bool {
        let role = TagRole::parse(tag);
        match self.region(position) {
            ExclusionRegion::Before | ExclusionRegion::Beyond => true,
            ExclusionRegion::Inside => !role.belongs_to(&self.kind),
            ExclusionRegion::After => !role.continues(&self.kind),
        }
    }
}
