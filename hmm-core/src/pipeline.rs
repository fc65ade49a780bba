//! # Pipeline de Etiquetagem
//!
//! Conecta os módulos para processar documentos inteiros:
//!
//! 1. início de documento (cache de nomes limpo);
//! 2. divisão em sentenças e tokenização ([`crate::tokenizer`]);
//! 3. decodificação Viterbi com margem global ([`HmmModel::decode`]);
//! 4. agrupamento das tags em anotações ([`tags_to_spans`]);
//! 5. opcionalmente, margem local de cada anotação e os `k` caminhos
//!    alternativos seguintes;
//! 6. registro das decisões no cache, antes da próxima sentença.
//!
//! A margem local de cada anotação é calculada **antes** do passo 6, para que
//! a própria decisão não reforce a confiança nela.
//!
//! ## Concorrência
//!
//! O cache de nomes impõe ordem estrita dentro de um documento, então um
//! documento é sempre processado sequencialmente. Documentos independentes
//! rodam em paralelo com `rayon` ([`tag_documents`]), cada um com sua própria
//! cópia do modelo.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::corpus::Document;
use crate::error::Result;
use crate::evaluation::{Evaluation, EvaluationSummary};
use crate::hmm::HmmModel;
use crate::tagset::tags_to_spans;
use crate::tokenizer::{tokenize_sentences, Token};

/// O que calcular além do melhor caminho.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineOptions {
    /// Quantos caminhos alternativos devolver por sentença.
    pub alternatives: usize,
    /// Calcular a margem local de cada anotação.
    pub span_margins: bool,
}

/// Token com a tag atribuída.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaggedToken {
    pub text: String,
    pub start: usize,
    pub end: usize,
    pub tag: String,
}

/// Anotação reconstruída a partir das tags.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpanReport {
    pub label: String,
    pub text: String,
    /// Primeiro e último token (inclusivos).
    pub first_token: usize,
    pub last_token: usize,
    /// Offsets de byte no texto original.
    pub start: usize,
    pub end: usize,
    /// Quanto o melhor caminho perderia sem esta anotação.
    pub local_margin: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alternative {
    pub tags: Vec<String>,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SentenceResult {
    pub tokens: Vec<TaggedToken>,
    pub spans: Vec<SpanReport>,
    /// `None` quando nenhum caminho legal existe.
    pub score: Option<f64>,
    pub margin: Option<f64>,
    pub alternatives: Vec<Alternative>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DocumentResult {
    pub sentences: Vec<SentenceResult>,
}

/// Sentença candidata a revisão humana.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    pub document: usize,
    pub sentence: usize,
    pub margin: f64,
}

/// Orquestrador sobre um único modelo.
pub struct TaggingPipeline {
    model: HmmModel,
    options: PipelineOptions,
}

impl TaggingPipeline {
    pub fn new(mut model: HmmModel, options: PipelineOptions) -> Self {
        model.set_record_margin(true);
        model.set_k_best(options.alternatives > 0);
        Self { model, options }
    }

    pub fn model(&self) -> &HmmModel {
        &self.model
    }

    /// Texto bruto → um documento.
    pub fn tag_text(&mut self, text: &str) -> Result<DocumentResult> {
        self.tag_document(&tokenize_sentences(text))
    }

    /// Sentenças já tokenizadas → um documento.
    pub fn tag_document(&mut self, sentences: &[Vec<Token>]) -> Result<DocumentResult> {
        self.model.new_document();
        let mut result = DocumentResult::default();
        for tokens in sentences {
            result.sentences.push(self.tag_sentence(tokens)?);
        }
        Ok(result)
    }

    fn tag_sentence(&mut self, tokens: &[Token]) -> Result<SentenceResult> {
        let Some(decoded) = self.model.decode_uncommitted(tokens)? else {
            return Ok(SentenceResult {
                tokens: tokens
                    .iter()
                    .map(|t| TaggedToken {
                        text: t.text.clone(),
                        start: t.start,
                        end: t.end,
                        tag: String::new(),
                    })
                    .collect(),
                spans: Vec::new(),
                score: None,
                margin: None,
                alternatives: Vec::new(),
            });
        };

        let mut spans = Vec::new();
        for span in tags_to_spans(&decoded.tags) {
            let local_margin = if self.options.span_margins {
                self.model
                    .local_margin(tokens, &span.label, span.start, span.end)?
            } else {
                None
            };
            let text = tokens[span.start..=span.end]
                .iter()
                .map(|t| t.text.as_str())
                .collect::<Vec<_>>()
                .join(" ");
            spans.push(SpanReport {
                text,
                first_token: span.start,
                last_token: span.end,
                start: tokens[span.start].start,
                end: tokens[span.end].end,
                label: span.label,
                local_margin,
            });
        }

        let mut alternatives = Vec::new();
        while alternatives.len() < self.options.alternatives {
            let Some(path) = self.model.next_best_path() else {
                break;
            };
            alternatives.push(Alternative {
                tags: self.model.tags_of(&path.states),
                score: path.score,
            });
        }

        self.model.commit(tokens, &decoded.tags);

        Ok(SentenceResult {
            tokens: tokens
                .iter()
                .zip(&decoded.tags)
                .map(|(t, tag)| TaggedToken {
                    text: t.text.clone(),
                    start: t.start,
                    end: t.end,
                    tag: tag.clone(),
                })
                .collect(),
            spans,
            score: Some(decoded.score),
            margin: decoded.margin,
            alternatives,
        })
    }

    /// Decodifica um corpus de referência e compara as tags.
    pub fn evaluate(&mut self, documents: &[Document]) -> Result<EvaluationSummary> {
        let mut evaluation = Evaluation::new();
        for document in documents {
            self.model.new_document();
            for sentence in &document.sentences {
                let predicted = self.model.decode_best_tags(&sentence.tokens())?;
                evaluation.accumulate(&sentence.tags, predicted.as_deref());
            }
        }
        Ok(evaluation.summary())
    }
}

/// As `k` sentenças de menor margem: as melhores candidatas a revisão.
///
/// Sentenças sem margem (sem alternativa ou sem caminho) ficam de fora.
pub fn least_confident(results: &[DocumentResult], k: usize) -> Vec<Candidate> {
    let mut candidates: Vec<Candidate> = results
        .iter()
        .enumerate()
        .flat_map(|(d, document)| {
            document
                .sentences
                .iter()
                .enumerate()
                .filter_map(move |(s, sentence)| {
                    sentence.margin.map(|margin| Candidate {
                        document: d,
                        sentence: s,
                        margin,
                    })
                })
        })
        .collect();
    candidates.sort_by(|a, b| a.margin.total_cmp(&b.margin));
    candidates.truncate(k);
    candidates
}

/// Etiqueta documentos independentes em paralelo, um modelo por documento.
pub fn tag_documents<S: AsRef<str> + Sync>(
    model: &HmmModel,
    options: &PipelineOptions,
    texts: &[S],
) -> Result<Vec<DocumentResult>> {
    tracing::debug!(documents = texts.len(), "etiquetando em paralelo");
    texts
        .par_iter()
        .map(|text| TaggingPipeline::new(model.clone(), options.clone()).tag_text(text.as_ref()))
        .collect()
}
