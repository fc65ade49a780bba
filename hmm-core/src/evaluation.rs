//! # Avaliação
//!
//! Compara as tags previstas com as de referência em dois níveis:
//!
//! - **por tag**: acurácia de item, acurácia de sequência e, para cada tag,
//!   precisão / revocação / F1 (com média macro);
//! - **por anotação**: uma anotação prevista só conta como acerto se início,
//!   fim e tipo coincidem exatamente com uma anotação de referência.
//!
//! Sentenças sem caminho legal contam como previsão vazia: todos os itens
//! errados, nenhuma anotação prevista.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use serde::Serialize;

use crate::tagset::tags_to_spans;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct LabelScore {
    /// Previsões corretas.
    pub correct: usize,
    /// Ocorrências na referência.
    pub observed: usize,
    /// Previsões feitas.
    pub predicted: usize,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

impl LabelScore {
    fn compute(&mut self) {
        self.precision = ratio(self.correct, self.predicted);
        self.recall = ratio(self.correct, self.observed);
        self.f1 = f1(self.precision, self.recall);
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

fn f1(precision: f64, recall: f64) -> f64 {
    if precision + recall > 0.0 {
        2.0 * precision * recall / (precision + recall)
    } else {
        0.0
    }
}

/// Acumulador de resultados.
#[derive(Debug, Clone, Default)]
pub struct Evaluation {
    labels: BTreeMap<String, LabelScore>,
    items_correct: usize,
    items_total: usize,
    sequences_correct: usize,
    sequences_total: usize,
    sequences_failed: usize,
    spans: LabelScore,
}

/// Números finais de uma avaliação.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EvaluationSummary {
    pub labels: BTreeMap<String, LabelScore>,
    pub item_accuracy: f64,
    pub sequence_accuracy: f64,
    pub failed_sequences: usize,
    pub macro_precision: f64,
    pub macro_recall: f64,
    pub macro_f1: f64,
    pub spans: LabelScore,
}

impl Evaluation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acumula uma sentença; `None` representa "nenhum caminho legal".
    pub fn accumulate<R: AsRef<str>, P: AsRef<str>>(
        &mut self,
        reference: &[R],
        prediction: Option<&[P]>,
    ) {
        self.sequences_total += 1;
        self.items_total += reference.len();

        for r in reference {
            self.labels.entry(r.as_ref().to_string()).or_default().observed += 1;
        }
        let reference_spans = tags_to_spans(reference);
        self.spans.observed += reference_spans.len();

        let Some(prediction) = prediction else {
            self.sequences_failed += 1;
            return;
        };

        let mut matched = 0;
        for (r, p) in reference.iter().zip(prediction) {
            let (r, p) = (r.as_ref(), p.as_ref());
            self.labels.entry(p.to_string()).or_default().predicted += 1;
            if r == p {
                self.labels.entry(r.to_string()).or_default().correct += 1;
                matched += 1;
            }
        }
        self.items_correct += matched;
        if matched == reference.len() && prediction.len() == reference.len() {
            self.sequences_correct += 1;
        }

        let predicted_spans = tags_to_spans(prediction);
        let gold: HashSet<_> = reference_spans.into_iter().collect();
        self.spans.predicted += predicted_spans.len();
        self.spans.correct += predicted_spans.iter().filter(|s| gold.contains(*s)).count();
    }

    pub fn summary(&self) -> EvaluationSummary {
        let mut labels = self.labels.clone();
        let mut macro_precision = 0.0;
        let mut macro_recall = 0.0;
        let mut macro_f1 = 0.0;
        let mut observed_labels = 0;
        for score in labels.values_mut() {
            score.compute();
            if score.observed > 0 {
                observed_labels += 1;
                macro_precision += score.precision;
                macro_recall += score.recall;
                macro_f1 += score.f1;
            }
        }
        let n = observed_labels.max(1) as f64;
        let mut spans = self.spans;
        spans.compute();

        EvaluationSummary {
            labels,
            item_accuracy: ratio(self.items_correct, self.items_total),
            sequence_accuracy: ratio(self.sequences_correct, self.sequences_total),
            failed_sequences: self.sequences_failed,
            macro_precision: macro_precision / n,
            macro_recall: macro_recall / n,
            macro_f1: macro_f1 / n,
            spans,
        }
    }
}

impl fmt::Display for EvaluationSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Desempenho por tag (#acertos, #previstas, #referência) (precisão, revocação, F1):")?;
        for (label, s) in &self.labels {
            writeln!(
                f,
                "\t{label}: ({}, {}, {}) ({:.4}, {:.4}, {:.4})",
                s.correct, s.predicted, s.observed, s.precision, s.recall, s.f1
            )?;
        }
        writeln!(
            f,
            "Média macro (precisão, revocação, F1): ({:.4}, {:.4}, {:.4})",
            self.macro_precision, self.macro_recall, self.macro_f1
        )?;
        writeln!(
            f,
            "Anotações (precisão, revocação, F1): ({:.4}, {:.4}, {:.4})",
            self.spans.precision, self.spans.recall, self.spans.f1
        )?;
        writeln!(f, "Acurácia de item: {:.4}", self.item_accuracy)?;
        write!(
            f,
            "Acurácia de sequência: {:.4} ({} sem caminho)",
            self.sequence_accuracy, self.failed_sequences
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_perfect_prediction() {
        let mut eval = Evaluation::new();
        let tags = ["B-PER", "I-PER", "O"];
        eval.accumulate(&tags, Some(&tags[..]));
        let summary = eval.summary();
        assert_eq!(summary.item_accuracy, 1.0);
        assert_eq!(summary.sequence_accuracy, 1.0);
        assert_eq!(summary.spans.f1, 1.0);
        assert_eq!(summary.macro_f1, 1.0);
    }

    #[test]
    fn test_partial_prediction() {
        let mut eval = Evaluation::new();
        let reference = ["B-PER", "I-PER", "O", "B-LOC"];
        let prediction = ["B-PER", "O", "O", "B-LOC"];
        eval.accumulate(&reference, Some(&prediction[..]));
        let summary = eval.summary();
        assert!((summary.item_accuracy - 0.75).abs() < 1e-12);
        assert_eq!(summary.sequence_accuracy, 0.0);
        let per = summary.labels["I-PER"];
        assert_eq!(per.observed, 1);
        assert_eq!(per.correct, 0);
        // Só a anotação LOC coincide
        assert_eq!(summary.spans.correct, 1);
        assert!((summary.spans.precision - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_failed_sequence() {
        let mut eval = Evaluation::new();
        eval.accumulate::<_, &str>(&["O", "O"], None);
        let summary = eval.summary();
        assert_eq!(summary.failed_sequences, 1);
        assert_eq!(summary.item_accuracy, 0.0);
        assert!(summary.to_string().contains("1 sem caminho"));
    }
}
