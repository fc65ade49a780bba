//! # Corpus Anotado
//!
//! Sentenças etiquetadas agrupadas em **documentos**. O agrupamento importa:
//! o cache de nomes é limpo a cada documento, tanto no treino quanto na
//! decodificação.
//!
//! ## Formato em texto (estilo CoNLL)
//!
//! ```text
//! -DOCSTART-
//! O        O
//! Instituto B-ORG
//! Butantan I-ORG
//!
//! Lula     B-PER
//! ```
//!
//! - uma linha `token TAG` por token (espaços ou tabulação);
//! - linha em branco separa sentenças;
//! - `-DOCSTART-` separa documentos;
//! - linhas com outro número de campos são registradas no log e ignoradas.
//!
//! Um pequeno corpus em Português Brasileiro com anotações BIO acompanha o
//! crate para demonstrações e testes ([`builtin_documents`]).

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::tokenizer::{tokens_from_words, Token};

/// Marcador de início de documento.
pub const DOCSTART: &str = "-DOCSTART-";

/// Uma sentença com uma tag de referência por token.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaggedSentence {
    pub words: Vec<String>,
    pub tags: Vec<String>,
}

impl TaggedSentence {
    pub fn tokens(&self) -> Vec<Token> {
        tokens_from_words(&self.words)
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub sentences: Vec<TaggedSentence>,
}

/// Resultado da leitura de um corpus em texto.
#[derive(Debug, Clone, Default)]
pub struct ParsedCorpus {
    pub documents: Vec<Document>,
    /// Linhas ignoradas (número da linha, conteúdo).
    pub skipped: Vec<(usize, String)>,
}

/// Lê o formato `token TAG`.
pub fn parse_conll(text: &str) -> ParsedCorpus {
    let mut parsed = ParsedCorpus::default();
    let mut document = Document::default();
    let mut sentence = TaggedSentence::default();

    fn close_sentence(document: &mut Document, sentence: &mut TaggedSentence) {
        if !sentence.is_empty() {
            document.sentences.push(std::mem::take(sentence));
        }
    }

    for (index, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() {
            close_sentence(&mut document, &mut sentence);
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        match fields.as_slice() {
            [DOCSTART, ..] => {
                close_sentence(&mut document, &mut sentence);
                if !document.sentences.is_empty() {
                    parsed.documents.push(std::mem::take(&mut document));
                }
            }
            [word, tag] => {
                sentence.words.push(word.to_string());
                sentence.tags.push(tag.to_string());
            }
            _ => {
                tracing::warn!(line = index + 1, content = line, "linha do corpus ignorada");
                parsed.skipped.push((index + 1, line.to_string()));
            }
        }
    }
    close_sentence(&mut document, &mut sentence);
    if !document.sentences.is_empty() {
        parsed.documents.push(document);
    }
    parsed
}

/// Escreve documentos no formato `token TAG`.
pub fn write_conll(documents: &[Document]) -> String {
    let mut out = String::new();
    for document in documents {
        let _ = writeln!(out, "{DOCSTART}\n");
        for sentence in &document.sentences {
            for (word, tag) in sentence.words.iter().zip(&sentence.tags) {
                let _ = writeln!(out, "{word} {tag}");
            }
            out.push('\n');
        }
    }
    out
}

/// Uma sentença do corpus embutido.
///
/// - **B-TYPE**: início de uma entidade do tipo TYPE.
/// - **I-TYPE**: continuação de uma entidade do tipo TYPE.
/// - **O**: fora de qualquer entidade.
pub struct AnnotatedSentence {
    /// Domínio temático; sentenças do mesmo domínio formam um documento.
    pub domain: &'static str,
    /// Pares (palavra, tag_BIO).
    pub annotations: &'static [(&'static str, &'static str)],
}

impl AnnotatedSentence {
    pub fn to_tagged(&self) -> TaggedSentence {
        TaggedSentence {
            words: self.annotations.iter().map(|(w, _)| w.to_string()).collect(),
            tags: self.annotations.iter().map(|(_, t)| t.to_string()).collect(),
        }
    }
}

/// Categorias de entidade do corpus embutido.
pub const CATEGORIES: [&str; 4] = ["PER", "ORG", "LOC", "MISC"];

/// Corpus embutido em PT-BR.
pub fn builtin_corpus() -> Vec<AnnotatedSentence> {
    vec![
        // ===== SAÚDE =====
        AnnotatedSentence {
            domain: "saúde",
            annotations: &[
                ("O", "O"), ("Instituto", "B-ORG"), ("Butantan", "I-ORG"),
                ("produz", "O"), ("vacinas", "O"), ("em", "O"), ("São", "B-LOC"), ("Paulo", "I-LOC"), (".", "O"),
            ],
        },
        AnnotatedSentence {
            domain: "saúde",
            annotations: &[
                ("A", "O"), ("pesquisadora", "O"), ("Margareth", "B-PER"), ("Dalcolmo", "I-PER"),
                ("elogiou", "O"), ("o", "O"), ("Butantan", "B-ORG"), (".", "O"),
            ],
        },
        AnnotatedSentence {
            domain: "saúde",
            annotations: &[
                ("A", "O"), ("Fiocruz", "B-ORG"), ("e", "O"), ("o", "O"), ("Butantan", "B-ORG"),
                ("combatem", "O"), ("a", "O"), ("dengue", "B-MISC"), ("no", "O"), ("Brasil", "B-LOC"), (".", "O"),
            ],
        },
        AnnotatedSentence {
            domain: "saúde",
            annotations: &[
                ("O", "O"), ("médico", "O"), ("Drauzio", "B-PER"), ("Varella", "I-PER"),
                ("visitou", "O"), ("a", "O"), ("Fiocruz", "B-ORG"), ("em", "O"), ("2023", "O"), (".", "O"),
            ],
        },
        // ===== RELIGIÃO =====
        AnnotatedSentence {
            domain: "religião",
            annotations: &[
                ("O", "O"), ("padre", "O"), ("Fábio", "B-PER"), ("de", "I-PER"), ("Melo", "I-PER"),
                ("nasceu", "O"), ("em", "O"), ("Minas", "B-LOC"), ("Gerais", "I-LOC"), (".", "O"),
            ],
        },
        AnnotatedSentence {
            domain: "religião",
            annotations: &[
                ("O", "O"), ("Candomblé", "B-MISC"), ("é", "O"), ("praticado", "O"),
                ("na", "O"), ("Bahia", "B-LOC"), ("e", "O"), ("no", "O"), ("Brasil", "B-LOC"), (".", "O"),
            ],
        },
        AnnotatedSentence {
            domain: "religião",
            annotations: &[
                ("A", "O"), ("Umbanda", "B-MISC"), ("surgiu", "O"), ("no", "O"), ("Brasil", "B-LOC"),
                ("e", "O"), ("Melo", "B-PER"), ("escreveu", "O"), ("sobre", "O"), ("o", "O"), ("Candomblé", "B-MISC"), (".", "O"),
            ],
        },
        // ===== ESPORTES =====
        AnnotatedSentence {
            domain: "esportes",
            annotations: &[
                ("Vinícius", "B-PER"), ("Jr.", "I-PER"), ("joga", "O"), ("no", "O"),
                ("Real", "B-ORG"), ("Madrid", "I-ORG"), (".", "O"),
            ],
        },
        AnnotatedSentence {
            domain: "esportes",
            annotations: &[
                ("A", "O"), ("CBF", "B-ORG"), ("convocou", "O"), ("Endrick", "B-PER"),
                ("para", "O"), ("a", "O"), ("Copa", "B-MISC"), ("América", "I-MISC"), (".", "O"),
            ],
        },
        AnnotatedSentence {
            domain: "esportes",
            annotations: &[
                ("Endrick", "B-PER"), ("marcou", "O"), ("no", "O"), ("Maracanã", "B-LOC"),
                ("contra", "O"), ("a", "O"), ("Argentina", "B-LOC"), (".", "O"),
            ],
        },
    ]
}

/// O corpus embutido agrupado em documentos por domínio, na ordem original.
pub fn builtin_documents() -> Vec<Document> {
    let mut documents: Vec<(&'static str, Document)> = Vec::new();
    for sentence in builtin_corpus() {
        let tagged = sentence.to_tagged();
        match documents.last_mut() {
            Some((domain, document)) if *domain == sentence.domain => {
                document.sentences.push(tagged);
                continue;
            }
            _ => {}
        }
        documents.push((
            sentence.domain,
            Document {
                sentences: vec![tagged],
            },
        ));
    }
    documents.into_iter().map(|(_, d)| d).collect()
}

/// Texto de demonstração para o etiquetador de nomes.
pub fn demo_text() -> &'static str {
    "O Instituto Butantan produz vacinas em São Paulo. A pesquisadora Margareth Dalcolmo \
     elogiou o Butantan. Endrick marcou no Maracanã."
}
