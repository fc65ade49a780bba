//! # Tokens e Tokenização
//!
//! O motor HMM consome sequências de [`Token`]: o texto do token, sua posição no
//! texto original e um mapa de **atributos** (ex: `shape=capitalized`). Os
//! atributos alimentam as restrições de feature dos estados
//! ([`crate::topology::FeatureConstraint`]).
//!
//! A segmentação usa as regras Unicode de palavras e sentenças
//! (`unicode-segmentation`), descartando espaços em branco.
//!
//! ## Formas de token
//!
//! | Forma         | Exemplos                  |
//! |---------------|---------------------------|
//! | `digits`      | `2023`, `3,5`, `1.000`    |
//! | `capitalized` | `Brasil`, `Petrobras`     |
//! | `lower`       | `vacina`, `big`           |
//! | `other`       | `.`, `Covid-19`, `#tag`   |

use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use unicode_segmentation::UnicodeSegmentation;

/// Nome do atributo que carrega a forma do token.
pub const SHAPE_ATTRIBUTE: &str = "shape";

/// Um token extraído do texto (ou fornecido diretamente pelo chamador).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Token {
    /// O texto do token (ex: "Lula", ",", "presidente").
    pub text: String,
    /// Índice de byte inicial no texto original (inclusive).
    pub start: usize,
    /// Índice de byte final no texto original (exclusivo).
    pub end: usize,
    /// Índice sequencial do token na sentença.
    pub index: usize,
    /// Atributos nomeados consultados pelas restrições de feature.
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl Token {
    /// Cria um token isolado, já com o atributo `shape`.
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let end = text.len();
        let mut token = Self {
            text,
            start: 0,
            end,
            index: 0,
            attributes: BTreeMap::new(),
        };
        let shape = TokenShape::of(&token.text);
        token
            .attributes
            .insert(SHAPE_ATTRIBUTE.to_string(), shape.name().to_string());
        token
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn shape(&self) -> TokenShape {
        TokenShape::of(&self.text)
    }
}

/// Classe ortográfica de um token, usada como back-off para palavras inéditas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenShape {
    Digits,
    Capitalized,
    Lower,
    Other,
}

impl TokenShape {
    pub const COUNT: usize = 4;

    pub fn all() -> [TokenShape; 4] {
        [
            TokenShape::Digits,
            TokenShape::Capitalized,
            TokenShape::Lower,
            TokenShape::Other,
        ]
    }

    /// Classifica o texto de um token.
    pub fn of(text: &str) -> Self {
        static DIGITS: OnceLock<Regex> = OnceLock::new();
        static CAPITALIZED: OnceLock<Regex> = OnceLock::new();
        static LOWER: OnceLock<Regex> = OnceLock::new();

        let digits = DIGITS.get_or_init(|| Regex::new(r"^\p{Nd}+([.,]\p{Nd}+)*$").unwrap());
        let capitalized =
            CAPITALIZED.get_or_init(|| Regex::new(r"^\p{Lu}[\p{L}'.]*$").unwrap());
        let lower = LOWER.get_or_init(|| Regex::new(r"^\p{Ll}[\p{Ll}']*$").unwrap());

        if digits.is_match(text) {
            TokenShape::Digits
        } else if capitalized.is_match(text) {
            TokenShape::Capitalized
        } else if lower.is_match(text) {
            TokenShape::Lower
        } else {
            TokenShape::Other
        }
    }

    pub fn index(self) -> usize {
        match self {
            TokenShape::Digits => 0,
            TokenShape::Capitalized => 1,
            TokenShape::Lower => 2,
            TokenShape::Other => 3,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            TokenShape::Digits => "digits",
            TokenShape::Capitalized => "capitalized",
            TokenShape::Lower => "lower",
            TokenShape::Other => "other",
        }
    }
}

impl fmt::Display for TokenShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Tokeniza um texto em palavras e pontuações, preservando os offsets.
pub fn tokenize(text: &str) -> Vec<Token> {
    tokenize_at(text, 0)
}

fn tokenize_at(text: &str, base: usize) -> Vec<Token> {
    text.split_word_bound_indices()
        .filter(|(_, word)| !word.trim().is_empty())
        .enumerate()
        .map(|(i, (offset, word))| {
            let mut token = Token::new(word);
            token.start = base + offset;
            token.end = base + offset + word.len();
            token.index = i;
            token
        })
        .collect()
}

/// Divide o texto em sentenças e tokeniza cada uma.
///
/// Os offsets dos tokens continuam relativos ao texto completo.
pub fn tokenize_sentences(text: &str) -> Vec<Vec<Token>> {
    text.split_sentence_bound_indices()
        .map(|(offset, sentence)| tokenize_at(sentence, offset))
        .filter(|tokens| !tokens.is_empty())
        .collect()
}

/// Constrói tokens a partir de palavras já segmentadas (ex: um corpus anotado).
pub fn tokens_from_words<S: AsRef<str>>(words: &[S]) -> Vec<Token> {
    words
        .iter()
        .enumerate()
        .map(|(i, word)| {
            let mut token = Token::new(word.as_ref());
            token.index = i;
            token
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shapes() {
        assert_eq!(TokenShape::of("2023"), TokenShape::Digits);
        assert_eq!(TokenShape::of("3,5"), TokenShape::Digits);
        assert_eq!(TokenShape::of("Brasil"), TokenShape::Capitalized);
        assert_eq!(TokenShape::of("Dr."), TokenShape::Capitalized);
        assert_eq!(TokenShape::of("vacina"), TokenShape::Lower);
        assert_eq!(TokenShape::of("ação"), TokenShape::Lower);
        assert_eq!(TokenShape::of("."), TokenShape::Other);
        assert_eq!(TokenShape::of("Covid-19"), TokenShape::Other);
    }

    #[test]
    fn test_tokenize_offsets() {
        let text = "O Brasil venceu.";
        let tokens = tokenize(text);
        let words: Vec<&str> = tokens.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(words, vec!["O", "Brasil", "venceu", "."]);
        for token in &tokens {
            assert_eq!(&text[token.start..token.end], token.text);
        }
        assert_eq!(tokens[1].attribute(SHAPE_ATTRIBUTE), Some("capitalized"));
        assert_eq!(tokens[3].index, 3);
    }

    #[test]
    fn test_sentences_keep_global_offsets() {
        let text = "Lula viajou. Dilma ficou.";
        let sentences = tokenize_sentences(text);
        assert_eq!(sentences.len(), 2);
        let dilma = &sentences[1][0];
        assert_eq!(dilma.text, "Dilma");
        assert_eq!(&text[dilma.start..dilma.end], "Dilma");
        assert_eq!(dilma.index, 0);
    }

    #[test]
    fn test_tokens_from_words() {
        let tokens = tokens_from_words(&["big", "cat"]);
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[1].index, 1);
        assert_eq!(tokens[1].shape(), TokenShape::Lower);
    }
}
