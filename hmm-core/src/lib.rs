//! # hmm-core — Motor de Etiquetagem de Sequências com HMM
//!
//! Este crate implementa um motor reutilizável de **Hidden Markov Models** para
//! etiquetar sequências de tokens: classes gramaticais, nomes próprios ou
//! qualquer esquema de tags. Os etiquetadores diferem apenas na topologia de
//! estados e no modelo de emissão de cada estado; o motor é o mesmo.
//!
//! ## Arquitetura
//!
//! 1.  **Topologia** ([`topology`]): estados nomeados, tags de saída,
//!     restrições de feature e transições esparsas.
//! 2.  **Emissão** ([`emission`]): um modelo plugável por estado, com back-off
//!     para a forma do token.
//! 3.  **Treino** ([`trainer`]): algoritmo estrito e alinhamento forçado.
//! 4.  **Decodificação** ([`viterbi`]): treliça de Viterbi com margem global e
//!     margem local.
//! 5.  **K melhores** ([`kbest`]): caminhos alternativos gerados sob demanda
//!     sobre a mesma treliça.
//! 6.  **Cache de nomes** ([`cache`]): consistência "uma tag por entidade por
//!     documento".
//!
//! ## Exemplo de Uso
//!
//! ```rust
//! use hmm_core::{tokens_from_words, HmmModel};
//!
//! let mut model = HmmModel::default();
//! model.add_state("start", "").unwrap();
//! model.add_state("adj", "adj").unwrap();
//! model.add_state("noun", "noun").unwrap();
//! model.add_state("end", "").unwrap();
//! for (from, to) in [("start", "adj"), ("adj", "adj"), ("adj", "noun"),
//!                    ("noun", "noun"), ("noun", "end")] {
//!     model.add_transition(from, to).unwrap();
//! }
//!
//! let words = tokens_from_words(&["big", "big", "cat", "nap"]);
//! let tags: Vec<String> = ["adj", "adj", "noun", "noun"].iter().map(|t| t.to_string()).collect();
//! model.train(&words, &tags).unwrap();
//! model.finalize().unwrap();
//!
//! let decoded = model.decode_best_tags(&words).unwrap().unwrap();
//! assert_eq!(decoded, tags);
//! ```
//!
//! ## Módulos de Apoio
//!
//! - [`persistence`]: formato de arquivo do modelo.
//! - [`presets`]: topologias prontas (classes gramaticais e BIO).
//! - [`corpus`]: leitura de corpus anotado e um corpus PT-BR embutido.
//! - [`pipeline`]: texto → sentenças → tags → anotações, com margens.
//! - [`evaluation`]: acurácia e precisão/revocação/F1.

pub mod cache;
pub mod config;
pub mod corpus;
pub mod emission;
pub mod error;
pub mod evaluation;
pub mod hmm;
pub mod kbest;
pub mod persistence;
pub mod pipeline;
pub mod presets;
pub mod tagset;
pub mod tokenizer;
pub mod topology;
pub mod trainer;
pub mod viterbi;

pub use cache::{CacheStats, NameCache};
pub use config::HmmConfig;
pub use emission::{BigramEmitter, EmitCount, Emitter, EmitterKind, ShapeEmitter};
pub use error::{HmmError, Result, TrainFailure};
pub use hmm::{Decoded, HmmModel, Phase, TrainingReport};
pub use kbest::RankedPath;
pub use pipeline::{PipelineOptions, TaggingPipeline};
pub use tagset::{ExclusionConstraint, TagSpan};
pub use tokenizer::{tokenize, tokens_from_words, Token};
pub use topology::{FeatureConstraint, StateId, Topology, UNLIKELY};
pub use trainer::TrainingMode;
