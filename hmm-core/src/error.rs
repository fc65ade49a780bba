//! # Erros do Motor HMM
//!
//! Três famílias de falha convivem no motor:
//!
//! - **Configuração**: destino de transição desconhecido, estado inicial/final
//!   ausente, linha malformada no arquivo do modelo. São reportadas e o trecho
//!   problemático é descartado; o restante continua utilizável.
//! - **Treino**: caminho de tags ambíguo ou inalcançável. Aborta apenas a
//!   sentença corrente.
//! - **Uso indevido**: decodificar antes de `finalize`, treinar um modelo já
//!   finalizado etc.
//!
//! A ausência de caminho legal na decodificação **não** é erro: é representada
//! por `Ok(None)`.

use thiserror::Error;

use crate::hmm::Phase;

/// Motivo pelo qual o treino de uma sentença foi abortado.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrainFailure {
    /// Nenhuma transição do estado corrente leva a um estado com a tag de referência.
    #[error("nenhuma transição leva à tag {tag:?}")]
    NoMatchingTransition { tag: String },
    /// Mais de uma transição leva à tag de referência (use o treino tolerante).
    #[error("{count} transições levam à tag {tag:?}")]
    MultipleMatchingTransitions { tag: String, count: usize },
    /// O último estado não possui transição para o estado final.
    #[error("o estado {state:?} não possui transição para o estado final")]
    NoTransitionToEnd { state: String },
    /// Uma célula do alinhamento é alcançável por mais de um predecessor.
    #[error("alinhamento ambíguo")]
    Ambiguous,
    /// Não existe caminho consistente com as tags de referência.
    #[error("nenhum caminho consistente com as tags de referência")]
    Unreachable,
}

/// Erro único do crate.
#[derive(Debug, Error)]
pub enum HmmError {
    #[error("estado desconhecido: {0:?}")]
    UnknownState(String),
    #[error("estado duplicado: {0:?}")]
    DuplicateState(String),
    #[error("o modelo não possui estado inicial (\"start\")")]
    MissingStart,
    #[error("o modelo não possui estado final (\"end\")")]
    MissingEnd,
    #[error("transições com destino desconhecido foram descartadas: {}", .0.join(", "))]
    UnresolvedTransitions(Vec<String>),
    #[error("operação {operation:?} inválida na fase {phase:?}")]
    WrongPhase { operation: &'static str, phase: Phase },
    #[error("treino abortado no token {position} ({token:?}): {reason}")]
    Training {
        position: usize,
        token: String,
        reason: TrainFailure,
    },
    #[error("linha {line}: {message}")]
    Parse { line: usize, message: String },
    #[error("intervalo [{start}, {end}] inválido para uma sequência de {len} tokens")]
    InvalidRange { start: usize, end: usize, len: usize },
    #[error("contagem de bigrama ({prior:?}, {token:?}) não cabe em um emissor de unigramas")]
    IncompatibleCount { token: String, prior: String },
    #[error("{tokens} tokens mas {tags} tags de referência")]
    LengthMismatch { tokens: usize, tags: usize },
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, HmmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_carry_context() {
        let err = HmmError::Training {
            position: 2,
            token: "cat".into(),
            reason: TrainFailure::MultipleMatchingTransitions {
                tag: "noun".into(),
                count: 2,
            },
        };
        let msg = err.to_string();
        assert!(msg.contains("token 2"));
        assert!(msg.contains("\"noun\""));

        let err = HmmError::UnresolvedTransitions(vec!["a -> x".into(), "b -> y".into()]);
        assert!(err.to_string().ends_with("a -> x, b -> y"));
    }
}
