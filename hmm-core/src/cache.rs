//! # Cache de Nomes por Documento
//!
//! Dentro de um documento, o mesmo nome tende a receber sempre o mesmo tipo
//! ("uma tag por entidade por documento"). O cache guarda os pares
//! `(token, tag)` já decididos e permite que os estados com tags cacheáveis
//! ganhem um bônus quando o par já foi visto, e uma penalidade equivalente
//! quando não foi.
//!
//! Regras:
//! - o cache é limpo no início de cada documento e só cresce dentro dele;
//! - apenas tags configuradas como cacheáveis são registradas;
//! - `the` e `of` nunca entram no cache (não informativos).

use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};

/// Tokens permanentemente excluídos do cache.
pub const UNCACHEABLE_TOKENS: [&str; 2] = ["the", "of"];

/// Memória `(token, tag)` de um documento.
#[derive(Debug, Clone, Default)]
pub struct NameCache {
    entries: HashSet<(String, String)>,
    cacheable_tags: BTreeSet<String>,
}

impl NameCache {
    pub fn new<S: AsRef<str>>(cacheable_tags: &[S]) -> Self {
        let mut cache = Self::default();
        cache.set_cacheable_tags(cacheable_tags);
        cache
    }

    pub fn set_cacheable_tags<S: AsRef<str>>(&mut self, tags: &[S]) {
        self.cacheable_tags = tags.iter().map(|t| t.as_ref().to_string()).collect();
    }

    pub fn is_cacheable_tag(&self, tag: &str) -> bool {
        self.cacheable_tags.contains(tag)
    }

    pub fn is_cacheable_token(token: &str) -> bool {
        !UNCACHEABLE_TOKENS
            .iter()
            .any(|skip| skip.eq_ignore_ascii_case(token))
    }

    /// O par participa do cache (tag cacheável e token informativo)?
    pub fn applies(&self, token: &str, tag: &str) -> bool {
        self.is_cacheable_tag(tag) && Self::is_cacheable_token(token)
    }

    pub fn contains(&self, token: &str, tag: &str) -> bool {
        self.entries.contains(&(token.to_string(), tag.to_string()))
    }

    /// Registra a decisão; devolve `true` se o par é novo.
    pub fn record(&mut self, token: &str, tag: &str) -> bool {
        if !self.applies(token, tag) {
            return false;
        }
        self.entries.insert((token.to_string(), tag.to_string()))
    }

    /// Início de documento.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Estatísticas de interação com o cache de um estado (`PREVTAGGED`).
///
/// - `same`: quantas vezes, no treino, o token já estava no cache com a tag do estado;
/// - `other`: quantas vezes não estava.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub same: f64,
    pub other: f64,
}

impl CacheStats {
    pub fn observe(&mut self, cached: bool) {
        if cached {
            self.same += 1.0;
        } else {
            self.other += 1.0;
        }
    }

    /// Termo aditivo (log) aplicado à emissão: `+m` se o par já está no
    /// cache, `-m` se não está.
    ///
    /// $$ m = \ln\left(1 + \frac{same + 1}{other + 1}\right) $$
    ///
    /// `m` é sempre positivo e cresce com a frequência, no treino, de
    /// repetições já cacheadas. Sem estatísticas, vale zero.
    pub fn bonus(&self, cached: bool) -> f64 {
        if self.is_empty() {
            return 0.0;
        }
        let magnitude = (1.0 + (self.same + 1.0) / (self.other + 1.0)).ln();
        if cached {
            magnitude
        } else {
            -magnitude
        }
    }

    pub fn is_empty(&self) -> bool {
        self.same == 0.0 && self.other == 0.0
    }
}
