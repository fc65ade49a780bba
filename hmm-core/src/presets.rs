//! # Topologias Prontas
//!
//! Dois etiquetadores sobre o mesmo motor, diferindo apenas na topologia:
//!
//! - **Classes gramaticais** ([`pos_tagger`]): um estado por tag, todos
//!   conectados entre si.
//! - **Nomes próprios** ([`bio_tagger`]): um estado `other` (tag `O`) e, para
//!   cada categoria `X`, um estado de início (`B-X`) e um de continuação
//!   (`I-X`). A continuação só é alcançável a partir do início ou dela mesma,
//!   o que impede sequências como `O I-PER`.
//!
//! Ambos incluem `start -> end` para aceitar sentenças vazias.

use crate::config::HmmConfig;
use crate::error::Result;
use crate::hmm::HmmModel;
use crate::topology::{END, START};

/// Nome do estado fora de anotações.
pub const OTHER_STATE: &str = "other";

pub fn begin_state(category: &str) -> String {
    format!("{category}-begin")
}

pub fn continue_state(category: &str) -> String {
    format!("{category}-cont")
}

/// Etiquetador totalmente conectado: um estado por tag.
pub fn pos_tagger<S: AsRef<str>>(tags: &[S], config: HmmConfig) -> Result<HmmModel> {
    let mut model = HmmModel::new(config);
    model.add_state(START, "")?;
    for tag in tags {
        model.add_state(tag.as_ref(), tag.as_ref())?;
    }
    model.add_state(END, "")?;

    model.add_transition(START, END)?;
    for from in tags {
        model.add_transition(START, from.as_ref())?;
        model.add_transition(from.as_ref(), END)?;
        for to in tags {
            model.add_transition(from.as_ref(), to.as_ref())?;
        }
    }
    model.resolve()?;
    Ok(model)
}

/// Etiquetador BIO para as categorias dadas (ex: `PER`, `ORG`, `LOC`).
pub fn bio_tagger<S: AsRef<str>>(categories: &[S], config: HmmConfig) -> Result<HmmModel> {
    let mut model = HmmModel::new(config);
    model.add_state(START, "")?;
    model.add_state(OTHER_STATE, "O")?;
    for category in categories {
        let category = category.as_ref();
        model.add_state(&begin_state(category), &format!("B-{category}"))?;
        model.add_state(&continue_state(category), &format!("I-{category}"))?;
    }
    model.add_state(END, "")?;

    // Destinos comuns a todo estado: fora, qualquer início, fim.
    let mut open: Vec<String> = vec![OTHER_STATE.to_string(), END.to_string()];
    open.extend(categories.iter().map(|c| begin_state(c.as_ref())));

    let mut sources = vec![START.to_string(), OTHER_STATE.to_string()];
    for category in categories {
        let category = category.as_ref();
        let (begin, cont) = (begin_state(category), continue_state(category));
        model.add_transition(&begin, &cont)?;
        model.add_transition(&cont, &cont)?;
        sources.push(begin);
        sources.push(cont);
    }
    for from in &sources {
        for to in &open {
            model.add_transition(from, to)?;
        }
    }
    model.resolve()?;
    Ok(model)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::tokens_from_words;

    #[test]
    fn test_pos_topology_is_fully_connected() {
        let model = pos_tagger(&["noun", "verb"], HmmConfig::default()).unwrap();
        let topo = model.topology();
        assert_eq!(topo.len(), 4);
        let noun = topo.id("noun").unwrap();
        // noun -> noun, verb, end
        assert_eq!(topo.state(noun).transitions().count(), 3);
        let start = topo.start().unwrap();
        assert_eq!(topo.state(start).transitions().count(), 3);
    }

    #[test]
    fn test_bio_continuation_only_after_begin() {
        let model = bio_tagger(&["PER", "LOC"], HmmConfig::default()).unwrap();
        let topo = model.topology();
        let cont = topo.id("PER-cont").unwrap();
        let mut preds: Vec<&str> = topo
            .predecessors(cont)
            .iter()
            .map(|&s| topo.state(s).name.as_str())
            .collect();
        preds.sort();
        assert_eq!(preds, vec!["PER-begin", "PER-cont"]);
        assert_eq!(topo.state(cont).tag, "I-PER");
    }

    #[test]
    fn test_bio_trains_strictly() {
        let mut model = bio_tagger(&["PER"], HmmConfig::default()).unwrap();
        let tokens = tokens_from_words(&["Dona", "Ivone", "Lara", "cantou"]);
        let tags: Vec<String> = ["B-PER", "I-PER", "I-PER", "O"]
            .iter()
            .map(|t| t.to_string())
            .collect();
        model.train_strict(&tokens, &tags).unwrap();
        model.finalize().unwrap();
        let decoded = model.decode_best_tags(&tokens).unwrap().unwrap();
        assert_eq!(decoded, tags);
    }
}
