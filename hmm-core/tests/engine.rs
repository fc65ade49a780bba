use std::collections::HashSet;

use hmm_core::corpus::{builtin_documents, CATEGORIES};
use hmm_core::persistence::{read_model, write_model};
use hmm_core::presets::{bio_tagger, pos_tagger};
use hmm_core::{tokens_from_words, HmmConfig, HmmError, HmmModel, TrainingMode};

fn tags(list: &[&str]) -> Vec<String> {
    list.iter().map(|t| t.to_string()).collect()
}

/// start, adj, noun, end: todas as transições entre adj e noun.
fn big_cat(config: HmmConfig) -> HmmModel {
    let mut model = HmmModel::new(config);
    for (name, tag) in [("start", ""), ("adj", "adj"), ("noun", "noun"), ("end", "")] {
        model.add_state(name, tag).unwrap();
    }
    for (from, to) in [
        ("start", "adj"),
        ("start", "noun"),
        ("adj", "adj"),
        ("adj", "noun"),
        ("adj", "end"),
        ("noun", "noun"),
        ("noun", "adj"),
        ("noun", "end"),
    ] {
        model.add_transition(from, to).unwrap();
    }
    model
        .train(
            &tokens_from_words(&["big", "big", "cat", "nap"]),
            &tags(&["adj", "adj", "noun", "noun"]),
        )
        .unwrap();
    model.finalize().unwrap();
    model
}

fn state_names(model: &HmmModel, states: &[usize]) -> Vec<String> {
    states
        .iter()
        .map(|&s| model.topology().state(s).name.clone())
        .collect()
}

#[test]
fn test_big_big_cat_nap() {
    let mut model = big_cat(HmmConfig::default());
    let tokens = tokens_from_words(&["big", "big", "cat", "nap"]);
    let path = model.decode_best_path(&tokens).unwrap().unwrap();
    assert_eq!(
        state_names(&model, &path),
        vec!["start", "adj", "adj", "noun", "noun", "end"]
    );
}

#[test]
fn test_decoding_is_deterministic() {
    let mut model = big_cat(HmmConfig::default());
    let tokens = tokens_from_words(&["big", "cat", "big", "nap"]);
    let first = model.decode(&tokens).unwrap().unwrap();
    for _ in 0..5 {
        let again = model.decode(&tokens).unwrap().unwrap();
        assert_eq!(again.states, first.states);
        assert_eq!(again.score, first.score);
    }
}

#[test]
fn test_k_best_enumerates_all_paths_in_order() {
    let config = HmmConfig {
        k_best: true,
        record_margin: true,
        ..HmmConfig::default()
    };
    let mut model = big_cat(config);
    let tokens = tokens_from_words(&["big", "big", "cat", "nap"]);
    let best = model.decode(&tokens).unwrap().unwrap();

    let mut seen = HashSet::new();
    seen.insert(best.states.clone());
    let mut previous = best.score;
    let mut first_alternative = None;
    while let Some(path) = model.next_best_path() {
        let scored = model.path_score(&tokens, &path.states).unwrap().unwrap();
        assert!((scored - path.score).abs() < 1e-9);
        assert!(path.score <= previous + 1e-12);
        assert!(seen.insert(path.states.clone()));
        previous = path.score;
        first_alternative.get_or_insert(path);
    }
    // 2^4 sequências de adj/noun
    assert_eq!(seen.len(), 16);
    assert!(model.next_best_path().is_none());

    let second = first_alternative.unwrap();
    assert!(second.score < best.score);
    // Uma única troca de predecessor: igual ao melhor a partir da emenda
    assert_eq!(second.states[second.splice..], best.states[second.splice..]);
    assert!((best.score - second.score - best.margin.unwrap()).abs() < 1e-9);
}

#[test]
fn test_margin_non_negative() {
    let config = HmmConfig {
        record_margin: true,
        ..HmmConfig::default()
    };
    let mut model = big_cat(config);
    for words in [&["big"][..], &["cat", "big"], &["nap", "nap", "big"]] {
        let decoded = model.decode(&tokens_from_words(words)).unwrap().unwrap();
        assert!(decoded.margin.unwrap() >= 0.0);
    }
}

#[test]
fn test_empty_sequence_uses_start_to_end() {
    let config = HmmConfig {
        record_margin: true,
        ..HmmConfig::default()
    };
    let mut model = pos_tagger(&["noun", "verb"], config).unwrap();
    model.finalize().unwrap();
    let decoded = model.decode(&[]).unwrap().unwrap();
    assert_eq!(state_names(&model, &decoded.states), vec!["start", "end"]);
    assert!(decoded.tags.is_empty());
    assert!(decoded.margin.is_none());
    assert!(model.margin().is_none());
}

#[test]
fn test_degenerate_local_margin_has_no_path() {
    let mut model = HmmModel::default();
    for (name, tag) in [("start", ""), ("x1", "X"), ("x2", "X"), ("end", "")] {
        model.add_state(name, tag).unwrap();
    }
    for (from, to) in [
        ("start", "x1"),
        ("start", "x2"),
        ("x1", "x2"),
        ("x2", "x1"),
        ("x1", "end"),
        ("x2", "end"),
    ] {
        model.add_transition(from, to).unwrap();
    }
    model.finalize().unwrap();
    let tokens = tokens_from_words(&["a", "b", "c"]);
    assert!(model.decode(&tokens).unwrap().is_some());
    assert_eq!(model.local_margin(&tokens, "X", 0, 2).unwrap(), None);
    // Uma exclusão parcial ainda deixa o caminho inexistente: todo estado é X
    assert_eq!(model.local_margin(&tokens, "X", 1, 1).unwrap(), None);
}

#[test]
fn test_local_margin_respects_continuation_after_range() {
    let mut model = bio_tagger(&CATEGORIES, HmmConfig::default()).unwrap();
    model.train_corpus(&builtin_documents()).unwrap();
    model.finalize().unwrap();
    let tokens = tokens_from_words(&["O", "padre", "Fábio", "de", "Melo", "nasceu"]);
    let decoded = model.decode_uncommitted(&tokens).unwrap().unwrap();
    assert_eq!(decoded.tags[2], "B-PER");

    // Proibir PER só no primeiro token da anotação força o resto a mudar
    let margin = model.local_margin(&tokens, "PER", 2, 2).unwrap().unwrap();
    assert!(margin > 0.0);
    let whole = model.local_margin(&tokens, "B-PER", 2, 4).unwrap().unwrap();
    assert!(whole > 0.0);
    // Um tipo ausente do melhor caminho não custa nada
    let free = model.local_margin(&tokens, "ORG", 2, 4).unwrap().unwrap();
    assert!(free.abs() < 1e-9);
}

const CACHE_MODEL: &str = "\
STATE start
ARC TO title 1
ARC TO person 1
ARC TO org 1

STATE title
TAG TITLE
EMIT Dr 5
ARC TO person 5

STATE person
TAG PER
EMIT Smith 2
EMIT Jones 3
ARC TO end 5
PREVTAGGED same 9
PREVTAGGED other 1

STATE org
TAG ORG
EMIT Smith 3
EMIT Acme 2
ARC TO end 5
PREVTAGGED same 9
PREVTAGGED other 1

STATE end
";

#[test]
fn test_name_cache_is_scoped_to_document() {
    let config = HmmConfig {
        cacheable_tags: tags(&["PER", "ORG"]),
        ..HmmConfig::default()
    };
    let (mut model, report) = read_model(CACHE_MODEL, config).unwrap();
    assert!(report.is_clean());
    let smith = tokens_from_words(&["Smith"]);

    // Sozinho, "Smith" é mais frequente como organização
    assert_eq!(model.decode_best_tags(&smith).unwrap().unwrap(), tags(&["ORG"]));

    // Mesmo documento: "Dr Smith" fixa Smith como pessoa
    model.new_document();
    let dr_smith = tokens_from_words(&["Dr", "Smith"]);
    assert_eq!(
        model.decode_best_tags(&dr_smith).unwrap().unwrap(),
        tags(&["TITLE", "PER"])
    );
    assert!(model.cache().contains("Smith", "PER"));
    assert_eq!(model.decode_best_tags(&smith).unwrap().unwrap(), tags(&["PER"]));

    // Novo documento: a preferência some
    model.new_document();
    assert_eq!(model.decode_best_tags(&smith).unwrap().unwrap(), tags(&["ORG"]));
    model.new_document();
    assert_eq!(model.decode_best_tags(&smith).unwrap().unwrap(), tags(&["ORG"]));
}

#[test]
fn test_trained_cache_statistics_favour_consistency() {
    let cacheable = tags(&["B-PER", "I-PER", "B-ORG", "I-ORG", "B-LOC", "I-LOC"]);
    let config = HmmConfig {
        cacheable_tags: cacheable.clone(),
        ..HmmConfig::default()
    };
    let mut model = bio_tagger(&CATEGORIES, config).unwrap();
    model.train_corpus(&builtin_documents()).unwrap();
    model.finalize().unwrap();

    let mut with_stats = 0;
    for state in model.topology().states() {
        if state.cache_stats.is_empty() {
            continue;
        }
        with_stats += 1;
        assert!(state.cache_stats.bonus(true) > 0.0, "{}", state.name);
        assert!(state.cache_stats.bonus(false) < 0.0, "{}", state.name);
    }
    assert!(with_stats > 0);

    // Depois de registrada, a mesma análise só pode ficar mais provável
    let tokens = tokens_from_words(&["Drauzio", "Varella", "visitou", "a", "Fiocruz", "."]);
    let decoded = model.decode_uncommitted(&tokens).unwrap().unwrap();
    assert!(decoded.tags.iter().any(|t| cacheable.contains(t)));
    let before = model.path_score(&tokens, &decoded.states).unwrap().unwrap();
    model.commit(&tokens, &decoded.tags);
    let after = model.path_score(&tokens, &decoded.states).unwrap().unwrap();
    assert!(after > before, "{after} <= {before}");
    let again = model.decode_uncommitted(&tokens).unwrap().unwrap();
    assert_eq!(again.tags, decoded.tags);
}

#[test]
fn test_round_trip_reproduces_best_path() {
    let mut model = big_cat(HmmConfig::default());
    let tokens = tokens_from_words(&["big", "cat", "nap", "big"]);
    let original = model.decode(&tokens).unwrap().unwrap();

    let (mut loaded, report) = read_model(&write_model(&model), HmmConfig::default()).unwrap();
    assert!(report.is_clean());
    let reloaded = loaded.decode(&tokens).unwrap().unwrap();
    assert_eq!(reloaded.states, original.states);
    assert!((reloaded.score - original.score).abs() < 1e-12);
}

#[test]
fn test_strict_and_tolerant_training_agree() {
    let corpus = [
        (vec!["o", "gato", "dorme"], vec!["det", "noun", "verb"]),
        (vec!["Ana", "dorme"], vec!["noun", "verb"]),
        (vec!["o", "Ana", "gato"], vec!["det", "noun", "noun"]),
    ];
    let labels = ["det", "noun", "verb"];
    let mut written = Vec::new();
    for mode in [TrainingMode::Strict, TrainingMode::Tolerant] {
        let config = HmmConfig {
            training: mode,
            cacheable_tags: tags(&["noun"]),
            ..HmmConfig::default()
        };
        let mut model = pos_tagger(&labels, config).unwrap();
        for (words, reference) in &corpus {
            model
                .train(&tokens_from_words(words), &tags(reference))
                .unwrap();
        }
        model.finalize().unwrap();
        written.push(write_model(&model));
    }
    assert_eq!(written[0], written[1]);
    assert!(written[0].contains("PREVTAGGED"));
}

#[test]
fn test_missing_end_fails_every_decode() {
    let (mut model, _) = read_model("STATE start\nARC TO a\nSTATE a\nTAG A\n", HmmConfig::default())
        .unwrap();
    let tokens = tokens_from_words(&["x"]);
    for _ in 0..2 {
        assert!(matches!(model.decode(&tokens), Err(HmmError::MissingEnd)));
    }
}
