//! # Formato de Arquivo do Modelo
//!
//! Texto orientado a linhas; cada linha após `STATE` descreve o estado corrente:
//!
//! ```text
//! # comentário
//! EMITTER bigram
//! STATE person
//! TAG PER
//! FEATURE shape capitalized
//! ARC TO end 5
//! EMIT Smith 2
//! EMIT Smith Dr 1
//! PREVTAGGED same 9
//! PREVTAGGED other 1
//! ```
//!
//! | Linha                           | Efeito                                         |
//! |---------------------------------|------------------------------------------------|
//! | `EMITTER shape\|bigram`         | variante de emissão de todos os estados        |
//! | `STATE <nome>`                  | novo estado (ou zera as contagens de um existente) |
//! | `TAG <tag>`                     | tag de saída                                   |
//! | `FEATURE <nome> <valor>...`     | restrição de feature                           |
//! | `ARC TO <destino> [contagem]`   | transição (destino resolvido no fim)           |
//! | `EMIT <token> [anterior] <n>`   | contagem de emissão (unigrama ou bigrama)      |
//! | `PREVTAGGED same\|other <n>`    | estatística de interação com o cache           |
//!
//! Linhas malformadas são registradas no log, anotadas no [`LoadReport`] e
//! ignoradas; o resto do arquivo carrega normalmente. Sem linha `EMITTER`, um
//! arquivo com contagens de bigrama é lido com [`EmitterKind::Bigram`]; caso
//! contrário vale o emissor da configuração. Uma contagem que o emissor não
//! representa entra no relatório, nunca é descartada em silêncio. Ao final os nomes são
//! resolvidos e o modelo é finalizado: pronto para decodificar.

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use crate::config::HmmConfig;
use crate::emission::{EmitCount, EmitterKind};
use crate::error::{HmmError, Result};
use crate::hmm::HmmModel;
use crate::topology::{FeatureConstraint, StateId};

/// Problemas encontrados durante a carga.
#[derive(Debug, Default)]
pub struct LoadReport {
    pub skipped: Vec<HmmError>,
}

impl LoadReport {
    pub fn is_clean(&self) -> bool {
        self.skipped.is_empty()
    }
}

/// Serializa topologia e contagens brutas.
pub fn write_model(model: &HmmModel) -> String {
    let topology = model.topology();
    let mut out = String::from("# modelo HMM\n");
    let _ = writeln!(out, "EMITTER {}\n", topology.emitter_kind().name());
    for state in topology.states() {
        let _ = writeln!(out, "STATE {}", state.name);
        if !state.tag.is_empty() {
            let _ = writeln!(out, "TAG {}", state.tag);
        }
        if let Some(feature) = &state.feature {
            let values: Vec<&str> = feature.values.iter().map(String::as_str).collect();
            let _ = writeln!(out, "FEATURE {} {}", feature.name, values.join(" "));
        }
        for arc in state.transitions() {
            let target = &topology.state(arc.target).name;
            let _ = writeln!(out, "ARC TO {} {}", target, arc.count);
        }
        for (target, count) in state.pending_transitions() {
            let _ = writeln!(out, "ARC TO {target} {count}");
        }
        for emit in state.emitter.counts() {
            match &emit.prior {
                None => {
                    let _ = writeln!(out, "EMIT {} {}", emit.token, emit.count);
                }
                Some(prior) => {
                    let _ = writeln!(out, "EMIT {} {} {}", emit.token, prior, emit.count);
                }
            }
        }
        if !state.cache_stats.is_empty() {
            let _ = writeln!(out, "PREVTAGGED same {}", state.cache_stats.same);
            let _ = writeln!(out, "PREVTAGGED other {}", state.cache_stats.other);
        }
        out.push('\n');
    }
    out
}

pub fn save_model(model: &HmmModel, path: impl AsRef<Path>) -> Result<()> {
    fs::write(path, write_model(model))?;
    Ok(())
}

pub fn load_model(path: impl AsRef<Path>, config: HmmConfig) -> Result<(HmmModel, LoadReport)> {
    let text = fs::read_to_string(path)?;
    read_model(&text, config)
}

/// Lê o texto de um modelo e devolve-o já finalizado.
pub fn read_model(text: &str, mut config: HmmConfig) -> Result<(HmmModel, LoadReport)> {
    if let Some(kind) = stored_emitter(text) {
        if kind != config.emitter {
            tracing::info!(emitter = kind.name(), "emissor definido pelo arquivo do modelo");
        }
        config.emitter = kind;
    }
    let mut model = HmmModel::new(config);
    let mut report = LoadReport::default();
    let mut current: Option<StateId> = None;

    for (index, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Err(message) = apply_line(&mut model, &mut current, line) {
            let number = index + 1;
            tracing::warn!(line = number, %message, "linha do modelo ignorada");
            report.skipped.push(HmmError::Parse {
                line: number,
                message,
            });
        }
    }

    let topology = model.topology_mut();
    if let Err(err) = topology.resolve() {
        report.skipped.push(err);
    }
    topology.recount_states();
    model.finalize()?;
    tracing::info!(
        states = model.topology().len(),
        skipped = report.skipped.len(),
        "modelo carregado"
    );
    Ok((model, report))
}

/// Variante de emissão gravada no arquivo: a linha `EMITTER`, ou bigrama se
/// houver alguma linha `EMIT` com token anterior.
fn stored_emitter(text: &str) -> Option<EmitterKind> {
    let mut bigram = false;
    for line in text.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        match fields.as_slice() {
            ["EMITTER", name] => {
                if let Some(kind) = EmitterKind::from_name(name) {
                    return Some(kind);
                }
            }
            ["EMIT", _, _, _] => bigram = true,
            _ => {}
        }
    }
    bigram.then_some(EmitterKind::Bigram)
}

fn parse_count(text: &str) -> std::result::Result<f64, String> {
    match text.parse::<f64>() {
        Ok(count) if count.is_finite() && count >= 0.0 => Ok(count),
        _ => Err(format!("contagem inválida: {text:?}")),
    }
}

fn apply_line(
    model: &mut HmmModel,
    current: &mut Option<StateId>,
    line: &str,
) -> std::result::Result<(), String> {
    let mut fields = line.split_whitespace();
    let keyword = fields.next().unwrap_or_default();
    let args: Vec<&str> = fields.collect();
    let topology = model.topology_mut();

    if keyword == "EMITTER" {
        // Já aplicado antes da leitura; aqui só se valida.
        return match args.as_slice() {
            [name] if EmitterKind::from_name(name).is_some() => Ok(()),
            _ => Err(format!("EMITTER desconhecido: {:?}", args.join(" "))),
        };
    }

    if keyword == "STATE" {
        let [name] = args.as_slice() else {
            return Err("STATE espera exatamente um nome".into());
        };
        let id = match topology.id(name) {
            Some(id) => {
                topology.state_mut(id).reset_counts();
                id
            }
            None => topology.add_state(name, "").map_err(|e| e.to_string())?,
        };
        *current = Some(id);
        return Ok(());
    }

    let Some(id) = *current else {
        return Err(format!("{keyword} antes de qualquer STATE"));
    };
    match (keyword, args.as_slice()) {
        ("TAG", [tag]) => topology.state_mut(id).tag = tag.to_string(),
        ("FEATURE", [name, values @ ..]) if !values.is_empty() => {
            topology.state_mut(id).feature = Some(FeatureConstraint::new(*name, values));
        }
        ("ARC", ["TO", target]) => {
            topology.add_transition(id, target, 0.0).map_err(|e| e.to_string())?
        }
        ("ARC", ["TO", target, count]) => {
            let count = parse_count(count)?;
            topology
                .add_transition(id, target, count)
                .map_err(|e| e.to_string())?
        }
        ("EMIT", [token, count]) => {
            let count = parse_count(count)?;
            topology
                .state_mut(id)
                .emitter
                .load_count(&EmitCount {
                    token: token.to_string(),
                    prior: None,
                    count,
                })
                .map_err(|e| e.to_string())?;
        }
        ("EMIT", [token, prior, count]) => {
            let count = parse_count(count)?;
            topology
                .state_mut(id)
                .emitter
                .load_count(&EmitCount {
                    token: token.to_string(),
                    prior: Some(prior.to_string()),
                    count,
                })
                .map_err(|e| e.to_string())?;
        }
        ("PREVTAGGED", [kind, count]) => {
            let count = parse_count(count)?;
            let stats = &mut topology.state_mut(id).cache_stats;
            match *kind {
                "same" => stats.same += count,
                "other" => stats.other += count,
                other => return Err(format!("tipo PREVTAGGED desconhecido: {other:?}")),
            }
        }
        ("TAG" | "FEATURE" | "ARC" | "EMIT" | "PREVTAGGED", _) => {
            return Err(format!("argumentos inválidos para {keyword}"))
        }
        _ => return Err(format!("palavra-chave desconhecida: {keyword:?}")),
    }
    Ok(())
}
