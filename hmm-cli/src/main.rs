//! Linha de comando do motor HMM: treino, etiquetagem, margens e avaliação.
//!
//! ```text
//! hmm train --preset bio --corpus treino.conll --output modelo.hmm
//! hmm tag --model modelo.hmm --alternatives 3 texto.txt
//! hmm margins --model modelo.hmm --review 5 texto.txt
//! hmm eval --model modelo.hmm teste.conll
//! ```
//!
//! O log vai para stderr (`RUST_LOG`, padrão `info`); os resultados vão para
//! stdout, em JSON por linha.

use std::collections::BTreeSet;
use std::fs;
use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use hmm_core::corpus::{builtin_documents, demo_text, parse_conll, Document};
use hmm_core::persistence::{load_model, save_model};
use hmm_core::pipeline::{least_confident, tag_documents, PipelineOptions, TaggingPipeline};
use hmm_core::presets::{bio_tagger, pos_tagger};
use hmm_core::tagset::annotation_kind;
use hmm_core::{HmmConfig, HmmModel};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "hmm", version, about = "Etiquetador de sequências com HMM")]
#[command(propagate_version = true)]
struct Cli {
    /// Configuração do modelo em JSON
    #[arg(short, long, global = true, value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// Verbosidade do log (-v, -vv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Treina um modelo e grava no formato de texto
    Train {
        /// Topologia pronta; as tags ou categorias vêm do corpus
        #[arg(long, value_enum, conflicts_with = "topology")]
        preset: Option<Preset>,
        /// Arquivo de modelo usado só pela topologia (contagens descartadas)
        #[arg(long, value_name = "MODEL")]
        topology: Option<PathBuf>,
        /// Corpus `token TAG`; sem ele, usa o corpus embutido
        #[arg(long, value_name = "CONLL")]
        corpus: Option<PathBuf>,
        #[arg(short, long, value_name = "MODEL")]
        output: PathBuf,
    },
    /// Etiqueta texto bruto (um documento por arquivo; stdin ou demonstração sem arquivos)
    Tag {
        #[arg(short, long, value_name = "MODEL")]
        model: PathBuf,
        /// Caminhos alternativos por sentença
        #[arg(short = 'k', long, default_value_t = 0)]
        alternatives: usize,
        /// Calcular a margem local de cada anotação
        #[arg(long)]
        span_margins: bool,
        inputs: Vec<PathBuf>,
    },
    /// Margem local por anotação e as sentenças menos confiáveis
    Margins {
        #[arg(short, long, value_name = "MODEL")]
        model: PathBuf,
        /// Quantas sentenças sugerir para revisão
        #[arg(long, default_value_t = 5)]
        review: usize,
        inputs: Vec<PathBuf>,
    },
    /// Compara as tags previstas com um corpus de referência
    Eval {
        #[arg(short, long, value_name = "MODEL")]
        model: PathBuf,
        /// Saída em JSON em vez de texto
        #[arg(long)]
        json: bool,
        corpus: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Preset {
    /// Um estado por tag, totalmente conectado
    Pos,
    /// Início/continuação por categoria
    Bio,
}

/// Linha de saída do subcomando `margins`.
#[derive(Serialize)]
struct SpanMargin<'a> {
    document: usize,
    sentence: usize,
    label: &'a str,
    text: &'a str,
    local_margin: Option<f64>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let config = match &cli.config {
        Some(path) => HmmConfig::load(path)
            .with_context(|| format!("falha ao ler a configuração {}", path.display()))?,
        None => HmmConfig::default(),
    };

    match cli.command {
        Command::Train {
            preset,
            topology,
            corpus,
            output,
        } => train(config, preset, topology.as_deref(), corpus.as_deref(), &output),
        Command::Tag {
            model,
            alternatives,
            span_margins,
            inputs,
        } => {
            let options = PipelineOptions {
                alternatives,
                span_margins,
            };
            tag(config, &model, &options, &inputs)
        }
        Command::Margins {
            model,
            review,
            inputs,
        } => margins(config, &model, review, &inputs),
        Command::Eval {
            model,
            json,
            corpus,
        } => eval(config, &model, &corpus, json),
    }
}

fn read_documents(path: Option<&Path>) -> Result<Vec<Document>> {
    let Some(path) = path else {
        info!("usando o corpus embutido");
        return Ok(builtin_documents());
    };
    let text = fs::read_to_string(path)
        .with_context(|| format!("falha ao ler o corpus {}", path.display()))?;
    let parsed = parse_conll(&text);
    if !parsed.skipped.is_empty() {
        tracing::warn!(skipped = parsed.skipped.len(), "linhas do corpus ignoradas");
    }
    Ok(parsed.documents)
}

/// Um texto por arquivo; sem arquivos, um único texto lido de stdin.
/// Com stdin em terminal, usa o texto de demonstração.
fn read_inputs(inputs: &[PathBuf]) -> Result<Vec<String>> {
    if inputs.is_empty() {
        if io::stdin().is_terminal() {
            info!("sem entrada; usando o texto de demonstração");
            return Ok(vec![demo_text().to_string()]);
        }
        let mut text = String::new();
        io::stdin()
            .read_to_string(&mut text)
            .context("falha ao ler stdin")?;
        return Ok(vec![text]);
    }
    inputs
        .iter()
        .map(|path| {
            fs::read_to_string(path).with_context(|| format!("falha ao ler {}", path.display()))
        })
        .collect()
}

fn open_model(path: &Path, config: HmmConfig) -> Result<HmmModel> {
    let (model, report) = load_model(path, config)
        .with_context(|| format!("falha ao carregar o modelo {}", path.display()))?;
    if !report.is_clean() {
        tracing::warn!(skipped = report.skipped.len(), "modelo carregado com linhas ignoradas");
    }
    Ok(model)
}

fn train(
    config: HmmConfig,
    preset: Option<Preset>,
    topology: Option<&Path>,
    corpus: Option<&Path>,
    output: &Path,
) -> Result<()> {
    let documents = read_documents(corpus)?;
    let tags: BTreeSet<&str> = documents
        .iter()
        .flat_map(|d| &d.sentences)
        .flat_map(|s| &s.tags)
        .map(String::as_str)
        .collect();

    let mut model = match (preset, topology) {
        (Some(Preset::Pos), _) => pos_tagger(&tags.iter().collect::<Vec<_>>(), config)?,
        (Some(Preset::Bio), _) => {
            let categories: BTreeSet<&str> =
                tags.iter().copied().filter_map(annotation_kind).collect();
            bio_tagger(&categories.into_iter().collect::<Vec<_>>(), config)?
        }
        (None, Some(path)) => {
            let mut model = open_model(path, config)?;
            model.reset_for_training();
            model
        }
        (None, None) => bail!("informe --preset ou --topology"),
    };

    let report = model.train_corpus(&documents)?;
    model.finalize()?;
    save_model(&model, output)
        .with_context(|| format!("falha ao gravar o modelo {}", output.display()))?;
    info!(
        output = %output.display(),
        states = model.topology().len(),
        trained = report.trained,
        sentences = report.sentences,
        "modelo gravado"
    );
    Ok(())
}

fn tag(config: HmmConfig, path: &Path, options: &PipelineOptions, inputs: &[PathBuf]) -> Result<()> {
    let model = open_model(path, config)?;
    let texts = read_inputs(inputs)?;
    let results = tag_documents(&model, options, &texts)?;
    for document in &results {
        for sentence in &document.sentences {
            println!("{}", serde_json::to_string(sentence)?);
        }
    }
    Ok(())
}

fn margins(config: HmmConfig, path: &Path, review: usize, inputs: &[PathBuf]) -> Result<()> {
    let model = open_model(path, config)?;
    let texts = read_inputs(inputs)?;
    let options = PipelineOptions {
        alternatives: 0,
        span_margins: true,
    };
    let results = tag_documents(&model, &options, &texts)?;
    for (d, document) in results.iter().enumerate() {
        for (s, sentence) in document.sentences.iter().enumerate() {
            for span in &sentence.spans {
                let line = SpanMargin {
                    document: d,
                    sentence: s,
                    label: &span.label,
                    text: &span.text,
                    local_margin: span.local_margin,
                };
                println!("{}", serde_json::to_string(&line)?);
            }
        }
    }
    for candidate in least_confident(&results, review) {
        info!(
            document = candidate.document,
            sentence = candidate.sentence,
            margin = candidate.margin,
            "sugerida para revisão"
        );
    }
    Ok(())
}

fn eval(config: HmmConfig, path: &Path, corpus: &Path, json: bool) -> Result<()> {
    let model = open_model(path, config)?;
    let documents = read_documents(Some(corpus))?;
    let mut pipeline = TaggingPipeline::new(model, PipelineOptions::default());
    let summary = pipeline.evaluate(&documents)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("{summary}");
    }
    Ok(())
}
