//! A tokenizer stage: reads documents from the host on stdin, writes one
//! `Token` annotation per word to the output set, answers on stdout.
//!
//! Set `RUST_LOG=debug` to trace frames on stderr.
//!
//! Parameters:
//! - `outputAS`: set receiving the tokens (default set when absent)
//! - `annotationType`: type name for the tokens, `Token` by default
//!
//! A TOML session config is read from the path in
//! `LAYERED_ANNOTATIONS_CONFIG` when that variable is set.

use std::path::PathBuf;
use std::process::ExitCode;

use layered_annotations::{Document, FeatureMap, SourcedString};
use layered_annotations_protocol::{
    BoundParameters, ParameterSpec, ProcessingStage, Session, SessionConfig, StageContext,
    StageResult,
};
use serde_json::Value;

const CONFIG_ENV: &str = "LAYERED_ANNOTATIONS_CONFIG";

#[derive(Debug, Default)]
struct TokenizeStage {
    annotation_type: String,
    documents: usize,
    tokens: usize,
}

impl ProcessingStage for TokenizeStage {
    fn parameters(&self) -> Vec<ParameterSpec> {
        vec![ParameterSpec::with_default("annotationType", "Token")]
    }

    fn start(&mut self, parameters: &BoundParameters) -> StageResult {
        self.annotation_type = parameters
            .get_str("annotationType")
            .unwrap_or("Token")
            .to_string();
        log::info!("tokenizing into {:?} annotations", self.annotation_type);
        Ok(())
    }

    fn process(&mut self, document: &mut Document, context: &StageContext<'_>) -> StageResult {
        let text = SourcedString::new(document.text());
        let mut output = document.annotations(context.output_set());
        for range in text.word_ranges() {
            let mut features = FeatureMap::new();
            features.insert(
                "string".to_string(),
                Value::String(text.slice(range.clone()).to_string()),
            );
            output.add(range.start, range.end, &self.annotation_type, features)?;
            self.tokens += 1;
        }
        self.documents += 1;
        Ok(())
    }

    fn finish(&mut self, _parameters: &BoundParameters) -> StageResult {
        log::info!(
            "tokenized {} documents into {} tokens",
            self.documents,
            self.tokens
        );
        Ok(())
    }

    fn abort(&mut self, _parameters: &BoundParameters) -> StageResult {
        log::warn!("execution aborted after {} documents", self.documents);
        Ok(())
    }
}

fn main() -> ExitCode {
    env_logger::init();

    let config = match std::env::var_os(CONFIG_ENV) {
        Some(path) => match SessionConfig::load(&PathBuf::from(path)) {
            Ok(config) => config,
            Err(err) => {
                log::error!("{}", err);
                return ExitCode::FAILURE;
            }
        },
        None => SessionConfig::default(),
    };

    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    let mut session =
        Session::new(TokenizeStage::default(), stdin.lock(), stdout.lock()).with_config(config);

    match session.run() {
        Ok(summary) => {
            log::debug!("session finished: {:?}", summary);
            ExitCode::SUCCESS
        }
        Err(err) => {
            log::error!("{}", err);
            ExitCode::FAILURE
        }
    }
}
