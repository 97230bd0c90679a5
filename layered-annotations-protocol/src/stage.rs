//! The processing stage interface and parameter binding.

use std::collections::BTreeMap;

use layered_annotations::{Document, DEFAULT_SET};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::{Corpus, StageError, StageResult};

/// A parameter a stage accepts, with the value used when the host omits it.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSpec {
    pub name: String,
    pub default: Option<Value>,
}

impl ParameterSpec {
    /// A parameter that is left unbound when the host does not supply it.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default: None,
        }
    }

    pub fn with_default(name: impl Into<String>, default: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            default: Some(default.into()),
        }
    }
}

/// Parameter values bound by name against a stage's declared parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoundParameters {
    values: BTreeMap<String, Value>,
}

impl BoundParameters {
    /// Bind each declared parameter to the supplied value, else its default.
    ///
    /// Supplied names the stage did not declare are ignored.
    pub fn bind(specs: &[ParameterSpec], supplied: &Map<String, Value>) -> Self {
        let values = specs
            .iter()
            .filter_map(|spec| {
                let value = supplied.get(&spec.name).or(spec.default.as_ref())?;
                Some((spec.name.clone(), value.clone()))
            })
            .collect();
        Self { values }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    /// Deserialize a bound value; `Ok(None)` when it is unbound.
    pub fn get_as<T: DeserializeOwned>(&self, name: &str) -> StageResult<Option<T>> {
        self.get(name)
            .map(|value| {
                serde_json::from_value(value.clone()).map_err(|source| StageError::Parameter {
                    name: name.to_string(),
                    source,
                })
            })
            .transpose()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> + '_ {
        self.values.iter().map(|(name, value)| (name.as_str(), value))
    }
}

/// Per-document context handed to [`ProcessingStage::process`].
#[derive(Debug, Clone, Copy)]
pub struct StageContext<'a> {
    parameters: &'a BoundParameters,
    input_set: &'a str,
    output_set: &'a str,
    corpus: Option<&'a Corpus>,
}

impl<'a> StageContext<'a> {
    pub fn new(parameters: &'a BoundParameters, input_set: &'a str, output_set: &'a str) -> Self {
        Self {
            parameters,
            input_set,
            output_set,
            corpus: None,
        }
    }

    /// Takes self
    pub fn with_corpus(mut self, corpus: &'a Corpus) -> Self {
        self.corpus = Some(corpus);
        self
    }

    /// The corpus named by BEGIN_EXECUTION.
    pub fn corpus(&self) -> Option<&'a Corpus> {
        self.corpus
    }

    pub fn parameters(&self) -> &'a BoundParameters {
        self.parameters
    }

    /// Set the stage should read from; the default set unless the host named one.
    pub fn input_set(&self) -> &'a str {
        self.input_set
    }

    /// Set the stage should write to; the default set unless the host named one.
    pub fn output_set(&self) -> &'a str {
        self.output_set
    }
}

impl Default for StageContext<'static> {
    fn default() -> Self {
        static EMPTY: BoundParameters = BoundParameters {
            values: BTreeMap::new(),
        };
        Self::new(&EMPTY, DEFAULT_SET, DEFAULT_SET)
    }
}

/// A unit of work the host runs over each document.
///
/// Only [`process`](Self::process) is required. Lifecycle hooks receive the
/// parameters bound when execution began.
pub trait ProcessingStage {
    fn parameters(&self) -> Vec<ParameterSpec> {
        Vec::new()
    }

    /// Runs once after `BEGIN_EXECUTION`.
    fn start(&mut self, _parameters: &BoundParameters) -> StageResult {
        Ok(())
    }

    fn process(&mut self, document: &mut Document, context: &StageContext<'_>) -> StageResult;

    /// Runs once on `END_EXECUTION` or when the channel closes.
    fn finish(&mut self, _parameters: &BoundParameters) -> StageResult {
        Ok(())
    }

    /// Runs on `ABORT_EXECUTION`.
    fn abort(&mut self, _parameters: &BoundParameters) -> StageResult {
        Ok(())
    }
}

impl<S: ProcessingStage + ?Sized> ProcessingStage for Box<S> {
    fn parameters(&self) -> Vec<ParameterSpec> {
        (**self).parameters()
    }

    fn start(&mut self, parameters: &BoundParameters) -> StageResult {
        (**self).start(parameters)
    }

    fn process(&mut self, document: &mut Document, context: &StageContext<'_>) -> StageResult {
        (**self).process(document, context)
    }

    fn finish(&mut self, parameters: &BoundParameters) -> StageResult {
        (**self).finish(parameters)
    }

    fn abort(&mut self, parameters: &BoundParameters) -> StageResult {
        (**self).abort(parameters)
    }
}

/// Adapts a closure into a [`ProcessingStage`] with no lifecycle hooks.
pub struct FnStage<F> {
    parameters: Vec<ParameterSpec>,
    process: F,
}

impl<F> FnStage<F>
where
    F: FnMut(&mut Document, &StageContext<'_>) -> StageResult,
{
    pub fn new(process: F) -> Self {
        Self {
            parameters: Vec::new(),
            process,
        }
    }

    /// Takes self
    pub fn with_parameter(mut self, spec: ParameterSpec) -> Self {
        self.parameters.push(spec);
        self
    }
}

impl<F> ProcessingStage for FnStage<F>
where
    F: FnMut(&mut Document, &StageContext<'_>) -> StageResult,
{
    fn parameters(&self) -> Vec<ParameterSpec> {
        self.parameters.clone()
    }

    fn process(&mut self, document: &mut Document, context: &StageContext<'_>) -> StageResult {
        (self.process)(document, context)
    }
}
