use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::str::{FromStr, SplitWhitespace};

use ndarray::{Array1, Array2};

use crate::acoustic::domain::acoustic_model::AcousticModel;
use crate::acoustic::domain::feedforward_network::{FeedForwardNetwork, Layer};
use crate::acoustic::domain::transition_model::TransitionModel;
use crate::shared::decode_error::DecodeError;

/// Reads an acoustic model from a single token stream: the transition model
/// first, then the network.
///
/// ```text
/// <TransitionModel> <NumClasses> 3 <Classes> [ 0 0 1 2 ] </TransitionModel>
/// <Nnet> <InputDim> 13 <LeftContext> 2 <RightContext> 2
///   <Affine> <Input> 65 <Output> 3 <Weights> [ ... ] <Bias> [ ... ]
///   <ReLU> <Tanh> <LogSoftmax>
///   <Priors> [ ... ]
/// </Nnet>
/// ```
///
/// `<Weights>` is row-major `Output x Input`. `<Priors>` holds class prior
/// probabilities; their logs are subtracted from the network output.
pub fn read_model_file(path: &Path) -> Result<AcousticModel, DecodeError> {
    let resource = format!("acoustic model {}", path.display());
    let file = File::open(path).map_err(|e| DecodeError::resource_load(&resource, e.to_string()))?;
    let model = read_model(BufReader::new(file), &resource)?;
    log::info!(
        "Loaded {resource}: {} classes, {} transition ids, input dim {}",
        model.num_classes(),
        model.transitions().num_transition_ids(),
        model.feature_dim()
    );
    Ok(model)
}

pub fn read_model<R: Read>(mut reader: R, resource: &str) -> Result<AcousticModel, DecodeError> {
    let mut text = String::new();
    reader
        .read_to_string(&mut text)
        .map_err(|e| DecodeError::resource_load(resource, e.to_string()))?;

    let mut tokens = Tokens {
        inner: text.split_whitespace(),
        resource,
    };
    let transitions = read_transition_model(&mut tokens)?;
    let network = read_network(&mut tokens)?;
    if let Some(extra) = tokens.next() {
        return Err(tokens.error(format!("unexpected trailing token '{extra}'")));
    }
    AcousticModel::new(transitions, network)
}

struct Tokens<'a> {
    inner: SplitWhitespace<'a>,
    resource: &'a str,
}

impl<'a> Tokens<'a> {
    fn next(&mut self) -> Option<&'a str> {
        self.inner.next()
    }

    fn error(&self, reason: impl Into<String>) -> DecodeError {
        DecodeError::resource_load(self.resource, reason)
    }

    fn required(&mut self, what: &str) -> Result<&'a str, DecodeError> {
        self.next()
            .ok_or_else(|| self.error(format!("unexpected end of stream, expected {what}")))
    }

    fn expect(&mut self, token: &str) -> Result<(), DecodeError> {
        let found = self.required(token)?;
        if found != token {
            return Err(self.error(format!("expected {token}, found '{found}'")));
        }
        Ok(())
    }

    fn value<T: FromStr>(&mut self, what: &str) -> Result<T, DecodeError> {
        let raw = self.required(what)?;
        raw.parse()
            .map_err(|_| self.error(format!("invalid {what} '{raw}'")))
    }

    fn tagged<T: FromStr>(&mut self, tag: &str) -> Result<T, DecodeError> {
        self.expect(tag)?;
        self.value(tag)
    }

    /// Reads `[ v1 v2 ... ]`.
    fn vector<T: FromStr>(&mut self, what: &str) -> Result<Vec<T>, DecodeError> {
        self.expect("[")?;
        let mut values = Vec::new();
        loop {
            match self.required("]")? {
                "]" => return Ok(values),
                raw => values.push(
                    raw.parse()
                        .map_err(|_| self.error(format!("invalid {what} value '{raw}'")))?,
                ),
            }
        }
    }
}

fn read_transition_model(tokens: &mut Tokens) -> Result<TransitionModel, DecodeError> {
    tokens.expect("<TransitionModel>")?;
    let num_classes: usize = tokens.tagged("<NumClasses>")?;
    tokens.expect("<Classes>")?;
    let classes: Vec<usize> = tokens.vector("class")?;
    tokens.expect("</TransitionModel>")?;
    TransitionModel::new(classes, num_classes)
}

fn read_network(tokens: &mut Tokens) -> Result<FeedForwardNetwork, DecodeError> {
    tokens.expect("<Nnet>")?;
    let input_dim: usize = tokens.tagged("<InputDim>")?;
    let left: usize = tokens.tagged("<LeftContext>")?;
    let right: usize = tokens.tagged("<RightContext>")?;

    let mut layers = Vec::new();
    let mut priors = None;
    loop {
        match tokens.required("</Nnet>")? {
            "</Nnet>" => break,
            "<Affine>" => layers.push(read_affine(tokens)?),
            "<ReLU>" => layers.push(Layer::Relu),
            "<Tanh>" => layers.push(Layer::Tanh),
            "<LogSoftmax>" => layers.push(Layer::LogSoftmax),
            "<Priors>" => {
                let values: Vec<f32> = tokens.vector("prior")?;
                if values.iter().any(|&p| p <= 0.0 || !p.is_finite()) {
                    return Err(tokens.error("priors must be positive and finite"));
                }
                priors = Some(Array1::from_iter(values.into_iter().map(f32::ln)));
            }
            other => return Err(tokens.error(format!("unknown layer '{other}'"))),
        }
    }

    FeedForwardNetwork::new(input_dim, left, right, layers, priors)
}

fn read_affine(tokens: &mut Tokens) -> Result<Layer, DecodeError> {
    let input: usize = tokens.tagged("<Input>")?;
    let output: usize = tokens.tagged("<Output>")?;
    tokens.expect("<Weights>")?;
    let weights: Vec<f32> = tokens.vector("weight")?;
    let weights = Array2::from_shape_vec((output, input), weights)
        .map_err(|_| tokens.error(format!("affine weights do not fill {output}x{input}")))?;
    tokens.expect("<Bias>")?;
    let bias = Array1::from_vec(tokens.vector("bias")?);
    Ok(Layer::Affine { weights, bias })
}
