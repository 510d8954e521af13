//! Textual model descriptors: `"<Tag> <args...>"`.
//!
//! A descriptor names a registered classifier kind and its hyperparameters.
//! Positional arguments come first, then `key=value` options. Ensembles end
//! their argument list with a nested descriptor for their member kind, e.g.
//! `BaggedClassifier 0.5 10 seed=3 DiscreteNaiveBayesClassifier ewd 10`.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::ModelError;

/// A classifier kind plus its hyperparameter arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSpec {
    tag: String,
    args: Vec<String>,
}

impl ModelSpec {
    /// Create a descriptor from a tag and argument tokens.
    #[must_use]
    pub fn new(tag: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            tag: tag.into(),
            args,
        }
    }

    /// Create a descriptor with default hyperparameters.
    #[must_use]
    pub fn bare(tag: impl Into<String>) -> Self {
        Self::new(tag, Vec::new())
    }

    /// Return the kind tag.
    #[must_use]
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Return the argument tokens.
    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub(crate) fn invalid(&self, reason: impl Into<String>) -> ModelError {
        ModelError::InvalidSpec {
            tag: self.tag.clone(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ModelSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.tag)?;
        for a in &self.args {
            write!(f, " {a}")?;
        }
        Ok(())
    }
}

impl FromStr for ModelSpec {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut tokens = s.split_whitespace().map(str::to_string);
        let tag = tokens.next().ok_or_else(|| ModelError::InvalidSpec {
            tag: String::new(),
            reason: "empty descriptor".to_string(),
        })?;
        Ok(Self::new(tag, tokens.collect()))
    }
}

/// Split descriptor arguments into positionals and `key=value` options.
#[derive(Debug)]
pub(crate) struct SpecArgs<'a> {
    spec: &'a ModelSpec,
    positional: Vec<&'a str>,
    options: BTreeMap<&'a str, &'a str>,
}

impl<'a> SpecArgs<'a> {
    /// Parse all arguments, rejecting option keys outside `allowed`.
    pub(crate) fn parse(spec: &'a ModelSpec, allowed: &[&str]) -> Result<Self, ModelError> {
        Self::parse_tokens(spec, &spec.args, allowed)
    }

    /// Parse the given tokens of `spec`.
    pub(crate) fn parse_tokens(
        spec: &'a ModelSpec,
        tokens: &'a [String],
        allowed: &[&str],
    ) -> Result<Self, ModelError> {
        let mut positional = Vec::new();
        let mut options = BTreeMap::new();
        for token in tokens {
            match token.split_once('=') {
                Some((key, value)) => {
                    if !allowed.contains(&key) {
                        return Err(spec.invalid(format!(
                            "unknown option {key:?} (expected one of {allowed:?})"
                        )));
                    }
                    options.insert(key, value);
                }
                None if options.is_empty() => positional.push(token.as_str()),
                None => {
                    return Err(spec.invalid(format!(
                        "positional argument {token:?} after options"
                    )));
                }
            }
        }
        Ok(Self {
            spec,
            positional,
            options,
        })
    }

    /// Parse positional argument `index`, if present.
    pub(crate) fn positional<T: FromStr>(
        &self,
        index: usize,
        what: &str,
    ) -> Result<Option<T>, ModelError> {
        self.positional
            .get(index)
            .map(|raw| {
                raw.parse()
                    .map_err(|_| self.spec.invalid(format!("cannot parse {what} from {raw:?}")))
            })
            .transpose()
    }

    /// Fail when more than `max` positionals were given.
    pub(crate) fn at_most(&self, max: usize) -> Result<(), ModelError> {
        if self.positional.len() > max {
            return Err(self.spec.invalid(format!(
                "expected at most {max} positional arguments, got {}",
                self.positional.len()
            )));
        }
        Ok(())
    }

    /// Parse option `key`, if present.
    pub(crate) fn option<T: FromStr>(&self, key: &str) -> Result<Option<T>, ModelError> {
        self.options
            .get(key)
            .map(|raw| {
                raw.parse()
                    .map_err(|_| self.spec.invalid(format!("cannot parse {key} from {raw:?}")))
            })
            .transpose()
    }
}

/// Split ensemble arguments into leading own arguments and a nested descriptor.
///
/// Own arguments are up to `n_positional` positionals followed by options; the
/// first later token without `=` starts the nested descriptor.
pub(crate) fn split_nested(spec: &ModelSpec, n_positional: usize) -> (usize, Option<ModelSpec>) {
    let args = spec.args();
    let mut i = 0;
    while i < args.len() && i < n_positional && !args[i].contains('=') && looks_numeric(&args[i]) {
        i += 1;
    }
    while i < args.len() && args[i].contains('=') {
        i += 1;
    }
    let nested = (i < args.len()).then(|| ModelSpec::new(args[i].clone(), args[i + 1..].to_vec()));
    (i, nested)
}

fn looks_numeric(token: &str) -> bool {
    token.parse::<f64>().is_ok()
}
