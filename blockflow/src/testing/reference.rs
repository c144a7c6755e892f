//! Small but real estimators used by tests, benches and doc examples.

use crate::blocks::{Batch, Block, CsrMatrix};
use crate::errors::{BlockflowError, EstimatorError, NotFittedError, ParameterError};
use crate::estimator::{Capabilities, Estimator, FitParams};
use crate::params::{ParamValue, Params};
use ndarray::{Array1, Array2, Axis, Zip};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

const TOKEN_PATTERN: &str = r"(?u)\b\w\w+\b";

static TOKEN_RE: OnceLock<Option<Regex>> = OnceLock::new();

fn token_regex() -> Result<&'static Regex, BlockflowError> {
    TOKEN_RE
        .get_or_init(|| Regex::new(TOKEN_PATTERN).ok())
        .as_ref()
        .ok_or_else(|| BlockflowError::Internal(format!("invalid token pattern {TOKEN_PATTERN}")))
}

fn texts<'a>(kind: &str, block: &'a Block) -> Result<&'a [String], BlockflowError> {
    block.as_text().ok_or_else(|| {
        BlockflowError::invalid_input(format!("{kind} expects text blocks, got {}", block.kind()))
    })
}

/// Applies `params` to a copy of `target` through `set_one`, committing
/// only if every key succeeds.
pub(crate) fn set_all<T: Clone>(
    target: &mut T,
    params: Params,
    set_one: impl Fn(&mut T, &str, &ParamValue) -> Result<(), BlockflowError>,
) -> Result<(), BlockflowError> {
    let mut next = target.clone();
    for (key, value) in &params {
        set_one(&mut next, key, value)?;
    }
    *target = next;
    Ok(())
}

pub(crate) fn unknown(key: &str, owner: &str, valid: &[&str]) -> BlockflowError {
    ParameterError::unknown_parameter(key, owner, valid.iter().copied()).into()
}

/// Tokenization strategy of a [`CountVectorizer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Analyzer {
    /// Word tokens of two or more word characters.
    Word,
    /// Character n-grams over the whitespace-normalized text.
    Char,
    /// Character n-grams inside word boundaries, each word padded with a space.
    CharWb,
}

impl Analyzer {
    fn as_str(self) -> &'static str {
        match self {
            Self::Word => "word",
            Self::Char => "char",
            Self::CharWb => "char_wb",
        }
    }
}

/// Minimum document frequency: an absolute count or a proportion of documents.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MinDf {
    /// At least this many documents.
    Count(usize),
    /// At least this fraction of documents.
    Proportion(f64),
}

impl MinDf {
    fn to_json(self) -> serde_json::Value {
        match self {
            Self::Count(c) => json!(c),
            Self::Proportion(p) => json!(p),
        }
    }
}

/// Bag-of-words counter over text blocks.
///
/// Fitting counts document frequencies block by block, so a vocabulary
/// learned over many blocks equals the one learned over their
/// concatenation. Output blocks are sparse, one column per vocabulary term,
/// in sorted term order.
#[derive(Debug, Clone)]
pub struct CountVectorizer {
    analyzer: Analyzer,
    ngram_range: (usize, usize),
    lowercase: bool,
    min_df: MinDf,
    doc_freq: BTreeMap<String, usize>,
    n_docs: usize,
    vocabulary: Option<BTreeMap<String, usize>>,
}

impl CountVectorizer {
    const KIND: &'static str = "CountVectorizer";
    const PARAMS: &'static [&'static str] = &["analyzer", "lowercase", "min_df", "ngram_range"];

    /// Word unigrams, lowercased, no document-frequency cutoff.
    #[must_use]
    pub fn new() -> Self {
        Self {
            analyzer: Analyzer::Word,
            ngram_range: (1, 1),
            lowercase: true,
            min_df: MinDf::Count(1),
            doc_freq: BTreeMap::new(),
            n_docs: 0,
            vocabulary: None,
        }
    }

    /// Character n-grams within word boundaries.
    #[must_use]
    pub fn char_wb(min_n: usize, max_n: usize) -> Self {
        Self {
            analyzer: Analyzer::CharWb,
            ngram_range: (min_n.max(1), max_n.max(min_n).max(1)),
            ..Self::new()
        }
    }

    /// The fitted vocabulary, term to column.
    #[must_use]
    pub fn vocabulary(&self) -> Option<&BTreeMap<String, usize>> {
        self.vocabulary.as_ref()
    }

    fn analyze(&self, doc: &str) -> Result<Vec<String>, BlockflowError> {
        let doc = if self.lowercase {
            doc.to_lowercase()
        } else {
            doc.to_string()
        };
        let (min_n, max_n) = self.ngram_range;
        Ok(match self.analyzer {
            Analyzer::Word => {
                let tokens: Vec<&str> = token_regex()?.find_iter(&doc).map(|m| m.as_str()).collect();
                word_ngrams(&tokens, min_n, max_n)
            }
            Analyzer::Char => {
                let normalized = doc.split_whitespace().collect::<Vec<_>>().join(" ");
                char_ngrams(&normalized, min_n, max_n)
            }
            Analyzer::CharWb => char_wb_ngrams(&doc, min_n, max_n),
        })
    }

    fn set_param(&mut self, key: &str, value: &ParamValue) -> Result<(), BlockflowError> {
        match key {
            "analyzer" => self.analyzer = value.parse(key)?,
            "lowercase" => self.lowercase = value.parse(key)?,
            "min_df" => {
                let min_df: MinDf = value.parse(key)?;
                if let MinDf::Proportion(p) = min_df {
                    if !(0.0..=1.0).contains(&p) {
                        return Err(ParameterError::invalid_value(key, "a proportion must lie in [0, 1]").into());
                    }
                }
                self.min_df = min_df;
            }
            "ngram_range" => {
                let (min_n, max_n): (usize, usize) = value.parse(key)?;
                if min_n == 0 || min_n > max_n {
                    return Err(ParameterError::invalid_value(
                        key,
                        format!("invalid range ({min_n}, {max_n})"),
                    )
                    .into());
                }
                self.ngram_range = (min_n, max_n);
            }
            _ => return Err(unknown(key, Self::KIND, Self::PARAMS)),
        }
        Ok(())
    }
}

impl Default for CountVectorizer {
    fn default() -> Self {
        Self::new()
    }
}

fn word_ngrams(tokens: &[&str], min_n: usize, max_n: usize) -> Vec<String> {
    let mut out = Vec::new();
    for n in min_n.max(1)..=max_n.min(tokens.len()) {
        out.extend(tokens.windows(n).map(|w| w.join(" ")));
    }
    out
}

fn char_ngrams(text: &str, min_n: usize, max_n: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let mut out = Vec::new();
    for n in min_n.max(1)..=max_n.min(chars.len()) {
        out.extend(chars.windows(n).map(|w| w.iter().collect::<String>()));
    }
    out
}

fn char_wb_ngrams(text: &str, min_n: usize, max_n: usize) -> Vec<String> {
    let mut out = Vec::new();
    for word in text.split_whitespace() {
        let padded: Vec<char> = std::iter::once(' ')
            .chain(word.chars())
            .chain(std::iter::once(' '))
            .collect();
        for n in min_n.max(1)..=max_n {
            // A word no longer than the n-gram counts once, whole.
            if n >= padded.len() {
                out.push(padded.iter().collect());
                break;
            }
            out.extend(padded.windows(n).map(|w| w.iter().collect::<String>()));
        }
    }
    out
}

impl Estimator for CountVectorizer {
    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::transformer()
    }

    fn reset(&mut self) {
        self.doc_freq.clear();
        self.n_docs = 0;
        self.vocabulary = None;
    }

    fn partial_fit(&mut self, batch: &Batch<'_>, _params: &FitParams) -> Result<(), BlockflowError> {
        for doc in texts(Self::KIND, batch.x)? {
            let terms: BTreeSet<String> = self.analyze(doc)?.into_iter().collect();
            for term in terms {
                *self.doc_freq.entry(term).or_default() += 1;
            }
            self.n_docs += 1;
        }
        Ok(())
    }

    #[allow(clippy::cast_precision_loss)]
    fn finish_fit(&mut self, _params: &FitParams) -> Result<(), BlockflowError> {
        let min_count = match self.min_df {
            MinDf::Count(c) => c as f64,
            MinDf::Proportion(p) => p * self.n_docs as f64,
        };
        let vocabulary: BTreeMap<String, usize> = std::mem::take(&mut self.doc_freq)
            .into_iter()
            .filter(|(_, df)| *df as f64 >= min_count)
            .enumerate()
            .map(|(i, (term, _))| (term, i))
            .collect();
        if vocabulary.is_empty() {
            return Err(EstimatorError::new(
                Self::KIND,
                "empty vocabulary; no term reaches min_df",
            )
            .into());
        }
        self.vocabulary = Some(vocabulary);
        Ok(())
    }

    fn is_fitted(&self) -> bool {
        self.vocabulary.is_some()
    }

    fn transform(&self, block: &Block) -> Result<Block, BlockflowError> {
        let vocabulary = self
            .vocabulary
            .as_ref()
            .ok_or_else(|| NotFittedError::new(Self::KIND))?;
        let rows = texts(Self::KIND, block)?
            .iter()
            .map(|doc| {
                let mut counts: BTreeMap<usize, f64> = BTreeMap::new();
                for term in self.analyze(doc)? {
                    if let Some(&col) = vocabulary.get(&term) {
                        *counts.entry(col).or_default() += 1.0;
                    }
                }
                Ok(counts.into_iter().collect())
            })
            .collect::<Result<Vec<_>, BlockflowError>>()?;
        Ok(Block::Sparse(CsrMatrix::from_rows(rows, vocabulary.len())?))
    }

    fn get_params(&self, _deep: bool) -> Params {
        let mut params = Params::new();
        params.insert("analyzer".into(), ParamValue::from(self.analyzer.as_str()));
        params.insert("lowercase".into(), ParamValue::from(self.lowercase));
        params.insert("min_df".into(), ParamValue::from(self.min_df.to_json()));
        params.insert(
            "ngram_range".into(),
            ParamValue::from(json!([self.ngram_range.0, self.ngram_range.1])),
        );
        params
    }

    fn set_params(&mut self, params: Params) -> Result<(), BlockflowError> {
        set_all(self, params, Self::set_param)
    }

    fn check_params(&self, params: &Params) -> Result<(), BlockflowError> {
        self.clone().set_params(params.clone())
    }

    fn feature_names(&self) -> Result<Vec<String>, BlockflowError> {
        self.vocabulary
            .as_ref()
            .map(|v| v.keys().cloned().collect())
            .ok_or_else(|| NotFittedError::new(Self::KIND).into())
    }
}

/// Drops columns whose variance does not exceed a threshold.
///
/// Each block contributes its count, column means and centered sums of
/// squares, merged pairwise so the result does not drift with the number of
/// blocks. Columns whose minimum equals their maximum have zero variance.
#[derive(Debug, Clone)]
pub struct VarianceThreshold {
    threshold: f64,
    moments: Option<ColumnMoments>,
    variances: Option<Array1<f64>>,
    support: Option<Vec<usize>>,
}

/// Running per-column count, mean, centered sum of squares and range.
#[derive(Debug, Clone)]
struct ColumnMoments {
    count: usize,
    mean: Array1<f64>,
    m2: Array1<f64>,
    min: Array1<f64>,
    max: Array1<f64>,
}

impl ColumnMoments {
    fn of_block(x: &Array2<f64>) -> Option<Self> {
        let count = x.nrows();
        let mean = x.mean_axis(Axis(0))?;
        let centered = x - &mean;
        let m2 = centered.mapv(|v| v * v).sum_axis(Axis(0));
        let min = x.fold_axis(Axis(0), f64::INFINITY, |a, &v| a.min(v));
        let max = x.fold_axis(Axis(0), f64::NEG_INFINITY, |a, &v| a.max(v));
        Some(Self { count, mean, m2, min, max })
    }

    #[allow(clippy::cast_precision_loss)]
    fn merge(&mut self, other: &Self) {
        let (na, nb) = (self.count as f64, other.count as f64);
        let n = na + nb;
        let delta = &other.mean - &self.mean;
        self.mean = &self.mean + &(&delta * (nb / n));
        self.m2 = &self.m2 + &other.m2 + &(delta.mapv(|d| d * d) * (na * nb / n));
        self.min.zip_mut_with(&other.min, |a, &b| *a = a.min(b));
        self.max.zip_mut_with(&other.max, |a, &b| *a = a.max(b));
        self.count += other.count;
    }

    #[allow(clippy::cast_precision_loss, clippy::float_cmp)]
    fn variances(&self) -> Array1<f64> {
        let n = self.count as f64;
        let mut variances = (&self.m2 / n).mapv(|v| v.max(0.0));
        Zip::from(&mut variances)
            .and(&self.min)
            .and(&self.max)
            .for_each(|var, &lo, &hi| {
                if lo == hi {
                    *var = 0.0;
                }
            });
        variances
    }
}

impl VarianceThreshold {
    const KIND: &'static str = "VarianceThreshold";
    const PARAMS: &'static [&'static str] = &["threshold"];

    /// Keeps columns with variance strictly above `threshold`.
    #[must_use]
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            moments: None,
            variances: None,
            support: None,
        }
    }

    /// Per-column variances seen during fit.
    #[must_use]
    pub fn variances(&self) -> Option<&Array1<f64>> {
        self.variances.as_ref()
    }

    fn set_param(&mut self, key: &str, value: &ParamValue) -> Result<(), BlockflowError> {
        match key {
            "threshold" => {
                let threshold: f64 = value.parse(key)?;
                if threshold < 0.0 {
                    return Err(ParameterError::invalid_value(key, "must be non-negative").into());
                }
                self.threshold = threshold;
                Ok(())
            }
            _ => Err(unknown(key, Self::KIND, Self::PARAMS)),
        }
    }
}

impl Estimator for VarianceThreshold {
    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::transformer()
    }

    fn reset(&mut self) {
        self.moments = None;
        self.variances = None;
        self.support = None;
    }

    fn partial_fit(&mut self, batch: &Batch<'_>, _params: &FitParams) -> Result<(), BlockflowError> {
        let x = batch.x.to_dense()?;
        let Some(block) = ColumnMoments::of_block(&x) else {
            return Ok(());
        };
        match &mut self.moments {
            None => self.moments = Some(block),
            Some(seen) if seen.mean.len() != block.mean.len() => {
                return Err(BlockflowError::invalid_input(format!(
                    "{} saw {} columns, then {}",
                    Self::KIND,
                    seen.mean.len(),
                    block.mean.len()
                )));
            }
            Some(seen) => seen.merge(&block),
        }
        Ok(())
    }

    fn finish_fit(&mut self, _params: &FitParams) -> Result<(), BlockflowError> {
        let Some(moments) = &self.moments else {
            return Err(EstimatorError::new(Self::KIND, "fit saw no samples").into());
        };
        let variances = moments.variances();
        let support: Vec<usize> = variances
            .iter()
            .enumerate()
            .filter(|(_, v)| **v > self.threshold)
            .map(|(i, _)| i)
            .collect();
        if support.is_empty() {
            return Err(EstimatorError::new(
                Self::KIND,
                format!("no feature meets the variance threshold {:.5}", self.threshold),
            )
            .into());
        }
        self.variances = Some(variances);
        self.support = Some(support);
        Ok(())
    }

    fn is_fitted(&self) -> bool {
        self.support.is_some()
    }

    fn transform(&self, block: &Block) -> Result<Block, BlockflowError> {
        let (Some(support), Some(variances)) = (&self.support, &self.variances) else {
            return Err(NotFittedError::new(Self::KIND).into());
        };
        let expected = variances.len();
        match block {
            Block::Dense(m) if m.ncols() == expected => Ok(Block::Dense(m.select(Axis(1), support))),
            Block::Sparse(m) if m.cols == expected => Ok(Block::Sparse(m.select_columns(support))),
            other => Err(BlockflowError::invalid_input(format!(
                "{} expects a matrix with {expected} columns, got a {} block with {:?}",
                Self::KIND,
                other.kind(),
                other.n_cols()
            ))),
        }
    }

    fn get_params(&self, _deep: bool) -> Params {
        let mut params = Params::new();
        params.insert("threshold".into(), ParamValue::from(self.threshold));
        params
    }

    fn set_params(&mut self, params: Params) -> Result<(), BlockflowError> {
        set_all(self, params, Self::set_param)
    }

    fn check_params(&self, params: &Params) -> Result<(), BlockflowError> {
        self.clone().set_params(params.clone())
    }

    fn feature_names(&self) -> Result<Vec<String>, BlockflowError> {
        self.support
            .as_ref()
            .map(|s| s.iter().map(|i| format!("x{i}")).collect())
            .ok_or_else(|| NotFittedError::new(Self::KIND).into())
    }
}

/// Distance used by [`NearestCentroid`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    /// Squared Euclidean distance.
    Euclidean,
    /// Sum of absolute differences.
    Manhattan,
}

impl Metric {
    fn distance(self, a: &Array1<f64>, b: ndarray::ArrayView1<'_, f64>) -> f64 {
        match self {
            Self::Euclidean => a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum(),
            Self::Manhattan => a.iter().zip(b).map(|(x, y)| (x - y).abs()).sum(),
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Euclidean => "euclidean",
            Self::Manhattan => "manhattan",
        }
    }
}

/// Classifies each row by its closest class mean.
///
/// Accepts the fit parameter `classes`, a list of the labels the target may
/// contain; any other label then fails the fit.
#[derive(Debug, Clone)]
pub struct NearestCentroid {
    metric: Metric,
    sums: Vec<(f64, Array1<f64>, usize)>,
    centroids: Vec<(f64, Array1<f64>)>,
}

impl NearestCentroid {
    const KIND: &'static str = "NearestCentroid";
    const PARAMS: &'static [&'static str] = &["metric"];

    /// Euclidean nearest-centroid classifier.
    #[must_use]
    pub fn new() -> Self {
        Self {
            metric: Metric::Euclidean,
            sums: Vec::new(),
            centroids: Vec::new(),
        }
    }

    /// Labels seen during fit, ascending.
    #[must_use]
    pub fn classes(&self) -> Vec<f64> {
        self.centroids.iter().map(|(label, _)| *label).collect()
    }

    fn set_param(&mut self, key: &str, value: &ParamValue) -> Result<(), BlockflowError> {
        match key {
            "metric" => {
                self.metric = value.parse(key)?;
                Ok(())
            }
            _ => Err(unknown(key, Self::KIND, Self::PARAMS)),
        }
    }
}

impl Default for NearestCentroid {
    fn default() -> Self {
        Self::new()
    }
}

impl Estimator for NearestCentroid {
    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::predictor()
    }

    fn reset(&mut self) {
        self.sums.clear();
        self.centroids.clear();
    }

    #[allow(clippy::float_cmp)]
    fn partial_fit(&mut self, batch: &Batch<'_>, _params: &FitParams) -> Result<(), BlockflowError> {
        let y = batch
            .y
            .and_then(Block::as_vector)
            .ok_or_else(|| EstimatorError::new(Self::KIND, "fit requires a vector target"))?;
        let x: Array2<f64> = batch.x.to_dense()?;
        if x.nrows() != y.len() {
            return Err(EstimatorError::new(
                Self::KIND,
                format!("{} feature rows but {} labels", x.nrows(), y.len()),
            )
            .into());
        }
        for (row, &label) in x.outer_iter().zip(y) {
            match self.sums.iter_mut().find(|(l, _, _)| *l == label) {
                Some((_, sum, count)) => {
                    *sum += &row;
                    *count += 1;
                }
                None => self.sums.push((label, row.to_owned(), 1)),
            }
        }
        Ok(())
    }

    #[allow(clippy::cast_precision_loss, clippy::float_cmp)]
    fn finish_fit(&mut self, params: &FitParams) -> Result<(), BlockflowError> {
        if let Some(key) = params.keys().find(|k| k.as_str() != "classes") {
            return Err(EstimatorError::new(Self::KIND, format!("unexpected fit parameter '{key}'")).into());
        }
        if let Some(classes) = params.get("classes") {
            let classes: Vec<f64> = serde_json::from_value(classes.clone())
                .map_err(|e| ParameterError::invalid_value("classes", e.to_string()))?;
            if let Some((label, _, _)) = self.sums.iter().find(|(l, _, _)| !classes.contains(l)) {
                return Err(EstimatorError::new(
                    Self::KIND,
                    format!("label {label} is not among the declared classes"),
                )
                .into());
            }
        }
        if self.sums.is_empty() {
            return Err(EstimatorError::new(Self::KIND, "fit saw no samples").into());
        }
        let mut centroids: Vec<(f64, Array1<f64>)> = self
            .sums
            .drain(..)
            .map(|(label, sum, count)| (label, sum / count as f64))
            .collect();
        centroids.sort_by(|a, b| a.0.total_cmp(&b.0));
        self.centroids = centroids;
        Ok(())
    }

    fn is_fitted(&self) -> bool {
        !self.centroids.is_empty()
    }

    fn predict(&self, block: &Block) -> Result<Block, BlockflowError> {
        if self.centroids.is_empty() {
            return Err(NotFittedError::new(Self::KIND).into());
        }
        let x = block.to_dense()?;
        let labels = x
            .outer_iter()
            .map(|row| {
                let mut best = (f64::INFINITY, self.centroids[0].0);
                for (label, centroid) in &self.centroids {
                    let d = self.metric.distance(centroid, row);
                    if d < best.0 {
                        best = (d, *label);
                    }
                }
                best.1
            })
            .collect::<Array1<f64>>();
        Ok(Block::Vector(labels))
    }

    fn get_params(&self, _deep: bool) -> Params {
        let mut params = Params::new();
        params.insert("metric".into(), ParamValue::from(self.metric.as_str()));
        params
    }

    fn set_params(&mut self, params: Params) -> Result<(), BlockflowError> {
        set_all(self, params, Self::set_param)
    }

    fn check_params(&self, params: &Params) -> Result<(), BlockflowError> {
        self.clone().set_params(params.clone())
    }
}
