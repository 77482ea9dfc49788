// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Beam search over an autoregressive next-token scorer
//!
//! All live beams always have the same length, so each step is a single
//! batched scorer call. Candidate ordering is total: summed log-probability
//! descending, then beam index, then token id. Identical scores therefore
//! always produce the same hypothesis.

use anyhow::Result;
use std::cmp::Ordering;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;

/// Default beam width
pub const DEFAULT_NUM_BEAMS: usize = 5;

/// Default cap on generated tokens (excluding the decoder start token)
pub const DEFAULT_MAX_NEW_TOKENS: usize = 64;

/// Source of next-token log-probabilities
pub trait StepScorer {
    /// Log-probabilities over the vocabulary for the last position of each sequence
    fn log_probs(&mut self, sequences: &[Vec<u32>]) -> Result<Vec<Vec<f32>>>;
}

/// Scorer wrapper that stops the search once `cancel` is set
///
/// The flag is checked before every step, so a search abandoned by its
/// caller stops after at most one more decoder call.
pub struct Cancellable<S> {
    inner: S,
    cancel: Arc<AtomicBool>,
}

impl<S: StepScorer> Cancellable<S> {
    pub fn new(inner: S, cancel: Arc<AtomicBool>) -> Self {
        Self { inner, cancel }
    }
}

impl<S: StepScorer> StepScorer for Cancellable<S> {
    fn log_probs(&mut self, sequences: &[Vec<u32>]) -> Result<Vec<Vec<f32>>> {
        if self.cancel.load(AtomicOrdering::Relaxed) {
            anyhow::bail!("beam search cancelled");
        }
        self.inner.log_probs(sequences)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BeamSearchConfig {
    pub num_beams: usize,
    pub max_new_tokens: usize,
    /// Exponent applied to hypothesis length when ranking finished beams
    pub length_penalty: f32,
    /// Stop as soon as `num_beams` hypotheses have finished
    pub early_stopping: bool,
    pub decoder_start_token_id: u32,
    pub eos_token_id: u32,
}

impl Default for BeamSearchConfig {
    fn default() -> Self {
        Self {
            num_beams: DEFAULT_NUM_BEAMS,
            max_new_tokens: DEFAULT_MAX_NEW_TOKENS,
            length_penalty: 1.0,
            early_stopping: true,
            decoder_start_token_id: 2,
            eos_token_id: 2,
        }
    }
}

#[derive(Debug, Clone)]
struct Beam {
    tokens: Vec<u32>,
    score: f32,
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    beam: usize,
    token: u32,
    score: f32,
}

fn candidate_order(a: &Candidate, b: &Candidate) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then(a.beam.cmp(&b.beam))
        .then(a.token.cmp(&b.token))
}

/// Run beam search and return the best hypothesis without the start token.
///
/// The EOS token is not included in the result.
pub fn beam_search<S: StepScorer>(scorer: &mut S, config: &BeamSearchConfig) -> Result<Vec<u32>> {
    let width = config.num_beams.max(1);
    let eos = config.eos_token_id;

    let mut beams = vec![Beam {
        tokens: vec![config.decoder_start_token_id],
        score: 0.0,
    }];
    let mut finished: Vec<(Vec<u32>, f32)> = Vec::new();
    let mut stopped_early = false;

    for _ in 0..config.max_new_tokens {
        let sequences: Vec<Vec<u32>> = beams.iter().map(|b| b.tokens.clone()).collect();
        let log_probs = scorer.log_probs(&sequences)?;
        if log_probs.len() != beams.len() {
            anyhow::bail!(
                "Scorer returned {} rows for {} beams",
                log_probs.len(),
                beams.len()
            );
        }

        let mut candidates = Vec::with_capacity(beams.len() * 2 * width);
        for (i, (beam, row)) in beams.iter().zip(&log_probs).enumerate() {
            for (token, lp) in top_k(row, 2 * width) {
                candidates.push(Candidate {
                    beam: i,
                    token,
                    score: beam.score + lp,
                });
            }
        }
        candidates.sort_by(candidate_order);

        let mut next = Vec::with_capacity(width);
        for (rank, cand) in candidates.iter().enumerate() {
            let parent = &beams[cand.beam];
            if cand.token == eos {
                // EOS only counts when it would have been among the kept beams
                if rank < width {
                    finished.push((
                        parent.tokens.clone(),
                        normalized(cand.score, parent.tokens.len(), config.length_penalty),
                    ));
                }
            } else {
                let mut tokens = parent.tokens.clone();
                tokens.push(cand.token);
                next.push(Beam {
                    tokens,
                    score: cand.score,
                });
            }
            if next.len() == width {
                break;
            }
        }

        if config.early_stopping && finished.len() >= width {
            stopped_early = true;
            break;
        }
        if next.is_empty() {
            beams.clear();
            break;
        }
        beams = next;
    }

    if !stopped_early {
        for beam in &beams {
            finished.push((
                beam.tokens.clone(),
                normalized(beam.score, beam.tokens.len(), config.length_penalty),
            ));
        }
    }

    let mut best: Option<&(Vec<u32>, f32)> = None;
    for hyp in &finished {
        if best.map_or(true, |b| hyp.1 > b.1) {
            best = Some(hyp);
        }
    }

    Ok(best
        .map(|(tokens, _)| tokens.iter().skip(1).copied().collect())
        .unwrap_or_default())
}

fn normalized(score: f32, len: usize, length_penalty: f32) -> f32 {
    score / (len.max(1) as f32).powf(length_penalty)
}

/// Indices and values of the `k` largest entries, largest first, ties by index
pub fn top_k(values: &[f32], k: usize) -> Vec<(u32, f32)> {
    let cmp = |a: &usize, b: &usize| values[*b].total_cmp(&values[*a]).then(a.cmp(b));

    let mut idx: Vec<usize> = (0..values.len()).collect();
    if k < idx.len() {
        idx.select_nth_unstable_by(k, cmp);
        idx.truncate(k);
    }
    idx.sort_by(cmp);
    idx.into_iter().map(|i| (i as u32, values[i])).collect()
}

/// Numerically stable log-softmax
pub fn log_softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let sum: f32 = logits.iter().map(|&x| (x - max).exp()).sum();
    let log_sum = sum.ln() + max;
    logits.iter().map(|&x| x - log_sum).collect()
}
