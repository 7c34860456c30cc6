use std::collections::{HashMap, HashSet, VecDeque};

use rand::Rng;
use serde::{Deserialize, Serialize};

use common::expr::{bit_mask, Expr, Value};
use common::log_debug;

use crate::channel::Channel;
use crate::error::BackendError;
use crate::script::Objective;
use crate::session::{QueryResult, SmtSession};

/// Tuning knobs for the mutation search. The defaults reproduce the
/// behavior the algorithm was tuned with; neither constant has a derivation
/// beyond that, which is why they are knobs and not literals.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerParams {
    /// Recombination depth cap; table entries above this level are not
    /// combined any further.
    pub max_combine_level: u8,
    /// Upper bound on the number of random bits in an anchor guess.
    pub max_anchor_bits: u32,
}

impl Default for SamplerParams {
    fn default() -> Self {
        Self {
            max_combine_level: 3,
            max_anchor_bits: common::expr::MAX_BV_WIDTH,
        }
    }
}

/// One step of the sample stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sample {
    /// A satisfying value of the target expression.
    Value(u128),
    /// Marker: the preceding value cost a full solver round-trip.
    SolveCompleted,
    /// Marker: the cheap neighborhood of the current base value is
    /// exhausted.
    CheapExhausted,
}

/// The validity oracle behind the sampler: an exact solver consulted to
/// propose a base value and to validate single-bit perturbations of it.
/// `None` means unsatisfiable, which prunes the branch; only channel-level
/// failures are errors.
pub trait SampleOracle {
    /// A fresh base value: every known value excluded, the candidate XOR its
    /// perturbation pinned to `guess`, and the perturbation minimized.
    fn base_value(&mut self, exclude: &[u128], guess: u128) -> Result<Option<u128>, BackendError>;

    /// A value whose perturbation relative to `base` has bit `bit` set,
    /// other bits free.
    fn flipped_value(&mut self, base: u128, bit: u32) -> Result<Option<u128>, BackendError>;
}

/// Lazily enumerates satisfying values of one bit-vector expression by
/// perturbing known solutions bit by bit and recombining pairs of
/// perturbations, consulting the oracle only to validate flips.
///
/// This is a best-effort sampler: it trades completeness for cheap results
/// and stops as soon as the neighborhood of the latest base value is
/// unproductive. Callers needing exhaustive or uniform sampling must not
/// rely on it alone.
pub struct MutationSampler<O: SampleOracle, R: Rng> {
    oracle: O,
    rng: R,
    params: SamplerParams,
    width: u32,
    /// Discovered value to recombination level; keys are never re-yielded.
    mutations: HashMap<u128, u8>,
    /// Base values, in discovery order; their count bounds the anchor guess.
    results: Vec<u128>,
    /// Every value handed out so far, in discovery order (drives the
    /// exclusion constraints of the next base solve).
    known: Vec<u128>,
    known_set: HashSet<u128>,
    /// Created once and consumed; an empty list ends the inner pass.
    flippable_bits: Vec<u32>,
    pending: VecDeque<Sample>,
    fresh_in_pass: usize,
    phase: Phase,
}

#[derive(Clone, Copy)]
enum Phase {
    Anchor,
    Flips { base: u128 },
    Done,
}

impl<O: SampleOracle, R: Rng> MutationSampler<O, R> {
    pub fn new(oracle: O, width: u32, params: SamplerParams, rng: R) -> Self {
        Self {
            oracle,
            rng,
            params,
            width,
            mutations: HashMap::new(),
            results: Vec::new(),
            known: Vec::new(),
            known_set: HashSet::new(),
            flippable_bits: (0..width).collect(),
            pending: VecDeque::new(),
            fresh_in_pass: 0,
            phase: Phase::Anchor,
        }
    }

    fn record(&mut self, value: u128, level: u8) {
        self.mutations.insert(value, level);
        if self.known_set.insert(value) {
            self.known.push(value);
        }
    }

    /// Zero on the first round, then random values over a growing number of
    /// bits, biasing early rounds toward the all-zero perturbation.
    fn anchor_guess(&mut self) -> u128 {
        if self.results.is_empty() {
            return 0;
        }
        let bits = (self.results.len() as u32)
            .min(self.width)
            .min(self.params.max_anchor_bits);
        self.rng.gen::<u128>() & bit_mask(bits)
    }

    fn next_base(&mut self) -> Option<Result<Sample, BackendError>> {
        let guess = self.anchor_guess();
        match self.oracle.base_value(&self.known, guess) {
            Err(e) => {
                self.phase = Phase::Done;
                Some(Err(e))
            }
            Ok(None) => {
                // No more solutions reachable through this strategy.
                self.phase = Phase::Done;
                None
            }
            Ok(Some(base)) => {
                log_debug!("Sampler found base value {:#x}", base);
                self.results.push(base);
                if self.known_set.insert(base) {
                    self.known.push(base);
                }
                self.fresh_in_pass = 0;
                self.phase = Phase::Flips { base };
                self.pending.push_back(Sample::SolveCompleted);
                Some(Ok(Sample::Value(base)))
            }
        }
    }

    fn next_flip(&mut self, base: u128) -> Option<Result<Sample, BackendError>> {
        loop {
            if self.flippable_bits.is_empty() {
                self.phase = if self.fresh_in_pass > 0 {
                    Phase::Anchor
                } else {
                    // The neighborhood is dry; looping further would only
                    // revisit it.
                    Phase::Done
                };
                return Some(Ok(Sample::CheapExhausted));
            }

            let index = self.rng.gen_range(0..self.flippable_bits.len());
            let bit = self.flippable_bits.swap_remove(index);

            let new_result = match self.oracle.flipped_value(base, bit) {
                Err(e) => {
                    self.phase = Phase::Done;
                    return Some(Err(e));
                }
                // This bit admits no solution; try the next one.
                Ok(None) => continue,
                // Duplicates are discarded the same way.
                Ok(Some(value)) if self.known_set.contains(&value) => continue,
                Ok(Some(value)) => value,
            };

            self.fresh_in_pass += 1;
            let recombined = self.recombine_all(base, new_result);
            self.record(new_result, 1);
            for (candidate, level) in recombined {
                self.record(candidate, level);
                self.fresh_in_pass += 1;
                self.pending.push_back(Sample::Value(candidate));
            }
            return Some(Ok(Sample::Value(new_result)));
        }
    }

    /// Merges the new perturbation with every table entry below the depth
    /// cap, collecting candidates that cost no solver call.
    fn recombine_all(&self, base: u128, new_result: u128) -> Vec<(u128, u8)> {
        let mut fresh = Vec::new();
        for (&existing, &level) in &self.mutations {
            if level > self.params.max_combine_level {
                continue;
            }
            let candidate = recombine(base, existing, new_result);
            if self.known_set.contains(&candidate)
                || candidate == new_result
                || fresh.iter().any(|&(v, _)| v == candidate)
            {
                continue;
            }
            fresh.push((candidate, level + 1));
        }
        fresh
    }
}

impl<O: SampleOracle, R: Rng> Iterator for MutationSampler<O, R> {
    type Item = Result<Sample, BackendError>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(sample) = self.pending.pop_front() {
            return Some(Ok(sample));
        }
        match self.phase {
            Phase::Done => None,
            Phase::Anchor => self.next_base(),
            Phase::Flips { base } => self.next_flip(base),
        }
    }
}

/// Bitwise merge of two perturbations relative to a shared base value.
pub(crate) fn recombine(base: u128, a: u128, b: u128) -> u128 {
    base ^ ((base ^ a) | (base ^ b))
}

/// Population count of a bit vector as an expression: every bit extracted,
/// zero-extended back to full width and summed.
pub(crate) fn popcount(bv: &Expr, width: u32) -> Expr {
    (0..width)
        .map(|i| bv.clone().extract(i, i).zero_ext(width - 1))
        .reduce(|acc, bit| acc.bvadd(bit))
        .unwrap()
}

/// The process-backed oracle: an optimizing session holding fresh auxiliary
/// `result`/`delta` symbols of the target's width, pinned by
/// `result == expr`, with the perturbation's population count minimized so
/// the solver prefers the smallest flip.
pub struct MinimizingOracle<C: Channel> {
    session: SmtSession<C>,
    result: Expr,
    delta: Expr,
    width: u32,
}

const RESULT_SYMBOL: &str = "sampler!result";
const DELTA_SYMBOL: &str = "sampler!delta";

impl<C: Channel> MinimizingOracle<C> {
    pub fn new(mut session: SmtSession<C>, expr: &Expr) -> Self {
        let width = expr.size();
        let result = Expr::bv_symbol(RESULT_SYMBOL, width);
        let delta = Expr::bv_symbol(DELTA_SYMBOL, width);
        session.add_constraints([result.clone()._eq(expr.clone())], false);
        session.set_objective(Objective::Minimize(popcount(&delta, width)));
        Self {
            session,
            result,
            delta,
            width,
        }
    }

    fn solve(&mut self, extra: &[Expr]) -> Result<Option<u128>, BackendError> {
        match self.session.get_model(extra)? {
            QueryResult::Sat(model) => match model.get(RESULT_SYMBOL) {
                Some(Value::BitVec { bits, .. }) => Ok(Some(*bits)),
                _ => Err(BackendError::InconsistentModel),
            },
            QueryResult::Unsat(_) => Ok(None),
        }
    }
}

impl<C: Channel> SampleOracle for MinimizingOracle<C> {
    fn base_value(&mut self, exclude: &[u128], guess: u128) -> Result<Option<u128>, BackendError> {
        let mut extra: Vec<Expr> = exclude
            .iter()
            .map(|&v| self.result.clone()._neq(Expr::bv_const(self.width, v)))
            .collect();
        extra.push(
            self.result
                .clone()
                .bvxor(self.delta.clone())
                ._eq(Expr::bv_const(self.width, guess)),
        );
        self.solve(&extra)
    }

    fn flipped_value(&mut self, base: u128, bit: u32) -> Result<Option<u128>, BackendError> {
        let extra = vec![
            self.result
                .clone()
                .bvxor(self.delta.clone())
                ._eq(Expr::bv_const(self.width, base)),
            self.delta.clone().extract(bit, bit)._eq(Expr::bv_const(1, 1)),
        ];
        self.solve(&extra)
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use common::expr::Assignment;

    use super::*;

    #[test]
    fn recombine_merges_independent_perturbations() {
        // Flipping bit 2 and bit 3 of base 0 merges to both bits flipped.
        assert_eq!(recombine(0b0000, 0b0100, 0b1000), 0b1100);
        // Relative to a non-zero base.
        assert_eq!(recombine(0b1111, 0b1011, 0b1110), 0b1010);
        // Merging a perturbation with itself is the perturbation.
        assert_eq!(recombine(0b0101, 0b0110, 0b0110), 0b0110);
    }

    #[test]
    fn popcount_counts_set_bits() {
        let d = Expr::bv_symbol("d", 8);
        let expr = popcount(&d, 8);

        let mut assignment = Assignment::new();
        assignment.insert("d".to_string(), Value::bv(8, 0b1011_0010));
        let folded = expr.substitute(&assignment).simplify();
        assert_eq!(folded.constant_value(), Some(Value::bv(8, 4)));
    }

    /// Accepts multiples of four in a 4-bit domain, minimizing by always
    /// proposing the smallest unexcluded value.
    struct MultiplesOfFour;

    impl SampleOracle for MultiplesOfFour {
        fn base_value(
            &mut self,
            exclude: &[u128],
            _guess: u128,
        ) -> Result<Option<u128>, BackendError> {
            Ok((0u128..16).step_by(4).find(|v| !exclude.contains(v)))
        }

        fn flipped_value(&mut self, base: u128, bit: u32) -> Result<Option<u128>, BackendError> {
            let flipped = base ^ (1u128 << bit);
            Ok((flipped % 4 == 0).then_some(flipped))
        }
    }

    fn collect(sampler: impl Iterator<Item = Result<Sample, BackendError>>) -> Vec<Sample> {
        sampler.map(|step| step.unwrap()).collect()
    }

    #[test]
    fn enumerates_reachable_values_without_duplicates() {
        let sampler = MutationSampler::new(
            MultiplesOfFour,
            4,
            SamplerParams::default(),
            StdRng::seed_from_u64(7),
        );
        let steps = collect(sampler);

        assert_eq!(&steps[..2], &[Sample::Value(0), Sample::SolveCompleted]);

        let values: Vec<u128> = steps
            .iter()
            .filter_map(|s| match s {
                Sample::Value(v) => Some(*v),
                _ => None,
            })
            .collect();
        let unique: HashSet<u128> = values.iter().copied().collect();
        assert_eq!(unique.len(), values.len(), "a value was yielded twice");
        assert_eq!(unique, HashSet::from([0, 4, 8, 12]));
    }

    #[test]
    fn dry_neighborhood_ends_the_stream() {
        /// Exactly one solution: zero.
        struct Singleton;
        impl SampleOracle for Singleton {
            fn base_value(
                &mut self,
                exclude: &[u128],
                _guess: u128,
            ) -> Result<Option<u128>, BackendError> {
                Ok((!exclude.contains(&0)).then_some(0))
            }

            fn flipped_value(
                &mut self,
                _base: u128,
                _bit: u32,
            ) -> Result<Option<u128>, BackendError> {
                Ok(None)
            }
        }

        let sampler = MutationSampler::new(
            Singleton,
            4,
            SamplerParams::default(),
            StdRng::seed_from_u64(0),
        );
        let steps = collect(sampler);
        assert_eq!(
            steps,
            vec![
                Sample::Value(0),
                Sample::SolveCompleted,
                Sample::CheapExhausted,
            ]
        );
    }

    #[test]
    fn channel_failure_stops_the_stream() {
        struct Broken;
        impl SampleOracle for Broken {
            fn base_value(
                &mut self,
                _exclude: &[u128],
                _guess: u128,
            ) -> Result<Option<u128>, BackendError> {
                Err(BackendError::ChannelClosed(std::io::Error::from(
                    std::io::ErrorKind::BrokenPipe,
                )))
            }

            fn flipped_value(
                &mut self,
                _base: u128,
                _bit: u32,
            ) -> Result<Option<u128>, BackendError> {
                unreachable!()
            }
        }

        let mut sampler = MutationSampler::new(
            Broken,
            4,
            SamplerParams::default(),
            StdRng::seed_from_u64(0),
        );
        assert!(matches!(
            sampler.next(),
            Some(Err(BackendError::ChannelClosed(_)))
        ));
        assert!(sampler.next().is_none());
    }
}
