//! Fixed-weight recurrent scoring network.
//!
//! Six inputs, one recurrent hidden layer of [`HIDDEN_UNITS`] tanh units and a
//! single sigmoid output. The weights are constants: nothing here learns.
//! The only state is the hidden vector, which the caller owns and passes in,
//! so [`ScoringNetwork::forward`] is a pure function of its arguments.
//!
//! Two precisions share the topology:
//!
//! - [`ScoringNetwork::FixedPoint`]: Q10 weights and inputs, table tanh and
//!   sigmoid with interpolation.
//! - [`ScoringNetwork::Quantized`]: Q7 `i8` weights and inputs, table tanh and
//!   a linear output ramp.
//!
//! Both return a growth signal on `[0, SCALE]`.

use crate::activation::{ramp_q7, sigmoid_q10, tanh_q10, tanh_q7};
use crate::config::{NetworkKind, HIDDEN_UNITS, NETWORK_INPUTS, SCALE};

const Q10_SHIFT: u32 = 10;
const Q7_SHIFT: u32 = 7;

const Q10_MAX: i32 = SCALE as i32;
const Q7_MAX: i32 = 127;

const Q10_INPUT_WEIGHTS: [[i16; NETWORK_INPUTS]; HIDDEN_UNITS] = [
    [-1000, -983, -966, -949, -932, -915],
    [-963, -946, -929, -912, -895, -878],
    [-926, -909, -892, -875, -858, -841],
    [-889, -872, -855, -838, -821, -804],
];
/// 0.49 in Q10.
const Q10_RECURRENT_WEIGHT: i32 = 500;
const Q10_OUTPUT_WEIGHTS: [i16; HIDDEN_UNITS] = [-1000, -987, -974, -961];

const Q7_INPUT_WEIGHTS: [[i8; NETWORK_INPUTS]; HIDDEN_UNITS] = [
    [-125, -123, -121, -119, -117, -115],
    [-120, -118, -116, -114, -112, -110],
    [-115, -113, -111, -109, -107, -105],
    [-111, -109, -107, -105, -103, -101],
];
/// 0.48 in Q7.
const Q7_RECURRENT_WEIGHT: i32 = 62;
const Q7_OUTPUT_WEIGHTS: [i8; HIDDEN_UNITS] = [-125, -123, -121, -120];

/// Network inputs in controller units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkInputs {
    /// `rtt / min_rtt - 1` in Q10, clamped to `[-SCALE, SCALE]`.
    pub rtt_ratio: i16,
    pub entropy: u16,
    pub slow_start: bool,
    pub congestion: bool,
    pub plasticity: u16,
    pub loss: bool,
    /// Entropy is above the tier threshold; the output is damped.
    pub high_entropy: bool,
}

impl NetworkInputs {
    fn q10(&self) -> [i32; NETWORK_INPUTS] {
        [
            i32::from(self.rtt_ratio).clamp(-Q10_MAX, Q10_MAX),
            i32::from(self.entropy),
            signed_flag(self.slow_start, Q10_MAX),
            signed_flag(!self.congestion, Q10_MAX),
            i32::from(self.plasticity) - Q10_MAX / 2,
            signed_flag(!self.loss, Q10_MAX),
        ]
    }

    fn q7(&self) -> [i32; NETWORK_INPUTS] {
        [
            q10_to_q7(i32::from(self.rtt_ratio)),
            q10_to_q7(i32::from(self.entropy)),
            signed_flag(self.slow_start, Q7_MAX),
            signed_flag(!self.congestion, Q7_MAX),
            q10_to_q7(i32::from(self.plasticity) - Q10_MAX / 2),
            signed_flag(!self.loss, Q7_MAX),
        ]
    }
}

fn signed_flag(set: bool, max: i32) -> i32 {
    if set {
        max
    } else {
        -max
    }
}

fn q10_to_q7(value: i32) -> i32 {
    (value >> (Q10_SHIFT - Q7_SHIFT)).clamp(-Q7_MAX, Q7_MAX)
}

/// Fixed-topology scoring network, dispatched by precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoringNetwork {
    FixedPoint,
    Quantized,
}

impl From<NetworkKind> for ScoringNetwork {
    fn from(kind: NetworkKind) -> Self {
        match kind {
            NetworkKind::FixedPoint => Self::FixedPoint,
            NetworkKind::Quantized => Self::Quantized,
        }
    }
}

impl ScoringNetwork {
    /// Run one step, updating `hidden` in place. Returns the growth signal.
    pub fn forward(&self, inputs: &NetworkInputs, hidden: &mut [i16; HIDDEN_UNITS]) -> u16 {
        match self {
            Self::FixedPoint => forward_q10(inputs, hidden),
            Self::Quantized => forward_q7(inputs, hidden),
        }
    }

    /// Largest magnitude a hidden activation can take.
    pub fn activation_bound(&self) -> i16 {
        match self {
            Self::FixedPoint => Q10_MAX as i16,
            Self::Quantized => Q7_MAX as i16,
        }
    }
}

fn forward_q10(inputs: &NetworkInputs, hidden: &mut [i16; HIDDEN_UNITS]) -> u16 {
    let x = inputs.q10();
    for (h, row) in hidden.iter_mut().zip(&Q10_INPUT_WEIGHTS) {
        let acc: i32 = row.iter().zip(&x).map(|(&w, &x)| i32::from(w) * x).sum();
        let pre = (acc + i32::from(*h) * Q10_RECURRENT_WEIGHT) >> Q10_SHIFT;
        *h = tanh_q10(pre);
    }

    let mut out = output_sum(hidden, &Q10_OUTPUT_WEIGHTS.map(i32::from)) >> Q10_SHIFT;
    if inputs.high_entropy {
        out >>= 1;
    }
    sigmoid_q10(out)
}

fn forward_q7(inputs: &NetworkInputs, hidden: &mut [i16; HIDDEN_UNITS]) -> u16 {
    let x = inputs.q7();
    for (h, row) in hidden.iter_mut().zip(&Q7_INPUT_WEIGHTS) {
        let acc: i32 = row.iter().zip(&x).map(|(&w, &x)| i32::from(w) * x).sum();
        let pre = (acc + i32::from(*h) * Q7_RECURRENT_WEIGHT) >> Q7_SHIFT;
        *h = i16::from(tanh_q7(pre));
    }

    let mut out = output_sum(hidden, &Q7_OUTPUT_WEIGHTS.map(i32::from)) >> Q7_SHIFT;
    if inputs.high_entropy {
        out >>= 1;
    }
    ramp_q7(out)
}

fn output_sum(hidden: &[i16; HIDDEN_UNITS], weights: &[i32; HIDDEN_UNITS]) -> i32 {
    hidden
        .iter()
        .zip(weights)
        .map(|(&h, &w)| i32::from(h) * w)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    const STEADY: NetworkInputs = NetworkInputs {
        rtt_ratio: 0,
        entropy: 0,
        slow_start: false,
        congestion: false,
        plasticity: 307,
        loss: false,
        high_entropy: false,
    };

    const STRESSED: NetworkInputs = NetworkInputs {
        rtt_ratio: 1024,
        entropy: 100,
        slow_start: false,
        congestion: true,
        plasticity: 900,
        loss: true,
        high_entropy: false,
    };

    #[test]
    fn output_is_bounded_for_extreme_inputs() {
        for network in [ScoringNetwork::FixedPoint, ScoringNetwork::Quantized] {
            for rtt_ratio in [i16::MIN, -1024, 0, 1024, i16::MAX] {
                for entropy in [0, 512, SCALE] {
                    let inputs = NetworkInputs {
                        rtt_ratio,
                        entropy,
                        high_entropy: entropy > 716,
                        ..STEADY
                    };
                    let mut hidden = [0; HIDDEN_UNITS];
                    for _ in 0..16 {
                        let signal = network.forward(&inputs, &mut hidden);
                        assert!(signal <= SCALE);
                        let bound = network.activation_bound();
                        assert!(hidden.iter().all(|h| h.abs() <= bound), "{hidden:?}");
                    }
                }
            }
        }
    }

    #[test]
    fn loss_and_congestion_suppress_growth() {
        for network in [ScoringNetwork::FixedPoint, ScoringNetwork::Quantized] {
            let steady = network.forward(&STEADY, &mut [0; HIDDEN_UNITS]);
            let stressed = network.forward(&STRESSED, &mut [0; HIDDEN_UNITS]);
            assert!(stressed < steady, "{network:?}: {stressed} >= {steady}");
        }
    }

    #[test]
    fn high_entropy_damps_output_toward_midpoint() {
        for network in [ScoringNetwork::FixedPoint, ScoringNetwork::Quantized] {
            let full = network.forward(&STEADY, &mut [0; HIDDEN_UNITS]);
            let damped = network.forward(
                &NetworkInputs {
                    high_entropy: true,
                    ..STEADY
                },
                &mut [0; HIDDEN_UNITS],
            );
            let mid = SCALE / 2;
            assert!(damped.abs_diff(mid) <= full.abs_diff(mid), "{network:?}");
        }
    }

    #[test]
    fn hidden_state_carries_between_steps() {
        let network = ScoringNetwork::FixedPoint;
        let mut hidden = [0; HIDDEN_UNITS];
        network.forward(&STRESSED, &mut hidden);
        let primed = hidden;
        assert_ne!(primed, [0; HIDDEN_UNITS]);

        // Same inputs, different memory: different activations.
        let mut fresh = [0; HIDDEN_UNITS];
        network.forward(&STEADY, &mut hidden);
        network.forward(&STEADY, &mut fresh);
        assert_ne!(hidden, fresh);
    }

    #[test]
    fn forward_is_deterministic() {
        let network = ScoringNetwork::Quantized;
        let mut a = [3, -7, 40, -90];
        let mut b = a;
        assert_eq!(
            network.forward(&STRESSED, &mut a),
            network.forward(&STRESSED, &mut b)
        );
        assert_eq!(a, b);
    }
}
