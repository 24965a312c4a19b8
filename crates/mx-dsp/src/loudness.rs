//! K-weighted loudness measurement
//!
//! ITU-R BS.1770-4 loudness with EBU R128 gating:
//! - K-weighting as a two-stage biquad cascade per channel (shelving
//!   pre-filter + RLB high-pass), coefficients derived from the ITU
//!   analog prototypes via bilinear transform at the buffer's rate
//! - 400 ms blocks with 75% overlap (100 ms hop)
//! - two-stage gate (-70 LUFS absolute, preliminary - 10 LU relative)
//! - short-term (3 s) series with a gated-median representative value
//! - LRA in both legacy (ungated P95-P10) and R128 (gated) variants
//!
//! Filter delay lines are created inside `measure` and dropped when it
//! returns; repeated calls on the same buffer are bit-identical.

use mx_core::{stats, MeterResult, PcmBuffer};
use serde::{Deserialize, Serialize};

/// Absolute gate threshold (LUFS)
const ABSOLUTE_GATE_LUFS: f64 = -70.0;
/// Relative gate offset below the preliminary loudness (LU)
const RELATIVE_GATE_LU: f64 = 10.0;
/// Relative gate offset for R128 loudness range (LU)
const LRA_RELATIVE_GATE_LU: f64 = 20.0;
/// BS.1770 energy-to-loudness offset
const LOUDNESS_OFFSET: f64 = -0.691;

/// Which LRA variant populated [`LoudnessResult::lra`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LraMode {
    /// EBU R128 gated loudness range (default)
    R128,
    /// Ungated P95-P10 of all finite short-term values
    LegacyPercentile,
}

/// Result of one loudness measurement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoudnessResult {
    /// Integrated loudness (LUFS), `-inf` for silence
    pub integrated_lufs: f64,
    /// Representative short-term loudness: median of the 3 s windows
    /// that pass the two-stage gate, `-inf` if none do
    pub short_term_lufs: f64,
    /// Momentary loudness: maximum 400 ms block loudness
    pub momentary_lufs: f64,
    /// Loudness range (LU) in the mode given by `lra_mode`
    pub lra: f64,
    /// Ungated legacy percentile LRA, kept as a diagnostic
    pub lra_legacy: f64,
    /// Variant stored in `lra`
    pub lra_mode: LraMode,
    /// Number of 400 ms blocks measured
    pub blocks_total: usize,
    /// Blocks surviving both gate stages
    pub blocks_gated: usize,
}

impl LoudnessResult {
    fn silent() -> Self {
        Self {
            integrated_lufs: f64::NEG_INFINITY,
            short_term_lufs: f64::NEG_INFINITY,
            momentary_lufs: f64::NEG_INFINITY,
            lra: 0.0,
            lra_legacy: 0.0,
            lra_mode: LraMode::R128,
            blocks_total: 0,
            blocks_gated: 0,
        }
    }
}

/// K-weighting filter: shelving pre-filter + RLB high-pass.
///
/// Coefficients follow the BS.1770-4 prototypes (pre-filter centered at
/// 1681.97 Hz with +4 dB high shelf, RLB high-pass at 38.14 Hz),
/// mapped to the target rate with the bilinear transform so any sample
/// rate reproduces the standard response exactly.
struct KWeighting {
    // Shelf coefficients and state
    sb0: f64,
    sb1: f64,
    sb2: f64,
    sa1: f64,
    sa2: f64,
    s_z1: f64,
    s_z2: f64,
    // High-pass coefficients and state
    hb0: f64,
    hb1: f64,
    hb2: f64,
    ha1: f64,
    ha2: f64,
    h_z1: f64,
    h_z2: f64,
}

impl KWeighting {
    fn new(sample_rate: u32) -> Self {
        use std::f64::consts::PI;
        let fs = sample_rate as f64;

        // Stage 1: shelving pre-filter (head-response model)
        let f0 = 1681.974450955533;
        let gain_db = 3.999843853973347;
        let q = 0.7071752369554196;

        let k = (PI * f0 / fs).tan();
        let vh = 10.0_f64.powf(gain_db / 20.0);
        let vb = vh.powf(0.4996667741545416);
        let a0 = 1.0 + k / q + k * k;
        let sb0 = (vh + vb * k / q + k * k) / a0;
        let sb1 = 2.0 * (k * k - vh) / a0;
        let sb2 = (vh - vb * k / q + k * k) / a0;
        let sa1 = 2.0 * (k * k - 1.0) / a0;
        let sa2 = (1.0 - k / q + k * k) / a0;

        // Stage 2: RLB high-pass
        let f0 = 38.13547087602444;
        let q = 0.5003270373238773;

        let k = (PI * f0 / fs).tan();
        let a0 = 1.0 + k / q + k * k;
        let ha1 = 2.0 * (k * k - 1.0) / a0;
        let ha2 = (1.0 - k / q + k * k) / a0;

        Self {
            sb0,
            sb1,
            sb2,
            sa1,
            sa2,
            s_z1: 0.0,
            s_z2: 0.0,
            hb0: 1.0,
            hb1: -2.0,
            hb2: 1.0,
            ha1,
            ha2,
            h_z1: 0.0,
            h_z2: 0.0,
        }
    }

    /// Transposed direct form II, both stages.
    fn process(&mut self, input: f64) -> f64 {
        let s_out = self.sb0 * input + self.s_z1;
        self.s_z1 = self.sb1 * input - self.sa1 * s_out + self.s_z2;
        self.s_z2 = self.sb2 * input - self.sa2 * s_out;

        let h_out = self.hb0 * s_out + self.h_z1;
        self.h_z1 = self.hb1 * s_out - self.ha1 * h_out + self.h_z2;
        self.h_z2 = self.hb2 * s_out - self.ha2 * h_out;

        h_out
    }
}

fn power_to_lufs(power: f64) -> f64 {
    if power > 0.0 {
        LOUDNESS_OFFSET + 10.0 * power.log10()
    } else {
        f64::NEG_INFINITY
    }
}

fn lufs_to_power(lufs: f64) -> f64 {
    10.0_f64.powf((lufs - LOUDNESS_OFFSET) / 10.0)
}

/// Measure loudness of a complete buffer.
///
/// Channels are weighted equally (stereo L/R per BS.1770-4); surround
/// channel weighting is out of scope for this pipeline.
pub fn measure(pcm: &PcmBuffer) -> MeterResult<LoudnessResult> {
    let fs = pcm.sample_rate() as usize;
    // 100 ms gating cells; a 400 ms block is four cells, a 3 s
    // short-term window is thirty.
    let cell = fs / 10;
    if cell == 0 {
        return Ok(LoudnessResult::silent());
    }

    // Per-channel K-weighted mean square per 100 ms cell, summed over
    // channels with equal weight.
    let num_cells = pcm.num_samples() / cell;
    if num_cells == 0 {
        return Ok(LoudnessResult::silent());
    }

    let mut cell_power = vec![0.0f64; num_cells];
    for ch in pcm.channels() {
        let mut filter = KWeighting::new(pcm.sample_rate());
        for (ci, power) in cell_power.iter_mut().enumerate() {
            let start = ci * cell;
            let mut sum_sq = 0.0f64;
            for &sample in &ch[start..start + cell] {
                let w = filter.process(sample);
                sum_sq += w * w;
            }
            *power += sum_sq / cell as f64;
        }
    }

    // 400 ms blocks at 100 ms hop
    let block_powers: Vec<f64> = cell_power
        .windows(4)
        .map(|w| w.iter().sum::<f64>() / 4.0)
        .collect();
    if block_powers.is_empty() {
        return Ok(LoudnessResult::silent());
    }
    let blocks_total = block_powers.len();

    let momentary_lufs = block_powers
        .iter()
        .map(|&p| power_to_lufs(p))
        .fold(f64::NEG_INFINITY, f64::max);

    // Two-stage gate for the integrated value
    let abs_gate = lufs_to_power(ABSOLUTE_GATE_LUFS);
    let stage1: Vec<f64> = block_powers.iter().copied().filter(|&p| p > abs_gate).collect();

    let (integrated_lufs, relative_gate, blocks_gated) = if stage1.is_empty() {
        (f64::NEG_INFINITY, f64::NEG_INFINITY, 0)
    } else {
        let preliminary = power_to_lufs(stage1.iter().sum::<f64>() / stage1.len() as f64);
        let rel_gate = lufs_to_power(preliminary - RELATIVE_GATE_LU);
        let stage2: Vec<f64> = stage1.iter().copied().filter(|&p| p >= rel_gate).collect();
        if stage2.is_empty() {
            (f64::NEG_INFINITY, rel_gate, 0)
        } else {
            let mean = stage2.iter().sum::<f64>() / stage2.len() as f64;
            (power_to_lufs(mean), rel_gate, stage2.len())
        }
    };

    // Short-term series: contiguous 3 s groups of cells, 100 ms hop
    let st_powers: Vec<f64> = cell_power
        .windows(30)
        .map(|w| w.iter().sum::<f64>() / 30.0)
        .collect();
    let st_lufs: Vec<f64> = st_powers.iter().map(|&p| power_to_lufs(p)).collect();

    // Representative short-term value: median of windows passing the
    // same two-stage gate, so fades and silence never dominate.
    let gated_st: Vec<f64> = st_powers
        .iter()
        .copied()
        .filter(|&p| p > abs_gate && p >= relative_gate)
        .map(power_to_lufs)
        .collect();
    let short_term_lufs = stats::median(&gated_st).unwrap_or(f64::NEG_INFINITY);

    // LRA, both variants
    let finite_st: Vec<f64> = st_lufs.iter().copied().filter(|v| v.is_finite()).collect();
    let lra_legacy = percentile_range(&finite_st);

    let r128_st: Vec<f64> = finite_st
        .iter()
        .copied()
        .filter(|&v| v > ABSOLUTE_GATE_LUFS && v >= integrated_lufs - LRA_RELATIVE_GATE_LU)
        .collect();
    let lra_r128 = percentile_range(&r128_st);

    Ok(LoudnessResult {
        integrated_lufs,
        short_term_lufs,
        momentary_lufs,
        lra: lra_r128,
        lra_legacy,
        lra_mode: LraMode::R128,
        blocks_total,
        blocks_gated,
    })
}

/// P95 - P10 spread, 0 when fewer than two values remain.
fn percentile_range(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let high = stats::percentile(values, 95.0).unwrap_or(0.0);
    let low = stats::percentile(values, 10.0).unwrap_or(0.0);
    (high - low).max(0.0)
}
