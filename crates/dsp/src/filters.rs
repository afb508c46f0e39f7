use std::f64::consts::PI;

use marlet_types::{ConfigError, FilterConfig};
use tracing::{debug, info, warn};

/// Coefficients of one IIR section, normalized so that a0 == 1.
///
/// First-order sections are stored with `b2 == a2 == 0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coefficients {
    pub b0: f64,
    pub b1: f64,
    pub b2: f64,
    pub a1: f64,
    pub a2: f64,
}

impl Coefficients {
    fn normalized(b0: f64, b1: f64, b2: f64, a0: f64, a1: f64, a2: f64) -> Self {
        Self {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
        }
    }

    /// RBJ cookbook low-pass biquad.
    pub fn lowpass(sample_rate: f64, freq: f64, q: f64) -> Self {
        let omega = 2.0 * PI * freq / sample_rate;
        let alpha = omega.sin() / (2.0 * q);
        let cos_omega = omega.cos();

        Self::normalized(
            (1.0 - cos_omega) / 2.0,
            1.0 - cos_omega,
            (1.0 - cos_omega) / 2.0,
            1.0 + alpha,
            -2.0 * cos_omega,
            1.0 - alpha,
        )
    }

    /// RBJ cookbook high-pass biquad.
    pub fn highpass(sample_rate: f64, freq: f64, q: f64) -> Self {
        let omega = 2.0 * PI * freq / sample_rate;
        let alpha = omega.sin() / (2.0 * q);
        let cos_omega = omega.cos();

        Self::normalized(
            (1.0 + cos_omega) / 2.0,
            -(1.0 + cos_omega),
            (1.0 + cos_omega) / 2.0,
            1.0 + alpha,
            -2.0 * cos_omega,
            1.0 - alpha,
        )
    }

    /// RBJ cookbook notch biquad. Higher `q` gives a narrower notch.
    pub fn notch(sample_rate: f64, freq: f64, q: f64) -> Self {
        let omega = 2.0 * PI * freq / sample_rate;
        let alpha = omega.sin() / (2.0 * q);
        let cos_omega = omega.cos();

        Self::normalized(
            1.0,
            -2.0 * cos_omega,
            1.0,
            1.0 + alpha,
            -2.0 * cos_omega,
            1.0 - alpha,
        )
    }

    /// Bilinear first-order low-pass, prewarped at `freq`.
    pub fn first_order_lowpass(sample_rate: f64, freq: f64) -> Self {
        let k = (PI * freq / sample_rate).tan();
        let b0 = k / (k + 1.0);
        Self {
            b0,
            b1: b0,
            b2: 0.0,
            a1: (k - 1.0) / (k + 1.0),
            a2: 0.0,
        }
    }

    /// Bilinear first-order high-pass, prewarped at `freq`.
    pub fn first_order_highpass(sample_rate: f64, freq: f64) -> Self {
        let k = (PI * freq / sample_rate).tan();
        let b0 = 1.0 / (k + 1.0);
        Self {
            b0,
            b1: -b0,
            b2: 0.0,
            a1: (k - 1.0) / (k + 1.0),
            a2: 0.0,
        }
    }

    /// Largest pole magnitude, i.e. the largest root of z^2 + a1 z + a2.
    pub fn pole_radius(&self) -> f64 {
        let disc = self.a1 * self.a1 - 4.0 * self.a2;
        if disc < 0.0 {
            // complex conjugate pair, |p|^2 = a2
            self.a2.sqrt()
        } else {
            let root = disc.sqrt();
            let p1 = (-self.a1 + root) / 2.0;
            let p2 = (-self.a1 - root) / 2.0;
            p1.abs().max(p2.abs())
        }
    }

    /// Gain at 0 Hz.
    pub fn dc_gain(&self) -> f64 {
        (self.b0 + self.b1 + self.b2) / (1.0 + self.a1 + self.a2)
    }
}

/// Direct Form II Transposed section with its own delay line.
#[derive(Debug, Clone)]
pub struct Section {
    coeffs: Coefficients,
    z1: f64,
    z2: f64,
}

impl Section {
    pub fn new(coeffs: Coefficients) -> Self {
        Self {
            coeffs,
            z1: 0.0,
            z2: 0.0,
        }
    }

    pub fn coefficients(&self) -> &Coefficients {
        &self.coeffs
    }

    pub fn pole_radius(&self) -> f64 {
        self.coeffs.pole_radius()
    }

    #[inline]
    fn process(&mut self, x: f64) -> f64 {
        let c = &self.coeffs;
        let y = c.b0 * x + self.z1;
        self.z1 = c.b1 * x - c.a1 * y + self.z2;
        self.z2 = c.b2 * x - c.a2 * y;
        y
    }

    /// Loads the delay line with the steady state for a constant input `x` and
    /// returns the steady-state output.
    fn prime(&mut self, x: f64) -> f64 {
        let c = &self.coeffs;
        let y = c.dc_gain() * x;
        self.z1 = y - c.b0 * x;
        self.z2 = c.b2 * x - c.a2 * y;
        y
    }

    fn clear(&mut self) {
        self.z1 = 0.0;
        self.z2 = 0.0;
    }
}

/// Streaming band-pass + notch chain for a single channel.
///
/// The band-pass is an order-N Butterworth high-pass at the low cutoff followed by an
/// order-N Butterworth low-pass at the high cutoff, each split into biquads plus one
/// first-order section when N is odd. The optional notch runs last.
#[derive(Debug, Clone)]
pub struct FilterCascade {
    sections: Vec<Section>,
    band_sections: usize,
    last_output: f64,
    primed: bool,
    anomalies: u64,
}

impl FilterCascade {
    pub fn new(config: &FilterConfig, sample_rate_hz: f64) -> Result<Self, ConfigError> {
        if !(sample_rate_hz.is_finite() && sample_rate_hz > 0.0) {
            return Err(ConfigError::InvalidSampleRate(sample_rate_hz));
        }
        if config.order < 1 {
            return Err(ConfigError::InvalidOrder(config.order));
        }
        let (low, high) = (config.low_cut_hz, config.high_cut_hz);
        if !(low.is_finite() && high.is_finite() && low > 0.0 && low < high) {
            return Err(ConfigError::InvalidCutoffs {
                low_hz: low,
                high_hz: high,
            });
        }
        let nyquist = sample_rate_hz / 2.0;
        if high >= nyquist {
            return Err(ConfigError::AboveNyquist {
                name: "high_cut",
                freq_hz: high,
                nyquist_hz: nyquist,
            });
        }

        let mut sections = butterworth_highpass(sample_rate_hz, low, config.order);
        sections.extend(butterworth_lowpass(sample_rate_hz, high, config.order));
        let band_sections = sections.len();

        if let Some(notch_hz) = config.notch_hz {
            let q = config.notch_q;
            if !(notch_hz.is_finite() && notch_hz > 0.0 && q.is_finite() && q > 0.0) {
                return Err(ConfigError::InvalidNotch { freq_hz: notch_hz, q });
            }
            if notch_hz >= nyquist {
                return Err(ConfigError::AboveNyquist {
                    name: "notch",
                    freq_hz: notch_hz,
                    nyquist_hz: nyquist,
                });
            }
            sections.push(Section::new(Coefficients::notch(sample_rate_hz, notch_hz, q)));
        }

        for (index, section) in sections.iter().enumerate() {
            let pole_radius = section.pole_radius();
            if !(pole_radius < 1.0) {
                return Err(ConfigError::UnstableDesign {
                    section: index,
                    pole_radius,
                });
            }
        }

        info!(
            sample_rate_hz,
            low_cut_hz = low,
            high_cut_hz = high,
            order = config.order,
            notch_hz = ?config.notch_hz,
            sections = sections.len(),
            "Filter cascade designed"
        );

        Ok(Self {
            sections,
            band_sections,
            last_output: 0.0,
            primed: false,
            anomalies: 0,
        })
    }

    /// Conditions one raw sample.
    ///
    /// A non-finite input yields the previous conditioned value and leaves the delay
    /// lines untouched. A finite input that drives the output non-finite resets the
    /// delay lines and also yields the previous value. Both count as anomalies.
    pub fn apply(&mut self, raw: f64) -> f64 {
        if !raw.is_finite() {
            self.anomalies += 1;
            debug!(raw, anomalies = self.anomalies, "Non-finite input sample substituted");
            return self.last_output;
        }

        let output = if self.primed {
            self.sections.iter_mut().fold(raw, |x, s| s.process(x))
        } else {
            self.primed = true;
            self.sections.iter_mut().fold(raw, |x, s| s.prime(x))
        };

        if !output.is_finite() {
            self.anomalies += 1;
            warn!(raw, anomalies = self.anomalies, "Filter output diverged, resetting delay lines");
            self.clear_delay_lines();
            return self.last_output;
        }

        self.last_output = output;
        output
    }

    /// Number of substituted samples since construction.
    pub fn anomaly_count(&self) -> u64 {
        self.anomalies
    }

    /// Clears every delay line and the held output. The anomaly count is kept.
    pub fn reset(&mut self) {
        self.clear_delay_lines();
        self.last_output = 0.0;
    }

    /// All sections in processing order: band-pass first, then the notch if configured.
    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn has_notch(&self) -> bool {
        self.sections.len() > self.band_sections
    }

    fn clear_delay_lines(&mut self) {
        for section in &mut self.sections {
            section.clear();
        }
        self.primed = false;
    }
}

/// Q of the k-th biquad of an order-n Butterworth prototype.
fn butterworth_q(k: usize, n: usize) -> f64 {
    1.0 / (2.0 * (((2 * k + 1) as f64) * PI / (2.0 * n as f64)).sin())
}

fn butterworth_highpass(sample_rate: f64, freq: f64, order: usize) -> Vec<Section> {
    let mut sections: Vec<Section> = (0..order / 2)
        .map(|k| Section::new(Coefficients::highpass(sample_rate, freq, butterworth_q(k, order))))
        .collect();
    if order % 2 == 1 {
        sections.push(Section::new(Coefficients::first_order_highpass(sample_rate, freq)));
    }
    sections
}

fn butterworth_lowpass(sample_rate: f64, freq: f64, order: usize) -> Vec<Section> {
    let mut sections: Vec<Section> = (0..order / 2)
        .map(|k| Section::new(Coefficients::lowpass(sample_rate, freq, butterworth_q(k, order))))
        .collect();
    if order % 2 == 1 {
        sections.push(Section::new(Coefficients::first_order_lowpass(sample_rate, freq)));
    }
    sections
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const FS: f64 = 256.0;

    fn default_cascade() -> FilterCascade {
        FilterCascade::new(&FilterConfig::default(), FS).unwrap()
    }

    fn sine(freq: f64, amplitude: f64, n: usize) -> impl Iterator<Item = f64> {
        (0..n).map(move |i| amplitude * (2.0 * PI * freq * i as f64 / FS).sin())
    }

    fn peak_after(cascade: &mut FilterCascade, input: impl Iterator<Item = f64>, skip: usize) -> f64 {
        input
            .map(|x| cascade.apply(x))
            .skip(skip)
            .fold(0.0_f64, |acc, y| acc.max(y.abs()))
    }

    #[test]
    fn test_section_count_follows_order() {
        let cascade = default_cascade();
        // order 5: two biquads + one first-order per edge, plus the notch
        assert_eq!(cascade.sections().len(), 7);
        assert!(cascade.has_notch());

        let config = FilterConfig {
            order: 4,
            notch_hz: None,
            ..FilterConfig::default()
        };
        let cascade = FilterCascade::new(&config, FS).unwrap();
        assert_eq!(cascade.sections().len(), 4);
        assert!(!cascade.has_notch());
    }

    #[test]
    fn test_butterworth_q_values() {
        assert!((butterworth_q(0, 2) - std::f64::consts::FRAC_1_SQRT_2).abs() < 1e-12);
        assert!((butterworth_q(0, 5) - 1.618_034).abs() < 1e-5);
        assert!((butterworth_q(1, 5) - 0.618_034).abs() < 1e-5);
    }

    #[test]
    fn test_all_poles_inside_unit_circle() {
        for order in 1..=8 {
            let config = FilterConfig {
                order,
                ..FilterConfig::default()
            };
            let cascade = FilterCascade::new(&config, FS).unwrap();
            for section in cascade.sections() {
                assert!(section.pole_radius() < 1.0, "order {order}: {:?}", section.coefficients());
            }
        }
    }

    #[test]
    fn test_invalid_designs_are_rejected() {
        let base = FilterConfig::default();

        let inverted = FilterConfig {
            low_cut_hz: 30.0,
            high_cut_hz: 4.0,
            ..base.clone()
        };
        assert!(matches!(
            FilterCascade::new(&inverted, FS),
            Err(ConfigError::InvalidCutoffs { .. })
        ));

        let zero_low = FilterConfig {
            low_cut_hz: 0.0,
            ..base.clone()
        };
        assert!(matches!(
            FilterCascade::new(&zero_low, FS),
            Err(ConfigError::InvalidCutoffs { .. })
        ));

        let above_nyquist = FilterConfig {
            high_cut_hz: 200.0,
            ..base.clone()
        };
        assert!(matches!(
            FilterCascade::new(&above_nyquist, FS),
            Err(ConfigError::AboveNyquist { name: "high_cut", .. })
        ));

        let zero_order = FilterConfig {
            order: 0,
            ..base.clone()
        };
        assert_eq!(
            FilterCascade::new(&zero_order, FS).unwrap_err(),
            ConfigError::InvalidOrder(0)
        );

        let bad_notch = FilterConfig {
            notch_hz: Some(150.0),
            ..base.clone()
        };
        assert!(matches!(
            FilterCascade::new(&bad_notch, FS),
            Err(ConfigError::AboveNyquist { name: "notch", .. })
        ));

        let bad_q = FilterConfig {
            notch_q: 0.0,
            ..base.clone()
        };
        assert!(matches!(
            FilterCascade::new(&bad_q, FS),
            Err(ConfigError::InvalidNotch { .. })
        ));

        assert!(matches!(
            FilterCascade::new(&base, 0.0),
            Err(ConfigError::InvalidSampleRate(_))
        ));
    }

    #[test]
    fn test_unstable_coefficients_report_radius() {
        let unstable = Coefficients {
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 1.21,
        };
        assert!((unstable.pole_radius() - 1.1).abs() < 1e-12);

        let first_order = Coefficients::first_order_lowpass(FS, 30.0);
        assert!((first_order.pole_radius() - first_order.a1.abs()).abs() < 1e-12);
    }

    #[test]
    fn test_passband_sine_is_preserved() {
        let mut cascade = default_cascade();
        let peak = peak_after(&mut cascade, sine(12.0, 50.0, 4096), 1024);
        assert!(peak > 40.0 && peak < 60.0, "peak {peak}");
    }

    #[test]
    fn test_powerline_is_suppressed() {
        let mut cascade = default_cascade();
        let peak = peak_after(&mut cascade, sine(50.0, 50.0, 8192), 4096);
        assert!(peak < 2.0, "peak {peak}");
    }

    #[test]
    fn test_dc_offset_produces_no_transient() {
        let mut cascade = default_cascade();
        for _ in 0..2000 {
            let y = cascade.apply(500.0);
            assert!(y.abs() < 1e-6, "output {y}");
        }
    }

    #[test]
    fn test_nan_sample_is_substituted_with_previous_output() {
        let mut cascade = default_cascade();
        let mut previous = 0.0;
        for x in sine(10.0, 20.0, 300) {
            previous = cascade.apply(x);
        }

        let substituted = cascade.apply(f64::NAN);
        assert_eq!(substituted, previous);
        assert_eq!(cascade.anomaly_count(), 1);

        assert_eq!(cascade.apply(f64::INFINITY), previous);
        assert_eq!(cascade.anomaly_count(), 2);

        for x in sine(10.0, 20.0, 300) {
            assert!(cascade.apply(x).is_finite());
        }
        assert_eq!(cascade.anomaly_count(), 2);
    }

    #[test]
    fn test_diverging_output_resets_state() {
        let mut cascade = default_cascade();
        let inputs = [1.0, f64::MAX, f64::MAX, -f64::MAX, 1.0, 1.0, 1.0];
        for x in inputs {
            assert!(cascade.apply(x).is_finite());
        }
        assert!(cascade.anomaly_count() >= 1);
    }

    #[test]
    fn test_reset_restores_fresh_behavior() {
        let mut fresh = default_cascade();
        let mut used = default_cascade();
        for x in sine(20.0, 30.0, 500) {
            used.apply(x);
        }
        used.reset();

        for x in sine(7.0, 15.0, 200) {
            assert_eq!(fresh.apply(x), used.apply(x));
        }
    }

    proptest! {
        #[test]
        fn prop_fresh_cascades_are_deterministic(input in prop::collection::vec(-100.0f64..100.0, 1..512)) {
            let mut a = default_cascade();
            let mut b = default_cascade();
            for x in input {
                prop_assert_eq!(a.apply(x).to_bits(), b.apply(x).to_bits());
            }
        }

        #[test]
        fn prop_bounded_input_gives_bounded_output(input in prop::collection::vec(-100.0f64..100.0, 1..4096)) {
            let mut cascade = default_cascade();
            for x in input {
                let y = cascade.apply(x);
                prop_assert!(y.abs() < 5000.0);
            }
        }
    }
}
