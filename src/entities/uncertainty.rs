//! Uncertainty distributions attached to exchanges, characterization factors
//! and parameters
//!
//! Distribution ids follow the stats-arrays numbering used by LCA databases.

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Distribution family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UncertaintyType {
    /// 0 - no information
    #[default]
    Undefined,
    /// 1 - value is exact
    NoUncertainty,
    /// 2 - lognormal, `loc` is ln(median), `scale` the geometric sigma
    Lognormal,
    /// 3 - normal with mean `loc` and standard deviation `scale`
    Normal,
    /// 4 - uniform on `[minimum, maximum]`
    Uniform,
    /// 5 - triangular on `[minimum, maximum]` with mode `loc`
    Triangular,
    /// Any other id; sampled as its deterministic amount
    Other(u8),
}

impl UncertaintyType {
    pub fn id(&self) -> u8 {
        match self {
            UncertaintyType::Undefined => 0,
            UncertaintyType::NoUncertainty => 1,
            UncertaintyType::Lognormal => 2,
            UncertaintyType::Normal => 3,
            UncertaintyType::Uniform => 4,
            UncertaintyType::Triangular => 5,
            UncertaintyType::Other(id) => *id,
        }
    }

    pub fn from_id(id: u8) -> Self {
        match id {
            0 => UncertaintyType::Undefined,
            1 => UncertaintyType::NoUncertainty,
            2 => UncertaintyType::Lognormal,
            3 => UncertaintyType::Normal,
            4 => UncertaintyType::Uniform,
            5 => UncertaintyType::Triangular,
            other => UncertaintyType::Other(other),
        }
    }

    /// Whether sampling produces varying values
    pub fn is_stochastic(&self) -> bool {
        matches!(
            self,
            UncertaintyType::Lognormal
                | UncertaintyType::Normal
                | UncertaintyType::Uniform
                | UncertaintyType::Triangular
        )
    }
}

impl std::fmt::Display for UncertaintyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UncertaintyType::Undefined => write!(f, "undefined"),
            UncertaintyType::NoUncertainty => write!(f, "none"),
            UncertaintyType::Lognormal => write!(f, "lognormal"),
            UncertaintyType::Normal => write!(f, "normal"),
            UncertaintyType::Uniform => write!(f, "uniform"),
            UncertaintyType::Triangular => write!(f, "triangular"),
            UncertaintyType::Other(id) => write!(f, "type {}", id),
        }
    }
}

impl Serialize for UncertaintyType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.id())
    }
}

impl<'de> Deserialize<'de> for UncertaintyType {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(UncertaintyType::from_id(u8::deserialize(deserializer)?))
    }
}

/// Uncertainty description of a single amount
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Uncertainty {
    #[serde(rename = "uncertainty type", default)]
    pub kind: UncertaintyType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loc: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shape: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub negative: bool,
}

impl Uncertainty {
    pub fn normal(mean: f64, std_dev: f64) -> Self {
        Self {
            kind: UncertaintyType::Normal,
            loc: Some(mean),
            scale: Some(std_dev),
            ..Default::default()
        }
    }

    /// Lognormal around `amount` with geometric standard deviation `exp(sigma)`
    pub fn lognormal(amount: f64, sigma: f64) -> Self {
        Self {
            kind: UncertaintyType::Lognormal,
            loc: Some(amount.abs().ln()),
            scale: Some(sigma),
            negative: amount < 0.0,
            ..Default::default()
        }
    }

    pub fn uniform(minimum: f64, maximum: f64) -> Self {
        Self {
            kind: UncertaintyType::Uniform,
            minimum: Some(minimum),
            maximum: Some(maximum),
            ..Default::default()
        }
    }

    pub fn triangular(minimum: f64, mode: f64, maximum: f64) -> Self {
        Self {
            kind: UncertaintyType::Triangular,
            loc: Some(mode),
            minimum: Some(minimum),
            maximum: Some(maximum),
            ..Default::default()
        }
    }

    pub fn is_stochastic(&self) -> bool {
        self.kind.is_stochastic()
    }

    /// Draw one value; `amount` is returned for deterministic types and for
    /// distributions missing a required field
    pub fn sample<R: Rng + ?Sized>(&self, amount: f64, rng: &mut R) -> f64 {
        match self.kind {
            UncertaintyType::Normal => {
                let mean = self.loc.unwrap_or(amount);
                match self.scale {
                    Some(sigma) => mean + sigma * standard_normal(rng),
                    None => amount,
                }
            }
            UncertaintyType::Lognormal => {
                let loc = self.loc.unwrap_or_else(|| amount.abs().ln());
                match self.scale {
                    Some(sigma) => {
                        let value = (loc + sigma * standard_normal(rng)).exp();
                        if self.negative || (self.loc.is_none() && amount < 0.0) {
                            -value
                        } else {
                            value
                        }
                    }
                    None => amount,
                }
            }
            UncertaintyType::Uniform => match (self.minimum, self.maximum) {
                (Some(min), Some(max)) if max > min => rng.random_range(min..=max),
                _ => amount,
            },
            UncertaintyType::Triangular => match (self.minimum, self.maximum) {
                (Some(min), Some(max)) if max > min => {
                    let mode = self.loc.unwrap_or(amount).clamp(min, max);
                    // Inverse transform
                    let u: f64 = rng.random();
                    let fc = (mode - min) / (max - min);
                    if u < fc {
                        min + (u * (max - min) * (mode - min)).sqrt()
                    } else {
                        max - ((1.0 - u) * (max - min) * (max - mode)).sqrt()
                    }
                }
                _ => amount,
            },
            _ => amount,
        }
    }
}

/// Standard normal draw via the Box-Muller transform
fn standard_normal<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    // random() is in [0, 1); shift to (0, 1] so ln() stays finite
    let u1: f64 = 1.0 - rng.random::<f64>();
    let u2: f64 = rng.random();
    (-2.0_f64 * u1.ln()).sqrt() * (2.0_f64 * std::f64::consts::PI * u2).cos()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn mean_and_std(samples: &[f64]) -> (f64, f64) {
        let n = samples.len() as f64;
        let mean = samples.iter().sum::<f64>() / n;
        let var = samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
        (mean, var.sqrt())
    }

    #[test]
    fn test_deterministic_types_return_amount() {
        let mut rng = StdRng::seed_from_u64(1);
        let none = Uncertainty::default();
        assert_eq!(none.sample(4.2, &mut rng), 4.2);
        let other = Uncertainty {
            kind: UncertaintyType::Other(7),
            ..Default::default()
        };
        assert_eq!(other.sample(-1.0, &mut rng), -1.0);
        assert!(!other.is_stochastic());
    }

    #[test]
    fn test_normal_sampling_statistics() {
        let mut rng = StdRng::seed_from_u64(42);
        let u = Uncertainty::normal(10.0, 2.0);
        let samples: Vec<f64> = (0..20_000).map(|_| u.sample(10.0, &mut rng)).collect();
        let (mean, std) = mean_and_std(&samples);
        assert!((mean - 10.0).abs() < 0.1, "mean was {}", mean);
        assert!((std - 2.0).abs() < 0.1, "std was {}", std);
    }

    #[test]
    fn test_lognormal_negative_flag() {
        let mut rng = StdRng::seed_from_u64(7);
        let u = Uncertainty::lognormal(-3.0, 0.1);
        for _ in 0..100 {
            assert!(u.sample(-3.0, &mut rng) < 0.0);
        }
    }

    #[test]
    fn test_uniform_and_triangular_bounds() {
        let mut rng = StdRng::seed_from_u64(3);
        let uni = Uncertainty::uniform(1.0, 2.0);
        let tri = Uncertainty::triangular(0.0, 0.2, 1.0);
        for _ in 0..1000 {
            let a = uni.sample(1.5, &mut rng);
            let b = tri.sample(0.2, &mut rng);
            assert!((1.0..=2.0).contains(&a));
            assert!((0.0..=1.0).contains(&b));
        }
    }

    #[test]
    fn test_uncertainty_type_serializes_as_id() {
        let u = Uncertainty::normal(1.0, 0.5);
        let json = serde_json::to_value(&u).unwrap();
        assert_eq!(json["uncertainty type"], 3);
        let back: Uncertainty = serde_json::from_value(json).unwrap();
        assert_eq!(back.kind, UncertaintyType::Normal);
    }
}
