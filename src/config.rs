use crate::error::{Error, Result};
use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Knobs of one rhythm request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RhythmConfig {
    /// Deepest search depth; the schedule is 1, 2, 4, ... up to this.
    pub depth: u32,
    /// Ranked moves per oracle call (never below 2).
    pub width: u32,
    pub pv_plies: u32,
    /// Positions per remote call.
    pub batch_size: usize,
    /// Depth passes in flight at once.
    pub concurrency: usize,
    pub forced_threshold_cp: i32,
    pub forced_cap: usize,
    pub display_cap: usize,
    pub eval_clip_pawns: f64,
    /// Engine moves considered when explaining one ply (the played move is added).
    pub candidates: u32,
    /// Depth used to score each position along a candidate line.
    pub eval_depth: u32,
    pub model: String,
    /// Text-generation calls in flight at once.
    pub llm_concurrency: usize,
    pub retry: RetryPolicy,
}

impl Default for RhythmConfig {
    fn default() -> Self {
        Self {
            depth: 16,
            width: 2,
            pv_plies: 10,
            batch_size: 3,
            concurrency: 8,
            forced_threshold_cp: 100,
            forced_cap: 6,
            display_cap: 6,
            eval_clip_pawns: 6.0,
            candidates: 4,
            eval_depth: 12,
            model: "gemini-2.5-flash".to_string(),
            llm_concurrency: 24,
            retry: RetryPolicy::default(),
        }
    }
}

/// Largest accepted forced or display cap.
pub const MAX_CAP: usize = 64;

fn invalid(name: &str, reason: impl Into<String>) -> Error {
    Error::InvalidOption {
        name: name.to_string(),
        reason: reason.into(),
    }
}

fn parse<T: FromStr>(name: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e: T::Err| invalid(name, e.to_string()))
}

fn parse_cap(name: &str, value: &str) -> Result<usize> {
    let cap = parse(name, value)?;
    if cap > MAX_CAP {
        return Err(invalid(name, format!("must be at most {MAX_CAP}")));
    }
    Ok(cap)
}

impl RhythmConfig {
    pub fn width(&self) -> u32 {
        self.width.max(2)
    }

    /// Evaluation clip in pawns, falling back to the default when the field
    /// holds something unusable.
    pub fn eval_clip(&self) -> f64 {
        if self.eval_clip_pawns.is_finite() {
            self.eval_clip_pawns.abs()
        } else {
            RhythmConfig::default().eval_clip_pawns
        }
    }

    /// Applies a `setoption name <name> value <value>` pair. Names are matched
    /// case-insensitively.
    pub fn set_option(&mut self, name: &str, value: &str) -> Result<()> {
        match name.to_ascii_lowercase().as_str() {
            "depth" => self.depth = parse(name, value)?,
            "width" | "multipv" => self.width = parse(name, value)?,
            "pvplies" => self.pv_plies = parse(name, value)?,
            "batchsize" => self.batch_size = parse(name, value)?,
            "concurrency" => self.concurrency = parse(name, value)?,
            "forcedthreshold" => self.forced_threshold_cp = parse(name, value)?,
            "forcedcap" => self.forced_cap = parse_cap(name, value)?,
            "displaycap" => self.display_cap = parse_cap(name, value)?,
            "evalclip" => {
                let clip: f64 = parse(name, value)?;
                if !clip.is_finite() || clip <= 0.0 {
                    return Err(invalid(name, "must be a positive number"));
                }
                self.eval_clip_pawns = clip;
            }
            "candidates" => self.candidates = parse(name, value)?,
            "evaldepth" => self.eval_depth = parse(name, value)?,
            "model" => self.model = value.trim().to_string(),
            "llmconcurrency" => self.llm_concurrency = parse(name, value)?,
            _ => return Err(invalid(name, "unknown option")),
        }
        if self.depth == 0 {
            self.depth = 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_option() {
        let mut config = RhythmConfig::default();
        config.set_option("Depth", "8").unwrap();
        config.set_option("MultiPV", "1").unwrap();
        config.set_option("EvalClip", "4.5").unwrap();
        assert_eq!(config.depth, 8);
        assert_eq!(config.width(), 2);
        assert_eq!(config.eval_clip_pawns, 4.5);

        assert!(config.set_option("Depth", "deep").is_err());
        assert!(config.set_option("Contempt", "10").is_err());
    }

    #[test]
    fn test_set_option_rejects_unusable_values() {
        let mut config = RhythmConfig::default();
        for clip in ["NaN", "inf", "-inf", "0", "-2"] {
            assert!(
                matches!(
                    config.set_option("EvalClip", clip),
                    Err(Error::InvalidOption { .. })
                ),
                "{clip}"
            );
        }
        assert_eq!(config.eval_clip_pawns, 6.0);

        assert!(config.set_option("ForcedCap", &usize::MAX.to_string()).is_err());
        assert!(config.set_option("DisplayCap", "65").is_err());
        config.set_option("ForcedCap", "64").unwrap();
        assert_eq!(config.forced_cap, 64);

        config.set_option("Model", " local-model ").unwrap();
        assert_eq!(config.model, "local-model");
    }

    #[test]
    fn test_eval_clip_fallback() {
        let config = RhythmConfig {
            eval_clip_pawns: f64::NAN,
            ..RhythmConfig::default()
        };
        assert_eq!(config.eval_clip(), 6.0);
        let config = RhythmConfig {
            eval_clip_pawns: -3.0,
            ..RhythmConfig::default()
        };
        assert_eq!(config.eval_clip(), 3.0);
    }

    #[test]
    fn test_partial_json() {
        let config: RhythmConfig = serde_json::from_str(r#"{"depth": 4, "batch_size": 5}"#).unwrap();
        assert_eq!(config.depth, 4);
        assert_eq!(config.batch_size, 5);
        assert_eq!(config.forced_cap, 6);
    }
}
