use rand::Rng;
use serde::Serialize;
use serde_json::Value;
use std::time::{SystemTime, SystemTimeError, UNIX_EPOCH};

/// Heart rate above which calming music is played (bpm).
pub const CALM_MUSIC_THRESHOLD: i64 = 100;

/// True iff `value` reads as an integer strictly above the threshold.
/// Anything that does not read as an integer is simply `false`.
pub fn should_play_music(value: Option<&Value>) -> bool {
    value
        .and_then(as_int)
        .map(|hr| hr > CALM_MUSIC_THRESHOLD)
        .unwrap_or(false)
}

fn as_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(i)
            } else if n.as_u64().is_some() {
                Some(i64::MAX)
            } else {
                n.as_f64()
                    .filter(|x| x.is_finite())
                    .map(|x| x.trunc() as i64)
            }
        }
        Value::String(s) => parse_int(s),
        Value::Bool(b) => Some(i64::from(*b)),
        _ => None,
    }
}

/// Integer literal parsing: surrounding whitespace, an optional sign, and
/// digits optionally grouped by single underscores. Saturates on overflow.
fn parse_int(s: &str) -> Option<i64> {
    let s = s.trim();
    let (neg, digits) = match s.as_bytes().first()? {
        b'-' => (true, &s[1..]),
        b'+' => (false, &s[1..]),
        _ => (false, s),
    };
    if digits.is_empty()
        || digits.starts_with('_')
        || digits.ends_with('_')
        || digits.contains("__")
    {
        return None;
    }
    let mut acc: i64 = 0;
    for c in digits.chars().filter(|c| *c != '_') {
        let d = c.to_digit(10)? as i64;
        acc = acc.saturating_mul(10).saturating_add(d);
    }
    Some(if neg { -acc } else { acc })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Vitals {
    pub spo2: f64,
    pub temperature: f64,
    pub heart_rate: f64,
    pub timestamp: u64,
    pub source: &'static str,
}

pub fn now_unix_secs() -> Result<u64, SystemTimeError> {
    Ok(SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs())
}

/// Synthesizes a plausible vitals reading. Values drift with the second of the
/// minute so consecutive polls are not identical.
pub fn sample_vitals<R: Rng>(now: u64, rng: &mut R) -> Vitals {
    let phase = (now % 60) as f64 / 60.0;

    let spo2: f64 = rng.gen_range(95.0..=100.0f64) + rng.gen_range(-1.0..=1.0f64) * phase;
    let temp: f64 = rng.gen_range(36.0..=37.5f64) + rng.gen_range(-0.2..=0.2f64) * phase;
    let hr: f64 = rng.gen_range(60.0..=100.0f64) + rng.gen_range(-5.0..=5.0f64) * phase;

    Vitals {
        spo2: round1(spo2.clamp(90.0, 100.0)),
        temperature: round1(temp.clamp(35.5, 38.0)),
        heart_rate: hr.clamp(50.0, 120.0).round(),
        timestamp: now,
        source: "mock_data",
    }
}

fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}
