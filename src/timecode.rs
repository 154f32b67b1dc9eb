// Frame / time conversions
//
// FFmpeg clipping options (-ss, -t, -to) take sexagesimal positions with
// rounded milliseconds; frame counts are recomputed from those positions
// so the decode stage reads exactly as many frames as FFmpeg will emit.

use std::fmt;

/// A rational frame rate as reported by ffprobe (e.g. 30000/1001)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameRate {
    pub num: u32,
    pub den: u32,
}

impl FrameRate {
    pub fn new(num: u32, den: u32) -> Self {
        Self { num, den: den.max(1) }
    }

    /// Parse the "num/den" form used by ffprobe
    pub fn parse(s: &str) -> Option<Self> {
        let (num, den) = match s.split_once('/') {
            Some((n, d)) => (n.trim().parse().ok()?, d.trim().parse().ok()?),
            None => (s.trim().parse().ok()?, 1),
        };
        if den == 0 {
            return None;
        }
        Some(Self { num, den })
    }

    pub fn as_f64(&self) -> f64 {
        f64::from(self.num) / f64::from(self.den)
    }

    /// The "num:den" form expected by the FFmpeg -r option
    pub fn to_ffmpeg_arg(&self) -> String {
        format!("{}:{}", self.num, self.den)
    }
}

impl fmt::Display for FrameRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.den == 1 {
            write!(f, "{}", self.num)
        } else {
            write!(f, "{:.2}", self.as_f64())
        }
    }
}

/// Position of a frame in seconds
pub fn frame_to_seconds(no: u64, rate: FrameRate) -> f64 {
    no as f64 * f64::from(rate.den) / f64::from(rate.num)
}

/// Position in seconds as H:MM:SS.mmm with milliseconds rounded to the
/// nearest integer, the precision FFmpeg uses for -ss
pub fn seconds_to_sexagesimal(seconds: f64) -> String {
    let total_ms = (seconds * 1000.0).round() as u64;
    let ms = total_ms % 1000;
    let s = (total_ms / 1000) % 60;
    let m = (total_ms / 60_000) % 60;
    let h = total_ms / 3_600_000;
    format!("{h}:{m:02}:{s:02}.{ms:03}")
}

/// Parse [[H:]MM:]SS[.mmm] into seconds
pub fn parse_sexagesimal(s: &str) -> Option<f64> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    let mut seconds = 0.0;
    let parts: Vec<&str> = s.split(':').collect();
    if parts.len() > 3 {
        return None;
    }
    for part in &parts {
        let v: f64 = part.parse().ok()?;
        if v < 0.0 {
            return None;
        }
        seconds = seconds * 60.0 + v;
    }
    Some(seconds)
}

/// Number of whole frames within a span of seconds
pub fn seconds_to_frames(seconds: f64, rate: FrameRate) -> u64 {
    (seconds * rate.as_f64()).round().max(0.0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_rational() {
        assert_eq!(FrameRate::parse("30000/1001"), Some(FrameRate::new(30000, 1001)));
        assert_eq!(FrameRate::parse("25"), Some(FrameRate::new(25, 1)));
        assert_eq!(FrameRate::parse("25/0"), None);
        assert_eq!(FrameRate::parse("abc"), None);
    }

    #[test]
    fn display_rates() {
        assert_eq!(FrameRate::new(25, 1).to_string(), "25");
        assert_eq!(FrameRate::new(30000, 1001).to_string(), "29.97");
    }

    #[test]
    fn frame_positions() {
        let fps = FrameRate::new(25, 1);
        assert_eq!(frame_to_seconds(100, fps), 4.0);
        assert_eq!(seconds_to_sexagesimal(4.0), "0:00:04.000");
        assert_eq!(seconds_to_sexagesimal(3723.5), "1:02:03.500");
    }

    #[test]
    fn sexagesimal_round_trip() {
        assert_eq!(parse_sexagesimal("1:02:03.500"), Some(3723.5));
        assert_eq!(parse_sexagesimal("90"), Some(90.0));
        assert_eq!(parse_sexagesimal("02:30"), Some(150.0));
        assert_eq!(parse_sexagesimal(""), None);
        assert_eq!(parse_sexagesimal("1:2:3:4"), None);
    }

    #[test]
    fn span_to_frames() {
        let ntsc = FrameRate::new(30000, 1001);
        assert_eq!(seconds_to_frames(10.0, FrameRate::new(25, 1)), 250);
        assert_eq!(seconds_to_frames(1001.0 / 30000.0 * 300.0, ntsc), 300);
    }
}
