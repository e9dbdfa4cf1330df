use loratail_core::config::NumeralPolicy;
use loratail_core::TelemetryFrame;
use regex::Regex;
use std::sync::OnceLock;
use tracing::{debug, warn};

/// Field labels as they appear in the receiver log, in frame order
pub const FIELD_LABELS: [&str; 6] = [
    "pressure",
    "temperature",
    "altitude",
    "current_mA",
    "loadVoltage",
    "power_mW",
];

static FIELD_REGEXES: OnceLock<Vec<Regex>> = OnceLock::new();

fn get_field_regexes() -> &'static [Regex] {
    FIELD_REGEXES.get_or_init(|| {
        FIELD_LABELS
            .iter()
            .map(|label| {
                // Signed decimal, integer and fractional parts both required
                Regex::new(&format!(r"{}: (-?\d+\.\d+)", regex::escape(label)))
                    .expect("field pattern is valid")
            })
            .collect()
    })
}

/// Outcome of one decode attempt
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    /// All six fields matched and parsed
    Frame(TelemetryFrame),
    /// At least one field has not been seen yet
    Incomplete,
    /// Every field matched, but this numeral does not yield a finite value
    Invalid { field: &'static str, raw: String },
}

/// Pattern-based frame decoder
///
/// Each field is matched independently over the whole buffer, so field order
/// and surrounding text do not matter. When a field occurs more than once the
/// last occurrence wins. Decoding never mutates the buffer.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameDecoder {
    policy: NumeralPolicy,
}

impl FrameDecoder {
    pub fn new(policy: NumeralPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> NumeralPolicy {
        self.policy
    }

    /// Attempt to extract one frame from the buffer
    pub fn decode(&self, buffer: &str) -> Decoded {
        let mut raw: [&str; 6] = [""; 6];

        for (slot, regex) in raw.iter_mut().zip(get_field_regexes()) {
            match regex.captures_iter(buffer).last().and_then(|caps| caps.get(1)) {
                Some(m) => *slot = m.as_str(),
                None => return Decoded::Incomplete,
            }
        }

        let mut values = [0.0f32; 6];
        for (i, numeral) in raw.iter().enumerate() {
            match parse_numeral(numeral) {
                Some(value) => values[i] = value,
                None => match self.policy {
                    NumeralPolicy::Reject => {
                        debug!(field = FIELD_LABELS[i], raw = %numeral, "Rejecting unparseable numeral");
                        return Decoded::Invalid {
                            field: FIELD_LABELS[i],
                            raw: numeral.to_string(),
                        };
                    }
                    NumeralPolicy::ZeroFill => {
                        warn!(field = FIELD_LABELS[i], raw = %numeral, "Unparseable numeral, substituting zero");
                    }
                },
            }
        }

        Decoded::Frame(TelemetryFrame::new(
            values[0], values[1], values[2], values[3], values[4], values[5],
        ))
    }
}

fn parse_numeral(raw: &str) -> Option<f32> {
    raw.parse::<f32>().ok().filter(|v| v.is_finite())
}
