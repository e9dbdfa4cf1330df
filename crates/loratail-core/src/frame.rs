use serde::{Deserialize, Serialize};

/// One complete set of readings reassembled from the receiver log
///
/// Only ever built with all six readings present; an incomplete frame is
/// never materialised.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TelemetryFrame {
    /// Barometric pressure
    pub pressure: f32,
    /// Ambient temperature
    pub temperature: f32,
    /// Altitude derived from pressure
    pub altitude: f32,
    /// Supply current in milliamps
    pub current_ma: f32,
    /// Voltage across the load
    pub load_voltage: f32,
    /// Power draw in milliwatts
    pub power_mw: f32,
}

impl TelemetryFrame {
    pub fn new(
        pressure: f32,
        temperature: f32,
        altitude: f32,
        current_ma: f32,
        load_voltage: f32,
        power_mw: f32,
    ) -> Self {
        Self {
            pressure,
            temperature,
            altitude,
            current_ma,
            load_voltage,
            power_mw,
        }
    }

    /// Readings paired with their wire names, in reporting order
    pub fn readings(&self) -> [(&'static str, f32); 6] {
        [
            ("Pressure", self.pressure),
            ("Temperature", self.temperature),
            ("Altitude", self.altitude),
            ("Current_mA", self.current_ma),
            ("LoadVoltage", self.load_voltage),
            ("Power_mW", self.power_mw),
        ]
    }
}

/// Event handed from the frame assembler to the governor
#[derive(Debug, Clone, PartialEq)]
pub enum IngestEvent {
    /// A fully decoded frame
    Frame(TelemetryFrame),
    /// A recoverable or terminal problem, counted against the error budget
    Fault(String),
}

impl std::fmt::Display for IngestEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IngestEvent::Frame(frame) => write!(
                f,
                "frame(pressure={:.2}, temperature={:.2}, altitude={:.2}, current_mA={:.2}, loadVoltage={:.2}, power_mW={:.2})",
                frame.pressure,
                frame.temperature,
                frame.altitude,
                frame.current_ma,
                frame.load_voltage,
                frame.power_mw
            ),
            IngestEvent::Fault(reason) => write!(f, "fault({})", reason),
        }
    }
}
