//! Simulated DL24 for driving the learner and controller without hardware.

#![allow(dead_code)]

use dl24_mppt::codec::{decode_command, encode_status};
use dl24_mppt::{ButtonCodes, ChecksumDialect, Dl24Error, Measurement, Result, TelemetryReader, TelemetryState, Transport};

/// (voltage, current) reported at a set-point position
pub type Curve = Box<dyn Fn(i32) -> (f64, f64) + Send>;

/// Reacts to PLUS/MINUS frames addressed to an index it honours by moving its
/// set-point and publishing one status frame.
pub struct SimDevice {
    telemetry: TelemetryState,
    dialect: ChecksumDialect,
    buttons: ButtonCodes,
    curve: Curve,
    /// Indices the firmware honours
    pub honoured: Vec<u8>,
    pub position: i32,
    /// Status frames the device will still send; `None` is unlimited
    pub frames_left: Option<usize>,
    /// Every (session index, code) written
    pub writes: Vec<(u8, u8)>,
    pub fail_writes: bool,
    /// 1-based write attempts that fail
    pub failing_writes: Vec<usize>,
    write_attempts: usize,
    /// Acknowledge every write, honoured or not
    pub ack_writes: bool,
    /// Answer every write with a message outside the frame format
    pub chatter_writes: bool,
}

impl SimDevice {
    pub fn new(curve: Curve) -> Self {
        SimDevice {
            telemetry: TelemetryState::new(),
            dialect: ChecksumDialect::default(),
            buttons: ButtonCodes::default(),
            curve,
            honoured: vec![0, 1, 2, 3],
            position: 0,
            frames_left: None,
            writes: Vec::new(),
            fail_writes: false,
            failing_writes: Vec::new(),
            write_attempts: 0,
            ack_writes: false,
            chatter_writes: false,
        }
    }

    pub fn honouring(mut self, indices: &[u8]) -> Self {
        self.honoured = indices.to_vec();
        self
    }

    pub fn with_frame_budget(mut self, frames: usize) -> Self {
        self.frames_left = Some(frames);
        self
    }

    pub fn reader(&self) -> TelemetryReader {
        self.telemetry.reader()
    }

    /// Publish a status frame for the current position, if the budget allows
    pub fn emit(&mut self) {
        if let Some(left) = self.frames_left.as_mut() {
            if *left == 0 {
                return;
            }
            *left -= 1;
        }
        let (voltage, current) = (self.curve)(self.position);
        let frame = encode_status(&Measurement {
            voltage,
            current,
            ..Default::default()
        });
        // Split the frame to exercise reassembly on every publish
        self.telemetry.ingest(&frame[..7]);
        self.telemetry.ingest(&frame[7..]);
    }

    /// Publish a short acknowledgement
    pub fn ack(&mut self) {
        self.telemetry.ingest(&[0xFF, 0x55, 0x02, 0x01, 0x00, 0x00, 0x00, 0x00]);
    }

    /// Publish a message that is not a frame
    pub fn chatter(&mut self) {
        self.telemetry.ingest(&[0x4F, 0x4B, 0x0D, 0x0A]);
    }
}

impl Transport for SimDevice {
    async fn write(&mut self, frame: &[u8]) -> Result<()> {
        self.write_attempts += 1;
        if self.fail_writes || self.failing_writes.contains(&self.write_attempts) {
            return Err(Dl24Error::Transport("simulated link failure".to_string()));
        }
        let (index, code) =
            decode_command(frame, self.dialect).ok_or_else(|| Dl24Error::Parse("bad command frame".to_string()))?;
        self.writes.push((index, code));
        if self.ack_writes {
            self.ack();
        }
        if self.chatter_writes {
            self.chatter();
        }

        if !self.honoured.contains(&index) {
            return Ok(());
        }
        if code == self.buttons.plus {
            self.position += 1;
        } else if code == self.buttons.minus {
            self.position = (self.position - 1).max(0);
        }
        self.emit();
        Ok(())
    }
}

/// Power rises up to `peak` and falls after it: P = 20 - 0.1 (pos - peak)^2,
/// with current 0.1 A per step.
pub fn peaked_curve(peak: i32) -> Curve {
    Box::new(move |pos| {
        let current = 0.1 * pos as f64;
        if pos <= 0 {
            return (80.0, 0.0);
        }
        let d = (pos - peak) as f64;
        let power = (20.0 - 0.1 * d * d).max(0.1);
        (power / current, current)
    })
}

/// Power of `peaked_curve` as the device would report it (after field rounding)
pub fn reported_power(curve: &Curve, pos: i32) -> f64 {
    let (v, i) = curve(pos);
    ((v * 10.0).round() / 10.0) * ((i * 1000.0).round() / 1000.0)
}
