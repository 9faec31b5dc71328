use std::time::Duration;

use log::{debug, info, warn};
use tokio::time::sleep;

use crate::codec::{encode_command, hex};
use crate::config::DeviceConfig;
use crate::constants::*;
use crate::error::{Dl24Error, Result};
use crate::telemetry::TelemetryReader;
use crate::transport::Transport;
use crate::types::*;

/// Main DL24 command interface.
///
/// Owns the outbound side of the link, so only one command is ever in flight.
pub struct Dl24<T: Transport> {
    transport: T,
    config: DeviceConfig,
    addressing: Addressing,
}

impl<T: Transport> Dl24<T> {
    /// Wrap a transport. Addressing starts in broadcast mode until a session index is known.
    pub fn new(transport: T, config: DeviceConfig) -> Self {
        Dl24 {
            transport,
            config,
            addressing: Addressing::Broadcast,
        }
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    pub fn addressing(&self) -> Addressing {
        self.addressing
    }

    pub fn set_addressing(&mut self, addressing: Addressing) {
        self.addressing = addressing;
    }

    /// Pin commands to a learned session index
    pub fn set_session_index(&mut self, index: u8) -> Result<()> {
        if !SESSION_CANDIDATES.contains(&index) {
            return Err(Dl24Error::InvalidSessionIndex(index));
        }
        self.addressing = Addressing::Single(index);
        Ok(())
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Encode and write one command frame
    pub async fn send_code(&mut self, code: u8, session_index: u8) -> Result<()> {
        let frame = encode_command(code, session_index, self.config.dialect);
        debug!("Sending:  {}", hex(&frame));
        self.transport.write(&frame).await
    }

    /// Press `button` using the current addressing mode.
    ///
    /// In broadcast mode the press goes to every candidate index with a short
    /// gap in between; the first write error ends the broadcast.
    pub async fn press(&mut self, button: Button) -> Result<()> {
        let code = self.config.buttons.code(button);
        match self.addressing {
            Addressing::Single(index) => self.send_code(code, index).await,
            Addressing::Broadcast => {
                for index in SESSION_CANDIDATES {
                    self.send_code(code, index).await?;
                    sleep(self.config.broadcast_gap()).await;
                }
                Ok(())
            }
        }
    }

    /// Press `button` at an explicit session index, then wait the press settle time
    pub async fn press_exact(&mut self, button: Button, session_index: u8) -> Result<()> {
        self.press_exact_settle(button, session_index, self.config.press_settle()).await
    }

    async fn press_exact_settle(&mut self, button: Button, session_index: u8, settle: Duration) -> Result<()> {
        let code = self.config.buttons.code(button);
        self.send_code(code, session_index).await?;
        sleep(settle).await;
        Ok(())
    }

    /// Start or stop the load
    pub async fn toggle_load(&mut self) -> Result<()> {
        info!("Sending start/stop toggle");
        let code = self.config.buttons.toggle;
        self.send_code(code, self.config.toggle_session_index).await
    }

    /// Open the CC current field for editing: SET, SET, OK at index 0.
    /// Pressing SET twice avoids accidentally starting the load.
    pub async fn enter_cc_edit(&mut self) -> Result<()> {
        let settle = Duration::from_millis(CC_EDIT_SETTLE_MS);
        let gap = Duration::from_millis(CC_EDIT_GAP_MS);
        self.press_exact_settle(Button::Set, 0, settle).await?;
        sleep(gap).await;
        self.press_exact_settle(Button::Set, 0, settle).await?;
        sleep(gap).await;
        self.press_exact_settle(Button::Ok, 0, settle).await
    }

    /// Fire every known off sequence a few times. Write errors are logged and skipped.
    pub async fn panic_off(&mut self) {
        let toggle = self.config.buttons.toggle;
        let set = self.config.buttons.set;
        let ok = self.config.buttons.ok;
        let index = self.config.toggle_session_index;
        let sequences: [(&str, &[u8]); 3] = [
            ("TOGGLE", &[toggle]),
            ("SET+OK", &[set, ok]),
            ("TOGGLEx2", &[toggle, toggle]),
        ];

        for round in 0..PANIC_ROUNDS {
            for (name, codes) in sequences {
                for &code in codes {
                    info!("Panic-off round {} {}", round + 1, name);
                    if let Err(e) = self.send_code(code, index).await {
                        warn!("Panic-off write failed: {}", e);
                    }
                    sleep(Duration::from_millis(PANIC_FRAME_GAP_MS)).await;
                }
            }
            sleep(Duration::from_millis(PANIC_ROUND_GAP_MS)).await;
        }
    }

    /// Move the set-point by `steps` presses, waiting after each press for the
    /// measured current to react. Returns how many presses saw a reaction.
    pub async fn nudge(&mut self, telemetry: &TelemetryReader, steps: i32) -> Result<u32> {
        let button = if steps > 0 { Button::Plus } else { Button::Minus };
        let mut reacted = 0;
        for _ in 0..steps.unsigned_abs() {
            let baseline = telemetry.snapshot().current();
            self.press(button).await?;
            if let Some(base) = baseline {
                let moved = telemetry
                    .wait_for_current_change(base, NUDGE_MIN_DELTA, Duration::from_millis(NUDGE_DELTA_TIMEOUT_MS))
                    .await;
                if moved {
                    reacted += 1;
                }
            }
            sleep(Duration::from_millis(NUDGE_STEP_DELAY_MS)).await;
        }
        Ok(reacted)
    }
}
