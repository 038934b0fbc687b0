//! Buzzer driver using ESP-IDF LEDC PWM.
//!
//! Drives a passive piezo. The tone is changed by retuning the LEDC timer, so
//! the same channel serves the fixed-pitch hit pattern and the variable-pitch
//! tracker cue.

use std::thread;
use std::time::Duration;

use esp_idf_svc::hal::gpio::OutputPin;
use esp_idf_svc::hal::ledc::{config::TimerConfig, LedcChannel, LedcDriver, LedcTimer, LedcTimerDriver, Resolution};
use esp_idf_svc::hal::peripheral::Peripheral;
use esp_idf_svc::hal::units::Hertz;

use antihunter::board;
use antihunter::defaults::{PATTERN_BEEP_MS, PATTERN_FREQ_HZ};

pub struct Buzzer {
    timer: LedcTimerDriver<'static>,
    channel: LedcDriver<'static>,
    max_duty: u32,
    freq_hz: u32,
}

impl Buzzer {
    pub fn new<T, C>(
        timer: impl Peripheral<P = T> + 'static,
        channel: impl Peripheral<P = C> + 'static,
        pin: impl Peripheral<P = impl OutputPin> + 'static,
    ) -> anyhow::Result<Self>
    where
        T: LedcTimer + 'static,
        C: LedcChannel<SpeedMode = T::SpeedMode> + 'static,
    {
        let timer_config = TimerConfig::new()
            .frequency(Hertz(PATTERN_FREQ_HZ))
            .resolution(Resolution::Bits10);
        let timer = LedcTimerDriver::new(timer, &timer_config)?;
        let mut channel = LedcDriver::new(channel, &timer, pin)?;
        channel.set_duty(0)?;
        let max_duty = channel.get_max_duty();
        log::info!("Buzzer ready on GPIO{}", board::BUZZER_PIN);
        Ok(Self {
            timer,
            channel,
            max_duty,
            freq_hz: PATTERN_FREQ_HZ,
        })
    }

    /// Blocking tone of `duration_ms` at `freq_hz`.
    pub fn beep(&mut self, freq_hz: u32, duration_ms: u32) {
        if freq_hz != self.freq_hz {
            match self.timer.set_frequency(Hertz(freq_hz)) {
                Ok(()) => self.freq_hz = freq_hz,
                Err(e) => log::warn!("Buzzer retune to {} Hz failed: {:?}", freq_hz, e),
            }
        }
        self.channel.set_duty(self.max_duty / 2).ok();
        thread::sleep(Duration::from_millis(duration_ms as u64));
        self.channel.set_duty(0).ok();
    }

    pub fn beep_pattern(&mut self, count: u8, gap_ms: u32) {
        for i in 0..count {
            self.beep(PATTERN_FREQ_HZ, PATTERN_BEEP_MS);
            if i + 1 < count {
                thread::sleep(Duration::from_millis(gap_ms as u64));
            }
        }
    }
}
