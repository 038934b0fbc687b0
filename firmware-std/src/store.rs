//! Persistent settings in the default NVS partition.

use esp_idf_svc::nvs::{EspDefaultNvsPartition, EspNvs, NvsDefault};

use antihunter::defaults::WATCHLIST_TEXT_LEN;
use antihunter::platform::{BeepConfig, ConfigStore};
use antihunter::watchlist::WatchlistText;

const NAMESPACE: &str = "antihunter";
const KEY_WATCHLIST: &str = "maclist";
const KEY_BEEPS: &str = "beeps";
const KEY_GAP: &str = "gap";

pub struct NvsStore {
    nvs: EspNvs<NvsDefault>,
}

impl NvsStore {
    pub fn new(partition: EspDefaultNvsPartition) -> anyhow::Result<Self> {
        Ok(Self {
            nvs: EspNvs::new(partition, NAMESPACE, true)?,
        })
    }
}

impl ConfigStore for NvsStore {
    fn load_watchlist_text(&mut self) -> WatchlistText {
        let mut buf = [0u8; WATCHLIST_TEXT_LEN + 1];
        let mut text = WatchlistText::new();
        match self.nvs.get_str(KEY_WATCHLIST, &mut buf) {
            Ok(Some(stored)) => {
                for c in stored.chars() {
                    if text.push(c).is_err() {
                        break;
                    }
                }
            }
            Ok(None) => {}
            Err(e) => log::warn!("Reading watchlist from NVS failed: {:?}", e),
        }
        text
    }

    fn save_watchlist_text(&mut self, text: &str) {
        if let Err(e) = self.nvs.set_str(KEY_WATCHLIST, text) {
            log::warn!("Saving watchlist to NVS failed: {:?}", e);
        }
    }

    fn load_beep_config(&mut self) -> BeepConfig {
        let defaults = BeepConfig::default();
        BeepConfig {
            beeps_per_hit: self.nvs.get_u8(KEY_BEEPS).ok().flatten().unwrap_or(defaults.beeps_per_hit),
            gap_ms: self.nvs.get_u32(KEY_GAP).ok().flatten().unwrap_or(defaults.gap_ms),
        }
    }

    fn save_beep_config(&mut self, config: BeepConfig) {
        let result = self
            .nvs
            .set_u8(KEY_BEEPS, config.beeps_per_hit)
            .and_then(|_| self.nvs.set_u32(KEY_GAP, config.gap_ms));
        if let Err(e) = result {
            log::warn!("Saving beep config to NVS failed: {:?}", e);
        }
    }
}
