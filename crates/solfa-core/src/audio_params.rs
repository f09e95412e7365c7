use solfa_ports::storage::PracticeSettings;
use std::sync::atomic::{AtomicU32, Ordering};

#[derive(Debug)]
pub struct AudioParams {
    master: AtomicU32,
}

impl AudioParams {
    pub fn new(settings: &PracticeSettings) -> Self {
        Self {
            master: AtomicU32::new(settings.master_volume.get().to_bits()),
        }
    }

    pub fn master(&self) -> f32 {
        f32::from_bits(self.master.load(Ordering::Relaxed))
    }
}

impl Default for AudioParams {
    fn default() -> Self {
        Self::new(&PracticeSettings::default())
    }
}
