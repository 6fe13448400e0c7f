//! Background Sampler
//!
//! Periodically reads the sensor and pushes changed readings into a
//! characteristic through [`CharacteristicStore::update_value`].
//!
//! # Wire format (5 bytes, IEEE-11073-style fixed point)
//!
//! ```text
//! [0]    : Flags (always 0x00)
//! [1-3]  : Mantissa, reading in milli-units (lower 24 bits, little-endian)
//! [4]    : Exponent (i8, fixed at -3 => value x 10^-3)
//! ```

use crate::domain::characteristic::CharacteristicStore;
use crate::domain::models::hex_bytes;
use crate::domain::ports::SensorSource;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info, warn, Span};

pub const ENCODED_LEN: usize = 5;
const FLAGS: u8 = 0x00;
const EXPONENT: i8 = -3;

/// Encode a milli-unit reading into the 5-byte fixed-point layout.
pub fn encode_reading(milli: i32) -> [u8; ENCODED_LEN] {
    let mantissa = (milli as u32) & 0x00FF_FFFF;
    let [m0, m1, m2, _] = mantissa.to_le_bytes();
    [FLAGS, m0, m1, m2, EXPONENT as u8]
}

/// One sampling cycle worth of state: the sensor, the target and the last
/// successfully read value used for dedup.
pub struct SampleLoop {
    sensor: Arc<dyn SensorSource>,
    target: Arc<CharacteristicStore>,
    last_reading: Option<i32>,
}

impl SampleLoop {
    pub fn new(sensor: Arc<dyn SensorSource>, target: Arc<CharacteristicStore>) -> Self {
        Self {
            sensor,
            target,
            last_reading: None,
        }
    }

    /// Run one cycle. Returns the bytes pushed, if the reading changed.
    pub fn tick(&mut self) -> Option<[u8; ENCODED_LEN]> {
        let reading = match self.sensor.read_milli() {
            Ok(reading) => reading,
            Err(e) => {
                warn!("Sensor read failed, skipping cycle: {}", e);
                return None;
            }
        };

        if self.last_reading == Some(reading) {
            return None;
        }
        self.last_reading = Some(reading);

        let encoded = encode_reading(reading);
        debug!("Reading {} -> {}", reading, hex_bytes(&encoded));
        self.target.update_value(encoded.to_vec());
        Some(encoded)
    }
}

/// Sampler thread handle. Stopping clears the running flag and joins, so it
/// can take up to one sample period.
pub struct Sampler {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Sampler {
    pub fn start(mut sample_loop: SampleLoop, period: Duration, span: Span) -> std::io::Result<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let flag = running.clone();

        let handle = std::thread::Builder::new()
            .name("sampler".to_string())
            .spawn(move || {
                let _enter = span.enter();
                info!("Sampler started ({:?} period)", period);
                while flag.load(Ordering::Acquire) {
                    sample_loop.tick();
                    std::thread::sleep(period);
                }
                info!("Sampler stopped");
            })?;

        Ok(Self {
            running,
            handle: Some(handle),
        })
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some() && self.running.load(Ordering::Acquire)
    }

    /// Signal the loop to exit and wait for it.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Sampler thread panicked");
            }
        }
    }

    /// Signal the loop to exit without waiting for it.
    pub fn detach(mut self) {
        self.running.store(false, Ordering::Release);
        self.handle.take();
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::fakes::ScriptedSensor;
    use crate::domain::models::CharacteristicEvent;
    use tokio::sync::mpsc;

    fn target() -> (
        Arc<CharacteristicStore>,
        mpsc::UnboundedReceiver<CharacteristicEvent>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let store = CharacteristicStore::new(
            "/t/app/service0/char0",
            "12345678-1234-5678-1234-56789abcdef1",
            "/t/app/service0",
            vec![0x00],
            tx,
            Span::none(),
        );
        (Arc::new(store), rx)
    }

    fn value_events(rx: &mut mpsc::UnboundedReceiver<CharacteristicEvent>) -> Vec<Vec<u8>> {
        let mut values = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let CharacteristicEvent::ValueChanged { value, .. } = event {
                values.push(value);
            }
        }
        values
    }

    #[test]
    fn test_encode_reading() {
        assert_eq!(encode_reading(25000), [0x00, 0xA8, 0x61, 0x00, 0xFD]);
        assert_eq!(encode_reading(25100), [0x00, 0x0C, 0x62, 0x00, 0xFD]);
        assert_eq!(encode_reading(0), [0x00, 0x00, 0x00, 0x00, 0xFD]);
        // Negative readings keep their two's complement low 24 bits.
        assert_eq!(encode_reading(-1), [0x00, 0xFF, 0xFF, 0xFF, 0xFD]);
    }

    #[test]
    fn test_dedups_repeated_readings() {
        let (store, mut rx) = target();
        store.start_notify();
        value_events(&mut rx);

        let sensor = Arc::new(ScriptedSensor::new(vec![Ok(25000), Ok(25000), Ok(25100)]));
        let mut sample_loop = SampleLoop::new(sensor, store.clone());

        let pushed: Vec<_> = (0..3).filter_map(|_| sample_loop.tick()).collect();
        assert_eq!(
            pushed,
            vec![
                [0x00, 0xA8, 0x61, 0x00, 0xFD],
                [0x00, 0x0C, 0x62, 0x00, 0xFD],
            ]
        );
        assert_eq!(
            value_events(&mut rx),
            vec![
                vec![0x00, 0xA8, 0x61, 0x00, 0xFD],
                vec![0x00, 0x0C, 0x62, 0x00, 0xFD],
            ]
        );
        assert_eq!(store.value(), vec![0x00, 0x0C, 0x62, 0x00, 0xFD]);
    }

    #[test]
    fn test_failed_read_skips_cycle_and_keeps_last_reading() {
        let (store, _rx) = target();
        let sensor = Arc::new(ScriptedSensor::new(vec![
            Ok(21000),
            Err(()),
            Ok(21000),
            Ok(21500),
        ]));
        let mut sample_loop = SampleLoop::new(sensor, store);

        assert!(sample_loop.tick().is_some());
        assert!(sample_loop.tick().is_none());
        assert!(sample_loop.tick().is_none());
        assert!(sample_loop.tick().is_some());
    }

    #[test]
    fn test_unsubscribed_target_still_gets_value() {
        let (store, mut rx) = target();
        let sensor = Arc::new(ScriptedSensor::new(vec![Ok(30000)]));
        let mut sample_loop = SampleLoop::new(sensor, store.clone());

        sample_loop.tick();
        assert_eq!(store.value(), encode_reading(30000).to_vec());
        assert!(value_events(&mut rx).is_empty());
    }

    #[test]
    fn test_thread_stops_cooperatively() {
        let (store, _rx) = target();
        let sensor = Arc::new(ScriptedSensor::repeating(22000));
        let sample_loop = SampleLoop::new(sensor.clone(), store.clone());

        let mut sampler =
            Sampler::start(sample_loop, Duration::from_millis(10), Span::none()).unwrap();
        assert!(sampler.is_running());
        std::thread::sleep(Duration::from_millis(50));
        sampler.stop();
        assert!(!sampler.is_running());

        let reads = sensor.reads();
        assert!(reads >= 1);
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(sensor.reads(), reads);
        assert_eq!(store.value(), encode_reading(22000).to_vec());
    }

    #[test]
    fn test_detached_thread_exits_on_its_own() {
        let (store, _rx) = target();
        let sensor = Arc::new(ScriptedSensor::repeating(22000));
        let sample_loop = SampleLoop::new(sensor.clone(), store);

        let sampler =
            Sampler::start(sample_loop, Duration::from_millis(10), Span::none()).unwrap();
        std::thread::sleep(Duration::from_millis(30));
        sampler.detach();

        std::thread::sleep(Duration::from_millis(50));
        let reads = sensor.reads();
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(sensor.reads(), reads);
    }
}
