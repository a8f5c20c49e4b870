#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Parse errors and validation errors are fine; panics are not.
    let Ok(cfg) = rcdrive_config::load_toml(data) else {
        return;
    };
    if cfg.validate().is_err() {
        return;
    }
    // Conversion and the builder's own checks must not panic either.
    let mc = rcdrive_core::MotorConfig::from(&cfg);
    let encoder = std::sync::Arc::new(rcdrive_core::EncoderCounter::new());
    let drive = rcdrive_core::mocks::RecordingDrive::new();
    let _ = rcdrive_core::build_motor(drive, encoder, mc, None);
});
