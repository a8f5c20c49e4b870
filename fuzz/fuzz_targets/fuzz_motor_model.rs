#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|rows: Vec<(f32, f32)>| {
    let rows = rows
        .into_iter()
        .map(|(duty_percent, rps)| rcdrive_config::ModelRow { duty_percent, rps })
        .collect();
    if let Ok(m) = rcdrive_config::MotorModel::from_rows(rows) {
        assert!(m.a.is_finite() && m.a > 0.0);
        assert!(m.b.is_finite());
    }
});
