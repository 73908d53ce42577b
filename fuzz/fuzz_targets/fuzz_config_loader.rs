#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Parse errors and validation errors are both fine; panics are not.
    if let Ok(cfg) = ecoscale_config::load_toml(data) {
        let _ = cfg.validate();
    }
});
