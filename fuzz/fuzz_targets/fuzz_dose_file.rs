#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    if let Ok(file) = irradiant_config::parse_dose_matrix_json(data) {
        let [r, c, l] = file.shape;
        assert_eq!(r * c * l, file.data.len());
    }
});
