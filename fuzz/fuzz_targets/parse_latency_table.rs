#![no_main]

use foehn::CityLatency;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let _res = CityLatency::from_csv_reader(data);
});
