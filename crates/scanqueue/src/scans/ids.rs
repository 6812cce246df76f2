use chrono::Utc;
use rand::Rng;

const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const SUFFIX_LEN: usize = 9;

/// `scan_<unix millis>_<9 base36 chars>`. The random tail keeps ids distinct
/// when several scans land in the same millisecond.
pub fn new_scan_id() -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..SUFFIX_LEN)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect();

    format!("scan_{}_{}", Utc::now().timestamp_millis(), suffix)
}
