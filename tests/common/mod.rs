// tests/common/mod.rs

use std::sync::Once;

/// Install the tracing subscriber once per test binary; repeated calls
/// (and collisions between parallel tests) are fine.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = chronodag::logging::init_logging(None);
    });
}
