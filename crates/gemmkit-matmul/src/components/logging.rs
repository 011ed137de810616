use gemmkit_runtime::{ComputeClient, config::matmul::MatmulLogLevel};

/// Logs a launch decision. `full` details are only formatted at the full level.
pub fn log_launch(
    client: &ComputeClient,
    basic: impl FnOnce() -> String,
    full: impl FnOnce() -> String,
) {
    match client.matmul_log_level() {
        MatmulLogLevel::Disabled => {}
        MatmulLogLevel::Basic => client.log_matmul(&basic()),
        MatmulLogLevel::Full => {
            client.log_matmul(&basic());
            client.log_matmul(&full());
        }
    }
}
