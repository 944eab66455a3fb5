//! Comprehensive integration suite for the substrate
//!
//! Drives the whole system through the `rill` facade the way a host
//! program would: values through guarded scopes, operations through the
//! executor and scheduler, failures through both error channels.

mod execution_engine;
mod reactive_layer;
mod value_model;

mod support {
    use once_cell::sync::Lazy;

    static TRACING: Lazy<()> = Lazy::new(|| {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    });

    /// Install the test tracing subscriber once for the whole binary
    pub fn init_tracing() {
        Lazy::force(&TRACING);
    }
}

pub use support::init_tracing;
