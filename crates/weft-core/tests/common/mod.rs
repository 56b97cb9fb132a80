use tracing_subscriber::EnvFilter;
use weft_core::{Cas, FeatureId, TypeId};

/// Route engine logs to the test harness; honours `RUST_LOG`
#[allow(dead_code)]
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Engine with a frozen `Token` type (subtype of Annotation) carrying a `pos` string
#[allow(dead_code)]
pub fn token_engine() -> (Cas, TypeId, FeatureId) {
    let mut cas = Cas::new();
    let ts = cas.type_system_mut().unwrap();
    let token = ts.add_type("Token", TypeId::ANNOTATION).unwrap();
    let pos = ts.add_feature(token, "pos", TypeId::STRING).unwrap();
    cas.freeze_type_system().unwrap();
    (cas, token, pos)
}
