// Test support: transcript fixture builders and a disposable database+blob
// world for scheduler-level integration tests.

mod fixtures;
mod world;

pub use fixtures::TranscriptBuilder;
pub use world::TestWorld;
