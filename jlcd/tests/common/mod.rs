pub mod assertions;
pub mod fixtures;
pub mod logging;

pub use assertions::assert_contains;
pub use fixtures::{TestWorkspace, free_port};
pub use logging::init_test_logging;
