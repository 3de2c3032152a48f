//! Prelude module - commonly used test utilities.
//!
//! Use `use warden_test::prelude::*;` to import all essential helpers.

pub use crate::{
    MockApprovalSink, StaticTool, TestHarness, bash_spec, scenario_spec, setup_test_logging,
    test_agent_id, write_spec,
};
