//! Integration test modules.

mod trainer_mock;
