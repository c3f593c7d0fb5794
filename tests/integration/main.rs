//! Full-service integration tests, running the firmware against the
//! host simulation adapters.

mod mock_hw;
mod provisioning_flow_tests;
mod service_tests;
mod update_flow_tests;
