#![doc = "Hostlink Harness\n\nScripted transport and locator doubles shared by the runtime and CLI test suites."]

pub mod mock_locator;
pub mod mock_transport;

pub use mock_locator::{ConnectScript, MockLocator};
pub use mock_transport::{MockTransport, RecordedCall};
