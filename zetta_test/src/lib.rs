use std::sync::Once;

use chrono::Local;
use zetta_shared::log::LevelFilter;

static LOGGER: Once = Once::new();

/// Installs the logger for tests. Calling it more than once is fine, only the first call has an effect.
pub fn setup_logger() {
    LOGGER.call_once(|| {
        simple_logger::SimpleLogger::new()
            .with_level(LevelFilter::Trace)
            .with_module_level("notify", LevelFilter::Info)
            .init()
            .unwrap_or_else(|err| eprintln!("Failed to install the test logger: {err}"));
        zetta_shared::log::info!("Test logger installed at {}", Local::now().format("%Y-%m-%d %H:%M:%S"));
    });
}

/// Test name in a form that can be used as a folder name, e.g. `zetta_content.geometry.tests.round_trip`.
pub fn test_folder_name(function_name: &str) -> String {
    function_name.replace("::", ".")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setup_logger_twice() {
        setup_logger();
        setup_logger();
    }

    #[test]
    fn folder_name() {
        let name = test_folder_name(zetta_shared::function_name!());
        assert_eq!(name, "zetta_test.tests.folder_name");
    }
}
