//! Fatal error reporting for the binary

use crate::error::FlowError;
use tracing::error;

/// Exit status for a failed flow run
pub const FLOW_FAILED_EXIT: i32 = 1;
/// Exit status for a document or configuration that never ran
pub const INVALID_INPUT_EXIT: i32 = 2;

/// Map an error to the process exit status
pub fn exit_code_for(error: &anyhow::Error) -> i32 {
    match error.downcast_ref::<FlowError>() {
        Some(FlowError::FlowFailed(_)) | None => FLOW_FAILED_EXIT,
        Some(err) if err.is_structural() => INVALID_INPUT_EXIT,
        Some(FlowError::Yaml(_) | FlowError::Toml(_) | FlowError::Validation(_)) => {
            INVALID_INPUT_EXIT
        }
        Some(_) => FLOW_FAILED_EXIT,
    }
}

/// Print the error and exit.
///
/// With `verbose >= 1` the full cause chain is printed too.
pub fn handle_fatal_error(error: anyhow::Error, verbose: u8) -> ! {
    error!("Fatal error: {}", error);
    eprintln!("Error: {error}");

    if verbose >= 1 {
        eprintln!("\nError chain:");
        for (i, cause) in error.chain().enumerate() {
            eprintln!("  {}: {}", i, cause);
        }
    }

    std::process::exit(exit_code_for(&error))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        let failed = anyhow::Error::new(FlowError::FlowFailed(vec!["x".into()]));
        assert_eq!(exit_code_for(&failed), FLOW_FAILED_EXIT);

        let structural = anyhow::Error::new(FlowError::InvalidDocument("bad".into()));
        assert_eq!(exit_code_for(&structural), INVALID_INPUT_EXIT);

        let other = anyhow::anyhow!("boom");
        assert_eq!(exit_code_for(&other), FLOW_FAILED_EXIT);
    }
}
