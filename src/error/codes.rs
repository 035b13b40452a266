/// Error code registry for actionflow
///
/// Codes are strings so that handlers can surface domain codes (exit codes,
/// HTTP statuses, user supplied labels) through the same channel. The
/// constants below cover failures raised by the engine itself.
#[allow(dead_code)]
pub struct ErrorCode;

impl ErrorCode {
    /// Default code assigned when a failure carries no explicit code
    pub const UNEXPECTED: &'static str = "UNEXPECTED";

    // Structural errors
    pub const INVALID_STEP: &'static str = "INVALID_STEP";
    pub const HANDLER_NOT_FOUND: &'static str = "HANDLER_NOT_FOUND";
    pub const INVALID_DOCUMENT: &'static str = "INVALID_DOCUMENT";
    pub const REGISTRY: &'static str = "REGISTRY";

    // Step errors
    pub const VALIDATION: &'static str = "VALIDATION";
    pub const TEMPLATE: &'static str = "TEMPLATE";
    pub const PATH: &'static str = "PATH";
    pub const FLOW_FAILED: &'static str = "FLOW_FAILED";

    // Wrapped library errors
    pub const IO: &'static str = "IO";
    pub const SERIALIZATION: &'static str = "SERIALIZATION";
}

/// Get a human-readable description for an engine error code
pub fn describe_error_code(code: &str) -> &'static str {
    match code {
        ErrorCode::UNEXPECTED => "Failure without an explicit error code",
        ErrorCode::INVALID_STEP => "Step object does not have exactly one handler key",
        ErrorCode::HANDLER_NOT_FOUND => "No handler registered for the step key",
        ErrorCode::INVALID_DOCUMENT => "Flow document has an invalid shape",
        ErrorCode::REGISTRY => "Handler registration was rejected",
        ErrorCode::VALIDATION => "Step options failed validation",
        ErrorCode::TEMPLATE => "Template expression could not be resolved",
        ErrorCode::PATH => "Invalid assignment path",
        ErrorCode::FLOW_FAILED => "One or more steps of the flow failed",
        ErrorCode::IO => "I/O failure",
        ErrorCode::SERIALIZATION => "Serialization or parsing failure",
        _ => "Handler specific error code",
    }
}
