/// Error code registry for seqplan
///
/// Error codes are organized by category:
/// - 1000-1999: Configuration errors
/// - 2000-2999: Plan construction errors
/// - 3000-3999: Storage errors
/// - 4000-4999: Execution errors
/// - 5000-5999: Workflow (run-time) errors
/// - 6000-6999: Planning service errors
/// - 7000-7999: Validation errors
/// - 9000-9999: Other errors
pub struct ErrorCode;

impl ErrorCode {
    // Configuration errors (1000-1999)
    pub const CONFIG_GENERIC: u16 = 1000;
    pub const CONFIG_NOT_FOUND: u16 = 1001;
    pub const CONFIG_INVALID_YAML: u16 = 1002;
    pub const CONFIG_INVALID_JSON: u16 = 1003;
    pub const CONFIG_INVALID_TOML: u16 = 1004;
    pub const CONFIG_INVALID_VALUE: u16 = 1005;
    pub const CONFIG_UNSUPPORTED_FORMAT: u16 = 1006;

    // Plan construction errors (2000-2999)
    pub const PLAN_UNKNOWN_STEP: u16 = 2001;
    pub const PLAN_DANGLING_DEPENDENCY: u16 = 2002;
    pub const PLAN_DUPLICATE_STEP_ID: u16 = 2003;
    pub const PLAN_CIRCULAR_DEPENDENCY: u16 = 2004;
    pub const PLAN_UNSUPPORTED_DOMAIN: u16 = 2005;
    pub const PLAN_INVALID_DOCUMENT: u16 = 2006;

    // Storage errors (3000-3999)
    pub const STORAGE_GENERIC: u16 = 3000;
    pub const STORAGE_IO_ERROR: u16 = 3001;
    pub const STORAGE_PERMISSION_DENIED: u16 = 3002;
    pub const STORAGE_NOT_FOUND: u16 = 3004;
    pub const STORAGE_ALREADY_EXISTS: u16 = 3005;

    // Execution errors (4000-4999)
    pub const EXEC_GENERIC: u16 = 4000;
    pub const EXEC_COMMAND_NOT_FOUND: u16 = 4001;
    pub const EXEC_TIMEOUT: u16 = 4002;
    pub const EXEC_INTERRUPTED: u16 = 4006;
    pub const EXEC_SPAWN_FAILED: u16 = 4007;
    pub const EXEC_INVALID_COMMAND_LINE: u16 = 4011;

    // Workflow errors (5000-5999)
    pub const WORKFLOW_INVALID_TRANSITION: u16 = 5001;
    pub const WORKFLOW_DUPLICATE_RESULT: u16 = 5002;

    // Planning service errors (6000-6999)
    pub const PLANNING_GENERIC: u16 = 6000;
    pub const PLANNING_EMPTY_GOAL: u16 = 6001;
    pub const PLANNING_EMPTY_STEPS: u16 = 6002;
    pub const PLANNING_TOOL_UNAVAILABLE: u16 = 6003;
    pub const PLANNING_MALFORMED_RESPONSE: u16 = 6004;
    pub const PLANNING_TIMEOUT: u16 = 6005;

    // Validation errors (7000-7999)
    pub const VALIDATION_GENERIC: u16 = 7000;
    pub const VALIDATION_REQUIRED_FIELD: u16 = 7001;
    pub const VALIDATION_INVALID_INPUT: u16 = 7008;
    pub const VALIDATION_INVALID_DATA: u16 = 7009;

    // Other errors (9000-9999)
    pub const OTHER_GENERIC: u16 = 9000;
}

/// Get a human-readable description for an error code
pub fn describe_error_code(code: u16) -> &'static str {
    match code {
        1000 => "Generic configuration error",
        1001 => "Configuration file not found",
        1002 => "Invalid YAML syntax in configuration",
        1003 => "Invalid JSON syntax in configuration",
        1004 => "Invalid TOML syntax in configuration",
        1005 => "Invalid value in configuration",
        1006 => "Unsupported configuration file format",

        2001 => "Step id has no handler in the domain executor",
        2002 => "Step depends on a step that is not in the plan",
        2003 => "Step id is used more than once",
        2004 => "Circular dependency between steps",
        2005 => "No planner or executor for domain",
        2006 => "Plan document could not be read",

        3000 => "Generic storage error",
        3001 => "Storage I/O error",
        3002 => "Storage permission denied",
        3004 => "Storage item not found",
        3005 => "Storage item already exists",

        4000 => "Generic execution error",
        4001 => "Command not found",
        4002 => "Command execution timeout",
        4006 => "Command execution interrupted",
        4007 => "Failed to spawn subprocess",
        4011 => "Command line could not be parsed",

        5001 => "Invalid step status transition",
        5002 => "Step result already recorded",

        6000 => "Generic planning service error",
        6001 => "Planning goal is empty",
        6002 => "No steps supplied to continue planning",
        6003 => "Planning tool unavailable",
        6004 => "Planning tool returned a malformed response",
        6005 => "Planning tool timed out",

        7000 => "Generic validation error",
        7001 => "Required field is missing",
        7008 => "Invalid input",
        7009 => "Invalid data",

        9000 => "Generic error",

        _ => "Unknown error code",
    }
}
