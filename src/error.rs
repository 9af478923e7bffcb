//! Application error type.
//!
//! Every failure carries the process exit code `tbu` should terminate with:
//!
//! - `2`: bad input (CLI values, missing/invalid files, missing YAML keys, IO)
//! - `3`: not enough data to continue (burn-in too long, empty trace, unknown task)
//! - `4`: numerical failure (non-finite model state, no finite objective)

#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub const INPUT: u8 = 2;
    pub const INSUFFICIENT: u8 = 3;
    pub const NUMERIC: u8 = 4;

    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn input(message: impl Into<String>) -> Self {
        Self::new(Self::INPUT, message)
    }

    pub fn insufficient(message: impl Into<String>) -> Self {
        Self::new(Self::INSUFFICIENT, message)
    }

    pub fn numeric(message: impl Into<String>) -> Self {
        Self::new(Self::NUMERIC, message)
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}
